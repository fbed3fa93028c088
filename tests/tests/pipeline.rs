//! Chat → pending buffer → batch write → aggregation.

use integration_tests::{fixtures, setup::TestContext};
use worker::{FlushOutcome, Ingested, Recorded, Transition};

async fn live_context() -> TestContext {
    let mut ctx = TestContext::with_defaults();
    ctx.source.set_live(Some(fixtures::live_stream("s1", "")));
    assert_eq!(
        ctx.reconciler.tick().await,
        Transition::Started { session_id: "s1".into() }
    );
    ctx
}

#[tokio::test]
async fn test_votes_are_persisted_and_aggregated() {
    let mut ctx = live_context().await;
    ctx.chat(&[
        fixtures::chat("+2", 10),
        fixtures::chat("lol", 15),
        fixtures::chat("jermaPlus2 nice", 20),
        fixtures::chat("-2", 70),
    ]);
    assert_eq!(ctx.tracker.pending_len(), 3);

    assert_eq!(
        ctx.batcher.flush().await.unwrap(),
        FlushOutcome::Flushed { persisted: 3 }
    );
    assert_eq!(ctx.store.vote_count("s1"), 3);
    assert_eq!(ctx.store.batch_count(), 1);

    let session = ctx.stored_session("s1").await.unwrap();
    assert_eq!(session.series.len(), 2);

    let first = &session.series[0];
    assert_eq!(first.interval, 0);
    assert_eq!((first.open, first.high, first.low, first.close), (2, 4, 2, 4));
    assert_eq!(first.volume, 2);
    assert_eq!(first.total_positive, 4);

    let second = &session.series[1];
    assert_eq!(second.interval, 1);
    assert_eq!((second.open, second.high, second.low, second.close), (2, 2, 2, 2));
    assert_eq!(second.total_negative, -2);

    assert_eq!(session.summary.total, 2);
    assert_eq!(session.summary.all_time_high, 4);
    assert_eq!(session.summary.all_time_low, 0);
    assert_eq!(session.summary.running_max, 4);
    assert_eq!(session.summary.running_min, -2);
    assert!(session.uptime_minutes.is_some());

    ctx.reconciler.shutdown().await;
}

#[tokio::test]
async fn test_out_of_order_arrival_is_sorted() {
    let mut ctx = live_context().await;
    ctx.chat(&[fixtures::chat("-2", 70), fixtures::chat("+2", 10)]);
    ctx.batcher.flush().await.unwrap();

    let session = ctx.stored_session("s1").await.unwrap();
    assert_eq!(session.series[0].interval, 0);
    assert_eq!(session.series[0].open, 2);
    assert_eq!(session.series[1].open, 0);
    assert_eq!(session.summary.all_time_high, 2);

    ctx.reconciler.shutdown().await;
}

#[tokio::test]
async fn test_failed_batch_keeps_votes_pending() {
    let mut ctx = live_context().await;
    ctx.chat(&fixtures::plus_twos(2, 5));

    ctx.store.set_batch_failure(true);
    let err = ctx.batcher.flush().await.unwrap_err();
    assert_eq!(err.error_code(), Some("STORE_001"));
    assert!(err.is_transient());
    assert_eq!(ctx.tracker.pending_len(), 2);
    assert_eq!(ctx.store.vote_count("s1"), 0);

    // New votes join the retry.
    ctx.chat(&fixtures::plus_twos(1, 60));
    ctx.store.set_batch_failure(false);
    assert_eq!(
        ctx.batcher.flush().await.unwrap(),
        FlushOutcome::Flushed { persisted: 3 }
    );
    assert_eq!(ctx.tracker.pending_len(), 0);
    assert_eq!(ctx.store.vote_count("s1"), 3);

    ctx.reconciler.shutdown().await;
}

#[tokio::test]
async fn test_idle_flush_writes_nothing() {
    let mut ctx = live_context().await;
    assert_eq!(ctx.batcher.flush().await.unwrap(), FlushOutcome::Idle);
    assert_eq!(ctx.store.batch_count(), 0);
    assert_eq!(ctx.store.merges_touching("s1", "series"), 0);

    ctx.reconciler.shutdown().await;
}

#[tokio::test]
async fn test_rewriting_a_batch_does_not_duplicate() {
    let ctx = TestContext::with_defaults();
    let votes: Vec<_> = fixtures::plus_twos(3, 0)
        .iter()
        .map(|m| score_core::VoteEvent::from_message(m, "s1", score_core::Polarity::Positive))
        .collect();

    ctx.repo.write_votes("s1", &votes).await.unwrap();
    ctx.repo.write_votes("s1", &votes).await.unwrap();
    assert_eq!(ctx.store.vote_count("s1"), 3);
    assert_eq!(ctx.repo.load_votes("s1").await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_votes_without_session_are_discarded() {
    let mut ctx = TestContext::with_defaults();
    let results = ctx.chat(&[fixtures::chat("+2", 0), fixtures::chat("hi", 1)]);
    assert_eq!(
        results,
        vec![Ingested::Vote(Recorded::NoSession), Ingested::NotAVote]
    );

    ctx.source.set_live(Some(fixtures::live_stream("s1", "")));
    ctx.reconciler.tick().await;
    assert_eq!(ctx.tracker.pending_len(), 0);
    assert_eq!(ctx.batcher.flush().await.unwrap(), FlushOutcome::Idle);
    assert_eq!(ctx.store.vote_count("s1"), 0);

    ctx.reconciler.shutdown().await;
}

#[tokio::test]
async fn test_final_flush_on_end() {
    let mut ctx = TestContext::new(std::time::Duration::from_millis(5), Some(1));
    ctx.source.set_live(Some(fixtures::live_stream("s1", "")));
    ctx.reconciler.tick().await;
    ctx.chat(&fixtures::plus_twos(5, 300));

    ctx.source.set_live(None);
    ctx.reconciler.tick().await;

    assert_eq!(ctx.store.vote_count("s1"), 5);
    let session = ctx.stored_session("s1").await.unwrap();
    assert_eq!(session.summary.total, 10);
    assert_eq!(session.series.len(), 1);
    assert_eq!(session.series[0].interval, 5);

    // Chat after the end goes nowhere.
    assert_eq!(
        ctx.chat(&fixtures::plus_twos(1, 400)),
        vec![Ingested::Vote(Recorded::NoSession)]
    );
    ctx.wait_for_finalizer("s1").await;
}

#[tokio::test]
async fn test_votes_left_at_end_are_retried() {
    let mut ctx = TestContext::new(std::time::Duration::from_millis(5), Some(1));
    ctx.source.set_live(Some(fixtures::live_stream("s1", "")));
    ctx.reconciler.tick().await;
    ctx.chat(&fixtures::plus_twos(3, 10));

    ctx.store.set_batch_failure(true);
    ctx.source.set_live(None);
    assert_eq!(
        ctx.reconciler.tick().await,
        Transition::Ended { session_id: "s1".into() }
    );
    assert_eq!(ctx.store.vote_count("s1"), 0);
    assert!(ctx.reconciler.is_ending());
    // The ended state does not wait for the votes.
    let session = ctx.stored_session("s1").await.unwrap();
    assert_eq!(session.state, score_core::SessionState::Ended);

    assert_eq!(ctx.reconciler.tick().await, Transition::Unknown);
    assert_eq!(ctx.store.vote_count("s1"), 0);

    ctx.store.set_batch_failure(false);
    assert_eq!(ctx.reconciler.tick().await, Transition::Idle);
    assert_eq!(ctx.store.vote_count("s1"), 3);

    let session = ctx.stored_session("s1").await.unwrap();
    assert_eq!(session.state, score_core::SessionState::Ended);
    assert_eq!(session.summary.total, 6);
    ctx.wait_for_finalizer("s1").await;
}
