//! Lifecycle scenarios driven tick by tick against the mock source.

use integration_tests::{fixtures, setup::TestContext};
use score_core::{SessionPatch, SessionState};
use worker::{FlushOutcome, Ingested, Recorded, Transition};

#[tokio::test]
async fn test_idle_while_offline() {
    let mut ctx = TestContext::with_defaults();

    assert_eq!(ctx.reconciler.tick().await, Transition::Idle);
    assert_eq!(ctx.reconciler.tick().await, Transition::Idle);
    assert!(!ctx.tracker.is_open());
    assert_eq!(ctx.source.live_calls(), 2);
}

#[tokio::test]
async fn test_adoption_writes_session_metadata() {
    let mut ctx = TestContext::with_defaults();
    ctx.source.add_category(fixtures::category("509658", "Just Chatting"));
    ctx.source.set_live(Some(fixtures::live_stream("s1", "509658")));

    assert_eq!(
        ctx.reconciler.tick().await,
        Transition::Started { session_id: "s1".into() }
    );

    let session = ctx.stored_session("s1").await.unwrap();
    assert_eq!(session.state, SessionState::Live);
    assert_eq!(session.started_at, fixtures::started_at());
    assert_eq!(session.title, "test stream");
    assert_eq!(session.broadcaster_id, fixtures::BROADCASTER_ID);
    assert_eq!(session.categories.len(), 1);
    assert_eq!(session.categories[0].name, "Just Chatting");

    ctx.reconciler.shutdown().await;
}

#[tokio::test]
async fn test_same_session_twice_skips_category_write() {
    let mut ctx = TestContext::with_defaults();
    ctx.source.add_category(fixtures::category("509658", "Just Chatting"));
    ctx.source.set_live(Some(fixtures::live_stream("s1", "509658")));

    ctx.reconciler.tick().await;
    let writes_after_adopt = ctx.store.merges_touching("s1", "categories");

    assert_eq!(
        ctx.reconciler.tick().await,
        Transition::Continued { session_id: "s1".into() }
    );
    assert_eq!(ctx.store.merges_touching("s1", "categories"), writes_after_adopt);
    assert_eq!(ctx.source.category_calls(), 1);

    ctx.reconciler.shutdown().await;
}

#[tokio::test]
async fn test_category_change_appends_once() {
    let mut ctx = TestContext::with_defaults();
    ctx.source.add_category(fixtures::category("1", "Art"));
    ctx.source.add_category(fixtures::category("2", "Games"));

    ctx.source.set_live(Some(fixtures::live_stream("s1", "1")));
    ctx.reconciler.tick().await;
    ctx.source.set_live(Some(fixtures::live_stream("s1", "2")));
    ctx.reconciler.tick().await;
    ctx.reconciler.tick().await;
    // Switching back does not duplicate.
    ctx.source.set_live(Some(fixtures::live_stream("s1", "1")));
    ctx.reconciler.tick().await;

    let session = ctx.stored_session("s1").await.unwrap();
    let ids: Vec<_> = session.categories.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["1", "2"]);

    ctx.reconciler.shutdown().await;
}

#[tokio::test]
async fn test_metadata_failure_keeps_state() {
    let mut ctx = TestContext::with_defaults();
    ctx.source.set_live(Some(fixtures::live_stream("s1", "")));
    ctx.reconciler.tick().await;

    ctx.source.set_live_failure(true);
    assert_eq!(ctx.reconciler.tick().await, Transition::Unknown);
    assert_eq!(ctx.tracker.session_id().as_deref(), Some("s1"));

    let session = ctx.stored_session("s1").await.unwrap();
    assert_eq!(session.state, SessionState::Live);

    ctx.source.set_live_failure(false);
    assert_eq!(
        ctx.reconciler.tick().await,
        Transition::Continued { session_id: "s1".into() }
    );
    ctx.reconciler.shutdown().await;
}

#[tokio::test]
async fn test_failed_adoption_is_retried() {
    let mut ctx = TestContext::with_defaults();
    ctx.source.set_live(Some(fixtures::live_stream("s1", "")));

    ctx.store.set_merge_failure(true);
    assert_eq!(ctx.reconciler.tick().await, Transition::Unknown);
    assert!(!ctx.tracker.is_open());
    assert!(!ctx.reconciler.is_aggregating());

    // Votes while un-adopted are discarded.
    let results = ctx.chat(&fixtures::plus_twos(1, 5));
    assert_eq!(results, vec![Ingested::Vote(Recorded::NoSession)]);

    ctx.store.set_merge_failure(false);
    assert_eq!(
        ctx.reconciler.tick().await,
        Transition::Started { session_id: "s1".into() }
    );
    ctx.reconciler.shutdown().await;
}

#[tokio::test]
async fn test_end_marks_session_ended() {
    let mut ctx = TestContext::new(std::time::Duration::from_millis(5), Some(1));
    ctx.source.set_live(Some(fixtures::live_stream("s1", "")));
    ctx.reconciler.tick().await;

    ctx.source.set_live(None);
    assert_eq!(
        ctx.reconciler.tick().await,
        Transition::Ended { session_id: "s1".into() }
    );
    assert!(!ctx.tracker.is_open());
    assert!(!ctx.reconciler.is_aggregating());

    let session = ctx.stored_session("s1").await.unwrap();
    assert_eq!(session.state, SessionState::Ended);
    // The fixture start lies in the past, so uptime is well above zero.
    assert!(session.uptime_minutes.unwrap() > 0);

    assert_eq!(ctx.reconciler.tick().await, Transition::Idle);
    ctx.wait_for_finalizer("s1").await;
}

#[tokio::test]
async fn test_failed_end_write_is_retried() {
    let mut ctx = TestContext::new(std::time::Duration::from_millis(2), Some(2));
    ctx.source.set_live(Some(fixtures::live_stream("s1", "")));
    ctx.reconciler.tick().await;

    ctx.store.set_merge_failure(true);
    ctx.source.set_live(None);
    assert_eq!(
        ctx.reconciler.tick().await,
        Transition::Ended { session_id: "s1".into() }
    );
    assert!(!ctx.tracker.is_open());
    assert!(ctx.reconciler.is_ending());
    // Finalization waits until the session is marked ended.
    assert!(!ctx.reconciler.finalizer().is_running("s1"));
    assert_eq!(
        ctx.stored_session("s1").await.unwrap().state,
        SessionState::Live
    );

    assert_eq!(ctx.reconciler.tick().await, Transition::Unknown);

    ctx.store.set_merge_failure(false);
    assert_eq!(ctx.reconciler.tick().await, Transition::Idle);
    assert!(!ctx.reconciler.is_ending());

    let session = ctx.stored_session("s1").await.unwrap();
    assert_eq!(session.state, SessionState::Ended);
    assert!(session.uptime_minutes.is_some());
    ctx.wait_for_finalizer("s1").await;
}

#[tokio::test]
async fn test_replacement_ends_old_session_without_merging() {
    let mut ctx = TestContext::new(std::time::Duration::from_millis(5), Some(1));
    ctx.source.set_live(Some(fixtures::live_stream("a", "")));
    ctx.reconciler.tick().await;
    ctx.chat(&fixtures::plus_twos(3, 10));

    ctx.source.set_live(Some(fixtures::live_stream("b", "")));
    assert_eq!(
        ctx.reconciler.tick().await,
        Transition::Replaced {
            ended: "a".into(),
            started: "b".into()
        }
    );

    // Votes buffered for A were flushed into A when its tick stopped.
    assert_eq!(ctx.store.vote_count("a"), 3);
    let a = ctx.stored_session("a").await.unwrap();
    assert_eq!(a.state, SessionState::Ended);
    assert!(a.uptime_minutes.is_some());
    assert_eq!(a.summary.total, 6);

    ctx.chat(&fixtures::plus_twos(2, 100));
    assert_eq!(
        ctx.batcher.flush().await.unwrap(),
        FlushOutcome::Flushed { persisted: 2 }
    );
    assert_eq!(ctx.store.vote_count("a"), 3);
    assert_eq!(ctx.store.vote_count("b"), 2);

    let b = ctx.stored_session("b").await.unwrap();
    assert_eq!(b.state, SessionState::Live);
    assert_eq!(b.summary.total, 4);

    ctx.reconciler.shutdown().await;
    ctx.wait_for_finalizer("a").await;
}

#[tokio::test]
async fn test_resume_after_restart() {
    let mut ctx = TestContext::with_defaults();

    // State left behind by an earlier process.
    let mut earlier = score_core::Session::from_live(&fixtures::live_stream("s1", ""));
    earlier.categories.push(fixtures::category("1", "Art"));
    ctx.repo
        .save("s1", &SessionPatch::adopt(&earlier))
        .await
        .unwrap();
    let prior: Vec<_> = fixtures::plus_twos(4, 30)
        .iter()
        .map(|m| score_core::VoteEvent::from_message(m, "s1", score_core::Polarity::Positive))
        .collect();
    ctx.repo.write_votes("s1", &prior).await.unwrap();

    ctx.source.set_live(Some(fixtures::live_stream("s1", "")));
    ctx.reconciler.tick().await;
    assert_eq!(ctx.tracker.history_len(), 4);

    // A replayed message is not counted again.
    let mut replay = fixtures::chat("+2", 31);
    replay.message_id = prior[1].id.clone();
    assert_eq!(ctx.chat(&[replay]), vec![Ingested::Vote(Recorded::Duplicate)]);

    assert_eq!(
        ctx.batcher.flush().await.unwrap(),
        FlushOutcome::Flushed { persisted: 0 }
    );
    let session = ctx.stored_session("s1").await.unwrap();
    assert_eq!(session.summary.total, 8);
    assert_eq!(session.categories.len(), 1);
    assert_eq!(ctx.batcher.flush().await.unwrap(), FlushOutcome::Idle);

    ctx.reconciler.shutdown().await;
}

#[tokio::test]
async fn test_recording_of_previous_stream_is_ignored() {
    let mut ctx = TestContext::with_defaults();
    ctx.source
        .script_recordings(vec![Some(fixtures::recording("v0", "s0", true))]);
    ctx.source.set_live(Some(fixtures::live_stream("s1", "")));

    ctx.reconciler.tick().await;
    ctx.reconciler.tick().await;
    assert_eq!(ctx.store.merges_touching("s1", "recording"), 0);

    ctx.source
        .script_recordings(vec![Some(fixtures::recording("v1", "s1", false))]);
    ctx.reconciler.tick().await;
    ctx.reconciler.tick().await;
    assert_eq!(ctx.store.merges_touching("s1", "recording"), 1);

    let session = ctx.stored_session("s1").await.unwrap();
    assert_eq!(session.recording.unwrap().id, "v1");

    ctx.reconciler.shutdown().await;
}
