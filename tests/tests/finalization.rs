//! Recording finalization after a session ends.

use std::time::Duration;

use integration_tests::{fixtures, setup::TestContext};
use score_core::{Recording, SessionState};
use worker::Transition;

/// Starts and ends `session_id`, scripting `recordings` only after adoption.
/// Returns the recording lookups made before the end tick.
async fn end_session(
    ctx: &mut TestContext,
    session_id: &str,
    recordings: Vec<Option<Recording>>,
) -> usize {
    ctx.source.set_live(Some(fixtures::live_stream(session_id, "")));
    ctx.reconciler.tick().await;

    ctx.source.script_recordings(recordings);
    let calls = ctx.source.recording_calls();

    ctx.source.set_live(None);
    assert_eq!(
        ctx.reconciler.tick().await,
        Transition::Ended { session_id: session_id.into() }
    );
    calls
}

#[tokio::test]
async fn test_placeholder_then_ready_saves_once() {
    let mut ctx = TestContext::new(Duration::from_millis(5), None);
    let calls_before = end_session(
        &mut ctx,
        "s1",
        vec![
            Some(fixtures::recording("v1", "s1", false)),
            Some(fixtures::recording("v1", "s1", false)),
            Some(fixtures::recording("v1", "s1", true)),
        ],
    )
    .await;
    ctx.wait_for_finalizer("s1").await;

    assert_eq!(ctx.source.recording_calls() - calls_before, 3);
    assert_eq!(ctx.store.merges_touching("s1", "recording"), 1);

    let session = ctx.stored_session("s1").await.unwrap();
    assert_eq!(session.state, SessionState::Ended);
    let recording = session.recording.unwrap();
    assert_eq!(recording.thumbnail_url, fixtures::READY_THUMBNAIL);
    assert!(recording.is_ready());
}

#[tokio::test]
async fn test_gives_up_after_retry_budget() {
    let mut ctx = TestContext::new(Duration::from_millis(2), Some(4));
    let calls_at_end = end_session(
        &mut ctx,
        "s1",
        vec![Some(fixtures::recording("v1", "s1", false))],
    )
    .await;
    ctx.wait_for_finalizer("s1").await;

    assert_eq!(ctx.source.recording_calls() - calls_at_end, 4);
    assert_eq!(ctx.store.merges_touching("s1", "recording"), 0);
    let session = ctx.stored_session("s1").await.unwrap();
    assert_eq!(session.state, SessionState::Ended);
    assert!(session.recording.is_none());
}

#[tokio::test]
async fn test_replaced_session_is_finalized_with_its_own_recording() {
    let mut ctx = TestContext::new(Duration::from_millis(5), Some(20));
    ctx.source
        .script_recordings(vec![Some(fixtures::recording("va", "a", true))]);
    ctx.source.set_live(Some(fixtures::live_stream("a", "")));
    ctx.reconciler.tick().await;

    ctx.source.set_live(Some(fixtures::live_stream("b", "")));
    ctx.reconciler.tick().await;
    ctx.wait_for_finalizer("a").await;

    let a = ctx.stored_session("a").await.unwrap();
    assert_eq!(a.state, SessionState::Ended);
    assert_eq!(a.recording.unwrap().id, "va");

    // A's recording is never attached to B.
    let b = ctx.stored_session("b").await.unwrap();
    assert_eq!(b.state, SessionState::Live);
    assert!(b.recording.is_none());

    ctx.reconciler.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_interrupts_unbounded_loop() {
    let mut ctx = TestContext::new(Duration::from_millis(5), None);
    end_session(
        &mut ctx,
        "s1",
        vec![Some(fixtures::recording("v1", "s1", false))],
    )
    .await;
    assert!(ctx.reconciler.finalizer().is_running("s1"));

    ctx.shutdown.trigger();
    ctx.wait_for_finalizer("s1").await;
    assert_eq!(ctx.store.merges_touching("s1", "recording"), 0);
}

#[tokio::test]
async fn test_late_recording_keeps_readopted_session_live() {
    let mut ctx = TestContext::new(Duration::from_millis(5), None);
    end_session(
        &mut ctx,
        "s1",
        vec![Some(fixtures::recording("v1", "s1", false))],
    )
    .await;
    assert!(ctx.reconciler.finalizer().is_running("s1"));

    // Same stream comes back before its recording is processed.
    ctx.source.set_live(Some(fixtures::live_stream("s1", "")));
    assert_eq!(
        ctx.reconciler.tick().await,
        Transition::Started { session_id: "s1".into() }
    );

    ctx.source
        .script_recordings(vec![Some(fixtures::recording("v1", "s1", true))]);
    ctx.wait_for_finalizer("s1").await;

    assert!(ctx.tracker.is_open());
    let session = ctx.stored_session("s1").await.unwrap();
    assert_eq!(session.state, SessionState::Live);
    assert!(session.recording.unwrap().is_ready());

    ctx.reconciler.shutdown().await;
}
