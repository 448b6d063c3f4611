//! Waiting on the playback event bus

use bgm_common::events::{EventReceiver, PlaybackEvent};
use bgm_common::{CommandOutcome, PlaybackState};
use std::time::{Duration, Instant};
use tokio::sync::broadcast::error::RecvError;

/// Default wait before a test gives up
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Receive events until `matches` accepts one; panics on timeout
pub async fn wait_for_event<F>(events: &mut EventReceiver, mut matches: F) -> PlaybackEvent
where
    F: FnMut(&PlaybackEvent) -> bool,
{
    let deadline = tokio::time::Instant::now() + EVENT_TIMEOUT;
    loop {
        let received = tokio::time::timeout_at(deadline, events.recv())
            .await
            .expect("Timed out waiting for playback event");
        match received {
            Ok(event) if matches(&event) => return event,
            Ok(_) => continue,
            Err(RecvError::Lagged(skipped)) => panic!("Event receiver lagged by {}", skipped),
            Err(RecvError::Closed) => panic!("Event bus closed"),
        }
    }
}

/// Wait for a transition into `state`
pub async fn wait_for_state(events: &mut EventReceiver, state: PlaybackState) {
    wait_for_event(events, |event| {
        matches!(event, PlaybackEvent::StateChanged { new_state, .. } if *new_state == state)
    })
    .await;
}

/// Wait until the worker reports `command` handled; returns its outcome and the resulting state
pub async fn wait_for_command(events: &mut EventReceiver, command: &str) -> (CommandOutcome, PlaybackState) {
    match wait_for_event(events, |event| {
        matches!(event, PlaybackEvent::CommandHandled { command: handled, .. } if handled == command)
    })
    .await
    {
        PlaybackEvent::CommandHandled { outcome, state, .. } => (outcome, state),
        other => panic!("Unexpected event {:?}", other),
    }
}

/// Poll `condition` until it holds; false on timeout
pub fn wait_until<F: FnMut() -> bool>(mut condition: F) -> bool {
    let deadline = Instant::now() + EVENT_TIMEOUT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}
