//! Playback event types
//!
//! Events published by the playback worker to any number of observers
//! (coordinator, CLI status output, tests).

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Decoder lifecycle state as tracked by the playback worker
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    /// No data source bound
    Idle,
    /// Data source bound, not yet preparing
    Initialized,
    /// Asynchronous preparation in flight
    Preparing,
    /// Preparation finished
    Prepared,
    /// Playing
    Started,
    /// Paused by request
    Paused,
    /// Stopped; must be reset before it can play again
    Stopped,
    /// Decoder reported end of stream
    Completed,
    /// Worker shut down (terminal)
    Ended,
    /// Unrecoverable decoder fault
    Error,
}

impl PlaybackState {
    /// States in which a data source is bound to the decoder
    pub fn is_active(self) -> bool {
        matches!(
            self,
            PlaybackState::Initialized
                | PlaybackState::Preparing
                | PlaybackState::Prepared
                | PlaybackState::Started
                | PlaybackState::Paused
                | PlaybackState::Completed
        )
    }
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PlaybackState::Idle => "idle",
            PlaybackState::Initialized => "initialized",
            PlaybackState::Preparing => "preparing",
            PlaybackState::Prepared => "prepared",
            PlaybackState::Started => "started",
            PlaybackState::Paused => "paused",
            PlaybackState::Stopped => "stopped",
            PlaybackState::Completed => "completed",
            PlaybackState::Ended => "ended",
            PlaybackState::Error => "error",
        };
        write!(f, "{}", name)
    }
}

/// How the worker disposed of a command
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CommandOutcome {
    /// Command changed decoder state
    Applied,
    /// Command was not legal in the current state and was dropped
    Ignored,
    /// Command was attempted and the decoder or asset layer failed
    Failed,
}

impl std::fmt::Display for CommandOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandOutcome::Applied => write!(f, "applied"),
            CommandOutcome::Ignored => write!(f, "ignored"),
            CommandOutcome::Failed => write!(f, "failed"),
        }
    }
}

/// Events published by the playback worker
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum PlaybackEvent {
    /// Worker state machine moved between two states
    StateChanged {
        /// State before change
        old_state: PlaybackState,
        /// State after change
        new_state: PlaybackState,
        /// When state changed
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// One queued command finished executing
    CommandHandled {
        /// Command in its display form, payload included (`start(a.ogg)`, `pause`)
        command: String,
        /// What the worker did with it
        outcome: CommandOutcome,
        /// State after the command ran
        state: PlaybackState,
    },

    /// A new data source was bound to the decoder
    TrackLoaded {
        /// Asset file name
        file: String,
    },

    /// The decoder reported an unrecoverable fault
    DecoderFault {
        /// Decoder-supplied description
        message: String,
    },

    /// Worker thread left its run loop
    WorkerExited,
}

impl PlaybackEvent {
    /// Build a `StateChanged` event stamped with the current time
    pub fn state_changed(old_state: PlaybackState, new_state: PlaybackState) -> Self {
        PlaybackEvent::StateChanged {
            old_state,
            new_state,
            timestamp: chrono::Utc::now(),
        }
    }

    /// Event type name, matching the serde tag
    pub fn event_type(&self) -> &'static str {
        match self {
            PlaybackEvent::StateChanged { .. } => "StateChanged",
            PlaybackEvent::CommandHandled { .. } => "CommandHandled",
            PlaybackEvent::TrackLoaded { .. } => "TrackLoaded",
            PlaybackEvent::DecoderFault { .. } => "DecoderFault",
            PlaybackEvent::WorkerExited => "WorkerExited",
        }
    }

    /// Serialize to a single JSON line
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Events buffered per receiver unless configured otherwise
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Sender half of the playback event bus
pub type EventSender = broadcast::Sender<PlaybackEvent>;

/// Receiver half of the playback event bus
pub type EventReceiver = broadcast::Receiver<PlaybackEvent>;

/// Create an event bus buffering up to `capacity` events per receiver
pub fn event_channel(capacity: usize) -> (EventSender, EventReceiver) {
    broadcast::channel(capacity.max(1))
}
