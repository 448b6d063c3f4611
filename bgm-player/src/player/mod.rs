//! Decoder abstraction
//!
//! `MediaPlayer` is the engine the playback worker drives. It enforces its own
//! lifecycle and reports misordered calls as `PlayerError::InvalidState`
//! instead of panicking. Asynchronous notifications (prepared, completed,
//! error) go through a `PlayerListener`, which forwards them to whoever owns
//! the player; the worker re-homes them onto its own thread.

pub mod symphonia_player;

pub use self::symphonia_player::{SymphoniaPlayer, SymphoniaPlayerFactory};

use crate::assets::AssetDescriptor;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by a `MediaPlayer`
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlayerError {
    /// Operation not legal in the player's current state
    #[error("{operation} called in state {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    /// Data source could not be bound
    #[error("Data source error: {0}")]
    DataSource(String),

    /// Output sink failed
    #[error("Output error: {0}")]
    Output(String),

    /// Player instance could not be created
    #[error("Player creation failed: {0}")]
    Create(String),
}

pub type PlayerResult<T> = std::result::Result<T, PlayerError>;

/// Asynchronous notification raised by a player
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerNotification {
    /// Preparation finished; the player can start
    Prepared,
    /// Playback reached the end of a non-looping source
    Completed,
    /// Unrecoverable fault
    Error(String),
}

/// Receives notifications tagged with the generation of the listener
pub trait NotificationSink: Send + Sync {
    fn notify(&self, generation: u64, notification: PlayerNotification);
}

/// Handle a player uses to report asynchronous events
///
/// Every rebind of a data source gets a listener with a new generation, so the
/// receiver can tell notifications about a previous source from current ones.
#[derive(Clone)]
pub struct PlayerListener {
    generation: u64,
    sink: Arc<dyn NotificationSink>,
}

impl PlayerListener {
    pub fn new(generation: u64, sink: Arc<dyn NotificationSink>) -> Self {
        Self { generation, sink }
    }

    pub fn prepared(&self) {
        self.sink.notify(self.generation, PlayerNotification::Prepared);
    }

    pub fn completed(&self) {
        self.sink.notify(self.generation, PlayerNotification::Completed);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.sink
            .notify(self.generation, PlayerNotification::Error(message.into()));
    }
}

impl fmt::Debug for PlayerListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlayerListener")
            .field("generation", &self.generation)
            .finish()
    }
}

/// Media decoder/player bound to at most one data source at a time
pub trait MediaPlayer: Send {
    /// Bind a data source; legal only when idle
    fn set_data_source(&mut self, source: AssetDescriptor) -> PlayerResult<()>;

    fn set_looping(&mut self, looping: bool) -> PlayerResult<()>;

    /// Begin preparing the bound source; completion is reported to `listener`
    fn prepare_async(&mut self, listener: PlayerListener) -> PlayerResult<()>;

    fn start(&mut self) -> PlayerResult<()>;

    fn pause(&mut self) -> PlayerResult<()>;

    fn stop(&mut self) -> PlayerResult<()>;

    /// Drop the bound source and return to idle; always legal before release
    fn reset(&mut self);

    /// Free all resources; the player is unusable afterwards
    fn release(&mut self);

    fn is_playing(&self) -> PlayerResult<bool>;
}

/// Creates player instances for the worker
pub trait PlayerFactory: Send + Sync {
    fn create(&self) -> PlayerResult<Box<dyn MediaPlayer>>;
}
