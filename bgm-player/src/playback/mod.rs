//! Playback state machine and the worker that drives it

pub mod state;
pub mod worker;

pub use state::PlaybackStateMachine;
pub use worker::{PlaybackWorker, WorkerConfig};
