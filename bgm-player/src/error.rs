//! Error types for bgm-player
//!
//! Defines module-specific error types using thiserror for clear error propagation.
//! None of these reach callers of the playback worker: the worker logs them and
//! degrades to a no-op.

use bgm_common::PlaybackState;
use thiserror::Error;

/// Main error type for bgm-player
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration loading errors
    #[error("Configuration error: {0}")]
    Config(#[from] bgm_common::Error),

    /// Asset could not be resolved or opened
    #[error("Asset error: {0}")]
    Asset(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Audio decoding errors
    #[error("Audio decode error: {0}")]
    Decode(String),

    /// Audio output device errors
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// State machine rejected a transition
    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition {
        from: PlaybackState,
        to: PlaybackState,
    },
}

/// Convenience Result type using bgm-player Error
pub type Result<T> = std::result::Result<T, Error>;
