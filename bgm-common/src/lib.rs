//! # BGM Common Library
//!
//! Shared code for the background music service crates:
//! - Configuration loading (TOML bootstrap, environment, compiled defaults)
//! - Event types (PlaybackEvent enum) broadcast by the playback worker
//! - Common error type

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
pub use events::{CommandOutcome, PlaybackEvent, PlaybackState};
