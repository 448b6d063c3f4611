//! # bgm-player
//!
//! Background music playback for an application: a looping track plays while
//! the application is in the foreground and pauses when it is backgrounded.
//!
//! **Architecture:** callers talk to `service::BgmService`, which queues
//! `command::Command`s for a single `playback::PlaybackWorker` thread. The
//! worker drives a `player::MediaPlayer` (symphonia decode + rubato resample
//! into an `audio::AudioSink`) through an explicit state machine.
//! `coordinator::BackgroundPlaybackCoordinator` turns component visibility
//! changes into service calls.

pub mod assets;
pub mod audio;
pub mod command;
pub mod coordinator;
pub mod error;
pub mod playback;
pub mod player;
pub mod service;

pub use command::{Command, CommandKind};
pub use coordinator::{BackgroundPlaybackCoordinator, ComponentId};
pub use error::{Error, Result};
pub use playback::{PlaybackWorker, WorkerConfig};
pub use service::{BgmService, BgmServiceBinder, Music, ServiceBinder};
