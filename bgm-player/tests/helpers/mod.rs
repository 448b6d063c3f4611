//! Test helper modules for bgm-player integration tests
//!
//! - mock_player: scripted `MediaPlayer` recording every call with its thread
//! - audio_generator: deterministic WAV fixtures
//! - events: waiting on the playback event bus

#![allow(dead_code)]

pub mod audio_generator;
pub mod events;
pub mod mock_player;

pub use audio_generator::{generate_sine_wav, generate_silent_wav};
pub use events::{wait_for_command, wait_for_event, wait_for_state, wait_until};
pub use mock_player::{Call, MockControl, MockFactory, PrepareScript};

use bgm_common::events::{event_channel, EventReceiver};
use bgm_player::assets::DirectoryAssets;
use bgm_player::{PlaybackWorker, WorkerConfig};
use std::sync::Arc;
use tempfile::TempDir;

/// Track names written by `asset_dir`
pub const TRACK_A: &str = "a.ogg";
pub const TRACK_B: &str = "b.ogg";

/// Temporary asset folder containing dummy `a.ogg` and `b.ogg`
pub fn asset_dir() -> TempDir {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    for name in [TRACK_A, TRACK_B] {
        std::fs::write(dir.path().join(name), b"not really audio").expect("Failed to write asset");
    }
    dir
}

/// Worker driving a mock decoder, plus everything a test needs to observe it
pub struct Harness {
    pub worker: PlaybackWorker,
    pub control: Arc<MockControl>,
    pub events: EventReceiver,
    pub assets: TempDir,
}

pub fn spawn_worker(script: PrepareScript) -> Harness {
    spawn_worker_with(script, WorkerConfig::default())
}

pub fn spawn_worker_with(script: PrepareScript, config: WorkerConfig) -> Harness {
    let assets = asset_dir();
    let control = MockControl::new(script);
    let (sender, events) = event_channel(1024);
    let worker = PlaybackWorker::spawn(
        config,
        Arc::new(DirectoryAssets::new(assets.path())),
        Arc::new(MockFactory::new(Arc::clone(&control))),
        sender,
    )
    .expect("Failed to spawn worker");

    Harness {
        worker,
        control,
        events,
        assets,
    }
}
