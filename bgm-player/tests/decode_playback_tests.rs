//! Real decode path tests
//!
//! Generates WAV fixtures with hound and plays them through symphonia, rubato
//! and the null sink.

mod helpers;

use bgm_common::config::OutputConfig;
use bgm_common::events::{event_channel, PlaybackEvent};
use bgm_common::{CommandOutcome, PlaybackState};
use bgm_player::assets::{AssetDescriptor, AssetProvider, DirectoryAssets};
use bgm_player::audio::{decode_source, AudioSink, FaultHandler, LoopingCursor, NullSink};
use bgm_player::player::{
    MediaPlayer, NotificationSink, PlayerFactory, PlayerListener, PlayerNotification, PlayerResult, SymphoniaPlayer,
    SymphoniaPlayerFactory,
};
use bgm_player::{Command, PlaybackWorker, WorkerConfig};
use helpers::{generate_silent_wav, generate_sine_wav, wait_for_command, wait_for_event, wait_for_state};
use std::fs::File;
use std::io::{Read, Write};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

struct ChannelSink(Mutex<mpsc::Sender<(u64, PlayerNotification)>>);

impl NotificationSink for ChannelSink {
    fn notify(&self, generation: u64, notification: PlayerNotification) {
        let _ = self.0.lock().unwrap().send((generation, notification));
    }
}

/// Null output whose device can be failed from the test
struct FailingSink {
    inner: NullSink,
    handler: Arc<Mutex<Option<FaultHandler>>>,
}

impl AudioSink for FailingSink {
    fn sample_rate(&self) -> u32 {
        self.inner.sample_rate()
    }

    fn load(&mut self, cursor: Arc<LoopingCursor>) -> bgm_player::Result<()> {
        self.inner.load(cursor)
    }

    fn play(&mut self) -> bgm_player::Result<()> {
        self.inner.play()
    }

    fn pause(&mut self) -> bgm_player::Result<()> {
        self.inner.pause()
    }

    fn unload(&mut self) {
        self.inner.unload()
    }

    fn is_playing(&self) -> bool {
        self.inner.is_playing()
    }

    fn set_fault_handler(&mut self, handler: Option<FaultHandler>) {
        *self.handler.lock().unwrap() = handler;
    }
}

/// Handle the test uses to break the output device
#[derive(Clone, Default)]
struct DeviceSwitch(Arc<Mutex<Option<FaultHandler>>>);

impl DeviceSwitch {
    fn sink(&self) -> FailingSink {
        FailingSink {
            inner: NullSink::new(44100),
            handler: Arc::clone(&self.0),
        }
    }

    /// Fire the installed handler; false if none is installed
    fn fail(&self, message: &str) -> bool {
        let handler = self.0.lock().unwrap().clone();
        match handler {
            Some(handler) => {
                handler(message.to_string());
                true
            }
            None => false,
        }
    }
}

struct FailingFactory(DeviceSwitch);

impl PlayerFactory for FailingFactory {
    fn create(&self) -> PlayerResult<Box<dyn MediaPlayer>> {
        Ok(Box::new(SymphoniaPlayer::new(Box::new(self.0.sink()))))
    }
}

fn null_factory() -> Arc<SymphoniaPlayerFactory> {
    Arc::new(SymphoniaPlayerFactory::new(OutputConfig {
        null_output: true,
        device: None,
    }))
}

#[test]
fn test_decode_mono_wav_to_stereo() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tone.wav");
    generate_sine_wav(&path, 48000, 1, 250, 440.0, 0.5).unwrap();

    let source = AssetDescriptor::from_file("tone.wav", File::open(&path).unwrap()).unwrap();
    let track = decode_source(Box::new(source), Some("wav")).unwrap();

    assert_eq!(track.sample_rate, 48000);
    assert_eq!(track.frames(), 12000);
    // Mono duplicated to both channels
    for frame in track.samples.chunks_exact(2).take(100) {
        assert_eq!(frame[0], frame[1]);
    }
    assert!(track.samples.iter().any(|s| s.abs() > 0.1));
}

#[test]
fn test_decode_from_packed_range() {
    let dir = tempfile::tempdir().unwrap();
    let wav_path = dir.path().join("tone.wav");
    generate_sine_wav(&wav_path, 44100, 2, 100, 220.0, 0.5).unwrap();
    let mut wav = Vec::new();
    File::open(&wav_path).unwrap().read_to_end(&mut wav).unwrap();

    // Track stored at an offset inside a larger archive
    let pack_path = dir.path().join("assets.pack");
    let mut pack = File::create(&pack_path).unwrap();
    pack.write_all(&[0xAB; 1000]).unwrap();
    pack.write_all(&wav).unwrap();
    pack.write_all(&[0xCD; 500]).unwrap();
    drop(pack);

    let source =
        AssetDescriptor::from_file_range("tone.wav", File::open(&pack_path).unwrap(), 1000, wav.len() as u64).unwrap();
    let track = decode_source(Box::new(source), Some("wav")).unwrap();
    assert_eq!(track.frames(), 4410);
}

#[test]
fn test_symphonia_player_prepares_and_plays() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tone.wav");
    // Off-rate source exercises the resampler
    generate_sine_wav(&path, 22050, 2, 200, 330.0, 0.5).unwrap();

    let (tx, rx) = mpsc::channel();
    let listener = PlayerListener::new(7, Arc::new(ChannelSink(Mutex::new(tx))));

    let mut player = SymphoniaPlayer::new(Box::new(NullSink::new(44100)));
    let source = DirectoryAssets::new(dir.path()).open("tone.wav").unwrap();
    player.set_data_source(source).unwrap();
    player.set_looping(true).unwrap();
    player.prepare_async(listener).unwrap();

    let (generation, notification) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(generation, 7);
    assert_eq!(notification, PlayerNotification::Prepared);

    assert_eq!(player.is_playing(), Ok(false));
    player.start().unwrap();
    assert_eq!(player.is_playing(), Ok(true));
    player.pause().unwrap();
    assert_eq!(player.is_playing(), Ok(false));
    player.start().unwrap();
    player.stop().unwrap();
    assert_eq!(player.is_playing(), Ok(false));

    // A second source requires a reset first
    let again = DirectoryAssets::new(dir.path()).open("tone.wav").unwrap();
    player.reset();
    player.set_data_source(again).unwrap();
    player.release();
    assert!(player.is_playing().is_err());
}

#[test]
fn test_symphonia_player_reports_decode_failure() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("broken.mp3"), vec![0u8; 256]).unwrap();

    let (tx, rx) = mpsc::channel();
    let listener = PlayerListener::new(1, Arc::new(ChannelSink(Mutex::new(tx))));

    let mut player = SymphoniaPlayer::new(Box::new(NullSink::new(44100)));
    player
        .set_data_source(DirectoryAssets::new(dir.path()).open("broken.mp3").unwrap())
        .unwrap();
    player.prepare_async(listener).unwrap();

    let (_, notification) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(matches!(notification, PlayerNotification::Error(message) if message.contains("broken.mp3")));
    assert!(player.start().is_err());
}

#[test]
fn test_output_fault_reported_to_listener() {
    let dir = tempfile::tempdir().unwrap();
    generate_sine_wav(dir.path().join("tone.wav"), 44100, 2, 200, 440.0, 0.5).unwrap();

    let (tx, rx) = mpsc::channel();
    let listener = PlayerListener::new(3, Arc::new(ChannelSink(Mutex::new(tx))));
    let switch = DeviceSwitch::default();

    let mut player = SymphoniaPlayer::new(Box::new(switch.sink()));
    player
        .set_data_source(DirectoryAssets::new(dir.path()).open("tone.wav").unwrap())
        .unwrap();
    player.set_looping(true).unwrap();
    player.prepare_async(listener).unwrap();
    let (_, notification) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(notification, PlayerNotification::Prepared);

    player.start().unwrap();
    assert_eq!(player.is_playing(), Ok(true));

    assert!(switch.fail("device unplugged"));
    let (generation, notification) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(generation, 3);
    assert_eq!(notification, PlayerNotification::Error("device unplugged".to_string()));
    assert_eq!(player.is_playing(), Ok(false));
    assert!(player.start().is_err());

    // A second fault from the same device is not reported again
    assert!(switch.fail("still unplugged"));
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

    // Reset detaches the handler
    player.reset();
    assert!(!switch.fail("after reset"));
}

#[tokio::test]
async fn test_worker_enters_error_on_output_fault() {
    let dir = tempfile::tempdir().unwrap();
    generate_sine_wav(dir.path().join("theme.wav"), 44100, 2, 300, 440.0, 0.4).unwrap();

    let switch = DeviceSwitch::default();
    let (sender, mut events) = event_channel(256);
    let worker = PlaybackWorker::spawn(
        WorkerConfig::default(),
        Arc::new(DirectoryAssets::new(dir.path())),
        Arc::new(FailingFactory(switch.clone())),
        sender,
    )
    .unwrap();

    worker.enqueue(Command::start("theme.wav"));
    wait_for_state(&mut events, PlaybackState::Started).await;
    assert!(worker.is_playing());

    assert!(switch.fail("audio output: device lost"));
    let fault = wait_for_event(&mut events, |e| matches!(e, PlaybackEvent::DecoderFault { .. })).await;
    assert!(matches!(fault, PlaybackEvent::DecoderFault { message } if message.contains("device lost")));
    assert_eq!(worker.state(), PlaybackState::Error);
    assert!(!worker.is_playing());

    worker.enqueue(Command::release());
    assert_eq!(
        wait_for_command(&mut events, "release").await,
        (CommandOutcome::Applied, PlaybackState::Idle)
    );
    worker.shutdown();
}

#[tokio::test]
async fn test_worker_plays_wav_to_null_output() {
    let dir = tempfile::tempdir().unwrap();
    generate_sine_wav(dir.path().join("theme.wav"), 44100, 2, 300, 440.0, 0.4).unwrap();
    generate_silent_wav(dir.path().join("quiet.wav"), 48000, 200).unwrap();

    let (sender, mut events) = event_channel(1024);
    let worker = PlaybackWorker::spawn(
        WorkerConfig::default(),
        Arc::new(DirectoryAssets::new(dir.path())),
        null_factory(),
        sender,
    )
    .unwrap();

    worker.enqueue(Command::start("theme.wav"));
    wait_for_state(&mut events, PlaybackState::Started).await;
    assert!(worker.is_playing());
    assert!(worker.is_playable());

    worker.enqueue(Command::pause());
    wait_for_state(&mut events, PlaybackState::Paused).await;
    assert!(!worker.is_playing());

    worker.enqueue(Command::start("quiet.wav"));
    wait_for_event(&mut events, |e| matches!(e, PlaybackEvent::TrackLoaded { file } if file == "quiet.wav")).await;
    wait_for_state(&mut events, PlaybackState::Started).await;
    assert_eq!(worker.current_file().as_deref(), Some("quiet.wav"));

    worker.enqueue(Command::release());
    assert_eq!(
        wait_for_command(&mut events, "release").await,
        (CommandOutcome::Applied, PlaybackState::Idle)
    );
    worker.shutdown();
}

#[tokio::test]
async fn test_worker_enters_error_on_corrupt_asset() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("corrupt.ogg"), b"definitely not vorbis").unwrap();

    let (sender, mut events) = event_channel(256);
    let worker = PlaybackWorker::spawn(
        WorkerConfig::default(),
        Arc::new(DirectoryAssets::new(dir.path())),
        null_factory(),
        sender,
    )
    .unwrap();

    worker.enqueue(Command::start("corrupt.ogg"));
    wait_for_event(&mut events, |e| matches!(e, PlaybackEvent::DecoderFault { .. })).await;
    assert_eq!(worker.state(), PlaybackState::Error);
    assert!(!worker.is_playing());

    worker.enqueue(Command::resume());
    assert_eq!(
        wait_for_command(&mut events, "resume").await,
        (CommandOutcome::Ignored, PlaybackState::Error)
    );
}
