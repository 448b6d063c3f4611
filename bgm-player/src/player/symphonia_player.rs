//! `MediaPlayer` backed by symphonia decoding and an `AudioSink`
//!
//! Preparation decodes and resamples the whole asset on a `bgm-prepare`
//! thread. Playback then only moves a `LoopingCursor` over memory.

use super::{MediaPlayer, PlayerError, PlayerFactory, PlayerListener, PlayerResult};
use crate::assets::AssetDescriptor;
use crate::audio::{decode_source, AudioSink, FaultHandler, LoopingCursor, NullSink, PcmTrack, Resampler};
use crate::error::Result;
use bgm_common::config::OutputConfig;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use tracing::{debug, info, warn};

/// Sample rate used when audio is not sent to a device
pub const NULL_SINK_SAMPLE_RATE: u32 = 44100;

/// Internal player lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Initialized,
    Preparing,
    Prepared,
    Started,
    Paused,
    Stopped,
    PlaybackCompleted,
    Error,
    End,
}

impl Phase {
    fn name(self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Initialized => "initialized",
            Phase::Preparing => "preparing",
            Phase::Prepared => "prepared",
            Phase::Started => "started",
            Phase::Paused => "paused",
            Phase::Stopped => "stopped",
            Phase::PlaybackCompleted => "playback-completed",
            Phase::Error => "error",
            Phase::End => "end",
        }
    }
}

struct Inner {
    phase: Phase,
    source: Option<AssetDescriptor>,
    looping: bool,
    track: Option<Arc<PcmTrack>>,
    cursor: Option<Arc<LoopingCursor>>,
    /// Bumped on every reset; a prepare thread only publishes if it still matches
    prepare_id: u64,
}

impl Inner {
    /// Phase with cursor completion folded in
    fn effective_phase(&self) -> Phase {
        match (&self.cursor, self.phase) {
            (Some(cursor), Phase::Started) if cursor.is_finished() => Phase::PlaybackCompleted,
            (_, phase) => phase,
        }
    }

    fn require(&self, operation: &'static str, allowed: &[Phase]) -> PlayerResult<Phase> {
        let phase = self.effective_phase();
        if allowed.contains(&phase) {
            Ok(phase)
        } else {
            Err(PlayerError::InvalidState {
                operation,
                state: phase.name(),
            })
        }
    }
}

/// Player decoding assets with symphonia
pub struct SymphoniaPlayer {
    inner: Arc<Mutex<Inner>>,
    sink: Box<dyn AudioSink>,
    listener: Option<PlayerListener>,
}

impl SymphoniaPlayer {
    pub fn new(sink: Box<dyn AudioSink>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                phase: Phase::Idle,
                source: None,
                looping: false,
                track: None,
                cursor: None,
                prepare_id: 0,
            })),
            sink,
            listener: None,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attach a fresh cursor over the prepared track and start the sink
    fn play_from_start(&mut self) -> PlayerResult<()> {
        let (track, looping, prepare_id) = {
            let inner = self.lock();
            let track = inner
                .track
                .clone()
                .ok_or_else(|| PlayerError::Output("No prepared track".to_string()))?;
            (track, inner.looping, inner.prepare_id)
        };

        let mut cursor = LoopingCursor::new(track, looping);
        if let Some(listener) = self.listener.clone() {
            self.sink.set_fault_handler(Some(fault_handler(
                Arc::clone(&self.inner),
                prepare_id,
                listener.clone(),
            )));
            cursor = cursor.with_end_callback(Box::new(move || listener.completed()));
        }
        let cursor = Arc::new(cursor);

        // Sink calls happen without the inner lock held
        self.sink
            .load(Arc::clone(&cursor))
            .map_err(|e| PlayerError::Output(e.to_string()))?;
        self.sink.play().map_err(|e| PlayerError::Output(e.to_string()))?;

        let mut inner = self.lock();
        inner.cursor = Some(cursor);
        inner.phase = Phase::Started;
        Ok(())
    }
}

impl fmt::Debug for SymphoniaPlayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("SymphoniaPlayer")
            .field("phase", &inner.effective_phase())
            .field("looping", &inner.looping)
            .field("sample_rate", &self.sink.sample_rate())
            .finish()
    }
}

impl MediaPlayer for SymphoniaPlayer {
    fn set_data_source(&mut self, source: AssetDescriptor) -> PlayerResult<()> {
        let mut inner = self.lock();
        inner.require("set_data_source", &[Phase::Idle])?;
        debug!("Data source bound: {} ({} bytes)", source.name(), source.length());
        inner.source = Some(source);
        inner.phase = Phase::Initialized;
        Ok(())
    }

    fn set_looping(&mut self, looping: bool) -> PlayerResult<()> {
        let mut inner = self.lock();
        if matches!(inner.phase, Phase::Error | Phase::End) {
            return Err(PlayerError::InvalidState {
                operation: "set_looping",
                state: inner.phase.name(),
            });
        }
        inner.looping = looping;
        if let Some(cursor) = &inner.cursor {
            cursor.set_looping(looping);
        }
        Ok(())
    }

    fn prepare_async(&mut self, listener: PlayerListener) -> PlayerResult<()> {
        let (source, prepare_id) = {
            let mut inner = self.lock();
            inner.require("prepare_async", &[Phase::Initialized])?;
            let source = inner
                .source
                .take()
                .ok_or_else(|| PlayerError::DataSource("No data source bound".to_string()))?;
            inner.phase = Phase::Preparing;
            (source, inner.prepare_id)
        };

        self.listener = Some(listener.clone());
        let shared = Arc::clone(&self.inner);
        let output_rate = self.sink.sample_rate();

        let spawned = thread::Builder::new()
            .name("bgm-prepare".to_string())
            .spawn(move || {
                let name = source.name().to_string();
                let extension = source.extension().map(str::to_owned);
                let result = guarded(&name, || {
                    decode_source(Box::new(source), extension.as_deref())
                        .and_then(|track| Resampler::resample_track(track, output_rate))
                });

                let outcome = {
                    let mut inner = shared.lock().unwrap_or_else(PoisonError::into_inner);
                    if inner.prepare_id != prepare_id {
                        debug!("Discarding prepare result for {} (player was reset)", name);
                        return;
                    }
                    match result {
                        Ok(track) => {
                            info!("Prepared {} ({}ms @ {}Hz)", name, track.duration_ms(), track.sample_rate);
                            inner.track = Some(Arc::new(track));
                            inner.phase = Phase::Prepared;
                            Ok(())
                        }
                        Err(message) => {
                            inner.phase = Phase::Error;
                            Err(message)
                        }
                    }
                };

                match outcome {
                    Ok(()) => listener.prepared(),
                    Err(message) => listener.error(message),
                }
            });

        if let Err(e) = spawned {
            self.lock().phase = Phase::Error;
            return Err(PlayerError::Output(format!("Failed to spawn prepare thread: {}", e)));
        }
        Ok(())
    }

    fn start(&mut self) -> PlayerResult<()> {
        let phase = self.lock().require(
            "start",
            &[Phase::Prepared, Phase::Started, Phase::Paused, Phase::PlaybackCompleted],
        )?;
        match phase {
            Phase::Started => Ok(()),
            Phase::Paused => {
                self.sink.play().map_err(|e| PlayerError::Output(e.to_string()))?;
                self.lock().phase = Phase::Started;
                Ok(())
            }
            _ => self.play_from_start(),
        }
    }

    fn pause(&mut self) -> PlayerResult<()> {
        self.lock()
            .require("pause", &[Phase::Started, Phase::Paused, Phase::PlaybackCompleted])?;
        self.sink.pause().map_err(|e| PlayerError::Output(e.to_string()))?;
        self.lock().phase = Phase::Paused;
        Ok(())
    }

    fn stop(&mut self) -> PlayerResult<()> {
        self.lock().require(
            "stop",
            &[
                Phase::Prepared,
                Phase::Started,
                Phase::Paused,
                Phase::Stopped,
                Phase::PlaybackCompleted,
            ],
        )?;
        self.sink.unload();
        let mut inner = self.lock();
        inner.cursor = None;
        inner.phase = Phase::Stopped;
        Ok(())
    }

    fn reset(&mut self) {
        self.sink.set_fault_handler(None);
        self.sink.unload();
        self.listener = None;
        let mut inner = self.lock();
        if inner.phase == Phase::End {
            return;
        }
        inner.prepare_id = inner.prepare_id.wrapping_add(1);
        inner.source = None;
        inner.track = None;
        inner.cursor = None;
        inner.looping = false;
        inner.phase = Phase::Idle;
    }

    fn release(&mut self) {
        self.reset();
        self.lock().phase = Phase::End;
    }

    fn is_playing(&self) -> PlayerResult<bool> {
        let inner = self.lock();
        match inner.effective_phase() {
            Phase::End => Err(PlayerError::InvalidState {
                operation: "is_playing",
                state: Phase::End.name(),
            }),
            Phase::Started => Ok(self.sink.is_playing()),
            _ => Ok(false),
        }
    }
}

/// Run decoder work, turning both errors and panics into a message
fn guarded<T>(name: &str, work: impl FnOnce() -> Result<T>) -> std::result::Result<T, String> {
    match panic::catch_unwind(AssertUnwindSafe(work)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(format!("{}: {}", name, e)),
        Err(payload) => Err(format!("{}: decoder panicked: {}", name, panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}

/// Sink fault handler: moves the player to Error and reports through the listener
///
/// Faults arriving after a reset belong to an old source and are dropped.
fn fault_handler(inner: Arc<Mutex<Inner>>, prepare_id: u64, listener: PlayerListener) -> FaultHandler {
    Arc::new(move |message: String| {
        {
            let mut inner = inner.lock().unwrap_or_else(PoisonError::into_inner);
            if inner.prepare_id != prepare_id || matches!(inner.phase, Phase::Error | Phase::End) {
                return;
            }
            inner.phase = Phase::Error;
        }
        warn!("Output fault: {}", message);
        listener.error(message);
    })
}

/// Builds symphonia players with the configured output
#[derive(Debug, Clone, Default)]
pub struct SymphoniaPlayerFactory {
    output: OutputConfig,
}

impl SymphoniaPlayerFactory {
    pub fn new(output: OutputConfig) -> Self {
        Self { output }
    }

    #[cfg(feature = "device-output")]
    fn open_sink(&self) -> Box<dyn AudioSink> {
        if self.output.null_output {
            return Box::new(NullSink::new(NULL_SINK_SAMPLE_RATE));
        }
        match crate::audio::output::CpalSink::open(self.output.device.clone()) {
            Ok(sink) => Box::new(sink),
            Err(e) => {
                warn!("Audio device unavailable, playing to null output: {}", e);
                Box::new(NullSink::new(NULL_SINK_SAMPLE_RATE))
            }
        }
    }

    #[cfg(not(feature = "device-output"))]
    fn open_sink(&self) -> Box<dyn AudioSink> {
        if !self.output.null_output {
            warn!("Built without device-output feature, playing to null output");
        }
        Box::new(NullSink::new(NULL_SINK_SAMPLE_RATE))
    }
}

impl PlayerFactory for SymphoniaPlayerFactory {
    fn create(&self) -> PlayerResult<Box<dyn MediaPlayer>> {
        Ok(Box::new(SymphoniaPlayer::new(self.open_sink())))
    }
}
