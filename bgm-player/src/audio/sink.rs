//! Output sinks and the looping read cursor shared with them

use super::PcmTrack;
use crate::error::{Error, Result};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Callback fired once when a non-looping cursor runs off the end
pub type EndCallback = Box<dyn FnOnce() + Send>;

/// Called from the output context when the device fails mid-playback
pub type FaultHandler = Arc<dyn Fn(String) + Send + Sync>;

/// Read position over a decoded track
///
/// Read by exactly one consumer (the sink's render path). Looping wraps the
/// position back to the first frame; without looping the cursor renders
/// silence after the last frame and fires its end callback once.
pub struct LoopingCursor {
    track: Arc<PcmTrack>,
    position: AtomicUsize,
    looping: AtomicBool,
    finished: AtomicBool,
    on_end: Mutex<Option<EndCallback>>,
}

impl LoopingCursor {
    pub fn new(track: Arc<PcmTrack>, looping: bool) -> Self {
        Self {
            track,
            position: AtomicUsize::new(0),
            looping: AtomicBool::new(looping),
            finished: AtomicBool::new(false),
            on_end: Mutex::new(None),
        }
    }

    pub fn with_end_callback(self, callback: EndCallback) -> Self {
        *self.on_end.lock().unwrap_or_else(PoisonError::into_inner) = Some(callback);
        self
    }

    pub fn sample_rate(&self) -> u32 {
        self.track.sample_rate
    }

    pub fn set_looping(&self, looping: bool) {
        self.looping.store(looping, Ordering::Relaxed);
    }

    /// Frame index of the next frame to render
    pub fn position(&self) -> usize {
        self.position.load(Ordering::Relaxed)
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Relaxed)
    }

    /// Render interleaved frames with `channels` output channels into `out`
    ///
    /// Returns the number of frames taken from the track; the remainder of
    /// `out` is silence.
    pub fn fill(&self, out: &mut [f32], channels: usize) -> usize {
        if channels == 0 {
            return 0;
        }

        let total = self.track.frames();
        let mut position = self.position.load(Ordering::Relaxed);
        let mut rendered = 0;

        for frame in out.chunks_mut(channels) {
            if position >= total && total > 0 && self.looping.load(Ordering::Relaxed) {
                position = 0;
            }

            if position >= total || self.is_finished() {
                frame.fill(0.0);
                if total > 0 {
                    self.finish();
                }
                continue;
            }

            let left = self.track.samples[position * 2];
            let right = self.track.samples[position * 2 + 1];
            match frame.len() {
                1 => frame[0] = (left + right) * 0.5,
                _ => {
                    frame[0] = left;
                    frame[1] = right;
                    frame[2..].fill(0.0);
                }
            }
            position += 1;
            rendered += 1;
        }

        self.position.store(position, Ordering::Relaxed);
        rendered
    }

    fn finish(&self) {
        if self.finished.swap(true, Ordering::Relaxed) {
            return;
        }
        let callback = self.on_end.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(callback) = callback {
            callback();
        }
    }
}

impl std::fmt::Debug for LoopingCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopingCursor")
            .field("frames", &self.track.frames())
            .field("position", &self.position())
            .field("looping", &self.looping.load(Ordering::Relaxed))
            .field("finished", &self.is_finished())
            .finish()
    }
}

/// Destination for decoded audio
pub trait AudioSink: Send {
    /// Rate tracks must be resampled to before `load`
    fn sample_rate(&self) -> u32;

    /// Attach a track cursor; playback stays paused until `play`
    fn load(&mut self, cursor: Arc<LoopingCursor>) -> Result<()>;

    fn play(&mut self) -> Result<()>;

    fn pause(&mut self) -> Result<()>;

    /// Stop output and drop the cursor
    fn unload(&mut self);

    fn is_playing(&self) -> bool;

    /// Install (or clear) the handler for output faults
    ///
    /// Sinks that cannot fail keep the default.
    fn set_fault_handler(&mut self, _handler: Option<FaultHandler>) {}
}

/// Sink that discards audio
///
/// Used when no output device is configured or available. `render` lets a
/// caller pull audio the way a device callback would.
#[derive(Debug)]
pub struct NullSink {
    sample_rate: u32,
    cursor: Option<Arc<LoopingCursor>>,
    playing: bool,
}

impl NullSink {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            cursor: None,
            playing: false,
        }
    }

    /// Pull stereo frames into `out` while playing; silence otherwise
    pub fn render(&self, out: &mut [f32]) -> usize {
        match (&self.cursor, self.playing) {
            (Some(cursor), true) => cursor.fill(out, 2),
            _ => {
                out.fill(0.0);
                0
            }
        }
    }
}

impl AudioSink for NullSink {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn load(&mut self, cursor: Arc<LoopingCursor>) -> Result<()> {
        self.cursor = Some(cursor);
        self.playing = false;
        Ok(())
    }

    fn play(&mut self) -> Result<()> {
        if self.cursor.is_none() {
            return Err(Error::AudioOutput("No track loaded".to_string()));
        }
        self.playing = true;
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        self.playing = false;
        Ok(())
    }

    fn unload(&mut self) {
        self.playing = false;
        self.cursor = None;
    }

    fn is_playing(&self) -> bool {
        self.playing
    }
}
