//! Audio subsystem: decoding, resampling, and output sinks
//!
//! Internal format is interleaved stereo f32.

pub mod decode;
#[cfg(feature = "device-output")]
pub mod output;
pub mod resampler;
pub mod sink;

pub use decode::decode_source;
pub use resampler::Resampler;
pub use sink::{AudioSink, FaultHandler, LoopingCursor, NullSink};

/// Channels in the internal sample format
pub const CHANNELS: u16 = 2;

/// Fully decoded track, interleaved stereo f32
#[derive(Debug, Clone, PartialEq)]
pub struct PcmTrack {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl PcmTrack {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Number of stereo frames
    pub fn frames(&self) -> usize {
        self.samples.len() / CHANNELS as usize
    }

    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.frames() as u64 * 1000 / self.sample_rate as u64
    }
}
