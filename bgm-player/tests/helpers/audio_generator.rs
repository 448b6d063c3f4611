//! Audio test file generation
//!
//! Deterministic WAV files for exercising the real decode path.

use hound::{WavSpec, WavWriter};
use std::f32::consts::PI;
use std::path::Path;

/// Generate a silent stereo 16-bit WAV file
pub fn generate_silent_wav<P: AsRef<Path>>(path: P, sample_rate: u32, duration_ms: u64) -> Result<(), hound::Error> {
    let spec = WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)?;
    let total_samples = (sample_rate as u64 * duration_ms) / 1000 * 2;
    for _ in 0..total_samples {
        writer.write_sample(0i16)?;
    }

    writer.finalize()?;
    Ok(())
}

/// Generate a sine wave WAV file with `channels` identical channels
///
/// # Example
/// ```no_run
/// # use std::path::Path;
/// // 250ms of 440 Hz at half amplitude, mono, 48 kHz
/// generate_sine_wav(Path::new("/tmp/sine.wav"), 48000, 1, 250, 440.0, 0.5)?;
/// # Ok::<(), hound::Error>(())
/// ```
pub fn generate_sine_wav<P: AsRef<Path>>(
    path: P,
    sample_rate: u32,
    channels: u16,
    duration_ms: u64,
    frequency_hz: f32,
    amplitude: f32,
) -> Result<(), hound::Error> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)?;
    let total_frames = (sample_rate as u64 * duration_ms) / 1000;
    let amplitude_i16 = amplitude * i16::MAX as f32;

    for frame_idx in 0..total_frames {
        let t = frame_idx as f32 / sample_rate as f32;
        let sample = ((2.0 * PI * frequency_hz * t).sin() * amplitude_i16) as i16;
        for _ in 0..channels {
            writer.write_sample(sample)?;
        }
    }

    writer.finalize()?;
    Ok(())
}
