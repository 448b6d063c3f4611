//! Audio resampling using rubato
//!
//! Converts a decoded track to the sample rate of the output sink.

use super::{PcmTrack, CHANNELS};
use crate::error::{Error, Result};
use rubato::{FastFixedIn, PolynomialDegree, Resampler as RubatoResampler};
use tracing::debug;

/// Audio resampler using rubato for sample rate conversion.
pub struct Resampler;

impl Resampler {
    /// Resample a stereo track to `output_rate`.
    ///
    /// Returns the track unchanged when it is already at the target rate.
    pub fn resample_track(track: PcmTrack, output_rate: u32) -> Result<PcmTrack> {
        if track.sample_rate == output_rate {
            debug!("Sample rate already at {}Hz, skipping resample", output_rate);
            return Ok(track);
        }
        let samples = Self::resample(&track.samples, track.sample_rate, output_rate, CHANNELS)?;
        Ok(PcmTrack::new(samples, output_rate))
    }

    /// Resample interleaved audio from `input_rate` to `output_rate`.
    pub fn resample(input: &[f32], input_rate: u32, output_rate: u32, channels: u16) -> Result<Vec<f32>> {
        if input_rate == output_rate {
            return Ok(input.to_vec());
        }
        if input_rate == 0 || output_rate == 0 || channels == 0 {
            return Err(Error::Decode(format!(
                "Cannot resample {}Hz -> {}Hz with {} channels",
                input_rate, output_rate, channels
            )));
        }

        debug!(
            "Resampling from {}Hz to {}Hz ({} channels)",
            input_rate, output_rate, channels
        );

        // rubato expects planar input
        let planar_input = Self::deinterleave(input, channels);
        let input_frames = planar_input[0].len();
        if input_frames == 0 {
            return Ok(Vec::new());
        }

        let mut resampler = FastFixedIn::<f32>::new(
            output_rate as f64 / input_rate as f64,
            1.0,
            PolynomialDegree::Septic,
            input_frames,
            channels as usize,
        )
        .map_err(|e| Error::Decode(format!("Failed to create resampler: {}", e)))?;

        let planar_output = resampler
            .process(&planar_input, None)
            .map_err(|e| Error::Decode(format!("Resampling failed: {}", e)))?;

        let interleaved = Self::interleave(planar_output);
        debug!(
            "Resampled {} input frames to {} output frames",
            input_frames,
            interleaved.len() / channels as usize
        );

        Ok(interleaved)
    }

    /// [L, R, L, R, ...] -> [[L, L, ...], [R, R, ...]]
    fn deinterleave(samples: &[f32], channels: u16) -> Vec<Vec<f32>> {
        let num_channels = channels as usize;
        let num_frames = samples.len() / num_channels;
        let mut planar = vec![Vec::with_capacity(num_frames); num_channels];

        for frame in samples.chunks_exact(num_channels) {
            for (channel, sample) in planar.iter_mut().zip(frame) {
                channel.push(*sample);
            }
        }

        planar
    }

    /// [[L, L, ...], [R, R, ...]] -> [L, R, L, R, ...]
    fn interleave(planar: Vec<Vec<f32>>) -> Vec<f32> {
        let Some(first) = planar.first() else {
            return Vec::new();
        };
        let num_frames = first.len();
        let mut interleaved = Vec::with_capacity(num_frames * planar.len());

        for frame_idx in 0..num_frames {
            for channel in &planar {
                interleaved.push(channel[frame_idx]);
            }
        }

        interleaved
    }
}
