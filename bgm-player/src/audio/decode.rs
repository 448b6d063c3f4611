//! Track decoding using symphonia
//!
//! Decodes a whole asset to interleaved stereo f32 before playback starts.
//! Background tracks are short loops, so the full decode happens once per
//! prepare and playback only reads memory afterwards.

use super::{PcmTrack, CHANNELS};
use crate::error::{Error, Result};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

/// Decode an entire media source to stereo PCM
///
/// `extension` is a format hint (e.g. `"mp3"`); probing still works without it.
///
/// # Errors
/// - Unsupported or unrecognised container
/// - No decodable audio track
/// - Track decodes to zero frames
pub fn decode_source(source: Box<dyn MediaSource>, extension: Option<&str>) -> Result<PcmTrack> {
    let mss = MediaSourceStream::new(source, Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| Error::Decode(format!("Failed to probe format: {}", e)))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| Error::Decode("No audio track found".to_string()))?;

    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| Error::Decode("Sample rate not found".to_string()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| Error::Decode(format!("Failed to create decoder: {}", e)))?;

    let mut samples = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                debug!("Reached end of stream");
                break;
            }
            Err(e) => {
                warn!("Error reading packet: {}", e);
                break;
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                warn!("Skipping corrupt packet: {}", e);
                continue;
            }
            Err(e) => return Err(Error::Decode(format!("Decode failed: {}", e))),
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count();
        let buf = sample_buf.get_or_insert_with(|| SampleBuffer::new(decoded.capacity() as u64, spec));
        if buf.capacity() < decoded.capacity() * channels {
            *buf = SampleBuffer::new(decoded.capacity() as u64, spec);
        }
        buf.copy_interleaved_ref(decoded);

        append_stereo(buf.samples(), channels, &mut samples);
    }

    let track = PcmTrack::new(samples, sample_rate);
    if track.frames() == 0 {
        return Err(Error::Decode("Track contains no audio frames".to_string()));
    }

    debug!(
        "Decoded {} frames @ {}Hz ({}ms)",
        track.frames(),
        track.sample_rate,
        track.duration_ms()
    );

    Ok(track)
}

/// Append interleaved samples with `channels` channels as stereo
///
/// Mono is duplicated to both sides; more than two channels are averaged
/// into left (even channels) and right (odd channels).
fn append_stereo(input: &[f32], channels: usize, output: &mut Vec<f32>) {
    match channels {
        0 => {}
        1 => {
            output.reserve(input.len() * CHANNELS as usize);
            for &sample in input {
                output.push(sample);
                output.push(sample);
            }
        }
        2 => output.extend_from_slice(input),
        _ => {
            let left_count = channels.div_ceil(2) as f32;
            let right_count = (channels / 2) as f32;
            for frame in input.chunks_exact(channels) {
                let left: f32 = frame.iter().step_by(2).sum();
                let right: f32 = frame.iter().skip(1).step_by(2).sum();
                output.push(left / left_count);
                output.push(right / right_count);
            }
        }
    }
}
