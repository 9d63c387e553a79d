//! Audio decoding using Symphonia.

use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

use super::segment::AudioSegment;
use crate::error::{Result, RunnerError};

/// Decode an audio file into a mono segment.
///
/// Any container and codec enabled in Symphonia is accepted (WAV, FLAC,
/// MP3, OGG/Vorbis). Multi-channel audio is averaged down to mono.
///
/// # Errors
///
/// Returns `FileError` if the file can't be opened and `AudioError` if it
/// holds no decodable audio track.
pub fn decode_audio<P: AsRef<Path>>(path: P) -> Result<AudioSegment> {
    let path = path.as_ref();
    debug!("Decoding audio file: {}", path.display());

    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| {
            RunnerError::AudioError(format!("Unsupported audio {}: {e}", path.display()))
        })?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| {
            RunnerError::AudioError(format!("No audio track in {}", path.display()))
        })?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let mut channels = track
        .codec_params
        .channels
        .map(|c| c.count())
        .unwrap_or(1);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| RunnerError::AudioError(format!("Unsupported codec: {e}")))?;

    let mut interleaved: Vec<f32> = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => {
                return Err(RunnerError::AudioError(format!("Failed to read packet: {e}")));
            }
        };
        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate = spec.rate;
                channels = spec.channels.count();
                let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buf.copy_interleaved_ref(decoded);
                interleaved.extend_from_slice(buf.samples());
            }
            Err(SymphoniaError::DecodeError(msg)) => {
                warn!("Skipping undecodable packet: {}", msg);
            }
            Err(e) => {
                return Err(RunnerError::AudioError(format!("Failed to decode: {e}")));
            }
        }
    }

    if sample_rate == 0 {
        return Err(RunnerError::AudioError(format!(
            "Unknown sample rate in {}",
            path.display()
        )));
    }

    let samples = downmix(&interleaved, channels);
    debug!(
        "Decoded {} samples at {}Hz from {} channel(s)",
        samples.len(),
        sample_rate,
        channels
    );
    Ok(AudioSegment::new(samples, sample_rate))
}

/// Average interleaved channels down to mono.
pub fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}
