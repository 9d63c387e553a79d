//! Audio input.
//!
//! Decoding of audio files into mono `f32` samples and the conditioning
//! applied before feature extraction: resampling to the model rate and
//! loudness normalisation.

pub mod decoder;
pub mod segment;

pub use decoder::decode_audio;
pub use segment::AudioSegment;
