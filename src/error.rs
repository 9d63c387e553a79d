//! Error types for the audio risk runner.
//!
//! This module defines the errors that can occur while loading the predictor
//! configuration, decoding audio, extracting features and running the model.
//! The main error type is `RunnerError`, which covers every failure the
//! library can report. The command-line binary prints it and exits non-zero.

use thiserror::Error;

/// Represents all possible errors that can occur in the audio risk runner.
///
/// This enum implements the standard Error trait using thiserror. It covers
/// both internal errors and wrapped errors from external dependencies.
#[derive(Error, Debug)]
pub enum RunnerError {
    /// Indicates a failure in file system operations.
    ///
    /// This error occurs when the configuration, label list or audio file
    /// cannot be opened or read.
    #[error("Failed to access file: {0}")]
    FileError(#[from] std::io::Error),

    /// Indicates that the provided model path is invalid.
    ///
    /// This error occurs when:
    /// - The path doesn't exist
    /// - The file extension is not .onnx
    /// - A model directory holds no usable .onnx file
    #[error("Invalid model path")]
    InvalidPath,

    /// Indicates that the predictor configuration is unusable.
    ///
    /// This error occurs when:
    /// - A required value is out of range (zero sample rate, zero bins)
    /// - The label list is empty
    /// - The configured class count disagrees with the label list
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Indicates a failure while decoding or conditioning audio.
    ///
    /// This error occurs when:
    /// - The container or codec is not supported
    /// - The stream contains no audio track
    /// - Resampling fails
    /// - The signal is too quiet to normalise
    #[error("Audio error: {0}")]
    AudioError(String),

    /// Indicates that the audio is shorter than the model accepts.
    #[error("Audio too short: {actual:.3}s, minimum is {minimum:.3}s")]
    AudioTooShort {
        /// Duration of the input in seconds
        actual: f32,
        /// Minimum duration in seconds
        minimum: f32,
    },

    /// Indicates that feature extraction parameters are invalid.
    #[error("Feature extraction error: {0}")]
    FeatureError(String),

    /// Indicates a failure while loading the ONNX model.
    ///
    /// This error occurs when:
    /// - ONNX Runtime can't create a session
    /// - The model file is corrupt
    /// - The model input shape doesn't match the configured features
    #[error("Failed to load model: {0}")]
    ModelLoadError(String),

    /// Indicates a failure during model execution.
    ///
    /// This error occurs when:
    /// - The session run fails
    /// - The model produces no output
    /// - The output size doesn't match the label list
    #[error("Inference failed: {0}")]
    InferenceError(String),

    /// Indicates that an invalid operation was attempted.
    ///
    /// This error occurs when:
    /// - GPU inference is requested without the `cuda` feature
    /// - The backend configuration doesn't match the backend
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Indicates that the model predicted a class with no risk tier.
    ///
    /// Only returned in strict mode. Otherwise such classes fall back to
    /// low risk.
    #[error("Unrecognized class: {0}")]
    UnrecognizedClass(String),

    /// Indicates a failure in JSON serialization.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Indicates a failure in YAML deserialization of the configuration.
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, RunnerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RunnerError::ModelLoadError("test".to_string());
        assert_eq!(err.to_string(), "Failed to load model: test");

        let err = RunnerError::AudioTooShort {
            actual: 0.25,
            minimum: 0.4,
        };
        assert_eq!(err.to_string(), "Audio too short: 0.250s, minimum is 0.400s");
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: RunnerError = io.into();
        assert!(matches!(err, RunnerError::FileError(_)));
    }
}
