//! Backend abstraction for model inference
//!
//! This module provides a trait-based abstraction over the engine that runs
//! the exported classifier:
//!
//! - **ONNX Backend**: ONNX Runtime session loaded from an `.onnx` file
//!
//! New inference engines can be added by implementing the `InferenceBackend`
//! trait. The predictor only sees `Box<dyn InferenceBackend>`.

use ndarray::Array2;
use std::path::{Path, PathBuf};

use crate::error::RunnerError;
use crate::types::ModelParameters;

pub mod onnx;

/// Model file names tried, in order, inside a model directory.
pub const MODEL_FILE_NAMES: [&str; 2] = ["inference.onnx", "model.onnx"];

/// Configuration for different backend types
#[derive(Debug, Clone)]
pub enum BackendConfig {
    /// ONNX Runtime
    Onnx {
        /// Path to the .onnx file or a directory containing one
        path: PathBuf,
        /// Run on the CUDA execution provider
        use_gpu: bool,
    },
}

/// Trait for inference backends
pub trait InferenceBackend: Send {
    /// Create a new backend instance
    fn new(config: BackendConfig) -> Result<Self, RunnerError>
    where
        Self: Sized;

    /// Run the classifier on `[frames, feature_dim]` features, returning logits
    fn infer(&mut self, features: &Array2<f32>) -> Result<Vec<f32>, RunnerError>;

    /// Get model parameters
    fn parameters(&self) -> &ModelParameters;

    /// Path the model was loaded from, if it came from a file
    fn path(&self) -> Option<&Path>;
}

/// Find the model file for `path`.
///
/// A file must have the `.onnx` extension. A directory must contain one of
/// [`MODEL_FILE_NAMES`] or exactly one `.onnx` file.
pub fn resolve_model_file(path: &Path) -> Result<PathBuf, RunnerError> {
    if path.is_file() {
        return match path.extension() {
            Some(ext) if ext == "onnx" => Ok(path.to_path_buf()),
            _ => Err(RunnerError::InvalidPath),
        };
    }
    if !path.is_dir() {
        return Err(RunnerError::InvalidPath);
    }

    for name in MODEL_FILE_NAMES {
        let candidate = path.join(name);
        if candidate.is_file() {
            return Ok(candidate);
        }
    }

    let mut found: Vec<PathBuf> = std::fs::read_dir(path)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "onnx"))
        .collect();
    match found.len() {
        1 => Ok(found.remove(0)),
        _ => Err(RunnerError::InvalidPath),
    }
}

/// Factory function to create the appropriate backend
pub fn create_backend(config: BackendConfig) -> Result<Box<dyn InferenceBackend>, RunnerError> {
    match config {
        BackendConfig::Onnx { path, use_gpu } => {
            let path = resolve_model_file(&path)?;

            use onnx::OnnxBackend;
            Ok(Box::new(OnnxBackend::new(BackendConfig::Onnx {
                path,
                use_gpu,
            })?))
        }
    }
}
