//! ONNX Runtime backend implementation
//!
//! Runs an exported audio classifier. The model takes a single
//! `[batch, frames, feature_dim]` f32 input and its first output holds one
//! logit per class.

use ndarray::{Array2, Axis};
#[cfg(feature = "cuda")]
use ort::execution_providers::CUDAExecutionProvider;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::{TensorRef, ValueType};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{BackendConfig, InferenceBackend};
use crate::error::RunnerError;
use crate::types::ModelParameters;

/// ONNX Runtime backend
pub struct OnnxBackend {
    /// Path to the .onnx file
    path: PathBuf,
    /// ONNX Runtime session
    session: Session,
    /// Tensor names and static dimensions read from the graph
    parameters: ModelParameters,
}

impl OnnxBackend {
    /// Create a new ONNX backend
    pub fn new(config: BackendConfig) -> Result<Self, RunnerError> {
        let BackendConfig::Onnx { path, use_gpu } = config;

        if !path.is_file() {
            return Err(RunnerError::ModelLoadError(format!(
                "Model file not found: {}",
                path.display()
            )));
        }

        #[cfg(not(feature = "cuda"))]
        if use_gpu {
            return Err(RunnerError::InvalidOperation(
                "GPU inference not enabled. Enable the 'cuda' feature.".to_string(),
            ));
        }

        #[allow(unused_mut)]
        let mut builder = Session::builder().map_err(|e| {
            RunnerError::ModelLoadError(format!("Failed to create session builder: {e}"))
        })?;

        #[cfg(feature = "cuda")]
        if use_gpu {
            builder = builder
                .with_execution_providers([CUDAExecutionProvider::default()
                    .build()
                    .error_on_failure()])
                .map_err(|e| {
                    RunnerError::ModelLoadError(format!("Failed to register CUDA EP: {e}"))
                })?;
        }

        debug!("Loading ONNX model from {}", path.display());
        let session = builder
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| {
                RunnerError::ModelLoadError(format!("Failed to set optimization level: {e}"))
            })?
            .commit_from_file(&path)
            .map_err(|e| RunnerError::ModelLoadError(format!("Failed to load model: {e}")))?;

        let parameters = Self::read_parameters(&session)?;
        debug!("Model parameters: {:?}", parameters);

        Ok(Self {
            path,
            session,
            parameters,
        })
    }

    fn read_parameters(session: &Session) -> Result<ModelParameters, RunnerError> {
        let input = session
            .inputs
            .first()
            .ok_or_else(|| RunnerError::ModelLoadError("Model has no inputs".to_string()))?;
        let output = session
            .outputs
            .first()
            .ok_or_else(|| RunnerError::ModelLoadError("Model has no outputs".to_string()))?;

        Ok(ModelParameters {
            input_name: input.name.clone(),
            output_name: output.name.clone(),
            feature_dim: static_last_dim(&input.input_type),
            num_classes: static_last_dim(&output.output_type),
        })
    }
}

/// Last tensor dimension, if the graph fixes it.
fn static_last_dim(value_type: &ValueType) -> Option<usize> {
    value_type
        .tensor_shape()
        .and_then(|shape| shape.last().copied())
        .filter(|&d| d > 0)
        .map(|d| d as usize)
}

impl InferenceBackend for OnnxBackend {
    fn new(config: BackendConfig) -> Result<Self, RunnerError> {
        Self::new(config)
    }

    fn infer(&mut self, features: &Array2<f32>) -> Result<Vec<f32>, RunnerError> {
        if let Some(dim) = self.parameters.feature_dim {
            if dim != features.ncols() {
                return Err(RunnerError::InferenceError(format!(
                    "Model expects {dim} features per frame, got {}",
                    features.ncols()
                )));
            }
        }

        let batch = features.view().insert_axis(Axis(0));
        let batch = batch.as_standard_layout();
        let input_tensor = TensorRef::from_array_view(&batch).map_err(|e| {
            RunnerError::InferenceError(format!("Failed to create input tensor: {e}"))
        })?;

        let inputs = ort::inputs![self.parameters.input_name.as_str() => input_tensor];
        let outputs = self
            .session
            .run(inputs)
            .map_err(|e| RunnerError::InferenceError(format!("Inference failed: {e}")))?;

        let output_name = self.parameters.output_name.as_str();
        let output = outputs.get(output_name).ok_or_else(|| {
            RunnerError::InferenceError(format!("Output '{output_name}' not found"))
        })?;
        let (_, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| RunnerError::InferenceError(format!("Failed to extract output: {e}")))?;

        Ok(data.to_vec())
    }

    fn parameters(&self) -> &ModelParameters {
        &self.parameters
    }

    fn path(&self) -> Option<&Path> {
        Some(&self.path)
    }
}

impl std::fmt::Debug for OnnxBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxBackend")
            .field("path", &self.path)
            .field("parameters", &self.parameters)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_not_found() {
        let result = OnnxBackend::new(BackendConfig::Onnx {
            path: PathBuf::from("nonexistent.onnx"),
            use_gpu: false,
        });
        assert!(matches!(result, Err(RunnerError::ModelLoadError(_))));
    }

    #[test]
    fn test_corrupt_model() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inference.onnx");
        std::fs::write(&path, b"not a protobuf").unwrap();

        let result = OnnxBackend::new(BackendConfig::Onnx {
            path,
            use_gpu: false,
        });
        assert!(matches!(result, Err(RunnerError::ModelLoadError(_))));
    }

    #[cfg(not(feature = "cuda"))]
    #[test]
    fn test_gpu_requires_feature() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inference.onnx");
        std::fs::write(&path, b"x").unwrap();

        let result = OnnxBackend::new(BackendConfig::Onnx {
            path,
            use_gpu: true,
        });
        assert!(matches!(result, Err(RunnerError::InvalidOperation(_))));
    }
}
