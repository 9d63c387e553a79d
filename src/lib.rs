//! Audio risk runner.
//!
//! Classifies an audio recording with an exported ONNX model and maps the
//! predicted class to a risk tier:
//!
//! | class | risk level |
//! |-------|------------|
//! | `"2"` | 高风险 (high) |
//! | `"1"` | 无风险 (none) |
//! | other | 低风险 (low) |
//!
//! ```no_run
//! use audio_risk_runner::{Predictor, PredictorOptions, RiskReport};
//!
//! let mut predictor = Predictor::new(&PredictorOptions::from_root("/opt/water"))?;
//! let prediction = predictor.predict("recording.wav")?;
//! let report = RiskReport::from_prediction(&prediction, false)?;
//! println!("{}", report.to_json()?);
//! # Ok::<(), audio_risk_runner::RunnerError>(())
//! ```

pub mod audio;
pub mod backends;
pub mod cli;
pub mod config;
mod error;
pub mod features;
pub mod predictor;
pub mod types;

pub use backends::{create_backend, BackendConfig, InferenceBackend};
pub use config::PredictorConfig;
pub use error::{Result, RunnerError};
pub use predictor::{Predictor, PredictorOptions};
pub use types::{ModelParameters, Prediction, RiskLevel, RiskReport};
