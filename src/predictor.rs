//! Audio classification predictor.
//!
//! Loads the predictor configuration, label list and model, then classifies
//! audio: decode, resample, normalise loudness, extract features, run the
//! model, softmax, argmax.

use std::path::{Path, PathBuf};
use tracing::debug;

use crate::audio::{decode_audio, AudioSegment};
use crate::backends::{create_backend, BackendConfig, InferenceBackend};
use crate::config::{AudioParams, PredictorConfig};
use crate::error::{Result, RunnerError};
use crate::features::AudioFeaturizer;
use crate::types::Prediction;

/// Config file looked up under the model root.
pub const DEFAULT_CONFIG: &str = "config/resnet_se.yml";

/// Model directory looked up under the model root.
pub const DEFAULT_MODEL_DIR: &str = "model";

/// Decimal places kept in the reported confidence.
pub const CONFIDENCE_DECIMALS: i32 = 5;

/// Where to find the predictor's files.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictorOptions {
    /// Root directory; relative label paths are resolved against it
    pub root: PathBuf,
    /// YAML configuration file
    pub configs: PathBuf,
    /// Model file or directory
    pub model_path: PathBuf,
    /// Run on the GPU
    pub use_gpu: bool,
}

impl PredictorOptions {
    /// Default layout under `root`: `config/resnet_se.yml` and `model/`.
    pub fn from_root<P: AsRef<Path>>(root: P) -> Self {
        let root = root.as_ref().to_path_buf();
        Self {
            configs: root.join(DEFAULT_CONFIG),
            model_path: root.join(DEFAULT_MODEL_DIR),
            root,
            use_gpu: false,
        }
    }
}

/// Classifies audio files with an exported model.
pub struct Predictor {
    audio: AudioParams,
    featurizer: AudioFeaturizer,
    labels: Vec<String>,
    backend: Box<dyn InferenceBackend>,
}

impl Predictor {
    /// Load the configuration, labels and model described by `options`.
    pub fn new(options: &PredictorOptions) -> Result<Self> {
        let config = PredictorConfig::from_file(&options.configs)?;

        let model_dir = if options.model_path.is_dir() {
            options.model_path.as_path()
        } else {
            options.model_path.parent().unwrap_or(Path::new("."))
        };
        let labels = config.load_labels(&options.root, model_dir)?;

        let backend = create_backend(BackendConfig::Onnx {
            path: options.model_path.clone(),
            use_gpu: options.use_gpu,
        })?;
        debug!("Loaded model from {:?}", backend.path());

        Self::with_backend(&config, labels, backend)
    }

    /// Build a predictor around an already constructed backend.
    pub fn with_backend(
        config: &PredictorConfig,
        labels: Vec<String>,
        backend: Box<dyn InferenceBackend>,
    ) -> Result<Self> {
        let featurizer = AudioFeaturizer::new(config.feature_method()?)?;

        if labels.is_empty() {
            return Err(RunnerError::ConfigError("No class labels".to_string()));
        }

        let params = backend.parameters();
        if let Some(dim) = params.feature_dim {
            if dim != featurizer.feature_dim() {
                return Err(RunnerError::ModelLoadError(format!(
                    "Model expects {dim} features per frame but the featurizer produces {}",
                    featurizer.feature_dim()
                )));
            }
        }
        if let Some(classes) = params.num_classes {
            if classes != labels.len() {
                return Err(RunnerError::ModelLoadError(format!(
                    "Model has {classes} outputs but there are {} labels",
                    labels.len()
                )));
            }
        }

        Ok(Self {
            audio: config.dataset_conf.audio(),
            featurizer,
            labels,
            backend,
        })
    }

    /// Class labels, indexed by model output.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Classify an audio file.
    pub fn predict<P: AsRef<Path>>(&mut self, path: P) -> Result<Prediction> {
        let segment = decode_audio(path)?;
        self.predict_segment(segment)
    }

    /// Classify mono samples already in memory.
    pub fn predict_samples(&mut self, samples: Vec<f32>, sample_rate: u32) -> Result<Prediction> {
        self.predict_segment(AudioSegment::new(samples, sample_rate))
    }

    fn predict_segment(&mut self, mut segment: AudioSegment) -> Result<Prediction> {
        segment.resample(self.audio.sample_rate)?;
        if self.audio.use_db_normalization {
            segment.normalize(self.audio.target_db)?;
        }

        let duration = segment.duration();
        if duration < self.audio.min_duration {
            return Err(RunnerError::AudioTooShort {
                actual: duration,
                minimum: self.audio.min_duration,
            });
        }
        if duration > self.audio.max_duration {
            debug!(
                "Input is {:.2}s, longer than the {:.2}s seen in training",
                duration, self.audio.max_duration
            );
        }

        let features = self.featurizer.extract(segment.samples())?;
        debug!("Extracted features {:?}", features.dim());

        let logits = self.backend.infer(&features)?;
        classify(&logits, &self.labels)
    }
}

impl std::fmt::Debug for Predictor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Predictor")
            .field("audio", &self.audio)
            .field("featurizer", &self.featurizer)
            .field("labels", &self.labels)
            .field("backend", &"<backend>")
            .finish()
    }
}

/// Numerically stable softmax.
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Pick the most probable class from raw logits.
pub fn classify(logits: &[f32], labels: &[String]) -> Result<Prediction> {
    if logits.is_empty() {
        return Err(RunnerError::InferenceError("Model produced no output".to_string()));
    }
    if logits.len() != labels.len() {
        return Err(RunnerError::InferenceError(format!(
            "Model produced {} scores for {} labels",
            logits.len(),
            labels.len()
        )));
    }

    if let Some(bad) = logits.iter().find(|l| !l.is_finite()) {
        return Err(RunnerError::InferenceError(format!(
            "Model produced a non-finite score: {bad}"
        )));
    }

    let probs = softmax(logits);
    let (index, &score) = probs
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .ok_or_else(|| RunnerError::InferenceError("Model produced no output".to_string()))?;
    if !score.is_finite() {
        return Err(RunnerError::InferenceError(format!(
            "Class probability is not finite: {score}"
        )));
    }

    Ok(Prediction {
        class_id: labels[index].clone(),
        index,
        confidence: round_to(score as f64, CONFIDENCE_DECIMALS),
    })
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(n: usize) -> Vec<String> {
        (0..n).map(|i| i.to_string()).collect()
    }

    #[test]
    fn test_softmax_sums_to_one() {
        let probs = softmax(&[1.0, 2.0, 3.0]);
        assert!((probs.iter().sum::<f32>() - 1.0).abs() < 1e-6);
        assert!(probs[2] > probs[1] && probs[1] > probs[0]);
    }

    #[test]
    fn test_softmax_large_logits() {
        let probs = softmax(&[1000.0, 1000.0]);
        assert!((probs[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_classify_picks_max() {
        let prediction = classify(&[0.1, 0.2, 5.0], &labels(3)).unwrap();
        assert_eq!(prediction.class_id, "2");
        assert_eq!(prediction.index, 2);
        assert!(prediction.confidence > 0.9);
    }

    #[test]
    fn test_confidence_rounded_to_five_places() {
        let prediction = classify(&[0.0, 1.0], &labels(2)).unwrap();
        // softmax([0, 1])[1] = 0.7310585...
        assert_eq!(prediction.confidence, 0.73106);
    }

    #[test]
    fn test_classify_length_mismatch() {
        let result = classify(&[0.1, 0.2], &labels(3));
        assert!(matches!(result, Err(RunnerError::InferenceError(_))));
    }

    #[test]
    fn test_classify_empty() {
        let result = classify(&[], &[]);
        assert!(matches!(result, Err(RunnerError::InferenceError(_))));
    }

    #[test]
    fn test_classify_rejects_nan() {
        let result = classify(&[f32::NAN, 0.0, 1.0], &labels(3));
        assert!(matches!(result, Err(RunnerError::InferenceError(_))));
    }

    #[test]
    fn test_classify_rejects_infinite_logits() {
        let result = classify(&[f32::NEG_INFINITY; 3], &labels(3));
        assert!(matches!(result, Err(RunnerError::InferenceError(_))));

        let result = classify(&[0.0, f32::INFINITY, 1.0], &labels(3));
        assert!(matches!(result, Err(RunnerError::InferenceError(_))));
    }

    #[test]
    fn test_default_options() {
        let options = PredictorOptions::from_root("/srv/water");
        assert_eq!(options.configs, PathBuf::from("/srv/water/config/resnet_se.yml"));
        assert_eq!(options.model_path, PathBuf::from("/srv/water/model"));
        assert!(!options.use_gpu);
    }
}
