//! Predictor configuration.
//!
//! The predictor is driven by a YAML file (usually `config/resnet_se.yml`)
//! with three sections: `dataset_conf` for audio conditioning and the label
//! list, `preprocess_conf` for feature extraction, and `model_conf` for the
//! classifier. Every key is optional.

use serde::Deserialize;
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{Result, RunnerError};
use crate::features::{FbankOptions, FeatureMethod, StftOptions};

/// Label list looked up next to the model when the config names none.
pub const DEFAULT_LABEL_LIST: &str = "label_list.txt";

/// Top-level predictor configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PredictorConfig {
    /// Audio conditioning and label list
    pub dataset_conf: DatasetConf,
    /// Feature extraction
    pub preprocess_conf: PreprocessConf,
    /// Classifier description
    pub model_conf: ModelConf,
}

/// Audio conditioning parameters.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioParams {
    /// Sample rate the model was trained on
    pub sample_rate: u32,
    /// Shortest accepted input in seconds
    pub min_duration: f32,
    /// Longest input seen in training, in seconds
    pub max_duration: f32,
    /// Whether to normalise loudness before feature extraction
    #[serde(rename = "use_dB_normalization")]
    pub use_db_normalization: bool,
    /// Target RMS loudness in dBFS
    #[serde(rename = "target_dB")]
    pub target_db: f32,
}

impl Default for AudioParams {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            min_duration: 0.4,
            max_duration: 3.0,
            use_db_normalization: true,
            target_db: -20.0,
        }
    }
}

/// Audio parameters given under the nested `dataset` key. Each key that is
/// present overrides the flat value of the same name.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioOverrides {
    pub sample_rate: Option<u32>,
    pub min_duration: Option<f32>,
    pub max_duration: Option<f32>,
    #[serde(rename = "use_dB_normalization")]
    pub use_db_normalization: Option<bool>,
    #[serde(rename = "target_dB")]
    pub target_db: Option<f32>,
}

impl AudioOverrides {
    fn apply(&self, params: &mut AudioParams) {
        if let Some(v) = self.sample_rate {
            params.sample_rate = v;
        }
        if let Some(v) = self.min_duration {
            params.min_duration = v;
        }
        if let Some(v) = self.max_duration {
            params.max_duration = v;
        }
        if let Some(v) = self.use_db_normalization {
            params.use_db_normalization = v;
        }
        if let Some(v) = self.target_db {
            params.target_db = v;
        }
    }
}

/// The `dataset_conf` section.
///
/// Audio parameters may sit under a nested `dataset` key or directly in the
/// section. A key present in both places takes the nested value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DatasetConf {
    /// Nested audio parameters
    pub dataset: Option<AudioOverrides>,
    /// Flat audio parameters
    #[serde(flatten)]
    pub flat: AudioParams,
    /// Path to the label list, one label per line
    pub label_list_path: Option<PathBuf>,
}

impl DatasetConf {
    /// Effective audio parameters.
    pub fn audio(&self) -> AudioParams {
        let mut params = self.flat;
        if let Some(nested) = &self.dataset {
            nested.apply(&mut params);
        }
        params
    }
}

/// The `preprocess_conf` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PreprocessConf {
    /// Feature method name: `Fbank`, `MelSpectrogram` or `Spectrogram`
    pub feature_method: String,
    /// Method-specific arguments
    pub method_args: BTreeMap<String, Value>,
}

impl Default for PreprocessConf {
    fn default() -> Self {
        Self {
            feature_method: "Fbank".to_string(),
            method_args: BTreeMap::new(),
        }
    }
}

/// The `model_conf` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ModelConf {
    /// Architecture name, informational only
    pub model: Option<String>,
    /// Architecture arguments
    pub model_args: BTreeMap<String, Value>,
}

impl ModelConf {
    /// Number of classes declared in `model_args.num_class`, if any.
    pub fn num_class(&self) -> Option<usize> {
        self.model_args
            .get("num_class")
            .and_then(Value::as_u64)
            .map(|n| n as usize)
    }
}

impl PredictorConfig {
    /// Load a configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading predictor config from {}", path.display());
        let text = fs::read_to_string(path).map_err(|e| {
            RunnerError::ConfigError(format!("Failed to read {}: {e}", path.display()))
        })?;
        Self::from_yaml(&text)
    }

    /// Parse a configuration from YAML text.
    pub fn from_yaml(text: &str) -> Result<Self> {
        // An empty document deserializes as null.
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let audio = self.dataset_conf.audio();
        if audio.sample_rate == 0 {
            return Err(RunnerError::ConfigError(
                "sample_rate must be positive".to_string(),
            ));
        }
        if audio.min_duration < 0.0 {
            return Err(RunnerError::ConfigError(
                "min_duration must not be negative".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolve the feature method and its parameters.
    pub fn feature_method(&self) -> Result<FeatureMethod> {
        let args = &self.preprocess_conf.method_args;
        let sample_rate = self.dataset_conf.audio().sample_rate;

        match self.preprocess_conf.feature_method.as_str() {
            "Fbank" => {
                let mut opts = FbankOptions {
                    sample_frequency: sample_rate as f32,
                    ..FbankOptions::default()
                };
                read_f32(args, "sample_frequency", &mut opts.sample_frequency);
                read_usize(args, "num_mel_bins", &mut opts.num_mel_bins);
                read_f32(args, "frame_length", &mut opts.frame_length_ms);
                read_f32(args, "frame_shift", &mut opts.frame_shift_ms);
                read_f32(args, "low_freq", &mut opts.low_freq);
                read_f32(args, "high_freq", &mut opts.high_freq);
                read_f32(args, "preemphasis_coefficient", &mut opts.preemphasis);
                if let Some(flag) = args.get("remove_dc_offset").and_then(Value::as_bool) {
                    opts.remove_dc_offset = flag;
                }
                Ok(FeatureMethod::Fbank(opts))
            }
            method @ ("MelSpectrogram" | "Spectrogram") => {
                let mut opts = StftOptions {
                    sample_rate,
                    ..StftOptions::default()
                };
                if let Some(rate) = args.get("sample_rate").and_then(Value::as_u64) {
                    opts.sample_rate = rate as u32;
                }
                read_usize(args, "n_fft", &mut opts.n_fft);
                // torchaudio defaults: win_length = n_fft, hop_length = win_length / 2
                opts.win_length = opts.n_fft;
                read_usize(args, "win_length", &mut opts.win_length);
                opts.hop_length = opts.win_length / 2;
                read_usize(args, "hop_length", &mut opts.hop_length);
                read_f32(args, "f_min", &mut opts.f_min);
                read_f32(args, "f_max", &mut opts.f_max);
                read_usize(args, "n_mels", &mut opts.n_mels);

                if method == "MelSpectrogram" {
                    Ok(FeatureMethod::MelSpectrogram(opts))
                } else {
                    Ok(FeatureMethod::Spectrogram(opts))
                }
            }
            other => Err(RunnerError::ConfigError(format!(
                "Unsupported feature method: {other}"
            ))),
        }
    }

    /// Load the class labels.
    ///
    /// A relative `label_list_path` is resolved against `root`. Without a
    /// configured path, `<model_dir>/label_list.txt` is used when present,
    /// otherwise the labels are the class indices.
    pub fn load_labels(&self, root: &Path, model_dir: &Path) -> Result<Vec<String>> {
        let path = match &self.dataset_conf.label_list_path {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => root.join(path),
            None => {
                let candidate = model_dir.join(DEFAULT_LABEL_LIST);
                if candidate.is_file() {
                    candidate
                } else {
                    let count = self.model_conf.num_class().ok_or_else(|| {
                        RunnerError::ConfigError(
                            "No label list configured and model_args.num_class is missing"
                                .to_string(),
                        )
                    })?;
                    warn!("No label list found, using class indices as labels");
                    return Ok((0..count).map(|i| i.to_string()).collect());
                }
            }
        };

        let labels = read_label_list(&path)?;
        if let Some(count) = self.model_conf.num_class() {
            if count != labels.len() {
                return Err(RunnerError::ConfigError(format!(
                    "model_args.num_class is {count} but {} lists {} labels",
                    path.display(),
                    labels.len()
                )));
            }
        }
        Ok(labels)
    }
}

/// Read a label list, one label per line. Blank lines are skipped.
pub fn read_label_list(path: &Path) -> Result<Vec<String>> {
    let text = fs::read_to_string(path).map_err(|e| {
        RunnerError::ConfigError(format!(
            "Failed to read label list {}: {e}",
            path.display()
        ))
    })?;
    let labels: Vec<String> = text
        .lines()
        .map(|line| line.trim_end_matches('\r').to_string())
        .filter(|line| !line.trim().is_empty())
        .collect();

    if labels.is_empty() {
        return Err(RunnerError::ConfigError(format!(
            "Label list {} is empty",
            path.display()
        )));
    }
    Ok(labels)
}

fn read_f32(args: &BTreeMap<String, Value>, key: &str, slot: &mut f32) {
    if let Some(v) = args.get(key).and_then(Value::as_f64) {
        *slot = v as f32;
    }
}

fn read_usize(args: &BTreeMap<String, Value>, key: &str, slot: &mut usize) {
    if let Some(v) = args.get(key).and_then(Value::as_u64) {
        *slot = v as usize;
    }
}
