//! Common types used throughout the audio risk runner.
//!
//! This module contains the facts read from a loaded model, the raw
//! prediction produced by the predictor, and the risk report printed by the
//! command-line tool.

use serde::Serialize;
use std::fmt;
use tracing::warn;

use crate::error::{Result, RunnerError};

/// Parameters that describe a loaded model.
///
/// These are read from the ONNX graph when the backend is created. Dimensions
/// are `None` when the graph declares them as dynamic.
#[derive(Debug, Clone, Default)]
pub struct ModelParameters {
    /// Name of the input tensor fed with features
    pub input_name: String,
    /// Name of the output tensor read as logits
    pub output_name: String,
    /// Feature dimension the model expects on its last input axis
    pub feature_dim: Option<usize>,
    /// Number of classes on the last output axis
    pub num_classes: Option<usize>,
}

/// Raw output of a single prediction.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    /// Class label from the label list (e.g. "0", "1", "2")
    pub class_id: String,
    /// Index of the winning class
    pub index: usize,
    /// Softmax probability of the winning class, rounded to 5 decimals
    pub confidence: f64,
}

/// Three-tier risk classification reported to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RiskLevel {
    /// Predicted class "2"
    #[serde(rename = "高风险")]
    High,
    /// Predicted class "1"
    #[serde(rename = "无风险")]
    NoRisk,
    /// Any other predicted class
    #[serde(rename = "低风险")]
    Low,
}

impl RiskLevel {
    /// Map a class label to its risk tier, if it has one.
    pub fn classify(class_id: &str) -> Option<Self> {
        match class_id {
            "2" => Some(RiskLevel::High),
            "1" => Some(RiskLevel::NoRisk),
            _ => None,
        }
    }

    /// Map a class label to its risk tier, falling back to `Low`.
    pub fn from_class(class_id: &str) -> Self {
        Self::classify(class_id).unwrap_or(RiskLevel::Low)
    }

    /// Human-readable label as printed in the report.
    pub fn label(&self) -> &'static str {
        match self {
            RiskLevel::High => "高风险",
            RiskLevel::NoRisk => "无风险",
            RiskLevel::Low => "低风险",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The JSON document printed on stdout.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskReport {
    /// Risk tier derived from the predicted class
    pub risk_level: RiskLevel,
    /// Confidence of the predicted class, passed through unchanged
    pub confidence: f64,
}

impl RiskReport {
    /// Build a report from a prediction.
    ///
    /// Classes without a tier are reported as low risk and logged. With
    /// `strict` set they are rejected instead.
    pub fn from_prediction(prediction: &Prediction, strict: bool) -> Result<Self> {
        let risk_level = match RiskLevel::classify(&prediction.class_id) {
            Some(level) => level,
            None if strict => {
                return Err(RunnerError::UnrecognizedClass(prediction.class_id.clone()));
            }
            None => {
                warn!(
                    "Class {:?} has no risk tier, reporting {}",
                    prediction.class_id,
                    RiskLevel::Low
                );
                RiskLevel::Low
            }
        };

        Ok(Self {
            risk_level,
            confidence: prediction.confidence,
        })
    }

    /// Serialize the report as a single JSON line.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prediction(class_id: &str, confidence: f64) -> Prediction {
        Prediction {
            class_id: class_id.to_string(),
            index: 0,
            confidence,
        }
    }

    #[test]
    fn test_class_mapping() {
        assert_eq!(RiskLevel::from_class("2"), RiskLevel::High);
        assert_eq!(RiskLevel::from_class("1"), RiskLevel::NoRisk);
        assert_eq!(RiskLevel::from_class("0"), RiskLevel::Low);
        assert_eq!(RiskLevel::from_class("leak"), RiskLevel::Low);
        assert_eq!(RiskLevel::from_class(""), RiskLevel::Low);
        assert_eq!(RiskLevel::from_class(" 2"), RiskLevel::Low);
    }

    #[test]
    fn test_labels() {
        assert_eq!(RiskLevel::High.to_string(), "高风险");
        assert_eq!(RiskLevel::NoRisk.to_string(), "无风险");
        assert_eq!(RiskLevel::Low.to_string(), "低风险");
    }

    #[test]
    fn test_confidence_passthrough() {
        let report = RiskReport::from_prediction(&prediction("2", 0.87654), false).unwrap();
        assert_eq!(report.risk_level, RiskLevel::High);
        assert_eq!(report.confidence, 0.87654);
    }

    #[test]
    fn test_json_has_exactly_two_keys() {
        let report = RiskReport::from_prediction(&prediction("1", 0.5), false).unwrap();
        let value: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        let object = value.as_object().unwrap();

        assert_eq!(object.len(), 2);
        assert_eq!(object["risk_level"], "无风险");
        assert_eq!(object["confidence"], 0.5);
    }

    #[test]
    fn test_json_is_single_line() {
        let report = RiskReport::from_prediction(&prediction("7", 0.99999), false).unwrap();
        let json = report.to_json().unwrap();
        assert!(!json.contains('\n'));
        assert_eq!(json, r#"{"risk_level":"低风险","confidence":0.99999}"#);
    }

    #[test]
    fn test_strict_rejects_unknown_class() {
        let result = RiskReport::from_prediction(&prediction("3", 0.9), true);
        match result {
            Err(RunnerError::UnrecognizedClass(class)) => assert_eq!(class, "3"),
            other => panic!("Expected UnrecognizedClass, got {:?}", other),
        }

        let report = RiskReport::from_prediction(&prediction("2", 0.9), true).unwrap();
        assert_eq!(report.risk_level, RiskLevel::High);
    }
}
