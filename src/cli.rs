//! Command-line interface.
//!
//! `audio-risk <AUDIO> <DIR>` classifies one audio file with the model under
//! `DIR` and prints a single JSON line. Logs go to stderr.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::error::Result;
use crate::predictor::{Predictor, PredictorOptions};
use crate::types::RiskReport;

/// CLI arguments parser.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(after_help = r#"Output:
    {"risk_level": "高风险" | "无风险" | "低风险", "confidence": <score>}

Examples:
    audio-risk recording.wav /opt/water
    audio-risk recording.flac /opt/water --use-gpu
    audio-risk recording.wav /opt/water --configs custom.yml --strict"#)]
pub struct Cli {
    /// Audio file to classify
    pub audio: PathBuf,

    /// Directory containing model/ and config/resnet_se.yml
    pub dir: PathBuf,

    /// Predictor configuration [default: <DIR>/config/resnet_se.yml]
    #[arg(long)]
    pub configs: Option<PathBuf>,

    /// Exported model file or directory [default: <DIR>/model/]
    #[arg(long)]
    pub model_path: Option<PathBuf>,

    /// Run inference on the GPU
    #[arg(long, default_value_t = false)]
    pub use_gpu: bool,

    /// Log level written to stderr; RUST_LOG takes precedence
    #[arg(long, default_value = "error")]
    pub log_level: String,

    /// Fail on classes that have no risk tier instead of reporting low risk
    #[arg(long, default_value_t = false)]
    pub strict: bool,
}

impl Cli {
    /// Predictor file locations derived from the arguments.
    pub fn predictor_options(&self) -> PredictorOptions {
        let mut options = PredictorOptions::from_root(&self.dir);
        if let Some(configs) = &self.configs {
            options.configs = configs.clone();
        }
        if let Some(model_path) = &self.model_path {
            options.model_path = model_path.clone();
        }
        options.use_gpu = self.use_gpu;
        options
    }
}

/// Install the stderr log subscriber.
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    // Ignore the error if a subscriber is already installed.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Classify the audio file named by `cli` and build the report.
pub fn run(cli: &Cli) -> Result<RiskReport> {
    let options = cli.predictor_options();
    debug!("Predictor options: {:?}", options);

    let mut predictor = Predictor::new(&options)?;
    let prediction = predictor.predict(&cli.audio)?;
    debug!("Prediction: {:?}", prediction);

    RiskReport::from_prediction(&prediction, cli.strict)
}

/// What the binary prints, and where.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// JSON report line for stdout
    Report(String),
    /// `Error: ...` line for stderr
    Failure(String),
}

impl Outcome {
    /// Render the result of a run.
    pub fn from_result(result: Result<RiskReport>) -> Self {
        match result.and_then(|report| report.to_json()) {
            Ok(json) => Outcome::Report(json),
            Err(e) => Outcome::Failure(format!("Error: {e}")),
        }
    }

    /// Process exit status: 0 for a report, 1 for a failure.
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Outcome::Report(_) => ExitCode::SUCCESS,
            Outcome::Failure(_) => ExitCode::FAILURE,
        }
    }
}

/// Run the classifier and render the result.
pub fn execute(cli: &Cli) -> Outcome {
    Outcome::from_result(run(cli))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RunnerError;
    use crate::types::RiskLevel;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_positional_defaults() {
        let cli = Cli::parse_from(["audio-risk", "pipe.wav", "/opt/water"]);
        assert_eq!(cli.audio, PathBuf::from("pipe.wav"));
        assert_eq!(cli.log_level, "error");
        assert!(!cli.use_gpu);
        assert!(!cli.strict);

        let options = cli.predictor_options();
        assert_eq!(options.root, PathBuf::from("/opt/water"));
        assert_eq!(
            options.configs,
            PathBuf::from("/opt/water/config/resnet_se.yml")
        );
        assert_eq!(options.model_path, PathBuf::from("/opt/water/model"));
    }

    #[test]
    fn test_overrides() {
        let cli = Cli::parse_from([
            "audio-risk",
            "pipe.wav",
            "/opt/water",
            "--configs",
            "other.yml",
            "--model-path",
            "exported/resnet.onnx",
            "--use-gpu",
            "--strict",
        ]);
        let options = cli.predictor_options();
        assert_eq!(options.configs, PathBuf::from("other.yml"));
        assert_eq!(options.model_path, PathBuf::from("exported/resnet.onnx"));
        assert!(options.use_gpu);
        assert!(cli.strict);
    }

    #[test]
    fn test_missing_positionals() {
        assert!(Cli::try_parse_from(["audio-risk", "pipe.wav"]).is_err());
    }

    #[test]
    fn test_run_missing_config() {
        let dir = tempfile::tempdir().unwrap();
        let cli = Cli::parse_from([
            std::ffi::OsStr::new("audio-risk"),
            dir.path().join("pipe.wav").as_os_str(),
            dir.path().as_os_str(),
        ]);
        assert!(matches!(run(&cli), Err(RunnerError::ConfigError(_))));
    }

    #[test]
    fn test_failure_exits_non_zero() {
        let dir = tempfile::tempdir().unwrap();
        let cli = Cli::parse_from([
            std::ffi::OsStr::new("audio-risk"),
            dir.path().join("pipe.wav").as_os_str(),
            dir.path().as_os_str(),
        ]);

        let outcome = execute(&cli);
        match &outcome {
            Outcome::Failure(line) => assert!(line.starts_with("Error: "), "{line}"),
            other => panic!("Expected a failure, got {:?}", other),
        }
        assert_eq!(
            format!("{:?}", outcome.exit_code()),
            format!("{:?}", ExitCode::FAILURE)
        );
    }

    #[test]
    fn test_report_exits_zero() {
        let report = RiskReport {
            risk_level: RiskLevel::NoRisk,
            confidence: 0.875,
        };
        let outcome = Outcome::from_result(Ok(report));
        assert_eq!(
            outcome,
            Outcome::Report(r#"{"risk_level":"无风险","confidence":0.875}"#.to_string())
        );
        assert_eq!(
            format!("{:?}", outcome.exit_code()),
            format!("{:?}", ExitCode::SUCCESS)
        );
    }
}
