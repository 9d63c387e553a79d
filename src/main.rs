use audio_risk_runner::cli::{self, Cli, Outcome};
use clap::Parser;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args = Cli::parse();
    cli::init_logging(&args.log_level);

    let outcome = cli::execute(&args);
    match &outcome {
        Outcome::Report(json) => println!("{json}"),
        Outcome::Failure(message) => eprintln!("{message}"),
    }
    outcome.exit_code()
}
