use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use topic_explorer::{pipeline, Config};
use tracing::{error, info};

fn main() -> ExitCode {
    // RUST_LOG overrides the default level
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let Some(path) = env::args_os().nth(1).map(PathBuf::from) else {
        error!(target: "topic_explorer::main", "usage: topic-explorer-build <config.toml>");
        return ExitCode::from(2);
    };

    let result = Config::from_file(&path).and_then(|config| pipeline::run(&config));
    match result {
        Ok(report) => {
            info!(
                target: "topic_explorer::pipeline",
                documents = report.documents,
                topics = report.topics,
                words = report.words,
                "Tables written"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(target: "topic_explorer::pipeline", error = %e, "Pipeline failed");
            ExitCode::FAILURE
        }
    }
}
