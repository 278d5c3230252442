//! Conduit Runtime
//!
//! Runs a script file in a fresh session and prints its decoded result

mod host;
mod settings;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use conduit_script::Session;
use settings::Settings;
use std::path::PathBuf;

/// Run a JavaScript file against the conduit host bridge.
#[derive(Parser, Debug)]
#[command(name = "conduit")]
#[command(version)]
struct Cli {
    /// Script to run
    script: PathBuf,

    /// JSON settings file
    #[arg(long, value_name = "FILE")]
    settings: Option<PathBuf>,

    /// Override the configured log level
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = match &cli.settings {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    if let Some(level) = cli.log_level {
        settings.log_level = level;
    }

    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(settings.level()?)
        .init();

    tracing::info!("Conduit v{}", conduit_script::VERSION);

    let source = std::fs::read_to_string(&cli.script)
        .with_context(|| format!("failed to read {}", cli.script.display()))?;

    let session = Session::with_options(settings.session.clone())
        .map_err(|err| anyhow!("failed to create script session: {err}"))?;
    host::register(&session).map_err(|err| anyhow!("failed to register host types: {err}"))?;

    let result: serde_json::Value = session
        .evaluate(&source)
        .map_err(|err| anyhow!("{}: {err}", cli.script.display()))?;
    println!("{}", serde_json::to_string_pretty(&result)?);

    tracing::debug!(
        executions = session.counter("executions"),
        tasks_drained = session.counter("tasks_drained"),
        native_calls = session.counter("native_calls"),
        json_round_trips = session.counter("json_round_trips"),
        "session counters"
    );
    session.dispose();

    Ok(())
}
