use anyhow::{Context, Result};
use clap::Parser;
use reachy_core::{load_dotenv, Settings};
use std::time::Duration;
use tracing::debug;

mod app;
mod cli;
mod loadgen;
mod logging;
mod output;

use crate::cli::{Args, Command};
use crate::loadgen::LoadgenOptions;
use crate::logging::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut settings = match &args.config {
        Some(path) => Settings::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Settings::load_from_default().context("Failed to load default config")?,
    };

    // .env first so RUST_LOG and LOG_LEVEL from it reach the subscriber
    let dotenv_path = load_dotenv();
    init_tracing(args.log_level.as_deref(), settings.log_level.as_deref());
    if let Some(path) = dotenv_path {
        debug!(path = %path.display(), "Loaded .env file");
    }

    settings.apply_env(|key| std::env::var(key).ok());
    args.apply_overrides(&mut settings);
    let settings = settings.validate().context("Invalid configuration")?;
    debug!(
        base_url = settings.base_url(),
        robot_mode = ?settings.robot.mode,
        model = %settings.inference.model,
        "Configuration loaded"
    );

    match args.command() {
        Command::Run { prompt } => app::run(&settings, prompt).await,
        Command::Health => app::health(&settings).await,
        Command::Loadgen {
            concurrency,
            duration_secs,
            max_tokens,
            json,
        } => {
            let options = LoadgenOptions {
                concurrency,
                duration: Duration::from_secs(duration_secs),
                max_tokens,
            };
            loadgen::loadgen(&settings, options, json).await
        }
    }
}
