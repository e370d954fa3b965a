use anyhow::{bail, Context, Result};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use reachy_core::{backend_label, ChatMessage, InferenceClient, Settings};
use reachy_orchestrator::{create_robot, InMemoryMetrics, LineOutcome, Orchestrator, RobotRef};
use std::io::{BufRead, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::output::{
    print_banner, print_command_outcome, print_health, print_metrics_summary, print_prompt_label,
    print_turn_report,
};

struct Session {
    orchestrator: Orchestrator,
    metrics: Arc<InMemoryMetrics>,
}

fn build(settings: &Settings) -> Result<Session> {
    let client = InferenceClient::from_settings(&settings.inference)
        .context("Failed to create inference client")?;
    let robot = create_robot(&settings.robot).context("Failed to create robot adapter")?;
    let metrics = Arc::new(InMemoryMetrics::new());

    let orchestrator = Orchestrator::new(Arc::new(client), robot, metrics.clone(), settings);
    Ok(Session {
        orchestrator,
        metrics,
    })
}

fn spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}

fn print_outcome(outcome: &LineOutcome, prefix: &str) {
    match outcome {
        LineOutcome::Idle => {}
        LineOutcome::Command(outcome) => print_command_outcome(outcome, prefix),
        LineOutcome::Turn(report) => print_turn_report(report),
    }
}

/// Run the assistant: one turn if `prompt` is given, otherwise read lines from stdin
pub async fn run(settings: &Settings, prompt: Option<String>) -> Result<()> {
    let Session {
        mut orchestrator,
        metrics,
    } = build(settings)?;

    let robot_healthy = orchestrator.robot().health().await;
    if !robot_healthy {
        warn!(backend = orchestrator.robot().backend_name(), "Robot health check failed");
    }
    print_banner(
        backend_label(settings.base_url()),
        &orchestrator.backend_endpoint(),
        orchestrator.robot().backend_name(),
        robot_healthy,
        orchestrator.policy().slo_ms(),
    );

    let prefix = orchestrator.command_prefix().to_string();

    match prompt {
        Some(prompt) => {
            let spinner = spinner("Working...");
            let outcome = orchestrator.handle_line(&prompt).await;
            spinner.finish_and_clear();
            print_outcome(&outcome, &prefix);
        }
        None => interactive_loop(&mut orchestrator, &prefix, spawn_stdin_reader()).await,
    }

    orchestrator.shutdown().await;
    if orchestrator.thinking_model_detected() {
        debug!("Backend emitted reasoning output during this session");
    }
    println!();
    print_metrics_summary(&metrics.snapshot());
    Ok(())
}

/// Forward lines from `reader` until EOF, a read error or a closed receiver.
/// Invalid UTF-8 is replaced rather than treated as an error.
fn forward_lines<R: BufRead>(mut reader: R, tx: mpsc::Sender<String>) {
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf)
                    .trim_end_matches(['\r', '\n'])
                    .to_string();
                if tx.blocking_send(line).is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to read input, closing");
                break;
            }
        }
    }
}

// Blocking reads live on their own thread so an interrupt never waits for Enter
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || forward_lines(std::io::stdin().lock(), tx));
    rx
}

async fn interactive_loop(
    orchestrator: &mut Orchestrator,
    prefix: &str,
    mut lines: mpsc::Receiver<String>,
) {
    println!(
        "Type your prompt, {} for commands, or 'exit' to quit.",
        format!("{}help", prefix).cyan()
    );
    println!();

    loop {
        print_prompt_label();
        if let Err(e) = std::io::stdout().flush() {
            debug!(error = %e, "Failed to flush stdout");
        }

        let line = tokio::select! {
            line = lines.recv() => line,
            _ = tokio::signal::ctrl_c() => {
                println!();
                info!("Interrupted while waiting for input");
                break;
            }
        };

        // EOF
        let Some(line) = line else {
            println!();
            break;
        };

        let input = line.trim();
        if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
            println!("Goodbye!");
            break;
        }

        let spinner = spinner("Working...");
        let outcome = tokio::select! {
            outcome = orchestrator.handle_line(input) => Some(outcome),
            _ = tokio::signal::ctrl_c() => None,
        };
        spinner.finish_and_clear();

        match outcome {
            Some(outcome) => print_outcome(&outcome, prefix),
            None => {
                println!("{}", "Interrupted".yellow());
                info!("Turn interrupted by Ctrl-C");
                break;
            }
        }
    }
}

async fn probe_backend(client: &InferenceClient, settings: &Settings) -> Result<f64, String> {
    let started = Instant::now();
    client
        .chat_messages(
            &settings.inference.model,
            vec![ChatMessage::user("ping")],
            0.0,
            1,
        )
        .await
        .map(|_| started.elapsed().as_secs_f64() * 1000.0)
        .map_err(|e| e.to_string())
}

/// Probe both dependencies; fails if either is unhealthy
pub async fn health(settings: &Settings) -> Result<()> {
    let robot: RobotRef = create_robot(&settings.robot).context("Failed to create robot adapter")?;
    let client = InferenceClient::from_settings(&settings.inference)
        .context("Failed to create inference client")?;

    let (robot_ok, backend) = tokio::join!(robot.health(), probe_backend(&client, settings));
    print_health(robot.backend_name(), robot_ok, client.base_url(), &backend);

    if !robot_ok || backend.is_err() {
        bail!("Health check failed");
    }
    Ok(())
}
