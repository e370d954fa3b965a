use colored::*;
use reachy_orchestrator::{
    CommandOutcome, LatencyTier, MetricsSnapshot, RobotState, TurnReport, AVAILABLE_GESTURES,
};

use crate::loadgen::LoadgenReport;

fn edge() -> String {
    format!("{}{}{}", "[".green(), "edge".green().bold(), "]".green())
}

fn inference() -> String {
    format!("{}{}{}", "[".blue(), "inference".blue().bold(), "]".blue())
}

fn colored_ms(ms: f64, tier: Option<LatencyTier>) -> ColoredString {
    let text = format!("{} ms", ms.round() as u64);
    match tier {
        Some(LatencyTier::Fast) => text.green(),
        Some(LatencyTier::Normal) => text.yellow(),
        Some(LatencyTier::Slow) | None => text.red(),
    }
}

/// Startup summary shown once before the first prompt
pub fn print_banner(backend_label: &str, endpoint: &str, robot: &str, robot_healthy: bool, slo_ms: f64) {
    println!("{}", "reachy-demo".bold());
    println!("{}", "-".repeat(11));
    println!("{} {} ({})", "Backend:".cyan(), backend_label, endpoint);
    let robot_status = if robot_healthy {
        "ready".green()
    } else {
        "unreachable, gestures are best-effort".yellow()
    };
    println!("{} {} ({})", "Robot:".cyan(), robot, robot_status);
    println!("{} < {:.1}s", "Target SLO:".cyan(), slo_ms / 1000.0);
    println!();
}

pub fn print_prompt_label() {
    print!("{} ", "Prompt:".cyan());
}

pub fn print_turn_report(report: &TurnReport) {
    if report.woke_robot {
        println!("{} Robot was asleep, wake-up gesture sent", edge());
    }
    println!("{} {} gesture sent", edge(), report.pre_gesture.as_str().to_uppercase());

    match &report.failure {
        None => {
            let attempts = if report.attempts > 1 {
                format!(", {} attempts", report.attempts)
            } else {
                String::new()
            };
            println!(
                "{} Response received ({}{})",
                inference(),
                colored_ms(report.inference_ms, report.tier),
                attempts
            );
        }
        Some(failure) => {
            println!(
                "{} Request failed ({})",
                inference(),
                colored_ms(report.inference_ms, None)
            );
            println!("{} {}", "Error:".red(), failure.message);
        }
    }

    if report.thinking_indicator {
        println!("{} Thinking pose shown while waiting", edge());
    }
    if report.truncated {
        println!("{}", "Note: Response truncated to fit the speech limits".yellow());
    }

    println!();
    println!("{} {}", "Assistant:".blue().bold(), report.spoken_text);
    println!();

    let tier = match report.tier {
        Some(tier) => format!("{:?}", tier).to_lowercase(),
        None => "error".to_string(),
    };
    println!(
        "{} {} gesture sent | e2e {} ({}) | spoke {:.1}s",
        edge(),
        report.post_gesture,
        colored_ms(report.e2e_ms, report.tier),
        tier,
        report.spoken_seconds
    );
    if report.slo_missed {
        println!("{}", "SLO missed for this turn".yellow());
    }
    println!();
}

pub fn print_command_outcome(outcome: &CommandOutcome, prefix: &str) {
    match outcome {
        CommandOutcome::GestureDone(tag) => match tag.as_str() {
            "goto_sleep" => println!("{}", "✓ Sleep gesture executed - robot is going to sleep".green()),
            "wake_up" => println!("{}", "✓ Wake gesture executed - robot is waking up".green()),
            _ => println!("{}", format!("✓ Gesture '{}' executed", tag).green()),
        },
        CommandOutcome::GestureFailed { tag, error } => {
            println!("{} {}", format!("✗ Gesture '{}' failed:", tag).red(), error);
        }
        CommandOutcome::MissingGestureName => {
            println!("{} Gesture name required", "Error:".red());
            println!("Available gestures: {}", AVAILABLE_GESTURES.join(", "));
        }
        CommandOutcome::ResetDone { moved } => {
            if *moved < 0.01 {
                println!(
                    "{}",
                    format!("⚠ Robot barely moved (max change: {:.3})", moved).yellow()
                );
            } else {
                println!("{}", format!("✓ Robot reset complete (moved {:.3} rad)", moved).green());
            }
        }
        CommandOutcome::Calibrated => println!("{}", "✓ Home position calibrated".green()),
        CommandOutcome::State(state) => print_state(state),
        CommandOutcome::Help => print_help(prefix),
        CommandOutcome::Usage => {
            println!("{} {}<command>", "Usage:".yellow(), prefix);
            println!("Type {} for available commands", format!("{}help", prefix).cyan());
        }
        CommandOutcome::Unknown(name) => {
            println!("{} Unknown command '{}'", "Error:".red(), name);
            println!("Type {} for available commands", format!("{}help", prefix).cyan());
        }
        CommandOutcome::Failed { command, error } => {
            println!("{} {}", format!("✗ {} failed:", command).red(), error);
        }
    }
}

fn print_state(state: &RobotState) {
    let pose = &state.head_pose;
    println!("{}", "Robot state".bold());
    println!("  Head pitch    {:>8.4}", pose.pitch);
    println!("  Head yaw      {:>8.4}", pose.yaw);
    println!("  Head roll     {:>8.4}", pose.roll);
    println!("  Antenna left  {:>8.4}", state.antennas_position[0]);
    println!("  Antenna right {:>8.4}", state.antennas_position[1]);
    println!("  Body yaw      {:>8.4}", state.body_yaw);
}

pub fn print_help(prefix: &str) {
    println!("{}", "Direct commands (bypass inference):".bold());
    println!("  {}gesture <name>  Execute a gesture", prefix);
    println!("  {}reset           Return to the home position", prefix);
    println!("  {}calibrate       Use the current position as home", prefix);
    println!("  {}state           Show the current pose", prefix);
    println!("  {}help            Show this help", prefix);
    println!();
    println!("{} {}", "Available gestures:".bold(), AVAILABLE_GESTURES.join(", "));
}

pub fn print_metrics_summary(snapshot: &MetricsSnapshot) {
    println!("{}", "Session metrics".bold());
    println!("  Requests          {}", snapshot.requests);
    println!("  Errors            {}", snapshot.errors);
    println!("  Backend failures  {}", snapshot.backend_failures);
    println!("  SLO misses        {}", snapshot.slo_misses);
    println!(
        "  Inference         {} calls, mean {:.0} ms",
        snapshot.inference_ms.count, snapshot.inference_ms.mean_ms
    );
    println!(
        "  End-to-end        {} turns, mean {:.0} ms",
        snapshot.e2e_ms.count, snapshot.e2e_ms.mean_ms
    );
    if !snapshot.gestures.is_empty() {
        let gestures: Vec<String> = snapshot
            .gestures
            .iter()
            .map(|(tag, count)| format!("{}={}", tag, count))
            .collect();
        println!("  Gestures          {}", gestures.join(", "));
    }
}

pub fn print_health(robot: &str, robot_ok: bool, backend: &str, backend_result: &Result<f64, String>) {
    let mark = |ok: bool| if ok { "✓".green() } else { "✗".red() };
    println!("{} Robot ({})", mark(robot_ok), robot);
    match backend_result {
        Ok(ms) => println!("{} Backend {} ({:.0} ms)", mark(true), backend, ms),
        Err(e) => println!("{} Backend {}: {}", mark(false), backend, e),
    }
}

pub fn print_loadgen_report(report: &LoadgenReport) {
    println!("{}", "Load test complete".bold());
    println!("  Requests   {}", report.requests);
    println!("  Errors     {}", report.errors);
    if let Some(stats) = &report.latency {
        println!("  p50        {:.0} ms", stats.p50_ms);
        println!("  p95        {:.0} ms", stats.p95_ms);
        println!("  p99        {:.0} ms", stats.p99_ms);
        println!("  max        {:.0} ms", stats.max_ms);
    } else {
        println!("{}", "  No successful requests".red());
    }
    if let Some(error) = &report.first_error {
        println!("  {} {}", "First error:".red(), error);
    }
}
