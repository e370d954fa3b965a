use clap::{Parser, Subcommand};
use reachy_core::{RobotMode, Settings};
use std::path::PathBuf;

/// Voice/gesture assistant demo: a Reachy robot fronting an OpenAI-compatible backend
#[derive(Parser, Debug)]
#[command(name = "reachy-demo", author, version, about, long_about = None)]
pub struct Args {
    /// Path to a TOML config file (default: ~/.config/reachy-demo/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Base URL of the inference backend
    #[arg(long, global = true)]
    pub aim_base_url: Option<String>,

    /// Base URL of the robot daemon
    #[arg(long, global = true)]
    pub reachy_daemon_url: Option<String>,

    /// Model id sent with every request
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Robot backend: sim or daemon
    #[arg(long, global = true)]
    pub robot_mode: Option<RobotMode>,

    /// Log filter, e.g. "debug" or "reachy_orchestrator=trace"
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Interactive loop (default), or a single turn with --prompt
    Run {
        /// Run one turn with this prompt and exit
        #[arg(short, long)]
        prompt: Option<String>,
    },
    /// Probe the robot and the inference backend
    Health,
    /// Concurrent load against the inference backend
    Loadgen {
        #[arg(long, default_value_t = 8)]
        concurrency: usize,

        #[arg(long, default_value_t = 30)]
        duration_secs: u64,

        #[arg(long, default_value_t = 120)]
        max_tokens: u32,

        /// Print the report as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

impl Args {
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Run { prompt: None })
    }

    /// Command-line flags take precedence over file and environment values
    pub fn apply_overrides(&self, settings: &mut Settings) {
        if let Some(url) = &self.aim_base_url {
            settings.inference.base_url = Some(url.clone());
        }
        if let Some(url) = &self.reachy_daemon_url {
            settings.robot.daemon_url = url.clone();
        }
        if let Some(model) = &self.model {
            settings.inference.model = model.clone();
        }
        if let Some(mode) = self.robot_mode {
            settings.robot.mode = mode;
        }
        if let Some(level) = &self.log_level {
            settings.log_level = Some(level.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_interactive_run() {
        let args = Args::parse_from(["reachy-demo"]);
        assert_eq!(args.command(), Command::Run { prompt: None });
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = Args::parse_from([
            "reachy-demo",
            "run",
            "--prompt",
            "hello",
            "--robot-mode",
            "daemon",
            "--aim-base-url",
            "http://localhost:1234",
        ]);
        assert_eq!(
            args.command(),
            Command::Run {
                prompt: Some("hello".to_string())
            }
        );

        let mut settings = Settings::default();
        args.apply_overrides(&mut settings);
        assert_eq!(settings.robot.mode, RobotMode::Daemon);
        assert_eq!(settings.inference.base_url.as_deref(), Some("http://localhost:1234"));
    }

    #[test]
    fn test_loadgen_options() {
        let args = Args::parse_from(["reachy-demo", "loadgen", "--concurrency", "4", "--duration-secs", "5"]);
        assert_eq!(
            args.command(),
            Command::Loadgen {
                concurrency: 4,
                duration_secs: 5,
                max_tokens: 120,
                json: false
            }
        );
    }

    #[test]
    fn test_invalid_robot_mode_rejected() {
        assert!(Args::try_parse_from(["reachy-demo", "--robot-mode", "mars"]).is_err());
    }
}
