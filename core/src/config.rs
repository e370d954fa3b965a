use crate::errors::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, warn};

/// Name used for the default config directory
pub const APP_NAME: &str = "reachy-demo";

/// Connection settings for the OpenAI-compatible inference backend
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct InferenceSettings {
    pub base_url: Option<String>,
    pub chat_path: String,
    pub model: String,
    pub api_key: Option<String>,
    /// Applied to each attempt separately
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for InferenceSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            chat_path: "/v1/chat/completions".to_string(),
            model: "llm-prod".to_string(),
            api_key: None,
            timeout_ms: 30_000,
            max_retries: 1,
            max_tokens: 200,
            temperature: 0.2,
        }
    }
}

/// Which Robot Adapter backend to construct
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RobotMode {
    #[default]
    Sim,
    Daemon,
}

impl FromStr for RobotMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sim" => Ok(RobotMode::Sim),
            // "hardware" is what older .env files used for the real device
            "daemon" | "hardware" => Ok(RobotMode::Daemon),
            other => Err(ConfigError::Invalid {
                key: "robot.mode",
                message: format!("expected 'sim' or 'daemon', got '{}'", other),
            }),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct RobotSettings {
    pub mode: RobotMode,
    pub daemon_url: String,
    /// Multiplier for simulated speech pacing; 0 disables the wait
    pub sim_time_scale: f64,
}

impl Default for RobotSettings {
    fn default() -> Self {
        Self {
            mode: RobotMode::Sim,
            daemon_url: "http://127.0.0.1:8001".to_string(),
            sim_time_scale: 1.0,
        }
    }
}

/// Turn-level policy knobs
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct OrchestratorSettings {
    pub e2e_slo_ms: u64,
    pub fast_tier_ms: u64,
    pub context_turns: usize,
    /// Fraction of max_tokens at which a completion is presumed cut off
    pub truncation_ratio: f64,
    pub max_speech_chars: usize,
    pub thinking_after_ms: u64,
    pub command_prefix: String,
    pub system_prompt: Option<String>,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            e2e_slo_ms: 2500,
            fast_tier_ms: 800,
            context_turns: 20,
            truncation_ratio: 0.9,
            max_speech_chars: 3000,
            thinking_after_ms: 700,
            command_prefix: "cmd:".to_string(),
            system_prompt: None,
        }
    }
}

/// Complete application settings
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Settings {
    pub inference: InferenceSettings,
    pub robot: RobotSettings,
    pub orchestrator: OrchestratorSettings,
    pub log_level: Option<String>,
}

impl Settings {
    /// Loads settings from a file if it exists, otherwise returns the defaults
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Loads `~/.config/reachy-demo/config.toml`, falling back to defaults
    pub fn load_from_default() -> ConfigResult<Self> {
        let path = get_default_config_file(APP_NAME)?;
        Self::load_from_file(&path)
    }

    /// Saves settings to a file, creating the parent directory if needed
    pub fn save_to_file(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string(self).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Read {
                path: parent.display().to_string(),
                source: e,
            })?;
        }

        fs::write(path, content).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })
    }

    /// Overlays values from an environment lookup. Empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("AIM_BASE_URL") {
            self.inference.base_url = Some(v);
        }
        if let Some(v) = get("AIM_CHAT_PATH") {
            self.inference.chat_path = v;
        }
        if let Some(v) = get("AIM_MODEL") {
            self.inference.model = v;
        }
        if let Some(v) = get("AIM_API_KEY") {
            self.inference.api_key = Some(v);
        }
        env_number("AIM_TIMEOUT_MS", get("AIM_TIMEOUT_MS"), &mut self.inference.timeout_ms);
        env_number("AIM_MAX_RETRIES", get("AIM_MAX_RETRIES"), &mut self.inference.max_retries);
        env_number("AIM_MAX_TOKENS", get("AIM_MAX_TOKENS"), &mut self.inference.max_tokens);
        if let Some(v) = get("REACHY_DAEMON_URL") {
            self.robot.daemon_url = v;
        }
        if let Some(v) = get("ROBOT_MODE") {
            match v.parse() {
                Ok(mode) => self.robot.mode = mode,
                Err(e) => warn!(error = %e, "Ignoring ROBOT_MODE"),
            }
        }
        env_number("E2E_SLO_MS", get("E2E_SLO_MS"), &mut self.orchestrator.e2e_slo_ms);
        if let Some(v) = get("LOG_LEVEL") {
            self.log_level = Some(v);
        }
    }

    /// Checks required values and normalizes URLs and paths
    pub fn validate(mut self) -> ConfigResult<Self> {
        let base_url = self
            .inference
            .base_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or(ConfigError::Missing("inference.base_url"))?
            .trim_end_matches('/')
            .to_string();
        self.inference.base_url = Some(base_url);

        if !self.inference.chat_path.starts_with('/') {
            self.inference.chat_path = format!("/{}", self.inference.chat_path);
        }
        self.inference.api_key = self
            .inference
            .api_key
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty());
        self.robot.daemon_url = self.robot.daemon_url.trim_end_matches('/').to_string();

        let o = &self.orchestrator;
        if o.fast_tier_ms > o.e2e_slo_ms {
            return Err(ConfigError::Invalid {
                key: "orchestrator.fast_tier_ms",
                message: format!(
                    "fast tier ({} ms) must not exceed the SLO ({} ms)",
                    o.fast_tier_ms, o.e2e_slo_ms
                ),
            });
        }
        if !(0.0..=1.0).contains(&o.truncation_ratio) {
            return Err(ConfigError::Invalid {
                key: "orchestrator.truncation_ratio",
                message: format!("{} is outside 0.0..=1.0", o.truncation_ratio),
            });
        }
        if o.max_speech_chars < 16 {
            return Err(ConfigError::Invalid {
                key: "orchestrator.max_speech_chars",
                message: format!("{} is too small to speak anything", o.max_speech_chars),
            });
        }

        Ok(self)
    }

    /// The validated backend URL; empty only if `validate` was skipped
    pub fn base_url(&self) -> &str {
        self.inference.base_url.as_deref().unwrap_or_default()
    }
}

fn env_number<T: FromStr>(key: &str, value: Option<String>, target: &mut T) {
    if let Some(raw) = value {
        match raw.trim().parse::<T>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(key, value = %raw, "Ignoring unparseable numeric setting"),
        }
    }
}

/// Load `.env` into the process environment. Already-set variables win.
pub fn load_dotenv() -> Option<PathBuf> {
    dotenvy::dotenv().ok()
}

/// Helper function to get default config directory
pub fn get_default_config_dir(app_name: &str) -> ConfigResult<PathBuf> {
    let home_dir = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
    Ok(home_dir.join(".config").join(app_name))
}

/// Helper function to get default config file path
pub fn get_default_config_file(app_name: &str) -> ConfigResult<PathBuf> {
    let config_dir = get_default_config_dir(app_name)?;
    Ok(config_dir.join("config.toml"))
}
