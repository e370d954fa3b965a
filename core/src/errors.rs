use thiserror::Error;

/// Errors raised by the inference client
#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("Inference timeout after {attempts} attempt(s): {message}")]
    Timeout { attempts: u32, message: String },

    #[error("HTTP Error: {status_code} - {body}")]
    Http { status_code: u16, body: String },

    #[error("Transport Error: {0}")]
    Transport(String),

    #[error("Configuration Error: {0}")]
    Config(String),
}

impl InferenceError {
    /// Timeouts, connection failures and 5xx responses are worth another attempt.
    /// Client errors (4xx) never are.
    pub fn is_retryable(&self) -> bool {
        match self {
            InferenceError::Timeout { .. } | InferenceError::Transport(_) => true,
            InferenceError::Http { status_code, .. } => *status_code >= 500,
            InferenceError::Config(_) => false,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, InferenceError::Timeout { .. })
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            InferenceError::Http { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }
}

/// Result type for inference operations
pub type InferenceResult<T> = Result<T, InferenceError>;

/// Errors raised while loading or validating settings
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: String, message: String },

    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error("Invalid setting {key}: {message}")]
    Invalid { key: &'static str, message: String },

    #[error("Could not determine home directory")]
    NoHomeDir,
}

pub type ConfigResult<T> = Result<T, ConfigError>;
