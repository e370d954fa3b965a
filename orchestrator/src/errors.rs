use thiserror::Error;
use tracing::warn;

/// Errors raised by a Robot Adapter backend
#[derive(Error, Debug)]
pub enum RobotError {
    #[error("Robot unavailable: {0}")]
    Unavailable(String),

    #[error("Robot daemon HTTP Error: {status_code} - {body}")]
    Http { status_code: u16, body: String },

    #[error("Failed to decode robot response: {0}")]
    Decode(String),

    #[error("Unsupported robot operation: {0}")]
    Unsupported(String),
}

impl From<reqwest::Error> for RobotError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            RobotError::Decode(e.to_string())
        } else {
            RobotError::Unavailable(e.to_string())
        }
    }
}

/// Result type for robot operations
pub type RobotResult<T> = Result<T, RobotError>;

/// Log and discard the failure of a cosmetic robot operation.
/// Returns whether the operation succeeded.
pub fn best_effort(op: &str, result: RobotResult<()>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            warn!(op, error = %e, "Robot operation failed, continuing");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_best_effort_reports_outcome() {
        assert!(best_effort("reset", Ok(())));
        assert!(!best_effort(
            "gesture",
            Err(RobotError::Unavailable("connection refused".to_string()))
        ));
    }

    #[test]
    fn test_error_display() {
        let err = RobotError::Http {
            status_code: 422,
            body: "bad pose".to_string(),
        };
        assert_eq!(err.to_string(), "Robot daemon HTTP Error: 422 - bad pose");
    }
}
