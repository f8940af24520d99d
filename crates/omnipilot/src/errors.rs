use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, PilotError>;

/// Errors raised by the collaborators the agent loop talks to.
///
/// Apart from [`PilotError::FailSafe`], none of these are fatal to the loop:
/// the agent logs them and abandons the current iteration, or folds them into
/// an error-kind `ActionRecord`.
#[derive(Error, Debug)]
pub enum PilotError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Screenshot failed: {0}")]
    Screenshot(String),

    #[error("Input simulation failed: {0}")]
    Input(String),

    /// The pointer was parked in a screen corner; the run must stop.
    #[error("Fail-safe triggered: pointer at screen corner ({x}, {y})")]
    FailSafe { x: i32, y: i32 },

    #[error("Detection service error: {0}")]
    Detection(String),

    #[error("Model service error: {0}")]
    Model(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<enigo::InputError> for PilotError {
    fn from(err: enigo::InputError) -> Self {
        PilotError::Input(err.to_string())
    }
}

impl From<enigo::NewConError> for PilotError {
    fn from(err: enigo::NewConError) -> Self {
        PilotError::Input(format!("failed to connect to input backend: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PilotError::Config("VLM_MODEL_NAME is not set".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: VLM_MODEL_NAME is not set"
        );
    }

    #[test]
    fn test_fail_safe_display() {
        let err = PilotError::FailSafe { x: 0, y: 1079 };
        assert_eq!(
            err.to_string(),
            "Fail-safe triggered: pointer at screen corner (0, 1079)"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "screenshot.png");
        let err: PilotError = io_err.into();
        assert!(err.to_string().starts_with("IO error"));
        assert!(err.to_string().contains("screenshot.png"));
    }
}
