use thiserror::Error;

/// Failures of the command pipeline, from model output to executed steps.
#[derive(Debug, Error)]
pub enum AgentError {
    /// No usable command list after repair and every fallback.
    #[error("could not parse a command list: {0}")]
    Parse(String),

    #[error("command {index}: unsupported action '{action}'")]
    UnsupportedAction { index: usize, action: String },

    #[error("command {index}: '{action}' requires '{field}' field")]
    MissingField {
        index: usize,
        action: String,
        field: &'static str,
    },

    #[error("target element not found: {0}")]
    ElementNotFound(String),

    /// A `goto` failed. Always aborts the run.
    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("{action} failed: {message}")]
    Step { action: String, message: String },

    #[error("language model error: {0}")]
    Model(String),

    #[error("browser session error: {0}")]
    Session(String),
}

impl AgentError {
    pub fn step(action: &str, err: impl std::fmt::Display) -> Self {
        AgentError::Step {
            action: action.to_string(),
            message: format!("{err:#}"),
        }
    }
}

pub type Result<T, E = AgentError> = std::result::Result<T, E>;
