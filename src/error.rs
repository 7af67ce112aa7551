use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid {field} '{value}'. Choose from: [{}]", .allowed.join(", "))]
    InvalidEnum {
        field: &'static str,
        value: String,
        allowed: Vec<&'static str>,
    },

    #[error("Invalid {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error(
        "{scope} configuration missing ({}). Provide in request or set in environment variables",
        .missing.join(", ")
    )]
    MissingConfiguration {
        scope: &'static str,
        missing: Vec<&'static str>,
    },

    #[error("Inference error: {0}")]
    InferenceError(String),

    #[error("Persistence error: {0}")]
    PersistenceError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl GenerationError {
    /// Errors caused by the caller's request, as opposed to a failing dependency.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            GenerationError::MissingField(_)
                | GenerationError::InvalidEnum { .. }
                | GenerationError::InvalidValue { .. }
                | GenerationError::MissingConfiguration { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, GenerationError>;
