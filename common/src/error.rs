use async_openai::error::OpenAIError;
use thiserror::Error;

// Core internal errors
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] surrealdb::Error),
    #[error("OpenAI error: {0}")]
    OpenAI(#[from] OpenAIError),
    #[error("Reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("IoError: {0}")]
    Io(#[from] std::io::Error),
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("LLM parsing error: {0}")]
    LLMParsing(String),
    #[error("LLM fallback chain exhausted: {0}")]
    LlmExhausted(String),
    #[error("Query rejected: {0}")]
    QueryRejected(String),
    #[error("Feed parse error: {0}")]
    FeedParse(String),
    #[error("Processing error: {0}")]
    Processing(String),
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
    #[error("Internal service error: {0}")]
    InternalError(String),
}

impl AppError {
    /// Whether a task that failed with this error should be re-queued.
    /// Validation and missing-content errors are permanent; everything
    /// else (network, database, LLM availability) is worth another attempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            AppError::Validation(_) | AppError::NotFound(_) | AppError::QueryRejected(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_are_permanent() {
        assert!(!AppError::Validation("bad template".into()).is_retryable());
        assert!(!AppError::NotFound("page 7".into()).is_retryable());
    }

    #[test]
    fn io_and_llm_errors_are_retryable() {
        assert!(AppError::LlmExhausted("all models failed".into()).is_retryable());
        assert!(AppError::Processing("timeout".into()).is_retryable());
        assert!(AppError::InternalError("conflict".into()).is_retryable());
    }
}
