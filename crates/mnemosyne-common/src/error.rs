//! Error taxonomy (§7). Job-broker-level retries are disabled everywhere
//! (`attempts: 1`); the only retries in the system happen inside the LLM
//! client boundary, scoped to `LlmError::Transient`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    /// Rate limit, timeout, transient 5xx — retried inside the LLM client
    /// with backoff, never by the job broker.
    #[error("transient LLM error: {0}")]
    Transient(#[source] anyhow::Error),

    /// Schema-violating or otherwise unusable output. Not retried; surfaces
    /// to the caller as-is.
    #[error("deterministic LLM error: {0}")]
    Deterministic(#[source] anyhow::Error),
}

impl LlmError {
    pub fn is_transient(&self) -> bool {
        matches!(self, LlmError::Transient(_))
    }
}

/// The top-level error a worker job handler returns. Every variant is
/// non-retryable at the broker: a transient LLM condition has already been
/// exhausted by the time it reaches here (§9 "Retry discipline").
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("persistence error: {0}")]
    Persistence(#[source] anyhow::Error),

    #[error("transport error: {0}")]
    Transport(#[source] anyhow::Error),
}

impl PipelineError {
    pub fn persistence(err: impl Into<anyhow::Error>) -> Self {
        PipelineError::Persistence(err.into())
    }

    pub fn transport(err: impl Into<anyhow::Error>) -> Self {
        PipelineError::Transport(err.into())
    }
}
