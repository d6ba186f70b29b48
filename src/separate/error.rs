use thiserror::Error;

/// Failures of the separation core.
///
/// Configuration problems are caught synchronously before any model call.
/// Model failures (device errors, resource exhaustion) are passed through
/// opaque and unretried; whether to retry with a smaller batch is the
/// caller's decision.
#[derive(Debug, Error)]
pub enum SeparateError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("mask inference failed")]
    Inference(#[source] anyhow::Error),
}
