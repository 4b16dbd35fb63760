use thiserror::Error;

/// Failures reported by an external collaborator.
///
/// Every variant is treated as transient by the engine: the step that made
/// the call is skipped for the current cycle and nothing is retried.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BrokerError {
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Request timed out after {0} ms")]
    Timeout(u64),
    #[error("Request rejected: {0}")]
    Rejected(String),
    #[error("Not found: {0}")]
    NotFound(String),
}
