use crate::error::BrokerError;
use async_trait::async_trait;

/// Best-effort plain-text alert channel.
///
/// Delivery failures are reported to the caller, which logs them and moves on.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &str) -> Result<(), BrokerError>;
}
