use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use trading::BrokerError;

/// Failures inside one account pipeline.
///
/// None of these stop the process: the step that produced them is skipped
/// for the current cycle.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Broker call '{call}' failed: {source}")]
    Broker {
        call: &'static str,
        #[source]
        source: BrokerError,
    },

    #[error("Broker call '{0}' timed out")]
    Timeout(&'static str),

    #[error("Stale data for {instrument}: {reason}")]
    StaleData { instrument: String, reason: String },

    #[error("Invalid signal: {0}")]
    Validation(String),

    #[error("Unknown instrument {0}")]
    UnknownInstrument(String),

    #[error("Persistence failed: {0}")]
    Persistence(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Awaits a collaborator call, bounded by `timeout`.
///
/// A timed-out call is abandoned, not retried.
pub async fn bounded<T, F>(call: &'static str, timeout: Duration, fut: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, BrokerError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(source)) => Err(EngineError::Broker { call, source }),
        Err(_) => Err(EngineError::Timeout(call)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_bounded_times_out() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok::<_, BrokerError>(1)
        };
        let err = bounded("equity", Duration::from_secs(10), slow)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Timeout("equity")));
    }

    #[tokio::test]
    async fn test_bounded_maps_broker_error() {
        let failing = async { Err::<u32, _>(BrokerError::Transport("reset".into())) };
        let err = bounded("trades", Duration::from_secs(1), failing)
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Broker call 'trades' failed: Transport error: reset"
        );
    }
}
