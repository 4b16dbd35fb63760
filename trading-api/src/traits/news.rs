use crate::error::BrokerError;
use crate::model::sentiment::{NewsEvent, SentimentSnapshot};
use async_trait::async_trait;

/// Source of halt/throttle signals derived from the news calendar and
/// headline sentiment.
#[async_trait]
pub trait NewsFeed: Send + Sync {
    /// Whether the provider is configured. Checked once at construction.
    fn is_enabled(&self) -> bool;

    /// High-impact events scheduled within the next `within_minutes`.
    async fn upcoming_high_impact_events(
        &self,
        within_minutes: i64,
    ) -> Result<Vec<NewsEvent>, BrokerError>;

    /// Sentiment aggregated over the trailing `window_minutes`.
    async fn sentiment_snapshot(&self, window_minutes: i64)
    -> Result<SentimentSnapshot, BrokerError>;
}
