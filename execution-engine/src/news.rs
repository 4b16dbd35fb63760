use crate::error::bounded;
use crate::models::NewsConfig;
use crate::risk_guard::RiskState;
use chrono::{DateTime, Duration, Utc};
use log::{info, warn};
use std::sync::Arc;
use trading::{AccountId, NewsFeed};

/// What a news refresh changed on the risk state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NewsUpdate {
    pub halted: bool,
    pub throttled: bool,
}

/// Turns calendar events and headline sentiment into halt/throttle windows.
///
/// Whether a provider is available is decided once, here; a disabled gate
/// never calls out.
pub struct NewsGate {
    feed: Option<Arc<dyn NewsFeed>>,
    cfg: NewsConfig,
    timeout: std::time::Duration,
}

impl NewsGate {
    pub fn new(
        feed: Option<Arc<dyn NewsFeed>>,
        cfg: NewsConfig,
        timeout: std::time::Duration,
    ) -> Self {
        Self {
            feed: feed.filter(|f| f.is_enabled()),
            cfg,
            timeout,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.feed.is_some()
    }

    /// Refreshes halt/throttle windows. Provider failures are logged and
    /// leave the state untouched for this cycle.
    pub async fn refresh(
        &self,
        account: &AccountId,
        state: &mut RiskState,
        now: DateTime<Utc>,
    ) -> NewsUpdate {
        let Some(feed) = &self.feed else {
            return NewsUpdate::default();
        };
        let mut update = NewsUpdate::default();

        match bounded(
            "news_events",
            self.timeout,
            feed.upcoming_high_impact_events(self.cfg.halt_lead_minutes),
        )
        .await
        {
            Ok(events) if !events.is_empty() => {
                let until = now + Duration::minutes(self.cfg.halt_minutes);
                state.extend_halt(until);
                update.halted = true;
                info!(
                    "[{}] High-impact event '{}' ahead, halting until {}",
                    account, events[0].title, until
                );
            }
            Ok(_) => {}
            Err(e) => warn!("[{}] News calendar unavailable: {}", account, e),
        }

        match bounded(
            "news_sentiment",
            self.timeout,
            feed.sentiment_snapshot(self.cfg.sentiment_window_minutes),
        )
        .await
        {
            Ok(snapshot)
                if snapshot.samples >= self.cfg.min_samples
                    && snapshot.average_score.abs() >= self.cfg.throttle_score =>
            {
                let until = now + Duration::minutes(self.cfg.throttle_minutes);
                state.set_throttle(until);
                update.throttled = true;
                info!(
                    "[{}] Sentiment {:.2} over {} samples, throttling until {}",
                    account, snapshot.average_score, snapshot.samples, until
                );
            }
            Ok(_) => {}
            Err(e) => warn!("[{}] Sentiment unavailable: {}", account, e),
        }

        update
    }
}
