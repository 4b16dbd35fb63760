use crate::error::{bounded, Result};
use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;
use trading::{AccountId, Broker};

/// What one enforcement pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapReport {
    pub live_before: usize,
    pub cancelled: Vec<String>,
    /// Excess that could not be cancelled away.
    pub shortfall: usize,
}

/// Trims pending entry orders so that open trades plus pending entries stay
/// within the account's concurrent cap. Bracket dependents are never touched.
pub struct CapEnforcer {
    account: AccountId,
    broker: Arc<dyn Broker>,
    concurrent_cap: usize,
    timeout: Duration,
}

impl CapEnforcer {
    pub fn new(
        account: AccountId,
        broker: Arc<dyn Broker>,
        concurrent_cap: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            account,
            broker,
            concurrent_cap,
            timeout,
        }
    }

    /// Cancels the oldest pending entries until back within the cap.
    pub async fn enforce(&self) -> Result<CapReport> {
        let trades = bounded("trades", self.timeout, self.broker.open_trades()).await?;
        let pending =
            bounded("pending_orders", self.timeout, self.broker.pending_orders()).await?;

        let mut entries: Vec<_> = pending.into_iter().filter(|o| o.is_entry()).collect();
        entries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

        let live = trades.len() + entries.len();
        let mut report = CapReport {
            live_before: live,
            ..Default::default()
        };
        if live <= self.concurrent_cap {
            return Ok(report);
        }

        let mut excess = live - self.concurrent_cap;
        info!(
            "[{}] {} live against cap {}, trimming {} pending entries",
            self.account, live, self.concurrent_cap, excess
        );
        for order in entries {
            if excess == 0 {
                break;
            }
            let cancel = self.broker.cancel_order(&order.id);
            match bounded("cancel_order", self.timeout, cancel).await {
                Ok(()) => {
                    info!(
                        "[{}] Cancelled pending entry {} on {} (created {})",
                        self.account, order.id, order.instrument, order.created_at
                    );
                    report.cancelled.push(order.id);
                    excess -= 1;
                }
                Err(e) => warn!("[{}] Could not cancel {}: {}", self.account, order.id, e),
            }
        }

        if excess > 0 {
            info!(
                "[{}] Still {} over cap after cancelling every pending entry",
                self.account, excess
            );
        }
        report.shortfall = excess;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use broker_gateway::PaperBroker;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use trading::{OpenTrade, PendingOrderKind, Side};

    fn seed_trades(broker: &PaperBroker, n: usize) {
        let opened = Utc.with_ymd_and_hms(2024, 6, 3, 9, 0, 0).unwrap();
        for i in 0..n {
            broker.insert_trade(OpenTrade {
                id: format!("T{}", 100 + i),
                instrument: format!("SYM{}", i),
                side: Side::Buy,
                units: 100,
                price: 1.0,
                stop_loss: Some(0.99),
                take_profit: Some(1.02),
                unrealized_pl: 0.0,
                opened_at: opened,
            });
        }
    }

    fn enforcer(broker: Arc<PaperBroker>, cap: usize) -> CapEnforcer {
        CapEnforcer::new(AccountId::new("a"), broker, cap, Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_scenario_cancels_exactly_one_oldest_entry() {
        let broker = Arc::new(PaperBroker::new(10_000.0));
        seed_trades(&broker, 4);
        let t0 = Utc.with_ymd_and_hms(2024, 6, 3, 10, 0, 0).unwrap();
        let later = t0 + ChronoDuration::minutes(5);
        let newer = broker.insert_pending_entry("EUR_USD", Side::Buy, 100, 1.0, later);
        let older = broker.insert_pending_entry("GBP_USD", Side::Buy, 100, 1.2, t0);

        let report = enforcer(broker.clone(), 5).enforce().await.unwrap();

        assert_eq!(report.live_before, 6);
        assert_eq!(report.cancelled, vec![older]);
        assert_eq!(report.shortfall, 0);

        let trades = broker.open_trades().await.unwrap();
        let pending = broker.pending_orders().await.unwrap();
        let entries: Vec<_> = pending.iter().filter(|o| o.is_entry()).collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, newer);
        assert_eq!(trades.len() + entries.len(), 5);
        // Brackets of the four trades are untouched.
        assert_eq!(
            pending
                .iter()
                .filter(|o| o.kind == PendingOrderKind::StopLoss)
                .count(),
            4
        );
    }

    #[tokio::test]
    async fn test_within_cap_is_noop() {
        let broker = Arc::new(PaperBroker::new(10_000.0));
        seed_trades(&broker, 2);
        let report = enforcer(broker.clone(), 5).enforce().await.unwrap();
        assert!(report.cancelled.is_empty());
        assert!(broker.cancelled_orders().is_empty());
    }

    #[tokio::test]
    async fn test_shortfall_when_only_trades_exceed() {
        let broker = Arc::new(PaperBroker::new(10_000.0));
        seed_trades(&broker, 6);
        let t0 = Utc.with_ymd_and_hms(2024, 6, 3, 10, 0, 0).unwrap();
        broker.insert_pending_entry("EUR_USD", Side::Buy, 100, 1.0, t0);

        let report = enforcer(broker.clone(), 5).enforce().await.unwrap();
        assert_eq!(report.cancelled.len(), 1);
        assert_eq!(report.shortfall, 1);
    }

    #[tokio::test]
    async fn test_broker_failure_is_an_error() {
        let broker = Arc::new(PaperBroker::new(10_000.0));
        broker.set_failure(Some(trading::BrokerError::Transport("down".into())));
        assert!(enforcer(broker, 5).enforce().await.is_err());
    }
}
