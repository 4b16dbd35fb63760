use async_trait::async_trait;
use log::{debug, info};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};

/// A unit of periodic work driven by `run_every`.
///
/// The runner owns the schedule; implementors only describe one pass.
#[async_trait]
pub trait Cycle: Send {
    /// Name used in log lines.
    fn name(&self) -> &str;

    /// Performs one pass. Failures are handled inside; a failed pass simply
    /// contributes nothing.
    async fn run_cycle(&mut self);
}

/// Cooperative shutdown flag shared by every loop in the process.
#[derive(Debug)]
pub struct Shutdown {
    tx: watch::Sender<bool>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Asks every loop to stop after its current pass.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Runs `cycle` every `period` until shutdown is signalled.
///
/// The first pass starts immediately. A pass in progress always completes
/// before the shutdown flag is observed; ticks missed while a pass overran
/// are not replayed.
pub async fn run_every<C>(cycle: &mut C, period: Duration, mut shutdown: watch::Receiver<bool>)
where
    C: Cycle + ?Sized,
{
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!("{}: running every {:?}", cycle.name(), period);

    loop {
        if *shutdown.borrow() {
            break;
        }
        tokio::select! {
            _ = ticker.tick() => {
                debug!("{}: pass starting", cycle.name());
                cycle.run_cycle().await;
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    info!("{}: stopped", cycle.name());
}
