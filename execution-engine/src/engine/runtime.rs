//! The task that owns one account.
//!
//! Everything that touches an `AccountPipeline` goes through its task: the
//! cycle ticker, operator commands and routed signals. Per-account state
//! therefore never needs a lock.

use super::{AccountPipeline, ExecutionOutcome};
use crate::router::{RouteError, SignalExecutor};
use async_trait::async_trait;
use log::{debug, info};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use trading::{AccountId, Signal};
use trading_core::admin::CommandEnvelope;

/// Work delivered to an account task.
#[derive(Debug)]
pub enum AccountMessage {
    Command(CommandEnvelope),
    Execute {
        signal: Signal,
        reply: oneshot::Sender<Result<ExecutionOutcome, String>>,
    },
}

/// Cheap, cloneable way to reach a running account task.
#[derive(Debug, Clone)]
pub struct AccountHandle {
    account: AccountId,
    tx: mpsc::UnboundedSender<AccountMessage>,
}

impl AccountHandle {
    pub fn new(account: AccountId, tx: mpsc::UnboundedSender<AccountMessage>) -> Self {
        Self { account, tx }
    }

    pub fn account(&self) -> &AccountId {
        &self.account
    }

    pub fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Queues a command for the account task.
    pub fn send_command(&self, envelope: CommandEnvelope) -> Result<(), RouteError> {
        self.tx
            .send(AccountMessage::Command(envelope))
            .map_err(|_| RouteError::Unavailable(self.account.clone()))
    }
}

#[async_trait]
impl SignalExecutor for AccountHandle {
    async fn execute(&self, signal: &Signal) -> Result<ExecutionOutcome, RouteError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(AccountMessage::Execute {
                signal: signal.clone(),
                reply,
            })
            .map_err(|_| RouteError::Unavailable(self.account.clone()))?;
        match rx.await {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(reason)) => Err(RouteError::Execution {
                account: self.account.clone(),
                reason,
            }),
            Err(_) => Err(RouteError::Unavailable(self.account.clone())),
        }
    }
}

/// Drives `pipeline` until shutdown: one cycle per `period` (the first
/// immediately), with commands and routed signals handled in between.
/// A cycle in progress always completes before shutdown is observed.
pub async fn run_account(
    mut pipeline: AccountPipeline,
    period: Duration,
    mut inbox: mpsc::UnboundedReceiver<AccountMessage>,
    mut shutdown: watch::Receiver<bool>,
) {
    let account = pipeline.account().clone();
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!("[{}] Account task running every {:?}", account, period);

    loop {
        if *shutdown.borrow() {
            break;
        }
        tokio::select! {
            _ = ticker.tick() => {
                pipeline.run_cycle().await;
            }
            message = inbox.recv() => match message {
                Some(AccountMessage::Command(envelope)) => {
                    debug!("[{}] Command {:?}", account, envelope.command);
                    let response = pipeline.apply_command(envelope.command.clone()).await;
                    envelope.respond(response);
                }
                Some(AccountMessage::Execute { signal, reply }) => {
                    let result = pipeline
                        .execute_signal(&signal)
                        .await
                        .map_err(|e| e.to_string());
                    // Router may have given up waiting.
                    let _ = reply.send(result);
                }
                // Every handle dropped: keep trading on the ticker alone.
                None => {
                    run_ticker_only(&mut pipeline, &mut ticker, &mut shutdown).await;
                    break;
                }
            },
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    info!("[{}] Account task stopped", account);
}

async fn run_ticker_only(
    pipeline: &mut AccountPipeline,
    ticker: &mut time::Interval,
    shutdown: &mut watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        tokio::select! {
            _ = ticker.tick() => {
                pipeline.run_cycle().await;
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return;
                }
            }
        }
    }
}

/// Spawns the account task and returns the handle used to reach it.
pub fn spawn_account(
    pipeline: AccountPipeline,
    period: Duration,
    shutdown: watch::Receiver<bool>,
) -> (AccountHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = AccountHandle::new(pipeline.account().clone(), tx);
    let task = tokio::spawn(run_account(pipeline, period, rx, shutdown));
    (handle, task)
}
