//! Signal routing between accounts.
//!
//! Each account registers an executor. A routed signal runs on its target
//! account; if the target is unknown or fails, it runs on the account it
//! came from instead of being dropped.

use crate::engine::ExecutionOutcome;
use async_trait::async_trait;
use log::{info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use trading::{AccountId, Signal};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RouteError {
    #[error("No executor registered for account {0}")]
    UnknownAccount(AccountId),
    #[error("Account {0} is not running")]
    Unavailable(AccountId),
    #[error("Execution on {account} failed: {reason}")]
    Execution { account: AccountId, reason: String },
    #[error("Target {target} failed ({target_error}); origin {origin} failed ({origin_error})")]
    Exhausted {
        target: AccountId,
        origin: AccountId,
        target_error: Box<RouteError>,
        origin_error: Box<RouteError>,
    },
}

/// Runs a signal through one account's pipeline.
#[async_trait]
pub trait SignalExecutor: Send + Sync {
    async fn execute(&self, signal: &Signal) -> Result<ExecutionOutcome, RouteError>;
}

#[derive(Default)]
pub struct AccountRouter {
    executors: HashMap<AccountId, Arc<dyn SignalExecutor>>,
}

impl AccountRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the executor for `account`.
    pub fn register(&mut self, account: AccountId, executor: Arc<dyn SignalExecutor>) {
        info!("Router: registered account {}", account);
        self.executors.insert(account, executor);
    }

    pub fn is_registered(&self, account: &AccountId) -> bool {
        self.executors.contains_key(account)
    }

    pub fn accounts(&self) -> Vec<AccountId> {
        let mut accounts: Vec<AccountId> = self.executors.keys().cloned().collect();
        accounts.sort();
        accounts
    }

    async fn execute_on(
        &self,
        account: &AccountId,
        signal: &Signal,
    ) -> Result<ExecutionOutcome, RouteError> {
        let executor = self
            .executors
            .get(account)
            .ok_or_else(|| RouteError::UnknownAccount(account.clone()))?;
        executor.execute(signal).await
    }

    /// Executes `signal` on `target`, falling back to `origin`.
    pub async fn route(
        &self,
        target: &AccountId,
        origin: &AccountId,
        signal: &Signal,
    ) -> Result<ExecutionOutcome, RouteError> {
        let target_error = match self.execute_on(target, signal).await {
            Ok(outcome) => return Ok(outcome),
            Err(e) => e,
        };
        if target == origin {
            return Err(target_error);
        }

        warn!(
            "Router: {} {} could not run on {} ({}), falling back to {}",
            signal.side(),
            signal.instrument(),
            target,
            target_error,
            origin
        );
        self.execute_on(origin, signal)
            .await
            .map_err(|origin_error| RouteError::Exhausted {
                target: target.clone(),
                origin: origin.clone(),
                target_error: Box::new(target_error),
                origin_error: Box::new(origin_error),
            })
    }
}
