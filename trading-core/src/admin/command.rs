use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use trading::{AccountId, Side, Signal};

/// Represents an operator command for one account.
///
/// Using an Enum ensures type safety and prevents invalid command strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AdminCommand {
    /// Allow new entries again.
    EnableTrading,

    /// Stop opening new positions. Open trades keep being managed.
    DisableTrading,

    /// Override the share of equity risked per trade until the next UTC day.
    SetRiskFraction { fraction: f64 },

    /// Block new entries for the given number of minutes.
    SetNewsHalt { minutes: i64 },

    /// Open a position now, subject to sizing and the risk gate.
    ManualTrade {
        instrument: String,
        side: Side,
        stop_distance: f64,
        target_distance: f64,
    },

    /// Execute a fully specified signal, optionally on another account.
    /// Falls back to the addressed account if the target cannot take it.
    ExecuteSignal {
        signal: Signal,
        #[serde(default)]
        route_to: Option<AccountId>,
    },

    /// Request a status report.
    Status,
}

/// Represents a response sent back from the account that handled a command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AdminResponse {
    /// Command processed successfully.
    Ok,

    /// Command failed with an error message.
    Error(String),

    /// Requested status.
    Status(StatusReport),

    /// What happened to a trade request: submitted, skipped or rejected.
    Executed(String),
}

/// Snapshot of an account's risk state and tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub account: AccountId,
    pub trading_enabled: bool,
    pub daily_trades: u32,
    pub daily_cap: u32,
    pub halt_until: Option<DateTime<Utc>>,
    pub throttle_until: Option<DateTime<Utc>>,
    pub base_risk_fraction: f64,
    pub current_risk_fraction: f64,
    pub tracked_trades: usize,
}

/// Wire form of a command: which account, and what to do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressedCommand {
    pub account: AccountId,
    pub command: AdminCommand,
}

/// A command in flight, with an optional channel for the reply.
#[derive(Debug)]
pub struct CommandEnvelope {
    pub account: AccountId,
    pub command: AdminCommand,
    pub reply: Option<oneshot::Sender<AdminResponse>>,
}

impl CommandEnvelope {
    pub fn new(account: AccountId, command: AdminCommand) -> Self {
        Self {
            account,
            command,
            reply: None,
        }
    }

    /// Builds an envelope together with the receiver of its reply.
    pub fn with_reply(
        account: AccountId,
        command: AdminCommand,
    ) -> (Self, oneshot::Receiver<AdminResponse>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                account,
                command,
                reply: Some(tx),
            },
            rx,
        )
    }

    /// Sends the reply if anyone is waiting for it.
    pub fn respond(self, response: AdminResponse) {
        if let Some(reply) = self.reply {
            // Requester may have given up; nothing to do then.
            let _ = reply.send(response);
        }
    }
}

impl From<AddressedCommand> for CommandEnvelope {
    fn from(cmd: AddressedCommand) -> Self {
        CommandEnvelope::new(cmd.account, cmd.command)
    }
}
