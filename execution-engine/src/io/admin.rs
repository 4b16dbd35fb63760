use crate::engine::AccountHandle;
use crate::router::AccountRouter;
use async_trait::async_trait;
use log::{error, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use trading::AccountId;
use trading_core::admin::{
    AddressedCommand, AdminCommand, AdminResponse, CommandEnvelope, CommandSource,
};
use trading_core::framework::Cycle;

/// Polls the operator inbox and delivers each command to the task that
/// owns the addressed account. Routed signals go through the router.
pub struct CommandPoller {
    source: Box<dyn CommandSource>,
    accounts: HashMap<AccountId, AccountHandle>,
    router: Arc<AccountRouter>,
}

impl CommandPoller {
    pub fn new(
        source: Box<dyn CommandSource>,
        accounts: Vec<AccountHandle>,
        router: Arc<AccountRouter>,
    ) -> Self {
        Self {
            source,
            accounts: accounts
                .into_iter()
                .map(|h| (h.account().clone(), h))
                .collect(),
            router,
        }
    }

    /// Drains the source once. Returns how many commands were dispatched.
    pub async fn poll_once(&mut self) -> usize {
        let envelopes = self.source.poll().await;
        let count = envelopes.len();
        for envelope in envelopes {
            self.dispatch(envelope);
        }
        count
    }

    fn dispatch(&self, envelope: CommandEnvelope) {
        if let AdminCommand::ExecuteSignal {
            route_to: Some(target),
            ..
        } = &envelope.command
        {
            let target = target.clone();
            self.route(target, envelope);
            return;
        }

        match self.accounts.get(&envelope.account) {
            Some(handle) if handle.is_running() => {
                let account = envelope.account.clone();
                if let Err(e) = handle.send_command(envelope) {
                    warn!("Admin: could not deliver command to {}: {}", account, e);
                }
            }
            _ => {
                warn!("Admin: no running account {}", envelope.account);
                let reply = format!("unknown account {}", envelope.account);
                envelope.respond(AdminResponse::Error(reply));
            }
        }
    }

    /// Routing waits on the target account's task, so it runs off the
    /// polling loop.
    fn route(&self, target: AccountId, envelope: CommandEnvelope) {
        let router = self.router.clone();
        tokio::spawn(async move {
            let CommandEnvelope {
                account,
                command,
                reply,
            } = envelope;
            let AdminCommand::ExecuteSignal { signal, .. } = command else {
                return;
            };
            let response = match router.route(&target, &account, &signal).await {
                Ok(outcome) => AdminResponse::Executed(outcome.to_string()),
                Err(e) => {
                    error!("Admin: routed signal on {} failed: {}", signal.instrument(), e);
                    AdminResponse::Error(e.to_string())
                }
            };
            if let Some(reply) = reply {
                let _ = reply.send(response);
            }
        });
    }
}

#[async_trait]
impl Cycle for CommandPoller {
    fn name(&self) -> &str {
        "command-poller"
    }

    async fn run_cycle(&mut self) {
        self.poll_once().await;
    }
}

/// Reads one JSON `AddressedCommand` per line from `reader` and forwards it
/// to `tx`. Responses are logged. Returns when the reader is exhausted or
/// the inbox is gone.
pub async fn forward_json_lines<R>(reader: R, tx: mpsc::UnboundedSender<CommandEnvelope>)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!("Admin: failed to read command: {}", e);
                break;
            }
        };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let cmd: AddressedCommand = match serde_json::from_str(trimmed) {
            Ok(cmd) => cmd,
            Err(e) => {
                warn!("Admin: invalid command JSON: {}", e);
                continue;
            }
        };
        info!("Admin: received {:?} for {}", cmd.command, cmd.account);

        let (envelope, rx) = CommandEnvelope::with_reply(cmd.account, cmd.command);
        if tx.send(envelope).is_err() {
            break;
        }
        tokio::spawn(async move {
            match rx.await {
                Ok(response) => info!("Admin: response {:?}", response),
                Err(_) => warn!("Admin: command dropped without a response"),
            }
        });
    }
}
