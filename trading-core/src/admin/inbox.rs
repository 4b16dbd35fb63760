use super::command::CommandEnvelope;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Where operator commands come from (chat bot, stdin, tests).
///
/// Polled on a short interval; `poll` must not block waiting for input.
#[async_trait]
pub trait CommandSource: Send {
    /// Drains every command that arrived since the previous poll.
    async fn poll(&mut self) -> Vec<CommandEnvelope>;
}

/// Command source fed through an in-process channel.
pub struct ChannelInbox {
    rx: mpsc::UnboundedReceiver<CommandEnvelope>,
}

impl ChannelInbox {
    /// Creates the inbox together with the sender producers write into.
    pub fn new() -> (mpsc::UnboundedSender<CommandEnvelope>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { rx })
    }
}

#[async_trait]
impl CommandSource for ChannelInbox {
    async fn poll(&mut self) -> Vec<CommandEnvelope> {
        let mut drained = Vec::new();
        while let Ok(envelope) = self.rx.try_recv() {
            drained.push(envelope);
        }
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admin::AdminCommand;
    use trading::AccountId;

    #[tokio::test]
    async fn test_poll_drains_without_blocking() {
        let (tx, mut inbox) = ChannelInbox::new();
        assert!(inbox.poll().await.is_empty());

        tx.send(CommandEnvelope::new(AccountId::new("a"), AdminCommand::EnableTrading))
            .unwrap();
        tx.send(CommandEnvelope::new(AccountId::new("b"), AdminCommand::Status))
            .unwrap();

        let drained = inbox.poll().await;
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[1].account, AccountId::new("b"));
        assert!(inbox.poll().await.is_empty());
    }
}
