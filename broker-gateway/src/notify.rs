use async_trait::async_trait;
use log::warn;
use std::sync::Mutex;
use trading::{BrokerError, Notifier};

/// Alert sink that writes every message to the log at warn level and keeps
/// a copy for inspection.
#[derive(Debug, Default)]
pub struct LogNotifier {
    sent: Mutex<Vec<String>>,
}

impl LogNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, message: &str) -> Result<(), BrokerError> {
        warn!("ALERT: {}", message);
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(message.to_string());
        Ok(())
    }
}
