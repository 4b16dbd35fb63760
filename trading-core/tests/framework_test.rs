use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use trading::AccountId;
use trading_core::admin::{
    AdminCommand, AdminResponse, ChannelInbox, CommandEnvelope, CommandSource,
};
use trading_core::framework::{run_every, Cycle, Shutdown};
use trading_core::fs::{append_json_line, load_state_or_default, save_state};

struct Counter {
    passes: Arc<AtomicUsize>,
}

#[async_trait]
impl Cycle for Counter {
    fn name(&self) -> &str {
        "counter"
    }

    async fn run_cycle(&mut self) {
        self.passes.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test(start_paused = true)]
async fn test_run_every_ticks_until_shutdown() {
    let passes = Arc::new(AtomicUsize::new(0));
    let shutdown = Shutdown::new();
    let mut counter = Counter {
        passes: passes.clone(),
    };
    let rx = shutdown.subscribe();
    let task = tokio::spawn(async move {
        run_every(&mut counter, Duration::from_secs(10), rx).await;
    });

    // Immediate first pass, then one per period.
    tokio::time::sleep(Duration::from_secs(25)).await;
    shutdown.trigger();
    task.await.unwrap();

    assert_eq!(passes.load(Ordering::SeqCst), 3);
    assert!(shutdown.is_triggered());
}

#[tokio::test]
async fn test_triggered_shutdown_runs_nothing() {
    let passes = Arc::new(AtomicUsize::new(0));
    let shutdown = Shutdown::new();
    shutdown.trigger();
    let mut counter = Counter {
        passes: passes.clone(),
    };
    run_every(&mut counter, Duration::from_millis(1), shutdown.subscribe()).await;
    assert_eq!(passes.load(Ordering::SeqCst), 0);
}

#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    instruments: Vec<String>,
}

#[test]
fn test_state_survives_restart() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("state").join("snapshot.json");

    let missing: Snapshot = load_state_or_default(&path, Snapshot::default);
    assert_eq!(missing, Snapshot::default());

    let saved = Snapshot {
        version: 2,
        instruments: vec!["EUR_USD".into(), "XAU_USD".into()],
    };
    save_state(&path, &saved)?;
    let loaded: Snapshot = load_state_or_default(&path, Snapshot::default);
    assert_eq!(loaded, saved);

    let log = dir.path().join("audit.jsonl");
    append_json_line(&log, &saved)?;
    append_json_line(&log, &Snapshot::default())?;
    assert_eq!(std::fs::read_to_string(&log)?.lines().count(), 2);
    Ok(())
}

#[tokio::test]
async fn test_inbox_delivers_in_order_with_replies() {
    let (tx, mut inbox) = ChannelInbox::new();
    let account = AccountId::new("primary");
    tx.send(CommandEnvelope::new(account.clone(), AdminCommand::DisableTrading))
        .unwrap();
    let (env, reply) = CommandEnvelope::with_reply(account.clone(), AdminCommand::Status);
    tx.send(env).unwrap();

    let mut drained = inbox.poll().await;
    assert_eq!(drained.len(), 2);
    assert_eq!(drained[0].command, AdminCommand::DisableTrading);

    drained.pop().unwrap().respond(AdminResponse::Ok);
    assert_eq!(reply.await.unwrap(), AdminResponse::Ok);
    assert!(inbox.poll().await.is_empty());
}
