use broker_gateway::{LogNotifier, PaperBroker};
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use execution_engine::engine::{spawn_account, AccountPipeline, SharedServices};
use execution_engine::io::CommandPoller;
use execution_engine::models::{EngineConfig, ExitJournal};
use execution_engine::router::AccountRouter;
use execution_engine::tuner::ParameterStore;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use trading::{AccountId, Broker, BrokerError, Candle, PriceSnapshot, Side, Signal};
use trading_core::admin::{AdminCommand, AdminResponse, ChannelInbox, CommandEnvelope};
use trading_core::clock::ManualClock;
use trading_core::framework::Shutdown;

const CONFIG: &str = r#"
    [engine]
    call_timeout_secs = 1
    price_window = 60

    [[accounts]]
    id = "primary"
    api_token = "paper"

    [[accounts]]
    id = "secondary"
    api_token = "paper"

    [[instruments]]
    symbol = "EUR_USD"
    precision = 5
    max_spread = 0.0003
    max_positions = 2
    max_order_size = 100000
"#;

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 3, 12, 0, 0).unwrap()
}

fn paper_broker() -> Arc<PaperBroker> {
    let broker = Arc::new(PaperBroker::new(100_000.0));
    let candles = (0..60)
        .map(|i| {
            let close = if i % 2 == 0 { 1.1000 } else { 1.1001 };
            let t = start() - ChronoDuration::minutes(60 - i);
            Candle::new(t, close, close, close, close)
        })
        .collect();
    broker.set_candles("EUR_USD", candles);
    broker.set_quote(PriceSnapshot::new("EUR_USD", 1.1000, 1.1002, true, start()));
    broker
}

struct Desk {
    brokers: Vec<Arc<PaperBroker>>,
    poller: CommandPoller,
    inbox: tokio::sync::mpsc::UnboundedSender<CommandEnvelope>,
    shutdown: Shutdown,
    tasks: Vec<tokio::task::JoinHandle<()>>,
}

/// Two paper accounts, each in its own task, behind one router and poller.
fn desk() -> Desk {
    let cfg = EngineConfig::from_toml_str(CONFIG).unwrap();
    cfg.validate().unwrap();
    let shared = SharedServices {
        notifier: Arc::new(LogNotifier::new()),
        journal: Arc::new(ExitJournal::new(ChronoDuration::hours(6))),
        params: Arc::new(ParameterStore::in_memory(cfg.defaults)),
        clock: Arc::new(ManualClock::new(start())),
        news: None,
    };

    let shutdown = Shutdown::new();
    let mut router = AccountRouter::new();
    let mut brokers = Vec::new();
    let mut handles = Vec::new();
    let mut tasks = Vec::new();
    for account in &cfg.accounts {
        let broker = paper_broker();
        let pipeline = AccountPipeline::new(&cfg, account, broker.clone(), &shared);
        let (handle, task) =
            spawn_account(pipeline, Duration::from_secs(3600), shutdown.subscribe());
        router.register(account.account_id(), Arc::new(handle.clone()));
        brokers.push(broker);
        handles.push(handle);
        tasks.push(task);
    }

    let (inbox, source) = ChannelInbox::new();
    let poller = CommandPoller::new(Box::new(source), handles, Arc::new(router));
    Desk {
        brokers,
        poller,
        inbox,
        shutdown,
        tasks,
    }
}

impl Desk {
    async fn send(&mut self, account: &str, command: AdminCommand) -> AdminResponse {
        let (env, reply) = CommandEnvelope::with_reply(AccountId::new(account), command);
        self.inbox.send(env).unwrap();
        self.poller.poll_once().await;
        reply.await.unwrap()
    }

    async fn stop(self) {
        self.shutdown.trigger();
        for task in self.tasks {
            task.await.unwrap();
        }
    }
}

fn routed_signal() -> Signal {
    Signal::new("EUR_USD", Side::Buy, 1.1001, 1.0981, 1.1031, 0.6, "routed")
}

#[tokio::test]
async fn test_routed_signal_runs_on_target_account() {
    let mut desk = desk();
    let response = desk
        .send(
            "primary",
            AdminCommand::ExecuteSignal {
                signal: routed_signal(),
                route_to: Some(AccountId::new("secondary")),
            },
        )
        .await;

    assert!(matches!(response, AdminResponse::Executed(ref s) if s.starts_with("filled")));
    assert!(desk.brokers[0].open_trades().await.unwrap().is_empty());
    assert_eq!(desk.brokers[1].open_trades().await.unwrap().len(), 1);
    desk.stop().await;
}

#[tokio::test]
async fn test_failed_target_falls_back_to_origin() {
    let mut desk = desk();
    desk.brokers[1].set_failure(Some(BrokerError::Transport("down".into())));

    let response = desk
        .send(
            "primary",
            AdminCommand::ExecuteSignal {
                signal: routed_signal(),
                route_to: Some(AccountId::new("secondary")),
            },
        )
        .await;

    assert!(matches!(response, AdminResponse::Executed(_)));
    assert_eq!(desk.brokers[0].open_trades().await.unwrap().len(), 1);
    desk.stop().await;
}

#[tokio::test]
async fn test_commands_stay_with_their_account() {
    let mut desk = desk();
    assert_eq!(
        desk.send("secondary", AdminCommand::DisableTrading).await,
        AdminResponse::Ok
    );

    let AdminResponse::Status(primary) = desk.send("primary", AdminCommand::Status).await else {
        panic!("expected status");
    };
    let AdminResponse::Status(secondary) = desk.send("secondary", AdminCommand::Status).await
    else {
        panic!("expected status");
    };
    assert!(primary.trading_enabled);
    assert!(!secondary.trading_enabled);

    let response = desk
        .send(
            "secondary",
            AdminCommand::ExecuteSignal {
                signal: routed_signal(),
                route_to: None,
            },
        )
        .await;
    match response {
        AdminResponse::Executed(text) => assert!(text.starts_with("rejected"), "{}", text),
        other => panic!("unexpected {:?}", other),
    }
    desk.stop().await;
}

#[test]
fn test_shipped_config_is_valid() {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../config/engine.toml");
    let cfg = EngineConfig::load(&path).unwrap();
    cfg.validate().unwrap();
    assert_eq!(cfg.accounts.len(), 2);
    assert!(cfg.instrument("XAU_USD").is_some());
}
