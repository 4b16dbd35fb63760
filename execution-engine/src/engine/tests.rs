use super::*;
use crate::models::{EntryOrder, ExitConfig, NewsConfig, SignalConfig, SizingConfig, TunerConfig};
use crate::models::{AdaptiveParameters, RiskLimits};
use broker_gateway::{LogNotifier, PaperBroker};
use chrono::TimeZone;
use trading::{BrokerError, Candle, InstrumentClass, OpenTrade};
use trading_core::admin::CommandEnvelope;
use trading_core::clock::ManualClock;

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 3, 12, 0, 0).unwrap()
}

fn eurusd() -> InstrumentConfig {
    InstrumentConfig::new("EUR_USD", InstrumentClass::Fx, 5, 0.0003, 2, 100_000)
}

fn config(limits: RiskLimits, entry_order: EntryOrder) -> EngineConfig {
    let mut account = AccountConfig::new("primary", "token");
    account.limits = limits;
    account.entry_order = entry_order;
    EngineConfig {
        engine: RuntimeConfig {
            call_timeout_secs: 1,
            price_window: 60,
            ..Default::default()
        },
        accounts: vec![account],
        instruments: vec![eurusd()],
        signal: SignalConfig::default(),
        sizing: SizingConfig::default(),
        exits: ExitConfig::default(),
        tuner: TunerConfig::default(),
        news: NewsConfig::default(),
        defaults: AdaptiveParameters::default(),
    }
}

/// Quiet history: closes alternate by one pip, no breakout, no spike.
fn flat_candles(end: DateTime<Utc>, n: usize) -> Vec<Candle> {
    (0..n)
        .map(|i| {
            let close = if i % 2 == 0 { 1.1000 } else { 1.1001 };
            let time = end - Duration::minutes((n - i) as i64);
            Candle::new(time, close, close, close, close)
        })
        .collect()
}

/// Emits the same buy on EUR_USD every cycle.
struct AlwaysBuy;

impl Strategy for AlwaysBuy {
    fn name(&self) -> &str {
        "always-buy"
    }

    fn evaluate(&mut self, view: &MarketView<'_>) -> Vec<Signal> {
        vec![Signal::new(
            view.instrument.symbol.clone(),
            Side::Buy,
            1.1001,
            1.0981,
            1.1031,
            0.6,
            "always-buy",
        )]
    }
}

struct Harness {
    broker: Arc<PaperBroker>,
    clock: Arc<ManualClock>,
    notifier: Arc<LogNotifier>,
    journal: Arc<ExitJournal>,
    pipeline: AccountPipeline,
}

impl Harness {
    fn new(cfg: EngineConfig) -> Self {
        let broker = Arc::new(PaperBroker::new(100_000.0));
        let clock = Arc::new(ManualClock::new(start()));
        let notifier = Arc::new(LogNotifier::new());
        let journal = Arc::new(ExitJournal::new(Duration::hours(6)));
        let shared = SharedServices {
            notifier: notifier.clone(),
            journal: journal.clone(),
            params: Arc::new(ParameterStore::in_memory(cfg.defaults)),
            clock: clock.clone(),
            news: None,
        };
        let pipeline = AccountPipeline::new(&cfg, &cfg.accounts[0], broker.clone(), &shared);

        broker.set_candles("EUR_USD", flat_candles(start(), 60));
        let harness = Self {
            broker,
            clock,
            notifier,
            journal,
            pipeline,
        };
        harness.quote(1.1000, 1.1002);
        harness
    }

    fn standard() -> Self {
        Self::new(config(RiskLimits::default(), EntryOrder::Market))
    }

    fn always_buy(mut self) -> Self {
        self.pipeline = self.pipeline.with_strategy(Box::new(AlwaysBuy));
        self
    }

    fn quote(&self, bid: f64, ask: f64) {
        let now = self.clock.now();
        self.broker
            .set_quote(PriceSnapshot::new("EUR_USD", bid, ask, true, now));
    }

    fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }
}

fn adopted_trade(id: &str, symbol: &str) -> OpenTrade {
    OpenTrade {
        id: id.to_string(),
        instrument: symbol.to_string(),
        side: Side::Buy,
        units: 1_000,
        price: 1.1000,
        stop_loss: Some(1.0980),
        take_profit: Some(1.1100),
        unrealized_pl: 0.0,
        opened_at: start(),
    }
}

#[tokio::test]
async fn test_breakout_enters_with_brackets() {
    let mut h = Harness::standard();
    let mut candles = flat_candles(start(), 40);
    for (i, close) in [1.1003, 1.1006, 1.1009].into_iter().enumerate() {
        candles.push(Candle::new(
            start() + Duration::minutes(i as i64),
            close,
            close,
            close,
            close,
        ));
    }
    h.broker.set_candles("EUR_USD", candles);
    h.quote(1.10089, 1.10091);

    let report = h.pipeline.run_cycle().await;

    assert_eq!(report.signals, 1);
    assert_eq!(report.fills, 1);
    assert_eq!(h.pipeline.state().daily_trades(), 1);
    let live = h.broker.open_trades().await.unwrap();
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].side, Side::Buy);
    assert!(live[0].has_brackets());
    assert_eq!(h.pipeline.orders().tracker().len(), 1);
}

#[tokio::test]
async fn test_quiet_market_produces_nothing() {
    let mut h = Harness::standard();
    let report = h.pipeline.run_cycle().await;
    assert_eq!(report, CycleReport::default());
    assert_eq!(h.broker.submitted_orders(), 0);
}

#[tokio::test]
async fn test_daily_cap_blocks_until_next_day() {
    let limits = RiskLimits {
        daily_trade_cap: 1,
        ..Default::default()
    };
    let mut h = Harness::new(config(limits, EntryOrder::Market)).always_buy();

    let report = h.pipeline.run_cycle().await;
    assert_eq!((report.signals, report.fills), (1, 1));

    let report = h.pipeline.run_cycle().await;
    assert_eq!(report.signals, 1);
    assert_eq!(report.orders_submitted, 0);
    assert_eq!(h.pipeline.state().daily_trades(), 1);

    h.advance(Duration::days(1));
    h.quote(1.1000, 1.1002);
    h.pipeline.run_cycle().await;
    // The count resets; the retry is then held back by the second-position
    // rule because the first trade is not in profit.
    assert_eq!(h.pipeline.state().daily_trades(), 0);
    assert_eq!(h.broker.open_trades().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_stale_quote_halts_instrument_and_alerts_once() {
    let mut h = Harness::standard();
    let old = start() - Duration::seconds(60);
    h.broker
        .set_quote(PriceSnapshot::new("EUR_USD", 1.1000, 1.1002, true, old));

    let report = h.pipeline.run_cycle().await;
    assert_eq!(report.skipped_instruments, vec!["EUR_USD".to_string()]);
    assert_eq!(h.notifier.messages().len(), 1);

    h.advance(Duration::minutes(1));
    h.quote(1.1000, 1.1002);
    let report = h.pipeline.run_cycle().await;
    assert_eq!(report.skipped_instruments, vec!["EUR_USD".to_string()]);
    assert_eq!(h.notifier.messages().len(), 1);

    h.advance(Duration::minutes(5));
    h.quote(1.1000, 1.1002);
    let report = h.pipeline.run_cycle().await;
    assert!(report.skipped_instruments.is_empty());
}

#[tokio::test]
async fn test_untradeable_quote_halts_after_grace() {
    let mut h = Harness::standard();
    h.broker
        .set_quote(PriceSnapshot::new("EUR_USD", 1.1000, 1.1002, false, start()));

    let report = h.pipeline.run_cycle().await;
    assert_eq!(report.skipped_instruments.len(), 1);
    assert!(h.notifier.messages().is_empty());

    h.advance(Duration::minutes(3));
    let now = h.clock.now();
    h.broker
        .set_quote(PriceSnapshot::new("EUR_USD", 1.1000, 1.1002, false, now));
    h.pipeline.run_cycle().await;
    assert_eq!(h.notifier.messages().len(), 1);
    assert!(h.pipeline.state().instrument_halted("EUR_USD", now));
}

#[tokio::test]
async fn test_malformed_quote_is_skipped_silently() {
    let mut h = Harness::standard().always_buy();
    h.quote(1.1003, 1.1001);

    let report = h.pipeline.run_cycle().await;
    assert_eq!(report.skipped_instruments.len(), 1);
    assert_eq!(report.signals, 0);
    assert!(h.notifier.messages().is_empty());
}

#[tokio::test]
async fn test_dropped_brackets_are_repaired_after_fill() {
    let mut h = Harness::standard().always_buy();
    h.broker.set_drop_brackets(true);

    let report = h.pipeline.run_cycle().await;
    assert_eq!(report.fills, 1);
    let live = h.broker.open_trades().await.unwrap();
    assert!(live[0].has_brackets());
    assert_eq!(h.notifier.messages().len(), 1);

    h.pipeline.run_cycle().await;
    assert_eq!(h.notifier.messages().len(), 1);
}

#[tokio::test]
async fn test_scaled_exits_on_adopted_trade() {
    let mut h = Harness::standard();
    h.broker.insert_trade(adopted_trade("T1", "EUR_USD"));

    // 0.85R
    h.quote(1.1016, 1.1018);
    let report = h.pipeline.run_cycle().await;
    assert_eq!(report.partial_exits, 1);
    assert_eq!(h.broker.trade("T1").unwrap().units, 750);

    // 1.55R: the skipped half step runs before the full exit.
    h.quote(1.1030, 1.1032);
    let report = h.pipeline.run_cycle().await;
    assert_eq!(report.partial_exits, 1);
    assert_eq!(report.full_exits, 1);
    assert!(h.broker.trade("T1").is_none());
    assert_eq!(h.journal.len(), 3);
}

#[tokio::test]
async fn test_cycle_trims_pending_entries_over_cap() {
    let mut h = Harness::standard();
    for i in 0..5 {
        h.broker
            .insert_trade(adopted_trade(&format!("T{}", i), &format!("SYM{}", i)));
    }
    let order = h
        .broker
        .insert_pending_entry("EUR_USD", Side::Buy, 1_000, 1.0950, start());

    let report = h.pipeline.run_cycle().await;
    assert_eq!(report.cancelled, 1);
    assert_eq!(h.broker.cancelled_orders(), vec![order]);
}

#[tokio::test]
async fn test_resting_entry_counts_once_filled() {
    let mut h = Harness::new(config(RiskLimits::default(), EntryOrder::Limit)).always_buy();

    let report = h.pipeline.run_cycle().await;
    assert_eq!(report.orders_submitted, 1);
    assert_eq!(report.fills, 0);
    assert_eq!(h.pipeline.state().daily_trades(), 0);

    // Ask drops to the limit price and the paper broker fills it.
    h.quote(1.0999, 1.1001);
    let report = h.pipeline.run_cycle().await;
    assert_eq!(report.fills, 1);
    assert_eq!(h.pipeline.state().daily_trades(), 1);
}

#[tokio::test]
async fn test_broker_outage_is_contained() {
    let mut h = Harness::standard().always_buy();
    h.broker
        .set_failure(Some(BrokerError::Transport("connection reset".into())));

    let report = h.pipeline.run_cycle().await;
    assert_eq!(report.skipped_instruments, vec!["EUR_USD".to_string()]);
    assert_eq!(report.signals, 0);

    h.broker.set_failure(None);
    let report = h.pipeline.run_cycle().await;
    assert_eq!(report.fills, 1);
}

#[tokio::test]
async fn test_disable_and_enable_trading() {
    let mut h = Harness::standard().always_buy();

    let response = h.pipeline.apply_command(AdminCommand::DisableTrading).await;
    assert_eq!(response, AdminResponse::Ok);
    let report = h.pipeline.run_cycle().await;
    assert_eq!((report.signals, report.orders_submitted), (1, 0));

    h.pipeline.apply_command(AdminCommand::EnableTrading).await;
    let report = h.pipeline.run_cycle().await;
    assert_eq!(report.fills, 1);
}

/// Flat history whose last five bars swing twenty pips, enough to flag a spike.
fn spiking_candles(end: DateTime<Utc>, n: usize) -> Vec<Candle> {
    let mut candles = flat_candles(end, n);
    for (i, candle) in candles.iter_mut().rev().take(5).enumerate() {
        let close = if i % 2 == 0 { 1.1000 } else { 1.1020 };
        *candle = Candle::new(candle.time, close, close, close, close);
    }
    candles
}

async fn desk_signal_units(candles: Vec<Candle>) -> u64 {
    let mut h = Harness::standard();
    h.broker.set_candles("EUR_USD", candles);

    // A cycle with trading off only refreshes the instrument's state.
    h.pipeline.apply_command(AdminCommand::DisableTrading).await;
    let report = h.pipeline.run_cycle().await;
    assert_eq!(report.orders_submitted, 0);
    h.pipeline.apply_command(AdminCommand::EnableTrading).await;

    let signal = Signal::new("EUR_USD", Side::Buy, 1.1001, 1.0981, 1.1031, 0.6, "desk");
    let response = h
        .pipeline
        .apply_command(AdminCommand::ExecuteSignal {
            signal,
            route_to: None,
        })
        .await;
    assert!(matches!(response, AdminResponse::Executed(_)), "{:?}", response);

    let live = h.broker.open_trades().await.unwrap();
    assert_eq!(live.len(), 1);
    live[0].units
}

#[tokio::test]
async fn test_external_signal_on_spiking_instrument_is_halved() {
    assert_eq!(desk_signal_units(flat_candles(start(), 60)).await, 100_000);
    assert_eq!(desk_signal_units(spiking_candles(start(), 60)).await, 50_000);
}

#[tokio::test]
async fn test_risk_fraction_override_is_bounded_and_resets() {
    let mut h = Harness::standard();

    let response = h
        .pipeline
        .apply_command(AdminCommand::SetRiskFraction { fraction: 0.2 })
        .await;
    assert!(matches!(response, AdminResponse::Error(_)));

    let response = h
        .pipeline
        .apply_command(AdminCommand::SetRiskFraction { fraction: 0.02 })
        .await;
    assert_eq!(response, AdminResponse::Ok);
    assert_eq!(h.pipeline.status().current_risk_fraction, 0.02);
    assert_eq!(h.pipeline.status().base_risk_fraction, 0.01);

    h.advance(Duration::days(1));
    h.quote(1.1000, 1.1002);
    h.pipeline.run_cycle().await;
    assert_eq!(h.pipeline.status().current_risk_fraction, 0.01);
}

#[tokio::test]
async fn test_news_halt_command_blocks_entries() {
    let mut h = Harness::standard().always_buy();

    let response = h
        .pipeline
        .apply_command(AdminCommand::SetNewsHalt { minutes: 0 })
        .await;
    assert!(matches!(response, AdminResponse::Error(_)));

    h.pipeline
        .apply_command(AdminCommand::SetNewsHalt { minutes: 30 })
        .await;
    assert_eq!(
        h.pipeline.status().halt_until,
        Some(start() + Duration::minutes(30))
    );
    let report = h.pipeline.run_cycle().await;
    assert_eq!(report.orders_submitted, 0);
}

#[tokio::test]
async fn test_manual_trade_goes_through_sizing_and_gate() {
    let mut h = Harness::standard();

    let response = h
        .pipeline
        .apply_command(AdminCommand::ManualTrade {
            instrument: "EUR_USD".into(),
            side: Side::Buy,
            stop_distance: 0.0020,
            target_distance: 0.0030,
        })
        .await;
    match response {
        AdminResponse::Executed(text) => assert!(text.starts_with("filled"), "{}", text),
        other => panic!("unexpected {:?}", other),
    }
    let tracked = h.pipeline.orders().tracker().ids();
    let trade = h.pipeline.orders().tracker().get(&tracked[0]).unwrap();
    assert_eq!(trade.strategy, MANUAL_TAG);
    assert_eq!(h.pipeline.state().daily_trades(), 1);

    let response = h
        .pipeline
        .apply_command(AdminCommand::ManualTrade {
            instrument: "EUR_USD".into(),
            side: Side::Sell,
            stop_distance: -1.0,
            target_distance: 0.0030,
        })
        .await;
    assert!(matches!(response, AdminResponse::Error(_)));

    let response = h
        .pipeline
        .apply_command(AdminCommand::ManualTrade {
            instrument: "XAU_USD".into(),
            side: Side::Buy,
            stop_distance: 1.0,
            target_distance: 2.0,
        })
        .await;
    assert!(matches!(response, AdminResponse::Error(_)));
}

#[tokio::test]
async fn test_status_reports_account_state() {
    let mut h = Harness::standard();
    h.pipeline.apply_command(AdminCommand::DisableTrading).await;

    let AdminResponse::Status(status) = h.pipeline.apply_command(AdminCommand::Status).await
    else {
        panic!("expected a status report");
    };
    assert_eq!(status.account, AccountId::new("primary"));
    assert!(!status.trading_enabled);
    assert_eq!(status.daily_trades, 0);
    assert_eq!(status.daily_cap, 10);
    assert_eq!(status.tracked_trades, 0);
}

#[tokio::test]
async fn test_account_task_serves_commands_and_signals() {
    let h = Harness::standard();
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let (handle, task) = spawn_account(
        h.pipeline,
        std::time::Duration::from_secs(3600),
        shutdown_rx,
    );

    let (envelope, reply) =
        CommandEnvelope::with_reply(AccountId::new("primary"), AdminCommand::Status);
    handle.send_command(envelope).unwrap();
    assert!(matches!(reply.await.unwrap(), AdminResponse::Status(_)));

    let signal = Signal::new("EUR_USD", Side::Buy, 1.1001, 1.0981, 1.1031, 0.6, "routed");
    let outcome = crate::router::SignalExecutor::execute(&handle, &signal)
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        ExecutionOutcome::Submitted(EntryOutcome::Filled { .. })
    ));

    shutdown_tx.send(true).unwrap();
    task.await.unwrap();
    assert!(!handle.is_running());
}
