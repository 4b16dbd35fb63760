use anyhow::{Context, Result};
use async_trait::async_trait;
use broker_gateway::{LogNotifier, PaperBroker, SyntheticFeed};
use chrono::Duration as ChronoDuration;
use clap::Parser;
use execution_engine::engine::{spawn_account, AccountPipeline, SharedServices};
use execution_engine::io::{forward_json_lines, CommandPoller};
use execution_engine::models::{EngineConfig, ExitJournal, EXIT_JOURNAL_FILE};
use execution_engine::router::AccountRouter;
use execution_engine::tuner::{AdaptiveTuner, ParameterStore};
use log::{error, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;
use trading::{InstrumentClass, InstrumentConfig};
use trading_core::admin::ChannelInbox;
use trading_core::args::EngineArgs;
use trading_core::clock::{Clock, SystemClock};
use trading_core::framework::{run_every, Cycle, Shutdown};

/// Advances the synthetic market behind one paper account.
struct PaperMarket {
    name: String,
    feed: SyntheticFeed,
    broker: Arc<PaperBroker>,
    clock: Arc<dyn Clock>,
}

#[async_trait]
impl Cycle for PaperMarket {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run_cycle(&mut self) {
        self.feed.step(&self.broker, self.clock.now());
    }
}

/// Starting mid, spread and per-step move for a synthetic instrument.
fn paper_walk(instrument: &InstrumentConfig) -> (f64, f64, f64) {
    let start = match instrument.class {
        InstrumentClass::Fx => 1.1,
        InstrumentClass::JpyFx => 150.0,
        InstrumentClass::Metal => 2300.0,
    };
    (start, instrument.max_spread / 2.0, 0.0005)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = EngineArgs::parse();
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(args.get_log_level()),
    )
    .init();

    let mut config = EngineConfig::load(&args.get_config_path()).with_context(|| {
        format!("Failed to load {}", args.get_config_path().display())
    })?;
    if let Some(dir) = args.get_data_dir() {
        config = config.with_data_dir(dir);
    }
    config.validate().context("Invalid configuration")?;

    let data_dir = config.engine.data_dir.clone();
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create {}", data_dir.display()))?;
    info!(
        "Starting with {} accounts, {} instruments, data in {}",
        config.accounts.len(),
        config.instruments.len(),
        data_dir.display()
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let journal = Arc::new(
        ExitJournal::new(ChronoDuration::hours(config.tuner.window_hours))
            .with_csv(data_dir.join(EXIT_JOURNAL_FILE)),
    );
    let params = Arc::new(ParameterStore::open(&data_dir, config.defaults));
    let shared = SharedServices {
        notifier: Arc::new(LogNotifier::new()),
        journal: journal.clone(),
        params: params.clone(),
        clock: clock.clone(),
        news: None,
    };
    info!("No news provider configured, halt/throttle windows come from operators only");

    let shutdown = Shutdown::new();
    let cycle = Duration::from_secs(config.engine.cycle_secs);
    let mut tasks = Vec::new();
    let mut handles = Vec::new();
    let mut router = AccountRouter::new();

    for (idx, account) in config.accounts.iter().enumerate() {
        let broker = Arc::new(PaperBroker::new(args.get_paper_equity()));
        let mut feed = SyntheticFeed::new(idx as u64 + 1);
        for inst in &config.instruments {
            let (mid, spread, step) = paper_walk(inst);
            feed = feed.with_instrument(&inst.symbol, mid, spread, step);
        }
        feed.warm_up(
            &broker,
            config.engine.price_window,
            clock.now(),
            ChronoDuration::seconds(config.engine.cycle_secs as i64),
        );
        info!("[{}] Paper account with {:.2} equity", account.id, broker.balance());

        let mut market = PaperMarket {
            name: format!("paper-market-{}", account.id),
            feed,
            broker: broker.clone(),
            clock: clock.clone(),
        };
        let rx = shutdown.subscribe();
        tasks.push(tokio::spawn(async move {
            run_every(&mut market, cycle, rx).await;
        }));

        let pipeline = AccountPipeline::new(&config, account, broker, &shared);
        let (handle, task) = spawn_account(pipeline, cycle, shutdown.subscribe());
        router.register(handle.account().clone(), Arc::new(handle.clone()));
        handles.push(handle);
        tasks.push(task);
    }

    let mut tuner = AdaptiveTuner::new(params, journal, config.tuner.clone(), clock.clone());
    let tuner_period = Duration::from_secs(config.engine.tuner_secs);
    let rx = shutdown.subscribe();
    tasks.push(tokio::spawn(async move {
        run_every(&mut tuner, tuner_period, rx).await;
    }));

    let (command_tx, inbox) = ChannelInbox::new();
    // Detached: stdin reads cannot be interrupted and end with the process.
    tokio::spawn(forward_json_lines(
        BufReader::new(tokio::io::stdin()),
        command_tx,
    ));
    let mut poller = CommandPoller::new(Box::new(inbox), handles, Arc::new(router));
    let poll_period = Duration::from_secs(config.engine.command_poll_secs);
    let rx = shutdown.subscribe();
    tasks.push(tokio::spawn(async move {
        run_every(&mut poller, poll_period, rx).await;
    }));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Shutdown requested, finishing current cycles");
    shutdown.trigger();

    for task in tasks {
        if let Err(e) = task.await {
            error!("Task ended abnormally: {}", e);
        }
    }
    info!("All tasks stopped");
    Ok(())
}
