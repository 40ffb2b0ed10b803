use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use yyl_trader::api::{Interval, MarketDataSource, UpbitClient};
use yyl_trader::config::{EngineConfig, Secrets};
use yyl_trader::execution::{run_scheduled, AppContext, PaperAccount, TradingEngine};
use yyl_trader::notify::{LogNotifier, Notifier, SlackNotifier};
use yyl_trader::persistence::{LogTradeSink, RedisTradeSink, TradeSink};
use yyl_trader::strategy::YingYangStrategy;

const LOG_FILE_NAME: &str = "trading_bot.log";

#[derive(Parser)]
#[command(
    name = "yyl-trader",
    about = "YingYang volatility trading bot for Upbit spot markets"
)]
struct Cli {
    /// Market to trade, e.g. KRW-BTC. Overrides YYL_SYMBOL.
    #[arg(long, global = true)]
    symbol: Option<String>,

    /// Candle interval (minute1..minute240, day). Overrides YYL_INTERVAL.
    #[arg(long, global = true)]
    interval: Option<Interval>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Trade on every candle boundary until Ctrl+C
    Run,
    /// Run a single decision cycle and exit
    Once,
    /// Print the latest indicator reading and decision without trading
    Signal,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = EngineConfig::load().context("Failed to load configuration")?;
    setup_logging(config.log_dir.as_deref())?;

    if let Some(symbol) = cli.symbol {
        config.symbol = symbol;
    }
    if let Some(interval) = cli.interval {
        config.interval = interval;
    }
    config.validate()?;
    for warning in config.warnings() {
        tracing::warn!("{}", warning);
    }

    match cli.command {
        Commands::Run => run(config).await,
        Commands::Once => once(config).await,
        Commands::Signal => signal(config).await,
    }
}

// ============================================================================
// Commands
// ============================================================================

async fn run(config: EngineConfig) -> Result<()> {
    tracing::info!("🚀 yyl-trader starting for {} on {}", config.symbol, config.interval);

    let ctx = build_context(&config).await?;
    let mut engine = TradingEngine::new(config)?;
    engine.startup(&ctx).await?;

    let shutdown = ctx.shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("⚠️  Received Ctrl+C, finishing current cycle and shutting down...");
            shutdown.cancel();
        }
    });

    tracing::info!("Press Ctrl+C to stop...");
    run_scheduled(&mut engine, &ctx).await?;

    engine.announce_stop(&ctx).await;
    tracing::info!("👋 yyl-trader stopped");
    Ok(())
}

async fn once(config: EngineConfig) -> Result<()> {
    let ctx = build_context(&config).await?;
    let mut engine = TradingEngine::new(config)?;
    engine.startup(&ctx).await?;

    let report = engine.run_cycle(&ctx).await?;
    println!("{}", report.event.summary());
    if let Some(decision) = report.decision {
        println!("{}", serde_json::to_string_pretty(&decision)?);
    }
    println!(
        "Cash: {:.2} | Holding: {:.8}",
        report.balance.cash, report.balance.symbol_quantity
    );
    Ok(())
}

async fn signal(config: EngineConfig) -> Result<()> {
    let client = UpbitClient::new()?;
    let candles = client
        .fetch_candles(&config.symbol, config.interval, config.candle_count)
        .await?;

    let strategy = YingYangStrategy::new(config.indicator, config.signal.clone())?;
    let (points, decision) = strategy.analyze(&candles)?;

    if let Some(point) = points.last() {
        println!("{}", serde_json::to_string_pretty(point)?);
    }
    println!("{}", serde_json::to_string_pretty(&decision)?);
    println!(
        "{} {}: {:?} (status {} -> {})",
        config.symbol, decision.timestamp, decision.entry, decision.status_prev, decision.status_current
    );
    Ok(())
}

// ============================================================================
// Initialization Functions
// ============================================================================

fn setup_logging(log_dir: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("yyl_trader=info"));

    let file_layer = match log_dir {
        Some(dir) => {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(dir.join(LOG_FILE_NAME))
                .context("Failed to open log file")?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();
    Ok(())
}

async fn build_context(config: &EngineConfig) -> Result<AppContext> {
    let secrets = Secrets::from_env();

    let paper = Arc::new(PaperAccount::new(
        config.quote_currency.clone(),
        config.initial_cash,
        config.paper_fee_rate,
    )?);
    tracing::info!(
        "📝 Paper trading with {:.2} {} (fee rate {})",
        config.initial_cash,
        config.quote_currency,
        paper.fee_rate()
    );

    let sink: Arc<dyn TradeSink> = match secrets.redis_url.as_deref() {
        Some(url) => match RedisTradeSink::new(url).await {
            Ok(sink) => Arc::new(sink),
            Err(e) => {
                tracing::warn!("Redis unavailable ({:#}), trades will only be logged", e);
                Arc::new(LogTradeSink)
            }
        },
        None => Arc::new(LogTradeSink),
    };

    let notifier: Arc<dyn Notifier> = match secrets.slack_webhook_url {
        Some(url) => Arc::new(SlackNotifier::new(url)?),
        None => Arc::new(LogNotifier),
    };

    Ok(AppContext {
        market_data: Arc::new(UpbitClient::new()?),
        executor: paper.clone(),
        balances: paper,
        sink,
        notifier,
        shutdown: CancellationToken::new(),
    })
}
