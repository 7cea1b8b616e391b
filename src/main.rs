//! MT5 Profit/Loss Calculator
//!
//! Processes every configured account and reports current and potential
//! profit/loss to the console and a JSON file.

use chrono::Local;
use clap::Parser;
use profit_loss_calculator::{
    account::AccountRunner,
    cache::SnapshotCache,
    config::{Config, TerminalKind},
    pnl::PnlEngine,
    report::{render_summary, save_json_output},
    terminal::{BridgeTerminal, SnapshotTerminal, TradingTerminal},
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const EXIT_INTERRUPTED: u8 = 130;

#[derive(Parser)]
#[command(name = "pl-calculator", version)]
#[command(about = "Profit/loss calculator for MT5 accounts")]
struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Log level (trace, debug, info, warn, error); RUST_LOG wins if set
    #[arg(long)]
    log_level: Option<String>,

    /// Write logs to this file instead of the configured log directory
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Process only this account login
    #[arg(short, long)]
    account: Option<u64>,

    /// Skip the console report
    #[arg(long)]
    no_console: bool,

    /// Only write the JSON file
    #[arg(long)]
    json_only: bool,

    /// Check the configuration and exit
    #[arg(long)]
    validate_only: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("Fatal error: {:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<ExitCode> {
    if let Err(e) = dotenvy::dotenv() {
        if !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    let cli = Cli::parse();

    let config = Config::load(&cli.config)
        .map_err(|e| anyhow::anyhow!("Failed to load config from {}: {}", cli.config, e))?;

    let log_path = init_logging(&cli, &config)?;

    tracing::info!("MT5 Profit/Loss Calculator v{}", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &log_path {
        tracing::info!("Logging to {}", path.display());
    }
    log_config_summary(&config);

    let problems = config.validate();
    if !problems.is_empty() {
        for problem in &problems {
            tracing::error!("Configuration error: {}", problem);
        }
        return Ok(ExitCode::FAILURE);
    }
    if cli.validate_only {
        tracing::info!("Configuration is valid");
        return Ok(ExitCode::SUCCESS);
    }

    let terminal: Arc<dyn TradingTerminal> = match config.terminal.kind {
        TerminalKind::Snapshot => Arc::new(SnapshotTerminal::new(config.terminal.snapshot_path()?)),
        TerminalKind::Bridge => Arc::new(BridgeTerminal::new(
            &config.terminal.bridge_url,
            config.terminal.timeout(),
        )?),
    };

    let engine = PnlEngine::new(config.rates.table(), config.validation.engine_options());
    let cache = SnapshotCache::new(config.cache.policy(), config.magic_filter.filter());
    let mut runner = AccountRunner::new(
        terminal.clone(),
        engine,
        cache,
        config.processing.retry_policy(),
    )
    .with_account_delay(config.processing.account_delay());

    let accounts = config.credentials()?;

    let batch = tokio::select! {
        batch = runner.run(&accounts, cli.account) => batch,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted, disconnecting from terminal");
            if let Err(e) = terminal.disconnect().await {
                tracing::warn!("Disconnect after interrupt failed: {}", e);
            }
            return Ok(ExitCode::from(EXIT_INTERRUPTED));
        }
    };

    let show_console = config.output.console && !cli.no_console && !cli.json_only;
    let write_json = config.output.json || cli.json_only;

    if show_console {
        println!("{}", render_summary(&batch));
    }
    if write_json {
        let output_dir = config.output.output_path()?;
        if let Err(e) = save_json_output(&batch, &output_dir, Local::now()) {
            tracing::error!("Failed to save JSON output: {}", e);
        }
    }

    let outcome = batch.outcome();
    tracing::info!(
        "Finished: {} of {} accounts processed successfully ({:?})",
        batch.processing_info.accounts_processed_successfully,
        batch.processing_info.total_accounts,
        outcome
    );
    Ok(ExitCode::from(outcome.exit_code()))
}

/// Stdout layer always; a plain-text file layer when requested.
/// Returns the log file path, if any.
fn init_logging(cli: &Cli, config: &Config) -> anyhow::Result<Option<PathBuf>> {
    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let log_path = match &cli.log_file {
        Some(path) => Some(path.clone()),
        None if config.logging.to_file => Some(config.logging.log_path()?.join(format!(
            "profit_loss_calculator_{}.log",
            Local::now().format("%Y%m%d_%H%M%S")
        ))),
        None => None,
    };

    let file_layer = match &log_path {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = std::fs::File::create(path)?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Arc::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    Ok(log_path)
}

fn log_config_summary(config: &Config) {
    tracing::info!("Accounts configured: {}", config.accounts.len());
    tracing::info!("Terminal: {:?}", config.terminal.kind);
    tracing::info!(
        "Rate table: {} symbols (standard table {})",
        config.rates.table().len(),
        if config.rates.use_standard { "on" } else { "off" }
    );
    tracing::info!(
        "Cache: positions {}s, orders {}s",
        config.cache.position_ttl_secs,
        config.cache.order_ttl_secs
    );
    tracing::info!(
        "Connect attempts: {}, retry delay {}s, account delay {:?}",
        config.processing.connect_attempts,
        config.processing.retry_delay_secs,
        config.processing.account_delay()
    );
    if config.magic_filter.enabled {
        tracing::info!("Magic number filter: {:?}", config.magic_filter.numbers);
    }
}
