//! tgcf-live - Live-mode daemon
//!
//! Runs the random archive reposter: one background task per active source,
//! until SIGINT or SIGTERM.

use clap::Parser;
use libtgcf::chat::telegram::TelegramClient;
use libtgcf::logging::{LogFormat, LoggingConfig};
use libtgcf::random::{CycleOutcome, RandomHandler};
use libtgcf::{Config, Database, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "tgcf-live")]
#[command(version)]
#[command(about = "Live-mode daemon reposting random archive messages")]
#[command(long_about = "\
tgcf-live - Live-mode daemon reposting random archive messages

DESCRIPTION:
    tgcf-live reposts random historical messages from the source chats
    listed in live.random_active_sources to the destinations of their
    forwards. Each source runs its own schedule, bounded by a daily limit,
    and never reposts a message that is still in its history.

USAGE:
    # Run in foreground (logs to stderr)
    tgcf-live

    # JSON logs with debug detail
    tgcf-live --log-format json --verbose

SIGNALS:
    SIGTERM, SIGINT - Graceful shutdown (finishes the batch being posted)

CONFIGURATION:
    Configuration file: ~/.config/tgcf/config.toml

    [live]
    random_enabled = true
    random_delay = 300             # seconds between batches (60-86400)
    random_count = 1               # messages per batch (1-50)
    random_total_limit = 0         # per source per UTC day, 0 = unlimited
    random_active_sources = [-1001234567890]

    Override with environment variables:
        TGCF_CONFIG      - Path to config file
        TGCF_DB_PATH     - Path to database file
        TGCF_LOG_FORMAT  - text, json or pretty
        TGCF_LOG_LEVEL   - error, warn, info, debug or trace

EXIT CODES:
    0 - Clean shutdown
    1 - Runtime error
    2 - Configuration or database error
    3 - Invalid input
")]
struct Cli {
    /// Enable verbose logging to stderr
    #[arg(short, long)]
    #[arg(help = "Enable verbose logging (useful for debugging)")]
    verbose: bool,

    /// Log output format: text, json or pretty
    #[arg(long, value_name = "FORMAT")]
    log_format: Option<LogFormat>,

    /// Run one cycle per source and exit (for testing)
    #[arg(long, hide = true)]
    once: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_logging(&cli);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

fn init_logging(cli: &Cli) {
    match cli.log_format {
        Some(format) => {
            let level = std::env::var("TGCF_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
            LoggingConfig::new(format, level, cli.verbose).init();
        }
        None => libtgcf::logging::init_default(cli.verbose),
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let db = Database::new(&config.database.path).await?;

    info!("tgcf-live starting");

    let shutdown = CancellationToken::new();
    setup_signal_handlers(shutdown.clone())?;

    if !config.live.random_enabled {
        info!("random posting disabled (live.random_enabled = false)");
        if !cli.once {
            shutdown.cancelled().await;
        }
        db.close().await;
        info!("tgcf-live stopped");
        return Ok(());
    }

    let client = TelegramClient::from_config(&config.telegram)?;
    for source in &config.live.random_active_sources {
        if !client.has_archive(*source) {
            warn!(source, "no history export configured, source will have an empty pool");
        }
    }

    let mut handler = RandomHandler::new(config, db.clone(), Arc::new(client));

    if cli.once {
        for (source, outcome) in handler.run_once().await? {
            report_outcome(source, &outcome);
        }
    } else {
        let started = handler.start()?;
        info!(sources = started, "random schedulers running");

        shutdown.cancelled().await;
        info!("shutdown requested, stopping random schedulers");
        handler.stop().await;
    }

    db.close().await;
    info!("tgcf-live stopped");
    Ok(())
}

fn report_outcome(source: i64, outcome: &CycleOutcome) {
    match outcome {
        CycleOutcome::Posted(report) => info!(
            source,
            sent = report.sent(),
            filtered = report.filtered(),
            failed = report.failed(),
            "cycle posted"
        ),
        CycleOutcome::LimitReached { count, limit } => {
            info!(source, count, limit, "daily limit reached")
        }
        CycleOutcome::NothingNew => info!(source, "nothing new to post"),
        CycleOutcome::Failed(error) => warn!(source, error = %error, "cycle failed"),
        CycleOutcome::Cancelled => info!(source, "cycle cancelled"),
    }
}

/// Cancel `shutdown` on SIGINT or SIGTERM
#[cfg(unix)]
fn setup_signal_handlers(shutdown: CancellationToken) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM]).map_err(|e| {
        libtgcf::TgcfError::InvalidInput(format!("Signal setup failed: {}", e))
    })?;

    std::thread::spawn(move || {
        if let Some(signal) = signals.forever().next() {
            info!(signal, "received shutdown signal, stopping gracefully");
            shutdown.cancel();
        }
    });

    Ok(())
}

#[cfg(not(unix))]
fn setup_signal_handlers(shutdown: CancellationToken) -> Result<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received Ctrl-C, stopping gracefully");
            shutdown.cancel();
        }
    });

    Ok(())
}
