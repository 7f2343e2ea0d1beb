//! tgcf-admin - Inspect and reset random reposting state
//!
//! Companion tool for tgcf-live. It works on the same state database and can
//! run while the daemon is up.

use clap::{Parser, Subcommand};
use libtgcf::logging::{LogFormat, LoggingConfig};
use libtgcf::random::SourceStatus;
use libtgcf::store::{CounterStore, HistoryStore, StateStore};
use libtgcf::{Config, Database, Result, TgcfError};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "tgcf-admin")]
#[command(version)]
#[command(about = "Inspect and reset random reposting state")]
#[command(long_about = "\
tgcf-admin - Inspect and reset random reposting state

DESCRIPTION:
    tgcf-admin reads and edits the state kept by tgcf-live for random
    reposting: daily counters, the posted-message history and lifetime
    totals. It is safe to run while tgcf-live is running.

COMMANDS:
    reset       Reset daily counters
    status      Show per-source counters and history
    forget      Clear the posted history of a source
    check       Validate the configuration

USAGE EXAMPLES:
    # Reset every daily counter
    tgcf-admin reset

    # Reset one source
    tgcf-admin reset --source -1001234567890

    # Status as JSON
    tgcf-admin status --format json

    # Allow the archive of a source to be reposted again
    tgcf-admin forget -1001234567890

CONFIGURATION:
    Configuration file: ~/.config/tgcf/config.toml

    Override with environment variables:
        TGCF_CONFIG    - Path to config file
        TGCF_DB_PATH   - Path to database file

EXIT CODES:
    0 - Success
    1 - Operation failed
    2 - Database or configuration error
    3 - Invalid input (bad format, etc.)
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    #[arg(help = "Enable verbose logging to stderr (useful for debugging)")]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Reset daily counters to zero
    Reset {
        /// Only reset this source
        #[arg(short, long, allow_negative_numbers = true)]
        source: Option<i64>,
    },

    /// Show per-source random posting status
    Status {
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Clear the posted history of a source
    Forget {
        /// Source chat id
        #[arg(allow_negative_numbers = true)]
        source: i64,

        /// Also drop the lifetime totals
        #[arg(long)]
        totals: bool,
    },

    /// Validate the configuration and list the random sources
    Check,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "error" };
    LoggingConfig::new(LogFormat::Text, level.to_string(), cli.verbose).init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    // Loading validates, so `check` is done once this succeeds
    let config = Config::load()?;

    if let Commands::Check = cli.command {
        return cmd_check(&config);
    }

    let db = Database::new(&config.database.path).await?;

    let result = match cli.command {
        Commands::Reset { source } => cmd_reset(&db, source).await,
        Commands::Status { format } => cmd_status(&config, &db, &format).await,
        Commands::Forget { source, totals } => cmd_forget(&config, &db, source, totals).await,
        Commands::Check => Ok(()),
    };

    db.close().await;
    result
}

/// Reset one or all daily counters
async fn cmd_reset(db: &Database, source: Option<i64>) -> Result<()> {
    match source {
        Some(source) => {
            CounterStore::new(db.clone()).reset(source).await?;
            println!("Reset daily counter for source {}", source);
        }
        None => {
            let reset = libtgcf::random::reset_daily_counters(db).await?;
            println!("Reset {} daily counter{}", reset, plural(reset as u64));
        }
    }

    Ok(())
}

async fn cmd_status(config: &Config, db: &Database, format: &str) -> Result<()> {
    if format != "text" && format != "json" {
        return Err(TgcfError::InvalidInput(format!(
            "Invalid format '{}'. Must be 'text' or 'json'",
            format
        )));
    }

    let statuses = libtgcf::random::status(config, db).await?;

    if format == "json" {
        let json = serde_json::to_string_pretty(&statuses)
            .map_err(|e| TgcfError::InvalidInput(format!("Failed to encode status: {}", e)))?;
        println!("{}", json);
    } else {
        output_status_text(config, &statuses);
    }

    Ok(())
}

fn output_status_text(config: &Config, statuses: &[SourceStatus]) {
    if !config.live.random_enabled {
        println!("Random posting is disabled (live.random_enabled = false)");
    }

    if statuses.is_empty() {
        println!("No random sources configured");
        return;
    }

    let now = chrono::Utc::now().timestamp();

    for status in statuses {
        let quota = match status.remaining {
            Some(remaining) => format!(
                "{}/{} today ({} left)",
                status.count, status.limit, remaining
            ),
            None => format!("{} today (unlimited)", status.count),
        };

        let last_post = status
            .last_posted_at
            .map(|ts| format_age(now, ts))
            .unwrap_or_else(|| "never".to_string());

        println!(
            "{} | {} | history {}/{} | {} total | last post {}",
            status.source,
            quota,
            status.history_len,
            status.history_capacity,
            status.total_sent,
            last_post
        );
    }
}

/// Format the time since `posted_at` in human-readable form
fn format_age(now: i64, posted_at: i64) -> String {
    let elapsed = now - posted_at;
    if elapsed < 0 {
        return "in the future".to_string();
    }

    let rounded = if elapsed >= 3600 {
        elapsed - elapsed % 60
    } else {
        elapsed
    };
    format!(
        "{} ago",
        humantime::format_duration(Duration::from_secs(rounded as u64))
    )
}

async fn cmd_forget(config: &Config, db: &Database, source: i64, totals: bool) -> Result<()> {
    let history = HistoryStore::new(db.clone(), config.live.random_history_capacity);
    let removed = history.clear(source).await?;
    println!(
        "Forgot {} posted message{} for source {}",
        removed,
        plural(removed),
        source
    );

    if totals && StateStore::new(db.clone()).forget(source).await? {
        println!("Dropped lifetime totals for source {}", source);
    }

    Ok(())
}

fn cmd_check(config: &Config) -> Result<()> {
    let sources = config.source_configs()?;

    println!(
        "Configuration OK (random posting {})",
        if config.live.random_enabled { "enabled" } else { "disabled" }
    );

    for source in &sources {
        let archive = if config
            .telegram
            .archives
            .iter()
            .any(|a| a.source == source.source)
        {
            ""
        } else {
            " (no history export)"
        };

        let dests: Vec<String> = source.destinations.iter().map(|d| d.to_string()).collect();
        println!("{} -> {}{}", source.source, dests.join(", "), archive);
    }

    let skipped = dedup_count(&config.live.random_active_sources).saturating_sub(sources.len());
    if skipped > 0 {
        println!("{} active source{} skipped", skipped, plural(skipped as u64));
    }

    Ok(())
}

fn dedup_count(sources: &[i64]) -> usize {
    let mut unique = sources.to_vec();
    unique.sort_unstable();
    unique.dedup();
    unique.len()
}

fn plural(n: u64) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_age() {
        assert_eq!(format_age(1000, 1000), "0s ago");
        assert_eq!(format_age(1090, 1000), "1m 30s ago");
        assert_eq!(format_age(1000 + 7290, 1000), "2h 1m ago");
        assert_eq!(format_age(1000, 2000), "in the future");
    }

    #[test]
    fn test_dedup_count() {
        assert_eq!(dedup_count(&[-1, -2, -1]), 2);
        assert_eq!(dedup_count(&[]), 0);
    }
}
