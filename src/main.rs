use anyhow::{bail, Context, Result};
use chrono::{DateTime, FixedOffset, Local, NaiveDate};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use daybook::auth::CancelHandle;
use daybook::model::format_duration;
use daybook::timer::{self, NewTimer, StoppedTimer};
use daybook::{
    AuthClient, CalendarFetcher, Config, EventOutcome, SyncEngine, SyncOptions, SyncSummary,
    SyncWindow,
};

#[derive(Parser)]
#[command(name = "daybook")]
#[command(about = "Personal time tracker with Outlook calendar import")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (defaults to XDG config location)
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a timer, stopping any running one
    Start {
        /// Project to track time against
        project: String,

        /// Task description
        #[arg(long)]
        task: Option<String>,

        /// Optional comment
        #[arg(long)]
        comment: Option<String>,

        /// Comma-separated tags
        #[arg(long)]
        tags: Option<String>,
    },

    /// Stop the running timer
    Stop {
        /// Append a comment to the entry
        #[arg(long)]
        comment: Option<String>,
    },

    /// Show the running timer
    Status,

    /// Outlook calendar integration
    Outlook {
        #[command(subcommand)]
        outlook_command: OutlookCommands,
    },
}

#[derive(Subcommand)]
enum OutlookCommands {
    /// Sign in (or refresh the saved sign-in)
    Login,

    /// Import calendar events as entries
    Sync {
        /// Sync a single day (YYYY-MM-DD)
        #[arg(long, conflicts_with_all = ["from", "to"])]
        date: Option<NaiveDate>,

        /// First day to sync (YYYY-MM-DD)
        #[arg(long)]
        from: Option<NaiveDate>,

        /// Last day to sync (YYYY-MM-DD), defaults to today
        #[arg(long)]
        to: Option<NaiveDate>,

        /// Show what would change without writing
        #[arg(long)]
        dry_run: bool,

        /// Project for imported events (defaults to config)
        #[arg(long)]
        project: Option<String>,

        /// IANA timezone for event times (defaults to config)
        #[arg(long)]
        timezone: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config)?;
    init_logging(cli.verbose, &config.logging.level)?;
    info!("Starting daybook v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Start {
            project,
            task,
            comment,
            tags,
        } => cmd_start(project, task, comment, tags, &config),
        Commands::Stop { comment } => cmd_stop(comment, &config),
        Commands::Status => cmd_status(&config),
        Commands::Outlook { outlook_command } => match outlook_command {
            OutlookCommands::Login => cmd_outlook_login(&config).await,
            OutlookCommands::Sync {
                date,
                from,
                to,
                dry_run,
                project,
                timezone,
            } => cmd_outlook_sync(date, from, to, dry_run, project, timezone, &config).await,
        },
    }
}

/// Initialize logging; `RUST_LOG` wins over `--verbose` and the config level
fn init_logging(verbose: bool, level: &str) -> Result<()> {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    Ok(())
}

/// Load configuration from specified path or default location
fn load_config(config_path: Option<std::path::PathBuf>) -> Result<Config> {
    match config_path {
        Some(path) => Config::load(&path),
        None => Config::load_or_default(),
    }
}

fn now() -> DateTime<FixedOffset> {
    Local::now().fixed_offset()
}

fn cmd_start(
    project: String,
    task: Option<String>,
    comment: Option<String>,
    tags: Option<String>,
    config: &Config,
) -> Result<()> {
    let store = config.entry_store();
    let started = timer::start_timer(
        &store,
        NewTimer {
            project,
            task,
            comment,
            tags: tags.as_deref().map(timer::parse_tags).unwrap_or_default(),
        },
        now(),
    )
    .context("Failed to start timer")?;

    if let Some(stopped) = &started.auto_stopped {
        println!(
            "⚠️  Stopped running timer for {:?} ({})",
            stopped.entry.project,
            format_duration(stopped.elapsed_seconds)
        );
    }
    println!(
        "▶️  Started timer for {:?} at {}",
        started.entry.project,
        started.entry.start.format("%H:%M:%S")
    );
    Ok(())
}

fn cmd_stop(comment: Option<String>, config: &Config) -> Result<()> {
    let store = config.entry_store();
    match timer::stop_timer(&store, comment.as_deref(), now()).context("Failed to stop timer")? {
        Some(stopped) => {
            print_stopped(&stopped);
            Ok(())
        }
        None => bail!("No active timer to stop"),
    }
}

fn print_stopped(stopped: &StoppedTimer) {
    println!(
        "⏹️  Stopped timer for {:?}. Elapsed: {}",
        stopped.entry.project,
        format_duration(stopped.elapsed_seconds)
    );
    if !stopped.continuations.is_empty() {
        println!(
            "   Split across {} days at midnight",
            stopped.continuations.len() + 1
        );
    }
}

fn cmd_status(config: &Config) -> Result<()> {
    let store = config.entry_store();
    match store
        .find_active_entry()
        .context("Failed to look for a running timer")?
    {
        Some(active) => {
            let entry = active.entry;
            let elapsed = (now() - entry.start).num_seconds().max(0);
            println!("⏱️  Tracking {:?}", entry.project);
            if let Some(task) = &entry.task {
                println!("   Task: {}", task);
            }
            println!("   Since: {}", entry.start.format("%Y-%m-%d %H:%M:%S"));
            println!("   Elapsed: {}", format_duration(elapsed));
        }
        None => println!("No active timer"),
    }
    Ok(())
}

/// Cancel device sign-in on Ctrl-C
fn cancel_on_interrupt(cancel: CancelHandle) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling sign-in");
            cancel.cancel();
        }
    });
}

async fn cmd_outlook_login(config: &Config) -> Result<()> {
    let mut client = AuthClient::new(config.auth_settings());
    cancel_on_interrupt(client.cancel_handle());

    let token = client
        .ensure_token()
        .await
        .context("Outlook authentication failed")?;

    println!("✅ Signed in to Outlook");
    if let Some(expiry) = token.expiry {
        println!(
            "   Access token valid until {}",
            expiry.with_timezone(&Local).format("%Y-%m-%d %H:%M")
        );
    }
    println!("   Token: {}", config.token_path().display());
    Ok(())
}

/// Pick the days to sync from the command-line flags
fn resolve_days(
    date: Option<NaiveDate>,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    today: NaiveDate,
) -> Result<(NaiveDate, NaiveDate)> {
    match (date, from, to) {
        (Some(day), _, _) => Ok((day, day)),
        (None, None, Some(_)) => bail!("--from is required when --to is specified"),
        (None, Some(first), last) => {
            let last = last.unwrap_or(today);
            if last < first {
                bail!("--to ({}) is before --from ({})", last, first);
            }
            Ok((first, last))
        }
        (None, None, None) => Ok((today, today)),
    }
}

fn sync_window(first: NaiveDate, last: NaiveDate, timezone: &str) -> SyncWindow {
    match timezone.parse::<chrono_tz::Tz>() {
        Ok(tz) if !timezone.is_empty() => SyncWindow::for_days(first, last, &tz),
        _ => SyncWindow::for_days(first, last, &Local),
    }
}

async fn cmd_outlook_sync(
    date: Option<NaiveDate>,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    dry_run: bool,
    project: Option<String>,
    timezone: Option<String>,
    config: &Config,
) -> Result<()> {
    let (first, last) = resolve_days(date, from, to, Local::now().date_naive())?;
    let options = SyncOptions {
        dry_run,
        project: project.unwrap_or_else(|| config.outlook.default_project.clone()),
        timezone: timezone.unwrap_or_else(|| config.outlook.timezone.clone()),
    };

    println!(
        "📅 Syncing Outlook events ({} → {}){}",
        first,
        last,
        if dry_run { " [dry-run]" } else { "" }
    );

    let client = AuthClient::new(config.auth_settings());
    cancel_on_interrupt(client.cancel_handle());
    let mut fetcher = CalendarFetcher::new(client, config.outlook.graph_url.clone());
    let engine = SyncEngine::new(config.entry_store());

    let summary = engine
        .run(
            &mut fetcher,
            sync_window(first, last, &options.timezone),
            &options,
        )
        .await
        .context("Outlook sync failed")?;

    print_summary(&summary);

    if summary.has_errors() {
        std::process::exit(2);
    }
    Ok(())
}

fn print_summary(summary: &SyncSummary) {
    println!();
    for result in &summary.results {
        match result {
            EventOutcome::Imported {
                subject,
                duration_seconds,
                ..
            } => println!("   ✓ Imported: {}{}", subject, duration_suffix(*duration_seconds)),
            EventOutcome::Updated {
                subject,
                duration_seconds,
                ..
            } => println!("   ↑ Updated:  {}{}", subject, duration_suffix(*duration_seconds)),
            EventOutcome::Unchanged { subject, .. } => {
                println!("   – Skipped:  {} (already exists)", subject)
            }
            EventOutcome::Failed { subject, error } => {
                println!("   ❌ Failed:   {}: {}", subject, error)
            }
        }
    }

    println!("\n📈 Summary:");
    println!("   ✓ {} imported", summary.imported);
    println!("   – {} skipped", summary.skipped);
    println!("   ↑ {} updated", summary.updated);
    if summary.errors > 0 {
        println!("   ❌ {} errors", summary.errors);
    }
    if summary.dry_run {
        println!("\n💡 Dry run: nothing was written");
    }
}

fn duration_suffix(seconds: Option<i64>) -> String {
    seconds
        .map(|s| format!(" ({})", format_duration(s)))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, d).unwrap()
    }

    #[test]
    fn test_resolve_days() {
        let today = day(27);
        assert_eq!(resolve_days(None, None, None, today).unwrap(), (today, today));
        assert_eq!(
            resolve_days(Some(day(3)), None, None, today).unwrap(),
            (day(3), day(3))
        );
        assert_eq!(
            resolve_days(None, Some(day(20)), None, today).unwrap(),
            (day(20), today)
        );
        assert_eq!(
            resolve_days(None, Some(day(20)), Some(day(22)), today).unwrap(),
            (day(20), day(22))
        );
        assert!(resolve_days(None, None, Some(day(22)), today).is_err());
        assert!(resolve_days(None, Some(day(22)), Some(day(20)), today).is_err());
    }

    #[test]
    fn test_sync_window_uses_named_zone() {
        let window = sync_window(day(27), day(27), "Asia/Tokyo");
        assert_eq!(window.from.to_rfc3339(), "2026-02-26T15:00:00+00:00");
        assert_eq!(window.to.to_rfc3339(), "2026-02-27T14:59:59+00:00");
    }

    #[test]
    fn test_cli_parses_sync_flags() {
        let cli = Cli::try_parse_from([
            "daybook",
            "outlook",
            "sync",
            "--from",
            "2026-02-01",
            "--dry-run",
            "--timezone",
            "Europe/Berlin",
        ])
        .unwrap();
        match cli.command {
            Commands::Outlook {
                outlook_command:
                    OutlookCommands::Sync {
                        from,
                        dry_run,
                        timezone,
                        ..
                    },
            } => {
                assert_eq!(from, Some(day(1)));
                assert!(dry_run);
                assert_eq!(timezone.as_deref(), Some("Europe/Berlin"));
            }
            _ => panic!("expected outlook sync"),
        }

        assert!(Cli::try_parse_from(["daybook", "outlook", "sync", "--date", "2026-02-01", "--from", "2026-02-01"]).is_err());
    }
}
