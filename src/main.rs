use std::path::PathBuf;

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};

use boostd::config::BoostdConfig;
use boostd::interval::IntervalGenerator;
use boostd::storage::{self, AccountStatus, CredentialBlob, NewAccount, Store};

#[derive(Parser)]
#[command(
    name = "boostd",
    about = "Scheduled auto-renewal daemon for marketplace listing accounts",
    version,
    long_about = None
)]
struct Cli {
    /// Path to the SQLite database
    #[arg(long, default_value = "data/boostd.db", global = true)]
    db: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon (API server + boost task supervisor)
    Serve {
        /// Bind address override for the API listener
        #[arg(long)]
        bind: Option<String>,

        /// Config file path (default: $BOOSTD_CONFIG, then /etc/boostd/boostd.toml)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Manage owners
    Owner {
        #[command(subcommand)]
        action: OwnerAction,
    },

    /// Manage boosted accounts
    Account {
        #[command(subcommand)]
        action: AccountAction,
    },

    /// Show recent boost attempts for an account
    History {
        /// Account id
        #[arg(long)]
        id: i64,

        /// Maximum entries to show
        #[arg(long, default_value = "10")]
        limit: usize,
    },

    /// Preview the randomized boost cadence
    SampleIntervals {
        /// Number of intervals to draw
        #[arg(long, default_value = "10")]
        count: usize,
    },
}

#[derive(Subcommand)]
enum OwnerAction {
    /// Register an owner (idempotent)
    Add {
        /// Owner id
        #[arg(long)]
        id: i64,

        /// Display name
        #[arg(long)]
        name: String,
    },
}

#[derive(Subcommand)]
enum AccountAction {
    /// Register a new account.
    ///
    /// Takes effect at the next daemon start; use the HTTP API to register
    /// while the daemon is running.
    Add {
        /// Owner id (must be registered first)
        #[arg(long)]
        owner: i64,

        /// Account display name
        #[arg(long)]
        name: String,

        /// Opaque credential blob, stored and forwarded verbatim
        #[arg(long)]
        credentials: String,
    },

    /// List an owner's accounts
    List {
        /// Owner id
        #[arg(long)]
        owner: i64,
    },

    /// Disable an account; its boost task stops at the next checkpoint
    Disable {
        /// Account id
        #[arg(long)]
        id: i64,
    },
}

fn init_tracing(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .init();
}

fn open_store(db: &str, cfg: &BoostdConfig) -> Result<Store> {
    let pool = storage::open_pool(db)?;
    Ok(Store::new(pool, cfg.limits.max_accounts_per_owner))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { bind, config } => {
            let mut cfg = match config {
                Some(path) => BoostdConfig::load(&path)?,
                None => BoostdConfig::load_or_default(),
            };
            if let Some(bind) = bind {
                cfg.api.bind = bind;
            }
            init_tracing(&cfg.logging.level);
            tracing::info!(bind = %cfg.api.bind, "Starting boostd daemon");
            boostd::serve(cfg, &cli.db).await?;
        }
        Commands::Owner { action } => {
            init_tracing("info");
            let cfg = BoostdConfig::load_or_default();
            let store = open_store(&cli.db, &cfg)?;

            match action {
                OwnerAction::Add { id, name } => {
                    anyhow::ensure!(!name.trim().is_empty(), "owner name is empty");
                    store.put_owner(id, name.trim())?;
                    println!("Owner {} ('{}') registered.", id, name.trim());
                }
            }
        }
        Commands::Account { action } => {
            init_tracing("info");
            let cfg = BoostdConfig::load_or_default();
            let store = open_store(&cli.db, &cfg)?;

            match action {
                AccountAction::Add {
                    owner,
                    name,
                    credentials,
                } => {
                    anyhow::ensure!(!name.trim().is_empty(), "account name is empty");
                    anyhow::ensure!(store.owner_exists(owner)?, "unknown owner {owner}");

                    let intervals =
                        IntervalGenerator::new(cfg.scheduler.min_minutes, cfg.scheduler.max_minutes);
                    let interval = intervals.next_interval();
                    let id = store.create(&NewAccount {
                        owner_id: owner,
                        display_name: name.trim().to_string(),
                        credential_blob: CredentialBlob::new(credentials),
                        interval_seconds: interval.as_secs(),
                        next_run_at: Utc::now()
                            + chrono::Duration::seconds(interval.as_secs() as i64),
                    })?;
                    println!(
                        "Account '{}' added with id {} (first boost in {}m {}s).",
                        name.trim(),
                        id,
                        interval.as_secs() / 60,
                        interval.as_secs() % 60
                    );
                }
                AccountAction::List { owner } => {
                    let accounts = store.list_for_owner(owner)?;
                    if accounts.is_empty() {
                        println!("No accounts found for owner {owner}.");
                    } else {
                        println!(
                            "{:<6} | {:<20} | {:<8} | {:<6} | Next boost",
                            "Id", "Name", "Status", "Boosts"
                        );
                        println!("{:-<6}-|-{:-<20}-|-{:-<8}-|-{:-<6}-|-{:-<25}", "", "", "", "", "");
                        for acc in accounts {
                            let next = acc
                                .next_run_at
                                .map(|t| t.to_rfc3339())
                                .unwrap_or_else(|| "not scheduled".to_string());
                            println!(
                                "{:<6} | {:<20} | {:<8} | {:<6} | {}",
                                acc.id,
                                acc.display_name,
                                acc.status.as_str(),
                                acc.run_count,
                                next
                            );
                        }
                    }
                }
                AccountAction::Disable { id } => {
                    store.set_status(id, AccountStatus::Disabled)?;
                    println!("Account {id} disabled.");
                }
            }
        }
        Commands::History { id, limit } => {
            init_tracing("info");
            let cfg = BoostdConfig::load_or_default();
            let store = open_store(&cli.db, &cfg)?;

            let records = store.history(id, limit)?;
            if records.is_empty() {
                println!("No boost attempts recorded for account {id}.");
            } else {
                println!("{:<20} | {:<8} | Detail", "When", "Outcome");
                println!("{:-<20}-|-{:-<8}-|-{:-<40}", "", "", "");
                for rec in records {
                    println!(
                        "{:<20} | {:<8} | {}",
                        rec.occurred_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                        rec.outcome.as_str(),
                        rec.detail
                    );
                }
            }
        }
        Commands::SampleIntervals { count } => {
            init_tracing("info");
            let cfg = BoostdConfig::load_or_default();
            let intervals =
                IntervalGenerator::new(cfg.scheduler.min_minutes, cfg.scheduler.max_minutes);

            let samples = intervals.sample(count);
            for (i, d) in samples.iter().enumerate() {
                let secs = d.as_secs();
                println!("{:>3}. {} min {:02} sec ({} sec)", i + 1, secs / 60, secs % 60, secs);
            }
            if !samples.is_empty() {
                let total: u64 = samples.iter().map(|d| d.as_secs()).sum();
                let min = samples.iter().map(|d| d.as_secs()).min().unwrap_or(0);
                let max = samples.iter().map(|d| d.as_secs()).max().unwrap_or(0);
                println!(
                    "\nmin {}m {:02}s | max {}m {:02}s | avg {}s (bound {}-{} min)",
                    min / 60,
                    min % 60,
                    max / 60,
                    max % 60,
                    total / samples.len() as u64,
                    cfg.scheduler.min_minutes,
                    cfg.scheduler.max_minutes
                );
            }
        }
    }

    Ok(())
}
