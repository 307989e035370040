//! Rollcall daemon: enrollment, issuance, and the scan loop of a station.

mod audit;
mod config;
mod error;
mod reader;
mod roster;
mod shutdown;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use rollcall_store::{IdentityStore, StoreError};
use rollcall_store_lmdb::integrity::{check_data_dir, check_integrity};
use rollcall_store_lmdb::LmdbEnvironment;
use rollcall_token::TokenMinter;
use rollcall_types::{IdentityId, Timestamp};
use rollcall_utils::{init_logging, LogFormat};
use rollcall_validator::{issue_missing_tokens, PresentationValidator};

use crate::config::StationConfig;
use crate::error::DaemonError;
use crate::shutdown::{ShutdownController, ShutdownReason};

#[derive(Parser)]
#[command(name = "rollcall-daemon", about = "Rollcall presence station daemon")]
struct Cli {
    /// Path to a TOML configuration file. If provided, file settings
    /// are used as the base; CLI flags and env vars override them.
    #[arg(long, env = "ROLLCALL_CONFIG")]
    config: Option<PathBuf>,

    /// Data directory for the identity store.
    #[arg(long, env = "ROLLCALL_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Seconds before the same identity may be read again.
    #[arg(long, env = "ROLLCALL_COOLDOWN_SECS")]
    cooldown_secs: Option<u64>,

    /// Store call timeout in milliseconds.
    #[arg(long, env = "ROLLCALL_STORE_TIMEOUT_MS")]
    store_timeout_ms: Option<u64>,

    /// Log format: "human" or "json".
    #[arg(long, env = "ROLLCALL_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "ROLLCALL_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Load a JSON roster into the store and issue first tokens.
    Enroll {
        /// JSON array of {identity_id, display_name, group_label}.
        #[arg(long)]
        roster: PathBuf,
        /// Only enroll; leave token issuance to a later `issue`.
        #[arg(long)]
        no_issue: bool,
    },
    /// Issue a first token to every identity that has none.
    Issue,
    /// Print an identity's record and current token payload.
    Show { identity_id: String },
    /// Verify the store's records and token index.
    Check,
    /// Validate payloads read from stdin, one per line.
    Run {
        /// Audit log path (JSON lines).
        #[arg(long, env = "ROLLCALL_AUDIT_LOG")]
        audit_log: Option<PathBuf>,
        /// Write Prometheus metrics to this file on exit.
        #[arg(long, env = "ROLLCALL_METRICS_FILE")]
        metrics_file: Option<PathBuf>,
    },
}

impl Cli {
    fn station_config(&self) -> Result<StationConfig, DaemonError> {
        let mut config = match &self.config {
            Some(path) => StationConfig::from_toml_file(path)?,
            None => StationConfig::default(),
        };
        if let Some(data_dir) = &self.data_dir {
            config.data_dir = data_dir.clone();
        }
        if let Some(cooldown) = self.cooldown_secs {
            config.cooldown_secs = cooldown;
        }
        if let Some(timeout) = self.store_timeout_ms {
            config.store_timeout_ms = timeout;
        }
        if let Some(format) = self.log_format {
            config.log_format = format;
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
        if let Command::Run {
            audit_log,
            metrics_file,
        } = &self.command
        {
            if let Some(path) = audit_log {
                config.audit_log = path.clone();
            }
            if metrics_file.is_some() {
                config.metrics_file = metrics_file.clone();
            }
        }
        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(station_main());
    // A blocking stdin read cannot be cancelled; do not wait on it forever.
    runtime.shutdown_timeout(Duration::from_secs(1));
    result
}

async fn station_main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.station_config()?;
    init_logging(config.log_format, &config.log_level);
    if let Some(path) = &cli.config {
        tracing::info!("loaded config from {}", path.display());
    }

    let env = open_environment(&config)?;
    let store: Arc<dyn IdentityStore> = Arc::new(env.identity_store());

    match cli.command {
        Command::Enroll { roster, no_issue } => {
            let records = roster::load_roster(&roster)
                .with_context(|| format!("reading roster {}", roster.display()))?;
            let report = store.bulk_load(&records)?;
            tracing::info!(
                inserted = report.inserted,
                skipped = report.skipped,
                "roster loaded"
            );
            if !no_issue {
                issue(store.as_ref())?;
            }
        }
        Command::Issue => issue(store.as_ref())?,
        Command::Show { identity_id } => show(store.as_ref(), &identity_id)?,
        Command::Check => {
            let report = check_integrity(&env)?;
            println!(
                "{} databases, {} entries, {} identities",
                report.databases_checked,
                report.total_entries,
                store.identity_count()?
            );
            for error in &report.errors {
                println!("  {error}");
            }
            if !report.is_healthy() {
                anyhow::bail!("{} integrity problem(s) found", report.errors.len());
            }
        }
        Command::Run { .. } => {
            let report = check_integrity(&env)?;
            if !report.is_healthy() {
                tracing::warn!(errors = ?report.errors, "store integrity problems at startup");
            }
            run(&config, store).await?;
        }
    }

    Ok(())
}

fn open_environment(config: &StationConfig) -> Result<LmdbEnvironment, DaemonError> {
    check_data_dir(&config.data_dir).map_err(DaemonError::DataDir)?;
    let env = LmdbEnvironment::with_map_size(&config.data_dir, config.map_size_bytes())?;
    tracing::debug!(path = %config.data_dir.display(), "identity store open");
    Ok(env)
}

fn issue(store: &dyn IdentityStore) -> Result<(), DaemonError> {
    let report = issue_missing_tokens(store, &TokenMinter::system())?;
    for (id, reason) in &report.failed {
        tracing::warn!(identity = %id, reason = %reason, "no token issued");
    }
    Ok(())
}

fn show(store: &dyn IdentityStore, raw_id: &str) -> anyhow::Result<()> {
    let id = IdentityId::parse(raw_id)?;
    let record = match store.get(&id) {
        Ok(record) => record,
        Err(StoreError::NotFound(_)) => anyhow::bail!("{id} is not enrolled"),
        Err(e) => return Err(e.into()),
    };
    let time = |t: Option<Timestamp>| t.map_or_else(|| "never".to_string(), |t| t.to_string());

    println!("identity:       {}", record.identity_id);
    println!("name:           {}", record.display_name);
    println!("group:          {}", record.group_label);
    println!("issued at:      {}", time(record.issued_at));
    println!("last presented: {}", time(record.last_presented_at));
    match &record.current_token {
        Some(token) => println!("payload:        {}", String::from_utf8_lossy(token)),
        None => println!("payload:        (none issued)"),
    }
    Ok(())
}

async fn run(config: &StationConfig, store: Arc<dyn IdentityStore>) -> anyhow::Result<()> {
    let validator = Arc::new(PresentationValidator::new(
        store,
        TokenMinter::system(),
        config.validator_config(),
    ));
    let shutdown = ShutdownController::new();

    let audit = {
        let path = config.audit_log.clone();
        let events = validator.events().subscribe();
        let stop = shutdown.subscribe();
        tokio::spawn(async move { audit::run_audit_log(&path, events, stop).await })
    };

    let sweeper = {
        let validator = validator.clone();
        let mut stop = shutdown.subscribe();
        let period = Duration::from_secs(config.sweep_interval_secs.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = validator.sweep_replay_guard(Timestamp::now());
                        if removed > 0 {
                            tracing::debug!(removed, "replay guard swept");
                        }
                    }
                    _ = stop.triggered() => break,
                }
            }
        })
    };

    tracing::info!(
        cooldown_secs = config.cooldown_secs,
        audit_log = %config.audit_log.display(),
        "station ready, reading payloads from stdin"
    );

    let reader = reader::run_reader(
        validator.clone(),
        tokio::io::BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
        shutdown.subscribe(),
    );
    let stats = tokio::select! {
        stats = reader => Some(stats?),
        _ = shutdown.wait_for_signal() => None,
    };
    shutdown.shutdown(ShutdownReason::InputClosed);

    if let Some(stats) = stats {
        tracing::info!(
            lines = stats.lines,
            accepted = stats.accepted,
            errors = stats.errors,
            "reader finished"
        );
    }

    match audit.await {
        Ok(Ok(written)) => tracing::info!(written, "audit log flushed"),
        Ok(Err(e)) => tracing::error!(error = %e, "audit log failed"),
        Err(e) => tracing::error!(error = %e, "audit task panicked"),
    }
    let _ = sweeper.await;

    if let Some(path) = &config.metrics_file {
        tokio::fs::write(path, validator.metrics().encode_text())
            .await
            .with_context(|| format!("writing metrics to {}", path.display()))?;
        tracing::info!(path = %path.display(), "metrics written");
    }

    tracing::info!("rollcall daemon exited cleanly");
    Ok(())
}
