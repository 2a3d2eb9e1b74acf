//! Bulkfetch CLI
//!
//! Local execution entry point.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use bulkfetch::{
    error::{AppError, Result},
    models::{CandidateSet, Config},
    pipeline::{self, PassOptions, Pipeline},
    storage::FailureLedger,
};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

/// Ledger entries shown by `info`.
const INFO_PREVIEW: usize = 5;

/// bulkfetch - Resumable bulk archive downloader
#[derive(Parser, Debug)]
#[command(
    name = "bulkfetch",
    version,
    about = "Resumable bulk downloader with a durable failure ledger"
)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "bulkfetch.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Override the download directory
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch every URL of a candidate list
    Fetch {
        /// File with one URL per line
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Extra URL to fetch (repeatable)
        #[arg(long)]
        url: Vec<String>,

        /// Drop unreachable candidates before fetching
        #[arg(long)]
        filter: bool,

        /// Keep archives packed
        #[arg(long)]
        no_extract: bool,
    },

    /// Fetch again the URLs recorded in the failure ledger
    Retry {
        /// Keep archives packed
        #[arg(long)]
        no_extract: bool,
    },

    /// Run forever: fetch once, then retry on an interval
    Watch {
        /// File with one URL per line for the initial pass
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Seconds between retry passes
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Validate the configuration file
    Validate,

    /// Show failure ledger summary
    Info,

    /// Remove chronic failures from the ledger
    Prune {
        /// Remove records with at least this many failed attempts
        #[arg(long)]
        min_attempts: u32,
    },
}

/// Initialize logging based on verbosity flag and configured level.
fn init_logging(verbose: bool, level: &str) {
    let level = if verbose { "debug" } else { level };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Read the config file when it exists, defaults otherwise.
fn load_config(path: &Path) -> Result<Option<Config>> {
    if path.exists() {
        Config::load(path).map(Some)
    } else {
        Ok(None)
    }
}

/// Read the candidate list from `--input` and `--url`.
fn load_candidates(input: Option<&Path>, extra: &[String]) -> Result<CandidateSet> {
    let mut candidates = match input {
        Some(path) => CandidateSet::load(path)?,
        None => CandidateSet::default(),
    };
    candidates.extend(extra.iter().map(String::as_str));

    if candidates.rejected() > 0 {
        log::warn!("Rejected {} malformed candidate lines", candidates.rejected());
    }
    Ok(candidates)
}

/// Cancel `token` on Ctrl-C.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted, finishing in-flight chunks...");
            token.cancel();
        }
    });
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let loaded = load_config(&cli.config);
    let level = match &loaded {
        Ok(Some(config)) => config.logging.level.clone(),
        _ => "info".to_string(),
    };
    init_logging(cli.verbose, &level);

    let config = match loaded {
        Ok(Some(config)) => {
            log::info!("Loaded configuration from {}", cli.config.display());
            config
        }
        Ok(None) => {
            log::info!(
                "No configuration at {}, using defaults",
                cli.config.display()
            );
            Config::default()
        }
        Err(e) => {
            log::error!("Could not load {}: {}", cli.config.display(), e);
            return ExitCode::FAILURE;
        }
    };

    match run(cli, config).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

/// Execute the command. `Ok(false)` means failures are still outstanding.
async fn run(cli: Cli, mut config: Config) -> Result<bool> {
    if let Some(dir) = cli.output_dir {
        config.fetch.output_dir = dir;
    }

    match cli.command {
        Command::Fetch {
            input,
            url,
            filter,
            no_extract,
        } => {
            let candidates = load_candidates(input.as_deref(), &url)?;
            if candidates.is_empty() {
                return Err(AppError::config("No candidate URLs (use --input or --url)"));
            }
            log::info!("Loaded {} candidate URLs", candidates.len());

            let mut options = PassOptions::from_config(&config);
            options.filter |= filter;
            options.extract &= !no_extract;

            config.validate()?;
            let cancel = CancellationToken::new();
            cancel_on_ctrl_c(cancel.clone());
            let pipeline = Pipeline::from_config(config, cancel).await?;

            let report = pipeline.run_fetch(candidates.urls(), options).await;
            report.log_summary("Fetch");
            Ok(report.is_settled())
        }

        Command::Retry { no_extract } => {
            let mut options = PassOptions::from_config(&config);
            options.extract &= !no_extract;

            config.validate()?;
            let cancel = CancellationToken::new();
            cancel_on_ctrl_c(cancel.clone());
            let pipeline = Pipeline::from_config(config, cancel).await?;

            let report = pipeline.run_retry(options).await;
            report.log_summary("Retry");
            Ok(report.is_settled())
        }

        Command::Watch { input, interval } => {
            if let Some(secs) = interval {
                config.schedule.interval_secs = secs;
            }
            let candidates = match input {
                Some(path) => Some(load_candidates(Some(path.as_path()), &[])?),
                None => None,
            };

            config.validate()?;
            let interval = config.schedule.interval();
            let options = PassOptions::from_config(&config);
            let cancel = CancellationToken::new();
            cancel_on_ctrl_c(cancel.clone());
            let pipeline = Pipeline::from_config(config, cancel).await?;

            let report = pipeline::run_forever(
                &pipeline,
                candidates.as_ref().map(CandidateSet::urls),
                options,
                interval,
            )
            .await;
            Ok(report.is_settled())
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            log::info!("Config OK");
            log::info!("  downloads: {}", config.fetch.output_dir.display());
            log::info!("  ledger: {}", config.ledger.path.display());
            log::info!(
                "  {} concurrent, {} attempts per pass, retry ceiling {}",
                config.fetch.concurrency,
                config.fetch.max_attempts,
                config.ledger.retry_ceiling
            );
            Ok(true)
        }

        Command::Info => {
            let ledger = FailureLedger::open(&config.ledger.path).await?;
            let snapshot = ledger.snapshot().await;
            let eligible = snapshot.retry_eligible(config.ledger.retry_ceiling).len();

            log::info!("Ledger: {}", ledger.path().display());
            log::info!("Failed URLs: {}", snapshot.failures.len());
            log::info!("  retry-eligible: {}", eligible);
            log::info!("  chronic: {}", snapshot.failures.len() - eligible);

            for record in snapshot.failures.iter().take(INFO_PREVIEW) {
                log::info!(
                    "  {} ({} attempts, last {}): {}",
                    record.url,
                    record.attempts,
                    record.last_attempted_at.format("%Y-%m-%d %H:%M:%S"),
                    record.last_error
                );
            }
            Ok(eligible == 0)
        }

        Command::Prune { min_attempts } => {
            if min_attempts == 0 {
                return Err(AppError::validation("--min-attempts must be > 0"));
            }
            let ledger = FailureLedger::open(&config.ledger.path).await?;
            let removed = ledger.prune(min_attempts).await?;
            log::info!(
                "Removed {} records with {} or more attempts; {} remain",
                removed,
                min_attempts,
                ledger.len().await
            );
            Ok(true)
        }
    }
}
