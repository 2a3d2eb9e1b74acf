// src/pipeline/pass.rs

//! Fetch and retry passes.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::models::{Config, FetchOutcome, FetchTask};
use crate::services::{
    ArchiveMaterializer, FetchEngine, HttpTransport, ReachabilityFilter, Transport,
    extraction_dir,
};
use crate::storage::FailureLedger;
use crate::utils::http::create_async_client;

use super::report::PassReport;

/// Per-run switches that the command line can flip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassOptions {
    /// Probe candidates before fetching
    pub filter: bool,
    /// Extract archives after fetching
    pub extract: bool,
}

impl PassOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            filter: config.reachability.enabled,
            extract: config.extract.enabled,
        }
    }
}

/// Wires the filter, the engine, the ledger and the materializer together.
pub struct Pipeline {
    config: Config,
    filter: ReachabilityFilter,
    engine: FetchEngine,
    ledger: Arc<FailureLedger>,
    materializer: ArchiveMaterializer,
    cancel: CancellationToken,
}

impl Pipeline {
    /// Build a pipeline talking HTTP, with the ledger at `ledger.path`.
    pub async fn from_config(config: Config, cancel: CancellationToken) -> Result<Self> {
        let client = create_async_client(&config.fetch)?;
        let ledger = Arc::new(FailureLedger::open(&config.ledger.path).await?);
        Ok(Self::with_transport(
            config,
            Arc::new(HttpTransport::new(client)),
            ledger,
            cancel,
        ))
    }

    pub fn with_transport(
        config: Config,
        transport: Arc<dyn Transport>,
        ledger: Arc<FailureLedger>,
        cancel: CancellationToken,
    ) -> Self {
        let filter = ReachabilityFilter::new(Arc::clone(&transport), config.reachability.concurrency);
        let engine = FetchEngine::from_config(&config.fetch, transport)
            .with_ledger(Arc::clone(&ledger))
            .with_cancellation(cancel.clone());
        let materializer = ArchiveMaterializer::from_config(&config.extract);

        Self {
            config,
            filter,
            engine,
            ledger,
            materializer,
            cancel,
        }
    }

    pub fn ledger(&self) -> &Arc<FailureLedger> {
        &self.ledger
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Discover-and-fetch pass over a candidate list.
    pub async fn run_fetch(&self, urls: &[String], options: PassOptions) -> PassReport {
        let urls = if options.filter {
            self.filter
                .filter(urls, self.config.reachability.timeout())
                .await
        } else {
            urls.to_vec()
        };

        self.run_pass(&urls, options).await
    }

    /// Pass over the ledger's retry-eligible URLs.
    pub async fn run_retry(&self, options: PassOptions) -> PassReport {
        let urls = self
            .ledger
            .retry_eligible(self.config.ledger.retry_ceiling)
            .await;
        log::info!("{} ledger entries are eligible for retry", urls.len());

        self.run_pass(&urls, options).await
    }

    async fn run_pass(&self, urls: &[String], options: PassOptions) -> PassReport {
        let started_at = Utc::now();
        let fetch = &self.config.fetch;

        let (tasks, mut outcomes) = skip_materialized(FetchTask::plan(urls, &fetch.output_dir));
        for outcome in &outcomes {
            if let Err(e) = self.ledger.record_success(&outcome.url).await {
                log::error!("Could not clear {} from the ledger: {}", outcome.url, e);
            }
        }
        outcomes.extend(
            self.engine
                .fetch_all(tasks, fetch.concurrency, fetch.max_attempts)
                .await,
        );

        let mut report = PassReport::new(started_at, &outcomes);

        if options.extract && !self.cancel.is_cancelled() {
            let downloaded: Vec<PathBuf> = outcomes
                .iter()
                .filter(|o| o.success && needs_extraction(o))
                .map(|o| o.destination.clone())
                .collect();
            let extractions = self.materializer.materialize_all(&downloaded).await;
            report.record_extractions(&extractions);
        }

        report.outstanding_retryable = self
            .ledger
            .retry_eligible(self.config.ledger.retry_ceiling)
            .await
            .len();
        report.finished_at = Utc::now();
        report
    }
}

/// Split off tasks whose archive was already extracted and then removed.
///
/// Those count as complete without touching the network.
fn skip_materialized(tasks: Vec<FetchTask>) -> (Vec<FetchTask>, Vec<FetchOutcome>) {
    let mut pending = Vec::with_capacity(tasks.len());
    let mut done = Vec::new();
    for task in tasks {
        if !task.destination.exists() && extraction_dir(&task.destination).is_dir() {
            log::debug!("{} is already materialized", task.url);
            done.push(FetchOutcome::already_complete(&task, 0, 0));
        } else {
            pending.push(task);
        }
    }
    (pending, done)
}

/// A file that was not rewritten keeps an earlier extraction.
fn needs_extraction(outcome: &FetchOutcome) -> bool {
    !(outcome.already_complete && extraction_dir(&outcome.destination).is_dir())
}
