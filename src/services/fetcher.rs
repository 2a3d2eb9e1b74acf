// src/services/fetcher.rs

//! Resumable bulk download engine.
//!
//! Each task is tried up to `max_attempts` times. An attempt probes the URL
//! with HEAD, resumes a partial file with a byte-range GET when the server
//! allows it, and streams the body to disk chunk by chunk. Partial files are
//! never deleted; the next attempt (or the next run) picks them up.

use std::collections::HashSet;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};
use crate::models::{FetchConfig, FetchOutcome, FetchTask};
use crate::services::retry::{Backoff, RetryPolicy};
use crate::services::transport::Transport;
use crate::storage::FailureLedger;

/// Default write granularity.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// HTTP status for a ranged request past the end of the resource.
const RANGE_NOT_SATISFIABLE: u16 = 416;

/// HTTP status for a honored ranged request.
const PARTIAL_CONTENT: u16 = 206;

/// How an attempt left the destination file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transfer {
    /// Body streamed to disk; final size
    Written(u64),
    /// Server had nothing past the bytes already on disk
    AlreadyComplete(u64),
}

/// Bounded-concurrency downloader with resume and retry.
pub struct FetchEngine {
    transport: Arc<dyn Transport>,
    backoff: Backoff,
    chunk_size: usize,
    ledger: Option<Arc<FailureLedger>>,
    cancel: CancellationToken,
}

impl FetchEngine {
    /// Create an engine with default backoff and no ledger.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            backoff: Backoff::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            ledger: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Create an engine using the backoff and chunk settings of `config`.
    pub fn from_config(config: &FetchConfig, transport: Arc<dyn Transport>) -> Self {
        Self::new(transport)
            .with_backoff(Backoff::new(config.backoff_base(), config.backoff_cap()))
            .with_chunk_size(config.chunk_size)
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Record every failed attempt, and every eventual success, in `ledger`.
    pub fn with_ledger(mut self, ledger: Arc<FailureLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Stop dispatching and unwind in-flight transfers once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Fetch every task with at most `concurrency` in flight.
    ///
    /// Returns one outcome per task, in completion order.
    pub async fn fetch_all(
        &self,
        tasks: Vec<FetchTask>,
        concurrency: usize,
        max_attempts: u32,
    ) -> Vec<FetchOutcome> {
        let policy = RetryPolicy::new(max_attempts, self.backoff);
        let mut outcomes = Vec::with_capacity(tasks.len());

        // One writer per destination file.
        let mut claimed = HashSet::new();
        let mut runnable = Vec::with_capacity(tasks.len());
        for task in tasks {
            if claimed.insert(task.destination.clone()) {
                runnable.push(task);
            } else {
                let error = AppError::Collision {
                    url: task.url.clone(),
                    destination: task.destination.clone(),
                };
                log::warn!("{}", error);
                outcomes.push(FetchOutcome::failed(&task, 0, 0, &error));
            }
        }

        log::info!(
            "Fetching {} files ({} concurrent, {} attempts each)",
            runnable.len(),
            concurrency.max(1),
            policy.max_attempts
        );

        let mut results = stream::iter(runnable)
            .map(|task| self.fetch_one(task, policy))
            .buffer_unordered(concurrency.max(1));

        while let Some(outcome) = results.next().await {
            outcomes.push(outcome);
        }

        outcomes
    }

    /// Fetch a single task with the retry budget of `policy`.
    pub async fn fetch_one(&self, task: FetchTask, policy: RetryPolicy) -> FetchOutcome {
        if self.cancel.is_cancelled() {
            let partial = file_size(&task.destination).await.unwrap_or(0);
            return FetchOutcome::failed(&task, partial, 0, &AppError::Cancelled);
        }

        let task_ref = &task;
        let (result, attempts) = policy
            .retry(&self.cancel, move |attempt| async move {
                let result = self.attempt(task_ref).await;
                if let Err(e) = &result {
                    if e.is_retryable() {
                        self.note_failure(&task_ref.url, attempt, e).await;
                    }
                }
                result
            })
            .await;

        match result {
            Ok(transfer) => {
                if let Some(ledger) = &self.ledger {
                    if let Err(e) = ledger.record_success(&task.url).await {
                        log::error!("Could not clear {} from the ledger: {}", task.url, e);
                    }
                }
                match transfer {
                    Transfer::Written(bytes) => {
                        log::debug!(
                            "Fetched {} -> {} ({} bytes)",
                            task.url,
                            task.destination.display(),
                            bytes
                        );
                        FetchOutcome::succeeded(&task, bytes, attempts)
                    }
                    Transfer::AlreadyComplete(bytes) => {
                        FetchOutcome::already_complete(&task, bytes, attempts)
                    }
                }
            }
            Err(e) => {
                let partial = file_size(&task.destination).await.unwrap_or(0);
                if matches!(e, AppError::Cancelled) {
                    log::info!("Stopped {} at {} bytes", task.url, partial);
                } else {
                    log::warn!(
                        "Giving up on {} after {} attempts: {}",
                        task.url,
                        attempts,
                        e
                    );
                }
                FetchOutcome::failed(&task, partial, attempts, &e)
            }
        }
    }

    /// One download attempt.
    async fn attempt(&self, task: &FetchTask) -> Result<Transfer> {
        let info = match self.until_cancelled(self.transport.head(&task.url)).await? {
            Ok(info) if info.is_ok() => Some(info),
            Ok(info) => {
                log::debug!("HEAD {} answered {}", task.url, info.status_code);
                None
            }
            Err(e) => {
                log::debug!("HEAD {} failed: {}", task.url, e);
                None
            }
        };
        let resumable = info.is_some_and(|i| i.resumable);
        let expected = info.and_then(|i| i.content_length);

        if let Some(parent) = task.destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let existing = file_size(&task.destination).await?;
        let range_start = (existing > 0 && resumable).then_some(existing);

        let mut response = self
            .until_cancelled(self.transport.get(&task.url, range_start))
            .await??;

        if range_start.is_some() && response.status == RANGE_NOT_SATISFIABLE {
            log::debug!("{} already complete ({} bytes)", task.url, existing);
            return Ok(Transfer::AlreadyComplete(existing));
        }
        if response.is_error() {
            return Err(AppError::Status {
                url: task.url.clone(),
                status: response.status,
            });
        }

        let append = range_start.is_some() && response.status == PARTIAL_CONTENT;
        let (mut file, mut written) = if append {
            log::debug!("Resuming {} from byte {}", task.url, existing);
            let file = OpenOptions::new()
                .append(true)
                .open(&task.destination)
                .await?;
            (file, existing)
        } else {
            if range_start.is_some() {
                log::debug!("{} ignored the range request; restarting", task.url);
            }
            (File::create(&task.destination).await?, 0)
        };

        let streamed = self
            .write_body(&mut file, &mut response.body, &mut written)
            .await;
        file.flush().await?;
        streamed?;
        file.sync_all().await?;

        if let Some(expected) = expected {
            if written < expected {
                return Err(AppError::Incomplete {
                    url: task.url.clone(),
                    expected,
                    actual: written,
                });
            }
        }

        Ok(Transfer::Written(written))
    }

    /// Copy the body into `file` in `chunk_size` slices.
    ///
    /// `written` only advances after a slice's write returned. A body that
    /// stalls is abandoned as soon as cancellation fires.
    async fn write_body(
        &self,
        file: &mut File,
        body: &mut BoxStream<'static, Result<Bytes>>,
        written: &mut u64,
    ) -> Result<()> {
        while let Some(chunk) = self.until_cancelled(body.next()).await? {
            let chunk = chunk?;
            for piece in chunk.chunks(self.chunk_size) {
                if self.cancel.is_cancelled() {
                    return Err(AppError::Cancelled);
                }
                file.write_all(piece).await?;
                *written += piece.len() as u64;
            }
        }
        Ok(())
    }

    /// Await `fut` unless cancellation fires first.
    async fn until_cancelled<T>(&self, fut: impl Future<Output = T>) -> Result<T> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(AppError::Cancelled),
            value = fut => Ok(value),
        }
    }

    async fn note_failure(&self, url: &str, attempt: u32, error: &AppError) {
        log::warn!("Attempt {} for {} failed: {}", attempt, url, error);
        if let Some(ledger) = &self.ledger {
            if let Err(e) = ledger.record_failure(url, &error.to_string()).await {
                log::error!("Could not record failure of {} in the ledger: {}", url, e);
            }
        }
    }
}

/// Size of the file at `path`, or 0 if it does not exist.
async fn file_size(path: &Path) -> Result<u64> {
    match tokio::fs::metadata(path).await {
        Ok(meta) => Ok(meta.len()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(AppError::Io(e)),
    }
}
