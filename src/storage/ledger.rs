//! Durable failure ledger.
//!
//! The ledger is a single JSON document. Every mutation rewrites the whole
//! snapshot into a staging file next to it and renames that over the
//! canonical path, so a reader sees either the old or the new document.
//!
//! ```text
//! {
//!   "failures": [
//!     { "url", "attempts", "first_failed", "last_attempted", "last_error" }
//!   ]
//! }
//! ```

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::{AppError, Result};
use crate::models::{FailureRecord, LedgerSnapshot};

/// Failure ledger backed by a JSON file.
///
/// All mutations go through one async mutex, so concurrent workers never
/// interleave their read-modify-write-rename sequences.
#[derive(Debug)]
pub struct FailureLedger {
    path: PathBuf,
    state: Mutex<LedgerSnapshot>,
}

impl FailureLedger {
    /// Open the ledger at `path`.
    ///
    /// A missing file is an empty ledger. A malformed file is moved aside
    /// to `<name>.corrupt-<timestamp>` and the ledger starts empty.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let snapshot = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<LedgerSnapshot>(&bytes) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    Self::quarantine(&path, &e).await;
                    LedgerSnapshot::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => LedgerSnapshot::default(),
            Err(e) => return Err(AppError::Io(e)),
        };

        log::debug!(
            "Opened failure ledger {} with {} records",
            path.display(),
            snapshot.failures.len()
        );

        Ok(Self {
            path,
            state: Mutex::new(snapshot),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Count one more failed attempt for `url`.
    pub async fn record_failure(&self, url: &str, error: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let mut next = state.clone();
        next.record_failure(url, error, Utc::now());

        self.persist(&next).await?;
        *state = next;
        Ok(())
    }

    /// Forget `url` after it finally downloaded. No-op if it never failed.
    pub async fn record_success(&self, url: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.get(url).is_none() {
            return Ok(());
        }

        let mut next = state.clone();
        next.remove(url);

        self.persist(&next).await?;
        *state = next;
        log::info!("Resolved previously failing {}", url);
        Ok(())
    }

    /// URLs with fewer than `max_attempts` recorded failures.
    pub async fn retry_eligible(&self, max_attempts: u32) -> Vec<String> {
        self.state.lock().await.retry_eligible(max_attempts)
    }

    /// Remove records with at least `min_attempts` failures.
    pub async fn prune(&self, min_attempts: u32) -> Result<usize> {
        let mut state = self.state.lock().await;
        let mut next = state.clone();
        let removed = next.prune(min_attempts);
        if removed == 0 {
            return Ok(0);
        }

        self.persist(&next).await?;
        *state = next;
        Ok(removed)
    }

    pub async fn get(&self, url: &str) -> Option<FailureRecord> {
        self.state.lock().await.get(url).cloned()
    }

    pub async fn snapshot(&self) -> LedgerSnapshot {
        self.state.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.failures.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Staging file next to the ledger, on the same filesystem.
    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(OsString::from)
            .unwrap_or_else(|| OsString::from("ledger"));
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Write the snapshot atomically (write to staging, then rename).
    async fn persist(&self, snapshot: &LedgerSnapshot) -> Result<()> {
        let staged = self.stage(snapshot).await?;
        tokio::fs::rename(&staged, &self.path).await?;
        Ok(())
    }

    /// Write the full snapshot to the staging file without publishing it.
    async fn stage(&self, snapshot: &LedgerSnapshot) -> Result<PathBuf> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let bytes = serde_json::to_vec_pretty(snapshot)?;
        let tmp = self.staging_path();
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&bytes).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        Ok(tmp)
    }

    /// Move a malformed ledger aside instead of deleting it.
    async fn quarantine(path: &Path, cause: &serde_json::Error) {
        let mut name = path
            .file_name()
            .map(OsString::from)
            .unwrap_or_else(|| OsString::from("ledger"));
        name.push(format!(".corrupt-{}", Utc::now().format("%Y%m%dT%H%M%S")));
        let aside = path.with_file_name(name);

        match tokio::fs::rename(path, &aside).await {
            Ok(()) => log::warn!(
                "Failure ledger {} is malformed ({}); moved to {} and starting empty",
                path.display(),
                cause,
                aside.display()
            ),
            Err(e) => log::error!(
                "Failure ledger {} is malformed ({}) and could not be moved aside: {}",
                path.display(),
                cause,
                e
            ),
        }
    }
}
