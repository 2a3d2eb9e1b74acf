// src/models/task.rs

//! Download task and outcome types.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{AppError, Result};
use crate::utils::{final_segment, host_dir, sanitize_file_name, short_hash, with_suffix};

/// A single URL bound to the file it downloads into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchTask {
    pub url: String,
    pub destination: PathBuf,
}

impl FetchTask {
    /// Build a task whose destination is `<output_root>/<host>/<name>`.
    ///
    /// The same URL always maps to the same path, so an interrupted run
    /// finds its partial file again. The final segment alone is kept only
    /// when it is the whole path; nested paths, query strings and names
    /// that needed sanitizing get a short URL hash so that `/2023/data.zip`
    /// and `/2024/data.zip` land in different files.
    pub fn for_url(url: &str, output_root: impl AsRef<Path>) -> Result<Self> {
        let parsed = Url::parse(url).map_err(|e| AppError::invalid_url(url, e))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(AppError::invalid_url(url, "only http(s) is supported"));
        }
        let host = host_dir(&parsed).ok_or_else(|| AppError::invalid_url(url, "missing host"))?;

        let name = match final_segment(&parsed) {
            Some(segment) => {
                let name = sanitize_file_name(&segment);
                if parsed.query().is_some() || path_depth(&parsed) > 1 || name != segment {
                    with_suffix(&name, &short_hash(url, 8))
                } else {
                    name
                }
            }
            None => format!("download-{}", short_hash(url, 16)),
        };

        Ok(Self {
            url: url.to_string(),
            destination: output_root.as_ref().join(sanitize_file_name(&host)).join(name),
        })
    }

    /// Build tasks for many URLs, skipping (and logging) unusable ones.
    pub fn plan(urls: &[String], output_root: impl AsRef<Path>) -> Vec<Self> {
        urls.iter()
            .filter_map(|url| match Self::for_url(url, output_root.as_ref()) {
                Ok(task) => Some(task),
                Err(e) => {
                    log::warn!("Skipping {}: {}", url, e);
                    None
                }
            })
            .collect()
    }
}

/// Number of non-empty path segments.
fn path_depth(url: &Url) -> usize {
    url.path_segments()
        .map(|segments| segments.filter(|s| !s.is_empty()).count())
        .unwrap_or(0)
}

/// Final result of fetching one task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchOutcome {
    pub url: String,
    pub destination: PathBuf,
    pub success: bool,
    /// Final size on success; size of the partial file left on failure
    pub bytes_written: u64,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Stopped by cancellation rather than by failing
    #[serde(default)]
    pub cancelled: bool,
    /// The file on disk was already complete; nothing was rewritten
    #[serde(default)]
    pub already_complete: bool,
}

impl FetchOutcome {
    pub fn succeeded(task: &FetchTask, bytes_written: u64, attempts: u32) -> Self {
        Self {
            url: task.url.clone(),
            destination: task.destination.clone(),
            success: true,
            bytes_written,
            attempts,
            error: None,
            cancelled: false,
            already_complete: false,
        }
    }

    /// Success without a transfer: the server had nothing past the bytes on
    /// disk, or the file was already materialized.
    pub fn already_complete(task: &FetchTask, bytes_written: u64, attempts: u32) -> Self {
        Self {
            already_complete: true,
            ..Self::succeeded(task, bytes_written, attempts)
        }
    }

    pub fn failed(task: &FetchTask, bytes_written: u64, attempts: u32, error: &AppError) -> Self {
        Self {
            url: task.url.clone(),
            destination: task.destination.clone(),
            success: false,
            bytes_written,
            attempts,
            error: Some(error.to_string()),
            cancelled: matches!(error, AppError::Cancelled),
            already_complete: false,
        }
    }
}

/// What a HEAD probe says about the remote file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteFileInfo {
    pub status_code: u16,
    pub content_length: Option<u64>,
    pub resumable: bool,
}

impl RemoteFileInfo {
    /// Probe answered without an error status.
    pub fn is_ok(&self) -> bool {
        self.status_code < 400
    }
}
