// src/pipeline/report.rs

//! Per-pass statistics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::FetchOutcome;
use crate::services::ExtractionOutcome;

/// Failing URLs listed in a pass summary.
pub const MAX_LISTED_FAILURES: usize = 5;

/// What one fetch or retry pass did.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PassReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Failed before any attempt because another task owned the destination
    #[serde(default)]
    pub rejected: usize,
    pub extracted: usize,
    pub extraction_failed: usize,
    /// Ledger entries still below the retry ceiling after the pass
    pub outstanding_retryable: usize,
    /// `(url, error)` of every failed task
    pub failures: Vec<(String, String)>,
}

impl PassReport {
    /// Tally fetch outcomes.
    pub fn new(started_at: DateTime<Utc>, outcomes: &[FetchOutcome]) -> Self {
        let mut report = Self {
            started_at,
            finished_at: started_at,
            attempted: outcomes.len(),
            ..Self::default()
        };

        for outcome in outcomes {
            if outcome.success {
                report.succeeded += 1;
            } else if outcome.cancelled {
                report.cancelled += 1;
            } else {
                report.failed += 1;
                if outcome.attempts == 0 {
                    report.rejected += 1;
                }
                report.failures.push((
                    outcome.url.clone(),
                    outcome.error.clone().unwrap_or_default(),
                ));
            }
        }

        report
    }

    pub fn record_extractions(&mut self, extractions: &[ExtractionOutcome]) {
        self.extracted += extractions.iter().filter(|e| e.is_extracted()).count();
        self.extraction_failed += extractions.iter().filter(|e| e.is_failed()).count();
    }

    /// No failure below the retry ceiling is left in the ledger and no
    /// task was turned away without being tried.
    pub fn is_settled(&self) -> bool {
        self.outstanding_retryable == 0 && self.rejected == 0
    }

    pub fn duration_secs(&self) -> i64 {
        (self.finished_at - self.started_at).num_seconds()
    }

    /// Log counts and the first few failures.
    pub fn log_summary(&self, label: &str) {
        log::info!(
            "{} pass: {} attempted, {} succeeded, {} failed, {} cancelled, {} extracted ({} extraction errors) in {}s",
            label,
            self.attempted,
            self.succeeded,
            self.failed,
            self.cancelled,
            self.extracted,
            self.extraction_failed,
            self.duration_secs()
        );

        for (url, error) in self.failures.iter().take(MAX_LISTED_FAILURES) {
            log::warn!("  {} - {}", url, error);
        }
        if self.failures.len() > MAX_LISTED_FAILURES {
            log::warn!(
                "  ... and {} more",
                self.failures.len() - MAX_LISTED_FAILURES
            );
        }

        if self.rejected > 0 {
            log::warn!(
                "{} URLs were not fetched because their destination was taken",
                self.rejected
            );
        }
        if self.outstanding_retryable > 0 {
            log::info!(
                "{} failed URLs remain eligible for retry",
                self.outstanding_retryable
            );
        }
    }
}
