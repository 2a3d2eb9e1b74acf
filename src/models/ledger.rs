// src/models/ledger.rs

//! Failure ledger records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Failure history for one URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub url: String,
    pub attempts: u32,
    #[serde(rename = "first_failed")]
    pub first_failed_at: DateTime<Utc>,
    #[serde(rename = "last_attempted")]
    pub last_attempted_at: DateTime<Utc>,
    pub last_error: String,
}

/// The complete durable ledger, written as one JSON document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    #[serde(default)]
    pub failures: Vec<FailureRecord>,
}

impl LedgerSnapshot {
    pub fn get(&self, url: &str) -> Option<&FailureRecord> {
        self.failures.iter().find(|r| r.url == url)
    }

    /// Upsert a failure for `url`, keeping one record per URL.
    pub fn record_failure(&mut self, url: &str, error: &str, now: DateTime<Utc>) {
        match self.failures.iter_mut().find(|r| r.url == url) {
            Some(record) => {
                record.attempts += 1;
                record.last_attempted_at = now;
                record.last_error = error.to_string();
            }
            None => self.failures.push(FailureRecord {
                url: url.to_string(),
                attempts: 1,
                first_failed_at: now,
                last_attempted_at: now,
                last_error: error.to_string(),
            }),
        }
    }

    /// Remove the record for `url`. Returns whether one existed.
    pub fn remove(&mut self, url: &str) -> bool {
        let before = self.failures.len();
        self.failures.retain(|r| r.url != url);
        self.failures.len() != before
    }

    /// URLs that have failed fewer than `max_attempts` times.
    pub fn retry_eligible(&self, max_attempts: u32) -> Vec<String> {
        self.failures
            .iter()
            .filter(|r| r.attempts < max_attempts)
            .map(|r| r.url.clone())
            .collect()
    }

    /// Drop records with at least `min_attempts` attempts.
    pub fn prune(&mut self, min_attempts: u32) -> usize {
        let before = self.failures.len();
        self.failures.retain(|r| r.attempts < min_attempts);
        before - self.failures.len()
    }
}
