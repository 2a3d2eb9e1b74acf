// src/models/candidate.rs

//! Candidate URL list handed over by discovery.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use url::Url;

use crate::error::Result;

/// Deduplicated, order-stable list of absolute HTTP(S) URLs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateSet {
    urls: Vec<String>,
    rejected: usize,
}

impl CandidateSet {
    /// Parse one URL per line. Blank lines and `#` comments are ignored.
    pub fn from_lines(text: &str) -> Self {
        let mut set = Self::default();
        set.extend(text.lines());
        set
    }

    /// Load a candidate list from a text file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(Self::from_lines(&content))
    }

    /// Add more URLs, keeping the first occurrence of each.
    pub fn extend<'a>(&mut self, lines: impl IntoIterator<Item = &'a str>) {
        let mut seen: HashSet<String> = self.urls.iter().cloned().collect();

        for line in lines {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            match Url::parse(line) {
                Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => {
                    let url = url.to_string();
                    if seen.insert(url.clone()) {
                        self.urls.push(url);
                    }
                }
                Ok(_) => {
                    log::warn!("Ignoring non-HTTP candidate: {}", line);
                    self.rejected += 1;
                }
                Err(e) => {
                    log::warn!("Ignoring invalid candidate {}: {}", line, e);
                    self.rejected += 1;
                }
            }
        }
    }

    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    /// Lines that were not usable URLs.
    pub fn rejected(&self) -> usize {
        self.rejected
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}
