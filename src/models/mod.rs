// src/models/mod.rs

//! Domain models for the bulk fetcher.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod candidate;
mod config;
mod ledger;
mod task;

// Re-export all public types
pub use candidate::CandidateSet;
pub use config::{
    Config, ExtractConfig, FetchConfig, LedgerConfig, LoggingConfig, ReachabilityConfig,
    ScheduleConfig,
};
pub use ledger::{FailureRecord, LedgerSnapshot};
pub use task::{FetchOutcome, FetchTask, RemoteFileInfo};
