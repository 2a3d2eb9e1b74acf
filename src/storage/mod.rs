//! Durable state for the bulk fetcher.
//!
//! ## Directory Structure
//!
//! ```text
//! data/
//! ├── failures.json         # Failure ledger (atomically replaced)
//! └── downloads/            # Fetched files
//!     └── {host}/
//!         ├── a.zip
//!         └── a.zip_extracted/
//! ```

pub mod ledger;

// Re-export for convenience
pub use ledger::FailureLedger;
