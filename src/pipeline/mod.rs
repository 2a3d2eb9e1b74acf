//! Pipeline entry points for bulk fetch operations.
//!
//! - `Pipeline::run_fetch`: filter, fetch and extract a candidate list
//! - `Pipeline::run_retry`: fetch again whatever the ledger still holds
//! - `run_forever`: repeat retry passes on an interval

pub mod pass;
pub mod report;
pub mod schedule;

pub use pass::{PassOptions, Pipeline};
pub use report::PassReport;
pub use schedule::run_forever;
