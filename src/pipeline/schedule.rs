// src/pipeline/schedule.rs

//! Long-running retry loop.

use std::time::Duration;

use super::pass::{PassOptions, Pipeline};
use super::report::PassReport;

/// Run an initial pass, then a retry pass every `interval` until the
/// pipeline's cancellation token fires.
///
/// The initial pass fetches `initial` when given, otherwise it retries the
/// ledger. Returns the report of the last completed pass.
pub async fn run_forever(
    pipeline: &Pipeline,
    initial: Option<&[String]>,
    options: PassOptions,
    interval: Duration,
) -> PassReport {
    let cancel = pipeline.cancellation();

    let mut last = match initial {
        Some(urls) => pipeline.run_fetch(urls, options).await,
        None => pipeline.run_retry(options).await,
    };
    last.log_summary(if initial.is_some() { "Fetch" } else { "Retry" });

    let mut passes = 1u64;
    loop {
        log::info!("Next retry pass in {:?}", interval);
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }

        last = pipeline.run_retry(options).await;
        passes += 1;
        last.log_summary("Retry");

        if cancel.is_cancelled() {
            break;
        }
    }

    log::info!("Stopped after {} passes", passes);
    last
}
