//! Service layer for the bulk fetcher.
//!
//! - `ReachabilityFilter`: drops candidates that do not answer
//! - `FetchEngine`: resumable, retrying, bounded-concurrency downloads
//! - `ArchiveMaterializer`: unpacks downloaded zip, tar and gzip files
//! - `Transport`: the network seam shared by the filter and the engine

pub mod extractor;
pub mod fetcher;
pub mod reachability;
pub mod retry;
pub mod transport;

pub use extractor::{
    ArchiveFormat, ArchiveMaterializer, ExtractionOutcome, Extractor, GzipExtractor,
    TarCompression, TarExtractor, ZipExtractor, detect_format, extraction_dir,
};
pub use fetcher::FetchEngine;
pub use reachability::ReachabilityFilter;
pub use retry::{Backoff, RetryPolicy};
pub use transport::{HttpTransport, RemoteBody, Transport};
