// src/services/reachability.rs

//! Pre-flight liveness check for candidate URLs.
//!
//! A URL is live when a HEAD request answers below 400. Servers that reject
//! HEAD get a second chance with a GET whose body is read only up to a small
//! byte budget before the connection is dropped.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};

use crate::error::Result;
use crate::services::transport::Transport;

/// Bytes read from a GET fallback before giving the connection up.
pub const PROBE_BYTE_BUDGET: usize = 1024;

/// Drops candidates that do not answer.
pub struct ReachabilityFilter {
    transport: Arc<dyn Transport>,
    concurrency: usize,
}

impl ReachabilityFilter {
    pub fn new(transport: Arc<dyn Transport>, concurrency: usize) -> Self {
        Self {
            transport,
            concurrency: concurrency.max(1),
        }
    }

    /// Return the live subset of `urls`, in input order.
    ///
    /// Each request is bounded by `timeout`. Dead URLs are dropped quietly.
    pub async fn filter(&self, urls: &[String], timeout: Duration) -> Vec<String> {
        let live: Vec<String> = stream::iter(urls)
            .map(move |url| async move { self.probe(url, timeout).await.then(|| url.clone()) })
            .buffered(self.concurrency)
            .filter_map(|url| async move { url })
            .collect()
            .await;

        log::info!(
            "{} of {} candidates are reachable",
            live.len(),
            urls.len()
        );
        live
    }

    /// Whether `url` answers HEAD or, failing that, a budgeted GET.
    pub async fn probe(&self, url: &str, timeout: Duration) -> bool {
        match tokio::time::timeout(timeout, self.transport.head(url)).await {
            Ok(Ok(info)) if info.is_ok() => return true,
            Ok(Ok(info)) => log::debug!("HEAD {} answered {}", url, info.status_code),
            Ok(Err(e)) => log::debug!("HEAD {} failed: {}", url, e),
            Err(_) => log::debug!("HEAD {} timed out after {:?}", url, timeout),
        }

        match tokio::time::timeout(timeout, self.budgeted_get(url)).await {
            Ok(Ok(live)) => live,
            Ok(Err(e)) => {
                log::debug!("GET {} failed: {}", url, e);
                false
            }
            Err(_) => {
                log::debug!("GET {} timed out after {:?}", url, timeout);
                false
            }
        }
    }

    /// GET `url`, reading at most `PROBE_BYTE_BUDGET` bytes of the body.
    async fn budgeted_get(&self, url: &str) -> Result<bool> {
        let mut response = self.transport.get(url, None).await?;
        if response.is_error() {
            log::debug!("GET {} answered {}", url, response.status);
            return Ok(false);
        }

        let mut read = 0;
        while read < PROBE_BYTE_BUDGET {
            match response.body.next().await {
                Some(Ok(chunk)) => read += chunk.len(),
                Some(Err(_)) | None => break,
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use bytes::Bytes;
    use reqwest::Client;

    use super::*;
    use crate::models::RemoteFileInfo;
    use crate::services::transport::{HttpTransport, RemoteBody};

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn filter() -> ReachabilityFilter {
        ReachabilityFilter::new(Arc::new(HttpTransport::new(Client::new())), 4)
    }

    #[tokio::test]
    async fn test_filter_keeps_live_urls_in_order() {
        let mut server = mockito::Server::new_async().await;
        let _a = server
            .mock("HEAD", "/a.zip")
            .with_status(200)
            .create_async()
            .await;
        let _b = server
            .mock("HEAD", "/b.zip")
            .with_status(200)
            .create_async()
            .await;
        let _gone_head = server
            .mock("HEAD", "/gone.zip")
            .with_status(404)
            .create_async()
            .await;
        let _gone_get = server
            .mock("GET", "/gone.zip")
            .with_status(404)
            .create_async()
            .await;

        let urls = vec![
            format!("{}/b.zip", server.url()),
            format!("{}/gone.zip", server.url()),
            format!("{}/a.zip", server.url()),
        ];
        let live = filter().filter(&urls, TIMEOUT).await;

        assert_eq!(live, vec![urls[0].clone(), urls[2].clone()]);
    }

    #[tokio::test]
    async fn test_head_rejected_falls_back_to_get() {
        let mut server = mockito::Server::new_async().await;
        let _head = server
            .mock("HEAD", "/no-head.zip")
            .with_status(405)
            .create_async()
            .await;
        let get = server
            .mock("GET", "/no-head.zip")
            .with_status(200)
            .with_body(vec![7u8; 64 * 1024])
            .expect(1)
            .create_async()
            .await;

        let url = format!("{}/no-head.zip", server.url());
        assert!(filter().probe(&url, TIMEOUT).await);
        get.assert_async().await;
    }

    #[tokio::test]
    async fn test_connection_refused_is_dropped() {
        let urls = vec!["http://127.0.0.1:1/a.zip".to_string()];
        let live = filter().filter(&urls, Duration::from_secs(2)).await;
        assert!(live.is_empty());
    }

    /// HEAD hangs forever; GET answers immediately.
    struct HangingHead;

    #[async_trait]
    impl Transport for HangingHead {
        async fn head(&self, _url: &str) -> Result<RemoteFileInfo> {
            std::future::pending().await
        }

        async fn get(&self, _url: &str, _range_start: Option<u64>) -> Result<RemoteBody> {
            Ok(RemoteBody {
                status: 200,
                body: stream::iter(vec![Ok(Bytes::from_static(b"PK"))]).boxed(),
            })
        }
    }

    #[tokio::test]
    async fn test_head_timeout_falls_back_to_get() {
        let filter = ReachabilityFilter::new(Arc::new(HangingHead), 2);
        let urls = vec!["http://h/a.zip".to_string()];

        let live = filter.filter(&urls, Duration::from_millis(50)).await;
        assert_eq!(live, urls);
    }
}
