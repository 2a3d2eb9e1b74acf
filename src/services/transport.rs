// src/services/transport.rs

//! HTTP transport used by the reachability filter and the fetch engine.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};
use reqwest::Client;
use reqwest::header::RANGE;

use crate::error::{AppError, Result};
use crate::models::RemoteFileInfo;
use crate::utils::http::remote_info;

/// Status and streaming body of a GET response.
pub struct RemoteBody {
    pub status: u16,
    pub body: BoxStream<'static, Result<Bytes>>,
}

impl RemoteBody {
    pub fn is_error(&self) -> bool {
        self.status >= 400
    }
}

/// Network operations the fetcher needs.
///
/// Both calls return `Ok` for any HTTP status; `Err` means the request
/// itself failed (DNS, connect, reset, timeout).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue a HEAD request, following redirects.
    async fn head(&self, url: &str) -> Result<RemoteFileInfo>;

    /// Issue a GET, with `Range: bytes=<start>-` when `range_start` is set.
    async fn get(&self, url: &str, range_start: Option<u64>) -> Result<RemoteBody>;
}

/// `reqwest`-backed transport.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn head(&self, url: &str) -> Result<RemoteFileInfo> {
        let response = self.client.head(url).send().await?;
        Ok(remote_info(response.status().as_u16(), response.headers()))
    }

    async fn get(&self, url: &str, range_start: Option<u64>) -> Result<RemoteBody> {
        let mut request = self.client.get(url);
        if let Some(start) = range_start {
            request = request.header(RANGE, format!("bytes={start}-"));
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(AppError::from))
            .boxed();

        Ok(RemoteBody { status, body })
    }
}
