// src/utils/http.rs

//! HTTP client utilities.

use reqwest::header::{ACCEPT_RANGES, CONTENT_LENGTH, HeaderMap};

use crate::error::Result;
use crate::models::{FetchConfig, RemoteFileInfo};

/// Create a configured asynchronous HTTP client.
///
/// The timeout bounds connecting and each read, not the whole transfer,
/// so large archives are not cut off mid-stream.
pub fn create_async_client(config: &FetchConfig) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .connect_timeout(config.timeout())
        .read_timeout(config.timeout())
        .build()?;
    Ok(client)
}

/// Derive resume information from a HEAD response.
pub fn remote_info(status_code: u16, headers: &HeaderMap) -> RemoteFileInfo {
    let content_length = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|len| *len > 0);

    let resumable = headers
        .get_all(ACCEPT_RANGES)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|unit| unit.trim().eq_ignore_ascii_case("bytes"));

    RemoteFileInfo {
        status_code,
        content_length,
        resumable,
    }
}

#[cfg(test)]
mod tests {
    use reqwest::header::HeaderValue;

    use super::*;

    #[test]
    fn test_remote_info_resumable() {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT_RANGES, HeaderValue::from_static("bytes"));
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("100"));

        let info = remote_info(200, &headers);
        assert!(info.resumable);
        assert_eq!(info.content_length, Some(100));
    }

    #[test]
    fn test_remote_info_not_resumable() {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT_RANGES, HeaderValue::from_static("none"));
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("0"));

        let info = remote_info(200, &headers);
        assert!(!info.resumable);
        assert_eq!(info.content_length, None);
    }

    #[test]
    fn test_remote_info_missing_headers() {
        let info = remote_info(404, &HeaderMap::new());
        assert!(!info.resumable);
        assert_eq!(info.content_length, None);
        assert_eq!(info.status_code, 404);
    }
}
