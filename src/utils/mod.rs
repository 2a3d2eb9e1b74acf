//! Utility functions and helpers.

pub mod http;

use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};
use url::Url;

/// Characters that are unsafe in a file name on common filesystems.
static UNSAFE_CHARS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"[\\/*?:"<>|\x00-\x1f]"#).expect("static regex is valid")
});

/// Extract the host from a URL, with the port appended when explicit.
pub fn host_dir(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{host}_{port}"),
        None => host.to_string(),
    })
}

/// Last non-empty path segment of a URL.
pub fn final_segment(url: &Url) -> Option<String> {
    url.path_segments()?
        .next_back()
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

/// Replace characters that cannot appear in a file name.
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned = UNSAFE_CHARS.replace_all(name, "_");
    match cleaned.as_ref() {
        "." | ".." => "_".to_string(),
        other => other.to_string(),
    }
}

/// Hex SHA-256 of a string, truncated to `len` characters.
pub fn short_hash(input: &str, len: usize) -> String {
    let digest = hex::encode(Sha256::digest(input.as_bytes()));
    digest[..len.min(digest.len())].to_string()
}

/// Insert a suffix before the file extension (`a.zip` -> `a-x.zip`).
pub fn with_suffix(name: &str, suffix: &str) -> String {
    match name.rfind('.') {
        Some(dot) if dot > 0 => format!("{}-{}{}", &name[..dot], suffix, &name[dot..]),
        _ => format!("{name}-{suffix}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_dir() {
        let url = Url::parse("https://data.gov/bulk/a.zip").unwrap();
        assert_eq!(host_dir(&url), Some("data.gov".to_string()));

        let url = Url::parse("http://127.0.0.1:8080/a.zip").unwrap();
        assert_eq!(host_dir(&url), Some("127.0.0.1_8080".to_string()));
    }

    #[test]
    fn test_final_segment() {
        let url = Url::parse("https://h/bulk/2024/a.zip?x=1").unwrap();
        assert_eq!(final_segment(&url), Some("a.zip".to_string()));

        let url = Url::parse("https://h/bulk/").unwrap();
        assert_eq!(final_segment(&url), None);

        let url = Url::parse("https://h").unwrap();
        assert_eq!(final_segment(&url), None);
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("a:b*c.zip"), "a_b_c.zip");
        assert_eq!(sanitize_file_name(".."), "_");
        assert_eq!(sanitize_file_name("plain.tar.gz"), "plain.tar.gz");
    }

    #[test]
    fn test_with_suffix() {
        assert_eq!(with_suffix("report.php", "abcd"), "report-abcd.php");
        assert_eq!(with_suffix("README", "abcd"), "README-abcd");
        assert_eq!(with_suffix(".hidden", "abcd"), ".hidden-abcd");
    }

    #[test]
    fn test_short_hash_is_stable() {
        assert_eq!(short_hash("x", 8), short_hash("x", 8));
        assert_eq!(short_hash("x", 8).len(), 8);
        assert_ne!(short_hash("x", 8), short_hash("y", 8));
    }
}
