// src/services/extractor.rs

//! Archive detection and extraction.
//!
//! The format of a downloaded file is decided by its leading bytes only.
//! Zip archives and tarballs (plain or gzip) are unpacked into a sibling
//! `<file>_extracted` directory. A gzip stream that does not hold a tarball
//! is decompressed into that directory as a single file. Anything else is
//! left alone.

use std::ffi::OsString;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::ExtractConfig;

/// Bytes needed to recognize every supported format.
const SNIFF_LEN: usize = 262;

/// Offset of the `ustar` magic inside a tar header.
const USTAR_OFFSET: usize = 257;

/// Compression wrapped around a tar stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TarCompression {
    /// Bare tar
    Plain,
    Gzip,
}

/// Archive formats the materializer can unpack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArchiveFormat {
    Zip,
    Tar(TarCompression),
    /// One gzip-compressed file
    Gzip,
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Zip => write!(f, "zip"),
            Self::Tar(TarCompression::Plain) => write!(f, "tar"),
            Self::Tar(TarCompression::Gzip) => write!(f, "tar.gz"),
            Self::Gzip => write!(f, "gz"),
        }
    }
}

/// Identify an archive from its first bytes.
///
/// A gzip header is reported as [`ArchiveFormat::Gzip`]; telling a tarball
/// apart needs the decompressed bytes, which [`sniff`] looks at.
pub fn detect_format(header: &[u8]) -> Option<ArchiveFormat> {
    if header.starts_with(b"PK\x03\x04") || header.starts_with(b"PK\x05\x06") {
        return Some(ArchiveFormat::Zip);
    }
    if header.starts_with(&[0x1f, 0x8b]) {
        return Some(ArchiveFormat::Gzip);
    }
    if is_tar_header(header) {
        return Some(ArchiveFormat::Tar(TarCompression::Plain));
    }
    None
}

fn is_tar_header(header: &[u8]) -> bool {
    header.len() >= USTAR_OFFSET + 5 && &header[USTAR_OFFSET..USTAR_OFFSET + 5] == b"ustar"
}

/// Read the leading bytes of `path` and identify it.
pub fn sniff(path: &Path) -> Result<Option<ArchiveFormat>> {
    let mut header = Vec::with_capacity(SNIFF_LEN);
    File::open(path)?
        .take(SNIFF_LEN as u64)
        .read_to_end(&mut header)?;

    match detect_format(&header) {
        Some(ArchiveFormat::Gzip) if gzip_holds_tar(path)? => {
            Ok(Some(ArchiveFormat::Tar(TarCompression::Gzip)))
        }
        other => Ok(other),
    }
}

/// Decompress the head of a gzip file and look for a tar header.
///
/// A stream too damaged to yield a header counts as not a tarball; the
/// single-file extractor then reports the damage.
fn gzip_holds_tar(path: &Path) -> Result<bool> {
    let mut header = Vec::with_capacity(SNIFF_LEN);
    let decoded = GzDecoder::new(BufReader::new(File::open(path)?))
        .take(SNIFF_LEN as u64)
        .read_to_end(&mut header);
    Ok(decoded.is_ok() && is_tar_header(&header))
}

/// Unpacks one archive format.
pub trait Extractor: Send + Sync {
    /// Unpack `archive` under `destination`. Returns the number of entries.
    ///
    /// Entries whose path would leave `destination` fail the extraction.
    fn extract(&self, archive: &Path, destination: &Path) -> Result<usize>;
}

/// Zip extraction via the `zip` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipExtractor;

impl Extractor for ZipExtractor {
    fn extract(&self, archive: &Path, destination: &Path) -> Result<usize> {
        let file = BufReader::new(File::open(archive)?);
        let mut zip = zip::ZipArchive::new(file).map_err(|e| AppError::archive(archive, e))?;
        fs::create_dir_all(destination)?;

        for index in 0..zip.len() {
            let mut entry = zip
                .by_index(index)
                .map_err(|e| AppError::archive(archive, e))?;
            let relative = entry
                .enclosed_name()
                .map(|p| p.to_path_buf())
                .ok_or_else(|| {
                    AppError::archive(archive, format!("unsafe entry path {:?}", entry.name()))
                })?;
            let target = destination.join(relative);

            if entry.is_dir() {
                fs::create_dir_all(&target)?;
                continue;
            }
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut out = File::create(&target)?;
            io::copy(&mut entry, &mut out)?;
        }

        Ok(zip.len())
    }
}

/// Tar extraction via the `tar` crate, optionally through gzip.
#[derive(Debug, Clone, Copy)]
pub struct TarExtractor {
    pub compression: TarCompression,
}

impl TarExtractor {
    pub fn new(compression: TarCompression) -> Self {
        Self { compression }
    }
}

impl Extractor for TarExtractor {
    fn extract(&self, archive: &Path, destination: &Path) -> Result<usize> {
        let file = BufReader::new(File::open(archive)?);
        let reader: Box<dyn Read> = match self.compression {
            TarCompression::Plain => Box::new(file),
            TarCompression::Gzip => Box::new(GzDecoder::new(file)),
        };
        fs::create_dir_all(destination)?;

        let mut tar = tar::Archive::new(reader);
        let mut count = 0;
        for entry in tar.entries().map_err(|e| AppError::archive(archive, e))? {
            let mut entry = entry.map_err(|e| AppError::archive(archive, e))?;
            let unpacked = entry
                .unpack_in(destination)
                .map_err(|e| AppError::archive(archive, e))?;
            if !unpacked {
                let name = entry
                    .path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default();
                return Err(AppError::archive(
                    archive,
                    format!("unsafe entry path {name:?}"),
                ));
            }
            count += 1;
        }

        Ok(count)
    }
}

/// Decompresses a lone gzip file into `<destination>/<name without .gz>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GzipExtractor;

impl GzipExtractor {
    /// Name of the decompressed file for `archive`.
    pub fn output_name(archive: &Path) -> OsString {
        let name = archive
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let lower = name.to_ascii_lowercase();
        let stem = [".gzip", ".gz"]
            .iter()
            .find(|ext| lower.ends_with(*ext) && lower.len() > ext.len())
            .map(|ext| &name[..name.len() - ext.len()])
            .unwrap_or(name.as_str());
        if stem.is_empty() {
            OsString::from("content")
        } else {
            OsString::from(stem)
        }
    }
}

impl Extractor for GzipExtractor {
    fn extract(&self, archive: &Path, destination: &Path) -> Result<usize> {
        let mut decoder = GzDecoder::new(BufReader::new(File::open(archive)?));
        fs::create_dir_all(destination)?;

        let target = destination.join(Self::output_name(archive));
        let mut out = File::create(&target)?;
        io::copy(&mut decoder, &mut out).map_err(|e| AppError::archive(archive, e))?;

        Ok(1)
    }
}

/// Result of materializing one downloaded file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionOutcome {
    pub archive: PathBuf,
    pub destination: PathBuf,
    /// `None` when the file is not an archive
    pub format: Option<ArchiveFormat>,
    pub entries: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExtractionOutcome {
    pub fn is_extracted(&self) -> bool {
        self.format.is_some() && self.error.is_none()
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Extracts downloaded archives next to themselves.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArchiveMaterializer {
    delete_source: bool,
}

impl ArchiveMaterializer {
    pub fn new(delete_source: bool) -> Self {
        Self { delete_source }
    }

    pub fn from_config(config: &ExtractConfig) -> Self {
        Self::new(config.delete_source)
    }

    /// Extract `path` into `<path>_extracted`.
    pub async fn materialize(&self, path: &Path) -> ExtractionOutcome {
        self.extract(path, &extraction_dir(path)).await
    }

    /// Extract every path in turn.
    pub async fn materialize_all(&self, paths: &[PathBuf]) -> Vec<ExtractionOutcome> {
        let mut outcomes = Vec::with_capacity(paths.len());
        for path in paths {
            outcomes.push(self.materialize(path).await);
        }
        outcomes
    }

    /// Extract `archive` into `destination` on the blocking pool.
    pub async fn extract(&self, archive: &Path, destination: &Path) -> ExtractionOutcome {
        let archive = archive.to_path_buf();
        let destination = destination.to_path_buf();
        let delete_source = self.delete_source;

        let job = {
            let archive = archive.clone();
            let destination = destination.clone();
            tokio::task::spawn_blocking(move || extract_blocking(archive, destination, delete_source))
        };

        match job.await {
            Ok(outcome) => outcome,
            Err(e) => ExtractionOutcome {
                archive,
                destination,
                format: None,
                entries: 0,
                error: Some(format!("extraction task failed: {e}")),
            },
        }
    }
}

/// `<path>_extracted`
pub fn extraction_dir(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push("_extracted");
    PathBuf::from(name)
}

fn extractor_for(format: ArchiveFormat) -> Box<dyn Extractor> {
    match format {
        ArchiveFormat::Zip => Box::new(ZipExtractor),
        ArchiveFormat::Tar(compression) => Box::new(TarExtractor::new(compression)),
        ArchiveFormat::Gzip => Box::new(GzipExtractor),
    }
}

fn extract_blocking(archive: PathBuf, destination: PathBuf, delete_source: bool) -> ExtractionOutcome {
    let mut outcome = ExtractionOutcome {
        archive,
        destination,
        format: None,
        entries: 0,
        error: None,
    };

    let format = match sniff(&outcome.archive) {
        Ok(Some(format)) => format,
        Ok(None) => {
            log::debug!("{} is not an archive", outcome.archive.display());
            return outcome;
        }
        Err(e) => {
            outcome.error = Some(e.to_string());
            return outcome;
        }
    };
    outcome.format = Some(format);

    match extractor_for(format).extract(&outcome.archive, &outcome.destination) {
        Ok(entries) => {
            outcome.entries = entries;
            log::info!(
                "Extracted {} ({}, {} entries) to {}",
                outcome.archive.display(),
                format,
                entries,
                outcome.destination.display()
            );
            if delete_source {
                if let Err(e) = fs::remove_file(&outcome.archive) {
                    log::warn!("Could not remove {}: {}", outcome.archive.display(), e);
                }
            }
        }
        Err(e) => {
            log::warn!("Extraction of {} failed: {}", outcome.archive.display(), e);
            outcome.error = Some(e.to_string());
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use flate2::Compression;
    use flate2::write::GzEncoder;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    use super::*;

    fn write_zip(path: &Path, files: &[(&str, &[u8])]) {
        let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
        for (name, data) in files {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }

    fn tar_builder<W: Write>(writer: W, files: &[(&str, &[u8])]) -> tar::Builder<W> {
        let mut builder = tar::Builder::new(writer);
        for (name, data) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder
    }

    fn write_tar_gz(path: &Path, files: &[(&str, &[u8])]) {
        let encoder = GzEncoder::new(File::create(path).unwrap(), Compression::default());
        let builder = tar_builder(encoder, files);
        builder.into_inner().unwrap().finish().unwrap();
    }

    fn write_tar(path: &Path, files: &[(&str, &[u8])]) {
        tar_builder(File::create(path).unwrap(), files)
            .into_inner()
            .unwrap();
    }

    #[test]
    fn test_detect_format_from_magic_bytes() {
        assert_eq!(detect_format(b"PK\x03\x04rest"), Some(ArchiveFormat::Zip));
        assert_eq!(detect_format(b"PK\x05\x06"), Some(ArchiveFormat::Zip));
        assert_eq!(detect_format(&[0x1f, 0x8b, 0x08]), Some(ArchiveFormat::Gzip));

        let mut ustar = vec![0u8; 512];
        ustar[257..262].copy_from_slice(b"ustar");
        assert_eq!(
            detect_format(&ustar),
            Some(ArchiveFormat::Tar(TarCompression::Plain))
        );

        assert_eq!(detect_format(b"<html>not found</html>"), None);
        assert_eq!(detect_format(b""), None);
        assert_eq!(detect_format(b"P"), None);
    }

    #[tokio::test]
    async fn test_zip_is_extracted_next_to_archive() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("a.zip");
        write_zip(&archive, &[("hello.txt", b"hello"), ("nested/inner.txt", b"inner")]);

        let outcome = ArchiveMaterializer::default().materialize(&archive).await;

        assert!(outcome.is_extracted(), "{:?}", outcome.error);
        assert_eq!(outcome.format, Some(ArchiveFormat::Zip));
        assert_eq!(outcome.entries, 2);
        assert_eq!(outcome.destination, tmp.path().join("a.zip_extracted"));
        assert_eq!(
            std::fs::read(outcome.destination.join("nested/inner.txt")).unwrap(),
            b"inner"
        );
        assert!(archive.exists());
    }

    #[tokio::test]
    async fn test_file_name_is_not_consulted() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("data.zip");
        write_tar_gz(&archive, &[("table.csv", b"a,b\n1,2\n")]);

        let outcome = ArchiveMaterializer::default().materialize(&archive).await;

        assert_eq!(
            outcome.format,
            Some(ArchiveFormat::Tar(TarCompression::Gzip))
        );
        assert!(outcome.is_extracted(), "{:?}", outcome.error);
        assert!(outcome.destination.join("table.csv").exists());
    }

    #[tokio::test]
    async fn test_gzipped_single_file_is_decompressed() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("bills.xml.gz");
        let xml = b"<?xml version=\"1.0\"?><bills><bill id=\"1\"/></bills>".repeat(20);
        let mut encoder = GzEncoder::new(File::create(&archive).unwrap(), Compression::default());
        encoder.write_all(&xml).unwrap();
        encoder.finish().unwrap();

        let outcome = ArchiveMaterializer::default().materialize(&archive).await;

        assert_eq!(outcome.format, Some(ArchiveFormat::Gzip));
        assert!(outcome.is_extracted(), "{:?}", outcome.error);
        assert!(!outcome.is_failed());
        assert_eq!(outcome.entries, 1);
        assert_eq!(
            std::fs::read(outcome.destination.join("bills.xml")).unwrap(),
            xml
        );
    }

    #[tokio::test]
    async fn test_truncated_gzip_reports_error() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("cut.gz");
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        let data: Vec<u8> = (0..4096u32).map(|i| (i * 7919 % 251) as u8).collect();
        encoder.write_all(&data).unwrap();
        let bytes = encoder.finish().unwrap();
        std::fs::write(&archive, &bytes[..bytes.len() / 2]).unwrap();

        let outcome = ArchiveMaterializer::new(true).materialize(&archive).await;

        assert_eq!(outcome.format, Some(ArchiveFormat::Gzip));
        assert!(outcome.is_failed());
        assert!(archive.exists());
    }

    #[test]
    fn test_gzip_output_name_drops_extension() {
        assert_eq!(
            GzipExtractor::output_name(Path::new("/d/bills.xml.gz")),
            OsString::from("bills.xml")
        );
        assert_eq!(
            GzipExtractor::output_name(Path::new("/d/DATA.GZIP")),
            OsString::from("DATA")
        );
        assert_eq!(
            GzipExtractor::output_name(Path::new("/d/download-0123")),
            OsString::from("download-0123")
        );
        assert_eq!(
            GzipExtractor::output_name(Path::new("/d/.gz")),
            OsString::from(".gz")
        );
    }

    #[tokio::test]
    async fn test_plain_tar_is_extracted() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("bundle");
        write_tar(&archive, &[("docs/readme.txt", b"read me")]);

        let outcome = ArchiveMaterializer::default().materialize(&archive).await;

        assert_eq!(
            outcome.format,
            Some(ArchiveFormat::Tar(TarCompression::Plain))
        );
        assert_eq!(outcome.entries, 1);
        assert_eq!(
            std::fs::read(outcome.destination.join("docs/readme.txt")).unwrap(),
            b"read me"
        );
    }

    #[tokio::test]
    async fn test_non_archive_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let page = tmp.path().join("report.zip");
        std::fs::write(&page, b"<html>Service Unavailable</html>").unwrap();

        let outcome = ArchiveMaterializer::new(true).materialize(&page).await;

        assert_eq!(outcome.format, None);
        assert!(!outcome.is_extracted());
        assert!(!outcome.is_failed());
        assert!(page.exists());
        assert!(!outcome.destination.exists());
    }

    #[tokio::test]
    async fn test_corrupt_zip_reports_error_and_keeps_source() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("broken.zip");
        std::fs::write(&archive, b"PK\x03\x04 this is not really a zip").unwrap();

        let outcome = ArchiveMaterializer::new(true).materialize(&archive).await;

        assert_eq!(outcome.format, Some(ArchiveFormat::Zip));
        assert!(outcome.is_failed());
        assert!(archive.exists());
    }

    #[tokio::test]
    async fn test_delete_source_after_success() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("a.zip");
        write_zip(&archive, &[("x.txt", b"x")]);

        let outcome = ArchiveMaterializer::new(true).materialize(&archive).await;

        assert!(outcome.is_extracted());
        assert!(!archive.exists());
        assert!(outcome.destination.join("x.txt").exists());
    }

    #[tokio::test]
    async fn test_zip_entry_escaping_destination_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("evil.zip");
        write_zip(&archive, &[("../escaped.txt", b"gotcha")]);

        let outcome = ArchiveMaterializer::default()
            .extract(&archive, &tmp.path().join("out"))
            .await;

        assert!(outcome.is_failed());
        assert!(!tmp.path().join("escaped.txt").exists());
    }

    #[test]
    fn test_extraction_dir_appends_suffix() {
        assert_eq!(
            extraction_dir(Path::new("/data/h/a.zip")),
            PathBuf::from("/data/h/a.zip_extracted")
        );
    }
}
