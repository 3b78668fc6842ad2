//! Input resolution: turn a path or URL into a local, size-checked PDF.
//!
//! pdfium needs a file-system path, so URL inputs are downloaded into a
//! `TempDir` that lives as long as the returned [`ResolvedInput`]. Both kinds
//! are checked for the `%PDF` magic bytes and the upload size cap before any
//! rendering or model call happens.

use crate::error::IngestError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// The resolved input: a local path or a downloaded temp file.
pub enum ResolvedInput {
    /// Input was already a local file.
    Local(PathBuf),
    /// Input was a URL; the `TempDir` is deleted when this value drops.
    Downloaded { path: PathBuf, _temp_dir: TempDir },
}

impl ResolvedInput {
    /// Get the path to the PDF file regardless of how it was resolved.
    pub fn path(&self) -> &Path {
        match self {
            ResolvedInput::Local(p) => p,
            ResolvedInput::Downloaded { path, .. } => path,
        }
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve the input string to a local PDF no larger than `max_bytes`.
pub async fn resolve_input(
    input: &str,
    timeout_secs: u64,
    max_bytes: u64,
) -> Result<ResolvedInput, IngestError> {
    if input.trim().is_empty() {
        return Err(IngestError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, timeout_secs, max_bytes).await
    } else {
        resolve_local(input, max_bytes)
    }
}

/// Check the leading bytes of a buffer for the PDF signature.
pub fn check_pdf_magic(path: &Path, head: &[u8]) -> Result<(), IngestError> {
    if head.starts_with(PDF_MAGIC) {
        return Ok(());
    }
    let mut magic = [0u8; 4];
    let n = head.len().min(4);
    magic[..n].copy_from_slice(&head[..n]);
    Err(IngestError::NotAPdf {
        path: path.to_path_buf(),
        magic,
    })
}

fn check_size(path: &Path, size: u64, limit: u64) -> Result<(), IngestError> {
    if size > limit {
        return Err(IngestError::FileTooLarge {
            path: path.to_path_buf(),
            size,
            limit,
        });
    }
    Ok(())
}

/// Resolve a local file path, validating existence, size and magic bytes.
fn resolve_local(path_str: &str, max_bytes: u64) -> Result<ResolvedInput, IngestError> {
    let path = PathBuf::from(path_str);

    if !path.exists() {
        return Err(IngestError::FileNotFound { path });
    }

    let mut file = match std::fs::File::open(&path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(IngestError::PermissionDenied { path });
        }
        Err(_) => return Err(IngestError::FileNotFound { path }),
    };

    let size = file
        .metadata()
        .map_err(|e| IngestError::Internal(format!("stat {}: {e}", path.display())))?
        .len();
    check_size(&path, size, max_bytes)?;

    let mut head = Vec::with_capacity(4);
    file.by_ref()
        .take(4)
        .read_to_end(&mut head)
        .map_err(|e| IngestError::Internal(format!("read {}: {e}", path.display())))?;
    check_pdf_magic(&path, &head)?;

    debug!("Resolved local PDF: {} ({} bytes)", path.display(), size);
    Ok(ResolvedInput::Local(path))
}

/// Download a URL to a temporary directory and return the path.
async fn download_url(
    url: &str,
    timeout_secs: u64,
    max_bytes: u64,
) -> Result<ResolvedInput, IngestError> {
    info!("Downloading PDF from: {}", url);

    let download_failed = |reason: String| IngestError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| download_failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            IngestError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            download_failed(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(download_failed(format!("HTTP {}", response.status())));
    }

    let filename = extract_filename(url);
    let temp_dir = TempDir::new().map_err(|e| IngestError::Internal(e.to_string()))?;
    let file_path = temp_dir.path().join(&filename);

    if let Some(declared) = response.content_length() {
        check_size(&file_path, declared, max_bytes)?;
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| download_failed(e.to_string()))?;

    check_size(&file_path, bytes.len() as u64, max_bytes)?;
    check_pdf_magic(&file_path, &bytes[..bytes.len().min(4)])?;

    tokio::fs::write(&file_path, &bytes)
        .await
        .map_err(|e| IngestError::Internal(format!("Failed to write temp file: {}", e)))?;

    info!("Downloaded {} bytes to: {}", bytes.len(), file_path.display());

    Ok(ResolvedInput::Downloaded {
        path: file_path,
        _temp_dir: temp_dir,
    })
}

/// Last path segment of the URL when it looks like a file name.
fn extract_filename(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    "rider.pdf".to_string()
}
