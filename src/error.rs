//! Error types for the patchlist-ingest library.
//!
//! Three layers of failure exist and each has its own type:
//!
//! * [`IngestError`]: **Fatal** for one extraction: the PDF could not be
//!   read, the provider is not configured, the model call failed after all
//!   retries, or the model's answer could not be normalized. Returned as
//!   `Err(IngestError)` from the top-level `extract*` functions.
//!
//! * [`NormalizeError`]: the model answered, but its text is not a usable
//!   patch list. Split into [`ParseError`] (not JSON at all) and
//!   [`ValidationError`] (JSON, but missing what we need).
//!
//! * [`StoreError`]: the document store rejected a read or a batch commit.
//!
//! Rows of the patch list that lack a column are *not* errors: they are
//! dropped and counted in
//! [`crate::pipeline::normalize::NormalizedExtraction::excluded_entries`].

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the extraction entry points.
#[derive(Debug, Error)]
pub enum IngestError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// The file is larger than the configured upload cap.
    #[error("PDF '{path}' is {size} bytes; the limit is {limit} bytes")]
    FileTooLarge { path: PathBuf, size: u64, limit: u64 },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// The document opened but has no pages to show the model.
    #[error("PDF '{path}' has no pages")]
    EmptyDocument { path: PathBuf },

    /// pdfium-render returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH to the directory containing libpdfium, or install it system-wide."
    )]
    PdfiumBindingFailed(String),

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The model call failed on every attempt.
    #[error("LLM call failed after {retries} retries: {detail}")]
    LlmFailed { retries: u32, detail: String },

    /// The model call exceeded the per-call timeout on every attempt.
    #[error("LLM call timed out after {secs}s ({retries} retries)")]
    ApiTimeout { secs: u64, retries: u32 },

    // ── Normalization ─────────────────────────────────────────────────────
    /// The model answered, but the answer is not a usable patch list.
    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// The model's text, after fence unwrapping, is not syntactically valid JSON.
#[derive(Debug, Error)]
#[error("AI response is not valid JSON: {0}")]
pub struct ParseError(#[from] serde_json::Error);

impl ParseError {
    /// 1-based line of the syntax error.
    pub fn line(&self) -> usize {
        self.0.line()
    }

    /// 1-based column of the syntax error.
    pub fn column(&self) -> usize {
        self.0.column()
    }
}

/// The model returned JSON that does not carry a usable patch list.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A top-level field is absent, null, or empty.
    #[error("AI response is missing required field(s): {}", .fields.join(", "))]
    MissingRequiredField { fields: Vec<&'static str> },

    /// A top-level field is present but of the wrong kind.
    #[error("AI response field '{field}' must be {expected}")]
    InvalidField {
        field: &'static str,
        expected: &'static str,
    },

    /// Every row of the patch list lacked at least one column.
    #[error("AI response has no complete patch list rows ({excluded} incomplete row(s) dropped)")]
    NoValidEntries { excluded: usize },

    /// The artist name has no characters that survive key sanitization.
    #[error("artist name '{main_artist}' has no characters usable as a storage key")]
    EmptyStorageKey { main_artist: String },
}

/// Any failure of the normalizer.
#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Errors from the document store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid collection name '{0}'")]
    InvalidCollection(String),
}
