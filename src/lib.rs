//! # patchlist-ingest
//!
//! Read the input patch list out of a band's technical rider (PDF) with a
//! vision LLM, normalize it, and store one document per console channel.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input      resolve local file or download from URL, check %PDF + size
//!  ├─ 2. Render     rasterise the leading pages via pdfium (spawn_blocking)
//!  ├─ 3. Encode     PNG → base64 ImageData
//!  ├─ 4. VLM        one multimodal request, retried with backoff
//!  ├─ 5. Normalize  unwrap fence → parse JSON → validate → storage key
//!  └─ 6. Store      atomic batch write, one document per channel
//! ```
//!
//! Step 5 is pure and synchronous: see [`pipeline::normalize`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use patchlist_ingest::{extract, persist_patch_list, ExtractionConfig, SqliteStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let config = ExtractionConfig::default();
//!     let output = extract("rider.pdf", &config).await?;
//!
//!     let store = SqliteStore::open("patchlist.db").await?;
//!     let written = persist_patch_list(&store, &output.extraction).await?;
//!     println!("{}: {} channels", output.extraction.main_artist, written);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `cli`    | on      | The `patchlist` binary (clap + anyhow + tracing-subscriber + indicatif) |
//! | `server` | on      | The axum HTTP service in [`server`] |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod extract;
pub mod output;
pub mod pipeline;
pub mod prompts;
#[cfg(feature = "server")]
pub mod server;
pub mod store;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionConfig, ExtractionConfigBuilder, DEFAULT_MAX_UPLOAD_BYTES};
pub use error::{IngestError, NormalizeError, ParseError, StoreError, ValidationError};
pub use extract::{extract, extract_from_bytes, extract_sync, Extractor, VisionExtractor};
pub use output::{ExtractionOutput, ExtractionStats};
pub use pipeline::normalize::{
    normalize, parse_record, sanitize_storage_key, unwrap_code_fence, validate_record,
    ChannelNumber, ExtractionRecord, NormalizedExtraction, PatchEntry, ValidatedRecord,
};
pub use store::{persist_patch_list, DocumentStore, NewDocument, SqliteStore, StoredDocument};
