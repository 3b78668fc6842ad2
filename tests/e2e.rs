//! End-to-end tests for patchlist-ingest.
//!
//! These render real riders in `./test_cases/` with pdfium and make live LLM
//! API calls. They are gated behind the `E2E_ENABLED` environment variable so
//! they do not run in CI unless explicitly requested.
//!
//! Run with:
//!   E2E_ENABLED=1 PDFIUM_LIB_PATH=. cargo test --test e2e -- --nocapture
//!
//! The rider used by default is `test_cases/rider.pdf`; point
//! `E2E_RIDER_PDF` at another file to try a different one.

use patchlist_ingest::{
    extract, persist_patch_list, DocumentStore, ExtractionConfig, IngestError, SqliteStore,
    VisionExtractor,
};
use std::path::PathBuf;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn rider_path() -> PathBuf {
    std::env::var("E2E_RIDER_PDF")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            PathBuf::from(env!("CARGO_MANIFEST_DIR"))
                .join("test_cases")
                .join("rider.pdf")
        })
}

/// Skip this test if E2E_ENABLED is not set *or* no PDF file at `path`.
macro_rules! e2e_skip_unless_ready {
    ($path:expr) => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP: set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        let p: PathBuf = $path;
        if !p.exists() {
            println!("SKIP: test file not found: {}", p.display());
            return;
        }
        p
    }};
}

fn e2e_config() -> ExtractionConfig {
    ExtractionConfig::builder()
        .max_pages(4)
        .max_retries(1)
        .build()
        .expect("config must build")
}

// ── Live extraction ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_extract_rider() {
    let path = e2e_skip_unless_ready!(rider_path());

    let output = extract(path.to_string_lossy(), &e2e_config())
        .await
        .unwrap_or_else(|e| panic!("extraction failed: {e}"));

    let ex = &output.extraction;
    println!(
        "{} ({}): {} channels, {} excluded",
        ex.main_artist,
        ex.storage_key,
        ex.entries.len(),
        ex.excluded_entries
    );

    assert!(!ex.main_artist.trim().is_empty());
    assert!(!ex.storage_key.is_empty());
    assert!(ex
        .storage_key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_'));
    assert!(!ex.entries.is_empty());
    assert!(output.stats.rendered_pages >= 1);
    assert!(output.stats.rendered_pages <= 4);
}

#[tokio::test]
async fn test_extract_and_persist() {
    let path = e2e_skip_unless_ready!(rider_path());

    let extractor = VisionExtractor::new(e2e_config()).expect("provider must resolve");
    let output = patchlist_ingest::Extractor::extract_file(&extractor, &path)
        .await
        .unwrap_or_else(|e| panic!("extraction failed: {e}"));

    let store = SqliteStore::open_memory().await.unwrap();
    let written = persist_patch_list(&store, &output.extraction).await.unwrap();

    let stored = store
        .list_documents(&output.extraction.storage_key)
        .await
        .unwrap();
    assert_eq!(written, output.extraction.entries.len());
    // Rows that repeat a channel number overwrite each other.
    assert!(!stored.is_empty());
    assert!(stored.len() <= written);
}

#[tokio::test]
async fn test_extract_nonexistent() {
    if std::env::var("E2E_ENABLED").is_err() {
        println!("SKIP");
        return;
    }

    let result = extract("/definitely/not/a/real/rider.pdf", &e2e_config()).await;
    assert!(
        matches!(result, Err(IngestError::FileNotFound { .. })),
        "expected FileNotFound, got {result:?}"
    );
}
