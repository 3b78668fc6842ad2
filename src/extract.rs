//! Extraction entry points.
//!
//! [`extract`] takes a path or URL and returns a normalized patch list.
//! [`VisionExtractor`] does the same behind the [`Extractor`] trait with a
//! provider that is resolved once and reused, which is what the HTTP service
//! holds in its state.

use crate::config::ExtractionConfig;
use crate::error::IngestError;
use crate::output::{ExtractionOutput, ExtractionStats};
use crate::pipeline::{encode, input, llm, normalize, render};
use crate::prompts::page_manifest;
use async_trait::async_trait;
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

const DEFAULT_MODEL: &str = "gpt-4.1-mini";

/// Something that turns a PDF on disk into a normalized patch list.
///
/// The HTTP handler depends on this trait rather than on a model provider so
/// that it can be exercised without network access.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract_file(&self, pdf_path: &Path) -> Result<ExtractionOutput, IngestError>;
}

/// [`Extractor`] backed by a vision LLM.
pub struct VisionExtractor {
    provider: Arc<dyn LLMProvider>,
    config: ExtractionConfig,
}

impl VisionExtractor {
    /// Resolve the provider once; every later call reuses it.
    pub fn new(config: ExtractionConfig) -> Result<Self, IngestError> {
        let provider = resolve_provider(&config)?;
        info!(
            "Extraction provider ready (model: {})",
            config.model.as_deref().unwrap_or("provider default")
        );
        Ok(Self { provider, config })
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }
}

#[async_trait]
impl Extractor for VisionExtractor {
    async fn extract_file(&self, pdf_path: &Path) -> Result<ExtractionOutput, IngestError> {
        let path = pdf_path.to_string_lossy();
        run(&path, &self.provider, &self.config).await
    }
}

/// Read a rider PDF (local path or HTTP/HTTPS URL) into a patch list.
///
/// # Errors
/// Returns `Err(IngestError)` when the PDF cannot be read, the model call
/// fails after all retries, or the model's answer does not normalize
/// ([`IngestError::Normalize`]).
pub async fn extract(
    input_str: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, IngestError> {
    let provider = resolve_provider(config)?;
    run(input_str.as_ref(), &provider, config).await
}

/// Read a rider held in memory. The bytes go to a managed temp file that is
/// removed on return.
pub async fn extract_from_bytes(
    bytes: &[u8],
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, IngestError> {
    let mut tmp = tempfile::Builder::new()
        .suffix(".pdf")
        .tempfile()
        .map_err(|e| IngestError::Internal(format!("tempfile: {e}")))?;
    tmp.write_all(bytes)
        .map_err(|e| IngestError::Internal(format!("tempfile write: {e}")))?;
    let path = tmp.path().to_string_lossy().to_string();
    extract(&path, config).await
}

/// Synchronous wrapper around [`extract`].
pub fn extract_sync(
    input_str: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, IngestError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| IngestError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(extract(input_str, config))
}

async fn run(
    input_str: &str,
    provider: &Arc<dyn LLMProvider>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, IngestError> {
    let total_start = Instant::now();
    info!("Starting extraction: {}", input_str);

    // ── Step 1: Resolve input ────────────────────────────────────────────
    let resolved =
        input::resolve_input(input_str, config.download_timeout_secs, config.max_upload_bytes)
            .await?;

    // ── Step 2: Rasterise leading pages ──────────────────────────────────
    let render_start = Instant::now();
    let rendered = render::render_pages(resolved.path(), config).await?;
    let render_duration_ms = render_start.elapsed().as_millis() as u64;
    info!(
        "Rendered {}/{} pages in {}ms",
        rendered.pages.len(),
        rendered.total_pages,
        render_duration_ms
    );

    // ── Step 3: Encode ───────────────────────────────────────────────────
    let images = encode::encode_pages(&rendered.pages).map_err(|(page, e)| {
        IngestError::RasterisationFailed {
            page,
            detail: format!("Image encoding failed: {}", e),
        }
    })?;
    let rendered_pages = images.len();

    // ── Step 4: Ask the model ────────────────────────────────────────────
    let manifest = page_manifest(rendered_pages, rendered.total_pages);
    let raw = llm::request_extraction(provider, images, &manifest, config).await?;
    debug!("Model answered with {} bytes", raw.text.len());

    // ── Step 5: Normalize ────────────────────────────────────────────────
    let extraction = normalize::normalize(&raw.text)?;

    let stats = ExtractionStats {
        total_pages: rendered.total_pages,
        rendered_pages,
        input_tokens: raw.input_tokens,
        output_tokens: raw.output_tokens,
        retries: raw.retries,
        render_duration_ms,
        llm_duration_ms: raw.duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };

    info!(
        "Extraction complete: '{}' → {} channels ({} dropped), {}ms total",
        extraction.main_artist,
        extraction.entries.len(),
        extraction.excluded_entries,
        stats.total_duration_ms
    );

    Ok(ExtractionOutput {
        extraction,
        raw_response: raw.text,
        stats,
    })
}

// ── Provider resolution ──────────────────────────────────────────────────

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, IngestError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        IngestError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider + model** (`config.provider_name`); the factory reads
///    the matching API key from the environment.
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`).
/// 4. **OpenAI** when `OPENAI_API_KEY` is set.
/// 5. **Full auto-detection** (`ProviderFactory::from_env`).
pub fn resolve_provider(config: &ExtractionConfig) -> Result<Arc<dyn LLMProvider>, IngestError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
            return create_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| IngestError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, GEMINI_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}
