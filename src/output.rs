//! Result types returned by the extraction entry points.

use crate::pipeline::normalize::NormalizedExtraction;
use serde::{Deserialize, Serialize};

/// A normalized patch list plus the numbers behind it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionOutput {
    /// The storage-ready patch list.
    pub extraction: NormalizedExtraction,
    /// The model's answer before normalization, kept for auditing.
    pub raw_response: String,
    pub stats: ExtractionStats,
}

/// Timing and token accounting for one extraction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionStats {
    /// Pages in the PDF.
    pub total_pages: usize,
    /// Pages rasterised and shown to the model (capped by `max_pages`).
    pub rendered_pages: usize,
    pub input_tokens: usize,
    pub output_tokens: usize,
    /// Model call retries used before the answer arrived.
    pub retries: u32,
    pub render_duration_ms: u64,
    pub llm_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// The model's raw answer for a document, before normalization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawExtraction {
    pub text: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub retries: u32,
    pub duration_ms: u64,
}
