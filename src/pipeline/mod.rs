//! Pipeline stages for reading a rider PDF into a patch list.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ llm ──▶ normalize
//! (path/URL) (pdfium)  (base64)   (VLM)   (JSON → patch list)
//! ```
//!
//! 1. [`input`]: canonicalise the path or URL to a local, size-checked PDF
//! 2. [`render`]: rasterise the leading pages in `spawn_blocking`
//! 3. [`encode`]: PNG-encode and base64-wrap each page
//! 4. [`llm`]: one multimodal request with retry/backoff; the only
//!    stage with model I/O
//! 5. [`normalize`]: pure, synchronous validation of the model's answer

pub mod encode;
pub mod input;
pub mod llm;
pub mod normalize;
pub mod render;
