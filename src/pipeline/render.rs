//! PDF rasterisation: render the leading pages of a rider via pdfium.
//!
//! pdfium is not async-safe, so all work happens inside
//! `tokio::task::spawn_blocking`. Each call binds the library afresh; binding
//! is a `dlopen` of an already-mapped library after the first time.
//!
//! The longest edge of every page is capped at `max_rendered_pixels`, so an
//! A3 stage plot costs the same memory as an A4 input list.

use crate::config::ExtractionConfig;
use crate::error::IngestError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::{debug, info};

/// Pages rasterised from one document.
pub struct RenderedDocument {
    /// Page count of the whole PDF.
    pub total_pages: usize,
    /// The first `min(total_pages, max_pages)` pages, in order.
    pub pages: Vec<DynamicImage>,
}

/// Rasterise the first `config.max_pages` pages of a PDF.
pub async fn render_pages(
    pdf_path: &Path,
    config: &ExtractionConfig,
) -> Result<RenderedDocument, IngestError> {
    let path = pdf_path.to_path_buf();
    let max_pixels = config.max_rendered_pixels;
    let max_pages = config.max_pages;
    let password = config.password.clone();

    tokio::task::spawn_blocking(move || {
        render_pages_blocking(&path, max_pixels, max_pages, password.as_deref())
    })
    .await
    .map_err(|e| IngestError::Internal(format!("Render task panicked: {}", e)))?
}

/// Bind pdfium from `PDFIUM_LIB_PATH` when set, else from the system library.
fn bind_pdfium() -> Result<Pdfium, IngestError> {
    let bindings = match std::env::var("PDFIUM_LIB_PATH") {
        Ok(dir) if !dir.is_empty() => {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(&dir))
        }
        _ => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| IngestError::PdfiumBindingFailed(format!("{:?}", e)))?;

    Ok(Pdfium::new(bindings))
}

fn render_pages_blocking(
    pdf_path: &Path,
    max_pixels: u32,
    max_pages: usize,
    password: Option<&str>,
) -> Result<RenderedDocument, IngestError> {
    let pdfium = bind_pdfium()?;

    let document = pdfium.load_pdf_from_file(pdf_path, password).map_err(|e| {
        let err_str = format!("{:?}", e);
        if err_str.to_lowercase().contains("password") {
            if password.is_some() {
                IngestError::WrongPassword {
                    path: pdf_path.to_path_buf(),
                }
            } else {
                IngestError::PasswordRequired {
                    path: pdf_path.to_path_buf(),
                }
            }
        } else {
            IngestError::CorruptPdf {
                path: pdf_path.to_path_buf(),
                detail: err_str,
            }
        }
    })?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    if total_pages == 0 {
        return Err(IngestError::EmptyDocument {
            path: pdf_path.to_path_buf(),
        });
    }

    let render_count = total_pages.min(max_pages);
    info!(
        "PDF loaded: {} pages, rendering {}",
        total_pages, render_count
    );

    let render_config = PdfRenderConfig::new()
        .set_target_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let mut images = Vec::with_capacity(render_count);

    for idx in 0..render_count {
        let page = pages
            .get(idx as u16)
            .map_err(|e| IngestError::RasterisationFailed {
                page: idx + 1,
                detail: format!("{:?}", e),
            })?;

        let bitmap = page.render_with_config(&render_config).map_err(|e| {
            IngestError::RasterisationFailed {
                page: idx + 1,
                detail: format!("{:?}", e),
            }
        })?;

        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            idx + 1,
            image.width(),
            image.height()
        );
        images.push(image);
    }

    Ok(RenderedDocument {
        total_pages,
        pages: images,
    })
}
