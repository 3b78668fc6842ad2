//! Image encoding: rendered page → base64 PNG wrapped in `ImageData`.
//!
//! PNG keeps the thin table rules and small type of a patch list crisp;
//! `detail: "high"` makes OpenAI-class models tile the image instead of
//! reading a single downscaled overview.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode a rasterised page as a base64 PNG ready for the model request.
pub fn encode_page(img: &DynamicImage) -> Result<ImageData, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;

    let b64 = STANDARD.encode(&buf);
    debug!("Encoded page → {} bytes base64", b64.len());

    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}

/// Encode every page, failing on the first page that cannot be encoded.
///
/// A patch list often spans pages, so a partial document is not sent.
pub fn encode_pages(
    pages: &[DynamicImage],
) -> Result<Vec<ImageData>, (usize, image::ImageError)> {
    pages
        .iter()
        .enumerate()
        .map(|(idx, img)| encode_page(img).map_err(|e| (idx + 1, e)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn blank(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, Rgba([255, 255, 255, 255])))
    }

    #[test]
    fn encode_small_image() {
        let data = encode_page(&blank(10, 10)).expect("encode should succeed");
        assert_eq!(data.mime_type, "image/png");
        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        assert_eq!(&decoded[1..4], b"PNG");
    }

    #[test]
    fn encode_pages_encodes_every_page() {
        let pages = vec![blank(4, 4), blank(8, 8)];
        let encoded = encode_pages(&pages).unwrap();
        assert_eq!(encoded.len(), 2);
        assert!(encoded.iter().all(|d| d.mime_type == "image/png"));
    }
}
