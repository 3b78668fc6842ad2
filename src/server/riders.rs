//! Rider upload and patch list read-back.
//!
//! An upload is spooled to a temp file in the configured upload directory,
//! handed to the [`Extractor`](crate::extract::Extractor), and removed again
//! before the response is sent, whether extraction succeeded or not. Nothing
//! is written to the store unless the model's answer normalized cleanly.

use super::{ApiError, AppState};
use crate::pipeline::input::check_pdf_magic;
use crate::store::{persist_patch_list, StoredDocument};
use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::io::Write;
use std::path::Path as FsPath;
use tempfile::TempPath;
use tracing::{debug, info, warn};

const PDF_MIME: &str = "application/pdf";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_riders).post(upload_rider))
        .route("/{storage_key}", get(get_rider))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub main_artist: String,
    pub storage_key: String,
    pub entries: Vec<crate::pipeline::normalize::PatchEntry>,
    pub excluded_entries: usize,
    pub instruments_and_backlines: Vec<String>,
    pub documents_written: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiderResponse {
    pub storage_key: String,
    pub entries: Vec<StoredDocument>,
}

#[derive(Debug, Serialize)]
pub struct RiderListResponse {
    pub riders: Vec<String>,
}

struct Upload {
    file_name: String,
    bytes: axum::body::Bytes,
}

async fn upload_rider(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), ApiError> {
    let limit = state.config.max_upload_bytes;
    let upload = read_upload(multipart).await?.ok_or(ApiError::MissingFile)?;

    let size = upload.bytes.len() as u64;
    if size > limit {
        return Err(ApiError::PayloadTooLarge { size, limit });
    }
    check_pdf_magic(FsPath::new(&upload.file_name), &upload.bytes).map_err(|_| {
        ApiError::UnsupportedMediaType(format!("'{}' without a PDF header", upload.file_name))
    })?;
    info!("Received rider '{}' ({} bytes)", upload.file_name, size);

    let temp_path = spool(&state.config.upload_dir, &upload.bytes)?;
    let result = state.extractor.extract_file(&temp_path).await;
    remove_spooled(temp_path);

    let output = result?;
    let extraction = output.extraction;
    let documents_written = persist_patch_list(state.store.as_ref(), &extraction).await?;

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            main_artist: extraction.main_artist,
            storage_key: extraction.storage_key,
            entries: extraction.entries,
            excluded_entries: extraction.excluded_entries,
            instruments_and_backlines: extraction.instruments_and_backlines,
            documents_written,
        }),
    ))
}

/// Take the first `file` (or `pdf`) field; other fields are skipped.
async fn read_upload(mut multipart: Multipart) -> Result<Option<Upload>, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if !matches!(field.name(), Some("file") | Some("pdf")) {
            continue;
        }

        let content_type = field.content_type().unwrap_or("none").to_string();
        let mime = content_type.split(';').next().unwrap_or("").trim();
        if !mime.eq_ignore_ascii_case(PDF_MIME) {
            return Err(ApiError::UnsupportedMediaType(content_type));
        }

        let file_name = field.file_name().unwrap_or("rider.pdf").to_string();
        let bytes = field.bytes().await?;
        return Ok(Some(Upload { file_name, bytes }));
    }
    Ok(None)
}

fn spool(upload_dir: &FsPath, bytes: &[u8]) -> Result<TempPath, ApiError> {
    let mut file = tempfile::Builder::new()
        .prefix("rider-")
        .suffix(".pdf")
        .tempfile_in(upload_dir)
        .map_err(|e| ApiError::Internal(format!("cannot create upload file: {e}")))?;
    file.write_all(bytes)
        .and_then(|_| file.flush())
        .map_err(|e| ApiError::Internal(format!("cannot write upload file: {e}")))?;

    let path = file.into_temp_path();
    debug!("Spooled upload to {}", path.display());
    Ok(path)
}

/// Delete a spooled upload. Failures are logged and never reach the client.
fn remove_spooled(path: TempPath) {
    let shown = path.display().to_string();
    if let Err(e) = path.close() {
        warn!("Could not remove upload {}: {}", shown, e);
    }
}

async fn list_riders(State(state): State<AppState>) -> Result<Json<RiderListResponse>, ApiError> {
    let riders = state.store.list_collections().await?;
    Ok(Json(RiderListResponse { riders }))
}

async fn get_rider(
    State(state): State<AppState>,
    Path(storage_key): Path<String>,
) -> Result<Json<RiderResponse>, ApiError> {
    let entries = state.store.list_documents(&storage_key).await?;
    if entries.is_empty() {
        return Err(ApiError::NotFound(storage_key));
    }
    Ok(Json(RiderResponse {
        storage_key,
        entries,
    }))
}
