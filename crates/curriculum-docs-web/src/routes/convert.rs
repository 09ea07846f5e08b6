//! Conversion routes - DOCX to PDF, single and merged.

use axum::{
    extract::State,
    http::{HeaderName, HeaderValue},
    response::Response,
};
use axum_extra::extract::Multipart;
use curriculum_docs_core::{
    PDF_MIME, UploadedFile,
    util::{file_stem, sanitize_filename},
};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::ApiError;
use crate::helpers::{ResultExt, RouteResult, attachment, extension_list, read_limited};
use crate::state::AppState;

/// Download name of a merged batch
const MERGED_NAME: &str = "merged_curriculum.pdf";
/// Download name when only the first document could be returned
const DEGRADED_NAME: &str = "curriculum.pdf";

/// Set on merged downloads that contain only the first document
const MERGE_DEGRADED_HEADER: &str = "x-merge-degraded";

/// Convert the uploaded `file` to PDF.
pub async fn convert_docx_to_pdf(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> RouteResult<Response> {
    let limits = &state.config.limits;
    let mut upload = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .or_bad_request("Invalid multipart body")?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();

        if filename.is_empty() {
            return Err(ApiError::bad_request("No file selected"));
        }
        if !limits.is_allowed(&filename) {
            return Err(ApiError::bad_request(format!(
                "Only {} files are allowed",
                extension_list(&limits.allowed_extensions)
            )));
        }

        let bytes = read_limited(field, limits.max_file_size_bytes, &limits.max_file_size_label())
            .await?;
        upload = Some(UploadedFile::new(filename, bytes));
        break;
    }

    let file = upload.ok_or_else(|| ApiError::bad_request("No file uploaded"))?;
    if file.bytes.is_empty() {
        return Err(ApiError::bad_request(format!("File {} is empty", file.filename)));
    }

    let pdf = state.pipeline.convert(&file).await?;

    let safe_name = sanitize_filename(&file.filename, "document.docx");
    let download_name = format!("{}.pdf", file_stem(&safe_name));

    info!("Converted {} to {} ({} bytes)", file.filename, download_name, pdf.len());
    attachment(pdf, PDF_MIME, &download_name)
}

/// Convert every uploaded `files` entry in order and merge the results.
pub async fn convert_merge_pdfs(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> RouteResult<Response> {
    let limits = &state.config.limits;
    let limit_label = limits.max_file_size_label();

    let mut files = Vec::new();
    let mut received = 0usize;
    let mut selected = 0usize;

    while let Some(field) = multipart
        .next_field()
        .await
        .or_bad_request("Invalid multipart body")?
    {
        if field.name() != Some("files") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();

        received += 1;
        if received > limits.max_files {
            return Err(ApiError::bad_request(format!(
                "Too many files (max {})",
                limits.max_files
            )));
        }
        if filename.is_empty() {
            continue;
        }
        selected += 1;

        if !limits.is_allowed(&filename) {
            warn!("Skipping {}: unsupported file type", filename);
            continue;
        }

        let bytes = read_limited(field, limits.max_file_size_bytes, &limit_label).await?;
        if bytes.is_empty() {
            warn!("Skipping {}: empty file", filename);
            continue;
        }
        files.push(UploadedFile::new(filename, bytes));
    }

    if received == 0 {
        return Err(ApiError::bad_request("No files uploaded"));
    }
    if selected == 0 {
        return Err(ApiError::bad_request("No files selected"));
    }
    if files.is_empty() {
        return Err(ApiError::bad_request("No valid DOCX files to convert"));
    }

    info!("Converting {} documents for merge", files.len());
    let outcome = state.pipeline.convert_and_merge(&files).await?;

    if outcome.degraded {
        let mut response = attachment(outcome.pdf, PDF_MIME, DEGRADED_NAME)?;
        response
            .headers_mut()
            .insert(
                HeaderName::from_static(MERGE_DEGRADED_HEADER),
                HeaderValue::from_static("first-document-only"),
            );
        return Ok(response);
    }

    info!(
        "Merged {} documents into {} ({} bytes)",
        outcome.sources,
        MERGED_NAME,
        outcome.pdf.len()
    );
    attachment(outcome.pdf, PDF_MIME, MERGED_NAME)
}
