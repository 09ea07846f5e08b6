//! Syllabus routes - DOCX title insertion and composition.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    response::Response,
};
use axum_extra::extract::Multipart;
use curriculum_docs_core::{Composer, DOCX_MIME, insert_title};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use crate::error::ApiError;
use crate::helpers::{ResultExt, RouteResult, attachment, blocking, read_limited, read_text};
use crate::state::AppState;

/// Download name of a titled syllabus
const TITLED_NAME: &str = "merged.docx";
/// Download name of a composed curriculum unless the form names one
const COMPOSED_NAME: &str = "Curriculum_With_Syllabi.docx";

/// Body of a title insertion request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TitleRequest {
    pub title: String,
    pub syllabus_url: String,
}

/// Fetch a syllabus and insert `title` as its first paragraph.
pub async fn merge_first_syllabus(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<TitleRequest>, JsonRejection>,
) -> RouteResult<Response> {
    let Json(request) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;

    let url = request.syllabus_url.trim().to_string();
    if url.is_empty() {
        return Err(ApiError::bad_request("syllabusUrl must not be empty"));
    }

    let syllabus = state.fetcher.fetch(&url).await?;

    let style = state.config.title.clone();
    let title = request.title;
    let titled = blocking(move || insert_title(&syllabus, &title, &style)).await??;

    info!("Inserted title into syllabus from {} ({} bytes)", url, titled.len());
    attachment(titled, DOCX_MIME, TITLED_NAME)
}

/// Append an optional `syllabi` upload onto the `main` upload.
pub async fn merge_curriculum_syllabi(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> RouteResult<Response> {
    let limits = &state.config.limits;
    let limit_label = limits.max_file_size_label();

    let mut main = None;
    let mut syllabi = None;
    let mut download_name = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .or_bad_request("Invalid multipart body")?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "main" => {
                main = Some(read_limited(field, limits.max_file_size_bytes, &limit_label).await?);
            }
            "syllabi" => {
                let selected = field.file_name().is_some_and(|n| !n.is_empty());
                let bytes = read_limited(field, limits.max_file_size_bytes, &limit_label).await?;
                // Browsers send an empty part when no file was chosen
                if selected && !bytes.is_empty() {
                    syllabi = Some(bytes);
                }
            }
            "downloadName" => download_name = Some(read_text(field).await?),
            _ => {}
        }
    }

    let main = main
        .filter(|bytes| !bytes.is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing 'main' file"))?;

    let download_name = download_name
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| COMPOSED_NAME.to_string());

    let with_syllabi = syllabi.is_some();
    let composed = blocking(move || compose_uploads(&main, syllabi.as_deref())).await??;

    info!(
        "Composed {} ({} bytes, syllabi appended: {})",
        download_name,
        composed.len(),
        with_syllabi
    );
    attachment(composed, DOCX_MIME, &download_name)
}

/// Compose the uploads, attributing each failure to the document that caused it.
fn compose_uploads(main: &[u8], syllabi: Option<&[u8]>) -> RouteResult<Vec<u8>> {
    let mut composer = Composer::new(main).or_bad_request("Failed to read main document")?;

    let Some(syllabi) = syllabi else {
        return Ok(main.to_vec());
    };

    composer
        .append(syllabi)
        .or_bad_request("Failed to read/append syllabi document")?;
    composer
        .finish()
        .or_internal_error("Failed to compose merged document")
}
