//! Router construction.

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, header},
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, set_header::SetResponseHeaderLayer, trace::TraceLayer};

use crate::routes;
use crate::state::AppState;

/// Build the service router around `state`.
pub fn build_router(state: Arc<AppState>) -> Router {
    let body_limit = state.body_limit();

    Router::new()
        .route("/ping", get(routes::ping))
        .route("/merge-first-syllabus", post(routes::merge_first_syllabus))
        .route("/merge-curriculum-syllabi", post(routes::merge_curriculum_syllabi))
        .route("/api/convert-docx-to-pdf", post(routes::convert_docx_to_pdf))
        .route("/api/convert-merge-pdfs", post(routes::convert_merge_pdfs))
        .route("/api/pdf-health", get(routes::pdf_health))
        // Generated documents are never cached
        .layer(SetResponseHeaderLayer::if_not_present(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store, max-age=0"),
        ))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
