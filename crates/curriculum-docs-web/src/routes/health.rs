//! Liveness and converter health routes.

use axum::{Json, extract::State};
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;

use crate::helpers::duration_label;
use crate::state::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    status: &'static str,
    service: &'static str,
    libre_office: ToolReport,
    limits: LimitsReport,
}

#[derive(Serialize)]
pub struct ToolReport {
    available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitsReport {
    max_file_size: String,
    max_files: usize,
    timeout: String,
    timeout_seconds: u64,
    allowed_formats: Vec<String>,
}

pub async fn ping() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Report converter availability and the configured limits.
///
/// Always 200; an absent converter shows up as `available: false`.
pub async fn pdf_health(State(state): State<Arc<AppState>>) -> Json<HealthReport> {
    let tool = state.pipeline.probe().await;
    let limits = &state.config.limits;
    let timeout_seconds = state.config.converter.timeout_secs;

    Json(HealthReport {
        status: "healthy",
        service: "PDF Conversion Service",
        libre_office: ToolReport {
            available: tool.available,
            version: tool.version,
            error: tool.error,
        },
        limits: LimitsReport {
            max_file_size: limits.max_file_size_label(),
            max_files: limits.max_files,
            timeout: duration_label(timeout_seconds),
            timeout_seconds,
            allowed_formats: limits.allowed_extensions.clone(),
        },
    })
}
