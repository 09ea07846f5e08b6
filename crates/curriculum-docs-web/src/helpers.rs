//! Helper types and traits for cleaner route handlers.
//!
//! Provides extension traits for converting `Result` types into API errors,
//! plus the multipart and attachment plumbing shared by the upload routes.

use axum::{
    body::Body,
    http::{StatusCode, header},
    response::Response,
};
use axum_extra::extract::multipart::Field;
use bytes::{Bytes, BytesMut};

use crate::error::ApiError;

/// Standard result type for route handlers.
pub type RouteResult<T> = Result<T, ApiError>;

/// Extension trait for converting `Result<T, E>` to `RouteResult<T>`.
///
/// The error is prefixed with `context`, so the client sees e.g.
/// `Failed to read main document: invalid Zip archive`.
pub trait ResultExt<T, E: std::fmt::Display> {
    /// Converts the error to 500 Internal Server Error.
    fn or_internal_error(self, context: &str) -> RouteResult<T>;

    /// Converts the error to 400 Bad Request.
    fn or_bad_request(self, context: &str) -> RouteResult<T>;
}

impl<T, E: std::fmt::Display> ResultExt<T, E> for Result<T, E> {
    fn or_internal_error(self, context: &str) -> RouteResult<T> {
        self.map_err(|e| ApiError::internal(format!("{context}: {e}")))
    }

    fn or_bad_request(self, context: &str) -> RouteResult<T> {
        self.map_err(|e| ApiError::bad_request(format!("{context}: {e}")))
    }
}

/// Run CPU-bound document work off the async runtime.
pub async fn blocking<T, F>(work: F) -> RouteResult<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .or_internal_error("Task failed")
}

/// Read a multipart field, rejecting it as soon as it grows past `limit` bytes.
pub async fn read_limited(mut field: Field, limit: usize, limit_label: &str) -> RouteResult<Bytes> {
    let name = field
        .file_name()
        .or_else(|| field.name())
        .unwrap_or("upload")
        .to_string();

    let mut buffer = BytesMut::new();
    while let Some(chunk) = field.chunk().await.or_bad_request("Failed to read upload")? {
        if buffer.len() + chunk.len() > limit {
            return Err(ApiError::bad_request(format!(
                "File {name} exceeds the {limit_label} limit"
            )));
        }
        buffer.extend_from_slice(&chunk);
    }
    Ok(buffer.freeze())
}

/// Read a text field.
pub async fn read_text(field: Field) -> RouteResult<String> {
    field.text().await.or_bad_request("Failed to read form field")
}

/// Build a file download response.
pub fn attachment(body: impl Into<Body>, content_type: &str, filename: &str) -> RouteResult<Response> {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", header_safe_filename(filename)),
        )
        .body(body.into())
        .or_internal_error("Failed to build response")
}

/// Replace characters that cannot appear inside a quoted header parameter.
fn header_safe_filename(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c == ' ' || (c.is_ascii_graphic() && c != '"' && c != '\\') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Join allowed extensions for messages: `.docx and .doc`.
pub fn extension_list(extensions: &[String]) -> String {
    let dotted: Vec<String> = extensions.iter().map(|e| format!(".{e}")).collect();
    match dotted.split_last() {
        Some((last, rest)) if !rest.is_empty() => format!("{} and {last}", rest.join(", ")),
        Some((last, _)) => last.clone(),
        None => String::new(),
    }
}

/// Describe a duration in seconds the way the health report shows it.
pub fn duration_label(seconds: u64) -> String {
    match seconds {
        60 => "1 minute".to_string(),
        s if s % 60 == 0 => format!("{} minutes", s / 60),
        1 => "1 second".to_string(),
        s => format!("{s} seconds"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_safe_filename() {
        assert_eq!(header_safe_filename("Curriculum With Syllabi.docx"), "Curriculum With Syllabi.docx");
        assert_eq!(header_safe_filename("a\"b\\c\r\n.docx"), "a_b_c__.docx");
        assert_eq!(header_safe_filename("Café.docx"), "Caf_.docx");
    }

    #[test]
    fn test_extension_list() {
        let exts = |list: &[&str]| list.iter().map(ToString::to_string).collect::<Vec<_>>();
        assert_eq!(extension_list(&exts(&["docx", "doc"])), ".docx and .doc");
        assert_eq!(extension_list(&exts(&["docx"])), ".docx");
        assert_eq!(extension_list(&exts(&["docx", "doc", "odt"])), ".docx, .doc and .odt");
    }

    #[test]
    fn test_duration_label() {
        assert_eq!(duration_label(120), "2 minutes");
        assert_eq!(duration_label(60), "1 minute");
        assert_eq!(duration_label(90), "90 seconds");
    }
}
