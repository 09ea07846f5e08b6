//! HTTP route handlers for the curriculum document service.
//!
//! Successful document routes return file attachments; every failure is a
//! JSON `{"error": ...}` body produced by [`crate::error::ApiError`].

mod convert;
mod health;
mod syllabus;

pub use convert::{convert_docx_to_pdf, convert_merge_pdfs};
pub use health::{pdf_health, ping};
pub use syllabus::{merge_curriculum_syllabi, merge_first_syllabus};
