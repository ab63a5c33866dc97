//! Request/response types shared by the HTTP handlers

pub mod error;
pub mod json;

pub use error::{ApiError, ApiErrorResponse};
pub use json::{with_status, Json};
