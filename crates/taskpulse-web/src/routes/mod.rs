//! Route handlers.

pub mod status;
pub mod stocks;
pub mod tasks;

use axum::http::StatusCode;
use taskpulse_core::HubError;

/// Map a hub error onto an HTTP status and message.
pub(crate) fn error_status(err: HubError) -> (StatusCode, String) {
    let status = match &err {
        HubError::Validation(_) | HubError::BadRequest(_) | HubError::Json(_) => StatusCode::BAD_REQUEST,
        HubError::NotFound(_) => StatusCode::NOT_FOUND,
        HubError::Config(_) | HubError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string())
}
