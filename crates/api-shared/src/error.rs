//! Mapping of core errors onto HTTP status codes.
//!
//! Both surfaces answer with the same status for the same failure. Messages are fixed strings
//! so no path, real or virtual, ever leaks into a response body.

use crate::auth::AuthError;
use axum::http::StatusCode;
use drivefs_core::DriveError;

/// Status code and client-facing message for a core error.
///
/// Server-side failures are logged here, once, with their full detail.
pub fn status_for(err: &DriveError) -> (StatusCode, &'static str) {
    match err {
        e if e.is_invalid_path() => (StatusCode::BAD_REQUEST, "Invalid path"),
        DriveError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "Invalid request"),
        DriveError::AuthenticationRequired => (StatusCode::UNAUTHORIZED, "Authentication required"),
        DriveError::AccessDenied(_) | DriveError::EscapesRoot => {
            (StatusCode::FORBIDDEN, "Access denied")
        }
        DriveError::NotFound(_) => (StatusCode::NOT_FOUND, "Not found"),
        DriveError::AlreadyExists(_) => (StatusCode::CONFLICT, "Already exists"),
        DriveError::QuotaExceeded { .. } => (StatusCode::PAYLOAD_TOO_LARGE, "Storage quota exceeded"),
        DriveError::Locked(_) => (StatusCode::LOCKED, "Resource is locked"),
        other => {
            tracing::error!(error = %other, "request failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
        }
    }
}

/// Status code and client-facing message for an authentication failure.
pub fn auth_status_for(err: &AuthError) -> (StatusCode, &'static str) {
    match err {
        AuthError::Missing | AuthError::Invalid => {
            (StatusCode::UNAUTHORIZED, "Authentication required")
        }
        other => {
            tracing::error!(error = %other, "authentication backend failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses() {
        let cases = [
            (DriveError::PathTraversal, StatusCode::BAD_REQUEST),
            (DriveError::UnknownNamespace("etc".into()), StatusCode::BAD_REQUEST),
            (DriveError::AuthenticationRequired, StatusCode::UNAUTHORIZED),
            (DriveError::access_denied("/home/x"), StatusCode::FORBIDDEN),
            (DriveError::EscapesRoot, StatusCode::FORBIDDEN),
            (DriveError::not_found("/home/x"), StatusCode::NOT_FOUND),
            (DriveError::already_exists("/home/x"), StatusCode::CONFLICT),
            (
                DriveError::QuotaExceeded { drive: "d".into() },
                StatusCode::PAYLOAD_TOO_LARGE,
            ),
            (DriveError::Locked("/home/x".into()), StatusCode::LOCKED),
            (
                DriveError::Io(std::io::Error::other("disk")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            let (got, message) = status_for(&err);
            assert_eq!(got, status, "{err:?}");
            assert!(!message.contains("/home"));
        }
    }
}
