//! # API Shared
//!
//! Shared utilities and definitions for the DriveFS surfaces.
//!
//! Contains:
//! - Request/response types with OpenAPI schemas (`dto` module)
//! - Authentication: API token digests and WebDAV application passwords
//! - The error-to-status mapping both HTTP surfaces answer with
//! - Shared services like `HealthService`
//!
//! Used by `api-rest` and `api-dav`.

pub mod auth;
pub mod dto;
pub mod error;
pub mod health;

pub use error::{auth_status_for, status_for};
pub use health::HealthService;
