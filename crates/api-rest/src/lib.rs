//! # API REST
//!
//! JSON HTTP API for DriveFS.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - Bearer token authentication
//! - The OpenAPI document at `/api-docs/openapi.json`
//! - REST-specific concerns (JSON serialization, CORS)
//!
//! Every file operation goes through the caller's [`drivefs_core::vfs::VirtualFs`]; this crate
//! never touches the disk itself.

#![warn(rust_2018_idioms)]

mod admin;
mod files;
mod sharing;

use api_shared::auth::{authenticate_bearer, AuthError};
use api_shared::dto;
use api_shared::{auth_status_for, status_for, HealthService};
use axum::{
    async_trait,
    extract::{DefaultBodyLimit, FromRequestParts},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post, put},
    Router,
};
use drivefs_core::{DriveCore, DriveError, Identity};
use tower_http::cors::CorsLayer;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

/// Largest request body accepted by the upload endpoint.
pub const MAX_UPLOAD_BYTES: usize = 512 * 1024 * 1024;

/// Application state shared across REST API handlers.
#[derive(Clone)]
pub struct AppState {
    core: DriveCore,
}

impl AppState {
    pub fn new(core: DriveCore) -> Self {
        Self { core }
    }
}

/// An error response: a status code and a fixed message.
#[derive(Debug)]
pub struct ApiError(StatusCode, &'static str);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = dto::ErrorRes {
            error: self.1.to_string(),
        };
        (self.0, Json(body)).into_response()
    }
}

impl From<DriveError> for ApiError {
    fn from(err: DriveError) -> Self {
        let (status, message) = status_for(&err);
        Self(status, message)
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        let (status, message) = auth_status_for(&err);
        Self(status, message)
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// The authenticated caller of a request.
pub struct Caller(pub Identity);

#[async_trait]
impl FromRequestParts<AppState> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, ApiError> {
        let identity = authenticate_bearer(state.core.store().as_ref(), &parts.headers).await?;
        Ok(Caller(identity))
    }
}

/// Registers the bearer token scheme the endpoints refer to.
struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    modifiers(&BearerAuth),
    paths(
        health,
        files::list_files,
        files::stat,
        files::download,
        files::upload,
        files::create_folder,
        files::rename,
        files::delete_entry,
        files::folder_stats,
        files::search,
        files::list_drives,
        sharing::create_share,
        sharing::shared_with_me,
        sharing::shared_by_me,
        sharing::revoke_share,
        admin::list_drives,
        admin::create_drive,
        admin::update_drive,
        admin::delete_drive,
        admin::list_members,
        admin::set_member,
        admin::remove_member,
        admin::flush_cache,
    ),
    components(schemas(
        dto::HealthRes,
        dto::ErrorRes,
        dto::MessageRes,
        dto::EntryRes,
        dto::ListRes,
        dto::PathReq,
        dto::RenameReq,
        dto::StatsRes,
        dto::SearchHitRes,
        dto::SearchRes,
        dto::DrivesRes,
        dto::ShareReq,
        dto::ShareRes,
        dto::SharesRes,
        dto::CreateDriveReq,
        dto::UpdateDriveReq,
        dto::DriveRes,
        dto::DriveListRes,
        dto::MemberReq,
        dto::MemberRes,
        dto::MembersRes,
        drivefs_types::PermissionLevel,
    ))
)]
pub struct ApiDoc;

/// The REST router over `core`, with CORS and the OpenAPI document.
pub fn router(core: DriveCore) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/files", get(files::list_files).delete(files::delete_entry))
        .route("/api/stat", get(files::stat))
        .route("/api/download", get(files::download))
        .route(
            "/api/upload",
            put(files::upload).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/api/folders", post(files::create_folder))
        .route("/api/rename", post(files::rename))
        .route("/api/stats", get(files::folder_stats))
        .route("/api/search", get(files::search))
        .route("/api/drives", get(files::list_drives))
        .route("/api/shares", post(sharing::create_share))
        .route("/api/shares/with-me", get(sharing::shared_with_me))
        .route("/api/shares/mine", get(sharing::shared_by_me))
        .route("/api/shares/:id", delete(sharing::revoke_share))
        .route(
            "/api/admin/drives",
            get(admin::list_drives).post(admin::create_drive),
        )
        .route(
            "/api/admin/drives/:name",
            delete(admin::delete_drive).patch(admin::update_drive),
        )
        .route("/api/admin/drives/:name/members", get(admin::list_members))
        .route(
            "/api/admin/drives/:name/members/:login",
            put(admin::set_member).delete(admin::remove_member),
        )
        .route("/api/admin/cache/flush", post(admin::flush_cache))
        .route("/api-docs/openapi.json", get(openapi))
        .layer(CorsLayer::permissive())
        .with_state(AppState::new(core))
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = dto::HealthRes)
    )
)]
/// Health check endpoint for the REST API
///
/// Unauthenticated; used by monitoring and load balancers.
async fn health() -> Json<dto::HealthRes> {
    Json(HealthService::check_health())
}

async fn openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests;
