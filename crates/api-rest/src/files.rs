//! File and folder endpoints.

use crate::{ApiResult, AppState, Caller};
use api_shared::dto;
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json},
};
use drivefs_core::vfs::FileSystem;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};

#[utoipa::path(
    get,
    path = "/api/files",
    params(dto::PathQuery),
    responses(
        (status = 200, description = "Folder listing", body = dto::ListRes),
        (status = 400, description = "Invalid path or not a folder", body = dto::ErrorRes),
        (status = 401, description = "Authentication required", body = dto::ErrorRes),
        (status = 403, description = "Access denied", body = dto::ErrorRes),
        (status = 404, description = "Not found", body = dto::ErrorRes)
    ),
    security(("bearer" = []))
)]
/// List a folder
///
/// Lists the entries of any folder in the caller's virtual namespace, including the synthetic
/// `/`, `/shared` and `/shared-with-me` folders.
#[axum::debug_handler(state = AppState)]
pub(crate) async fn list_files(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Query(query): Query<dto::PathQuery>,
) -> ApiResult<Json<dto::ListRes>> {
    let fs = state.core.fs(identity);
    let entries = fs.read_dir(query.path()).await?;
    Ok(Json(dto::ListRes {
        path: query.path().to_string(),
        entries: entries.into_iter().map(Into::into).collect(),
    }))
}

#[utoipa::path(
    get,
    path = "/api/stat",
    params(dto::PathQuery),
    responses(
        (status = 200, description = "Entry details", body = dto::EntryRes),
        (status = 401, description = "Authentication required", body = dto::ErrorRes),
        (status = 403, description = "Access denied", body = dto::ErrorRes),
        (status = 404, description = "Not found", body = dto::ErrorRes)
    ),
    security(("bearer" = []))
)]
/// Describe one entry
///
/// Returns name, size, kind and modification time of a file or folder, synthetic folders
/// included.
#[axum::debug_handler(state = AppState)]
pub(crate) async fn stat(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Query(query): Query<dto::PathQuery>,
) -> ApiResult<Json<dto::EntryRes>> {
    let info = state.core.fs(identity).stat(query.path()).await?;
    Ok(Json(info.into()))
}

#[utoipa::path(
    get,
    path = "/api/download",
    params(dto::PathQuery),
    responses(
        (status = 200, description = "File contents", content_type = "application/octet-stream"),
        (status = 400, description = "Not a file", body = dto::ErrorRes),
        (status = 403, description = "Access denied", body = dto::ErrorRes),
        (status = 404, description = "Not found", body = dto::ErrorRes)
    ),
    security(("bearer" = []))
)]
/// Download a file
///
/// The whole file is returned as an attachment named after the entry's display name.
#[axum::debug_handler(state = AppState)]
pub(crate) async fn download(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Query(query): Query<dto::PathQuery>,
) -> ApiResult<impl IntoResponse> {
    let fs = state.core.fs(identity);
    let info = fs.stat(query.path()).await?;
    let data = fs.read_file(query.path()).await?;
    let disposition = format!(
        "attachment; filename*=UTF-8''{}",
        utf8_percent_encode(info.label(), NON_ALPHANUMERIC)
    );
    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        data,
    ))
}

#[utoipa::path(
    put,
    path = "/api/upload",
    params(dto::PathQuery),
    request_body(content = Vec<u8>, content_type = "application/octet-stream"),
    responses(
        (status = 201, description = "File written", body = dto::EntryRes),
        (status = 403, description = "Access denied", body = dto::ErrorRes),
        (status = 404, description = "Parent folder not found", body = dto::ErrorRes),
        (status = 409, description = "A folder exists at the path", body = dto::ErrorRes),
        (status = 413, description = "Storage quota exceeded", body = dto::ErrorRes),
        (status = 423, description = "File is locked", body = dto::ErrorRes)
    ),
    security(("bearer" = []))
)]
/// Upload a file
///
/// The raw request body becomes the file's contents, replacing any existing file.
#[axum::debug_handler(state = AppState)]
pub(crate) async fn upload(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Query(query): Query<dto::PathQuery>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<dto::EntryRes>)> {
    let info = state
        .core
        .fs(identity)
        .write_file(query.path(), &body)
        .await?;
    Ok((StatusCode::CREATED, Json(info.into())))
}

#[utoipa::path(
    post,
    path = "/api/folders",
    request_body = dto::PathReq,
    responses(
        (status = 201, description = "Folder created", body = dto::EntryRes),
        (status = 403, description = "Access denied", body = dto::ErrorRes),
        (status = 404, description = "Parent folder not found", body = dto::ErrorRes),
        (status = 409, description = "Already exists", body = dto::ErrorRes)
    ),
    security(("bearer" = []))
)]
#[axum::debug_handler(state = AppState)]
pub(crate) async fn create_folder(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Json(req): Json<dto::PathReq>,
) -> ApiResult<(StatusCode, Json<dto::EntryRes>)> {
    let info = state.core.fs(identity).mkdir(&req.path).await?;
    Ok((StatusCode::CREATED, Json(info.into())))
}

#[utoipa::path(
    post,
    path = "/api/rename",
    request_body = dto::RenameReq,
    responses(
        (status = 200, description = "Entry moved", body = dto::MessageRes),
        (status = 403, description = "Access denied", body = dto::ErrorRes),
        (status = 404, description = "Source not found", body = dto::ErrorRes),
        (status = 409, description = "Destination exists", body = dto::ErrorRes),
        (status = 413, description = "Storage quota exceeded", body = dto::ErrorRes)
    ),
    security(("bearer" = []))
)]
/// Move or rename an entry
///
/// Write access is needed on both ends. An existing destination is never overwritten.
#[axum::debug_handler(state = AppState)]
pub(crate) async fn rename(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Json(req): Json<dto::RenameReq>,
) -> ApiResult<Json<dto::MessageRes>> {
    state.core.fs(identity).rename(&req.from, &req.to).await?;
    Ok(Json(dto::MessageRes {
        message: "moved".into(),
    }))
}

#[utoipa::path(
    delete,
    path = "/api/files",
    params(dto::PathQuery),
    responses(
        (status = 204, description = "Entry removed"),
        (status = 403, description = "Access denied", body = dto::ErrorRes),
        (status = 404, description = "Not found", body = dto::ErrorRes),
        (status = 423, description = "Entry is locked", body = dto::ErrorRes)
    ),
    security(("bearer" = []))
)]
#[axum::debug_handler(state = AppState)]
pub(crate) async fn delete_entry(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Query(query): Query<dto::PathQuery>,
) -> ApiResult<StatusCode> {
    let path = query
        .path
        .as_deref()
        .ok_or_else(|| drivefs_core::DriveError::invalid_input("path is required"))?;
    state.core.fs(identity).remove_all(path).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/stats",
    params(dto::PathQuery),
    responses(
        (status = 200, description = "Recursive folder statistics", body = dto::StatsRes),
        (status = 400, description = "Not a folder", body = dto::ErrorRes),
        (status = 403, description = "Access denied", body = dto::ErrorRes)
    ),
    security(("bearer" = []))
)]
/// Folder statistics
///
/// File and folder counts and total size beneath a folder, served from the stats cache.
#[axum::debug_handler(state = AppState)]
pub(crate) async fn folder_stats(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Query(query): Query<dto::PathQuery>,
) -> ApiResult<Json<dto::StatsRes>> {
    let stats = state.core.fs(identity).folder_stats(query.path()).await?;
    Ok(Json(stats.into()))
}

#[utoipa::path(
    get,
    path = "/api/search",
    params(dto::SearchQuery),
    responses(
        (status = 200, description = "Entries whose name contains the query", body = dto::SearchRes),
        (status = 403, description = "Access denied", body = dto::ErrorRes)
    ),
    security(("bearer" = []))
)]
#[axum::debug_handler(state = AppState)]
pub(crate) async fn search(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Query(query): Query<dto::SearchQuery>,
) -> ApiResult<Json<dto::SearchRes>> {
    let path = query.path.as_deref().unwrap_or("/home");
    let hits = state.core.fs(identity).search(path, &query.q).await?;
    Ok(Json(dto::SearchRes {
        hits: hits.into_iter().map(Into::into).collect(),
    }))
}

#[utoipa::path(
    get,
    path = "/api/drives",
    responses(
        (status = 200, description = "Drives the caller can open", body = dto::DrivesRes)
    ),
    security(("bearer" = []))
)]
#[axum::debug_handler(state = AppState)]
pub(crate) async fn list_drives(
    State(state): State<AppState>,
    Caller(identity): Caller,
) -> ApiResult<Json<dto::DrivesRes>> {
    let drives = state
        .core
        .permissions()
        .list_accessible_drives(&identity)
        .await?;
    Ok(Json(dto::DrivesRes { drives }))
}
