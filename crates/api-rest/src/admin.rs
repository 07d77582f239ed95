//! Administrator endpoints: drives, memberships and the cache.
//!
//! Every action here completes its cache invalidation before the response is sent.

use crate::{ApiResult, AppState, Caller};
use api_shared::dto;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use drivefs_core::store::DriveUpdate;
use drivefs_core::DriveError;

#[utoipa::path(
    get,
    path = "/api/admin/drives",
    responses(
        (status = 200, description = "Every drive", body = dto::DriveListRes),
        (status = 403, description = "Not an administrator", body = dto::ErrorRes)
    ),
    security(("bearer" = []))
)]
#[axum::debug_handler(state = AppState)]
pub(crate) async fn list_drives(
    State(state): State<AppState>,
    Caller(identity): Caller,
) -> ApiResult<Json<dto::DriveListRes>> {
    let drives = state.core.drives().list_drives(&identity).await?;
    Ok(Json(dto::DriveListRes {
        drives: drives.into_iter().map(Into::into).collect(),
    }))
}

#[utoipa::path(
    post,
    path = "/api/admin/drives",
    request_body = dto::CreateDriveReq,
    responses(
        (status = 201, description = "Drive created", body = dto::DriveRes),
        (status = 400, description = "Invalid drive name", body = dto::ErrorRes),
        (status = 403, description = "Not an administrator", body = dto::ErrorRes),
        (status = 409, description = "Drive exists", body = dto::ErrorRes)
    ),
    security(("bearer" = []))
)]
#[axum::debug_handler(state = AppState)]
pub(crate) async fn create_drive(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Json(req): Json<dto::CreateDriveReq>,
) -> ApiResult<(StatusCode, Json<dto::DriveRes>)> {
    let drive = state
        .core
        .drives()
        .create_drive(&identity, &req.name, req.quota_bytes.unwrap_or(0))
        .await?;
    Ok((StatusCode::CREATED, Json(drive.into())))
}

#[utoipa::path(
    patch,
    path = "/api/admin/drives/{name}",
    params(("name" = String, Path, description = "Drive name")),
    request_body = dto::UpdateDriveReq,
    responses(
        (status = 200, description = "Drive updated", body = dto::DriveRes),
        (status = 403, description = "Not an administrator", body = dto::ErrorRes),
        (status = 404, description = "Drive not found", body = dto::ErrorRes)
    ),
    security(("bearer" = []))
)]
/// Change a drive's quota or active flag
///
/// Deactivating a drive revokes every member's access to it immediately.
#[axum::debug_handler(state = AppState)]
pub(crate) async fn update_drive(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Path(name): Path<String>,
    Json(req): Json<dto::UpdateDriveReq>,
) -> ApiResult<Json<dto::DriveRes>> {
    let update = DriveUpdate {
        quota_bytes: req.quota_bytes,
        active: req.active,
    };
    let drive = state
        .core
        .drives()
        .update_drive(&identity, &name, update)
        .await?;
    Ok(Json(drive.into()))
}

#[utoipa::path(
    delete,
    path = "/api/admin/drives/{name}",
    params(("name" = String, Path, description = "Drive name")),
    responses(
        (status = 200, description = "Drive deleted with its members and files", body = dto::DriveRes),
        (status = 403, description = "Not an administrator", body = dto::ErrorRes),
        (status = 404, description = "Drive not found", body = dto::ErrorRes)
    ),
    security(("bearer" = []))
)]
#[axum::debug_handler(state = AppState)]
pub(crate) async fn delete_drive(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Path(name): Path<String>,
) -> ApiResult<Json<dto::DriveRes>> {
    let drive = state.core.drives().delete_drive(&identity, &name).await?;
    Ok(Json(drive.into()))
}

#[utoipa::path(
    get,
    path = "/api/admin/drives/{name}/members",
    params(("name" = String, Path, description = "Drive name")),
    responses(
        (status = 200, description = "Drive members", body = dto::MembersRes),
        (status = 403, description = "Not an administrator", body = dto::ErrorRes),
        (status = 404, description = "Drive not found", body = dto::ErrorRes)
    ),
    security(("bearer" = []))
)]
#[axum::debug_handler(state = AppState)]
pub(crate) async fn list_members(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Path(name): Path<String>,
) -> ApiResult<Json<dto::MembersRes>> {
    let members = state.core.drives().members(&identity, &name).await?;
    Ok(Json(dto::MembersRes {
        members: members.into_iter().map(Into::into).collect(),
    }))
}

#[utoipa::path(
    put,
    path = "/api/admin/drives/{name}/members/{login}",
    params(
        ("name" = String, Path, description = "Drive name"),
        ("login" = String, Path, description = "Member login name")
    ),
    request_body = dto::MemberReq,
    responses(
        (status = 200, description = "Membership set", body = dto::MessageRes),
        (status = 403, description = "Not an administrator", body = dto::ErrorRes),
        (status = 404, description = "Drive or user not found", body = dto::ErrorRes)
    ),
    security(("bearer" = []))
)]
/// Add a member to a drive or change their level
#[axum::debug_handler(state = AppState)]
pub(crate) async fn set_member(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Path((name, login)): Path<(String, String)>,
    Json(req): Json<dto::MemberReq>,
) -> ApiResult<Json<dto::MessageRes>> {
    state
        .core
        .drives()
        .set_member(&identity, &name, &login, req.permission)
        .await?;
    Ok(Json(dto::MessageRes {
        message: format!("{login} has {} access to {name}", req.permission),
    }))
}

#[utoipa::path(
    delete,
    path = "/api/admin/drives/{name}/members/{login}",
    params(
        ("name" = String, Path, description = "Drive name"),
        ("login" = String, Path, description = "Member login name")
    ),
    responses(
        (status = 204, description = "Membership removed"),
        (status = 403, description = "Not an administrator", body = dto::ErrorRes),
        (status = 404, description = "No such membership", body = dto::ErrorRes)
    ),
    security(("bearer" = []))
)]
#[axum::debug_handler(state = AppState)]
pub(crate) async fn remove_member(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Path((name, login)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    let removed = state
        .core
        .drives()
        .remove_member(&identity, &name, &login)
        .await?;
    if !removed {
        return Err(DriveError::not_found("membership").into());
    }
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/admin/cache/flush",
    responses(
        (status = 200, description = "Both cache tiers flushed", body = dto::MessageRes),
        (status = 403, description = "Not an administrator", body = dto::ErrorRes)
    ),
    security(("bearer" = []))
)]
/// Flush every permission and statistics cache entry
#[axum::debug_handler(state = AppState)]
pub(crate) async fn flush_cache(
    State(state): State<AppState>,
    Caller(identity): Caller,
) -> ApiResult<Json<dto::MessageRes>> {
    if !identity.is_admin {
        return Err(DriveError::access_denied("cache").into());
    }
    state.core.cache().flush_all().await;
    Ok(Json(dto::MessageRes {
        message: "caches flushed".into(),
    }))
}
