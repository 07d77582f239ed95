//! Item sharing endpoints.

use crate::{ApiResult, AppState, Caller};
use api_shared::dto;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use drivefs_core::store::ShareUpsert;
use drivefs_core::DriveError;
use uuid::Uuid;

#[utoipa::path(
    post,
    path = "/api/shares",
    request_body = dto::ShareReq,
    responses(
        (status = 201, description = "Share created", body = dto::ShareRes),
        (status = 200, description = "Existing share updated in place", body = dto::ShareRes),
        (status = 400, description = "Item cannot be shared", body = dto::ErrorRes),
        (status = 404, description = "Item or recipient not found", body = dto::ErrorRes)
    ),
    security(("bearer" = []))
)]
/// Share an item from the caller's home with another user
///
/// Sharing the same item with the same recipient again updates the permission level and
/// message of the existing share.
#[axum::debug_handler(state = AppState)]
pub(crate) async fn create_share(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Json(req): Json<dto::ShareReq>,
) -> ApiResult<(StatusCode, Json<dto::ShareRes>)> {
    let (share, outcome) = state
        .core
        .shares()
        .share_item(&identity, &req.path, &req.recipient, req.permission, req.message)
        .await?;
    let status = match outcome {
        ShareUpsert::Created => StatusCode::CREATED,
        ShareUpsert::Updated => StatusCode::OK,
    };
    Ok((status, Json(share.into())))
}

#[utoipa::path(
    get,
    path = "/api/shares/with-me",
    responses(
        (status = 200, description = "Shares the caller received", body = dto::SharesRes)
    ),
    security(("bearer" = []))
)]
#[axum::debug_handler(state = AppState)]
pub(crate) async fn shared_with_me(
    State(state): State<AppState>,
    Caller(identity): Caller,
) -> ApiResult<Json<dto::SharesRes>> {
    let shares = state.core.shares().shared_with_me(&identity).await?;
    Ok(Json(dto::SharesRes {
        shares: shares.into_iter().map(Into::into).collect(),
    }))
}

#[utoipa::path(
    get,
    path = "/api/shares/mine",
    responses(
        (status = 200, description = "Shares the caller granted", body = dto::SharesRes)
    ),
    security(("bearer" = []))
)]
#[axum::debug_handler(state = AppState)]
pub(crate) async fn shared_by_me(
    State(state): State<AppState>,
    Caller(identity): Caller,
) -> ApiResult<Json<dto::SharesRes>> {
    let shares = state.core.shares().shared_by_me(&identity).await?;
    Ok(Json(dto::SharesRes {
        shares: shares.into_iter().map(Into::into).collect(),
    }))
}

#[utoipa::path(
    delete,
    path = "/api/shares/{id}",
    params(("id" = String, Path, description = "Share id")),
    responses(
        (status = 204, description = "Share revoked"),
        (status = 403, description = "Not the owner of the share", body = dto::ErrorRes),
        (status = 404, description = "Share not found", body = dto::ErrorRes)
    ),
    security(("bearer" = []))
)]
#[axum::debug_handler(state = AppState)]
pub(crate) async fn revoke_share(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = Uuid::parse_str(&id).map_err(|_| DriveError::not_found("share"))?;
    state.core.shares().revoke(&identity, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
