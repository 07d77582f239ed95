//! # API DAV
//!
//! WebDAV endpoint for DriveFS, mounted under `/dav`.
//!
//! Clients authenticate with HTTP Basic: a login name and the user's WebDAV application
//! password. `OPTIONS` is answered without credentials so clients can discover the endpoint.
//! Every other verb runs against the caller's [`VirtualFs`](drivefs_core::vfs::VirtualFs), with
//! the lock tokens from the request's `If` header attached.

mod headers;
mod methods;
mod xml;

pub use headers::DAV_PREFIX;

use api_shared::auth::authenticate_basic;
use api_shared::{auth_status_for, status_for};
use axum::{
    body::{to_bytes, Bytes},
    extract::{Request, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use drivefs_core::{DriveCore, DriveError};

/// Largest request body read by `PUT` and `LOCK`.
pub const MAX_BODY_BYTES: usize = 512 * 1024 * 1024;

#[derive(Clone)]
pub struct DavState {
    core: DriveCore,
}

/// The WebDAV router. Every URI outside [`DAV_PREFIX`] is a `404`.
pub fn router(core: DriveCore) -> Router {
    Router::new()
        .fallback(dispatch)
        .with_state(DavState { core })
}

fn error_response(err: DriveError) -> Response {
    let (status, message) = status_for(&err);
    (status, message).into_response()
}

fn unauthorized(status: StatusCode, message: &'static str) -> Response {
    let mut response = (status, message).into_response();
    if status == StatusCode::UNAUTHORIZED {
        response.headers_mut().insert(
            header::WWW_AUTHENTICATE,
            header::HeaderValue::from_static(r#"Basic realm="DriveFS", charset="UTF-8""#),
        );
    }
    response
}

async fn dispatch(State(state): State<DavState>, request: Request) -> Response {
    let path = match headers::virtual_path(request.uri().path()) {
        None => return StatusCode::NOT_FOUND.into_response(),
        Some(Err(err)) => return error_response(err),
        Some(Ok(path)) => path,
    };
    if request.method() == Method::OPTIONS {
        return methods::options();
    }

    let identity = match authenticate_basic(state.core.store().as_ref(), request.headers()).await {
        Ok(identity) => identity,
        Err(err) => {
            let (status, message) = auth_status_for(&err);
            return unauthorized(status, message);
        }
    };

    let (parts, body) = request.into_parts();
    let fs = state
        .core
        .fs(identity)
        .with_lock_tokens(headers::if_tokens(&parts.headers));

    let needs_body = matches!(parts.method.as_str(), "PUT" | "LOCK" | "MKCOL");
    let body = if needs_body {
        match to_bytes(body, MAX_BODY_BYTES).await {
            Ok(bytes) => bytes,
            Err(_) => return StatusCode::PAYLOAD_TOO_LARGE.into_response(),
        }
    } else {
        Bytes::new()
    };

    let result = match parts.method.as_str() {
        "PROPFIND" => methods::propfind(&fs, &path, &parts.headers).await,
        "GET" => methods::get(&fs, &path, false).await,
        "HEAD" => methods::get(&fs, &path, true).await,
        "PUT" => methods::put(&fs, &path, &body).await,
        "MKCOL" => methods::mkcol(&fs, &path, &body).await,
        "DELETE" => methods::delete(&fs, &path).await,
        "MOVE" => methods::move_to(&fs, &path, &parts.headers).await,
        "LOCK" => methods::lock(&fs, &path, &parts.headers, &body).await,
        "UNLOCK" => methods::unlock(&fs, &path, &parts.headers).await,
        _ => {
            return (
                StatusCode::METHOD_NOT_ALLOWED,
                [(header::ALLOW, methods::ALLOWED)],
            )
                .into_response()
        }
    };
    tracing::debug!(method = %parts.method, "dav request");
    result.unwrap_or_else(error_response)
}
