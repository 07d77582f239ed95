//! One function per WebDAV verb, each working on the caller's [`VirtualFs`].

use crate::headers::{self, Depth};
use crate::xml;
use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use drivefs_core::vfs::{FileInfo, FileSystem, VirtualFs};
use drivefs_core::{DriveError, DriveResult};

/// Verbs answered by the endpoint, as advertised by `OPTIONS`.
pub const ALLOWED: &str = "OPTIONS, PROPFIND, GET, HEAD, PUT, MKCOL, DELETE, MOVE, LOCK, UNLOCK";

const XML_CONTENT_TYPE: &str = "application/xml; charset=utf-8";

fn xml_response(status: StatusCode, body: String) -> Response {
    (status, [(header::CONTENT_TYPE, XML_CONTENT_TYPE)], body).into_response()
}

pub fn options() -> Response {
    (
        StatusCode::OK,
        [
            (header::ALLOW, ALLOWED),
            (header::HeaderName::from_static("dav"), "1, 2"),
            (header::HeaderName::from_static("ms-author-via"), "DAV"),
        ],
    )
        .into_response()
}

/// Lists the resource and, unless `Depth: 0`, its children.
///
/// `Depth: infinity` is answered like `Depth: 1`.
pub async fn propfind(fs: &VirtualFs, path: &str, headers: &HeaderMap) -> DriveResult<Response> {
    let target = fs.stat(path).await?;
    let mut entries = vec![target];
    let depth = Depth::from_headers(headers, Depth::One);
    if entries[0].is_dir && depth != Depth::Zero {
        entries.extend(fs.read_dir(path).await?);
    }
    Ok(xml_response(StatusCode::MULTI_STATUS, xml::multistatus(&entries)))
}

fn file_headers(info: &FileInfo) -> Vec<(header::HeaderName, String)> {
    let mut out = vec![
        (header::CONTENT_TYPE, "application/octet-stream".to_string()),
        (header::CONTENT_LENGTH, info.size.to_string()),
    ];
    if let Some(modified) = info.modified {
        out.push((header::LAST_MODIFIED, xml::http_date(modified)));
    }
    out
}

fn with_headers(status: StatusCode, headers: Vec<(header::HeaderName, String)>, body: Body) -> Response {
    let mut response = (status, body).into_response();
    for (name, value) in headers {
        if let Ok(value) = HeaderValue::from_str(&value) {
            response.headers_mut().insert(name, value);
        }
    }
    response
}

/// `GET` and `HEAD`. Collections have no content to return.
pub async fn get(fs: &VirtualFs, path: &str, head_only: bool) -> DriveResult<Response> {
    let info = fs.stat(path).await?;
    if info.is_dir {
        return Ok(StatusCode::METHOD_NOT_ALLOWED.into_response());
    }
    let body = if head_only {
        Body::empty()
    } else {
        Body::from(fs.read_file(path).await?)
    };
    Ok(with_headers(StatusCode::OK, file_headers(&info), body))
}

/// A missing parent collection is a `409 Conflict` for PUT, MKCOL and MOVE.
pub async fn put(fs: &VirtualFs, path: &str, body: &[u8]) -> DriveResult<Response> {
    let existed = fs.stat(path).await.is_ok();
    match fs.write_file(path, body).await {
        Ok(_) if existed => Ok(StatusCode::NO_CONTENT.into_response()),
        Ok(_) => Ok(StatusCode::CREATED.into_response()),
        Err(DriveError::NotFound(_)) => Ok(StatusCode::CONFLICT.into_response()),
        Err(err) => Err(err),
    }
}

pub async fn mkcol(fs: &VirtualFs, path: &str, body: &[u8]) -> DriveResult<Response> {
    if !body.is_empty() {
        return Ok(StatusCode::UNSUPPORTED_MEDIA_TYPE.into_response());
    }
    match fs.mkdir(path).await {
        Ok(_) => Ok(StatusCode::CREATED.into_response()),
        Err(DriveError::AlreadyExists(_)) => Ok(StatusCode::METHOD_NOT_ALLOWED.into_response()),
        Err(DriveError::NotFound(_)) => Ok(StatusCode::CONFLICT.into_response()),
        Err(err) => Err(err),
    }
}

pub async fn delete(fs: &VirtualFs, path: &str) -> DriveResult<Response> {
    fs.remove_all(path).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// `MOVE`. An existing destination is never replaced, whatever `Overwrite` says.
pub async fn move_to(fs: &VirtualFs, path: &str, headers: &HeaderMap) -> DriveResult<Response> {
    let destination = headers::destination(headers)?;
    fs.stat(path).await?;
    match fs.rename(path, &destination).await {
        Ok(()) => Ok(StatusCode::CREATED.into_response()),
        Err(DriveError::AlreadyExists(_)) => Ok(StatusCode::PRECONDITION_FAILED.into_response()),
        Err(DriveError::NotFound(_)) => Ok(StatusCode::CONFLICT.into_response()),
        Err(err) => Err(err),
    }
}

/// `LOCK`. A body-less request carrying a token in `If` refreshes that lock.
pub async fn lock(
    fs: &VirtualFs,
    path: &str,
    headers: &HeaderMap,
    body: &[u8],
) -> DriveResult<Response> {
    let timeout = headers::lock_timeout(headers);

    if body.is_empty() {
        let token = headers::if_tokens(headers)
            .into_iter()
            .next()
            .ok_or_else(|| DriveError::invalid_input("lock refresh without a token"))?;
        let lock = fs.refresh_lock(path, &token, timeout).await?;
        let is_dir = fs.stat(path).await?.is_dir;
        return Ok(xml_response(StatusCode::OK, xml::lock_discovery(&lock, is_dir)));
    }

    let existed = fs.stat(path).await.is_ok();
    let deep = Depth::from_headers(headers, Depth::Infinity) != Depth::Zero;
    let owner = xml::lock_owner(&String::from_utf8_lossy(body));
    let lock = fs.lock(path, timeout, deep, owner).await?;
    let is_dir = fs.stat(path).await?.is_dir;

    let status = if existed { StatusCode::OK } else { StatusCode::CREATED };
    let mut response = xml_response(status, xml::lock_discovery(&lock, is_dir));
    if let Ok(value) = HeaderValue::from_str(&format!("<{}>", lock.token)) {
        response.headers_mut().insert("lock-token", value);
    }
    Ok(response)
}

pub async fn unlock(fs: &VirtualFs, path: &str, headers: &HeaderMap) -> DriveResult<Response> {
    let token = headers::lock_token(headers)
        .ok_or_else(|| DriveError::invalid_input("missing Lock-Token"))?;
    match fs.unlock(path, &token).await {
        Ok(()) => Ok(StatusCode::NO_CONTENT.into_response()),
        Err(DriveError::NotFound(_)) => Ok(StatusCode::CONFLICT.into_response()),
        Err(err) => Err(err),
    }
}
