use super::*;
use api_shared::auth::{generate_token, token_digest};
use axum::body::Body;
use axum::http::{header, Method, Request};
use drivefs_core::cache::CacheService;
use drivefs_core::config::{CacheConfig, CoreConfig};
use drivefs_core::store::{NewUser, SqliteStore, Store};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

struct Fixture {
    _temp: TempDir,
    app: Router,
    admin: String,
    u1: String,
    u2: String,
}

async fn fixture() -> Fixture {
    let temp = TempDir::new().unwrap();
    let config = CoreConfig::new(temp.path().to_path_buf(), None).unwrap();
    std::fs::create_dir_all(config.users_root()).unwrap();
    std::fs::create_dir_all(config.drives_root()).unwrap();
    let store = Arc::new(SqliteStore::in_memory().unwrap());

    let mut tokens = Vec::new();
    for (login, is_admin) in [("admin", true), ("u1", false), ("u2", false)] {
        let user = store
            .create_user(NewUser {
                login: login.into(),
                display_name: login.into(),
                is_admin,
            })
            .await
            .unwrap();
        let token = generate_token();
        store
            .set_api_token_digest(user.id, &token_digest(&token))
            .await
            .unwrap();
        tokens.push(token);
    }

    let cache = Arc::new(CacheService::with_external(&CacheConfig::default(), None));
    let core = DriveCore::assemble(config, store, cache);
    let u2 = tokens.pop().unwrap();
    let u1 = tokens.pop().unwrap();
    let admin = tokens.pop().unwrap();
    Fixture {
        _temp: temp,
        app: router(core),
        admin,
        u1,
        u2,
    }
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Body,
) -> (StatusCode, Vec<u8>) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = request
        .header(header::CONTENT_TYPE, "application/json")
        .body(body)
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, bytes.to_vec())
}

async fn send_json(
    app: &Router,
    method: Method,
    uri: &str,
    token: &str,
    body: Value,
) -> (StatusCode, Value) {
    let (status, bytes) = send(app, method, uri, Some(token), Body::from(body.to_string())).await;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn get_json(app: &Router, uri: &str, token: &str) -> (StatusCode, Value) {
    let (status, bytes) = send(app, Method::GET, uri, Some(token), Body::empty()).await;
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

async fn upload(app: &Router, path: &str, token: &str, data: &'static [u8]) -> StatusCode {
    let uri = format!("/api/upload?path={path}");
    send(app, Method::PUT, &uri, Some(token), Body::from(data)).await.0
}

#[tokio::test]
async fn health_and_openapi_need_no_token() {
    let f = fixture().await;
    let (status, body) = get_json(&f.app, "/health", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);

    let (status, doc) = get_json(&f.app, "/api-docs/openapi.json", "").await;
    assert_eq!(status, StatusCode::OK);
    assert!(doc["paths"]["/api/files"].is_object());
    assert_eq!(doc["paths"]["/api/stat"]["get"]["summary"], "Describe one entry");
    assert!(doc["components"]["securitySchemes"]["bearer"].is_object());
}

#[tokio::test]
async fn requests_without_a_valid_token_are_rejected() {
    let f = fixture().await;
    let (status, _) = send(&f.app, Method::GET, "/api/files?path=/", None, Body::empty()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, body) = get_json(&f.app, "/api/files?path=/", "not-a-token").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Authentication required");
}

#[tokio::test]
async fn file_lifecycle_in_home() {
    let f = fixture().await;
    let (status, root) = get_json(&f.app, "/api/files?path=/", &f.u1).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(root["entries"].as_array().unwrap().len(), 2);

    let (status, _) =
        send_json(&f.app, Method::POST, "/api/folders", &f.u1, json!({"path": "/home/docs"})).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(upload(&f.app, "/home/docs/a.txt", &f.u1, b"hello").await, StatusCode::CREATED);

    let (status, bytes) = send(
        &f.app,
        Method::GET,
        "/api/download?path=/home/docs/a.txt",
        Some(&f.u1),
        Body::empty(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bytes, b"hello");

    let (status, _) = send_json(
        &f.app,
        Method::POST,
        "/api/rename",
        &f.u1,
        json!({"from": "/home/docs/a.txt", "to": "/home/docs/b.txt"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, listing) = get_json(&f.app, "/api/files?path=/home/docs", &f.u1).await;
    assert_eq!(listing["entries"][0]["name"], "b.txt");

    let (_, stats) = get_json(&f.app, "/api/stats?path=/home", &f.u1).await;
    assert_eq!(stats["total_bytes"], 5);

    let (_, found) = get_json(&f.app, "/api/search?path=/home&q=B.TXT", &f.u1).await;
    assert_eq!(found["hits"][0]["path"], "/home/docs/b.txt");

    let (status, _) = send(
        &f.app,
        Method::DELETE,
        "/api/files?path=/home/docs",
        Some(&f.u1),
        Body::empty(),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = get_json(&f.app, "/api/stat?path=/home/docs", &f.u1).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_paths_are_bad_requests() {
    let f = fixture().await;
    for uri in [
        "/api/files?path=/home/../u2",
        "/api/files?path=/home/%252e%252e/u2",
        "/api/files?path=/etc",
    ] {
        let (status, body) = get_json(&f.app, uri, &f.u1).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(body["error"], "Invalid path");
    }
}

#[tokio::test]
async fn admin_manages_drives_and_members() {
    let f = fixture().await;
    let (status, _) = send_json(
        &f.app,
        Method::POST,
        "/api/admin/drives",
        &f.u1,
        json!({"name": "design"}),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, drive) = send_json(
        &f.app,
        Method::POST,
        "/api/admin/drives",
        &f.admin,
        json!({"name": "design", "quota_bytes": 8}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(drive["quota_bytes"], 8);

    let (status, _) = send_json(
        &f.app,
        Method::PUT,
        "/api/admin/drives/design/members/u1",
        &f.admin,
        json!({"permission": "read-write"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, drives) = get_json(&f.app, "/api/drives", &f.u1).await;
    assert_eq!(drives["drives"], json!(["design"]));
    assert_eq!(upload(&f.app, "/shared/design/a", &f.u1, b"12345").await, StatusCode::CREATED);
    assert_eq!(
        upload(&f.app, "/shared/design/b", &f.u1, b"12345").await,
        StatusCode::PAYLOAD_TOO_LARGE
    );
    assert_eq!(upload(&f.app, "/shared/design/c", &f.u2, b"1").await, StatusCode::FORBIDDEN);

    let (_, members) = get_json(&f.app, "/api/admin/drives/design/members", &f.admin).await;
    assert_eq!(members["members"][0]["login"], "u1");

    let (status, _) = send(
        &f.app,
        Method::DELETE,
        "/api/admin/drives/design/members/u1",
        Some(&f.admin),
        Body::empty(),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, drives) = get_json(&f.app, "/api/drives", &f.u1).await;
    assert_eq!(drives["drives"], json!([]));

    let (status, _) =
        send_json(&f.app, Method::POST, "/api/admin/cache/flush", &f.admin, Value::Null).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(
        &f.app,
        Method::DELETE,
        "/api/admin/drives/design",
        Some(&f.admin),
        Body::empty(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn sharing_round_trip() {
    let f = fixture().await;
    assert_eq!(upload(&f.app, "/home/brief.pdf", &f.u1, b"%PDF").await, StatusCode::CREATED);

    let share_req = json!({"path": "/home/brief.pdf", "recipient": "u2", "permission": "read"});
    let (status, share) =
        send_json(&f.app, Method::POST, "/api/shares", &f.u1, share_req.clone()).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = send_json(&f.app, Method::POST, "/api/shares", &f.u1, share_req).await;
    assert_eq!(status, StatusCode::OK);

    let (_, received) = get_json(&f.app, "/api/shares/with-me", &f.u2).await;
    assert_eq!(received["shares"].as_array().unwrap().len(), 1);

    let shared_path = share["shared_path"].as_str().unwrap().to_string();
    let (status, bytes) = send(
        &f.app,
        Method::GET,
        &format!("/api/download?path={shared_path}"),
        Some(&f.u2),
        Body::empty(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bytes, b"%PDF");
    assert_eq!(upload(&f.app, &shared_path, &f.u2, b"edit").await, StatusCode::FORBIDDEN);

    let id = share["id"].as_str().unwrap();
    let uri = format!("/api/shares/{id}");
    let (status, _) = send(&f.app, Method::DELETE, &uri, Some(&f.u2), Body::empty()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = send(&f.app, Method::DELETE, &uri, Some(&f.u1), Body::empty()).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = get_json(&f.app, &format!("/api/stat?path={shared_path}"), &f.u2).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
