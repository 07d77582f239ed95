//! Credential checks shared by the REST and WebDAV surfaces.
//!
//! Two credentials exist per user:
//! - the primary API token, presented as `Authorization: Bearer <token>` and stored as a hex
//!   SHA-256 digest
//! - the WebDAV application password, presented with HTTP Basic authentication and stored as
//!   an Argon2 PHC string

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::http::{header, HeaderMap};
use base64::{engine::general_purpose::STANDARD, Engine};
use drivefs_core::store::Store;
use drivefs_core::{DriveError, Identity};
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing credentials")]
    Missing,
    #[error("invalid credentials")]
    Invalid,
    #[error("password hashing failed: {0}")]
    Hash(String),
    #[error(transparent)]
    Store(#[from] DriveError),
}

/// A fresh random API token (64 hex characters).
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Hex SHA-256 digest of an API token, the form tokens are stored and looked up in.
pub fn token_digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Argon2 PHC string for `password`.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let mut salt = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut salt);
    let salt = SaltString::encode_b64(&salt).map_err(|e| AuthError::Hash(e.to_string()))?;
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Hash(e.to_string()))
}

/// Verifies `password` against a PHC string. Malformed hashes never verify.
pub fn verify_password(password: &str, phc: &str) -> bool {
    match PasswordHash::new(phc) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// Hash verified for unknown logins so they cost as much as a wrong password.
fn dummy_hash() -> &'static str {
    static DUMMY: OnceLock<String> = OnceLock::new();
    DUMMY.get_or_init(|| hash_password(&generate_token()).unwrap_or_default())
}

fn authorization(headers: &HeaderMap) -> Option<&str> {
    headers.get(header::AUTHORIZATION)?.to_str().ok()
}

/// The token of an `Authorization: Bearer` header, if one is present.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = authorization(headers)?;
    let (scheme, token) = value.split_once(' ')?;
    scheme
        .eq_ignore_ascii_case("bearer")
        .then(|| token.trim())
        .filter(|t| !t.is_empty())
}

/// Login and password of an `Authorization: Basic` header, if one is present and well formed.
pub fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = authorization(headers)?;
    let (scheme, encoded) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (login, password) = decoded.split_once(':')?;
    Some((login.to_string(), password.to_string()))
}

/// Authenticates an API token.
pub async fn authenticate_bearer(store: &dyn Store, headers: &HeaderMap) -> Result<Identity, AuthError> {
    let token = bearer_token(headers).ok_or(AuthError::Missing)?;
    let user = store
        .user_by_token_digest(&token_digest(token))
        .await?
        .ok_or(AuthError::Invalid)?;
    Ok(user.identity())
}

/// Authenticates a login and WebDAV application password.
///
/// Unknown logins, users without a WebDAV password and wrong passwords are indistinguishable:
/// each runs one Argon2 verification and ends in [`AuthError::Invalid`].
pub async fn authenticate_basic(store: &dyn Store, headers: &HeaderMap) -> Result<Identity, AuthError> {
    let (login, password) = basic_credentials(headers).ok_or(AuthError::Missing)?;
    let user = store.user_by_login(&login).await?;
    let phc = user
        .as_ref()
        .and_then(|u| u.dav_password_hash.clone())
        .unwrap_or_else(|| dummy_hash().to_string());

    let verified = tokio::task::spawn_blocking(move || verify_password(&password, &phc))
        .await
        .unwrap_or(false);
    match user {
        Some(user) if verified && user.dav_password_hash.is_some() => Ok(user.identity()),
        _ => {
            tracing::debug!("basic authentication failed");
            Err(AuthError::Invalid)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use drivefs_core::store::{NewUser, SqliteStore};

    fn headers(value: &str) -> HeaderMap {
        let mut map = HeaderMap::new();
        map.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        map
    }

    async fn store_with_user() -> (SqliteStore, Identity) {
        let store = SqliteStore::in_memory().unwrap();
        let user = store
            .create_user(NewUser {
                login: "u1".into(),
                display_name: "User One".into(),
                is_admin: false,
            })
            .await
            .unwrap();
        (store, user.identity())
    }

    #[test]
    fn password_hash_round_trip() {
        let phc = hash_password("correct horse").unwrap();
        assert!(phc.starts_with("$argon2"));
        assert!(verify_password("correct horse", &phc));
        assert!(!verify_password("battery staple", &phc));
        assert!(!verify_password("anything", "not a phc string"));
    }

    #[test]
    fn header_parsing() {
        assert_eq!(bearer_token(&headers("Bearer abc")), Some("abc"));
        assert_eq!(bearer_token(&headers("bearer  abc ")), Some("abc"));
        assert_eq!(bearer_token(&headers("Basic abc")), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);

        let encoded = STANDARD.encode("u1:pa:ss");
        assert_eq!(
            basic_credentials(&headers(&format!("Basic {encoded}"))),
            Some(("u1".to_string(), "pa:ss".to_string()))
        );
        assert_eq!(basic_credentials(&headers("Basic !!!")), None);
    }

    #[tokio::test]
    async fn bearer_tokens_are_looked_up_by_digest() {
        let (store, identity) = store_with_user().await;
        let token = generate_token();
        assert_eq!(token.len(), 64);
        store
            .set_api_token_digest(identity.id, &token_digest(&token))
            .await
            .unwrap();

        let found = authenticate_bearer(&store, &headers(&format!("Bearer {token}")))
            .await
            .unwrap();
        assert_eq!(found, identity);
        assert!(matches!(
            authenticate_bearer(&store, &headers("Bearer wrong")).await,
            Err(AuthError::Invalid)
        ));
        assert!(matches!(
            authenticate_bearer(&store, &HeaderMap::new()).await,
            Err(AuthError::Missing)
        ));
    }

    #[tokio::test]
    async fn basic_auth_failures_look_alike() {
        let (store, identity) = store_with_user().await;
        let basic = |login: &str, password: &str| {
            headers(&format!("Basic {}", STANDARD.encode(format!("{login}:{password}"))))
        };

        // No WebDAV password set yet.
        assert!(matches!(
            authenticate_basic(&store, &basic("u1", "")).await,
            Err(AuthError::Invalid)
        ));

        store
            .set_dav_password_hash(identity.id, &hash_password("app-pass").unwrap())
            .await
            .unwrap();
        assert_eq!(
            authenticate_basic(&store, &basic("u1", "app-pass")).await.unwrap(),
            identity
        );
        assert!(matches!(
            authenticate_basic(&store, &basic("u1", "nope")).await,
            Err(AuthError::Invalid)
        ));
        assert!(matches!(
            authenticate_basic(&store, &basic("ghost", "app-pass")).await,
            Err(AuthError::Invalid)
        ));
    }
}
