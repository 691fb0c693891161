//! Password hashing, signed session tokens and the extractors that guard routes.

use anyhow::anyhow;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::{db, AppState};

pub const SESSION_COOKIE: &str = "token";
pub const MIN_PASSWORD_LEN: usize = 8;

pub fn session_ttl() -> Duration {
    Duration::hours(24)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionClaims {
    pub user_id: Uuid,
    pub email: String,
    pub is_admin: bool,
    pub iat: i64,
    pub exp: i64,
}

impl SessionClaims {
    pub fn new(user_id: Uuid, email: &str, is_admin: bool, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            email: email.to_string(),
            is_admin,
            iat: now.timestamp(),
            exp: (now + session_ttl()).timestamp(),
        }
    }
}

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| anyhow!("failed to hash password: {err}"))?;
    Ok(hash.to_string())
}

pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(err) => {
            warn!("stored password hash is unreadable: {err}");
            false
        }
    }
}

pub fn issue_token(secret: &str, claims: &SessionClaims) -> anyhow::Result<String> {
    let token = encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;
    Ok(token)
}

pub fn decode_token(secret: &str, token: &str) -> anyhow::Result<SessionClaims> {
    let data = decode::<SessionClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )?;
    Ok(data.claims)
}

pub fn session_cookie(token: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .http_only(true)
        .same_site(SameSite::Lax)
        .path("/")
        .build()
}

pub fn expired_cookie() -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, "")).path("/").build()
}

/// Any signed-in user.
#[derive(Debug, Clone)]
pub struct Session(pub SessionClaims);

/// A signed-in user with the admin flag.
#[derive(Debug, Clone)]
pub struct AdminSession(pub SessionClaims);

#[async_trait]
impl FromRequestParts<AppState> for Session {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let token = jar
            .get(SESSION_COOKIE)
            .map(|cookie| cookie.value().to_string())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| AppError::unauthorized("Authentication required"))?;

        let claims = decode_token(&state.config.jwt_secret, &token).map_err(|err| {
            debug!("rejected session token: {err}");
            AppError::unauthorized("Session is invalid or expired")
        })?;

        Ok(Session(claims))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AdminSession {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Session(claims) = Session::from_request_parts(parts, state).await?;
        if !claims.is_admin {
            warn!(email = %claims.email, path = %parts.uri.path(), "admin route refused");
            return Err(AppError::unauthorized("Admin privileges required"));
        }

        // the token may predate a demotion or deactivation
        let current = db::fetch_user(&state.db, claims.user_id).await?;
        if !current.is_some_and(|user| user.is_active && user.is_admin) {
            warn!(email = %claims.email, path = %parts.uri.path(), "stale admin session refused");
            return Err(AppError::unauthorized("Admin privileges required"));
        }
        Ok(AdminSession(claims))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn passwords_verify_against_their_hash() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong horse", &hash));
        assert!(!verify_password("correct horse", "not-a-hash"));
    }

    #[test]
    fn tokens_round_trip() {
        let claims = SessionClaims::new(Uuid::new_v4(), "admin@school.org", true, Utc::now());
        let token = issue_token(SECRET, &claims).unwrap();
        assert_eq!(decode_token(SECRET, &token).unwrap(), claims);
    }

    #[test]
    fn tokens_expire_after_a_day() {
        let issued = Utc::now() - Duration::hours(25);
        let claims = SessionClaims::new(Uuid::new_v4(), "teacher@school.org", false, issued);
        assert_eq!(claims.exp - claims.iat, 24 * 60 * 60);
        let token = issue_token(SECRET, &claims).unwrap();
        assert!(decode_token(SECRET, &token).is_err());
    }

    #[test]
    fn tokens_signed_with_another_secret_fail() {
        let claims = SessionClaims::new(Uuid::new_v4(), "teacher@school.org", false, Utc::now());
        let token = issue_token("other-secret", &claims).unwrap();
        assert!(decode_token(SECRET, &token).is_err());
    }

    #[test]
    fn session_cookie_is_http_only() {
        let cookie = session_cookie("abc".to_string());
        assert_eq!(cookie.name(), "token");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.path(), Some("/"));
    }
}
