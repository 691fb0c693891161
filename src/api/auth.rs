use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use axum_extra::extract::cookie::CookieJar;
use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};

use crate::auth::{self, Session, SessionClaims};
use crate::db;
use crate::error::{ApiResult, AppError};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(request): Json<LoginRequest>,
) -> ApiResult<(CookieJar, Json<SessionClaims>)> {
    let rejected = || AppError::unauthorized("Invalid email or password");

    let user = db::fetch_user_by_email(&state.db, &request.email)
        .await?
        .ok_or_else(rejected)?;

    if !auth::verify_password(&request.password, &user.password_hash) {
        warn!(email = %user.email, "failed login");
        return Err(rejected());
    }
    if !user.is_active {
        warn!(email = %user.email, "login refused for inactive account");
        return Err(AppError::unauthorized("Account is disabled"));
    }

    let claims = SessionClaims::new(user.id, &user.email, user.is_admin, Utc::now());
    let token = auth::issue_token(&state.config.jwt_secret, &claims)?;
    info!(email = %user.email, admin = user.is_admin, "signed in");

    Ok((jar.add(auth::session_cookie(token)), Json(claims)))
}

/// POST /api/auth/logout
pub async fn logout(jar: CookieJar) -> (CookieJar, StatusCode) {
    (jar.remove(auth::expired_cookie()), StatusCode::NO_CONTENT)
}

/// GET /api/auth/me
pub async fn me(Session(claims): Session) -> Json<SessionClaims> {
    Json(claims)
}
