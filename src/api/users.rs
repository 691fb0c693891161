use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::auth::{self, AdminSession, MIN_PASSWORD_LEN};
use crate::db::{self, NewUser, UserUpdate};
use crate::error::{ApiResult, AppError};
use crate::models::User;
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUser {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub is_admin: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUser {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub is_admin: Option<bool>,
    pub is_active: Option<bool>,
    pub password: Option<String>,
}

fn check_password(password: &str) -> ApiResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

fn check_email(email: &str) -> ApiResult<String> {
    let email = email.trim().to_ascii_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(AppError::validation("a valid email is required")),
    }
}

/// GET /api/users
pub async fn list_users(
    _admin: AdminSession,
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<User>>> {
    Ok(Json(db::fetch_users(&state.db).await?))
}

/// POST /api/users
pub async fn create_user(
    AdminSession(claims): AdminSession,
    State(state): State<AppState>,
    Json(input): Json<CreateUser>,
) -> ApiResult<(StatusCode, Json<User>)> {
    let email = check_email(&input.email)?;
    check_password(&input.password)?;
    let password_hash = auth::hash_password(&input.password)?;

    let user = db::insert_user(
        &state.db,
        &NewUser {
            email: &email,
            password_hash: &password_hash,
            first_name: input.first_name.trim(),
            last_name: input.last_name.trim(),
            is_admin: input.is_admin,
        },
    )
    .await?;

    info!(email = %user.email, admin = user.is_admin, by = %claims.email, "user created");
    Ok((StatusCode::CREATED, Json(user)))
}

/// PUT /api/users/:id
pub async fn update_user(
    AdminSession(claims): AdminSession,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateUser>,
) -> ApiResult<Json<User>> {
    let password_hash = match input.password.as_deref() {
        Some(password) => {
            check_password(password)?;
            Some(auth::hash_password(password)?)
        }
        None => None,
    };

    let update = UserUpdate {
        first_name: input.first_name.map(|v| v.trim().to_string()),
        last_name: input.last_name.map(|v| v.trim().to_string()),
        is_admin: input.is_admin,
        is_active: input.is_active,
        password_hash,
    };

    let user = db::update_user(&state.db, id, &update)
        .await?
        .ok_or_else(|| AppError::not_found(format!("user {id}")))?;
    info!(email = %user.email, by = %claims.email, "user updated");
    Ok(Json(user))
}

/// DELETE /api/users/:id
pub async fn delete_user(
    AdminSession(claims): AdminSession,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if id == claims.user_id {
        return Err(AppError::validation("you cannot delete your own account"));
    }
    if !db::delete_user(&state.db, id).await? {
        return Err(AppError::not_found(format!("user {id}")));
    }
    info!(user = %id, by = %claims.email, "user deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emails_are_normalized() {
        assert_eq!(check_email(" Admin@School.org ").unwrap(), "admin@school.org");
        assert!(check_email("admin").is_err());
        assert!(check_email("@school.org").is_err());
        assert!(check_email("admin@localhost").is_err());
    }

    #[test]
    fn short_passwords_are_rejected() {
        assert!(check_password("1234567").is_err());
        assert!(check_password("12345678").is_ok());
    }
}
