//! HTTP API handlers

use axum::extract::Multipart;
use axum::routing::{delete, get, patch, post, put};
use axum::Router;

use crate::error::{ApiResult, AppError};
use crate::AppState;

pub mod auth;
pub mod catalogs;
pub mod health;
pub mod reports;
pub mod students;
pub mod users;

pub use health::health_routes;

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/me", get(auth::me))
}

pub fn report_routes() -> Router<AppState> {
    Router::new()
        .route("/api/reports", get(reports::list_reports).post(reports::create_report))
        .route("/api/reports/import", post(reports::import_reports))
        .route("/api/reports/export", get(reports::export_reports))
        .route("/api/reports/summary", post(reports::summarize_reports))
        .route(
            "/api/reports/:id",
            get(reports::get_report)
                .put(reports::update_report)
                .delete(reports::delete_report),
        )
        .route("/api/reports/:id/status", patch(reports::update_status))
}

pub fn student_routes() -> Router<AppState> {
    Router::new()
        .route("/api/students", get(students::list_students).post(students::create_student))
        .route("/api/students/import", post(students::import_students))
        .route(
            "/api/students/:student_id",
            get(students::get_student)
                .put(students::update_student)
                .delete(students::delete_student),
        )
}

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/api/users", get(users::list_users).post(users::create_user))
        .route(
            "/api/users/:id",
            put(users::update_user)
                .patch(users::update_user)
                .delete(users::delete_user),
        )
}

pub fn catalog_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/catalogs/:kind",
            get(catalogs::list_entries).post(catalogs::create_entry),
        )
        .route(
            "/api/catalogs/:kind/:id",
            put(catalogs::update_entry)
                .patch(catalogs::update_entry)
                .delete(catalogs::deactivate_entry),
        )
        .route("/api/catalogs/:kind/:id/purge", delete(catalogs::purge_entry))
}

/// Pulls the `file` field out of a multipart upload.
pub(crate) async fn read_upload(mut multipart: Multipart) -> ApiResult<Vec<u8>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::validation(format!("Invalid upload: {err}")))?
    {
        if field.name() == Some("file") {
            let bytes = field
                .bytes()
                .await
                .map_err(|err| AppError::validation(format!("Invalid upload: {err}")))?;
            return Ok(bytes.to_vec());
        }
    }
    Err(AppError::validation("No file uploaded"))
}
