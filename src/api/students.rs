use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use tracing::info;

use crate::auth::{AdminSession, Session};
use crate::error::{ApiResult, AppError};
use crate::models::{is_valid_student_number, ImportSummary, Student};
use crate::{db, import, AppState};

fn active_by_default() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct StudentQuery {
    pub active: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentInput {
    pub student_id: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default = "active_by_default")]
    pub is_active: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentUpdate {
    pub first_name: String,
    pub last_name: String,
    #[serde(default = "active_by_default")]
    pub is_active: bool,
}

fn validated(student_id: &str, first_name: &str, last_name: &str, is_active: bool) -> ApiResult<Student> {
    let student_id = student_id.trim();
    if !is_valid_student_number(student_id) {
        return Err(AppError::validation("studentId must be 6 digits"));
    }
    let (first_name, last_name) = (first_name.trim(), last_name.trim());
    if first_name.is_empty() || last_name.is_empty() {
        return Err(AppError::validation("firstName and lastName are required"));
    }
    Ok(Student {
        student_id: student_id.to_string(),
        first_name: first_name.to_string(),
        last_name: last_name.to_string(),
        is_active,
    })
}

/// GET /api/students
pub async fn list_students(
    _session: Session,
    State(state): State<AppState>,
    Query(query): Query<StudentQuery>,
) -> ApiResult<Json<Vec<Student>>> {
    Ok(Json(db::fetch_students(&state.db, query.active).await?))
}

/// GET /api/students/:student_id
pub async fn get_student(
    _session: Session,
    State(state): State<AppState>,
    Path(student_id): Path<String>,
) -> ApiResult<Json<Student>> {
    let student = db::fetch_student(&state.db, &student_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("student {student_id}")))?;
    Ok(Json(student))
}

/// POST /api/students
pub async fn create_student(
    AdminSession(claims): AdminSession,
    State(state): State<AppState>,
    Json(input): Json<StudentInput>,
) -> ApiResult<(StatusCode, Json<Student>)> {
    let student = validated(&input.student_id, &input.first_name, &input.last_name, input.is_active)?;
    let saved = db::insert_student(&state.db, &student).await?;
    info!(student = %saved.student_id, by = %claims.email, "student created");
    Ok((StatusCode::CREATED, Json(saved)))
}

/// PUT /api/students/:student_id
pub async fn update_student(
    AdminSession(claims): AdminSession,
    State(state): State<AppState>,
    Path(student_id): Path<String>,
    Json(input): Json<StudentUpdate>,
) -> ApiResult<Json<Student>> {
    let student = validated(&student_id, &input.first_name, &input.last_name, input.is_active)?;
    let updated = db::update_student(&state.db, &student.student_id, &student)
        .await?
        .ok_or_else(|| AppError::not_found(format!("student {student_id}")))?;
    info!(student = %updated.student_id, by = %claims.email, "student updated");
    Ok(Json(updated))
}

/// DELETE /api/students/:student_id
pub async fn delete_student(
    AdminSession(claims): AdminSession,
    State(state): State<AppState>,
    Path(student_id): Path<String>,
) -> ApiResult<StatusCode> {
    if !db::delete_student(&state.db, &student_id).await? {
        return Err(AppError::not_found(format!("student {student_id}")));
    }
    info!(student = %student_id, by = %claims.email, "student deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/students/import
pub async fn import_students(
    AdminSession(claims): AdminSession,
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Json<ImportSummary>> {
    let bytes = super::read_upload(multipart).await?;
    info!(bytes = bytes.len(), by = %claims.email, "student import started");
    let summary = import::import_students(&state.db, &bytes).await?;
    Ok(Json(summary))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_and_validates_students() {
        let student = validated(" 000123 ", " Avery ", "Lee", true).unwrap();
        assert_eq!(student.student_id, "000123");
        assert_eq!(student.first_name, "Avery");
        assert!(validated("00123", "Avery", "Lee", true).is_err());
        assert!(validated("000123", "", "Lee", true).is_err());
    }
}
