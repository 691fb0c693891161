//! Report endpoints: entry, review, resolution, bulk import/export and summaries.

use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::auth::{AdminSession, Session};
use crate::error::{ApiResult, AppError};
use crate::models::{
    is_valid_student_number, CatalogKind, ImportSummary, NewReport, Report, ReportFilter,
    ReportStatus, INFRACTION, NONE,
};
use crate::{db, export, import, summary, AppState};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportQuery {
    pub status: Option<String>,
    pub student_number: Option<String>,
    pub interaction: Option<String>,
    pub submitter_email: Option<String>,
    pub since_days: Option<i64>,
    pub limit: Option<i64>,
}

impl ReportQuery {
    pub fn into_filter(self) -> ApiResult<ReportFilter> {
        let status = match self.status.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(value) => Some(value.parse::<ReportStatus>().map_err(AppError::Validation)?),
        };
        Ok(ReportFilter {
            status,
            student_number: non_empty(self.student_number),
            interaction: non_empty(self.interaction),
            submitter_email: non_empty(self.submitter_email),
            since_days: self.since_days,
            limit: self.limit,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Intervention field as submitted: one name, a comma list, or an array.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Interventions {
    One(String),
    Many(Vec<String>),
}

impl Interventions {
    fn names(&self) -> Vec<String> {
        let raw: Vec<&str> = match self {
            Interventions::One(value) => value.split(',').collect(),
            Interventions::Many(values) => values.iter().map(String::as_str).collect(),
        };
        let mut names: Vec<String> = Vec::new();
        for name in raw.into_iter().map(|n| n.trim().to_ascii_uppercase()) {
            if !name.is_empty() && name != NONE && !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportInput {
    pub student_number: String,
    pub interaction: String,
    #[serde(default)]
    pub infraction: Option<String>,
    #[serde(default)]
    pub intervention: Option<Interventions>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub intervention_notes: String,
    pub interaction_timestamp: Option<DateTime<Utc>>,
    pub status: Option<ReportStatus>,
}

/// Applies the form rules: infraction details only travel with an infraction.
pub fn report_from_input(
    input: ReportInput,
    submitter_email: &str,
    entry_timestamp: DateTime<Utc>,
    default_status: ReportStatus,
) -> ApiResult<NewReport> {
    let student_number = input.student_number.trim().to_string();
    if !is_valid_student_number(&student_number) {
        return Err(AppError::validation("studentNumber must be 6 digits"));
    }

    let interaction = input.interaction.trim().to_ascii_uppercase();
    if interaction.is_empty() {
        return Err(AppError::validation("interaction is required"));
    }

    let (infraction, intervention) = if interaction == INFRACTION {
        let infraction = input
            .infraction
            .as_deref()
            .map(|v| v.trim().to_ascii_uppercase())
            .filter(|v| !v.is_empty() && v != NONE)
            .ok_or_else(|| AppError::validation("infraction is required for an INFRACTION report"))?;
        let interventions = input
            .intervention
            .as_ref()
            .map(Interventions::names)
            .unwrap_or_default();
        let intervention = if interventions.is_empty() {
            NONE.to_string()
        } else {
            interventions.join(",")
        };
        (infraction, intervention)
    } else {
        (NONE.to_string(), NONE.to_string())
    };

    Ok(NewReport {
        interaction_id: None,
        student_number,
        entry_timestamp,
        submitter_email: submitter_email.to_string(),
        interaction,
        infraction,
        intervention,
        notes: input.notes.trim().to_string(),
        intervention_notes: input.intervention_notes.trim().to_string(),
        interaction_timestamp: input.interaction_timestamp.unwrap_or(entry_timestamp),
        edit_url: None,
        status: input.status.unwrap_or(default_status),
    }
    .normalize())
}

async fn ensure_catalog_entries(state: &AppState, report: &NewReport) -> ApiResult<()> {
    if !db::catalog_has_active(&state.db, CatalogKind::Interaction, &report.interaction).await? {
        return Err(AppError::validation(format!(
            "unknown interaction '{}'",
            report.interaction
        )));
    }
    if report.interaction != INFRACTION {
        return Ok(());
    }
    if !db::catalog_has_active(&state.db, CatalogKind::Infraction, &report.infraction).await? {
        return Err(AppError::validation(format!(
            "unknown infraction '{}'",
            report.infraction
        )));
    }
    for name in report.intervention.split(',').filter(|n| *n != NONE) {
        if !db::catalog_has_active(&state.db, CatalogKind::Intervention, name).await? {
            return Err(AppError::validation(format!("unknown intervention '{name}'")));
        }
    }
    Ok(())
}

/// GET /api/reports
pub async fn list_reports(
    _session: Session,
    State(state): State<AppState>,
    Query(query): Query<ReportQuery>,
) -> ApiResult<Json<Vec<Report>>> {
    let filter = query.into_filter()?;
    let reports = db::fetch_reports(&state.db, &filter).await?;
    Ok(Json(reports))
}

/// POST /api/reports
pub async fn create_report(
    Session(claims): Session,
    State(state): State<AppState>,
    Json(input): Json<ReportInput>,
) -> ApiResult<(StatusCode, Json<Report>)> {
    let report = report_from_input(input, &claims.email, Utc::now(), ReportStatus::Unresolved)?;
    ensure_catalog_entries(&state, &report).await?;

    let saved = db::insert_report(&state.db, &report).await?;
    info!(
        interaction_id = %saved.interaction_id,
        student = %saved.student_number,
        interaction = %saved.interaction,
        "report recorded"
    );
    Ok((StatusCode::CREATED, Json(saved)))
}

/// GET /api/reports/:id
pub async fn get_report(
    _session: Session,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Report>> {
    let report = db::fetch_report(&state.db, id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("report {id}")))?;
    Ok(Json(report))
}

/// PUT /api/reports/:id
pub async fn update_report(
    Session(claims): Session,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<ReportInput>,
) -> ApiResult<Json<Report>> {
    let existing = db::fetch_report(&state.db, id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("report {id}")))?;

    if !claims.is_admin && !existing.submitter_email.eq_ignore_ascii_case(&claims.email) {
        return Err(AppError::unauthorized(
            "Only the submitter or an admin can edit this report",
        ));
    }

    let report = report_from_input(
        input,
        &existing.submitter_email,
        existing.entry_timestamp,
        existing.status,
    )?;
    ensure_catalog_entries(&state, &report).await?;

    let updated = db::update_report(&state.db, id, &report)
        .await?
        .ok_or_else(|| AppError::not_found(format!("report {id}")))?;
    info!(interaction_id = %updated.interaction_id, editor = %claims.email, "report edited");
    Ok(Json(updated))
}

#[derive(Debug, Deserialize)]
pub struct StatusInput {
    pub status: ReportStatus,
}

/// PATCH /api/reports/:id/status
pub async fn update_status(
    Session(claims): Session,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<StatusInput>,
) -> ApiResult<Json<Report>> {
    let updated = db::set_report_status(&state.db, id, input.status)
        .await?
        .ok_or_else(|| AppError::not_found(format!("report {id}")))?;
    info!(
        interaction_id = %updated.interaction_id,
        status = %updated.status,
        by = %claims.email,
        "report status changed"
    );
    Ok(Json(updated))
}

/// DELETE /api/reports/:id
pub async fn delete_report(
    AdminSession(claims): AdminSession,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if !db::delete_report(&state.db, id).await? {
        return Err(AppError::not_found(format!("report {id}")));
    }
    info!(report = %id, by = %claims.email, "report deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/reports/import
pub async fn import_reports(
    AdminSession(claims): AdminSession,
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Json<ImportSummary>> {
    let bytes = super::read_upload(multipart).await?;
    info!(bytes = bytes.len(), by = %claims.email, "report import started");
    let summary = import::import_reports(&state.db, &bytes).await?;
    Ok(Json(summary))
}

/// GET /api/reports/export
pub async fn export_reports(
    AdminSession(claims): AdminSession,
    State(state): State<AppState>,
    Query(query): Query<ReportQuery>,
) -> ApiResult<impl IntoResponse> {
    let mut filter = query.into_filter()?;
    // exports are unbounded unless the caller asks for a limit
    filter.limit = filter.limit.or(Some(i64::MAX));
    let reports = db::fetch_reports(&state.db, &filter).await?;
    let body = export::reports_to_csv(&reports)?;
    info!(rows = reports.len(), by = %claims.email, "reports exported");

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"reports.csv\""),
        ],
        body,
    ))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryResponse {
    pub summary: String,
    pub report_count: usize,
}

/// POST /api/reports/summary
pub async fn summarize_reports(
    _session: Session,
    State(state): State<AppState>,
    Json(query): Json<ReportQuery>,
) -> ApiResult<Json<SummaryResponse>> {
    let client = state
        .summary
        .clone()
        .ok_or_else(|| AppError::Unavailable("Report summaries are not configured".to_string()))?;

    let scope = query
        .student_number
        .as_deref()
        .map(|student| format!("student {}", student.trim()));
    let since_days = query.since_days;
    let filter = query.into_filter()?;
    let reports = db::fetch_reports(&state.db, &filter).await?;

    let prompt = summary::build_prompt(scope.as_deref(), since_days, &reports);
    let text = client.summarize(&prompt).await?;

    Ok(Json(SummaryResponse {
        summary: text,
        report_count: reports.len(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn input(interaction: &str) -> ReportInput {
        ReportInput {
            student_number: " 123456 ".to_string(),
            interaction: interaction.to_string(),
            infraction: Some("cell_phone".to_string()),
            intervention: Some(Interventions::Many(vec![
                "verbal_warning".to_string(),
                "PARENT_CONTACT".to_string(),
                "VERBAL_WARNING".to_string(),
            ])),
            notes: " Phone out during quiz ".to_string(),
            intervention_notes: String::new(),
            interaction_timestamp: None,
            status: None,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, 2, 10, 0, 0).unwrap()
    }

    #[test]
    fn infraction_reports_keep_details() {
        let report = report_from_input(input("infraction"), "t@school.org", now(), ReportStatus::Unresolved).unwrap();
        assert_eq!(report.student_number, "123456");
        assert_eq!(report.interaction, "INFRACTION");
        assert_eq!(report.infraction, "CELL_PHONE");
        assert_eq!(report.intervention, "VERBAL_WARNING,PARENT_CONTACT");
        assert_eq!(report.notes, "Phone out during quiz");
        assert_eq!(report.interaction_timestamp, now());
        assert_eq!(report.interaction_id, None);
    }

    #[test]
    fn other_interactions_drop_infraction_fields() {
        let report = report_from_input(input("SHOUT_OUT"), "t@school.org", now(), ReportStatus::Unresolved).unwrap();
        assert_eq!(report.infraction, NONE);
        assert_eq!(report.intervention, NONE);
    }

    #[test]
    fn infraction_without_a_type_is_rejected() {
        let mut missing = input(INFRACTION);
        missing.infraction = Some("NONE".to_string());
        assert!(matches!(
            report_from_input(missing, "t@school.org", now(), ReportStatus::Unresolved),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn student_number_must_be_six_digits() {
        let mut bad = input("SHOUT_OUT");
        bad.student_number = "12345".to_string();
        assert!(report_from_input(bad, "t@school.org", now(), ReportStatus::Unresolved).is_err());
    }

    #[test]
    fn comma_separated_interventions_are_accepted() {
        let mut single = input(INFRACTION);
        single.intervention = Some(Interventions::One("detention, NONE ,".to_string()));
        let report = report_from_input(single, "t@school.org", now(), ReportStatus::Resolved).unwrap();
        assert_eq!(report.intervention, "DETENTION");
        assert_eq!(report.status, ReportStatus::Resolved);
    }

    #[test]
    fn query_status_is_validated() {
        let query = ReportQuery {
            status: Some("resolved".to_string()),
            student_number: Some("  ".to_string()),
            ..Default::default()
        };
        let filter = query.into_filter().unwrap();
        assert_eq!(filter.status, Some(ReportStatus::Resolved));
        assert_eq!(filter.student_number, None);

        let bad = ReportQuery {
            status: Some("archived".to_string()),
            ..Default::default()
        };
        assert!(bad.into_filter().is_err());
    }
}
