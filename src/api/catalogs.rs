use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::auth::{AdminSession, Session};
use crate::db;
use crate::error::{ApiResult, AppError};
use crate::models::{catalog_key, CatalogEntry, CatalogKind, NONE};
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogQuery {
    #[serde(default)]
    pub include_inactive: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogInput {
    pub name: Option<String>,
    pub display_name: String,
    pub order: Option<i32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogUpdate {
    pub display_name: Option<String>,
    pub order: Option<i32>,
    pub is_active: Option<bool>,
}

/// Internal key for a new entry: the explicit name if given, else derived from the display name.
fn entry_key(input: &CatalogInput) -> ApiResult<String> {
    let source = input
        .name
        .as_deref()
        .filter(|n| !n.trim().is_empty())
        .unwrap_or(&input.display_name);
    let key = catalog_key(source);
    if key.is_empty() {
        return Err(AppError::validation("name or displayName is required"));
    }
    if key == NONE {
        return Err(AppError::validation("NONE is reserved"));
    }
    Ok(key)
}

/// GET /api/catalogs/:kind
pub async fn list_entries(
    _session: Session,
    State(state): State<AppState>,
    Path(kind): Path<CatalogKind>,
    Query(query): Query<CatalogQuery>,
) -> ApiResult<Json<Vec<CatalogEntry>>> {
    Ok(Json(
        db::fetch_catalog(&state.db, kind, query.include_inactive).await?,
    ))
}

/// POST /api/catalogs/:kind
pub async fn create_entry(
    AdminSession(claims): AdminSession,
    State(state): State<AppState>,
    Path(kind): Path<CatalogKind>,
    Json(input): Json<CatalogInput>,
) -> ApiResult<(StatusCode, Json<CatalogEntry>)> {
    let name = entry_key(&input)?;
    let display_name = input.display_name.trim();
    if display_name.is_empty() {
        return Err(AppError::validation("displayName is required"));
    }

    let entry =
        db::insert_catalog_entry(&state.db, kind, &name, display_name, input.order, &claims.email)
            .await?;
    info!(kind = kind.label(), name = %entry.name, by = %claims.email, "catalog entry created");
    Ok((StatusCode::CREATED, Json(entry)))
}

/// PUT /api/catalogs/:kind/:id
pub async fn update_entry(
    AdminSession(claims): AdminSession,
    State(state): State<AppState>,
    Path((kind, id)): Path<(CatalogKind, Uuid)>,
    Json(input): Json<CatalogUpdate>,
) -> ApiResult<Json<CatalogEntry>> {
    let display_name = input
        .display_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty());

    let entry = db::update_catalog_entry(
        &state.db,
        kind,
        id,
        display_name,
        input.order,
        input.is_active,
        &claims.email,
    )
    .await?
    .ok_or_else(|| AppError::not_found(format!("{} type {id}", kind.label())))?;
    info!(kind = kind.label(), name = %entry.name, by = %claims.email, "catalog entry updated");
    Ok(Json(entry))
}

/// DELETE /api/catalogs/:kind/:id
///
/// Soft delete: the entry stays for old reports but is hidden from forms.
pub async fn deactivate_entry(
    AdminSession(claims): AdminSession,
    State(state): State<AppState>,
    Path((kind, id)): Path<(CatalogKind, Uuid)>,
) -> ApiResult<Json<CatalogEntry>> {
    let entry = db::deactivate_catalog_entry(&state.db, kind, id, &claims.email)
        .await?
        .ok_or_else(|| AppError::not_found(format!("{} type {id}", kind.label())))?;
    info!(kind = kind.label(), name = %entry.name, by = %claims.email, "catalog entry deactivated");
    Ok(Json(entry))
}

/// DELETE /api/catalogs/:kind/:id/purge
pub async fn purge_entry(
    AdminSession(claims): AdminSession,
    State(state): State<AppState>,
    Path((kind, id)): Path<(CatalogKind, Uuid)>,
) -> ApiResult<StatusCode> {
    if !db::purge_catalog_entry(&state.db, kind, id).await? {
        return Err(AppError::not_found(format!("{} type {id}", kind.label())));
    }
    info!(kind = kind.label(), entry = %id, by = %claims.email, "catalog entry purged");
    Ok(StatusCode::NO_CONTENT)
}
