use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Placeholder used for infraction and intervention on anything that is not an infraction.
pub const NONE: &str = "NONE";

/// Interaction name that unlocks the infraction and intervention fields.
pub const INFRACTION: &str = "INFRACTION";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReportStatus {
    Resolved,
    Unresolved,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Resolved => "RESOLVED",
            ReportStatus::Unresolved => "UNRESOLVED",
        }
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "RESOLVED" => Ok(ReportStatus::Resolved),
            "UNRESOLVED" => Ok(ReportStatus::Unresolved),
            other => Err(format!("unknown report status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub id: Uuid,
    #[serde(rename = "interactionID")]
    pub interaction_id: String,
    pub student_number: String,
    pub entry_timestamp: DateTime<Utc>,
    pub submitter_email: String,
    pub interaction: String,
    #[serde(rename = "interactioncode")]
    pub interaction_code: String,
    pub infraction: String,
    pub intervention: String,
    pub notes: String,
    pub intervention_notes: String,
    pub interaction_timestamp: DateTime<Utc>,
    pub edit_url: Option<String>,
    pub status: ReportStatus,
    pub created_at: DateTime<Utc>,
}

impl Report {
    pub fn interventions(&self) -> Vec<&str> {
        self.intervention
            .split(',')
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .collect()
    }
}

/// A report ready to be written; `interaction_id` is assigned by the database when absent.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReport {
    pub interaction_id: Option<String>,
    pub student_number: String,
    pub entry_timestamp: DateTime<Utc>,
    pub submitter_email: String,
    pub interaction: String,
    pub infraction: String,
    pub intervention: String,
    pub notes: String,
    pub intervention_notes: String,
    pub interaction_timestamp: DateTime<Utc>,
    pub edit_url: Option<String>,
    pub status: ReportStatus,
}

impl NewReport {
    /// Clears infraction and intervention unless the interaction is an infraction.
    pub fn normalize(mut self) -> Self {
        if self.interaction != INFRACTION {
            self.infraction = NONE.to_string();
            self.intervention = NONE.to_string();
        } else {
            if self.infraction.trim().is_empty() {
                self.infraction = NONE.to_string();
            }
            if self.intervention.trim().is_empty() {
                self.intervention = NONE.to_string();
            }
        }
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReportFilter {
    pub status: Option<ReportStatus>,
    pub student_number: Option<String>,
    pub interaction: Option<String>,
    pub submitter_email: Option<String>,
    pub since_days: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub student_id: String,
    pub first_name: String,
    pub last_name: String,
    pub is_active: bool,
}

pub fn is_valid_student_number(value: &str) -> bool {
    value.len() == 6 && value.bytes().all(|b| b.is_ascii_digit())
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub is_admin: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// The three admin-editable type lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogKind {
    Interaction,
    Infraction,
    Intervention,
}

impl CatalogKind {
    pub fn table(&self) -> &'static str {
        match self {
            CatalogKind::Interaction => "interaction_log.interaction_types",
            CatalogKind::Infraction => "interaction_log.infraction_types",
            CatalogKind::Intervention => "interaction_log.intervention_types",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CatalogKind::Interaction => "interaction",
            CatalogKind::Infraction => "infraction",
            CatalogKind::Intervention => "intervention",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub id: Uuid,
    pub name: String,
    pub display_name: String,
    pub is_active: bool,
    pub order: i32,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Turns "Shout out" or "shout-out" into "SHOUT_OUT".
pub fn catalog_key(display: &str) -> String {
    let mut key = String::with_capacity(display.len());
    let mut pending_separator = false;
    for ch in display.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_separator && !key.is_empty() {
                key.push('_');
            }
            pending_separator = false;
            key.push(ch.to_ascii_uppercase());
        } else {
            pending_separator = true;
        }
    }
    key
}

/// Rows processed by a bulk import; `errors` is omitted from JSON when empty.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ImportSummary {
    pub total: usize,
    pub imported: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct InteractionSummary {
    pub interaction: String,
    pub count: usize,
    pub unresolved: usize,
}
