use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use uuid::Uuid;

use crate::codes;
use crate::import::{ReportSink, StudentSink};
use crate::models::{
    CatalogEntry, CatalogKind, NewReport, Report, ReportFilter, ReportStatus, Student, User,
};

const REPORT_FIELDS: &str = "id, interaction_id, student_number, entry_timestamp, submitter_email, \
     interaction, interaction_code, infraction, intervention, notes, intervention_notes, \
     interaction_timestamp, edit_url, status, created_at";

const USER_FIELDS: &str =
    "id, email, password_hash, first_name, last_name, is_admin, is_active, created_at";

const CATALOG_FIELDS: &str =
    "id, name, display_name, is_active, sort_order, created_by, updated_by, created_at, updated_at";

pub const DEFAULT_REPORT_LIMIT: i64 = 500;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let mut order = 1;
    for (_, name) in codes::interaction_codes() {
        seed_catalog_entry(pool, CatalogKind::Interaction, name, order).await?;
        order += 1;
    }

    for (index, name) in codes::INFRACTION_NAMES.iter().enumerate() {
        seed_catalog_entry(pool, CatalogKind::Infraction, name, index as i32 + 1).await?;
    }

    for (index, name) in codes::intervention_names().into_iter().enumerate() {
        seed_catalog_entry(pool, CatalogKind::Intervention, name, index as i32 + 1).await?;
    }

    let students = vec![
        ("104233", "Avery", "Lee"),
        ("104871", "Jules", "Moreno"),
        ("105120", "Kiara", "Patel"),
    ];

    for (student_id, first_name, last_name) in students {
        upsert_student(
            pool,
            &Student {
                student_id: student_id.to_string(),
                first_name: first_name.to_string(),
                last_name: last_name.to_string(),
                is_active: true,
            },
        )
        .await
        .with_context(|| format!("failed to seed student {student_id}"))?;
    }

    Ok(())
}

async fn seed_catalog_entry(
    pool: &PgPool,
    kind: CatalogKind,
    name: &str,
    order: i32,
) -> anyhow::Result<()> {
    let sql = format!(
        "INSERT INTO {} (id, name, display_name, is_active, sort_order, created_by, updated_by) \
         VALUES ($1, $2, $3, TRUE, $4, 'seed', 'seed') \
         ON CONFLICT (name) DO NOTHING",
        kind.table()
    );
    sqlx::query(&sql)
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(display_name_for(name))
        .bind(order)
        .execute(pool)
        .await
        .with_context(|| format!("failed to seed {} type {name}", kind.label()))?;
    Ok(())
}

/// "FAILURE_TO_MEET_EXPECTATIONS" becomes "Failure To Meet Expectations".
pub fn display_name_for(name: &str) -> String {
    name.split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let lower = word.to_ascii_lowercase();
            let mut chars = lower.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Start of the look-back window. Windows reaching before the epoch start at the epoch.
pub fn since_cutoff(since_days: i64) -> DateTime<Utc> {
    Duration::try_days(since_days.max(1))
        .and_then(|window| Utc::now().checked_sub_signed(window))
        .filter(|cutoff| *cutoff > DateTime::UNIX_EPOCH)
        .unwrap_or(DateTime::UNIX_EPOCH)
}

/// Numeric interaction ids share a namespace with the form-entry sequence.
pub fn numeric_interaction_id(interaction_id: &str) -> Option<i64> {
    if interaction_id.is_empty() || !interaction_id.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    interaction_id.parse().ok()
}

/// Moves the interaction id sequence past `interaction_id` so generated ids never collide with it.
async fn advance_interaction_sequence(pool: &PgPool, interaction_id: i64) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        SELECT setval('interaction_log.interaction_id_seq',
                      GREATEST((SELECT last_value FROM interaction_log.interaction_id_seq), $1))
        "#,
    )
    .bind(interaction_id)
    .execute(pool)
    .await?;
    Ok(())
}

fn report_from_row(row: &PgRow) -> sqlx::Result<Report> {
    let status: String = row.try_get("status")?;
    let status = status
        .parse::<ReportStatus>()
        .map_err(|err| sqlx::Error::Decode(err.into()))?;

    Ok(Report {
        id: row.try_get("id")?,
        interaction_id: row.try_get("interaction_id")?,
        student_number: row.try_get("student_number")?,
        entry_timestamp: row.try_get("entry_timestamp")?,
        submitter_email: row.try_get("submitter_email")?,
        interaction: row.try_get("interaction")?,
        interaction_code: row.try_get("interaction_code")?,
        infraction: row.try_get("infraction")?,
        intervention: row.try_get("intervention")?,
        notes: row.try_get("notes")?,
        intervention_notes: row.try_get("intervention_notes")?,
        interaction_timestamp: row.try_get("interaction_timestamp")?,
        edit_url: row.try_get("edit_url")?,
        status,
        created_at: row.try_get("created_at")?,
    })
}

pub async fn fetch_reports(pool: &PgPool, filter: &ReportFilter) -> sqlx::Result<Vec<Report>> {
    let mut query = QueryBuilder::<Postgres>::new(format!(
        "SELECT {REPORT_FIELDS} FROM interaction_log.reports WHERE TRUE"
    ));

    if let Some(status) = filter.status {
        query.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(student_number) = &filter.student_number {
        query.push(" AND student_number = ").push_bind(student_number.clone());
    }
    if let Some(interaction) = &filter.interaction {
        query.push(" AND interaction = ").push_bind(interaction.clone());
    }
    if let Some(email) = &filter.submitter_email {
        query
            .push(" AND lower(submitter_email) = ")
            .push_bind(email.to_ascii_lowercase());
    }
    if let Some(days) = filter.since_days {
        query
            .push(" AND interaction_timestamp >= ")
            .push_bind(since_cutoff(days));
    }

    query
        .push(" ORDER BY interaction_timestamp DESC, created_at DESC LIMIT ")
        .push_bind(filter.limit.unwrap_or(DEFAULT_REPORT_LIMIT).max(1));

    let rows = query.build().fetch_all(pool).await?;
    rows.iter().map(report_from_row).collect()
}

pub async fn fetch_report(pool: &PgPool, id: Uuid) -> sqlx::Result<Option<Report>> {
    let sql = format!("SELECT {REPORT_FIELDS} FROM interaction_log.reports WHERE id = $1");
    let row = sqlx::query(&sql).bind(id).fetch_optional(pool).await?;
    row.as_ref().map(report_from_row).transpose()
}

pub async fn insert_report(pool: &PgPool, report: &NewReport) -> sqlx::Result<Report> {
    let sql = format!(
        r#"
        INSERT INTO interaction_log.reports
        (id, interaction_id, student_number, entry_timestamp, submitter_email, interaction,
         interaction_code, infraction, intervention, notes, intervention_notes,
         interaction_timestamp, edit_url, status)
        VALUES ($1, COALESCE($2, nextval('interaction_log.interaction_id_seq')::text), $3, $4, $5, $6,
                $6, $7, $8, $9, $10, $11, $12, $13)
        RETURNING {REPORT_FIELDS}
        "#
    );

    let row = sqlx::query(&sql)
        .bind(Uuid::new_v4())
        .bind(report.interaction_id.as_deref())
        .bind(&report.student_number)
        .bind(report.entry_timestamp)
        .bind(&report.submitter_email)
        .bind(&report.interaction)
        .bind(&report.infraction)
        .bind(&report.intervention)
        .bind(&report.notes)
        .bind(&report.intervention_notes)
        .bind(report.interaction_timestamp)
        .bind(report.edit_url.as_deref())
        .bind(report.status.as_str())
        .fetch_one(pool)
        .await?;

    if let Some(id) = report.interaction_id.as_deref().and_then(numeric_interaction_id) {
        advance_interaction_sequence(pool, id).await?;
    }
    report_from_row(&row)
}

/// Full-field edit; the submitter and entry timestamp stay as recorded.
pub async fn update_report(pool: &PgPool, id: Uuid, report: &NewReport) -> sqlx::Result<Option<Report>> {
    let sql = format!(
        r#"
        UPDATE interaction_log.reports
        SET student_number = $2, interaction = $3, interaction_code = $3, infraction = $4,
            intervention = $5, notes = $6, intervention_notes = $7,
            interaction_timestamp = $8, status = $9
        WHERE id = $1
        RETURNING {REPORT_FIELDS}
        "#
    );

    let row = sqlx::query(&sql)
        .bind(id)
        .bind(&report.student_number)
        .bind(&report.interaction)
        .bind(&report.infraction)
        .bind(&report.intervention)
        .bind(&report.notes)
        .bind(&report.intervention_notes)
        .bind(report.interaction_timestamp)
        .bind(report.status.as_str())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(report_from_row).transpose()
}

pub async fn set_report_status(
    pool: &PgPool,
    id: Uuid,
    status: ReportStatus,
) -> sqlx::Result<Option<Report>> {
    let sql = format!(
        "UPDATE interaction_log.reports SET status = $2 WHERE id = $1 RETURNING {REPORT_FIELDS}"
    );
    let row = sqlx::query(&sql)
        .bind(id)
        .bind(status.as_str())
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(report_from_row).transpose()
}

pub async fn delete_report(pool: &PgPool, id: Uuid) -> sqlx::Result<bool> {
    let result = sqlx::query("DELETE FROM interaction_log.reports WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

#[async_trait]
impl ReportSink for PgPool {
    async fn insert_report(&self, report: &NewReport) -> anyhow::Result<()> {
        insert_report(self, report).await.map_err(|err| match err {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                anyhow::anyhow!("interactionID already exists")
            }
            other => anyhow::Error::new(other),
        })?;
        Ok(())
    }
}

fn student_from_row(row: &PgRow) -> sqlx::Result<Student> {
    Ok(Student {
        student_id: row.try_get("student_id")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        is_active: row.try_get("is_active")?,
    })
}

pub async fn fetch_students(pool: &PgPool, active: Option<bool>) -> sqlx::Result<Vec<Student>> {
    let mut query = QueryBuilder::<Postgres>::new(
        "SELECT student_id, first_name, last_name, is_active FROM interaction_log.students WHERE TRUE",
    );
    if let Some(active) = active {
        query.push(" AND is_active = ").push_bind(active);
    }
    query.push(" ORDER BY last_name, first_name, student_id");

    let rows = query.build().fetch_all(pool).await?;
    rows.iter().map(student_from_row).collect()
}

pub async fn fetch_student(pool: &PgPool, student_id: &str) -> sqlx::Result<Option<Student>> {
    let row = sqlx::query(
        "SELECT student_id, first_name, last_name, is_active \
         FROM interaction_log.students WHERE student_id = $1",
    )
    .bind(student_id)
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(student_from_row).transpose()
}

pub async fn insert_student(pool: &PgPool, student: &Student) -> sqlx::Result<Student> {
    let row = sqlx::query(
        r#"
        INSERT INTO interaction_log.students (id, student_id, first_name, last_name, is_active)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING student_id, first_name, last_name, is_active
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&student.student_id)
    .bind(&student.first_name)
    .bind(&student.last_name)
    .bind(student.is_active)
    .fetch_one(pool)
    .await?;
    student_from_row(&row)
}

pub async fn upsert_student(pool: &PgPool, student: &Student) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO interaction_log.students (id, student_id, first_name, last_name, is_active)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (student_id) DO UPDATE
        SET first_name = EXCLUDED.first_name, last_name = EXCLUDED.last_name,
            is_active = EXCLUDED.is_active
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&student.student_id)
    .bind(&student.first_name)
    .bind(&student.last_name)
    .bind(student.is_active)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn update_student(
    pool: &PgPool,
    student_id: &str,
    student: &Student,
) -> sqlx::Result<Option<Student>> {
    let row = sqlx::query(
        r#"
        UPDATE interaction_log.students
        SET first_name = $2, last_name = $3, is_active = $4
        WHERE student_id = $1
        RETURNING student_id, first_name, last_name, is_active
        "#,
    )
    .bind(student_id)
    .bind(&student.first_name)
    .bind(&student.last_name)
    .bind(student.is_active)
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(student_from_row).transpose()
}

pub async fn delete_student(pool: &PgPool, student_id: &str) -> sqlx::Result<bool> {
    let result = sqlx::query("DELETE FROM interaction_log.students WHERE student_id = $1")
        .bind(student_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

#[async_trait]
impl StudentSink for PgPool {
    async fn upsert_student(&self, student: &Student) -> anyhow::Result<()> {
        upsert_student(self, student).await?;
        Ok(())
    }
}

fn user_from_row(row: &PgRow) -> sqlx::Result<User> {
    Ok(User {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        is_admin: row.try_get("is_admin")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
    })
}

pub struct NewUser<'a> {
    pub email: &'a str,
    pub password_hash: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub is_admin: bool,
}

#[derive(Debug, Default)]
pub struct UserUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub is_admin: Option<bool>,
    pub is_active: Option<bool>,
    pub password_hash: Option<String>,
}

pub async fn fetch_users(pool: &PgPool) -> sqlx::Result<Vec<User>> {
    let sql = format!("SELECT {USER_FIELDS} FROM interaction_log.users ORDER BY email");
    let rows = sqlx::query(&sql).fetch_all(pool).await?;
    rows.iter().map(user_from_row).collect()
}

pub async fn fetch_user(pool: &PgPool, id: Uuid) -> sqlx::Result<Option<User>> {
    let sql = format!("SELECT {USER_FIELDS} FROM interaction_log.users WHERE id = $1");
    let row = sqlx::query(&sql).bind(id).fetch_optional(pool).await?;
    row.as_ref().map(user_from_row).transpose()
}

pub async fn fetch_user_by_email(pool: &PgPool, email: &str) -> sqlx::Result<Option<User>> {
    let sql = format!("SELECT {USER_FIELDS} FROM interaction_log.users WHERE email = $1");
    let row = sqlx::query(&sql)
        .bind(email.trim().to_ascii_lowercase())
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(user_from_row).transpose()
}

pub async fn insert_user(pool: &PgPool, user: &NewUser<'_>) -> sqlx::Result<User> {
    let sql = format!(
        r#"
        INSERT INTO interaction_log.users
        (id, email, password_hash, first_name, last_name, is_admin, is_active)
        VALUES ($1, $2, $3, $4, $5, $6, TRUE)
        RETURNING {USER_FIELDS}
        "#
    );
    let row = sqlx::query(&sql)
        .bind(Uuid::new_v4())
        .bind(user.email.trim().to_ascii_lowercase())
        .bind(user.password_hash)
        .bind(user.first_name)
        .bind(user.last_name)
        .bind(user.is_admin)
        .fetch_one(pool)
        .await?;
    user_from_row(&row)
}

pub async fn update_user(pool: &PgPool, id: Uuid, update: &UserUpdate) -> sqlx::Result<Option<User>> {
    let sql = format!(
        r#"
        UPDATE interaction_log.users
        SET first_name = COALESCE($2, first_name),
            last_name = COALESCE($3, last_name),
            is_admin = COALESCE($4, is_admin),
            is_active = COALESCE($5, is_active),
            password_hash = COALESCE($6, password_hash)
        WHERE id = $1
        RETURNING {USER_FIELDS}
        "#
    );
    let row = sqlx::query(&sql)
        .bind(id)
        .bind(update.first_name.as_deref())
        .bind(update.last_name.as_deref())
        .bind(update.is_admin)
        .bind(update.is_active)
        .bind(update.password_hash.as_deref())
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(user_from_row).transpose()
}

pub async fn delete_user(pool: &PgPool, id: Uuid) -> sqlx::Result<bool> {
    let result = sqlx::query("DELETE FROM interaction_log.users WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

fn catalog_from_row(row: &PgRow) -> sqlx::Result<CatalogEntry> {
    Ok(CatalogEntry {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        display_name: row.try_get("display_name")?,
        is_active: row.try_get("is_active")?,
        order: row.try_get("sort_order")?,
        created_by: row.try_get("created_by")?,
        updated_by: row.try_get("updated_by")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub async fn fetch_catalog(
    pool: &PgPool,
    kind: CatalogKind,
    include_inactive: bool,
) -> sqlx::Result<Vec<CatalogEntry>> {
    let filter = if include_inactive { "" } else { "WHERE is_active" };
    let sql = format!(
        "SELECT {CATALOG_FIELDS} FROM {} {filter} ORDER BY sort_order, name",
        kind.table()
    );
    let rows = sqlx::query(&sql).fetch_all(pool).await?;
    rows.iter().map(catalog_from_row).collect()
}

pub async fn catalog_has_active(pool: &PgPool, kind: CatalogKind, name: &str) -> sqlx::Result<bool> {
    let sql = format!(
        "SELECT EXISTS (SELECT 1 FROM {} WHERE name = $1 AND is_active)",
        kind.table()
    );
    let exists: bool = sqlx::query(&sql).bind(name).fetch_one(pool).await?.get(0);
    Ok(exists)
}

pub async fn insert_catalog_entry(
    pool: &PgPool,
    kind: CatalogKind,
    name: &str,
    display_name: &str,
    order: Option<i32>,
    actor: &str,
) -> sqlx::Result<CatalogEntry> {
    let table = kind.table();
    let sql = format!(
        r#"
        INSERT INTO {table} (id, name, display_name, is_active, sort_order, created_by, updated_by)
        VALUES ($1, $2, $3, TRUE,
                COALESCE($4, (SELECT COALESCE(MAX(sort_order), 0) + 1 FROM {table})), $5, $5)
        RETURNING {CATALOG_FIELDS}
        "#
    );
    let row = sqlx::query(&sql)
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(display_name)
        .bind(order)
        .bind(actor)
        .fetch_one(pool)
        .await?;
    catalog_from_row(&row)
}

pub async fn update_catalog_entry(
    pool: &PgPool,
    kind: CatalogKind,
    id: Uuid,
    display_name: Option<&str>,
    order: Option<i32>,
    is_active: Option<bool>,
    actor: &str,
) -> sqlx::Result<Option<CatalogEntry>> {
    let sql = format!(
        r#"
        UPDATE {}
        SET display_name = COALESCE($2, display_name),
            sort_order = COALESCE($3, sort_order),
            is_active = COALESCE($4, is_active),
            updated_by = $5,
            updated_at = now()
        WHERE id = $1
        RETURNING {CATALOG_FIELDS}
        "#,
        kind.table()
    );
    let row = sqlx::query(&sql)
        .bind(id)
        .bind(display_name)
        .bind(order)
        .bind(is_active)
        .bind(actor)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(catalog_from_row).transpose()
}

pub async fn deactivate_catalog_entry(
    pool: &PgPool,
    kind: CatalogKind,
    id: Uuid,
    actor: &str,
) -> sqlx::Result<Option<CatalogEntry>> {
    update_catalog_entry(pool, kind, id, None, None, Some(false), actor).await
}

pub async fn purge_catalog_entry(pool: &PgPool, kind: CatalogKind, id: Uuid) -> sqlx::Result<bool> {
    let sql = format!("DELETE FROM {} WHERE id = $1", kind.table());
    let result = sqlx::query(&sql).bind(id).execute(pool).await?;
    Ok(result.rows_affected() > 0)
}
