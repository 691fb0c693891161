//! Bulk CSV import of legacy reports and student rosters.
//!
//! Rows are handled one at a time: a bad row is recorded in the summary and the
//! rest of the batch carries on. Only a missing column or an unreadable header
//! rejects the whole file.

use anyhow::{bail, Context};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use csv::{ReaderBuilder, StringRecord, Trim};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::codes;
use crate::models::{is_valid_student_number, ImportSummary, NewReport, ReportStatus, Student};
use crate::timestamp::parse_compact;

pub const REPORT_COLUMNS: [&str; 9] = [
    "studentnumber",
    "entrytimestamp",
    "submitteremail",
    "interactioncode",
    "responses",
    "notes",
    "interactiontimestamp",
    "entryidentifier",
    "interactionid",
];

pub const STUDENT_COLUMNS: [&str; 3] = ["studentid", "firstname", "lastname"];

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),
    #[error("unreadable CSV: {0}")]
    Csv(#[from] csv::Error),
}

/// Destination for imported reports. Each call is committed on its own.
#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn insert_report(&self, report: &NewReport) -> anyhow::Result<()>;
}

#[async_trait]
pub trait StudentSink: Send + Sync {
    async fn upsert_student(&self, student: &Student) -> anyhow::Result<()>;
}

#[derive(Debug, Deserialize)]
struct LegacyRow {
    studentnumber: String,
    entrytimestamp: String,
    submitteremail: String,
    interactioncode: String,
    responses: String,
    notes: String,
    interactiontimestamp: String,
    interactionid: Option<String>,
    editurl: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StudentRow {
    studentid: String,
    firstname: String,
    lastname: String,
    isactive: Option<String>,
}

type Rows = Vec<Result<StringRecord, csv::Error>>;

fn read_table(bytes: &[u8], required: &[&str]) -> Result<(StringRecord, Rows), ImportError> {
    let mut reader = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .from_reader(bytes);

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').trim().to_ascii_lowercase())
        .collect();
    let headers = StringRecord::from(headers);

    let missing: Vec<String> = required
        .iter()
        .filter(|column| !headers.iter().any(|h| h == **column))
        .map(|column| column.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(ImportError::MissingColumns(missing));
    }

    Ok((headers, reader.records().collect()))
}

fn column_value<'a>(headers: &StringRecord, record: &'a StringRecord, column: &str) -> Option<&'a str> {
    headers
        .iter()
        .position(|h| h == column)
        .and_then(|index| record.get(index))
        .filter(|value| !value.is_empty())
}

pub async fn import_reports<S>(sink: &S, bytes: &[u8]) -> Result<ImportSummary, ImportError>
where
    S: ReportSink + ?Sized,
{
    let (headers, rows) = read_table(bytes, &REPORT_COLUMNS)?;
    let mut summary = ImportSummary::default();

    for (index, row) in rows.into_iter().enumerate() {
        summary.total += 1;
        let row_number = index + 1;
        let record = match row {
            Ok(record) => record,
            Err(err) => {
                summary.errors.push(format!("Row {row_number}: {err}"));
                continue;
            }
        };
        let student = column_value(&headers, &record, "studentnumber")
            .unwrap_or("unknown")
            .to_string();

        let outcome = match normalize_row(&headers, &record, Utc::now()) {
            Ok(report) => sink.insert_report(&report).await,
            Err(err) => Err(err),
        };

        match outcome {
            Ok(()) => summary.imported += 1,
            Err(err) => {
                warn!(row = row_number, student = %student, "report row rejected: {err:#}");
                summary
                    .errors
                    .push(format!("Row {row_number} (student {student}): {err:#}"));
            }
        }
    }

    info!(
        total = summary.total,
        imported = summary.imported,
        failed = summary.errors.len(),
        "report import finished"
    );
    Ok(summary)
}

/// Converts one legacy row into a report, translating codes and timestamps.
fn normalize_row(headers: &StringRecord, record: &StringRecord, now: DateTime<Utc>) -> anyhow::Result<NewReport> {
    let row: LegacyRow = record.deserialize(Some(headers)).context("malformed row")?;
    if !is_valid_student_number(&row.studentnumber) {
        bail!("studentnumber must be 6 digits, got {:?}", row.studentnumber);
    }

    let entry_timestamp = parse_compact(&row.entrytimestamp).context("entrytimestamp")?;
    let interaction_timestamp =
        parse_compact(&row.interactiontimestamp).context("interactiontimestamp")?;

    let interaction = codes::interaction_for_code(&row.interactioncode);
    let (infraction, intervention) = codes::derive_outcome(&row.interactioncode, &row.responses);

    let interaction_id = row
        .interactionid
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| generated_interaction_id(&row.studentnumber, now));

    Ok(NewReport {
        interaction_id: Some(interaction_id),
        student_number: row.studentnumber,
        entry_timestamp,
        submitter_email: row.submitteremail,
        interaction,
        infraction,
        intervention,
        notes: row.notes,
        intervention_notes: String::new(),
        interaction_timestamp,
        edit_url: row.editurl.filter(|url| !url.is_empty()),
        status: ReportStatus::Unresolved,
    })
}

fn generated_interaction_id(student_number: &str, now: DateTime<Utc>) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(char::from)
        .collect();
    format!("{student_number}-{}-{suffix}", now.timestamp_millis())
}

pub async fn import_students<S>(sink: &S, bytes: &[u8]) -> Result<ImportSummary, ImportError>
where
    S: StudentSink + ?Sized,
{
    let (headers, rows) = read_table(bytes, &STUDENT_COLUMNS)?;
    let mut summary = ImportSummary::default();

    for (index, row) in rows.into_iter().enumerate() {
        summary.total += 1;
        let row_number = index + 1;
        let record = match row {
            Ok(record) => record,
            Err(err) => {
                summary.errors.push(format!("Row {row_number}: {err}"));
                continue;
            }
        };
        let student = column_value(&headers, &record, "studentid")
            .unwrap_or("unknown")
            .to_string();

        let outcome = match student_from_row(&headers, &record) {
            Ok(parsed) => sink.upsert_student(&parsed).await,
            Err(err) => Err(err),
        };

        match outcome {
            Ok(()) => summary.imported += 1,
            Err(err) => {
                warn!(row = row_number, student = %student, "student row rejected: {err:#}");
                summary
                    .errors
                    .push(format!("Row {row_number} (student {student}): {err:#}"));
            }
        }
    }

    info!(total = summary.total, imported = summary.imported, "student import finished");
    Ok(summary)
}

fn student_from_row(headers: &StringRecord, record: &StringRecord) -> anyhow::Result<Student> {
    let row: StudentRow = record.deserialize(Some(headers)).context("malformed row")?;
    if !is_valid_student_number(&row.studentid) {
        bail!("student id '{}' must be 6 digits", row.studentid);
    }
    if row.firstname.is_empty() || row.lastname.is_empty() {
        bail!("first and last name are required");
    }
    let is_active = match row.isactive.as_deref().map(str::to_ascii_lowercase).as_deref() {
        None | Some("") | Some("true") | Some("yes") | Some("y") | Some("1") => true,
        Some("false") | Some("no") | Some("n") | Some("0") => false,
        Some(other) => bail!("isactive value '{other}' is not a boolean"),
    };
    Ok(Student {
        student_id: row.studentid,
        first_name: row.firstname,
        last_name: row.lastname,
        is_active,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::NONE;
    use chrono::TimeZone;
    use std::sync::Mutex;

    const HEADER: &str = "studentnumber,entrytimestamp,submitteremail,interactioncode,responses,notes,interactiontimestamp,entryidentifier,interactionid";

    #[derive(Default)]
    pub(crate) struct MemorySink {
        pub reports: Mutex<Vec<NewReport>>,
        pub students: Mutex<Vec<Student>>,
    }

    #[async_trait]
    impl ReportSink for MemorySink {
        async fn insert_report(&self, report: &NewReport) -> anyhow::Result<()> {
            let mut reports = self.reports.lock().unwrap();
            if reports.iter().any(|r| r.interaction_id == report.interaction_id) {
                bail!("duplicate interactionID");
            }
            reports.push(report.clone());
            Ok(())
        }
    }

    #[async_trait]
    impl StudentSink for MemorySink {
        async fn upsert_student(&self, student: &Student) -> anyhow::Result<()> {
            let mut students = self.students.lock().unwrap();
            students.retain(|s| s.student_id != student.student_id);
            students.push(student.clone());
            Ok(())
        }
    }

    fn csv_with(rows: &[&str]) -> String {
        let mut body = String::from(HEADER);
        for row in rows {
            body.push('\n');
            body.push_str(row);
        }
        body
    }

    #[tokio::test]
    async fn reports_missing_columns_exactly() {
        let sink = MemorySink::default();
        let body = "studentnumber,entrytimestamp,submitteremail,interactioncode,notes,interactiontimestamp\n";
        let err = import_reports(&sink, body.as_bytes()).await.unwrap_err();
        match err {
            ImportError::MissingColumns(missing) => {
                assert_eq!(missing, vec!["responses", "entryidentifier", "interactionid"]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(sink.reports.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn imports_infraction_from_teacher_strategy() {
        let sink = MemorySink::default();
        let body = csv_with(&[
            "123456,20240115083000,teacher@school.org,I,Teacher Strategy (describe in notes),Talking during test,20240115081500,e-1,1001",
        ]);
        let summary = import_reports(&sink, body.as_bytes()).await.unwrap();
        assert_eq!(summary.total, 1);
        assert_eq!(summary.imported, 1);
        assert!(summary.errors.is_empty());

        let reports = sink.reports.lock().unwrap();
        let report = &reports[0];
        assert_eq!(report.interaction, "INFRACTION");
        assert_eq!(report.infraction, "FAILURE_TO_MEET_EXPECTATIONS");
        assert_eq!(report.intervention, "VERBAL_WARNING");
        assert_eq!(report.interaction_id.as_deref(), Some("1001"));
        assert_eq!(report.status, ReportStatus::Unresolved);
        assert_eq!(
            report.interaction_timestamp,
            Utc.with_ymd_and_hms(2024, 1, 15, 8, 15, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn non_infraction_rows_clear_outcomes() {
        let sink = MemorySink::default();
        let body = csv_with(&[
            "123456,20240115083000,teacher@school.org,S,TARDY,Great effort,20240115081500,e-1,2001",
            "654321,20240115083000,teacher@school.org,C,Teacher Strategy (describe in notes),,20240115081500,e-2,2002",
        ]);
        let summary = import_reports(&sink, body.as_bytes()).await.unwrap();
        assert_eq!(summary.imported, 2);

        let reports = sink.reports.lock().unwrap();
        assert_eq!(reports[0].interaction, "SHOUT_OUT");
        assert_eq!(reports[1].interaction, "CHECK_IN");
        for report in reports.iter() {
            assert_eq!(report.infraction, NONE);
            assert_eq!(report.intervention, NONE);
        }
    }

    #[tokio::test]
    async fn bad_timestamp_only_skips_its_row() {
        let sink = MemorySink::default();
        let body = csv_with(&[
            "111111,2024011508,teacher@school.org,S,,,20240115081500,e-1,3001",
            "222222,20240115083000,teacher@school.org,S,,,20240115081500,e-2,3002",
        ]);
        let summary = import_reports(&sink, body.as_bytes()).await.unwrap();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.imported, 1);
        assert_eq!(summary.errors.len(), 1);
        assert!(summary.errors[0].contains("111111"));
        assert!(summary.errors[0].contains("entrytimestamp"));

        let reports = sink.reports.lock().unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].student_number, "222222");
    }

    #[tokio::test]
    async fn student_numbers_must_be_six_digits() {
        let sink = MemorySink::default();
        let body = csv_with(&[
            "12,20240115083000,teacher@school.org,S,,,20240115081500,e-1,3101",
            ",20240115083000,teacher@school.org,S,,,20240115081500,e-2,3102",
            "333333,20240115083000,teacher@school.org,S,,,20240115081500,e-3,3103",
        ]);
        let summary = import_reports(&sink, body.as_bytes()).await.unwrap();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.imported, 1);
        assert_eq!(summary.errors.len(), 2);
        assert!(summary.errors[0].starts_with("Row 1 (student 12)"));
        assert!(summary.errors[0].contains("6 digits"));
        assert!(summary.errors[1].starts_with("Row 2"));

        let reports = sink.reports.lock().unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].student_number, "333333");
    }

    #[tokio::test]
    async fn unmapped_codes_are_kept_verbatim() {
        let sink = MemorySink::default();
        let body = csv_with(&["123456,20240115083000,teacher@school.org,XYZ,,,20240115081500,e-1,4001"]);
        import_reports(&sink, body.as_bytes()).await.unwrap();
        assert_eq!(sink.reports.lock().unwrap()[0].interaction, "XYZ");
    }

    #[tokio::test]
    async fn blank_interaction_id_is_generated() {
        let sink = MemorySink::default();
        let body = csv_with(&[
            "123456,20240115083000,teacher@school.org,S,,,20240115081500,e-1,",
            "123456,20240115083000,teacher@school.org,S,,,20240115081500,e-2,",
        ]);
        let summary = import_reports(&sink, body.as_bytes()).await.unwrap();
        assert_eq!(summary.imported, 2);

        let reports = sink.reports.lock().unwrap();
        let first = reports[0].interaction_id.clone().unwrap();
        let second = reports[1].interaction_id.clone().unwrap();
        assert!(first.starts_with("123456-"));
        assert_eq!(first.rsplit('-').next().unwrap().len(), 6);
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn sink_failures_are_collected() {
        let sink = MemorySink::default();
        let body = csv_with(&[
            "123456,20240115083000,teacher@school.org,S,,,20240115081500,e-1,5001",
            "654321,20240115083000,teacher@school.org,S,,,20240115081500,e-2,5001",
            "777777,20240115083000,teacher@school.org,S,,,20240115081500,e-3,5002",
        ]);
        let summary = import_reports(&sink, body.as_bytes()).await.unwrap();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.imported, 2);
        assert_eq!(summary.errors.len(), 1);
        assert!(summary.errors[0].starts_with("Row 2 (student 654321)"));
        assert!(summary.errors[0].contains("duplicate interactionID"));
    }

    #[tokio::test]
    async fn headers_match_case_insensitively() {
        let sink = MemorySink::default();
        let body = "StudentNumber, EntryTimestamp,SubmitterEmail,InteractionCode,Responses,Notes,InteractionTimestamp,EntryIdentifier,InteractionID,EditUrl\n\
                    123456,20240115083000,teacher@school.org,P,,,20240115081500,e-1,6001,https://forms.example/edit/1\n";
        let summary = import_reports(&sink, body.as_bytes()).await.unwrap();
        assert_eq!(summary.imported, 1);
        let reports = sink.reports.lock().unwrap();
        assert_eq!(reports[0].interaction, "PARENT_CONTACT");
        assert_eq!(reports[0].edit_url.as_deref(), Some("https://forms.example/edit/1"));
    }

    #[tokio::test]
    async fn short_rows_become_row_errors() {
        let sink = MemorySink::default();
        let body = csv_with(&["123456,20240115083000", "222222,20240115083000,teacher@school.org,S,,,20240115081500,e-2,7002"]);
        let summary = import_reports(&sink, body.as_bytes()).await.unwrap();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.imported, 1);
        assert!(summary.errors[0].contains("123456"));
    }

    #[tokio::test]
    async fn imports_students_and_reports_bad_ids() {
        let sink = MemorySink::default();
        let body = "studentid,firstname,lastname,isactive\n\
                    123456,Avery,Lee,\n\
                    12345,Jules,Moreno,true\n\
                    654321,Kiara,Patel,no\n";
        let summary = import_students(&sink, body.as_bytes()).await.unwrap();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.imported, 2);
        assert_eq!(summary.errors.len(), 1);
        assert!(summary.errors[0].contains("12345"));

        let students = sink.students.lock().unwrap();
        assert!(students[0].is_active);
        assert!(!students[1].is_active);
    }

    #[tokio::test]
    async fn student_import_requires_columns() {
        let sink = MemorySink::default();
        let err = import_students(&sink, b"studentid,firstname\n123456,Avery\n")
            .await
            .unwrap_err();
        assert!(matches!(err, ImportError::MissingColumns(ref missing) if missing == &vec!["lastname".to_string()]));
    }
}
