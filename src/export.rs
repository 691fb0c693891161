use crate::codes;
use crate::models::{Report, NONE};
use crate::timestamp::format_compact;

pub const EXPORT_COLUMNS: [&str; 10] = [
    "studentnumber",
    "entrytimestamp",
    "submitteremail",
    "interactioncode",
    "responses",
    "notes",
    "interactiontimestamp",
    "editurl",
    "entryidentifier",
    "interactionid",
];

/// Writes reports in the legacy column layout so the file can be imported again.
pub fn reports_to_csv(reports: &[Report]) -> anyhow::Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(EXPORT_COLUMNS)?;

    for report in reports {
        writer.write_record([
            report.student_number.clone(),
            format_compact(report.entry_timestamp),
            report.submitter_email.clone(),
            codes::code_for_interaction(&report.interaction),
            response_for(report),
            report.notes.clone(),
            format_compact(report.interaction_timestamp),
            report.edit_url.clone().unwrap_or_default(),
            report.id.to_string(),
            report.interaction_id.clone(),
        ])?;
    }

    Ok(writer.into_inner().map_err(|err| err.into_error())?)
}

fn response_for(report: &Report) -> String {
    if report.infraction != NONE {
        report.infraction.clone()
    } else if report.intervention != NONE {
        report.intervention.clone()
    } else {
        String::new()
    }
}
