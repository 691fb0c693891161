use std::collections::HashMap;
use std::fmt::Write;

use anyhow::Context;
use futures::StreamExt;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::config::SummaryConfig;
use crate::models::{InteractionSummary, Report, ReportStatus, NONE};

pub fn summarize_by_interaction(reports: &[Report]) -> Vec<InteractionSummary> {
    let mut map: HashMap<String, (usize, usize)> = HashMap::new();

    for report in reports {
        let entry = map.entry(report.interaction.clone()).or_insert((0, 0));
        entry.0 += 1;
        if report.status == ReportStatus::Unresolved {
            entry.1 += 1;
        }
    }

    let mut summaries: Vec<InteractionSummary> = map
        .into_iter()
        .map(|(interaction, (count, unresolved))| InteractionSummary {
            interaction,
            count,
            unresolved,
        })
        .collect();

    summaries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.interaction.cmp(&b.interaction)));
    summaries
}

fn count_infractions(reports: &[Report]) -> Vec<(String, usize)> {
    let mut map: HashMap<&str, usize> = HashMap::new();
    for report in reports.iter().filter(|r| r.infraction != NONE) {
        *map.entry(report.infraction.as_str()).or_insert(0) += 1;
    }
    let mut counts: Vec<(String, usize)> = map
        .into_iter()
        .map(|(name, count)| (name.to_string(), count))
        .collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    counts
}

/// Plain-text prompt describing the selected reports.
pub fn build_prompt(scope: Option<&str>, since_days: Option<i64>, reports: &[Report]) -> String {
    let summaries = summarize_by_interaction(reports);
    let infractions = count_infractions(reports);
    let unresolved = reports
        .iter()
        .filter(|r| r.status == ReportStatus::Unresolved)
        .count();

    let mut output = String::new();
    let scope_label = scope.unwrap_or("all students");

    let _ = writeln!(
        output,
        "Summarize the following student interaction reports for school staff. \
         Highlight patterns, students who may need support, and open items."
    );
    match since_days {
        Some(days) => {
            let _ = writeln!(output, "Scope: {scope_label}, last {days} days.");
        }
        None => {
            let _ = writeln!(output, "Scope: {scope_label}.");
        }
    }
    let _ = writeln!(output, "Total reports: {} ({} unresolved).", reports.len(), unresolved);
    let _ = writeln!(output);
    let _ = writeln!(output, "Interactions:");

    if summaries.is_empty() {
        let _ = writeln!(output, "- none recorded");
    } else {
        for summary in summaries.iter() {
            let _ = writeln!(
                output,
                "- {}: {} reports ({} unresolved)",
                summary.interaction, summary.count, summary.unresolved
            );
        }
    }

    if !infractions.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "Infractions:");
        for (name, count) in infractions.iter() {
            let _ = writeln!(output, "- {name}: {count}");
        }
    }

    let mut recent = reports.to_vec();
    recent.sort_by(|a, b| b.interaction_timestamp.cmp(&a.interaction_timestamp));
    let _ = writeln!(output);
    let _ = writeln!(output, "Recent notes:");

    let with_notes: Vec<&Report> = recent.iter().filter(|r| !r.notes.trim().is_empty()).take(20).collect();
    if with_notes.is_empty() {
        let _ = writeln!(output, "- no notes recorded");
    } else {
        for report in with_notes {
            let _ = writeln!(
                output,
                "- student {} ({}) on {}: {}",
                report.student_number,
                report.interaction,
                report.interaction_timestamp.date_naive(),
                report.notes.trim()
            );
        }
    }

    output
}

/// Accumulates the text carried by a server-sent-event stream.
///
/// `data:` lines are buffered per event and joined with `\n`; a blank line
/// ends the event.
#[derive(Debug, Default)]
pub struct SseText {
    pending: Vec<u8>,
    data: Vec<String>,
    text: String,
    done: bool,
}

impl SseText {
    /// Consumes a chunk; returns true once the stream has signalled completion.
    pub fn feed(&mut self, chunk: &[u8]) -> bool {
        self.pending.extend_from_slice(chunk);
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            self.handle_line(line.trim_end_matches(['\r', '\n']));
            if self.done {
                return true;
            }
        }
        false
    }

    pub fn finish(mut self) -> String {
        if !self.done && !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            let line = String::from_utf8_lossy(&rest);
            self.handle_line(line.trim_end_matches(['\r', '\n']));
        }
        if !self.done {
            self.dispatch();
        }
        self.text
    }

    fn handle_line(&mut self, line: &str) {
        if line.is_empty() {
            self.dispatch();
            return;
        }
        if let Some(data) = line.strip_prefix("data:") {
            let data = data.strip_prefix(' ').unwrap_or(data);
            self.data.push(data.to_string());
        }
    }

    fn dispatch(&mut self) {
        if self.data.is_empty() {
            return;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        if data.trim() == "[DONE]" {
            self.done = true;
            return;
        }
        self.text.push_str(&payload_text(&data));
    }
}

fn payload_text(data: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(data) else {
        return data.to_string();
    };

    let candidates = [
        value.pointer("/choices/0/delta/content"),
        value.pointer("/delta/text"),
        value.get("text"),
        value.get("content"),
    ];
    let text = candidates
        .into_iter()
        .flatten()
        .find_map(Value::as_str)
        .unwrap_or_default()
        .to_string();
    text
}

#[derive(Debug, Clone)]
pub struct SummaryClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
}

impl SummaryClient {
    pub fn from_config(config: &SummaryConfig) -> Option<Self> {
        let endpoint = config.endpoint.clone().filter(|e| !e.trim().is_empty())?;
        Some(Self {
            http: reqwest::Client::new(),
            endpoint,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }

    pub async fn summarize(&self, prompt: &str) -> anyhow::Result<String> {
        let mut request = self.http.post(&self.endpoint).json(&json!({
            "model": self.model,
            "stream": true,
            "messages": [{ "role": "user", "content": prompt }],
        }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .context("summary request failed")?
            .error_for_status()
            .context("summary endpoint returned an error")?;

        let mut stream = response.bytes_stream();
        let mut text = SseText::default();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.context("summary stream interrupted")?;
            if text.feed(&chunk) {
                debug!("summary stream finished");
                break;
            }
        }

        let summary = text.finish();
        info!(chars = summary.len(), "summary received");
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use uuid::Uuid;

    fn report(interaction: &str, infraction: &str, status: ReportStatus, notes: &str, hours_ago: i64) -> Report {
        let at = Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap() - Duration::hours(hours_ago);
        Report {
            id: Uuid::new_v4(),
            interaction_id: Uuid::new_v4().to_string(),
            student_number: "123456".to_string(),
            entry_timestamp: at,
            submitter_email: "teacher@school.org".to_string(),
            interaction: interaction.to_string(),
            interaction_code: interaction.to_string(),
            infraction: infraction.to_string(),
            intervention: NONE.to_string(),
            notes: notes.to_string(),
            intervention_notes: String::new(),
            interaction_timestamp: at,
            edit_url: None,
            status,
            created_at: at,
        }
    }

    #[test]
    fn groups_reports_by_interaction() {
        let reports = vec![
            report("SHOUT_OUT", NONE, ReportStatus::Resolved, "", 1),
            report("INFRACTION", "TARDY", ReportStatus::Unresolved, "", 2),
            report("INFRACTION", "TARDY", ReportStatus::Resolved, "", 3),
        ];
        let summaries = summarize_by_interaction(&reports);
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].interaction, "INFRACTION");
        assert_eq!(summaries[0].count, 2);
        assert_eq!(summaries[0].unresolved, 1);
        assert_eq!(summaries[1].interaction, "SHOUT_OUT");
    }

    #[test]
    fn prompt_lists_counts_and_recent_notes() {
        let reports = vec![
            report("SHOUT_OUT", NONE, ReportStatus::Resolved, "Helped a classmate", 5),
            report("INFRACTION", "CELL_PHONE", ReportStatus::Unresolved, "Phone out in math", 1),
        ];
        let prompt = build_prompt(Some("student 123456"), Some(7), &reports);
        assert!(prompt.contains("Scope: student 123456, last 7 days."));
        assert!(prompt.contains("Total reports: 2 (1 unresolved)."));
        assert!(prompt.contains("- CELL_PHONE: 1"));
        let phone = prompt.find("Phone out in math").unwrap();
        let helped = prompt.find("Helped a classmate").unwrap();
        assert!(phone < helped);
    }

    #[test]
    fn empty_prompt_says_so() {
        let prompt = build_prompt(None, None, &[]);
        assert!(prompt.contains("Scope: all students."));
        assert!(prompt.contains("- none recorded"));
        assert!(prompt.contains("- no notes recorded"));
    }

    #[test]
    fn concatenates_stream_deltas() {
        let mut text = SseText::default();
        assert!(!text.feed(b"event: message\ndata: {\"choices\":[{\"delta\":{\"content\":\"Two \"}}]}\n\n"));
        assert!(!text.feed(b"data: {\"delta\":{\"text\":\"students need\"}}\n\n"));
        assert!(!text.feed(b"data: {\"text\":\" follow"));
        assert!(!text.feed(b"-up.\"}\n\n"));
        assert!(text.feed(b"data: [DONE]\n\n"));
        assert_eq!(text.finish(), "Two students need follow-up.");
    }

    #[test]
    fn raw_payloads_are_kept_and_metadata_ignored() {
        let mut text = SseText::default();
        text.feed(b"data: {\"type\":\"ping\"}\r\n\r\n");
        text.feed(b": comment\n\n");
        text.feed(b"data: plain words");
        assert_eq!(text.finish(), "plain words");
    }

    #[test]
    fn multi_line_events_keep_their_line_breaks() {
        let mut text = SseText::default();
        assert!(!text.feed(b"data: First line\ndata: second line\n\n"));
        assert!(!text.feed(b"data: {\"text\":\"\\nDone.\"}\n\n"));
        assert_eq!(text.finish(), "First line\nsecond line\nDone.");
    }

    #[test]
    fn json_split_across_data_lines_is_rejoined() {
        let mut text = SseText::default();
        text.feed(b"data: {\"content\":\ndata: \"Check in with 104233.\"}\n\n");
        assert!(text.feed(b"data: [DONE]\n\n"));
        assert_eq!(text.finish(), "Check in with 104233.");
    }

    #[test]
    fn client_requires_an_endpoint() {
        assert!(SummaryClient::from_config(&SummaryConfig::default()).is_none());
        let config = SummaryConfig {
            endpoint: Some("http://localhost:9/v1/chat".to_string()),
            api_key: None,
            model: "test".to_string(),
        };
        assert!(SummaryClient::from_config(&config).is_some());
    }
}
