use anyhow::{bail, Context};
use chrono::{DateTime, NaiveDateTime, Utc};

const COMPACT_FORMAT: &str = "%Y%m%d%H%M%S";

/// Parses the 14-digit `YYYYMMDDHHMMSS` form used by legacy exports, read as UTC.
pub fn parse_compact(value: &str) -> anyhow::Result<DateTime<Utc>> {
    if value.len() != 14 || !value.bytes().all(|b| b.is_ascii_digit()) {
        bail!("invalid timestamp '{value}': expected 14 digits YYYYMMDDHHMMSS");
    }
    let naive = NaiveDateTime::parse_from_str(value, COMPACT_FORMAT)
        .with_context(|| format!("invalid timestamp '{value}'"))?;
    Ok(naive.and_utc())
}

pub fn format_compact(at: DateTime<Utc>) -> String {
    at.format(COMPACT_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_compact_timestamps() {
        let parsed = parse_compact("20240115083000").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 1, 15, 8, 30, 0).unwrap());
    }

    #[test]
    fn formats_back_to_fourteen_digits() {
        let at = Utc.with_ymd_and_hms(2023, 11, 2, 14, 5, 9).unwrap();
        assert_eq!(format_compact(at), "20231102140509");
        assert_eq!(parse_compact(&format_compact(at)).unwrap(), at);
    }

    #[test]
    fn rejects_wrong_length_or_characters() {
        assert!(parse_compact("2024011508300").is_err());
        assert!(parse_compact("202401150830000").is_err());
        assert!(parse_compact("2024-01-15 08:3").is_err());
        assert!(parse_compact("").is_err());
    }

    #[test]
    fn rejects_impossible_dates() {
        assert!(parse_compact("20230230120000").is_err());
        assert!(parse_compact("20231301120000").is_err());
        assert!(parse_compact("20230101250000").is_err());
    }
}
