//! Column encodings shared by the table modules.

use crate::error::{DatabaseError, Result};
use chrono::{DateTime, NaiveDate, Utc};

pub(crate) fn now() -> String {
    Utc::now().to_rfc3339()
}

pub(crate) fn encode_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub(crate) fn decode_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|e| DatabaseError::Decode(format!("invalid date '{value}': {e}")))
}

pub(crate) fn decode_time(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::Decode(format!("invalid timestamp '{value}': {e}")))
}

pub(crate) fn decode_optional_time(value: Option<String>) -> Result<Option<DateTime<Utc>>> {
    value.as_deref().map(decode_time).transpose()
}

#[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
pub(crate) fn decode_count(value: i64) -> u32 {
    value.clamp(0, i64::from(u32::MAX)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_round_trip_format() {
        let date = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();
        assert_eq!(encode_date(date), "2026-01-05");
        assert_eq!(decode_date("2026-01-05").unwrap(), date);
        assert!(decode_date("01/05/2026").is_err());
    }

    #[test]
    fn test_count_clamps() {
        assert_eq!(decode_count(-3), 0);
        assert_eq!(decode_count(7), 7);
    }
}
