//! Saved capture records.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MAX_MARK: u8 = 100;

/// One saved (student, mark) pair. Entries are immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    /// Creation time in epoch milliseconds, strictly increasing within a store.
    pub id: i64,
    pub student_id: String,
    pub mark: u8,
    /// Local creation time, formatted for display.
    pub timestamp: String,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Student ID missing")]
    MissingStudentId,
    #[error("Mark missing")]
    MissingMark,
    #[error("Invalid mark '{0}': expected a whole number between 0 and 100")]
    InvalidMark(String),
}

impl ValidationError {
    /// Name of the form field the error refers to.
    pub fn field(&self) -> &'static str {
        match self {
            ValidationError::MissingStudentId => "studentId",
            ValidationError::MissingMark | ValidationError::InvalidMark(_) => "mark",
        }
    }
}

pub fn validate_student_id(raw: &str) -> Result<&str, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::MissingStudentId);
    }
    Ok(trimmed)
}

/// Parse a mark typed by the operator or returned by the recognition service.
///
/// Only the leading integer is read, so `"87.5"` and `"87/100"` both give 87.
pub fn parse_mark(raw: &str) -> Result<u8, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::MissingMark);
    }

    let invalid = || ValidationError::InvalidMark(trimmed.to_string());

    let unsigned = trimmed.trim_start_matches(&['+', '-'][..]);
    let sign_len = trimmed.len() - unsigned.len();
    if sign_len > 1 {
        return Err(invalid());
    }
    let digits = unsigned
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(unsigned.len());
    if digits == 0 {
        return Err(invalid());
    }

    match trimmed[..sign_len + digits].parse::<i64>() {
        Ok(value) if (0..=i64::from(MAX_MARK)).contains(&value) => Ok(value as u8),
        _ => Err(invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_bounds_and_whitespace() {
        assert_eq!(parse_mark("0"), Ok(0));
        assert_eq!(parse_mark(" 100 "), Ok(100));
        assert_eq!(parse_mark("87"), Ok(87));
    }

    #[test]
    fn reads_leading_integer_only() {
        assert_eq!(parse_mark("87.5"), Ok(87));
        assert_eq!(parse_mark("87/100"), Ok(87));
        assert_eq!(parse_mark("87abc"), Ok(87));
        assert_eq!(parse_mark("8 7"), Ok(8));
        assert_eq!(parse_mark("+42"), Ok(42));
        assert_eq!(parse_mark("-0"), Ok(0));
    }

    #[test]
    fn rejects_out_of_range_and_garbage() {
        for raw in ["150", "-1", "101", "abc", ".5", "--5", "+-5", "99999999999999999999"] {
            assert!(
                matches!(parse_mark(raw), Err(ValidationError::InvalidMark(_))),
                "{raw} should be rejected"
            );
        }
        assert_eq!(parse_mark("   "), Err(ValidationError::MissingMark));
    }

    #[test]
    fn student_id_must_not_be_blank() {
        assert_eq!(validate_student_id("  "), Err(ValidationError::MissingStudentId));
        assert_eq!(validate_student_id(" S12345 "), Ok("S12345"));
        assert_eq!(ValidationError::MissingStudentId.field(), "studentId");
    }

    #[test]
    fn entry_uses_camel_case_fields() {
        let entry = Entry {
            id: 1,
            student_id: "S1".into(),
            mark: 50,
            timestamp: "2026-10-18 09:00:00".into(),
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["studentId"], "S1");
        assert_eq!(json["mark"], 50);
    }
}
