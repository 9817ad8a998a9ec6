//! Human-facing case numbers (`YY-ST-MM###`).
//!
//! The sequence part counts cases per intake year: the caller supplies how many
//! case numbers already exist with the year prefix, and the next number is
//! `count + 1`, zero-padded to three digits.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Two-letter, upper-cased US state code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StateCode(String);

impl StateCode {
    pub fn parse(raw: &str) -> DomainResult<Self> {
        let trimmed = raw.trim();
        if trimmed.len() != 2 || !trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(DomainError::validation(
                "state_code must be a two-letter alphabetic code, e.g. 'CA'",
            ));
        }
        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for StateCode {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<StateCode> for String {
    fn from(value: StateCode) -> Self {
        value.0
    }
}

/// A generated case number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CaseNumber(String);

impl CaseNumber {
    /// Prefix shared by every case number issued in the year of `when` (`"YY-"`).
    pub fn year_prefix(when: NaiveDate) -> String {
        format!("{}-", when.format("%y"))
    }

    /// Build the next case number given how many exist for the year already.
    pub fn next(state: &StateCode, when: NaiveDate, existing_for_year: i64) -> Self {
        let seq = existing_for_year.max(0) + 1;
        Self(format!(
            "{}-{}-{}{:03}",
            when.format("%y"),
            state.as_str(),
            when.format("%m"),
            seq
        ))
    }

    pub fn from_stored(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for CaseNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn state_code_is_normalized() {
        assert_eq!(StateCode::parse(" ca ").unwrap().as_str(), "CA");
    }

    #[test]
    fn state_code_rejects_bad_input() {
        assert!(StateCode::parse("C").is_err());
        assert!(StateCode::parse("CAL").is_err());
        assert!(StateCode::parse("C1").is_err());
        assert!(StateCode::parse("").is_err());
    }

    #[test]
    fn first_case_of_year() {
        let st = StateCode::parse("tx").unwrap();
        let n = CaseNumber::next(&st, date(2025, 3, 14), 0);
        assert_eq!(n.as_str(), "25-TX-03001");
    }

    #[test]
    fn sequence_grows_past_three_digits() {
        let st = StateCode::parse("CA").unwrap();
        let n = CaseNumber::next(&st, date(2024, 11, 2), 1000);
        assert_eq!(n.as_str(), "24-CA-111001");
    }

    #[test]
    fn year_prefix_matches_generated_numbers() {
        let when = date(2026, 1, 5);
        let st = StateCode::parse("OK").unwrap();
        let n = CaseNumber::next(&st, when, 7);
        assert!(n.as_str().starts_with(&CaseNumber::year_prefix(when)));
    }
}
