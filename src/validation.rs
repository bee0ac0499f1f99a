//! Request validation
//!
//! Controllers describe their inputs as a [`RuleSet`] over the flat query
//! map and get back the first [`Violation`]. Clients never see the violation
//! itself; each endpoint maps it to its own fixed message.

use anyhow::{anyhow, Result};
use chrono::{NaiveDate, NaiveTime};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;

/// Maximum title length for threads and groups (characters)
pub const MAX_TITLE_LENGTH: usize = 80;

/// Birthday wire format (month/day/year)
pub const BIRTHDAY_FORMAT: &str = "%m/%d/%Y";

lazy_static! {
    pub static ref USERNAME_PATTERN: Regex = Regex::new(r"^[a-zA-Z0-9_]{1,12}$").unwrap();
    pub static ref PASSWORD_PATTERN: Regex = Regex::new(r"^[0-9A-Za-z!@#$%_]{5,15}$").unwrap();
    pub static ref ID_PATTERN: Regex = Regex::new(r"^[0-9a-fA-F]{32}$").unwrap();
    static ref EMAIL_PATTERN: Regex =
        Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}$").unwrap();
}

/// Query parameters as received
pub type Params = HashMap<String, String>;

/// A single constraint on a field
#[derive(Debug, Clone, Copy)]
pub enum Rule {
    /// Present and not blank
    Required,
    /// At most this many characters
    MaxLength(usize),
    /// Whole value matches the pattern
    Pattern(&'static Regex),
    /// Absolute http(s) URL
    Url,
    Email,
}

/// First failed rule of a validation pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub field: String,
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for Violation {}

/// Ordered field rules; fields are checked in insertion order
#[derive(Debug, Default, Clone)]
pub struct RuleSet {
    fields: Vec<(&'static str, Vec<Rule>)>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: &'static str, rules: &[Rule]) -> Self {
        self.fields.push((name, rules.to_vec()));
        self
    }

    /// Check every field; absent optional fields are skipped
    pub fn validate(&self, data: &Params) -> std::result::Result<(), Violation> {
        for (name, rules) in &self.fields {
            match data.get(*name) {
                Some(value) => check(name, value, rules)?,
                None if rules.iter().any(|r| matches!(r, Rule::Required)) => {
                    return Err(violation(name, "is required"));
                }
                None => {}
            }
        }
        Ok(())
    }
}

/// Check one value against a list of rules
pub fn check(field: &str, value: &str, rules: &[Rule]) -> std::result::Result<(), Violation> {
    for rule in rules {
        match rule {
            Rule::Required if value.trim().is_empty() => {
                return Err(violation(field, "is required"));
            }
            Rule::MaxLength(max) if value.chars().count() > *max => {
                return Err(violation(field, &format!("must be at most {max} characters")));
            }
            Rule::Pattern(pattern) if !pattern.is_match(value) => {
                return Err(violation(field, "has an invalid format"));
            }
            Rule::Url if !is_valid_url(value) => {
                return Err(violation(field, "is not a valid URL"));
            }
            Rule::Email if !is_valid_email(value) => {
                return Err(violation(field, "is not a valid email address"));
            }
            _ => {}
        }
    }
    Ok(())
}

fn violation(field: &str, message: &str) -> Violation {
    Violation {
        field: field.to_string(),
        message: message.to_string(),
    }
}

pub fn is_valid_url(value: &str) -> bool {
    match url::Url::parse(value) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && url.host().is_some(),
        Err(_) => false,
    }
}

pub fn is_valid_email(value: &str) -> bool {
    value.len() <= 254 && EMAIL_PATTERN.is_match(value)
}

/// Parse a `m/d/Y` birthday into unix seconds at midnight UTC
pub fn parse_birthday(value: &str) -> Result<i64> {
    let date = NaiveDate::parse_from_str(value.trim(), BIRTHDAY_FORMAT)
        .map_err(|e| anyhow!("birthday {value:?} is not m/d/Y: {e}"))?;
    if date > chrono::Utc::now().date_naive() {
        return Err(anyhow!("birthday {value:?} is in the future"));
    }
    Ok(date.and_time(NaiveTime::MIN).and_utc().timestamp())
}
