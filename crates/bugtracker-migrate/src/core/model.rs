//! Typed views of the two bug tracker tables.
//!
//! The migration itself copies [`Record`]s column by column so that stored text
//! survives verbatim; these types are for callers that want to reason about a
//! row (diagnostics, tests, the application layer).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::record::Record;
use super::value::SqlValue;
use crate::error::{MigrateError, Result};

/// Table holding user accounts.
pub const USERS_TABLE: &str = "users";

/// Table holding bug reports.
pub const BUGS_TABLE: &str = "bugs";

/// An application user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub is_admin: bool,
}

impl User {
    /// Build a user from a fetched row.
    pub fn from_record(record: &Record) -> Result<Self> {
        Ok(Self {
            id: required_i64(record, "id")?,
            username: required_text(record, "username")?,
            password_hash: required_text(record, "password_hash")?,
            is_admin: record
                .get("is_admin")
                .and_then(SqlValue::as_bool)
                .unwrap_or(false),
        })
    }
}

/// Lifecycle state of a bug report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BugStatus {
    Open,
    InProgress,
    Resolved,
    Closed,
}

/// How urgently a bug should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

/// Impact of a bug.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Minor,
    Medium,
    Major,
    Critical,
}

impl BugStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BugStatus::Open => "open",
            BugStatus::InProgress => "in-progress",
            BugStatus::Resolved => "resolved",
            BugStatus::Closed => "closed",
        }
    }
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Minor => "minor",
            Severity::Medium => "medium",
            Severity::Major => "major",
            Severity::Critical => "critical",
        }
    }
}

// Legacy rows carry the Traditional Chinese labels the tracker was launched with.
impl FromStr for BugStatus {
    type Err = MigrateError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "open" | "開放中" => Ok(BugStatus::Open),
            "in-progress" | "in_progress" | "in progress" | "處理中" => Ok(BugStatus::InProgress),
            "resolved" | "已解決" => Ok(BugStatus::Resolved),
            "closed" | "已關閉" => Ok(BugStatus::Closed),
            other => Err(MigrateError::InvalidData(format!("unknown bug status '{}'", other))),
        }
    }
}

impl FromStr for Priority {
    type Err = MigrateError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "low" | "低" => Ok(Priority::Low),
            "medium" | "中" => Ok(Priority::Medium),
            "high" | "高" => Ok(Priority::High),
            other => Err(MigrateError::InvalidData(format!("unknown priority '{}'", other))),
        }
    }
}

impl FromStr for Severity {
    type Err = MigrateError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "minor" | "輕微" => Ok(Severity::Minor),
            "medium" | "中" => Ok(Severity::Medium),
            "major" | "重大" => Ok(Severity::Major),
            "critical" | "嚴重" => Ok(Severity::Critical),
            other => Err(MigrateError::InvalidData(format!("unknown severity '{}'", other))),
        }
    }
}

impl fmt::Display for BugStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A bug report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BugRecord {
    pub id: i64,
    pub report_date: Option<DateTime<Utc>>,
    pub system: String,
    pub bug_details: String,
    pub reported_by: String,
    pub status: BugStatus,
    pub priority: Priority,
    pub severity: Severity,
    pub assigned_to: Option<String>,
    pub resolution_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub reported_by_user_id: Option<i64>,
    pub file_path: Option<String>,
}

impl BugRecord {
    /// Build a bug report from a fetched row.
    ///
    /// Columns added after the first release (`reported_by_user_id`,
    /// `file_path`) may be missing from older stores and read as `None`.
    pub fn from_record(record: &Record) -> Result<Self> {
        Ok(Self {
            id: required_i64(record, "id")?,
            report_date: record.get("report_date").and_then(SqlValue::as_timestamp_utc),
            system: required_text(record, "system")?,
            bug_details: required_text(record, "bug_details")?,
            reported_by: required_text(record, "reported_by")?,
            status: required_text(record, "status")?.parse()?,
            priority: required_text(record, "priority")?.parse()?,
            severity: required_text(record, "severity")?.parse()?,
            assigned_to: optional_text(record, "assigned_to"),
            resolution_date: record
                .get("resolution_date")
                .and_then(SqlValue::as_timestamp_utc),
            notes: optional_text(record, "notes"),
            reported_by_user_id: record
                .get("reported_by_user_id")
                .and_then(SqlValue::as_i64)
                .filter(|id| *id != 0),
            file_path: optional_text(record, "file_path"),
        })
    }
}

fn required_i64(record: &Record, column: &str) -> Result<i64> {
    record.try_get(column)?.as_i64().ok_or_else(|| {
        MigrateError::InvalidData(format!("column '{}' is not an integer", column))
    })
}

fn required_text(record: &Record, column: &str) -> Result<String> {
    match record.try_get(column)? {
        SqlValue::Text(s) => Ok(s.clone()),
        SqlValue::Null => Err(MigrateError::InvalidData(format!(
            "column '{}' is NULL",
            column
        ))),
        other => Ok(other.to_string()),
    }
}

fn optional_text(record: &Record, column: &str) -> Option<String> {
    match record.get(column) {
        Some(SqlValue::Text(s)) if !s.trim().is_empty() => Some(s.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_labels_parse() {
        assert_eq!("開放中".parse::<BugStatus>().unwrap(), BugStatus::Open);
        assert_eq!("處理中".parse::<BugStatus>().unwrap(), BugStatus::InProgress);
        assert_eq!("中".parse::<Priority>().unwrap(), Priority::Medium);
        assert_eq!("重大".parse::<Severity>().unwrap(), Severity::Major);
        assert_eq!("in-progress".parse::<BugStatus>().unwrap(), BugStatus::InProgress);
        assert!("urgent".parse::<Priority>().is_err());
    }

    #[test]
    fn test_user_from_sqlite_row() {
        let record = Record::from_pairs([
            ("id", SqlValue::I64(1)),
            ("username", SqlValue::from("alice")),
            ("password_hash", SqlValue::from("h1")),
            ("is_admin", SqlValue::I64(0)),
        ]);
        let user = User::from_record(&record).unwrap();
        assert_eq!(user.username, "alice");
        assert!(!user.is_admin);
    }

    #[test]
    fn test_bug_from_legacy_row_without_new_columns() {
        let record = Record::from_pairs([
            ("id", SqlValue::I64(10)),
            ("report_date", SqlValue::from("2025-01-02 03:04:05")),
            ("system", SqlValue::from("core")),
            ("bug_details", SqlValue::from("npe")),
            ("reported_by", SqlValue::from("alice")),
            ("status", SqlValue::from("open")),
            ("priority", SqlValue::from("medium")),
            ("severity", SqlValue::from("major")),
            ("assigned_to", SqlValue::from("")),
            ("resolution_date", SqlValue::Null),
            ("notes", SqlValue::Null),
        ]);
        let bug = BugRecord::from_record(&record).unwrap();
        assert_eq!(bug.id, 10);
        assert_eq!(bug.severity, Severity::Major);
        assert!(bug.report_date.is_some());
        assert_eq!(bug.assigned_to, None);
        assert_eq!(bug.reported_by_user_id, None);
        assert_eq!(bug.file_path, None);
    }
}
