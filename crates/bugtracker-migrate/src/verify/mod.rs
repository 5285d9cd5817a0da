//! Post-migration row count verification.
//!
//! The migration never deletes, so a target that holds exactly as many rows as
//! the source held before the run is taken as complete. A mismatch is reported
//! and logged but nothing is undone.

use serde::Serialize;
use tracing::{info, warn};

use crate::connection::Connection;
use crate::error::Result;

/// Row counts of one table on both sides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableCount {
    pub table: String,
    pub source: i64,
    pub target: i64,
}

impl TableCount {
    /// Whether the target holds exactly as many rows as the source.
    pub fn matches(&self) -> bool {
        self.source == self.target
    }
}

/// Count comparison for every migrated table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerificationReport {
    pub tables: Vec<TableCount>,
}

impl VerificationReport {
    /// Record one table's counts, logging the outcome.
    pub fn push(&mut self, table: &str, source: i64, target: i64) {
        let count = TableCount {
            table: table.to_string(),
            source,
            target,
        };
        if count.matches() {
            info!("{}: {} rows (match)", table, source);
        } else {
            warn!("{}: source={} target={} (MISMATCH)", table, source, target);
        }
        self.tables.push(count);
    }

    /// True when every table matches.
    pub fn is_complete(&self) -> bool {
        self.tables.iter().all(TableCount::matches)
    }

    /// Tables whose counts differ.
    pub fn mismatches(&self) -> impl Iterator<Item = &TableCount> {
        self.tables.iter().filter(|t| !t.matches())
    }

    /// Counts for one table, if it was verified.
    pub fn get(&self, table: &str) -> Option<&TableCount> {
        self.tables.iter().find(|t| t.table == table)
    }
}

/// Compare the given source counts against the current target counts.
pub async fn verify_counts(
    target: &mut Connection,
    source_counts: &[(&str, i64)],
) -> Result<VerificationReport> {
    let mut report = VerificationReport::default();
    for (table, source) in source_counts {
        let target_count = target.count_rows(table).await?;
        report.push(table, *source, target_count);
    }
    Ok(report)
}
