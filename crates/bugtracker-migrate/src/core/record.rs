//! Row materialization.
//!
//! A [`Record`] is one result row: the ordered column names reported by the
//! result-set descriptor plus the values in that same order. It answers both
//! `record["username"]` and `record[1]`, so code that reads rows by name and
//! older code that reads them positionally share one type regardless of which
//! backend produced the row.

use std::ops::{Index, IndexMut};
use std::sync::Arc;

use serde::ser::{Serialize, SerializeMap, Serializer};

use super::value::SqlValue;
use crate::error::{MigrateError, Result};

/// Ordered column names shared by every row of one result set.
pub type Columns = Arc<[String]>;

/// A single materialized result row.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    columns: Columns,
    values: Vec<SqlValue>,
}

/// Anything that can locate a column in a [`Record`]: a position or a name.
pub trait ColumnIndex {
    /// Resolve to a position, or `None` if the column does not exist.
    fn position(&self, record: &Record) -> Option<usize>;

    /// Human readable form for error messages.
    fn describe(&self) -> String;
}

impl ColumnIndex for usize {
    fn position(&self, record: &Record) -> Option<usize> {
        (*self < record.values.len()).then_some(*self)
    }

    fn describe(&self) -> String {
        format!("index {}", self)
    }
}

impl ColumnIndex for &str {
    fn position(&self, record: &Record) -> Option<usize> {
        // First match wins when a query returns duplicate column names.
        record.columns.iter().position(|c| c == self)
    }

    fn describe(&self) -> String {
        format!("column '{}'", self)
    }
}

impl ColumnIndex for String {
    fn position(&self, record: &Record) -> Option<usize> {
        self.as_str().position(record)
    }

    fn describe(&self) -> String {
        self.as_str().describe()
    }
}

impl Record {
    /// Build a record from a column descriptor and the row's values.
    ///
    /// Fails if the descriptor and the value tuple disagree in length.
    pub fn new(columns: Columns, values: Vec<SqlValue>) -> Result<Self> {
        if columns.len() != values.len() {
            return Err(MigrateError::InvalidData(format!(
                "row has {} values but the result set describes {} columns",
                values.len(),
                columns.len()
            )));
        }
        Ok(Self { columns, values })
    }

    /// Convenience constructor for ad-hoc records.
    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, SqlValue)>,
        K: Into<String>,
    {
        let (columns, values): (Vec<String>, Vec<SqlValue>) =
            pairs.into_iter().map(|(k, v)| (k.into(), v)).unzip();
        Self {
            columns: columns.into(),
            values,
        }
    }

    /// Ordered column names.
    pub fn keys(&self) -> &[String] {
        &self.columns
    }

    /// Shared column descriptor.
    pub fn columns(&self) -> &Columns {
        &self.columns
    }

    /// Values in column order.
    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn contains(&self, column: &str) -> bool {
        column.position(self).is_some()
    }

    /// Look up a value by name or position.
    pub fn get<I: ColumnIndex>(&self, idx: I) -> Option<&SqlValue> {
        idx.position(self).map(|i| &self.values[i])
    }

    /// Mutable lookup by name or position.
    pub fn get_mut<I: ColumnIndex>(&mut self, idx: I) -> Option<&mut SqlValue> {
        idx.position(self).map(move |i| &mut self.values[i])
    }

    /// Look up a value, failing with the column description if it is missing.
    pub fn try_get<I: ColumnIndex>(&self, idx: I) -> Result<&SqlValue> {
        match idx.position(self) {
            Some(i) => Ok(&self.values[i]),
            None => Err(MigrateError::InvalidData(format!(
                "no {} in row with columns [{}]",
                idx.describe(),
                self.columns.join(", ")
            ))),
        }
    }

    /// Replace a value in place. Never persisted on its own; the caller has to
    /// issue a statement for that.
    pub fn set<I: ColumnIndex>(&mut self, idx: I, value: impl Into<SqlValue>) -> Result<()> {
        let describe = idx.describe();
        match self.get_mut(idx) {
            Some(slot) => {
                *slot = value.into();
                Ok(())
            }
            None => Err(MigrateError::InvalidData(format!("cannot set missing {}", describe))),
        }
    }

    /// Iterate over values in column order.
    pub fn iter(&self) -> std::slice::Iter<'_, SqlValue> {
        self.values.iter()
    }

    /// Iterate over `(column, value)` pairs in column order.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.columns.iter().map(String::as_str).zip(self.values.iter())
    }
}

impl Index<usize> for Record {
    type Output = SqlValue;

    fn index(&self, idx: usize) -> &SqlValue {
        &self.values[idx]
    }
}

impl IndexMut<usize> for Record {
    fn index_mut(&mut self, idx: usize) -> &mut SqlValue {
        &mut self.values[idx]
    }
}

impl Index<&str> for Record {
    type Output = SqlValue;

    fn index(&self, name: &str) -> &SqlValue {
        match self.get(name) {
            Some(v) => v,
            None => panic!("no column '{}' in record", name),
        }
    }
}

impl IndexMut<&str> for Record {
    fn index_mut(&mut self, name: &str) -> &mut SqlValue {
        match self.get_mut(name) {
            Some(v) => v,
            None => panic!("no column '{}' in record", name),
        }
    }
}

impl<'a> IntoIterator for &'a Record {
    type Item = &'a SqlValue;
    type IntoIter = std::slice::Iter<'a, SqlValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

impl IntoIterator for Record {
    type Item = SqlValue;
    type IntoIter = std::vec::IntoIter<SqlValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (k, v) in self.pairs() {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bob() -> Record {
        let columns: Columns = vec![
            "id".to_string(),
            "username".to_string(),
            "is_admin".to_string(),
        ]
        .into();
        Record::new(
            columns,
            vec![SqlValue::I64(1), SqlValue::from("bob"), SqlValue::Bool(true)],
        )
        .unwrap()
    }

    #[test]
    fn test_name_and_position_resolve_to_same_value() {
        let record = bob();
        assert_eq!(record["username"], SqlValue::from("bob"));
        assert_eq!(record[1], SqlValue::from("bob"));
        assert_eq!(record.keys(), ["id", "username", "is_admin"]);
    }

    #[test]
    fn test_iteration_in_column_order() {
        let record = bob();
        let values: Vec<&SqlValue> = record.iter().collect();
        assert_eq!(
            values,
            vec![&SqlValue::I64(1), &SqlValue::from("bob"), &SqlValue::Bool(true)]
        );
    }

    #[test]
    fn test_mutation_by_name_is_visible_by_position() {
        let mut record = bob();
        record["username"] = SqlValue::from("robert");
        assert_eq!(record[1], SqlValue::from("robert"));

        record.set(2, false).unwrap();
        assert_eq!(record["is_admin"], SqlValue::Bool(false));
        assert!(record.set("missing", 1i64).is_err());
    }

    #[test]
    fn test_length_mismatch_is_rejected() {
        let columns: Columns = vec!["id".to_string()].into();
        assert!(Record::new(columns, vec![]).is_err());
    }

    #[test]
    fn test_missing_column_lookup() {
        let record = bob();
        assert!(record.get("file_path").is_none());
        assert!(record.get(3).is_none());
        let err = record.try_get("file_path").unwrap_err();
        assert!(err.to_string().contains("column 'file_path'"));
    }

    #[test]
    fn test_serialize_as_ordered_map() {
        let json = serde_json::to_string(&bob()).unwrap();
        assert_eq!(json, r#"{"id":1,"username":"bob","is_admin":true}"#);
    }
}
