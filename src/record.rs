use crate::driver::ResultCursor;
use crate::error::{DataError, Result};
use crate::value::Value;
use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use std::iter::FusedIterator;

/// Ordered column name / value pairs.
///
/// Used both for result rows and as the column data of insert, update and
/// delete requests. Lookups by name ignore case.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordRow {
    fields: Vec<(String, Value)>,
}

impl RecordRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a named value
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Set `name`, replacing an existing field of the same name in place.
    /// Returns the previous value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let name = name.into();
        let value = value.into();
        match self.position(&name) {
            Some(index) => Some(std::mem::replace(&mut self.fields[index].1, value)),
            None => {
                self.fields.push((name, value));
                None
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.position(name).map(|index| &self.fields[index].1)
    }

    pub fn value_at(&self, index: usize) -> Option<&Value> {
        self.fields.get(index).map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    fn position(&self, name: &str) -> Option<usize> {
        let folded = name.to_lowercase();
        self.fields
            .iter()
            .position(|(existing, _)| existing.to_lowercase() == folded)
    }

    // Result sets may repeat a column name; keep every field as reported.
    fn from_result(columns: &[String], values: Vec<Value>) -> Self {
        Self {
            fields: columns.iter().cloned().zip(values).collect(),
        }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for RecordRow {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = RecordRow::new();
        for (name, value) in iter {
            row.set(name, value);
        }
        row
    }
}

impl IntoIterator for RecordRow {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

/// Converts driver cursors into [`RecordRow`]s without coercing values.
pub struct RowMaterializer;

impl RowMaterializer {
    pub fn materialize(cursor: Box<dyn ResultCursor>) -> Records {
        let columns = cursor.columns().to_vec();
        Records {
            cursor: Some(cursor),
            columns,
        }
    }

    /// Read at most one row.
    pub fn materialize_first(cursor: Box<dyn ResultCursor>) -> Result<Option<RecordRow>> {
        Self::materialize(cursor).next().transpose()
    }
}

/// Lazy, single-pass sequence of records over a cursor. Ends after the
/// cursor is exhausted or after yielding its first error.
pub struct Records {
    cursor: Option<Box<dyn ResultCursor>>,
    columns: Vec<String>,
}

impl Iterator for Records {
    type Item = Result<RecordRow>;

    fn next(&mut self) -> Option<Self::Item> {
        let cursor = self.cursor.as_mut()?;
        let item = match cursor.next_row() {
            Ok(Some(values)) if values.len() == self.columns.len() => {
                return Some(Ok(RecordRow::from_result(&self.columns, values)));
            }
            Ok(Some(values)) => Some(Err(DataError::Execution(anyhow!(
                "driver returned {} values for {} columns",
                values.len(),
                self.columns.len()
            )))),
            Ok(None) => None,
            Err(e) => Some(Err(e.into())),
        };
        self.cursor = None;
        item
    }
}

impl FusedIterator for Records {}
