//! Statement assembly for each verb.
//!
//! SQL text and parameters always travel separately: values are bound
//! positionally through `?` placeholders and never interpolated.

use crate::criteria::Criteria;
use crate::error::{DataError, Result};
use crate::record::RecordRow;
use crate::schema::{Column, SchemaSnapshot, Table};
use crate::translator::{ExpressionTranslator, Predicate};
use crate::value::Value;

/// SQL text with positional placeholders and the values bound to them, in
/// placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    sql: String,
    params: Vec<Value>,
}

impl Statement {
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }
}

/// An INSERT, optionally followed by the dialect's identity retrieval query.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertCommand {
    /// Yields the inserted row, selected by its identity value.
    ReturningRow(Statement),
    NonQuery(Statement),
}

impl InsertCommand {
    pub fn statement(&self) -> &Statement {
        match self {
            InsertCommand::ReturningRow(statement) | InsertCommand::NonQuery(statement) => {
                statement
            }
        }
    }

    pub fn returns_row(&self) -> bool {
        matches!(self, InsertCommand::ReturningRow(_))
    }
}

pub struct CommandBuilder<'a> {
    snapshot: &'a SchemaSnapshot,
}

impl<'a> CommandBuilder<'a> {
    pub fn new(snapshot: &'a SchemaSnapshot) -> Self {
        Self { snapshot }
    }

    pub fn select_all(&self, table: &Table) -> Statement {
        Statement::new(format!("SELECT * FROM {}", table.quoted_name()), Vec::new())
    }

    pub fn select_by_criteria(&self, table: &Table, predicate: Option<Predicate>) -> Statement {
        match predicate {
            Some(predicate) => Statement::new(
                format!("SELECT * FROM {} WHERE {}", table.quoted_name(), predicate.sql),
                predicate.params,
            ),
            None => self.select_all(table),
        }
    }

    pub fn insert(&self, table: &Table, data: &RecordRow) -> Result<InsertCommand> {
        let columns = resolve_columns(table, data, "insert")?;
        if let Some(identity) = columns.iter().find(|column| column.is_identity()) {
            return Err(DataError::InvalidRequest(format!(
                "cannot insert into identity column '{}' of table '{}'",
                identity.name(),
                table.name()
            )));
        }

        let column_list = columns
            .iter()
            .map(|column| column.quoted_name())
            .collect::<Vec<_>>()
            .join(",");
        let mut sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table.quoted_name(),
            column_list,
            vec!["?"; columns.len()].join(",")
        );
        let params = bound_values(data);

        match table.identity_column() {
            Some(identity) => {
                sql.push_str(&self.snapshot.dialect().identity_retrieval(table, identity));
                Ok(InsertCommand::ReturningRow(Statement::new(sql, params)))
            }
            None => Ok(InsertCommand::NonQuery(Statement::new(sql, params))),
        }
    }

    /// SET parameters come before the predicate's.
    pub fn update_by_criteria(
        &self,
        table: &Table,
        data: &RecordRow,
        predicate: Predicate,
    ) -> Result<Statement> {
        let columns = resolve_columns(table, data, "update")?;
        let assignments = columns
            .iter()
            .map(|column| format!("{}=?", column.quoted_name()))
            .collect::<Vec<_>>()
            .join(",");

        let mut params = bound_values(data);
        params.extend(predicate.params);
        Ok(Statement::new(
            format!(
                "UPDATE {} SET {} WHERE {}",
                table.quoted_name(),
                assignments,
                predicate.sql
            ),
            params,
        ))
    }

    /// Delete the rows matching every key/value pair.
    pub fn delete_by_criteria(&self, table: &Table, keys: &RecordRow) -> Result<Statement> {
        let criteria = keys
            .iter()
            .map(|(name, value)| Criteria::eq(name, value.clone()))
            .reduce(Criteria::and)
            .ok_or_else(|| {
                DataError::InvalidRequest(format!(
                    "delete from '{}' requires at least one key column",
                    table.name()
                ))
            })?;
        let predicate = ExpressionTranslator::new(table).translate(&criteria)?;

        Ok(Statement::new(
            format!("DELETE FROM {} WHERE {}", table.quoted_name(), predicate.sql),
            predicate.params,
        ))
    }
}

// Columns in the record's order; parameters are bound by the same order.
fn resolve_columns<'t>(table: &'t Table, data: &RecordRow, verb: &str) -> Result<Vec<&'t Column>> {
    if data.is_empty() {
        return Err(DataError::InvalidRequest(format!(
            "{} on '{}' requires at least one column value",
            verb,
            table.name()
        )));
    }

    let mut columns: Vec<&Column> = Vec::with_capacity(data.len());
    for name in data.columns() {
        let column = table.find_column(name)?;
        if columns.iter().any(|seen| std::ptr::eq(*seen, column)) {
            return Err(DataError::InvalidRequest(format!(
                "column '{}' is given more than once",
                column.name()
            )));
        }
        columns.push(column);
    }
    Ok(columns)
}

fn bound_values(data: &RecordRow) -> Vec<Value> {
    data.iter().map(|(_, value)| value.clone()).collect()
}
