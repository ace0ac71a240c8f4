//! SQLite driver built on `rusqlite`.
//!
//! Rows are read into a [`BufferedCursor`] while the statement is live, so a
//! cursor never borrows the connection it came from. Every rusqlite call runs
//! on tokio's blocking pool; a busy database never stalls the runtime.

use crate::command::Statement;
use crate::dialect::{Dialect, SqliteDialect};
use crate::driver::{BufferedCursor, Connection, ConnectionProvider, ResultCursor};
use crate::schema::EndpointId;
use crate::value::Value;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params_from_iter, Batch};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// SQLite connection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqliteConfig {
    /// Path to the SQLite database file
    pub db_path: String,
    /// How long a statement waits on a locked database, in milliseconds
    #[serde(default)]
    pub busy_timeout_ms: Option<u64>,
}

impl SqliteConfig {
    /// Create a new SQLite config for the database at `db_path`
    pub fn new(db_path: impl Into<String>) -> Self {
        Self {
            db_path: db_path.into(),
            busy_timeout_ms: None,
        }
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout_ms = Some(timeout.as_millis().try_into().unwrap_or(u64::MAX));
        self
    }
}

/// Opens a new `rusqlite` connection to the configured file for every call.
#[derive(Debug, Clone)]
pub struct SqliteConnectionProvider {
    config: SqliteConfig,
    dialect: Arc<SqliteDialect>,
}

impl SqliteConnectionProvider {
    pub fn new(config: SqliteConfig) -> Self {
        Self {
            config,
            dialect: Arc::new(SqliteDialect),
        }
    }
}

#[async_trait]
impl ConnectionProvider for SqliteConnectionProvider {
    fn endpoint(&self) -> EndpointId {
        EndpointId::new(format!("sqlite:{}", self.config.db_path))
    }

    fn dialect(&self) -> Arc<dyn Dialect> {
        self.dialect.clone()
    }

    async fn create_connection(&self) -> Result<Box<dyn Connection>> {
        Ok(Box::new(SqliteConnection {
            config: self.config.clone(),
            conn: None,
        }))
    }
}

pub struct SqliteConnection {
    config: SqliteConfig,
    conn: Option<Arc<Mutex<rusqlite::Connection>>>,
}

impl SqliteConnection {
    fn connection(&self) -> Result<Arc<Mutex<rusqlite::Connection>>> {
        self.conn
            .clone()
            .ok_or_else(|| anyhow!("SQLite connection to {} is not open", self.config.db_path))
    }

    async fn run(&self, statement: &Statement) -> Result<BatchOutcome> {
        let conn = self.connection()?;
        let statement = statement.clone();
        tokio::task::spawn_blocking(move || run_batch(&conn.lock(), &statement))
            .await
            .context("SQLite statement task failed")?
    }
}

#[async_trait]
impl Connection for SqliteConnection {
    async fn open(&mut self) -> Result<()> {
        if self.conn.is_some() {
            return Ok(());
        }
        let config = self.config.clone();
        let conn = tokio::task::spawn_blocking(move || -> Result<rusqlite::Connection> {
            let conn = rusqlite::Connection::open(&config.db_path)
                .with_context(|| format!("Failed to open SQLite database {}", config.db_path))?;
            if let Some(ms) = config.busy_timeout_ms {
                conn.busy_timeout(Duration::from_millis(ms))?;
            }
            Ok(conn)
        })
        .await
        .context("SQLite open task failed")??;
        self.conn = Some(Arc::new(Mutex::new(conn)));
        Ok(())
    }

    async fn query(&mut self, statement: &Statement) -> Result<Box<dyn ResultCursor>> {
        let outcome = self.run(statement).await?;
        Ok(Box::new(outcome.rows.unwrap_or_default()))
    }

    async fn execute(&mut self, statement: &Statement) -> Result<u64> {
        Ok(self.run(statement).await?.changes)
    }

    async fn close(&mut self) -> Result<()> {
        let Some(conn) = self.conn.take() else {
            return Ok(());
        };
        // a statement task still holding the handle closes it on drop
        let Ok(conn) = Arc::try_unwrap(conn) else {
            return Ok(());
        };
        tokio::task::spawn_blocking(move || conn.into_inner().close())
            .await
            .context("SQLite close task failed")?
            .map_err(|(_, e)| e)
            .context("Failed to close SQLite connection")
    }
}

#[derive(Default)]
struct BatchOutcome {
    rows: Option<BufferedCursor>,
    changes: u64,
}

// Statement text may hold several statements (an insert followed by its
// identity select). Each takes as many parameters as it has placeholders;
// the last row-returning statement provides the result set.
fn run_batch(conn: &rusqlite::Connection, statement: &Statement) -> Result<BatchOutcome> {
    let mut params = statement.params().iter();
    let mut outcome = BatchOutcome::default();
    let mut batch = Batch::new(conn, statement.sql());

    while let Some(mut stmt) = batch.next()? {
        let expected = stmt.parameter_count();
        let bound: Vec<&Value> = params.by_ref().take(expected).collect();
        if bound.len() != expected {
            bail!(
                "statement has {} placeholders but only {} values remain",
                expected,
                bound.len()
            );
        }

        if stmt.column_count() > 0 {
            let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
            let mut rows = stmt.query(params_from_iter(bound))?;
            let mut buffered = Vec::new();
            while let Some(row) = rows.next()? {
                let values = (0..columns.len())
                    .map(|index| value_from_ref(row.get_ref(index)?))
                    .collect::<Result<Vec<_>>>()?;
                buffered.push(values);
            }
            outcome.rows = Some(BufferedCursor::new(columns, buffered));
        } else {
            outcome.changes += stmt.execute(params_from_iter(bound))? as u64;
        }
    }

    let unused = params.count();
    if unused > 0 {
        bail!("{} values were supplied beyond the statement's placeholders", unused);
    }
    Ok(outcome)
}

fn value_from_ref(value: ValueRef<'_>) -> Result<Value> {
    Ok(match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(r) => Value::Real(r),
        ValueRef::Text(bytes) => Value::Text(
            std::str::from_utf8(bytes)
                .context("SQLite returned text that is not valid UTF-8")?
                .to_string(),
        ),
        ValueRef::Blob(bytes) => Value::Blob(bytes.to_vec()),
    })
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            Value::Null => Ok(ToSqlOutput::Owned(rusqlite::types::Value::Null)),
            Value::Integer(i) => i.to_sql(),
            Value::Real(r) => r.to_sql(),
            Value::Text(s) => s.to_sql(),
            Value::Blob(b) => b.to_sql(),
            Value::Boolean(b) => b.to_sql(),
            Value::Timestamp(ts) => ts.to_sql(),
        }
    }
}
