//! Collaborator contracts implemented by database drivers, and the scoped
//! connection helpers the engine runs every command through.

use crate::command::Statement;
use crate::dialect::Dialect;
use crate::error::Result;
use crate::record::{RecordRow, RowMaterializer};
use crate::schema::EndpointId;
use crate::value::Value;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, warn};

/// Source of connections for one endpoint.
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    /// Identity used to cache the endpoint's schema snapshot.
    fn endpoint(&self) -> EndpointId;

    fn dialect(&self) -> Arc<dyn Dialect>;

    /// Create a connection that has not been opened yet.
    async fn create_connection(&self) -> anyhow::Result<Box<dyn Connection>>;
}

/// A single driver connection.
///
/// Dropping an implementation must release its resources even when
/// [`Connection::close`] was never awaited.
#[async_trait]
pub trait Connection: Send {
    async fn open(&mut self) -> anyhow::Result<()>;

    async fn query(&mut self, statement: &Statement) -> anyhow::Result<Box<dyn ResultCursor>>;

    /// Run a statement that returns no rows; yields the affected row count.
    async fn execute(&mut self, statement: &Statement) -> anyhow::Result<u64>;

    async fn close(&mut self) -> anyhow::Result<()>;
}

/// Forward-only, single-pass access to a result set.
pub trait ResultCursor: Send {
    fn columns(&self) -> &[String];

    fn next_row(&mut self) -> anyhow::Result<Option<Vec<Value>>>;
}

/// Cursor over rows a driver has already read into memory.
#[derive(Debug, Default, Clone)]
pub struct BufferedCursor {
    columns: Vec<String>,
    rows: VecDeque<Vec<Value>>,
}

impl BufferedCursor {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            columns,
            rows: rows.into(),
        }
    }
}

impl ResultCursor for BufferedCursor {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn next_row(&mut self) -> anyhow::Result<Option<Vec<Value>>> {
        Ok(self.rows.pop_front())
    }
}

async fn acquire(provider: &dyn ConnectionProvider) -> Result<Box<dyn Connection>> {
    let mut connection = provider.create_connection().await?;
    // a connection that fails to open is released by its Drop
    connection.open().await?;
    Ok(connection)
}

async fn release(mut connection: Box<dyn Connection>) {
    if let Err(e) = connection.close().await {
        warn!(error = %e, "Failed to close connection");
    }
}

/// Run a row-returning statement on a fresh connection and read every row
/// before the connection is closed.
pub(crate) async fn run_query(
    provider: &dyn ConnectionProvider,
    statement: &Statement,
) -> Result<Vec<RecordRow>> {
    debug!(sql = %statement.sql(), params = statement.params().len(), "Executing query");
    let mut connection = acquire(provider).await?;
    let result = match connection.query(statement).await {
        Ok(cursor) => RowMaterializer::materialize(cursor).collect::<Result<Vec<_>>>(),
        Err(e) => Err(e.into()),
    };
    release(connection).await;
    result
}

pub(crate) async fn run_query_first(
    provider: &dyn ConnectionProvider,
    statement: &Statement,
) -> Result<Option<RecordRow>> {
    debug!(sql = %statement.sql(), params = statement.params().len(), "Executing singleton query");
    let mut connection = acquire(provider).await?;
    let result = match connection.query(statement).await {
        Ok(cursor) => RowMaterializer::materialize_first(cursor),
        Err(e) => Err(e.into()),
    };
    release(connection).await;
    result
}

pub(crate) async fn run_execute(
    provider: &dyn ConnectionProvider,
    statement: &Statement,
) -> Result<u64> {
    debug!(sql = %statement.sql(), params = statement.params().len(), "Executing non-query");
    let mut connection = acquire(provider).await?;
    let result = connection.execute(statement).await.map_err(Into::into);
    release(connection).await;
    result
}
