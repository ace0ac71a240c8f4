//! Runtime schema discovery and the per-endpoint snapshot cache.
//!
//! # Intention
//!
//! - Turn driver metadata rows into immutable [`Table`] / [`Column`] values
//!   with their quoted identifiers computed once.
//! - Resolve caller-supplied logical names case-insensitively; a miss is a
//!   [`SchemaMismatch`](crate::error::SchemaMismatch), never an empty result.
//! - Share one snapshot per endpoint through [`SchemaCatalog`], built at most
//!   once at a time.

use crate::command::Statement;
use crate::dialect::Dialect;
use crate::driver::{self, ConnectionProvider};
use crate::error::{DataError, Result};
use crate::record::RecordRow;
use crate::value::Value;
use anyhow::anyhow;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{info, warn};

/// Stable identity of a connection target, used as the snapshot cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EndpointId(String);

impl EndpointId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One row of the dialect's schema metadata query.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMetadata {
    pub table: String,
    pub column: String,
    pub data_type: String,
    pub is_nullable: bool,
    pub is_identity: bool,
}

impl ColumnMetadata {
    pub fn new(table: &str, column: &str, data_type: &str) -> Self {
        Self {
            table: table.to_string(),
            column: column.to_string(),
            data_type: data_type.to_string(),
            is_nullable: true,
            is_identity: false,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.is_nullable = false;
        self
    }

    pub fn identity(mut self) -> Self {
        self.is_identity = true;
        self.is_nullable = false;
        self
    }

    fn from_record(row: &RecordRow) -> Result<Self> {
        let text = |index: usize| -> Result<String> {
            match row.value_at(index) {
                Some(Value::Text(s)) => Ok(s.clone()),
                Some(Value::Null) => Ok(String::new()),
                other => Err(malformed_metadata(index, other)),
            }
        };
        let flag = |index: usize| -> Result<bool> {
            match row.value_at(index) {
                Some(Value::Null) => Ok(false),
                Some(value) => value
                    .as_bool()
                    .ok_or_else(|| malformed_metadata(index, Some(value))),
                None => Err(malformed_metadata(index, None)),
            }
        };

        let table = text(0)?;
        let column = text(1)?;
        if table.is_empty() || column.is_empty() {
            return Err(DataError::Execution(anyhow!(
                "schema metadata row has an empty table or column name"
            )));
        }
        Ok(Self {
            table,
            column,
            data_type: text(2)?,
            is_nullable: flag(3)?,
            is_identity: flag(4)?,
        })
    }
}

fn malformed_metadata(index: usize, value: Option<&Value>) -> DataError {
    DataError::Execution(anyhow!(
        "unexpected schema metadata value at position {}: {}",
        index,
        value.map(Value::type_name).unwrap_or("missing")
    ))
}

fn fold_name(name: &str) -> String {
    name.to_lowercase()
}

#[derive(Debug)]
pub struct Column {
    name: String,
    quoted_name: String,
    data_type: String,
    is_identity: bool,
    is_nullable: bool,
}

impl Column {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn quoted_name(&self) -> &str {
        &self.quoted_name
    }

    pub fn data_type(&self) -> &str {
        &self.data_type
    }

    pub fn is_identity(&self) -> bool {
        self.is_identity
    }

    pub fn is_nullable(&self) -> bool {
        self.is_nullable
    }
}

#[derive(Debug)]
pub struct Table {
    name: String,
    quoted_name: String,
    columns: Vec<Column>,
    by_name: HashMap<String, usize>,
    identity: Option<usize>,
}

impl Table {
    fn new(name: &str, dialect: &dyn Dialect) -> Self {
        Self {
            name: name.to_string(),
            quoted_name: dialect.quote_identifier(name),
            columns: Vec::new(),
            by_name: HashMap::new(),
            identity: None,
        }
    }

    fn push_column(&mut self, metadata: ColumnMetadata, dialect: &dyn Dialect) {
        let key = fold_name(&metadata.column);
        if self.by_name.contains_key(&key) {
            warn!(
                table = %self.name,
                column = %metadata.column,
                "Ignoring duplicate column in schema metadata"
            );
            return;
        }

        let mut is_identity = metadata.is_identity;
        if is_identity && self.identity.is_some() {
            warn!(
                table = %self.name,
                column = %metadata.column,
                "Table reports more than one identity column; keeping the first"
            );
            is_identity = false;
        }

        let index = self.columns.len();
        if is_identity {
            self.identity = Some(index);
        }
        self.columns.push(Column {
            quoted_name: dialect.quote_identifier(&metadata.column),
            name: metadata.column,
            data_type: metadata.data_type,
            is_identity,
            is_nullable: metadata.is_nullable,
        });
        self.by_name.insert(key, index);
    }

    /// Actual, case-correct name as reported by the database.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn quoted_name(&self) -> &str {
        &self.quoted_name
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn find_column(&self, name: &str) -> Result<&Column> {
        self.by_name
            .get(&fold_name(name))
            .map(|&index| &self.columns[index])
            .ok_or_else(|| DataError::unknown_column(&self.name, name))
    }

    pub fn identity_column(&self) -> Option<&Column> {
        self.identity.map(|index| &self.columns[index])
    }
}

/// Immutable view of every table at one endpoint.
#[derive(Debug)]
pub struct SchemaSnapshot {
    endpoint: EndpointId,
    dialect: Arc<dyn Dialect>,
    tables: Vec<Table>,
    by_name: HashMap<String, usize>,
}

impl SchemaSnapshot {
    /// Group metadata rows into tables, keeping the order they were reported in.
    pub fn from_metadata(
        endpoint: EndpointId,
        dialect: Arc<dyn Dialect>,
        rows: impl IntoIterator<Item = ColumnMetadata>,
    ) -> Self {
        let mut tables: Vec<Table> = Vec::new();
        let mut by_name: HashMap<String, usize> = HashMap::new();

        for row in rows {
            let key = fold_name(&row.table);
            let index = match by_name.get(&key) {
                Some(&index) => index,
                None => {
                    tables.push(Table::new(&row.table, dialect.as_ref()));
                    by_name.insert(key, tables.len() - 1);
                    tables.len() - 1
                }
            };

            let table = &mut tables[index];
            if table.name != row.table {
                warn!(
                    table = %row.table,
                    existing = %table.name,
                    "Ignoring table whose name differs from another only by case"
                );
                continue;
            }
            table.push_column(row, dialect.as_ref());
        }

        Self {
            endpoint,
            dialect,
            tables,
            by_name,
        }
    }

    pub fn endpoint(&self) -> &EndpointId {
        &self.endpoint
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    pub fn find_table(&self, name: &str) -> Result<&Table> {
        self.by_name
            .get(&fold_name(name))
            .map(|&index| &self.tables[index])
            .ok_or_else(|| DataError::unknown_table(name))
    }
}

/// Process-wide registry of schema snapshots keyed by endpoint.
///
/// Snapshots are built on first use and kept until [`invalidate`] or
/// [`clear`]. Each endpoint owns a `OnceCell`, so concurrent callers wait on
/// the one build in flight instead of starting their own; a failed build
/// leaves the cell empty and the next caller retries.
///
/// [`invalidate`]: SchemaCatalog::invalidate
/// [`clear`]: SchemaCatalog::clear
#[derive(Debug, Default)]
pub struct SchemaCatalog {
    snapshots: Mutex<HashMap<EndpointId, Arc<OnceCell<Arc<SchemaSnapshot>>>>>,
}

impl SchemaCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn resolve(&self, provider: &dyn ConnectionProvider) -> Result<Arc<SchemaSnapshot>> {
        let endpoint = provider.endpoint();
        let cell = self
            .snapshots
            .lock()
            .entry(endpoint.clone())
            .or_default()
            .clone();

        let snapshot = cell
            .get_or_try_init(|| Self::build(provider, endpoint))
            .await?;
        Ok(snapshot.clone())
    }

    pub fn cached(&self, endpoint: &EndpointId) -> Option<Arc<SchemaSnapshot>> {
        self.snapshots
            .lock()
            .get(endpoint)
            .and_then(|cell| cell.get().cloned())
    }

    /// Drop the snapshot for `endpoint`; the next resolve rebuilds it.
    pub fn invalidate(&self, endpoint: &EndpointId) -> bool {
        self.snapshots.lock().remove(endpoint).is_some()
    }

    pub fn clear(&self) {
        self.snapshots.lock().clear();
    }

    async fn build(
        provider: &dyn ConnectionProvider,
        endpoint: EndpointId,
    ) -> Result<Arc<SchemaSnapshot>> {
        let dialect = provider.dialect();
        let statement = Statement::new(dialect.schema_query(), Vec::new());
        let rows = driver::run_query(provider, &statement).await?;
        let metadata = rows
            .iter()
            .map(ColumnMetadata::from_record)
            .collect::<Result<Vec<_>>>()?;

        let snapshot = SchemaSnapshot::from_metadata(endpoint, dialect, metadata);
        info!(
            endpoint = %snapshot.endpoint(),
            dialect = snapshot.dialect().name(),
            tables = snapshot.tables().len(),
            "Built schema snapshot"
        );
        Ok(Arc::new(snapshot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::mock::{sample_snapshot, MockProvider};
    use std::sync::atomic::Ordering;

    #[test]
    fn lookups_are_case_insensitive_and_reference_stable() {
        let snapshot = sample_snapshot();

        let first = snapshot.find_table("customers").unwrap();
        let second = snapshot.find_table("CUSTOMERS").unwrap();
        assert!(std::ptr::eq(first, second));
        assert_eq!(first.name(), "Customers");
        assert_eq!(first.quoted_name(), "[Customers]");

        let city = first.find_column("city").unwrap();
        assert!(std::ptr::eq(city, first.find_column("City").unwrap()));
        assert_eq!(city.quoted_name(), "[City]");
    }

    #[test]
    fn unknown_names_are_schema_mismatches() {
        let snapshot = sample_snapshot();

        let err = snapshot.find_table("Suppliers").unwrap_err();
        assert!(err.is_schema_mismatch());
        assert_eq!(err.to_string(), "schema mismatch: table 'Suppliers' not found");

        let customers = snapshot.find_table("Customers").unwrap();
        let err = customers.find_column("Email").unwrap_err();
        assert!(err.is_schema_mismatch());

        // names are not trimmed
        assert!(snapshot.find_table(" Customers").is_err());
    }

    #[test]
    fn identity_and_column_order_follow_metadata() {
        let snapshot = sample_snapshot();
        let customers = snapshot.find_table("Customers").unwrap();

        let names: Vec<&str> = customers.columns().iter().map(Column::name).collect();
        assert_eq!(names, ["Id", "Name", "City"]);
        assert_eq!(customers.identity_column().map(Column::name), Some("Id"));

        let tags = snapshot.find_table("Tags").unwrap();
        assert!(tags.identity_column().is_none());
    }

    #[test]
    fn duplicate_metadata_is_dropped() {
        let snapshot = SchemaSnapshot::from_metadata(
            EndpointId::new("test"),
            Arc::new(crate::dialect::SqlServerDialect),
            vec![
                ColumnMetadata::new("Items", "Id", "int").identity(),
                ColumnMetadata::new("Items", "Code", "int").identity(),
                ColumnMetadata::new("Items", "code", "varchar"),
                ColumnMetadata::new("ITEMS", "Other", "int"),
            ],
        );

        let items = snapshot.find_table("items").unwrap();
        assert_eq!(items.columns().len(), 2);
        assert_eq!(items.identity_column().map(Column::name), Some("Id"));
        assert!(!items.find_column("Code").unwrap().is_identity());
        assert!(items.find_column("Other").is_err());
    }

    #[tokio::test]
    async fn resolve_builds_once_per_endpoint() {
        let provider = MockProvider::new("mock://one");
        let catalog = SchemaCatalog::new();

        let first = catalog.resolve(&provider).await.unwrap();
        let second = catalog.resolve(&provider).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(provider.state.schema_loads.load(Ordering::SeqCst), 1);

        let other = MockProvider::new("mock://two");
        let third = catalog.resolve(&other).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
    }

    #[tokio::test]
    async fn concurrent_resolves_share_one_build() {
        let provider = MockProvider::new("mock://shared");
        let catalog = SchemaCatalog::new();

        let snapshots = futures::future::join_all((0..8).map(|_| catalog.resolve(&provider))).await;

        assert_eq!(provider.state.schema_loads.load(Ordering::SeqCst), 1);
        let first = snapshots[0].as_ref().unwrap();
        for snapshot in &snapshots {
            assert!(Arc::ptr_eq(first, snapshot.as_ref().unwrap()));
        }
    }

    #[tokio::test]
    async fn failed_build_is_not_cached() {
        let provider = MockProvider::new("mock://flaky");
        provider.state.fail_open.store(true, Ordering::SeqCst);
        let catalog = SchemaCatalog::new();

        let err = catalog.resolve(&provider).await.unwrap_err();
        assert!(matches!(err, DataError::Execution(_)));
        assert!(catalog.cached(&provider.endpoint()).is_none());

        provider.state.fail_open.store(false, Ordering::SeqCst);
        assert!(catalog.resolve(&provider).await.is_ok());
    }

    #[tokio::test]
    async fn invalidate_forces_a_rebuild() {
        let provider = MockProvider::new("mock://stale");
        let catalog = SchemaCatalog::new();

        let before = catalog.resolve(&provider).await.unwrap();
        assert!(catalog.invalidate(&provider.endpoint()));
        assert!(catalog.cached(&provider.endpoint()).is_none());

        let after = catalog.resolve(&provider).await.unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(provider.state.schema_loads.load(Ordering::SeqCst), 2);
    }
}
