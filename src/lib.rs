//! Schema-aware data adapter for the Runar ecosystem.
//!
//! # Intention
//!
//! - Translate logical data-access requests (find, insert, update, delete,
//!   raw query/execute) into parameterized SQL against a schema discovered at
//!   runtime.
//! - Resolve caller-supplied table and column names case-insensitively and
//!   fail loudly when they do not exist.
//! - Return result rows as ordered name/value records.
//!
//! # Architectural Boundaries
//!
//! - Drivers plug in through [`ConnectionProvider`], [`Connection`] and
//!   [`ResultCursor`]; SQLite ships in [`sqlite`].
//! - Dialect differences (quoting, identity retrieval, metadata queries) live
//!   behind [`Dialect`].
//! - No pooling, transactions, retries or schema migration.
//!
//! ```no_run
//! # async fn demo() -> rust_data_adapter::Result<()> {
//! use rust_data_adapter::{Criteria, DataAdapter, RecordRow, SchemaCatalog};
//! use rust_data_adapter::sqlite::{SqliteConfig, SqliteConnectionProvider};
//! use std::sync::Arc;
//!
//! let provider = SqliteConnectionProvider::new(SqliteConfig::new("app.db"));
//! let adapter = DataAdapter::new(Arc::new(provider), Arc::new(SchemaCatalog::new()));
//!
//! let created = adapter
//!     .insert("customers", &RecordRow::new().with("name", "Acme").with("city", "NY"))
//!     .await?;
//! let in_ny = adapter
//!     .find("customers", Some(&Criteria::eq("city", "NY")))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod command;
pub mod criteria;
pub mod dialect;
pub mod driver;
pub mod error;
pub mod record;
pub mod schema;
pub mod sqlite;
pub mod translator;
pub mod value;

pub use adapter::DataAdapter;
pub use command::{CommandBuilder, InsertCommand, Statement};
pub use criteria::{Criteria, LogicalOperator, Operand, QueryOperator};
pub use dialect::{Dialect, SqlServerDialect, SqliteDialect};
pub use driver::{BufferedCursor, Connection, ConnectionProvider, ResultCursor};
pub use error::{DataError, Result, SchemaMismatch};
pub use record::{RecordRow, Records, RowMaterializer};
pub use schema::{Column, ColumnMetadata, EndpointId, SchemaCatalog, SchemaSnapshot, Table};
pub use translator::{ExpressionTranslator, Predicate};
pub use value::Value;
