//! Dialect strategies: identifier quoting, identity retrieval and schema
//! metadata queries for each supported database family.

use crate::schema::{Column, Table};
use std::fmt;

pub trait Dialect: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Quote a single identifier, escaping the closing quote character.
    fn quote_identifier(&self, name: &str) -> String;

    /// Text appended to an INSERT so the same command also selects the
    /// row that was just inserted, looked up by its identity column.
    fn identity_retrieval(&self, table: &Table, identity: &Column) -> String;

    /// Metadata query returning one row per column, ordered by table and
    /// column position: `table, column, type, is_nullable, is_identity`.
    fn schema_query(&self) -> &'static str;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SqlServerDialect;

impl Dialect for SqlServerDialect {
    fn name(&self) -> &'static str {
        "sqlserver"
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("[{}]", name.replace(']', "]]"))
    }

    fn identity_retrieval(&self, table: &Table, identity: &Column) -> String {
        format!(
            "; SELECT * FROM {} WHERE {} = SCOPE_IDENTITY()",
            table.quoted_name(),
            identity.quoted_name()
        )
    }

    fn schema_query(&self) -> &'static str {
        r#"SELECT c.TABLE_NAME, c.COLUMN_NAME, c.DATA_TYPE,
       CASE WHEN c.IS_NULLABLE = 'YES' THEN 1 ELSE 0 END,
       COALESCE(COLUMNPROPERTY(OBJECT_ID(QUOTENAME(c.TABLE_SCHEMA) + '.' + QUOTENAME(c.TABLE_NAME)), c.COLUMN_NAME, 'IsIdentity'), 0)
FROM INFORMATION_SCHEMA.COLUMNS c
JOIN INFORMATION_SCHEMA.TABLES t
  ON t.TABLE_SCHEMA = c.TABLE_SCHEMA AND t.TABLE_NAME = c.TABLE_NAME
WHERE t.TABLE_TYPE IN ('BASE TABLE', 'VIEW')
ORDER BY c.TABLE_NAME, c.ORDINAL_POSITION"#
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn identity_retrieval(&self, table: &Table, identity: &Column) -> String {
        format!(
            "; SELECT * FROM {} WHERE {} = last_insert_rowid()",
            table.quoted_name(),
            identity.quoted_name()
        )
    }

    // A rowid alias is the only INTEGER PRIMARY KEY column of a rowid table.
    // Such a key has no backing index; WITHOUT ROWID keys always have one.
    fn schema_query(&self) -> &'static str {
        r#"SELECT m.name, p.name, p.type,
       CASE WHEN p."notnull" = 0 THEN 1 ELSE 0 END,
       CASE WHEN p.pk = 1
             AND upper(p.type) = 'INTEGER'
             AND (SELECT count(*) FROM pragma_table_info(m.name) k WHERE k.pk > 0) = 1
             AND NOT EXISTS (SELECT 1 FROM pragma_index_list(m.name) i WHERE i.origin = 'pk')
            THEN 1 ELSE 0 END
FROM sqlite_master m
JOIN pragma_table_info(m.name) p
WHERE m.type IN ('table', 'view') AND m.name NOT LIKE 'sqlite\_%' ESCAPE '\'
ORDER BY m.name, p.cid"#
    }
}
