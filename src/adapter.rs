use crate::command::{CommandBuilder, InsertCommand, Statement};
use crate::criteria::Criteria;
use crate::driver::{self, ConnectionProvider};
use crate::error::Result;
use crate::record::RecordRow;
use crate::schema::{SchemaCatalog, SchemaSnapshot};
use crate::translator::ExpressionTranslator;
use crate::value::Value;
use std::sync::Arc;

/// Entry point for logical data access against one endpoint.
///
/// Every call resolves names against the cached schema snapshot, builds a
/// single statement, and runs it on its own connection which is closed
/// before the call returns.
#[derive(Clone)]
pub struct DataAdapter {
    provider: Arc<dyn ConnectionProvider>,
    catalog: Arc<SchemaCatalog>,
}

impl DataAdapter {
    pub fn new(provider: Arc<dyn ConnectionProvider>, catalog: Arc<SchemaCatalog>) -> Self {
        Self { provider, catalog }
    }

    pub async fn schema(&self) -> Result<Arc<SchemaSnapshot>> {
        self.catalog.resolve(self.provider.as_ref()).await
    }

    /// Forget the cached snapshot so the next call reads fresh metadata.
    pub fn invalidate_schema(&self) -> bool {
        self.catalog.invalidate(&self.provider.endpoint())
    }

    pub async fn find_all(&self, table: &str) -> Result<Vec<RecordRow>> {
        self.find(table, None).await
    }

    pub async fn find(&self, table: &str, criteria: Option<&Criteria>) -> Result<Vec<RecordRow>> {
        let statement = self.find_statement(table, criteria).await?;
        self.query_statement(&statement).await
    }

    pub async fn find_single(&self, table: &str, criteria: &Criteria) -> Result<Option<RecordRow>> {
        let statement = self.find_statement(table, Some(criteria)).await?;
        driver::run_query_first(self.provider.as_ref(), &statement).await
    }

    /// Insert a row. Returns the stored row when the table has an identity
    /// column, `None` otherwise.
    pub async fn insert(&self, table: &str, data: &RecordRow) -> Result<Option<RecordRow>> {
        let schema = self.schema().await?;
        let table = schema.find_table(table)?;
        match CommandBuilder::new(&schema).insert(table, data)? {
            InsertCommand::ReturningRow(statement) => {
                driver::run_query_first(self.provider.as_ref(), &statement).await
            }
            InsertCommand::NonQuery(statement) => {
                self.execute_statement(&statement).await?;
                Ok(None)
            }
        }
    }

    pub async fn update(&self, table: &str, data: &RecordRow, criteria: &Criteria) -> Result<u64> {
        let statement = {
            let schema = self.schema().await?;
            let table = schema.find_table(table)?;
            let predicate = ExpressionTranslator::new(table).translate(criteria)?;
            CommandBuilder::new(&schema).update_by_criteria(table, data, predicate)?
        };
        self.execute_statement(&statement).await
    }

    pub async fn delete(&self, table: &str, keys: &RecordRow) -> Result<u64> {
        let statement = {
            let schema = self.schema().await?;
            let table = schema.find_table(table)?;
            CommandBuilder::new(&schema).delete_by_criteria(table, keys)?
        };
        self.execute_statement(&statement).await
    }

    /// Run caller-written SQL with positional values.
    pub async fn query(&self, sql: &str, values: Vec<Value>) -> Result<Vec<RecordRow>> {
        self.query_statement(&Statement::new(sql, values)).await
    }

    pub async fn execute(&self, sql: &str, values: Vec<Value>) -> Result<u64> {
        self.execute_statement(&Statement::new(sql, values)).await
    }

    pub async fn query_statement(&self, statement: &Statement) -> Result<Vec<RecordRow>> {
        driver::run_query(self.provider.as_ref(), statement).await
    }

    pub async fn execute_statement(&self, statement: &Statement) -> Result<u64> {
        driver::run_execute(self.provider.as_ref(), statement).await
    }

    async fn find_statement(&self, table: &str, criteria: Option<&Criteria>) -> Result<Statement> {
        let schema = self.schema().await?;
        let table = schema.find_table(table)?;
        let predicate = criteria
            .map(|criteria| ExpressionTranslator::new(table).translate(criteria))
            .transpose()?;
        Ok(CommandBuilder::new(&schema).select_by_criteria(table, predicate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::mock::{MockProvider, MockResult};
    use crate::driver::BufferedCursor;
    use crate::error::DataError;
    use std::sync::atomic::Ordering;

    fn adapter() -> (DataAdapter, Arc<MockProvider>) {
        let provider = Arc::new(MockProvider::new("mock://adapter"));
        let adapter = DataAdapter::new(provider.clone(), Arc::new(SchemaCatalog::new()));
        (adapter, provider)
    }

    fn customer_row(id: i64, name: &str, city: &str) -> BufferedCursor {
        BufferedCursor::new(
            vec!["Id".into(), "Name".into(), "City".into()],
            vec![vec![Value::Integer(id), Value::from(name), Value::from(city)]],
        )
    }

    #[tokio::test]
    async fn find_translates_criteria() {
        let (adapter, provider) = adapter();
        provider
            .state
            .push_result(MockResult::Rows(customer_row(1, "Initech", "NY")));

        let criteria = Criteria::eq("city", "NY").and(Criteria::ne("name", "Acme"));
        let rows = adapter.find("customers", Some(&criteria)).await.unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("Name"), Some(&Value::from("Initech")));
        let executed = provider.state.executed();
        assert_eq!(
            executed[0].sql(),
            "SELECT * FROM [Customers] WHERE ([City] = ?) AND ([Name] <> ?)"
        );
        assert_eq!(executed[0].params(), &[Value::from("NY"), Value::from("Acme")]);
    }

    #[tokio::test]
    async fn find_without_criteria_selects_everything() {
        let (adapter, provider) = adapter();
        adapter.find_all("Orders").await.unwrap();

        assert_eq!(provider.state.executed()[0].sql(), "SELECT * FROM [Orders]");
    }

    #[tokio::test]
    async fn insert_returns_the_generated_row() {
        let (adapter, provider) = adapter();
        provider
            .state
            .push_result(MockResult::Rows(customer_row(42, "Acme", "NY")));

        let data = RecordRow::new().with("Name", "Acme").with("City", "NY");
        let row = adapter.insert("Customers", &data).await.unwrap().unwrap();

        assert_eq!(row.get("Id"), Some(&Value::Integer(42)));
        let executed = provider.state.executed();
        assert_eq!(executed.len(), 1);
        assert!(executed[0]
            .sql()
            .ends_with("; SELECT * FROM [Customers] WHERE [Id] = SCOPE_IDENTITY()"));
    }

    #[tokio::test]
    async fn insert_without_identity_returns_nothing() {
        let (adapter, provider) = adapter();
        provider.state.push_result(MockResult::Affected(1));

        let row = adapter
            .insert("Tags", &RecordRow::new().with("Name", "vip"))
            .await
            .unwrap();
        assert!(row.is_none());
    }

    #[tokio::test]
    async fn update_and_delete_report_affected_rows() {
        let (adapter, provider) = adapter();
        provider.state.push_result(MockResult::Affected(3));
        provider.state.push_result(MockResult::Affected(1));

        let updated = adapter
            .update(
                "Customers",
                &RecordRow::new().with("City", "LA"),
                &Criteria::eq("City", "NY"),
            )
            .await
            .unwrap();
        let deleted = adapter
            .delete("Customers", &RecordRow::new().with("Id", 5))
            .await
            .unwrap();

        assert_eq!((updated, deleted), (3, 1));
        let executed = provider.state.executed();
        assert_eq!(executed[1].sql(), "DELETE FROM [Customers] WHERE [Id] = ?");
        assert_eq!(executed[1].params(), &[Value::Integer(5)]);
    }

    #[tokio::test]
    async fn request_errors_issue_no_sql() {
        let (adapter, provider) = adapter();

        let err = adapter.find_all("Suppliers").await.unwrap_err();
        assert!(err.is_schema_mismatch());

        let err = adapter
            .find("Customers", Some(&Criteria::in_list("Id", Vec::<i64>::new())))
            .await
            .unwrap_err();
        assert!(matches!(err, DataError::InvalidCriteria(_)));

        let err = adapter.delete("Customers", &RecordRow::new()).await.unwrap_err();
        assert!(matches!(err, DataError::InvalidRequest(_)));

        assert!(provider.state.executed().is_empty());
    }

    #[tokio::test]
    async fn connections_are_released_when_execution_fails() {
        let (adapter, provider) = adapter();
        provider
            .state
            .push_result(MockResult::Fail("UNIQUE constraint failed"));

        let err = adapter
            .execute("DELETE FROM Customers", Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DataError::Execution(_)));
        assert_eq!(err.to_string(), "UNIQUE constraint failed");

        assert_eq!(provider.state.opened.load(Ordering::SeqCst), 1);
        assert_eq!(provider.state.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn open_failures_surface_as_execution_errors() {
        let (adapter, provider) = adapter();
        provider.state.fail_open.store(true, Ordering::SeqCst);

        let err = adapter.find_all("Customers").await.unwrap_err();
        assert!(matches!(err, DataError::Execution(_)));
        assert_eq!(provider.state.opened.load(Ordering::SeqCst), 0);
        assert_eq!(provider.state.closed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn raw_query_passes_values_through() {
        let (adapter, provider) = adapter();
        provider
            .state
            .push_result(MockResult::Rows(customer_row(7, "Hooli", "SF")));

        let rows = adapter
            .query("select * from Customers where Id = ?", vec![Value::Integer(7)])
            .await
            .unwrap();

        assert_eq!(rows[0].get("city"), Some(&Value::from("SF")));
        assert_eq!(provider.state.executed()[0].params(), &[Value::Integer(7)]);
    }
}
