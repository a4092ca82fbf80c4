use async_trait::async_trait;
use serde_json::Value;

use super::AdapterError;

/// Primary result table of a query, rows in service order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

#[async_trait]
pub trait QueryProvider: Send + Sync {
    async fn execute_query(
        &self,
        database: &str,
        query: &str,
        client_request_id: &str,
    ) -> Result<QueryTable, AdapterError>;
}
