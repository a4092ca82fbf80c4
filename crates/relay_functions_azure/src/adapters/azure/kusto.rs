//! Azure Data Explorer (Kusto) query client over the v1 REST endpoint.

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::Response;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::adapters::query::{QueryProvider, QueryTable};
use crate::adapters::AdapterError;

pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";
const APP_NAME: &str = "relay-functions";

#[derive(Clone)]
pub enum KustoAuth {
    StaticToken(String),
    ClientSecret {
        authority_host: String,
        tenant_id: String,
        client_id: String,
        client_secret: String,
    },
}

impl std::fmt::Debug for KustoAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StaticToken(_) => f.write_str("StaticToken(<redacted>)"),
            Self::ClientSecret {
                tenant_id,
                client_id,
                ..
            } => f
                .debug_struct("ClientSecret")
                .field("tenant_id", tenant_id)
                .field("client_id", client_id)
                .finish_non_exhaustive(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct KustoQueryProvider {
    http: reqwest::Client,
    cluster_url: String,
    auth: KustoAuth,
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    db: &'a str,
    csl: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct V1Response {
    #[serde(rename = "Tables")]
    tables: Vec<V1Table>,
}

#[derive(Deserialize)]
struct V1Table {
    #[serde(rename = "Columns", default)]
    columns: Vec<V1Column>,
    #[serde(rename = "Rows", default)]
    rows: Vec<Vec<Value>>,
}

#[derive(Deserialize)]
struct V1Column {
    #[serde(rename = "ColumnName")]
    name: String,
}

impl KustoQueryProvider {
    pub fn new(http: reqwest::Client, cluster_url: &str, auth: KustoAuth) -> Self {
        Self {
            http,
            cluster_url: cluster_url.trim_end_matches('/').to_string(),
            auth,
        }
    }

    async fn access_token(&self) -> Result<String, AdapterError> {
        let (authority_host, tenant_id, client_id, client_secret) = match &self.auth {
            KustoAuth::StaticToken(token) => return Ok(token.clone()),
            KustoAuth::ClientSecret {
                authority_host,
                tenant_id,
                client_id,
                client_secret,
            } => (authority_host, tenant_id, client_id, client_secret),
        };

        let scope = format!("{}/.default", self.cluster_url);
        let response = self
            .http
            .post(format!(
                "{}/{tenant_id}/oauth2/v2.0/token",
                authority_host.trim_end_matches('/')
            ))
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", client_id.as_str()),
                ("client_secret", client_secret.as_str()),
                ("scope", scope.as_str()),
            ])
            .send()
            .await
            .map_err(AdapterError::transport("acquire query token"))?;

        if !response.status().is_success() {
            return Err(service_error("acquire query token", response).await);
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|error| AdapterError::decode("acquire query token", error))?;
        Ok(token.access_token)
    }
}

#[async_trait]
impl QueryProvider for KustoQueryProvider {
    async fn execute_query(
        &self,
        database: &str,
        query: &str,
        client_request_id: &str,
    ) -> Result<QueryTable, AdapterError> {
        let token = self.access_token().await?;
        let response = self
            .http
            .post(format!("{}/v1/rest/query", self.cluster_url))
            .bearer_auth(token)
            .header(ACCEPT, "application/json")
            .header("x-ms-client-request-id", client_request_id)
            .header("x-ms-app", APP_NAME)
            .json(&QueryRequest {
                db: database,
                csl: query,
            })
            .send()
            .await
            .map_err(AdapterError::transport("execute query"))?;

        if !response.status().is_success() {
            return Err(service_error("execute query", response).await);
        }

        let body: V1Response = response
            .json()
            .await
            .map_err(|error| AdapterError::decode("execute query", error))?;
        primary_table(body)
    }
}

fn primary_table(response: V1Response) -> Result<QueryTable, AdapterError> {
    let Some(table) = response.tables.into_iter().next() else {
        return Err(AdapterError::decode(
            "execute query",
            "response contains no tables",
        ));
    };

    Ok(QueryTable {
        columns: table.columns.into_iter().map(|column| column.name).collect(),
        rows: table.rows,
    })
}

async fn service_error(operation: &'static str, response: Response) -> AdapterError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let parsed: Option<Value> = serde_json::from_str(&body).ok();

    let code = parsed
        .as_ref()
        .and_then(|value| value.pointer("/error/code").or_else(|| value.get("error")))
        .and_then(Value::as_str)
        .unwrap_or("Unknown")
        .to_string();
    let message = parsed
        .as_ref()
        .and_then(|value| {
            value
                .pointer("/error/message")
                .or_else(|| value.get("error_description"))
        })
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or(body);

    AdapterError::Service {
        operation,
        status,
        code,
        message,
    }
}
