//! Azure Functions custom handler routes.
//!
//! The Functions host forwards each HTTP trigger to `/api/{FunctionName}` on
//! the port in `FUNCTIONS_CUSTOMHANDLER_PORT`. Adapters are built per
//! invocation from the shared configuration and HTTP connection pool.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use chrono::Local;
use relay_functions_core::blob_names::source_blob_name;
use relay_functions_core::contract::{FunctionRequest, SourceSelection, COPY_COMPLETED_MESSAGE};
use tracing::info;
use uuid::Uuid;

use crate::adapters::azure::event_hubs::EventHubProducerFactory;
use crate::adapters::azure::kusto::KustoQueryProvider;
use crate::adapters::azure::storage::AzureBlobContainer;
use crate::config::{FunctionsConfig, StorageAccountConfig};
use crate::handlers::copy_blob::{spawn_copy_blob, CopyInvocation, CopyReport};
use crate::handlers::publish_audit::{handle_publish_audit, PublishReport};
use crate::handlers::HandlerError;

const COMPONENT: &str = "function_host";

#[derive(Debug, Clone)]
pub struct AppState {
    config: Arc<FunctionsConfig>,
    http: reqwest::Client,
}

impl AppState {
    pub fn new(config: FunctionsConfig, http: reqwest::Client) -> Self {
        Self {
            config: Arc::new(config),
            http,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/CopyBlob", get(copy_blob).post(copy_blob))
        .route(
            "/api/PublishAuditEvents",
            get(publish_audit_events).post(publish_audit_events),
        )
        .with_state(state)
}

async fn copy_blob(
    State(state): State<AppState>,
    Query(query): Query<Vec<(String, String)>>,
    body: Bytes,
) -> Response {
    log_invocation("CopyBlob");
    let request = FunctionRequest::new(query, body.to_vec());

    match run_copy_blob(&state, &request).await {
        Ok(report) => {
            if let Some(copy) = &report.copy {
                info!(
                    component = COMPONENT,
                    event = "copy_completed",
                    source_blob = %copy.source_blob,
                    destination_blob = %copy.destination_blob,
                    bytes_copied = copy.bytes_copied,
                    lease_state = %copy.final_lease_state,
                    "CopyBlob completed"
                );
            }
            plain_text(COPY_COMPLETED_MESSAGE.to_string())
        }
        Err(_) => invocation_failed("CopyBlob"),
    }
}

async fn run_copy_blob(
    state: &AppState,
    request: &FunctionRequest,
) -> Result<CopyReport, HandlerError> {
    let config = &state.config.copy;
    let selection = SourceSelection::for_request(request, &config.source_selection)
        .map_err(|error| HandlerError::Request(error.message().to_string()))?;
    let invocation = CopyInvocation {
        source_blob_name: source_blob_name(&Local::now()),
        selection,
    };

    let container = |account: &StorageAccountConfig| {
        AzureBlobContainer::new(
            state.http.clone(),
            &config.endpoint_template,
            &account.account,
            &config.container,
            account.credential.clone(),
        )
    };
    let source = container(&config.source);
    let destination = container(&config.destination);

    spawn_copy_blob(invocation, source, destination, Uuid::new_v4).await
}

async fn publish_audit_events(
    State(state): State<AppState>,
    Query(query): Query<Vec<(String, String)>>,
    body: Bytes,
) -> Response {
    log_invocation("PublishAuditEvents");
    let request = FunctionRequest::new(query, body.to_vec());

    match run_publish_audit(&state, &request).await {
        Ok(report) => plain_text(report.message),
        Err(_) => invocation_failed("PublishAuditEvents"),
    }
}

async fn run_publish_audit(
    state: &AppState,
    request: &FunctionRequest,
) -> Result<PublishReport, HandlerError> {
    let config = &state.config.publish;
    let queries = KustoQueryProvider::new(
        state.http.clone(),
        &config.cluster_url,
        config.query_auth.clone(),
    );
    let producers = EventHubProducerFactory::new(
        state.http.clone(),
        &config.event_hub,
        &config.hub_name,
        config.max_batch_bytes,
    );
    let client_request_id = Uuid::new_v4().to_string();

    handle_publish_audit(
        request,
        &config.database,
        &queries,
        &producers,
        &client_request_id,
    )
    .await
}

fn log_invocation(function: &'static str) {
    info!(
        component = COMPONENT,
        event = "invocation_started",
        function,
        "HTTP trigger function processed a request."
    );
}

fn plain_text(message: String) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        message,
    )
        .into_response()
}

/// The host surfaces failures as a bare 500; the cause is already logged.
fn invocation_failed(function: &'static str) -> Response {
    info!(
        component = COMPONENT,
        event = "invocation_failed",
        function,
        "{function} failed"
    );
    StatusCode::INTERNAL_SERVER_ERROR.into_response()
}
