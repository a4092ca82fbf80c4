use relay_functions_core::audit::{check_columns, AuditRecord, AUDIT_QUERY};
use relay_functions_core::batch::EventData;
use relay_functions_core::contract::{greeting_message, FunctionRequest};
use tracing::info;

use super::HandlerError;
use crate::adapters::event_stream::{EventProducer, ProducerFactory};
use crate::adapters::query::QueryProvider;

const COMPONENT: &str = "publish_audit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReport {
    pub events_published: usize,
    pub batch_bytes: usize,
    pub message: String,
}

/// Runs the audit query and publishes every row as one event batch.
///
/// The producer is opened for this invocation only and closed on every
/// path once opened. A row that does not fit the batch aborts the
/// invocation before anything is sent.
pub async fn handle_publish_audit<F: ProducerFactory>(
    request: &FunctionRequest,
    database: &str,
    queries: &impl QueryProvider,
    producers: &F,
    client_request_id: &str,
) -> Result<PublishReport, HandlerError> {
    let result = run_publish(request, database, queries, producers, client_request_id).await;
    if let Err(error) = &result {
        info!(component = COMPONENT, event = "publish_failed", error = %error, "{error}");
    }
    result
}

async fn run_publish<F: ProducerFactory>(
    request: &FunctionRequest,
    database: &str,
    queries: &impl QueryProvider,
    producers: &F,
    client_request_id: &str,
) -> Result<PublishReport, HandlerError> {
    let name = request
        .field("name")
        .map_err(|error| HandlerError::Request(error.message().to_string()))?;

    let mut producer = producers
        .open_producer()
        .await
        .map_err(HandlerError::Publish)?;
    let published = publish_rows(&producer, database, queries, client_request_id).await;
    let closed = producer.close().await;

    let (events_published, batch_bytes) = match (published, closed) {
        (Ok(published), Ok(())) => published,
        (Ok(_), Err(close_error)) => return Err(HandlerError::Publish(close_error)),
        (Err(error), Ok(())) => return Err(error),
        (Err(error), Err(close_error)) => {
            info!(
                component = COMPONENT,
                event = "producer_close_failed",
                error = %close_error,
                "{close_error}"
            );
            return Err(error);
        }
    };

    Ok(PublishReport {
        events_published,
        batch_bytes,
        message: greeting_message(name.as_deref()),
    })
}

async fn publish_rows<P: EventProducer>(
    producer: &P,
    database: &str,
    queries: &impl QueryProvider,
    client_request_id: &str,
) -> Result<(usize, usize), HandlerError> {
    let mut batch = producer.create_batch().await.map_err(HandlerError::Publish)?;

    let table = queries
        .execute_query(database, AUDIT_QUERY, client_request_id)
        .await
        .map_err(HandlerError::Query)?;
    info!(
        component = COMPONENT,
        event = "query_completed",
        client_request_id,
        rows = table.rows.len(),
        "Audit query returned {} rows",
        table.rows.len()
    );
    check_columns(&table.columns)
        .map_err(|error| HandlerError::UnexpectedColumns(error.message().to_string()))?;

    for (index, row) in table.rows.iter().enumerate() {
        let record = AuditRecord::from_row(row).map_err(|error| HandlerError::InvalidRow {
            index,
            message: error.message().to_string(),
        })?;
        let line = record.to_event_line();
        info!(component = COMPONENT, event = "audit_record", "{line}");

        if !batch.try_add(EventData::from(line.clone())) {
            return Err(HandlerError::EventTooLarge { event: line });
        }
    }

    let events = batch.len();
    let batch_bytes = batch.size_in_bytes();
    producer
        .send_batch(batch)
        .await
        .map_err(HandlerError::Publish)?;
    info!(
        component = COMPONENT,
        event = "batch_published",
        events,
        batch_bytes,
        "A batch of {events} events has been published."
    );

    Ok((events, batch_bytes))
}
