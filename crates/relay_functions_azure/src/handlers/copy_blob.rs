use relay_functions_core::blob_names::{destination_blob_name, PLACEHOLDER_CONTENTS};
use relay_functions_core::contract::{content_digest, SourceSelection};
use tracing::info;
use uuid::Uuid;

use super::HandlerError;
use crate::adapters::blob_store::{BlobContainer, LeaseDuration, LeaseId, LeaseState};
use crate::adapters::AdapterError;

const COMPONENT: &str = "copy_blob";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyInvocation {
    /// Timestamp-derived name of this invocation's source placeholder.
    pub source_blob_name: String,
    pub selection: SourceSelection,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopiedBlob {
    pub source_blob: String,
    pub destination_blob: String,
    pub bytes_copied: u64,
    pub digest: String,
    pub lease_id: LeaseId,
    pub final_lease_state: LeaseState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyReport {
    pub source_placeholder: String,
    pub destination_placeholder: String,
    /// `None` when the selected source blob did not exist.
    pub copy: Option<CopiedBlob>,
}

/// Provisions both containers, then duplicates the selected source blob
/// into the destination container while holding an infinite lease on it.
///
/// Once the lease is acquired it is inspected and broken on every exit path.
pub async fn handle_copy_blob(
    invocation: &CopyInvocation,
    source: &impl BlobContainer,
    destination: &impl BlobContainer,
    mut new_id: impl FnMut() -> Uuid + Send,
) -> Result<CopyReport, HandlerError> {
    let result = run_copy(invocation, source, destination, &mut new_id).await;
    if let Err(error) = &result {
        info!(component = COMPONENT, event = "copy_failed", error = %error, "{error}");
    }
    result
}

/// Runs [`handle_copy_blob`] on its own task. The copy, including the lease
/// release, runs to completion even when the caller is dropped.
pub async fn spawn_copy_blob<S, D, I>(
    invocation: CopyInvocation,
    source: S,
    destination: D,
    new_id: I,
) -> Result<CopyReport, HandlerError>
where
    S: BlobContainer + 'static,
    D: BlobContainer + 'static,
    I: FnMut() -> Uuid + Send + 'static,
{
    tokio::spawn(async move { handle_copy_blob(&invocation, &source, &destination, new_id).await })
        .await
        .map_err(HandlerError::Interrupted)?
}

async fn run_copy(
    invocation: &CopyInvocation,
    source: &impl BlobContainer,
    destination: &impl BlobContainer,
    new_id: &mut (impl FnMut() -> Uuid + Send),
) -> Result<CopyReport, HandlerError> {
    let source_placeholder = invocation.source_blob_name.clone();
    provision_placeholder(source, &source_placeholder).await?;
    info!(
        component = COMPONENT,
        event = "source_blob_created",
        container = source.container_name(),
        blob = %source_placeholder,
        "Source blob created"
    );

    let destination_placeholder = destination_blob_name(new_id(), &source_placeholder);
    provision_placeholder(destination, &destination_placeholder).await?;
    info!(
        component = COMPONENT,
        event = "destination_blob_created",
        container = destination.container_name(),
        blob = %destination_placeholder,
        "Dest blob created"
    );

    let source_blob = select_source_blob(&invocation.selection, source, &source_placeholder).await?;
    let exists = source
        .blob_exists(&source_blob)
        .await
        .map_err(HandlerError::storage("check source blob"))?;
    if !exists {
        info!(
            component = COMPONENT,
            event = "source_blob_missing",
            blob = %source_blob,
            "Source blob {source_blob} does not exist; nothing to copy"
        );
        return Ok(CopyReport {
            source_placeholder,
            destination_placeholder,
            copy: None,
        });
    }

    let lease = source
        .acquire_lease(&source_blob, LeaseDuration::Infinite)
        .await
        .map_err(HandlerError::storage("acquire source lease"))?;

    let copied = copy_under_lease(source, destination, &source_blob, &lease, new_id()).await;
    let released = release_lease(source, &source_blob, &lease).await;

    let copy = match (copied, released) {
        (Ok(mut copied), Ok(final_state)) => {
            copied.final_lease_state = final_state;
            copied
        }
        (Ok(_), Err(release_error)) => return Err(release_error),
        (Err(copy_error), Ok(_)) => return Err(copy_error),
        (Err(copy_error), Err(release_error)) => {
            info!(
                component = COMPONENT,
                event = "lease_release_failed",
                blob = %source_blob,
                error = %release_error,
                "{release_error}"
            );
            return Err(copy_error);
        }
    };

    Ok(CopyReport {
        source_placeholder,
        destination_placeholder,
        copy: Some(copy),
    })
}

async fn provision_placeholder(
    container: &impl BlobContainer,
    blob: &str,
) -> Result<(), HandlerError> {
    container
        .create_if_not_exists()
        .await
        .map_err(HandlerError::storage("create container"))?;
    container
        .upload_blob(blob, PLACEHOLDER_CONTENTS.to_vec())
        .await
        .map_err(HandlerError::storage("upload placeholder blob"))
}

async fn select_source_blob(
    selection: &SourceSelection,
    source: &impl BlobContainer,
    just_uploaded: &str,
) -> Result<String, HandlerError> {
    match selection {
        SourceSelection::JustUploaded => Ok(just_uploaded.to_string()),
        SourceSelection::Named(name) => Ok(name.clone()),
        SourceSelection::FirstListed => source
            .list_blob_names()
            .await
            .map_err(HandlerError::storage("list source blobs"))?
            .into_iter()
            .next()
            .ok_or_else(|| HandlerError::NoSourceBlob {
                container: source.container_name().to_string(),
            }),
    }
}

async fn copy_under_lease(
    source: &impl BlobContainer,
    destination: &impl BlobContainer,
    source_blob: &str,
    lease: &LeaseId,
    copy_id: Uuid,
) -> Result<CopiedBlob, HandlerError> {
    let source_properties = source
        .blob_properties(source_blob)
        .await
        .map_err(HandlerError::storage("read source properties"))?;
    info!(
        component = COMPONENT,
        event = "source_lease_acquired",
        blob = %source_blob,
        lease_id = %lease,
        lease_state = %source_properties.lease_state,
        "Lease state: {}",
        source_properties.lease_state
    );

    let bytes = source
        .download_blob(source_blob)
        .await
        .map_err(HandlerError::storage("download source blob"))?;
    let digest = content_digest(&bytes);
    let bytes_copied = bytes.len() as u64;

    let destination_blob = destination_blob_name(copy_id, source_blob);
    destination
        .upload_blob(&destination_blob, bytes)
        .await
        .map_err(HandlerError::storage("upload destination blob"))?;

    let destination_properties = destination
        .blob_properties(&destination_blob)
        .await
        .map_err(HandlerError::storage("read destination properties"))?;
    let copy_status = destination_properties.copy_status.as_deref().unwrap_or("");
    let copy_progress = destination_properties.copy_progress.as_deref().unwrap_or("");
    let completed_on = destination_properties
        .copy_completed_on
        .as_deref()
        .unwrap_or("");
    info!(component = COMPONENT, event = "copy_status", blob = %destination_blob, "Copy status: {copy_status}");
    info!(component = COMPONENT, event = "copy_progress", blob = %destination_blob, "Copy progress: {copy_progress}");
    info!(component = COMPONENT, event = "copy_completion_time", blob = %destination_blob, "Completion time: {completed_on}");
    info!(
        component = COMPONENT,
        event = "copy_total_bytes",
        blob = %destination_blob,
        total_bytes = destination_properties.content_length,
        "Total bytes: {}",
        destination_properties.content_length
    );

    let copied_digest = content_digest(
        &destination
            .download_blob(&destination_blob)
            .await
            .map_err(HandlerError::storage("verify destination blob"))?,
    );
    if copied_digest != digest {
        return Err(HandlerError::DigestMismatch {
            destination: destination_blob,
            expected: digest,
            actual: copied_digest,
        });
    }
    info!(
        component = COMPONENT,
        event = "copy_verified",
        source_blob = %source_blob,
        destination_blob = %destination_blob,
        sha256 = %digest,
        bytes_copied,
        "Copied {source_blob} to {destination_blob}"
    );

    Ok(CopiedBlob {
        source_blob: source_blob.to_string(),
        destination_blob,
        bytes_copied,
        digest,
        lease_id: lease.clone(),
        final_lease_state: source_properties.lease_state,
    })
}

/// Breaks the lease whenever it is still held, or when its state could not
/// be read.
async fn release_lease(
    source: &impl BlobContainer,
    blob: &str,
    lease: &LeaseId,
) -> Result<LeaseState, HandlerError> {
    let release_error = |source: AdapterError| HandlerError::LeaseRelease {
        blob: blob.to_string(),
        source,
    };

    let inspected = match source.blob_properties(blob).await {
        Ok(properties) if properties.lease_state != LeaseState::Leased => {
            return Ok(properties.lease_state);
        }
        Ok(_) => true,
        Err(error) => {
            info!(
                component = COMPONENT,
                event = "lease_inspection_failed",
                blob = %blob,
                lease_id = %lease,
                error = %error,
                "Could not read lease state of {blob}; breaking anyway"
            );
            false
        }
    };

    match source.break_lease(blob).await {
        Ok(()) => {}
        Err(error) if !inspected && error.is_lease_not_present() => {}
        Err(error) => return Err(release_error(error)),
    }
    let properties = source.blob_properties(blob).await.map_err(release_error)?;
    info!(
        component = COMPONENT,
        event = "source_lease_broken",
        blob = %blob,
        lease_id = %lease,
        lease_state = %properties.lease_state,
        "Lease state: {}",
        properties.lease_state
    );
    Ok(properties.lease_state)
}
