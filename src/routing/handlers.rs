use axum::{Json, extract::Extension, http::StatusCode};
use std::sync::Arc;

use super::protocol::{InboundPayload, RouteResponse, RoutedEnvelope};
use crate::distribution::distributor::Distributor;
use crate::distribution::types::{DistributionRequest, Payload};
use crate::index::local::LocalIndex;
use crate::storage::StorageError;
use crate::storage::bulk::TransientFile;

/// Receives a modifier message routed by another peer and queues it as a
/// remote distribution request.
pub async fn handle_route(
    Extension(distributor): Extension<Arc<Distributor>>,
    Extension(index): Extension<Arc<LocalIndex>>,
    Json(envelope): Json<RoutedEnvelope>,
) -> (StatusCode, Json<RouteResponse>) {
    let via_replica = envelope.via_replica();
    let sender = envelope.sender.clone();

    let message = match envelope.decode() {
        Ok(message) => message,
        Err(e) => {
            tracing::error!("Failed to decode message from {:?}: {:#}", sender, e);
            return (
                StatusCode::BAD_REQUEST,
                Json(RouteResponse { accepted: false }),
            );
        }
    };

    let payload = match message.payload {
        InboundPayload::Entries(entries) => Payload::Entries(entries),
        InboundPayload::Lines(lines) => match materialize(index, lines).await {
            Ok(file) => Payload::File(file),
            Err(e) => {
                tracing::error!("Failed to store bulk message {}: {:#}", message.id, e);
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(RouteResponse { accepted: false }),
                );
            }
        },
    };

    tracing::debug!(
        "Received {} message {} for {} from {:?} (replica={})",
        message.operation,
        message.id,
        message.branch_key,
        sender,
        via_replica
    );

    distributor.submit(DistributionRequest::remote(
        message.operation,
        payload,
        message.id,
        message.parent_id,
        via_replica,
    ));

    (StatusCode::OK, Json(RouteResponse { accepted: true }))
}

/// Writes received bulk lines to a transient file on the blocking pool.
async fn materialize(index: Arc<LocalIndex>, lines: Vec<String>) -> anyhow::Result<TransientFile> {
    let file = tokio::task::spawn_blocking(move || {
        let file = TransientFile::create_in(index.scratch_dir())?;
        file.append_lines(&lines)?;
        Ok::<_, StorageError>(file)
    })
    .await??;
    Ok(file)
}
