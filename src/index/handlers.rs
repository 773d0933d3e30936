use super::manager::{IndexManager, IndexStats};
use super::protocol::*;
use super::types::{IndexEntry, TrieKey};

use axum::{Extension, Json, extract::Path, http::StatusCode};
use std::sync::Arc;

pub async fn handle_insert(
    Extension(manager): Extension<Arc<IndexManager>>,
    Json(req): Json<InsertRequest>,
) -> (StatusCode, Json<InsertResponse>) {
    // Storing touches the bulk buffers; keep it off the async workers.
    let inserted = tokio::task::spawn_blocking(move || {
        let entries: Vec<IndexEntry> = req
            .items
            .iter()
            .map(|item| manager.create_entry(&item.type_name, &item.payload))
            .collect();
        manager.insert(entries.clone(), req.propagate);
        entries
    })
    .await;

    match inserted {
        Ok(entries) => {
            tracing::info!("Inserted {} entries via API", entries.len());
            (StatusCode::OK, Json(InsertResponse { entries }))
        }
        Err(e) => {
            tracing::error!("Insert task failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(InsertResponse { entries: vec![] }),
            )
        }
    }
}

pub async fn handle_update(
    Extension(manager): Extension<Arc<IndexManager>>,
    Json(req): Json<UpdateRequest>,
) -> (StatusCode, Json<ChangeResponse>) {
    let changed = tokio::task::spawn_blocking(move || {
        let mut unknown = Vec::new();
        let mut updated = Vec::new();

        for item in req.items {
            match manager.get(&item.id) {
                Some(stored) => {
                    let key = manager.keys().generate(stored.type_name(), &item.payload);
                    updated.push(stored.with_payload(item.payload, key));
                }
                None => unknown.push(item.id),
            }
        }

        let accepted = updated.len();
        manager.update(updated);
        ChangeResponse { accepted, unknown }
    })
    .await;

    change_result("Update", changed)
}

pub async fn handle_delete(
    Extension(manager): Extension<Arc<IndexManager>>,
    Json(req): Json<DeleteRequest>,
) -> (StatusCode, Json<ChangeResponse>) {
    let changed = tokio::task::spawn_blocking(move || {
        let mut unknown = Vec::new();
        let mut removed = Vec::new();

        for id in req.ids {
            match manager.get(&id) {
                Some(stored) => removed.push(stored),
                None => unknown.push(id),
            }
        }

        let accepted = removed.len();
        manager.delete(removed, req.propagate);
        ChangeResponse { accepted, unknown }
    })
    .await;

    change_result("Delete", changed)
}

fn change_result(
    action: &str,
    result: Result<ChangeResponse, tokio::task::JoinError>,
) -> (StatusCode, Json<ChangeResponse>) {
    match result {
        Ok(response) => (StatusCode::OK, Json(response)),
        Err(e) => {
            tracing::error!("{} task failed: {}", action, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ChangeResponse {
                    accepted: 0,
                    unknown: vec![],
                }),
            )
        }
    }
}

pub async fn handle_query(
    Extension(manager): Extension<Arc<IndexManager>>,
    Path(prefix): Path<String>,
) -> (StatusCode, Json<QueryResponse>) {
    let prefix: TrieKey = match prefix.parse() {
        Ok(key) => key,
        Err(e) => {
            tracing::error!("Failed to parse query prefix: {}", e);
            return (
                StatusCode::BAD_REQUEST,
                Json(QueryResponse { entries: vec![] }),
            );
        }
    };

    let entries = manager.query(&prefix);
    (StatusCode::OK, Json(QueryResponse { entries }))
}

pub async fn handle_stats(
    Extension(manager): Extension<Arc<IndexManager>>,
) -> Result<Json<IndexStats>, StatusCode> {
    match tokio::task::spawn_blocking(move || manager.stats()).await {
        Ok(stats) => Ok(Json(stats)),
        Err(e) => {
            tracing::error!("Stats task failed: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
