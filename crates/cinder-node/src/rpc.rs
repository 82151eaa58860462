//! Thin HTTP surface over the node.
//!
//! Binary bodies carry the canonical block/transaction encoding; hashes and
//! addresses appear as lowercase hex in URLs and JSON. Validation failures
//! map to 400, unknown identifiers to 404, and integrity or storage
//! failures to 500.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tracing::info;

use cinder_core::codec;
use cinder_core::error::ChainError;
use cinder_core::types::{Address, Block, Hash256, Transaction};

use crate::node::Node;

#[derive(Clone)]
struct ApiState {
    node: Arc<Node>,
}

/// Build the API router.
pub fn router(node: Arc<Node>) -> Router {
    Router::new()
        .route("/tip", get(tip))
        .route("/blocks", post(submit_block))
        .route("/blocks/{hash}", get(get_block))
        .route("/blocks/from/{hash}", get(blocks_from))
        .route("/transactions", post(submit_transaction))
        .route("/utxos/{address}", get(utxos_by_address))
        .with_state(ApiState { node })
}

/// Serve the API until the process exits.
pub async fn serve(addr: &str, node: Arc<Node>) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "API server listening");
    axum::serve(listener, router(node)).await
}

fn error_response(err: &ChainError) -> Response {
    let status = match err {
        ChainError::Validation(_)
        | ChainError::Transaction(_)
        | ChainError::Codec(_)
        | ChainError::Mempool(_) => StatusCode::BAD_REQUEST,
        ChainError::NotInMainChain(_) => StatusCode::NOT_FOUND,
        ChainError::Integrity(_) | ChainError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": err.to_string() }))).into_response()
}

fn octets(bytes: Vec<u8>) -> Response {
    (
        [(header::CONTENT_TYPE, "application/octet-stream")],
        bytes,
    )
        .into_response()
}

fn not_found(what: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": format!("{what} not found") })),
    )
        .into_response()
}

fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": message })),
    )
        .into_response()
}

async fn tip(State(state): State<ApiState>) -> Response {
    let (height, hash) = state.node.tip();
    Json(json!({ "height": height, "hash": hash.to_string() })).into_response()
}

async fn submit_block(State(state): State<ApiState>, body: Bytes) -> Response {
    let block: Block = match codec::decode(&body) {
        Ok(block) => block,
        Err(e) => return error_response(&e.into()),
    };
    match state.node.submit_block(block) {
        Ok(outcome) => Json(json!({ "status": format!("{outcome:?}") })).into_response(),
        Err(e) => error_response(&e),
    }
}

async fn submit_transaction(State(state): State<ApiState>, body: Bytes) -> Response {
    let tx: Transaction = match codec::decode(&body) {
        Ok(tx) => tx,
        Err(e) => return error_response(&e.into()),
    };
    match state.node.submit_transaction(tx) {
        Ok(hash) => Json(json!({ "hash": hash.to_string() })).into_response(),
        Err(e) => error_response(&e),
    }
}

async fn get_block(State(state): State<ApiState>, Path(hash): Path<String>) -> Response {
    let Some(hash) = Hash256::from_hex(&hash) else {
        return bad_request("invalid block hash");
    };
    match state.node.chain().get_block(&hash) {
        Ok(Some(block)) => match codec::encode(&block) {
            Ok(bytes) => octets(bytes),
            Err(e) => error_response(&e.into()),
        },
        Ok(None) => not_found("block"),
        Err(e) => error_response(&e),
    }
}

async fn blocks_from(State(state): State<ApiState>, Path(hash): Path<String>) -> Response {
    let Some(hash) = Hash256::from_hex(&hash) else {
        return bad_request("invalid block hash");
    };
    match state.node.chain().get_blocks_from(&hash) {
        Ok(blocks) => match codec::encode(&blocks) {
            Ok(bytes) => octets(bytes),
            Err(e) => error_response(&e.into()),
        },
        Err(e) => error_response(&e),
    }
}

async fn utxos_by_address(
    State(state): State<ApiState>,
    Path(address): Path<String>,
) -> Response {
    let Some(address) = Address::from_hex(&address) else {
        return bad_request("invalid address");
    };
    match state.node.find_utxos(&address) {
        Ok(utxos) => {
            let entries: Vec<Value> = utxos
                .iter()
                .map(|u| {
                    json!({
                        "tx_hash": u.tx_hash.to_string(),
                        "index": u.index,
                        "value": u.output.value,
                        "address": u.output.address.to_string(),
                    })
                })
                .collect();
            Json(entries).into_response()
        }
        Err(e) => error_response(&e),
    }
}
