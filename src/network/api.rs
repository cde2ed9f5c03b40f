// HTTP routes a node serves to peers and wallets

use crate::core::Address;
use crate::network::message::{Envelope, ADD_BLOCK_PATH, ADD_PEER_PATH, BALANCE_PATH, BLOCKCHAIN_PATH, TRANSACTIONS_PATH};
use crate::network::node::{Disposition, Node, NodeError};
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(Deserialize)]
struct BalanceQuery {
    address: String,
}

#[derive(Serialize)]
struct BalanceResponse {
    address: String,
    balance: u64,
}

impl IntoResponse for Disposition {
    fn into_response(self) -> Response {
        let status = match self {
            Disposition::Rejected(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::OK,
        };
        (status, Json(self)).into_response()
    }
}

pub fn build_router(node: Arc<Node>) -> Router {
    Router::new()
        .route(BLOCKCHAIN_PATH, get(get_blockchain))
        .route(ADD_BLOCK_PATH, post(add_block))
        .route(TRANSACTIONS_PATH, post(add_transaction))
        .route(BALANCE_PATH, get(get_balance))
        .route(ADD_PEER_PATH, post(add_peer))
        .with_state(node)
}

/// Serve the node's routes on an already bound listener
pub async fn serve(listener: TcpListener, node: Arc<Node>) -> Result<(), NodeError> {
    axum::serve(listener, build_router(node)).await?;
    Ok(())
}

/// Bind `host:port` from the node's config and serve until the process ends
pub async fn run_api_server(node: Arc<Node>) -> Result<(), NodeError> {
    let config = node.config();
    let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
    log::info!("Listening on {}", node.url());
    serve(listener, node).await
}

async fn get_blockchain(State(node): State<Arc<Node>>) -> Response {
    match node.chain_json().await {
        Ok(json) => ([(header::CONTENT_TYPE, "application/json")], json).into_response(),
        Err(e) => {
            log::error!("Failed to encode blockchain: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn add_block(State(node): State<Arc<Node>>, Json(envelope): Json<Envelope>) -> Disposition {
    node.handle_block(envelope).await
}

async fn add_transaction(State(node): State<Arc<Node>>, Json(envelope): Json<Envelope>) -> Disposition {
    node.handle_transaction(envelope).await
}

async fn add_peer(State(node): State<Arc<Node>>, Json(envelope): Json<Envelope>) -> Disposition {
    node.handle_add_peer(envelope).await
}

async fn get_balance(State(node): State<Arc<Node>>, Query(query): Query<BalanceQuery>) -> Json<BalanceResponse> {
    let address = Address::new(query.address);
    let balance = node.get_balance(&address).await;
    Json(BalanceResponse {
        address: address.0,
        balance,
    })
}
