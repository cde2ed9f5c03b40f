// Gossip envelope and endpoint paths

use crate::core::{Block, Transaction};
use serde::{Deserialize, Serialize};

pub const BLOCKCHAIN_PATH: &str = "/blockchain";
pub const ADD_BLOCK_PATH: &str = "/blockchain/add_block";
pub const TRANSACTIONS_PATH: &str = "/transactions";
pub const BALANCE_PATH: &str = "/transactions/balance";
pub const ADD_PEER_PATH: &str = "/node/add_peer";

/// Gossip message: `content` is a JSON document, `token` names the logical
/// message so every node processes and forwards it at most once
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub token: String,
    pub content: String,
}

impl Envelope {
    /// Wrap content under a fresh token
    pub fn new(content: String) -> Self {
        Self::with_token(uuid::Uuid::new_v4().to_string(), content)
    }

    pub fn with_token(token: String, content: String) -> Self {
        Self { token, content }
    }

    pub fn for_block(block: &Block) -> Result<Self, serde_json::Error> {
        Ok(Self::new(serde_json::to_string(block)?))
    }

    pub fn for_transaction(tx: &Transaction) -> Result<Self, serde_json::Error> {
        Ok(Self::new(serde_json::to_string(tx)?))
    }

    /// Peer URL, JSON encoded as a string
    pub fn for_peer(url: &str) -> Result<Self, serde_json::Error> {
        Ok(Self::new(serde_json::to_string(url)?))
    }

    pub fn decode_block(&self) -> Result<Block, serde_json::Error> {
        serde_json::from_str(&self.content)
    }

    pub fn decode_transaction(&self) -> Result<Transaction, serde_json::Error> {
        serde_json::from_str(&self.content)
    }

    /// Accepts the URL either JSON encoded or bare
    pub fn decode_peer(&self) -> String {
        serde_json::from_str::<String>(&self.content)
            .unwrap_or_else(|_| self.content.trim().to_string())
    }
}
