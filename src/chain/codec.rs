// JSON form of a ledger, as served to peers and written to disk

use crate::chain::Blockchain;
use crate::consensus::{ChainParams, ValidationError};
use crate::core::{Block, Transaction};
use crate::storage::{UnspentOutput, UtxoSet};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed blockchain JSON: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("invalid blockchain: {0}")]
    Invalid(#[from] ValidationError),
}

/// `{ blocks, pendingTransactions, unspentTransactions }`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainSnapshot {
    pub blocks: Vec<Block>,
    #[serde(default)]
    pub pending_transactions: Vec<Transaction>,
    #[serde(default)]
    pub unspent_transactions: Vec<UnspentOutput>,
}

impl Blockchain {
    pub fn snapshot(&self) -> ChainSnapshot {
        ChainSnapshot {
            blocks: self.blocks().to_vec(),
            pending_transactions: self.pending_transactions().to_vec(),
            unspent_transactions: self.utxo_set().to_entries(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.snapshot())
    }

    /// Rebuild a ledger from a snapshot by replaying every block from
    /// genesis. The recorded unspent set is only compared, never trusted.
    /// Pending transactions that no longer apply are dropped.
    pub fn from_snapshot(snapshot: ChainSnapshot, params: ChainParams) -> Result<Self, DecodeError> {
        let mut blocks = snapshot.blocks.into_iter();
        let genesis = blocks.next().ok_or(ValidationError::EmptyChain)?;
        if genesis != Block::genesis() {
            return Err(ValidationError::InvalidGenesis(genesis.hash).into());
        }

        let mut chain = Blockchain::new(params);
        for block in blocks {
            chain.validate_new_block(&block)?;
            chain.add_block(block);
        }

        for tx in snapshot.pending_transactions {
            let id = tx.id;
            if let Err(e) = chain.add_transaction(tx) {
                log::warn!("Dropping pending transaction {}: {}", id, e);
            }
        }

        let recorded = UtxoSet::from_entries(&snapshot.unspent_transactions);
        if !snapshot.unspent_transactions.is_empty() && &recorded != chain.utxo_set() {
            log::warn!(
                "Recorded unspent outputs ({}) differ from replayed ones ({}); using replay",
                recorded.count(),
                chain.utxo_set().count()
            );
        }

        Ok(chain)
    }

    pub fn from_json(json: &str, params: ChainParams) -> Result<Self, DecodeError> {
        let snapshot: ChainSnapshot = serde_json::from_str(json)?;
        Self::from_snapshot(snapshot, params)
    }
}
