// Proof-of-work UTXO ledger with peer gossip

pub mod core;
pub mod consensus;
pub mod storage;
pub mod chain;
pub mod wallet;
pub mod network;
pub mod config;
pub mod cli;

// Re-exports for convenience
pub use crate::core::{Address, Block, Hash256, Transaction, TransactionType, TxIn, TxOut};
pub use crate::consensus::{ChainParams, MiningControl, ValidationError};
pub use crate::storage::{ChainStore, OutPoint, UtxoSet};
pub use crate::chain::Blockchain;
pub use crate::wallet::{KeyPair, Keystore, TransactionBuilder};
pub use crate::network::{Disposition, Envelope, HttpTransport, Node, NodeError};
pub use crate::config::NodeConfig;
pub use crate::cli::Cli;
