// Storage layer: UTXO set and the on-disk chain file

mod chain_store;
mod utxo_set;

pub use chain_store::{ChainStore, StorageError};
pub use utxo_set::{OutPoint, UnspentOutput, UtxoSet};
