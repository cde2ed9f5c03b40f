// UTXO (Unspent Transaction Output) set management

use crate::core::{Address, Hash256, Transaction, TxOut};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// UTXO identifier - transaction id + output index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutPoint {
    pub tx_out_id: Hash256,
    pub tx_out_index: u32,
}

impl OutPoint {
    pub fn new(tx_out_id: Hash256, tx_out_index: u32) -> Self {
        Self { tx_out_id, tx_out_index }
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.tx_out_id, self.tx_out_index)
    }
}

/// One unspent output as it appears on the wire and in the chain file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnspentOutput {
    pub tx_out_id: Hash256,
    pub tx_out_index: u32,
    pub address: Address,
    pub amount: u64,
}

/// Unspent outputs keyed by (transaction id, output index)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UtxoSet {
    entries: BTreeMap<OutPoint, TxOut>,
}

impl UtxoSet {
    /// Create an empty UTXO set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a UTXO
    pub fn add_utxo(&mut self, outpoint: OutPoint, output: TxOut) {
        self.entries.insert(outpoint, output);
    }

    /// Get a UTXO
    pub fn get_utxo(&self, outpoint: &OutPoint) -> Option<&TxOut> {
        self.entries.get(outpoint)
    }

    /// Remove a UTXO (spent)
    pub fn remove_utxo(&mut self, outpoint: &OutPoint) -> Option<TxOut> {
        self.entries.remove(outpoint)
    }

    /// Add every output of a transaction
    pub fn add_outputs(&mut self, tx: &Transaction) {
        for (index, output) in tx.outputs.iter().enumerate() {
            self.add_utxo(OutPoint::new(tx.id, index as u32), output.clone());
        }
    }

    /// Remove every output of a transaction, spent or not
    pub fn remove_outputs(&mut self, tx: &Transaction) {
        for index in 0..tx.outputs.len() {
            self.entries.remove(&OutPoint::new(tx.id, index as u32));
        }
    }

    /// Get balance for an address
    pub fn get_balance(&self, address: &Address) -> u64 {
        self.entries
            .values()
            .filter(|out| &out.address == address)
            .map(|out| out.amount)
            .sum()
    }

    /// Get all UTXOs owned by an address, in outpoint order
    pub fn get_utxos_for_address(&self, address: &Address) -> Vec<(OutPoint, TxOut)> {
        self.entries
            .iter()
            .filter(|(_, out)| &out.address == address)
            .map(|(outpoint, out)| (*outpoint, out.clone()))
            .collect()
    }

    /// Count total UTXOs
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn to_entries(&self) -> Vec<UnspentOutput> {
        self.entries
            .iter()
            .map(|(outpoint, out)| UnspentOutput {
                tx_out_id: outpoint.tx_out_id,
                tx_out_index: outpoint.tx_out_index,
                address: out.address.clone(),
                amount: out.amount,
            })
            .collect()
    }

    pub fn from_entries(entries: &[UnspentOutput]) -> Self {
        let entries = entries
            .iter()
            .map(|u| {
                (
                    OutPoint::new(u.tx_out_id, u.tx_out_index),
                    TxOut::new(u.address.clone(), u.amount),
                )
            })
            .collect();
        Self { entries }
    }
}
