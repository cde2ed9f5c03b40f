// Transaction builder

use crate::core::{Address, Transaction, TxIn, TxOut};
use crate::storage::{OutPoint, UtxoSet};
use crate::wallet::{KeyPair, Keystore, WalletError};

/// Transaction builder
pub struct TransactionBuilder<'a> {
    keystore: &'a Keystore,
    utxo_set: &'a UtxoSet,
}

impl<'a> TransactionBuilder<'a> {
    /// Create a new transaction builder
    pub fn new(keystore: &'a Keystore, utxo_set: &'a UtxoSet) -> Self {
        Self { keystore, utxo_set }
    }

    /// Build a signed transaction sending `amount` from `from` to `to`.
    /// Any excess of the selected outputs comes back to `from` as change.
    pub fn build(&self, from: &Address, to: &Address, amount: u64) -> Result<Transaction, WalletError> {
        if amount == 0 {
            return Err(WalletError::ZeroAmount);
        }

        // Get keypair for sender
        let keypair = self.keystore
            .get_keypair(from)
            .ok_or_else(|| WalletError::UnknownAddress(from.clone()))?;

        let utxos = self.utxo_set.get_utxos_for_address(from);
        let (selected, total_input) = Self::select_utxos(&utxos, amount)?;

        let inputs = Self::signed_inputs(&selected, keypair);

        let mut outputs = vec![TxOut::new(to.clone(), amount)];
        let change = total_input - amount;
        if change > 0 {
            outputs.push(TxOut::new(from.clone(), change));
        }

        Ok(Transaction::new(inputs, outputs))
    }

    /// Greedy selection in outpoint order until `target` is covered
    fn select_utxos(utxos: &[(OutPoint, TxOut)], target: u64) -> Result<(Vec<(OutPoint, TxOut)>, u64), WalletError> {
        let mut selected = Vec::new();
        let mut total = 0u64;

        for (outpoint, output) in utxos {
            selected.push((*outpoint, output.clone()));
            total = total.saturating_add(output.amount);

            if total >= target {
                return Ok((selected, total));
            }
        }

        Err(WalletError::InsufficientFunds { have: total, need: target })
    }

    /// One input per selected output, each signed on its own digest
    fn signed_inputs(selected: &[(OutPoint, TxOut)], keypair: &KeyPair) -> Vec<TxIn> {
        selected
            .iter()
            .map(|(outpoint, output)| {
                let mut input = TxIn::new(
                    outpoint.tx_out_id,
                    outpoint.tx_out_index,
                    output.amount,
                    output.address.clone(),
                );
                input.sign(&keypair.secret_key);
                input
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Hash256;

    #[test]
    fn test_transaction_builder() {
        let mut keystore = Keystore::new();
        let mut utxo_set = UtxoSet::new();

        let addr1 = keystore.new_address();
        let addr2 = keystore.new_address();

        utxo_set.add_utxo(OutPoint::new(Hash256::new([1; 32]), 0), TxOut::new(addr1.clone(), 100));

        let builder = TransactionBuilder::new(&keystore, &utxo_set);
        let tx = builder.build(&addr1, &addr2, 40).unwrap();

        assert_eq!(tx.inputs.len(), 1);
        assert_eq!(tx.outputs.len(), 2); // Payment + change
        assert_eq!(tx.outputs[0], TxOut::new(addr2, 40));
        assert_eq!(tx.outputs[1], TxOut::new(addr1, 60));
        assert_eq!(tx.validate(10), Ok(()));
    }

    #[test]
    fn test_exact_amount_has_no_change() {
        let mut keystore = Keystore::new();
        let mut utxo_set = UtxoSet::new();

        let addr1 = keystore.new_address();
        let addr2 = keystore.new_address();
        utxo_set.add_utxo(OutPoint::new(Hash256::new([1; 32]), 0), TxOut::new(addr1.clone(), 30));
        utxo_set.add_utxo(OutPoint::new(Hash256::new([2; 32]), 0), TxOut::new(addr1.clone(), 20));

        let builder = TransactionBuilder::new(&keystore, &utxo_set);
        let tx = builder.build(&addr1, &addr2, 50).unwrap();

        assert_eq!(tx.inputs.len(), 2);
        assert_eq!(tx.outputs.len(), 1);
        assert_eq!(tx.total_input_value(), Some(50));
    }

    #[test]
    fn test_insufficient_funds() {
        let mut keystore = Keystore::new();
        let mut utxo_set = UtxoSet::new();

        let addr1 = keystore.new_address();
        let addr2 = keystore.new_address();
        utxo_set.add_utxo(OutPoint::new(Hash256::new([1; 32]), 0), TxOut::new(addr1.clone(), 10));

        let builder = TransactionBuilder::new(&keystore, &utxo_set);
        let result = builder.build(&addr1, &addr2, 50);

        assert!(matches!(result, Err(WalletError::InsufficientFunds { have: 10, need: 50 })));
    }

    #[test]
    fn test_unknown_sender() {
        let keystore = Keystore::new();
        let utxo_set = UtxoSet::new();
        let builder = TransactionBuilder::new(&keystore, &utxo_set);

        let result = builder.build(&Address::from("nobody"), &Address::from("bob"), 1);
        assert!(matches!(result, Err(WalletError::UnknownAddress(_))));
    }
}
