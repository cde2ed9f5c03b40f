// Transaction data structures

use crate::consensus::ValidationError;
use crate::core::{sha256, Address, Hash256};
use crate::storage::OutPoint;
use secp256k1::ecdsa::Signature;
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use serde::{Deserialize, Serialize};

/// Transaction kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    /// Value transfer between addresses
    Regular,
    /// Block reward paid to the miner
    Reward,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Regular => "regular",
            TransactionType::Reward => "reward",
        }
    }
}

/// Transaction output - specifies amount and recipient
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOut {
    pub address: Address,
    pub amount: u64,
}

impl TxOut {
    /// Create a new transaction output
    pub fn new(address: Address, amount: u64) -> Self {
        Self { address, amount }
    }
}

/// Transaction input - spends a previous transaction output.
///
/// The input repeats the amount and owner of the output it spends and is
/// signed on its own digest, so it can be checked without the spending
/// transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxIn {
    pub tx_out_id: Hash256,
    pub tx_out_index: u32,
    pub amount: u64,
    pub address: Address,
    /// DER signature, hex encoded; empty until signed
    pub signature: String,
}

impl TxIn {
    /// Create a new unsigned input
    pub fn new(tx_out_id: Hash256, tx_out_index: u32, amount: u64, address: Address) -> Self {
        Self {
            tx_out_id,
            tx_out_index,
            amount,
            address,
            signature: String::new(),
        }
    }

    /// The output this input spends
    pub fn outpoint(&self) -> OutPoint {
        OutPoint::new(self.tx_out_id, self.tx_out_index)
    }

    /// Digest of txOutId|txOutIndex|amount|address, the signed message
    pub fn hash(&self) -> Hash256 {
        let data = format!(
            "{}{}{}{}",
            self.tx_out_id, self.tx_out_index, self.amount, self.address
        );
        sha256(data.as_bytes())
    }

    /// Sign this input with the key owning `address`
    pub fn sign(&mut self, secret_key: &SecretKey) {
        let secp = Secp256k1::signing_only();
        let message = Message::from_digest(self.hash().0);
        let signature = secp.sign_ecdsa(&message, secret_key);
        self.signature = hex::encode(signature.serialize_der().to_vec());
    }

    /// Verify the signature against the address this input claims to spend from
    pub fn verify_signature(&self) -> bool {
        let Ok(pubkey_bytes) = hex::decode(self.address.as_str()) else {
            return false;
        };
        let Ok(public_key) = PublicKey::from_slice(&pubkey_bytes) else {
            return false;
        };
        let Ok(sig_bytes) = hex::decode(&self.signature) else {
            return false;
        };
        let Ok(signature) = Signature::from_der(&sig_bytes) else {
            return false;
        };

        let secp = Secp256k1::verification_only();
        let message = Message::from_digest(self.hash().0);
        secp.verify_ecdsa(&message, &signature, &public_key).is_ok()
    }
}

/// Transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Random identifier, independent of content
    pub id: Hash256,
    /// Content digest over id, type, inputs and outputs
    pub hash: Hash256,
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
    pub inputs: Vec<TxIn>,
    pub outputs: Vec<TxOut>,
}

impl Transaction {
    /// Create a new regular transaction with a fresh id.
    /// Inputs must already be signed; the hash covers their signatures.
    pub fn new(inputs: Vec<TxIn>, outputs: Vec<TxOut>) -> Self {
        Self::with_type(TransactionType::Regular, inputs, outputs)
    }

    /// Create a coinbase transaction (mining reward)
    pub fn coinbase(address: Address, reward: u64) -> Self {
        Self::with_type(TransactionType::Reward, vec![], vec![TxOut::new(address, reward)])
    }

    fn with_type(tx_type: TransactionType, inputs: Vec<TxIn>, outputs: Vec<TxOut>) -> Self {
        let mut tx = Self {
            id: Hash256::random(),
            hash: Hash256::zero(),
            tx_type,
            inputs,
            outputs,
        };
        tx.hash = tx.calculate_hash();
        tx
    }

    /// Check if this is a coinbase transaction
    pub fn is_coinbase(&self) -> bool {
        self.tx_type == TransactionType::Reward
    }

    /// SHA256 of id + type + JSON(inputs) + JSON(outputs)
    pub fn calculate_hash(&self) -> Hash256 {
        let inputs = serde_json::to_string(&self.inputs).expect("inputs serialize to JSON");
        let outputs = serde_json::to_string(&self.outputs).expect("outputs serialize to JSON");
        let data = format!("{}{}{}{}", self.id, self.tx_type.as_str(), inputs, outputs);
        sha256(data.as_bytes())
    }

    /// Calculate total input value, None on overflow
    pub fn total_input_value(&self) -> Option<u64> {
        self.inputs.iter().try_fold(0u64, |acc, input| acc.checked_add(input.amount))
    }

    /// Calculate total output value, None on overflow
    pub fn total_output_value(&self) -> Option<u64> {
        self.outputs.iter().try_fold(0u64, |acc, output| acc.checked_add(output.amount))
    }

    /// Self-contained checks: hash integrity, input signatures, amounts.
    /// Whether inputs are unspent is the ledger's concern.
    pub fn validate(&self, reward: u64) -> Result<(), ValidationError> {
        let computed = self.calculate_hash();
        if computed != self.hash {
            return Err(ValidationError::InvalidTransactionHash {
                id: self.id,
                stored: self.hash,
                computed,
            });
        }

        for input in &self.inputs {
            if !input.verify_signature() {
                return Err(ValidationError::InvalidSignature {
                    id: self.id,
                    outpoint: input.outpoint(),
                });
            }
        }

        match self.tx_type {
            TransactionType::Regular => {
                if self.inputs.is_empty() {
                    return Err(ValidationError::EmptyTransaction(self.id));
                }
                let inputs = self.total_input_value().ok_or(ValidationError::AmountOverflow(self.id))?;
                let outputs = self.total_output_value().ok_or(ValidationError::AmountOverflow(self.id))?;
                if inputs != outputs {
                    return Err(ValidationError::AmountMismatch { id: self.id, inputs, outputs });
                }
            }
            TransactionType::Reward => {
                if !self.inputs.is_empty() {
                    return Err(ValidationError::RewardHasInputs(self.id));
                }
                if self.outputs.len() != 1 {
                    return Err(ValidationError::RewardOutputCount {
                        id: self.id,
                        count: self.outputs.len(),
                    });
                }
                if self.outputs[0].amount != reward {
                    return Err(ValidationError::RewardAmount {
                        id: self.id,
                        expected: reward,
                        actual: self.outputs[0].amount,
                    });
                }
            }
        }

        Ok(())
    }

    pub fn is_valid(&self, reward: u64) -> bool {
        match self.validate(reward) {
            Ok(()) => true,
            Err(e) => {
                log::debug!("Transaction {} invalid: {}", self.id, e);
                false
            }
        }
    }
}
