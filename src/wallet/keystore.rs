// Key management

use crate::core::Address;
use rand::rngs::OsRng;
use secp256k1::{PublicKey, Secp256k1, SecretKey};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("invalid secret key: {0}")]
    InvalidSecretKey(String),
    #[error("address {0} not found in keystore")]
    UnknownAddress(Address),
    #[error("insufficient funds: have {have}, need {need}")]
    InsufficientFunds { have: u64, need: u64 },
    #[error("amount must be positive")]
    ZeroAmount,
}

/// Key pair
#[derive(Clone)]
pub struct KeyPair {
    pub secret_key: SecretKey,
    pub public_key: PublicKey,
    pub address: Address,
}

impl KeyPair {
    /// Generate a new key pair
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let mut rng = OsRng;

        let secret_key = SecretKey::new(&mut rng);
        Self::from_secret_key(&secp, secret_key)
    }

    /// Create from a hex encoded secret key
    pub fn from_secret_hex(secret: &str) -> Result<Self, WalletError> {
        let bytes = hex::decode(secret)
            .map_err(|e| WalletError::InvalidSecretKey(e.to_string()))?;
        let secret_key = SecretKey::from_slice(&bytes)
            .map_err(|e| WalletError::InvalidSecretKey(e.to_string()))?;
        Ok(Self::from_secret_key(&Secp256k1::new(), secret_key))
    }

    fn from_secret_key(secp: &Secp256k1<secp256k1::All>, secret_key: SecretKey) -> Self {
        let public_key = secret_key.public_key(secp);
        let address = Address(hex::encode(public_key.serialize()));

        Self {
            secret_key,
            public_key,
            address,
        }
    }

    /// Hex encoded secret key
    pub fn secret_hex(&self) -> String {
        hex::encode(self.secret_key.secret_bytes())
    }
}

/// Keystore - in-memory set of key pairs
pub struct Keystore {
    keys: HashMap<Address, KeyPair>,
}

impl Keystore {
    /// Create a new keystore
    pub fn new() -> Self {
        Self {
            keys: HashMap::new(),
        }
    }

    /// Generate a new address
    pub fn new_address(&mut self) -> Address {
        self.insert(KeyPair::generate())
    }

    /// Add an existing key pair
    pub fn insert(&mut self, keypair: KeyPair) -> Address {
        let address = keypair.address.clone();
        self.keys.insert(address.clone(), keypair);
        address
    }

    /// Get key pair for address
    pub fn get_keypair(&self, address: &Address) -> Option<&KeyPair> {
        self.keys.get(address)
    }
}

impl Default for Keystore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keypair_generation() {
        let kp = KeyPair::generate();

        // Compressed pubkey, hex encoded
        assert_eq!(kp.address.as_str().len(), 66);
        assert!(kp.address.as_str().starts_with("02") || kp.address.as_str().starts_with("03"));
    }

    #[test]
    fn test_secret_hex_roundtrip() {
        let kp = KeyPair::generate();
        let restored = KeyPair::from_secret_hex(&kp.secret_hex()).unwrap();
        assert_eq!(restored.address, kp.address);

        assert!(KeyPair::from_secret_hex("zz").is_err());
        assert!(KeyPair::from_secret_hex(&"00".repeat(32)).is_err());
    }

    #[test]
    fn test_keystore() {
        let mut ks = Keystore::new();

        let addr1 = ks.new_address();
        let addr2 = ks.new_address();
        assert_ne!(addr1, addr2);

        assert_eq!(ks.get_keypair(&addr1).unwrap().address, addr1);
        assert!(ks.get_keypair(&addr2).is_some());
        assert!(ks.get_keypair(&Address::from("unknown")).is_none());

        let imported = KeyPair::generate();
        let addr3 = ks.insert(imported.clone());
        assert_eq!(addr3, imported.address);
        assert!(ks.get_keypair(&addr3).is_some());
    }
}
