// Wallet: key source and transaction factory

mod keystore;
mod tx_builder;

pub use keystore::{Keystore, KeyPair, WalletError};
pub use tx_builder::TransactionBuilder;
