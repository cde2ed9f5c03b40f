// Consensus rules: proof of work and validation outcomes

pub mod pow;
pub mod validation;

pub use pow::{ChainParams, MiningControl, MiningState, meets_difficulty, MINING_BATCH_SIZE};
pub use validation::ValidationError;
