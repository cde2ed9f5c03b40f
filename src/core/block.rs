// Block data structures

use crate::consensus::{meets_difficulty, MiningControl, ValidationError, MINING_BATCH_SIZE};
use crate::core::{sha256_concat, Hash256, Transaction};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Timestamp of the canonical genesis block (2025-01-01T00:00:00Z, in ms)
pub const GENESIS_TIMESTAMP: u64 = 1_735_689_600_000;

/// Milliseconds since the Unix epoch
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn transactions_json(transactions: &[Transaction]) -> String {
    serde_json::to_string(transactions).expect("transactions serialize to JSON")
}

/// Block - proof-of-work container for a list of transactions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    /// Height in the chain, genesis is 0
    pub index: u64,
    pub previous_hash: Hash256,
    /// Unix epoch, milliseconds
    pub timestamp: u64,
    pub nonce: u64,
    pub transactions: Vec<Transaction>,
    pub hash: Hash256,
    #[serde(skip)]
    mining: MiningControl,
}

impl PartialEq for Block {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
            && self.previous_hash == other.previous_hash
            && self.timestamp == other.timestamp
            && self.nonce == other.nonce
            && self.transactions == other.transactions
            && self.hash == other.hash
    }
}

impl Eq for Block {}

impl Block {
    /// Create a new block; the hash is computed immediately
    pub fn new(
        timestamp: u64,
        transactions: Vec<Transaction>,
        previous_hash: Hash256,
        index: u64,
        nonce: u64,
    ) -> Self {
        let mut block = Self {
            index,
            previous_hash,
            timestamp,
            nonce,
            transactions,
            hash: Hash256::zero(),
            mining: MiningControl::new(),
        };
        block.hash = block.calculate_hash();
        block
    }

    /// Create the genesis block. Identical on every node.
    pub fn genesis() -> Self {
        Self::new(GENESIS_TIMESTAMP, vec![], Hash256::zero(), 0, 0)
    }

    fn digest(index: u64, previous_hash: &Hash256, timestamp: u64, transactions: &str, nonce: u64) -> Hash256 {
        sha256_concat(&[
            index.to_string().as_bytes(),
            previous_hash.to_hex().as_bytes(),
            timestamp.to_string().as_bytes(),
            transactions.as_bytes(),
            nonce.to_string().as_bytes(),
        ])
    }

    /// SHA256 of index + previousHash + timestamp + JSON(transactions) + nonce
    pub fn calculate_hash(&self) -> Hash256 {
        Self::digest(
            self.index,
            &self.previous_hash,
            self.timestamp,
            &transactions_json(&self.transactions),
            self.nonce,
        )
    }

    /// Check if this is the genesis block
    pub fn is_genesis(&self) -> bool {
        self.index == 0
    }

    /// Number of reward transactions carried
    pub fn coinbase_count(&self) -> usize {
        self.transactions.iter().filter(|tx| tx.is_coinbase()).count()
    }

    /// Handle that can cancel `mine` from another task
    pub fn mining_control(&self) -> MiningControl {
        self.mining.clone()
    }

    /// Cancel an in-flight `mine`. No effect unless mining.
    pub fn abort_mining(&self) -> bool {
        self.mining.abort()
    }

    /// Search nonces upwards from the current one until the hash meets the
    /// difficulty. Yields to the scheduler every `MINING_BATCH_SIZE` hashes.
    /// A block stamped ahead of the clock is held back until its timestamp
    /// is reached, so the result never fails the future-time check.
    /// Returns false if aborted.
    pub async fn mine(&mut self, difficulty: u32) -> bool {
        self.mining.begin();

        while self.timestamp > current_timestamp() {
            tokio::time::sleep(Duration::from_millis(1)).await;
            if self.mining.abort_requested() {
                self.mining.finish(false);
                log::info!("Mining of block {} aborted before its timestamp", self.index);
                return false;
            }
        }

        let transactions = transactions_json(&self.transactions);
        let start_time = Instant::now();
        let mut attempts = 0u64;

        log::debug!("Mining block {} with difficulty {}", self.index, difficulty);

        loop {
            for _ in 0..MINING_BATCH_SIZE {
                if meets_difficulty(self.index, &self.hash, difficulty) {
                    self.mining.finish(true);
                    log::info!(
                        "Mined block {}: nonce {} hash {} ({} attempts in {:?})",
                        self.index,
                        self.nonce,
                        self.hash,
                        attempts,
                        start_time.elapsed()
                    );
                    return true;
                }
                self.nonce += 1;
                self.hash = Self::digest(self.index, &self.previous_hash, self.timestamp, &transactions, self.nonce);
                attempts += 1;
            }

            tokio::task::yield_now().await;

            if self.mining.abort_requested() {
                self.mining.finish(false);
                log::info!("Mining of block {} aborted after {} attempts", self.index, attempts);
                return false;
            }

            if attempts % 100_000 == 0 {
                let elapsed = start_time.elapsed();
                log::debug!("Mining attempts: {} ({:.1} KH/s)",
                    attempts,
                    attempts as f64 / elapsed.as_secs_f64() / 1000.0
                );
            }
        }
    }

    /// Checks a block can make on its own: hash integrity, proof of work,
    /// timestamp not in the future. Linkage is checked by the chain.
    pub fn validate(&self, difficulty: u32) -> Result<(), ValidationError> {
        let computed = self.calculate_hash();
        if computed != self.hash {
            return Err(ValidationError::InvalidBlockHash {
                index: self.index,
                stored: self.hash,
                computed,
            });
        }

        if !meets_difficulty(self.index, &self.hash, difficulty) {
            return Err(ValidationError::InvalidProofOfWork {
                index: self.index,
                hash: self.hash,
                difficulty,
            });
        }

        if self.timestamp > current_timestamp() {
            return Err(ValidationError::FutureTimestamp {
                index: self.index,
                timestamp: self.timestamp,
            });
        }

        Ok(())
    }

    pub fn is_valid(&self, difficulty: u32) -> bool {
        match self.validate(difficulty) {
            Ok(()) => true,
            Err(e) => {
                log::debug!("Block {} invalid: {}", self.index, e);
                false
            }
        }
    }
}
