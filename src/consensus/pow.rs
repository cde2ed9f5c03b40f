// Proof of Work parameters and mining control

use crate::core::Hash256;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Hashes tried between two yields to the scheduler
pub const MINING_BATCH_SIZE: u64 = 1_000;

/// Consensus constants shared by every node of a network
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainParams {
    /// Required number of leading zero hex digits in a block hash
    pub difficulty: u32,
    /// Amount paid by every reward transaction
    pub reward: u64,
}

impl ChainParams {
    pub fn new(difficulty: u32, reward: u64) -> Self {
        Self { difficulty, reward }
    }
}

impl Default for ChainParams {
    fn default() -> Self {
        Self { difficulty: 4, reward: 10 }
    }
}

/// Check a block hash against the difficulty. Genesis (index 0) is exempt.
pub fn meets_difficulty(index: u64, hash: &Hash256, difficulty: u32) -> bool {
    index == 0 || hash.leading_zero_nibbles() >= difficulty
}

/// Lifecycle of one nonce search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MiningState {
    Unmined,
    Mining,
    Aborting,
    Mined,
    Aborted,
}

impl MiningState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => MiningState::Unmined,
            1 => MiningState::Mining,
            2 => MiningState::Aborting,
            3 => MiningState::Mined,
            _ => MiningState::Aborted,
        }
    }
}

/// Shared cancellation handle for an in-flight nonce search.
///
/// Clones observe the same state, so the node can keep one while the
/// mining task owns the block.
#[derive(Debug, Clone, Default)]
pub struct MiningControl {
    state: Arc<AtomicU8>,
}

impl MiningControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MiningState {
        MiningState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Request cancellation. Only has an effect while mining; returns whether it did.
    pub fn abort(&self) -> bool {
        self.state
            .compare_exchange(
                MiningState::Mining as u8,
                MiningState::Aborting as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }

    pub(crate) fn begin(&self) {
        self.state.store(MiningState::Mining as u8, Ordering::SeqCst);
    }

    pub(crate) fn abort_requested(&self) -> bool {
        self.state() == MiningState::Aborting
    }

    pub(crate) fn finish(&self, found: bool) {
        let end = if found { MiningState::Mined } else { MiningState::Aborted };
        self.state.store(end as u8, Ordering::SeqCst);
    }
}
