// Validation outcomes

use crate::core::Hash256;
use crate::storage::OutPoint;
use thiserror::Error;

/// Reason a transaction, block or chain was rejected.
///
/// Validators return this instead of a bare bool; callers decide whether and
/// how loudly to log it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Stored transaction hash differs from the recomputed one
    #[error("transaction {id}: hash mismatch (stored {stored}, computed {computed})")]
    InvalidTransactionHash { id: Hash256, stored: Hash256, computed: Hash256 },
    /// Input signature does not verify against the claimed address
    #[error("transaction {id}: invalid signature on input {outpoint}")]
    InvalidSignature { id: Hash256, outpoint: OutPoint },
    /// Regular transaction without inputs
    #[error("transaction {0}: regular transaction has no inputs")]
    EmptyTransaction(Hash256),
    /// Sum of inputs differs from sum of outputs
    #[error("transaction {id}: inputs total {inputs} but outputs total {outputs}")]
    AmountMismatch { id: Hash256, inputs: u64, outputs: u64 },
    /// Amount sum does not fit in u64
    #[error("transaction {0}: amount overflow")]
    AmountOverflow(Hash256),
    /// Reward transaction must not spend anything
    #[error("reward transaction {0} has inputs")]
    RewardHasInputs(Hash256),
    /// Reward transaction must pay exactly one output
    #[error("reward transaction {id} has {count} outputs, expected 1")]
    RewardOutputCount { id: Hash256, count: usize },
    /// Reward output must equal the fixed reward
    #[error("reward transaction {id} pays {actual}, expected {expected}")]
    RewardAmount { id: Hash256, expected: u64, actual: u64 },
    /// Stored block hash differs from the recomputed one
    #[error("block {index}: hash mismatch (stored {stored}, computed {computed})")]
    InvalidBlockHash { index: u64, stored: Hash256, computed: Hash256 },
    /// Block hash does not have enough leading zeros
    #[error("block {index}: hash {hash} does not meet difficulty {difficulty}")]
    InvalidProofOfWork { index: u64, hash: Hash256, difficulty: u32 },
    /// Block timestamp lies in the future
    #[error("block {index}: timestamp {timestamp} is in the future")]
    FutureTimestamp { index: u64, timestamp: u64 },
    /// Block is not the successor of the block before it
    #[error("expected block index {expected}, got {actual}")]
    InvalidIndex { expected: u64, actual: u64 },
    #[error("block {index}: previous hash {actual} does not match {expected}")]
    PreviousHashMismatch { index: u64, expected: Hash256, actual: Hash256 },
    #[error("block {index}: timestamp {timestamp} not after previous {previous}")]
    NonMonotonicTimestamp { index: u64, timestamp: u64, previous: u64 },
    /// First block differs from the canonical genesis block
    #[error("genesis block {0} is not the canonical genesis")]
    InvalidGenesis(Hash256),
    #[error("chain has no blocks")]
    EmptyChain,
    /// Block does not carry exactly one reward transaction
    #[error("block {index}: {count} reward transactions, expected exactly 1")]
    CoinbaseCount { index: u64, count: usize },
    /// Input references an output that is not unspent
    #[error("input {0} does not reference an unspent output")]
    UnknownOutput(OutPoint),
    /// Input claims a different owner or amount than the output it spends
    #[error("input {0} does not match the referenced output")]
    InputMismatch(OutPoint),
    /// Same output referenced twice
    #[error("output {0} is spent more than once")]
    DoubleSpend(OutPoint),
    #[error("transaction {0} is already known")]
    DuplicateTransaction(Hash256),
    /// Transaction id already used by another transaction on the chain or in the same block
    #[error("transaction id {0} is already used on the chain")]
    ReusedTransactionId(Hash256),
    /// Reward transactions only enter the ledger inside a block
    #[error("reward transaction {0} cannot enter the mempool")]
    RewardInMempool(Hash256),
    /// Fork choice only replaces with a strictly longer chain
    #[error("candidate chain length {candidate} is not longer than local {local}")]
    ChainNotLonger { local: usize, candidate: usize },
    #[error("cannot roll back the genesis block")]
    RollbackGenesis,
}
