// Blockchain: chain, mempool and UTXO set, with validation and fork choice

use crate::consensus::{ChainParams, ValidationError};
use crate::core::{current_timestamp, Address, Block, Hash256, Transaction, TxOut};
use crate::storage::{OutPoint, UtxoSet};
use std::collections::HashSet;

/// Ledger state.
///
/// `blocks[0]` is always the canonical genesis block. The UTXO set only
/// changes through `add_block` and `rollback_block`.
#[derive(Debug, Clone)]
pub struct Blockchain {
    blocks: Vec<Block>,
    pending_transactions: Vec<Transaction>,
    unspent: UtxoSet,
    params: ChainParams,
}

/// Check that `block` directly follows `prev` and is internally sound
fn validate_successor(prev: &Block, block: &Block, params: &ChainParams) -> Result<(), ValidationError> {
    if block.index != prev.index + 1 {
        return Err(ValidationError::InvalidIndex {
            expected: prev.index + 1,
            actual: block.index,
        });
    }
    if block.previous_hash != prev.hash {
        return Err(ValidationError::PreviousHashMismatch {
            index: block.index,
            expected: prev.hash,
            actual: block.previous_hash,
        });
    }
    if block.timestamp <= prev.timestamp {
        return Err(ValidationError::NonMonotonicTimestamp {
            index: block.index,
            timestamp: block.timestamp,
            previous: prev.timestamp,
        });
    }

    block.validate(params.difficulty)?;

    let coinbase_count = block.coinbase_count();
    if coinbase_count != 1 {
        return Err(ValidationError::CoinbaseCount {
            index: block.index,
            count: coinbase_count,
        });
    }

    let mut ids = HashSet::new();
    for tx in &block.transactions {
        if !ids.insert(tx.id) {
            return Err(ValidationError::ReusedTransactionId(tx.id));
        }
        tx.validate(params.reward)?;
    }

    Ok(())
}

/// Record the block's transaction ids in `known`, failing on the first one
/// already there
fn check_fresh_ids(known: &mut HashSet<Hash256>, block: &Block) -> Result<(), ValidationError> {
    for tx in &block.transactions {
        if !known.insert(tx.id) {
            return Err(ValidationError::ReusedTransactionId(tx.id));
        }
    }
    Ok(())
}

/// Check every input of `tx` spends an unspent output it correctly describes
/// and that no output is spent twice within `spent`
fn check_inputs(utxo: &UtxoSet, tx: &Transaction, spent: &mut HashSet<OutPoint>) -> Result<(), ValidationError> {
    for input in &tx.inputs {
        let outpoint = input.outpoint();
        if !spent.insert(outpoint) {
            return Err(ValidationError::DoubleSpend(outpoint));
        }
        let output = utxo
            .get_utxo(&outpoint)
            .ok_or(ValidationError::UnknownOutput(outpoint))?;
        if output.address != input.address || output.amount != input.amount {
            return Err(ValidationError::InputMismatch(outpoint));
        }
    }
    Ok(())
}

/// Add a block's outputs and remove the outputs its inputs consume
fn apply_to_utxo(utxo: &mut UtxoSet, block: &Block) {
    for tx in &block.transactions {
        utxo.add_outputs(tx);
    }
    for tx in &block.transactions {
        for input in &tx.inputs {
            utxo.remove_utxo(&input.outpoint());
        }
    }
}

impl Blockchain {
    /// New chain holding only the genesis block
    pub fn new(params: ChainParams) -> Self {
        Self {
            blocks: vec![Block::genesis()],
            pending_transactions: Vec::new(),
            unspent: UtxoSet::new(),
            params,
        }
    }

    pub fn params(&self) -> &ChainParams {
        &self.params
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Latest block
    pub fn head(&self) -> &Block {
        // blocks is never empty: it starts with genesis and rollback refuses to pop it
        &self.blocks[self.blocks.len() - 1]
    }

    /// Number of blocks, genesis included
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn pending_transactions(&self) -> &[Transaction] {
        &self.pending_transactions
    }

    pub fn utxo_set(&self) -> &UtxoSet {
        &self.unspent
    }

    /// Sum of unspent outputs addressed to `address`
    pub fn get_balance(&self, address: &Address) -> u64 {
        self.unspent.get_balance(address)
    }

    /// Unmined block on top of the head: a fresh coinbase for
    /// `reward_address` followed by the current mempool. The chain is not
    /// modified; transactions leave the mempool when the block is added.
    pub fn create_next_block(&self, reward_address: &Address) -> Block {
        let head = self.head();
        let timestamp = current_timestamp().max(head.timestamp + 1);

        let mut transactions = Vec::with_capacity(self.pending_transactions.len() + 1);
        transactions.push(Transaction::coinbase(reward_address.clone(), self.params.reward));
        transactions.extend(self.pending_transactions.iter().cloned());

        Block::new(timestamp, transactions, head.hash, head.index + 1, 0)
    }

    /// Append an already validated block and update mempool and UTXO set
    pub fn add_block(&mut self, block: Block) {
        let mined: HashSet<Hash256> = block.transactions.iter().map(|tx| tx.id).collect();
        self.pending_transactions.retain(|tx| !mined.contains(&tx.id));

        apply_to_utxo(&mut self.unspent, &block);
        log::debug!("Added block {} ({} transactions)", block.index, block.transactions.len());
        self.blocks.push(block);

        self.prune_pending();
    }

    /// Undo `add_block` for the tip. Its regular transactions go back to the
    /// front of the mempool; its reward transaction is discarded.
    pub fn rollback_block(&mut self) -> Result<Block, ValidationError> {
        if self.blocks.len() <= 1 {
            return Err(ValidationError::RollbackGenesis);
        }
        let Some(block) = self.blocks.pop() else {
            return Err(ValidationError::EmptyChain);
        };

        for tx in block.transactions.iter().rev() {
            self.unspent.remove_outputs(tx);
            for input in &tx.inputs {
                let outpoint = input.outpoint();
                match self.find_output(&outpoint) {
                    Some(output) => self.unspent.add_utxo(outpoint, output),
                    None => log::warn!("Rollback of block {}: spent output {} not found", block.index, outpoint),
                }
            }
        }

        let requeued: Vec<Transaction> = block
            .transactions
            .iter()
            .filter(|tx| !tx.is_coinbase())
            .cloned()
            .collect();
        self.pending_transactions.splice(0..0, requeued);
        self.prune_pending();

        log::debug!("Rolled back block {}", block.index);
        Ok(block)
    }

    /// Ids of every transaction on the chain
    fn chain_ids(&self) -> HashSet<Hash256> {
        self.blocks
            .iter()
            .flat_map(|block| block.transactions.iter().map(|tx| tx.id))
            .collect()
    }

    /// Look up an output by scanning the chain for the transaction that created it
    fn find_output(&self, outpoint: &OutPoint) -> Option<TxOut> {
        self.blocks
            .iter()
            .flat_map(|block| block.transactions.iter())
            .find(|tx| tx.id == outpoint.tx_out_id)
            .and_then(|tx| tx.outputs.get(outpoint.tx_out_index as usize).cloned())
    }

    /// Drop pending transactions that no longer spend unspent outputs, or
    /// that conflict with an earlier pending transaction
    fn prune_pending(&mut self) {
        let mut spent = HashSet::new();
        let unspent = &self.unspent;
        let before = self.pending_transactions.len();
        self.pending_transactions.retain(|tx| {
            let mut tentative = spent.clone();
            if check_inputs(unspent, tx, &mut tentative).is_ok() {
                spent = tentative;
                true
            } else {
                false
            }
        });
        let dropped = before - self.pending_transactions.len();
        if dropped > 0 {
            log::info!("Dropped {} pending transactions no longer spendable", dropped);
        }
    }

    /// Admit a transaction to the mempool
    pub fn add_transaction(&mut self, tx: Transaction) -> Result<(), ValidationError> {
        if tx.is_coinbase() {
            return Err(ValidationError::RewardInMempool(tx.id));
        }
        if self.pending_transactions.iter().any(|pending| pending.id == tx.id) {
            return Err(ValidationError::DuplicateTransaction(tx.id));
        }
        if self.chain_ids().contains(&tx.id) {
            return Err(ValidationError::ReusedTransactionId(tx.id));
        }

        tx.validate(self.params.reward)?;

        let mut spent: HashSet<OutPoint> = self
            .pending_transactions
            .iter()
            .flat_map(|pending| pending.inputs.iter().map(|input| input.outpoint()))
            .collect();
        check_inputs(&self.unspent, &tx, &mut spent)?;

        log::debug!("Transaction {} added to mempool", tx.id);
        self.pending_transactions.push(tx);
        Ok(())
    }

    /// Whole-chain validation: canonical genesis, then linkage, proof of
    /// work, rewards and spends replayed from genesis
    pub fn validate(&self) -> Result<(), ValidationError> {
        let genesis = self.blocks.first().ok_or(ValidationError::EmptyChain)?;
        if *genesis != Block::genesis() {
            return Err(ValidationError::InvalidGenesis(genesis.hash));
        }

        let mut utxo = UtxoSet::new();
        let mut ids = HashSet::new();
        for pair in self.blocks.windows(2) {
            let (prev, block) = (&pair[0], &pair[1]);
            validate_successor(prev, block, &self.params)?;
            check_fresh_ids(&mut ids, block)?;

            let mut spent = HashSet::new();
            for tx in &block.transactions {
                check_inputs(&utxo, tx, &mut spent)?;
            }
            apply_to_utxo(&mut utxo, block);
        }

        Ok(())
    }

    pub fn is_valid(&self, verbose: bool) -> bool {
        match self.validate() {
            Ok(()) => true,
            Err(e) => {
                if verbose {
                    log::warn!("Blockchain invalid: {}", e);
                } else {
                    log::debug!("Blockchain invalid: {}", e);
                }
                false
            }
        }
    }

    /// Validate a candidate as the immediate successor of the head
    pub fn validate_new_block(&self, candidate: &Block) -> Result<(), ValidationError> {
        let head = self.head();
        validate_successor(head, candidate, &self.params)?;
        check_fresh_ids(&mut self.chain_ids(), candidate)?;

        let mut spent: HashSet<OutPoint> = head
            .transactions
            .iter()
            .flat_map(|tx| tx.inputs.iter().map(|input| input.outpoint()))
            .collect();
        for tx in &candidate.transactions {
            check_inputs(&self.unspent, tx, &mut spent)?;
        }

        Ok(())
    }

    pub fn is_new_block_valid(&self, candidate: &Block) -> bool {
        match self.validate_new_block(candidate) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Block {} rejected: {}", candidate.index, e);
                false
            }
        }
    }

    /// Fork choice. Adopt `candidate` if it is valid and strictly longer:
    /// roll back to the common prefix, then append the candidate's blocks.
    /// Either the whole switch succeeds or the ledger is left untouched.
    pub fn replace_blockchain(&mut self, candidate: &Blockchain) -> Result<(), ValidationError> {
        candidate.validate()?;
        if candidate.len() <= self.len() {
            return Err(ValidationError::ChainNotLonger {
                local: self.len(),
                candidate: candidate.len(),
            });
        }

        let snapshot = self.clone();
        match self.switch_to(candidate) {
            Ok(rolled_back) => {
                log::info!(
                    "Switched to longer chain: rolled back {} blocks, now {} blocks",
                    rolled_back,
                    self.len()
                );
                Ok(())
            }
            Err(e) => {
                log::warn!("Chain replacement failed, restoring previous state: {}", e);
                *self = snapshot;
                Err(e)
            }
        }
    }

    fn switch_to(&mut self, candidate: &Blockchain) -> Result<usize, ValidationError> {
        let mut rolled_back = 0;
        while !self.tip_matches(candidate) {
            self.rollback_block()?;
            rolled_back += 1;
        }

        for block in &candidate.blocks[self.blocks.len()..] {
            self.validate_new_block(block)?;
            self.add_block(block.clone());
        }
        Ok(rolled_back)
    }

    /// Whether the candidate holds our tip at the same height
    fn tip_matches(&self, candidate: &Blockchain) -> bool {
        let tip = self.head();
        candidate
            .blocks
            .get(tip.index as usize)
            .is_some_and(|block| block.hash == tip.hash)
    }
}
