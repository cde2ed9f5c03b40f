// Network node - gossip, chain synchronization and the mining loop

use crate::chain::{Blockchain, DecodeError};
use crate::config::NodeConfig;
use crate::consensus::{MiningControl, ValidationError};
use crate::core::{Address, Block, Hash256, Transaction};
use crate::network::message::{Envelope, ADD_BLOCK_PATH, ADD_PEER_PATH, TRANSACTIONS_PATH};
use crate::network::peer::{SeenCache, Transport, TransportError};
use crate::storage::{ChainStore, StorageError};
use crate::wallet::WalletError;
use futures::future::join_all;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard, RwLock};
use tokio::task::JoinHandle;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Wallet(#[from] WalletError),
    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

/// What a node did with one gossip message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum Disposition {
    /// Applied and forwarded to peers
    Accepted,
    /// Nothing new: an old block or an already known peer
    Stale,
    /// Block too far ahead; a resync was run instead
    Orphan,
    /// Token seen before
    Duplicate,
    Rejected(String),
}

/// The mining attempt in flight
struct MiningJob {
    /// Head the candidate extends
    parent: Hash256,
    control: MiningControl,
}

/// Encoded chain file waiting to be written. Holding the order guard keeps
/// writes in the order the snapshots were taken.
struct PendingSave<'a> {
    json: String,
    _order: MutexGuard<'a, ()>,
}

/// Network node
pub struct Node {
    config: NodeConfig,
    blockchain: RwLock<Blockchain>,
    peers: RwLock<Vec<String>>,
    seen: SeenCache,
    transport: Arc<dyn Transport>,
    store: Option<ChainStore>,
    mining_enabled: AtomicBool,
    current_mining: Mutex<Option<MiningJob>>,
    save_order: Mutex<()>,
}

impl Node {
    /// Create a node holding only the genesis block
    pub fn new(config: NodeConfig, transport: Arc<dyn Transport>) -> Self {
        let store = config
            .data_dir
            .as_ref()
            .map(|dir| ChainStore::new(dir, config.port));

        Self {
            blockchain: RwLock::new(Blockchain::new(config.params)),
            peers: RwLock::new(Vec::new()),
            seen: SeenCache::new(config.seen_capacity),
            transport,
            store,
            mining_enabled: AtomicBool::new(false),
            current_mining: Mutex::new(None),
            save_order: Mutex::new(()),
            config,
        }
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn url(&self) -> String {
        self.config.url()
    }

    pub async fn peers(&self) -> Vec<String> {
        self.peers.read().await.clone()
    }

    /// Number of blocks, genesis included
    pub async fn chain_len(&self) -> usize {
        self.blockchain.read().await.len()
    }

    pub async fn head(&self) -> Block {
        self.blockchain.read().await.head().clone()
    }

    pub async fn chain_json(&self) -> Result<String, serde_json::Error> {
        self.blockchain.read().await.to_json()
    }

    pub async fn get_balance(&self, address: &Address) -> u64 {
        self.blockchain.read().await.get_balance(address)
    }

    pub async fn pending_transactions(&self) -> Vec<Transaction> {
        self.blockchain.read().await.pending_transactions().to_vec()
    }

    /// Add a peer unless it is us or already known
    pub async fn add_peer(&self, url: &str) -> bool {
        let url = url.trim_end_matches('/');
        if url.is_empty() || url == self.url() {
            return false;
        }
        let mut peers = self.peers.write().await;
        if peers.iter().any(|p| p == url) {
            return false;
        }
        peers.push(url.to_string());
        log::info!("Added peer {} ({} peers)", url, peers.len());
        true
    }

    /// Add every configured peer and ask each to add us back
    pub async fn greet_peers(&self) {
        for peer in &self.config.peers {
            self.add_peer(peer).await;
        }

        let envelope = match Envelope::for_peer(&self.url()) {
            Ok(envelope) => envelope,
            Err(e) => {
                log::error!("Failed to encode greeting: {}", e);
                return;
            }
        };
        let delivered = self.broadcast(ADD_PEER_PATH, &envelope).await;
        log::info!("Greeted {} peers", delivered);
    }

    /// Run `call` against every peer concurrently, each bounded by the
    /// request timeout. Results come back in peer order.
    async fn fan_out<'a, T, F, Fut>(&'a self, peers: &'a [String], call: F) -> Vec<Result<T, TransportError>>
    where
        F: Fn(&'a str) -> Fut,
        Fut: Future<Output = Result<T, TransportError>> + 'a,
    {
        let timeout = self.config.request_timeout;
        join_all(peers.iter().map(|peer| {
            let request = call(peer.as_str());
            async move {
                match tokio::time::timeout(timeout, request).await {
                    Ok(result) => result,
                    Err(_) => Err(TransportError::Timeout { peer: peer.clone() }),
                }
            }
        }))
        .await
    }

    /// Send an envelope to every peer; returns how many accepted it.
    /// The token is marked seen so echoes from peers are ignored.
    pub async fn broadcast(&self, endpoint: &str, envelope: &Envelope) -> usize {
        self.seen.insert(&envelope.token).await;
        let peers = self.peers().await;
        if peers.is_empty() {
            return 0;
        }

        log::debug!("Broadcasting {} to {} peers on {}", envelope.token, peers.len(), endpoint);
        let transport = &self.transport;
        let results = self
            .fan_out(&peers, |peer| transport.post(peer, endpoint, envelope))
            .await;

        let mut delivered = 0;
        for result in results {
            match result {
                Ok(()) => delivered += 1,
                Err(e) => log::warn!("Broadcast failed: {}", e),
            }
        }
        delivered
    }

    pub async fn broadcast_block(&self, block: &Block) {
        match Envelope::for_block(block) {
            Ok(envelope) => {
                log::info!("Broadcasting block {}", block.index);
                self.broadcast(ADD_BLOCK_PATH, &envelope).await;
            }
            Err(e) => log::error!("Failed to encode block {}: {}", block.index, e),
        }
    }

    /// Encode the chain file while the chain lock is held
    async fn prepare_save(&self, chain: &Blockchain) -> Option<PendingSave<'_>> {
        self.store.as_ref()?;
        match ChainStore::encode(chain) {
            Ok(json) => Some(PendingSave {
                json,
                _order: self.save_order.lock().await,
            }),
            Err(e) => {
                log::error!("Failed to save blockchain: {}", e);
                None
            }
        }
    }

    /// Write a prepared chain file on the blocking pool, after the chain
    /// lock has been released
    async fn save(&self, pending: Option<PendingSave<'_>>) {
        let (Some(store), Some(pending)) = (&self.store, pending) else {
            return;
        };
        let store = store.clone();
        let PendingSave { json, _order } = pending;
        match tokio::task::spawn_blocking(move || store.save(&json)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::error!("Failed to save blockchain: {}", e),
            Err(e) => log::error!("Chain file writer failed: {}", e),
        }
    }

    /// Restore the chain file if there is one; returns whether it was loaded
    pub async fn load_from_disk(&self) -> Result<bool, NodeError> {
        let Some(store) = &self.store else {
            return Ok(false);
        };
        if !store.exists() {
            log::info!("No chain file at {}", store.path().display());
            return Ok(false);
        }
        let loaded = store.load(self.config.params)?;
        *self.blockchain.write().await = loaded;
        Ok(true)
    }

    /// Cancel the in-flight mining attempt, if any
    async fn abort_mining(&self) {
        if let Some(job) = self.current_mining.lock().await.as_ref() {
            if job.control.abort() {
                log::debug!("Aborted mining on top of {}", job.parent);
            }
        }
    }

    /// Handle `POST /blockchain/add_block`
    pub async fn handle_block(&self, envelope: Envelope) -> Disposition {
        if !self.seen.insert(&envelope.token).await {
            log::debug!("Block message {} seen before", envelope.token);
            return Disposition::Duplicate;
        }

        let block = match envelope.decode_block() {
            Ok(block) => block,
            Err(e) => {
                log::warn!("Malformed block message {}: {}", envelope.token, e);
                return Disposition::Rejected(e.to_string());
            }
        };

        let mut pending = None;
        let disposition = {
            let mut chain = self.blockchain.write().await;
            let head_index = chain.head().index;

            if block.index <= head_index {
                log::debug!("Ignoring block {}, head is {}", block.index, head_index);
                Disposition::Stale
            } else if block.index == head_index + 1 {
                match chain.validate_new_block(&block) {
                    Ok(()) => {
                        self.abort_mining().await;
                        chain.add_block(block.clone());
                        pending = self.prepare_save(&chain).await;
                        log::info!("Received new block {}. Blockchain now {} blocks long", block.index, chain.len());
                        Disposition::Accepted
                    }
                    Err(e) => {
                        log::warn!("Rejected block {}: {}", block.index, e);
                        Disposition::Rejected(e.to_string())
                    }
                }
            } else {
                match block.validate(chain.params().difficulty) {
                    Ok(()) => {
                        log::info!("Block {} is ahead of head {}, resyncing", block.index, head_index);
                        Disposition::Orphan
                    }
                    Err(e) => {
                        log::warn!("Rejected orphan block {}: {}", block.index, e);
                        Disposition::Rejected(e.to_string())
                    }
                }
            }
        };

        self.save(pending).await;

        match disposition {
            Disposition::Accepted => {
                self.broadcast(ADD_BLOCK_PATH, &envelope).await;
            }
            Disposition::Orphan => {
                if let Err(e) = self.ask_for_blockchain().await {
                    log::warn!("Resync after orphan block failed: {}", e);
                }
            }
            _ => {}
        }
        disposition
    }

    /// Handle `POST /transactions`
    pub async fn handle_transaction(&self, envelope: Envelope) -> Disposition {
        if !self.seen.insert(&envelope.token).await {
            return Disposition::Duplicate;
        }

        let tx = match envelope.decode_transaction() {
            Ok(tx) => tx,
            Err(e) => {
                log::warn!("Malformed transaction message {}: {}", envelope.token, e);
                return Disposition::Rejected(e.to_string());
            }
        };

        let id = tx.id;
        let mut pending = None;
        let result = {
            let mut chain = self.blockchain.write().await;
            let result = chain.add_transaction(tx);
            if result.is_ok() {
                pending = self.prepare_save(&chain).await;
            }
            result
        };
        self.save(pending).await;

        match result {
            Ok(()) => {
                log::info!("Accepted transaction {}", id);
                self.broadcast(TRANSACTIONS_PATH, &envelope).await;
                Disposition::Accepted
            }
            Err(e) => {
                log::warn!("Rejected transaction {}: {}", id, e);
                Disposition::Rejected(e.to_string())
            }
        }
    }

    /// Submit a locally built transaction as if it had arrived by gossip
    pub async fn submit_transaction(&self, tx: &Transaction) -> Disposition {
        match Envelope::for_transaction(tx) {
            Ok(envelope) => self.handle_transaction(envelope).await,
            Err(e) => Disposition::Rejected(e.to_string()),
        }
    }

    /// Handle `POST /node/add_peer`
    pub async fn handle_add_peer(&self, envelope: Envelope) -> Disposition {
        if !self.seen.insert(&envelope.token).await {
            return Disposition::Duplicate;
        }
        let url = envelope.decode_peer();
        if self.add_peer(&url).await {
            Disposition::Accepted
        } else {
            log::debug!("Already have peer {}", url);
            Disposition::Stale
        }
    }

    fn decode_peer_chain(&self, response: Result<String, TransportError>) -> Result<Blockchain, NodeError> {
        let chain = Blockchain::from_json(&response?, self.config.params)?;
        Ok(chain)
    }

    /// Query every peer for its chain, keep the longest valid one and adopt
    /// it if it beats the local chain. Returns whether the local chain changed.
    pub async fn ask_for_blockchain(&self) -> Result<bool, NodeError> {
        let peers = self.peers().await;
        log::info!("Asking {} peers for blockchain", peers.len());

        let transport = &self.transport;
        let responses = self
            .fan_out(&peers, |peer| transport.fetch_blockchain(peer))
            .await;

        let mut longest: Option<Blockchain> = None;
        for (peer, response) in peers.iter().zip(responses) {
            match self.decode_peer_chain(response) {
                Ok(chain) => {
                    log::debug!("Peer {} has {} blocks", peer, chain.len());
                    if longest.as_ref().is_none_or(|l| chain.len() > l.len()) {
                        longest = Some(chain);
                    }
                }
                Err(e) => log::warn!("Error fetching blockchain from {}: {}", peer, e),
            }
        }

        let Some(candidate) = longest else {
            log::info!("No valid blockchain received from peers");
            return Ok(false);
        };

        let mut chain = self.blockchain.write().await;
        if candidate.len() <= chain.len() {
            log::info!("Keeping local blockchain ({} blocks, best peer has {})", chain.len(), candidate.len());
            return Ok(false);
        }

        if chain.len() == 1 {
            *chain = candidate;
        } else {
            chain.replace_blockchain(&candidate)?;
        }
        self.abort_mining().await;
        let pending = self.prepare_save(&chain).await;
        log::info!("Fetched blockchain {} blocks long", chain.len());
        drop(chain);

        self.save(pending).await;
        Ok(true)
    }

    pub fn is_mining(&self) -> bool {
        self.mining_enabled.load(Ordering::SeqCst)
    }

    /// Spawn the mining loop
    pub fn start_mining(self: &Arc<Self>) -> JoinHandle<()> {
        self.mining_enabled.store(true, Ordering::SeqCst);
        let node = Arc::clone(self);
        tokio::spawn(async move { node.mining_loop().await })
    }

    /// Stop the mining loop after cancelling the current attempt
    pub async fn stop_mining(&self) {
        self.mining_enabled.store(false, Ordering::SeqCst);
        self.abort_mining().await;
    }

    async fn mining_loop(&self) {
        log::info!("Mining to {}", self.config.reward_address);

        while self.is_mining() {
            tokio::task::yield_now().await;

            let mut block = self
                .blockchain
                .read()
                .await
                .create_next_block(&self.config.reward_address);
            *self.current_mining.lock().await = Some(MiningJob {
                parent: block.previous_hash,
                control: block.mining_control(),
            });

            let mined = block.mine(self.config.params.difficulty).await;
            self.current_mining.lock().await.take();
            if !mined {
                continue;
            }

            let mut pending = None;
            let accepted = {
                let mut chain = self.blockchain.write().await;
                match chain.validate_new_block(&block) {
                    Ok(()) => {
                        chain.add_block(block.clone());
                        pending = self.prepare_save(&chain).await;
                        true
                    }
                    Err(e) => {
                        log::warn!("Discarding mined block {}: {}", block.index, e);
                        false
                    }
                }
            };

            self.save(pending).await;

            if accepted {
                self.broadcast_block(&block).await;
            }
        }

        log::info!("Mining stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::test_support::{mine_block, mined_chain, TEST_PARAMS};
    use crate::consensus::{ChainParams, MiningState};
    use crate::wallet::{Keystore, TransactionBuilder};
    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet};
    use std::time::Duration;

    /// In-memory transport: records posts, serves canned chains
    #[derive(Default)]
    struct MockTransport {
        posts: std::sync::Mutex<Vec<(String, String, Envelope)>>,
        chains: HashMap<String, String>,
        failing: HashSet<String>,
        hanging: HashSet<String>,
    }

    impl MockTransport {
        fn posts_to(&self, endpoint: &str) -> Vec<(String, Envelope)> {
            self.posts
                .lock()
                .unwrap()
                .iter()
                .filter(|(_, e, _)| e == endpoint)
                .map(|(peer, _, envelope)| (peer.clone(), envelope.clone()))
                .collect()
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn post(&self, peer: &str, endpoint: &str, envelope: &Envelope) -> Result<(), TransportError> {
            if self.failing.contains(peer) {
                return Err(TransportError::Request {
                    peer: peer.to_string(),
                    message: "connection refused".to_string(),
                });
            }
            self.posts
                .lock()
                .unwrap()
                .push((peer.to_string(), endpoint.to_string(), envelope.clone()));
            Ok(())
        }

        async fn fetch_blockchain(&self, peer: &str) -> Result<String, TransportError> {
            if self.hanging.contains(peer) {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
            self.chains.get(peer).cloned().ok_or(TransportError::Status {
                peer: peer.to_string(),
                status: 404,
            })
        }
    }

    fn config() -> NodeConfig {
        let mut config = NodeConfig::new("localhost", 5801, Address::from("local-miner"));
        config.params = TEST_PARAMS;
        config.request_timeout = Duration::from_millis(200);
        config
    }

    async fn node_with(transport: Arc<MockTransport>, peers: &[&str]) -> Node {
        let node = Node::new(config(), transport);
        for peer in peers {
            node.add_peer(peer).await;
        }
        node
    }

    /// Mine a valid successor of the node's head on a copy of its chain
    async fn next_block(node: &Node, miner: &Address) -> Block {
        let mut copy = node.blockchain.read().await.clone();
        mine_block(&mut copy, miner).await
    }

    #[tokio::test]
    async fn test_add_peer() {
        let node = node_with(Arc::new(MockTransport::default()), &[]).await;
        assert!(node.add_peer("http://localhost:5802").await);
        assert!(!node.add_peer("http://localhost:5802/").await);
        assert!(!node.add_peer(&node.url()).await);
        assert_eq!(node.peers().await, vec!["http://localhost:5802".to_string()]);
    }

    #[tokio::test]
    async fn test_accepts_next_block_and_forwards() {
        let transport = Arc::new(MockTransport::default());
        let node = node_with(transport.clone(), &["http://peer-a", "http://peer-b"]).await;

        let block = next_block(&node, &Address::from("remote")).await;
        let envelope = Envelope::for_block(&block).unwrap();

        assert_eq!(node.handle_block(envelope.clone()).await, Disposition::Accepted);
        assert_eq!(node.chain_len().await, 2);
        assert_eq!(node.get_balance(&Address::from("remote")).await, 10);

        let forwarded = transport.posts_to(ADD_BLOCK_PATH);
        assert_eq!(forwarded.len(), 2);
        assert!(forwarded.iter().all(|(_, e)| e.token == envelope.token));
    }

    #[tokio::test]
    async fn test_redelivered_block_has_no_second_effect() {
        let transport = Arc::new(MockTransport::default());
        let node = node_with(transport.clone(), &["http://peer-a"]).await;

        let block = next_block(&node, &Address::from("remote")).await;
        let envelope = Envelope::for_block(&block).unwrap();

        assert_eq!(node.handle_block(envelope.clone()).await, Disposition::Accepted);
        assert_eq!(node.handle_block(envelope).await, Disposition::Duplicate);

        assert_eq!(node.chain_len().await, 2);
        assert_eq!(transport.posts_to(ADD_BLOCK_PATH).len(), 1);
    }

    #[tokio::test]
    async fn test_own_broadcast_is_not_reprocessed() {
        let transport = Arc::new(MockTransport::default());
        let node = node_with(transport.clone(), &["http://peer-a"]).await;

        let block = next_block(&node, &Address::from("remote")).await;
        let envelope = Envelope::for_block(&block).unwrap();
        node.broadcast(ADD_BLOCK_PATH, &envelope).await;

        // Echo of our own message
        assert_eq!(node.handle_block(envelope).await, Disposition::Duplicate);
        assert_eq!(node.chain_len().await, 1);
    }

    #[tokio::test]
    async fn test_rejects_invalid_block() {
        let transport = Arc::new(MockTransport::default());
        let node = node_with(transport.clone(), &["http://peer-a"]).await;

        let mut block = next_block(&node, &Address::from("remote")).await;
        block.transactions[0].outputs[0].amount = 1_000;
        let envelope = Envelope::for_block(&block).unwrap();

        assert!(matches!(node.handle_block(envelope).await, Disposition::Rejected(_)));
        assert_eq!(node.chain_len().await, 1);
        assert!(transport.posts_to(ADD_BLOCK_PATH).is_empty());

        let garbage = Envelope::new("{\"index\": \"one\"}".to_string());
        assert!(matches!(node.handle_block(garbage).await, Disposition::Rejected(_)));
    }

    #[tokio::test]
    async fn test_ignores_stale_block() {
        let node = node_with(Arc::new(MockTransport::default()), &[]).await;
        let block = next_block(&node, &Address::from("remote")).await;
        node.handle_block(Envelope::for_block(&block).unwrap()).await;

        // Same block content under a new token
        let again = Envelope::for_block(&block).unwrap();
        assert_eq!(node.handle_block(again).await, Disposition::Stale);
        let genesis = Envelope::for_block(&Block::genesis()).unwrap();
        assert_eq!(node.handle_block(genesis).await, Disposition::Stale);
    }

    #[tokio::test]
    async fn test_orphan_block_triggers_resync() {
        let remote = Address::from("remote");
        let peer_chain = mined_chain(&remote, 4).await;
        let orphan = peer_chain.head().clone();

        let mut transport = MockTransport::default();
        transport
            .chains
            .insert("http://peer-a".to_string(), peer_chain.to_json().unwrap());
        let node = node_with(Arc::new(transport), &["http://peer-a"]).await;

        let envelope = Envelope::for_block(&orphan).unwrap();
        assert_eq!(node.handle_block(envelope).await, Disposition::Orphan);

        assert_eq!(node.chain_len().await, 5);
        assert_eq!(node.head().await, orphan);
        assert_eq!(node.get_balance(&remote).await, 40);
    }

    #[tokio::test]
    async fn test_sync_isolates_failing_peers() {
        let remote = Address::from("remote");
        let short = mined_chain(&remote, 1).await;
        let long = mined_chain(&remote, 3).await;

        let mut tampered = mined_chain(&remote, 6).await.snapshot();
        tampered.blocks[2].nonce += 1;

        let mut transport = MockTransport::default();
        transport.chains.insert("http://short".to_string(), short.to_json().unwrap());
        transport.chains.insert("http://long".to_string(), long.to_json().unwrap());
        transport.chains.insert(
            "http://tampered".to_string(),
            serde_json::to_string(&tampered).unwrap(),
        );
        transport.chains.insert("http://garbage".to_string(), "<html>".to_string());
        transport.hanging.insert("http://slow".to_string());

        let peers = ["http://short", "http://slow", "http://tampered", "http://garbage", "http://missing", "http://long"];
        let node = node_with(Arc::new(transport), &peers).await;

        assert!(node.ask_for_blockchain().await.unwrap());
        assert_eq!(node.chain_len().await, 4);
        assert_eq!(node.head().await, *long.head());

        // Nothing longer on offer the second time round
        assert!(!node.ask_for_blockchain().await.unwrap());
    }

    #[tokio::test]
    async fn test_sync_replaces_diverged_chain() {
        let mut transport = MockTransport::default();
        let peer_chain = mined_chain(&Address::from("remote"), 4).await;
        transport
            .chains
            .insert("http://peer-a".to_string(), peer_chain.to_json().unwrap());
        let node = node_with(Arc::new(transport), &["http://peer-a"]).await;

        for _ in 0..2 {
            let block = next_block(&node, &Address::from("local-miner")).await;
            node.handle_block(Envelope::for_block(&block).unwrap()).await;
        }
        assert_eq!(node.chain_len().await, 3);

        assert!(node.ask_for_blockchain().await.unwrap());
        assert_eq!(node.chain_len().await, 5);
        assert_eq!(node.get_balance(&Address::from("local-miner")).await, 0);
        assert_eq!(node.get_balance(&Address::from("remote")).await, 40);
    }

    #[tokio::test]
    async fn test_transaction_gossip() {
        let mut keystore = Keystore::new();
        let a = keystore.new_address();
        let b = keystore.new_address();

        let transport = Arc::new(MockTransport::default());
        let node = node_with(transport.clone(), &["http://peer-a"]).await;
        let block = next_block(&node, &a).await;
        node.handle_block(Envelope::for_block(&block).unwrap()).await;

        let tx = {
            let chain = node.blockchain.read().await;
            TransactionBuilder::new(&keystore, chain.utxo_set())
                .build(&a, &b, 4)
                .unwrap()
        };
        let envelope = Envelope::for_transaction(&tx).unwrap();

        assert_eq!(node.handle_transaction(envelope.clone()).await, Disposition::Accepted);
        assert_eq!(node.handle_transaction(envelope).await, Disposition::Duplicate);
        assert_eq!(node.pending_transactions().await.len(), 1);
        assert_eq!(transport.posts_to(TRANSACTIONS_PATH).len(), 1);

        // Same transaction under a fresh token is refused by the mempool
        assert!(matches!(node.submit_transaction(&tx).await, Disposition::Rejected(_)));
    }

    #[tokio::test]
    async fn test_greet_peers_survives_failures() {
        let mut transport = MockTransport::default();
        transport.failing.insert("http://down".to_string());
        let transport = Arc::new(transport);

        let mut config = config();
        config.peers = vec!["http://up".to_string(), "http://down".to_string()];
        let node = Node::new(config, transport.clone());

        node.greet_peers().await;

        assert_eq!(node.peers().await.len(), 2);
        let greetings = transport.posts_to(ADD_PEER_PATH);
        assert_eq!(greetings.len(), 1);
        assert_eq!(greetings[0].0, "http://up");
        assert_eq!(greetings[0].1.decode_peer(), "http://localhost:5801");
    }

    #[tokio::test]
    async fn test_handle_add_peer() {
        let node = node_with(Arc::new(MockTransport::default()), &[]).await;

        let envelope = Envelope::for_peer("http://localhost:5802").unwrap();
        assert_eq!(node.handle_add_peer(envelope.clone()).await, Disposition::Accepted);
        assert_eq!(node.handle_add_peer(envelope).await, Disposition::Duplicate);

        let again = Envelope::for_peer("http://localhost:5802").unwrap();
        assert_eq!(node.handle_add_peer(again).await, Disposition::Stale);
    }

    /// Control and parent of the loop's current attempt, once it is hashing
    async fn running_job(node: &Node) -> (MiningControl, Hash256) {
        loop {
            if let Some(job) = node.current_mining.lock().await.as_ref() {
                if job.control.state() == MiningState::Mining {
                    return (job.control.clone(), job.parent);
                }
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    #[tokio::test]
    async fn test_accepted_block_preempts_mining_loop() {
        // The loop mines at an unreachable difficulty while the ledger
        // accepts difficulty 1, so only an incoming block can end an attempt
        let mut config = config();
        config.params = ChainParams::new(64, TEST_PARAMS.reward);
        let node = Arc::new(Node::new(config, Arc::new(MockTransport::default())));
        *node.blockchain.write().await = Blockchain::new(TEST_PARAMS);

        let handle = node.start_mining();
        let (control, parent) = running_job(&node).await;
        assert_eq!(parent, Block::genesis().hash);

        let block = next_block(&node, &Address::from("remote")).await;
        assert_eq!(node.handle_block(Envelope::for_block(&block).unwrap()).await, Disposition::Accepted);

        let restarted = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let (next, parent) = running_job(&node).await;
                if parent == block.hash {
                    return next;
                }
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("mining loop restarted on the new head");

        assert_eq!(control.state(), MiningState::Aborted);
        assert_eq!(restarted.state(), MiningState::Mining);
        assert_eq!(node.head().await, block);

        node.stop_mining().await;
        handle.await.unwrap();
        assert_eq!(restarted.state(), MiningState::Aborted);
        assert_eq!(node.chain_len().await, 2);
    }

    #[tokio::test]
    async fn test_mining_loop_mines_and_broadcasts() {
        let transport = Arc::new(MockTransport::default());
        let node = Arc::new(node_with(transport.clone(), &["http://peer-a"]).await);

        let handle = node.start_mining();
        while node.chain_len().await < 3 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        node.stop_mining().await;
        handle.await.unwrap();

        assert!(!node.is_mining());
        let len = node.chain_len().await;
        assert!(len >= 3);
        assert_eq!(node.get_balance(&Address::from("local-miner")).await, 10 * (len as u64 - 1));
        assert_eq!(transport.posts_to(ADD_BLOCK_PATH).len(), len - 1);
        assert!(node.blockchain.read().await.is_valid(true));
    }

    #[tokio::test]
    async fn test_chain_file_written_and_loaded() {
        let dir = std::env::temp_dir().join(format!("pow-ledger-node-{}", uuid::Uuid::new_v4()));
        let mut config = config();
        config.data_dir = Some(dir.clone());

        let node = Node::new(config.clone(), Arc::new(MockTransport::default()));
        assert!(!node.load_from_disk().await.unwrap());
        let first = next_block(&node, &Address::from("remote")).await;
        node.handle_block(Envelope::for_block(&first).unwrap()).await;
        let block = next_block(&node, &Address::from("remote")).await;
        node.handle_block(Envelope::for_block(&block).unwrap()).await;

        // Written after the chain lock is released; the ledger stays usable
        assert!(node.blockchain.try_write().is_ok());

        let restarted = Node::new(config, Arc::new(MockTransport::default()));
        assert!(restarted.load_from_disk().await.unwrap());
        assert_eq!(restarted.head().await, block);
        assert_eq!(restarted.chain_len().await, 3);

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_disposition_json() {
        assert_eq!(
            serde_json::to_value(Disposition::Accepted).unwrap(),
            serde_json::json!({"status": "accepted"})
        );
        assert_eq!(
            serde_json::to_value(Disposition::Rejected("bad".to_string())).unwrap(),
            serde_json::json!({"status": "rejected", "reason": "bad"})
        );
    }
}
