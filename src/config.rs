// Node configuration

use crate::consensus::ChainParams;
use crate::core::Address;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 5801;
pub const DEFAULT_DATA_DIR: &str = "./user-files";
pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_SEEN_CAPACITY: usize = 10_000;

/// Everything a node needs to run
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub host: String,
    pub port: u16,
    /// Base URLs of the peers to join at startup
    pub peers: Vec<String>,
    pub params: ChainParams,
    /// Where the chain file lives; `None` keeps the ledger in memory only
    pub data_dir: Option<PathBuf>,
    /// Receives the coinbase of every locally mined block
    pub reward_address: Address,
    pub mining: bool,
    /// Restore the chain file at startup instead of asking peers
    pub load: bool,
    /// Upper bound for any single peer request
    pub request_timeout: Duration,
    /// Capacity of the gossip dedup cache
    pub seen_capacity: usize,
}

impl NodeConfig {
    /// In-memory node on `host:port` with default chain parameters
    pub fn new(host: &str, port: u16, reward_address: Address) -> Self {
        Self {
            host: host.to_string(),
            port,
            peers: Vec::new(),
            params: ChainParams::default(),
            data_dir: None,
            reward_address,
            mining: true,
            load: false,
            request_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            seen_capacity: DEFAULT_SEEN_CAPACITY,
        }
    }

    /// Base URL other nodes reach this one at
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}
