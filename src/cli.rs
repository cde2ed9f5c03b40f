// Command line arguments

use crate::config::{NodeConfig, DEFAULT_DATA_DIR, DEFAULT_HOST, DEFAULT_PORT, DEFAULT_SEEN_CAPACITY, DEFAULT_TIMEOUT_MS};
use crate::consensus::ChainParams;
use crate::core::Address;
use crate::wallet::KeyPair;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "pow-ledger")]
#[command(about = "Proof-of-work ledger node with peer gossip", long_about = None)]
pub struct Cli {
    /// Host name peers use to reach this node
    #[arg(long, default_value = DEFAULT_HOST)]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Peer to join, e.g. http://localhost:5802 (repeatable)
    #[arg(long = "join", value_name = "URL")]
    pub join: Vec<String>,

    /// Restore the saved chain instead of asking peers
    #[arg(long)]
    pub load: bool,

    /// Do not mine
    #[arg(long)]
    pub lazy: bool,

    /// Leading zero hex digits required in block hashes
    #[arg(long, default_value_t = 4)]
    pub difficulty: u32,

    /// Block reward
    #[arg(long, default_value_t = 10)]
    pub reward: u64,

    /// Directory holding <port>/blockchain.json
    #[arg(long, default_value = DEFAULT_DATA_DIR)]
    pub data_dir: PathBuf,

    /// Address receiving mining rewards (default: a fresh key pair)
    #[arg(long)]
    pub reward_address: Option<String>,

    /// Peer request timeout in milliseconds
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_MS)]
    pub timeout_ms: u64,

    /// Number of gossip message tokens remembered
    #[arg(long, default_value_t = DEFAULT_SEEN_CAPACITY)]
    pub seen_capacity: usize,
}

impl Cli {
    pub fn into_config(self) -> NodeConfig {
        let reward_address = match self.reward_address {
            Some(address) => Address::new(address),
            None => {
                let keypair = KeyPair::generate();
                log::info!("Generated reward address {}", keypair.address);
                log::info!("Reward address secret key: {}", keypair.secret_hex());
                keypair.address
            }
        };

        let mut config = NodeConfig::new(&self.host, self.port, reward_address);
        config.peers = self.join;
        config.params = ChainParams::new(self.difficulty, self.reward);
        config.data_dir = Some(self.data_dir);
        config.mining = !self.lazy;
        config.load = self.load;
        config.request_timeout = Duration::from_millis(self.timeout_ms);
        config.seen_capacity = self.seen_capacity;
        config
    }
}
