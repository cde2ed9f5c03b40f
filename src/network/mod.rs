// Peer-to-peer gossip over HTTP

pub mod api;
mod message;
mod node;
mod peer;

pub use message::{Envelope, ADD_BLOCK_PATH, ADD_PEER_PATH, BALANCE_PATH, BLOCKCHAIN_PATH, TRANSACTIONS_PATH};
pub use node::{Disposition, Node, NodeError};
pub use peer::{HttpTransport, SeenCache, Transport, TransportError};
