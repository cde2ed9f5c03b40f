// Ledger state machine: chain, mempool and unspent outputs

mod blockchain;
mod codec;

pub use blockchain::Blockchain;
pub use codec::{ChainSnapshot, DecodeError};
