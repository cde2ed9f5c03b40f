// Chain file: the whole ledger as one JSON document per node

use crate::chain::{Blockchain, DecodeError};
use crate::consensus::ChainParams;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CHAIN_FILE_NAME: &str = "blockchain.json";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("chain file I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode blockchain: {0}")]
    Encode(serde_json::Error),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Location of a node's chain file, `<data_dir>/<port>/blockchain.json`
#[derive(Debug, Clone)]
pub struct ChainStore {
    path: PathBuf,
}

impl ChainStore {
    pub fn new<P: AsRef<Path>>(data_dir: P, port: u16) -> Self {
        Self {
            path: data_dir.as_ref().join(port.to_string()).join(CHAIN_FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Encode the ledger for `save`
    pub fn encode(chain: &Blockchain) -> Result<String, StorageError> {
        chain.to_json().map_err(StorageError::Encode)
    }

    /// Write an encoded ledger, replacing the previous file in one rename.
    /// Blocking; async callers run it off the runtime.
    pub fn save(&self, json: &str) -> Result<(), StorageError> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;

        log::debug!("Saved chain file {} ({} bytes)", self.path.display(), json.len());
        Ok(())
    }

    /// Read and fully revalidate the ledger
    pub fn load(&self, params: ChainParams) -> Result<Blockchain, StorageError> {
        let json = fs::read_to_string(&self.path)?;
        let chain = Blockchain::from_json(&json, params)?;
        log::info!("Loaded {} blocks from {}", chain.len(), self.path.display());
        Ok(chain)
    }
}
