// Peer transport and gossip dedup cache

use crate::network::message::{Envelope, BLOCKCHAIN_PATH};
use async_trait::async_trait;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request to {peer} failed: {message}")]
    Request { peer: String, message: String },
    #[error("request to {peer} timed out")]
    Timeout { peer: String },
    #[error("peer {peer} answered with status {status}")]
    Status { peer: String, status: u16 },
}

/// Outbound calls to other nodes. Peers are identified by base URL.
#[async_trait]
pub trait Transport: Send + Sync {
    /// POST an envelope to `peer` + `endpoint`
    async fn post(&self, peer: &str, endpoint: &str, envelope: &Envelope) -> Result<(), TransportError>;

    /// GET the peer's chain as JSON
    async fn fetch_blockchain(&self, peer: &str) -> Result<String, TransportError>;
}

/// `Transport` over HTTP with a per-request timeout
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Request {
                peer: String::new(),
                message: e.to_string(),
            })?;
        Ok(Self { client })
    }

    fn map_error(peer: &str, e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout { peer: peer.to_string() }
        } else if let Some(status) = e.status() {
            TransportError::Status {
                peer: peer.to_string(),
                status: status.as_u16(),
            }
        } else {
            TransportError::Request {
                peer: peer.to_string(),
                message: e.to_string(),
            }
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(&self, peer: &str, endpoint: &str, envelope: &Envelope) -> Result<(), TransportError> {
        self.client
            .post(format!("{}{}", peer, endpoint))
            .json(envelope)
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .map_err(|e| Self::map_error(peer, e))?;
        Ok(())
    }

    async fn fetch_blockchain(&self, peer: &str) -> Result<String, TransportError> {
        let resp = self
            .client
            .get(format!("{}{}", peer, BLOCKCHAIN_PATH))
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .map_err(|e| Self::map_error(peer, e))?;
        resp.text().await.map_err(|e| Self::map_error(peer, e))
    }
}

/// Tokens of envelopes already processed, bounded with LRU eviction
pub struct SeenCache {
    tokens: Mutex<LruCache<String, ()>>,
}

impl SeenCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            tokens: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Record `token`; false if it was already there
    pub async fn insert(&self, token: &str) -> bool {
        let mut tokens = self.tokens.lock().await;
        if tokens.contains(token) {
            tokens.promote(token);
            return false;
        }
        tokens.put(token.to_string(), ());
        true
    }

    pub async fn contains(&self, token: &str) -> bool {
        self.tokens.lock().await.contains(token)
    }

    pub async fn len(&self) -> usize {
        self.tokens.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_seen_cache_dedup() {
        let cache = SeenCache::new(10);
        assert!(cache.insert("a").await);
        assert!(!cache.insert("a").await);
        assert!(cache.contains("a").await);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_seen_cache_evicts_oldest() {
        let cache = SeenCache::new(2);
        cache.insert("a").await;
        cache.insert("b").await;
        // Touch "a" so "b" is the eviction candidate
        assert!(!cache.insert("a").await);
        cache.insert("c").await;

        assert!(cache.contains("a").await);
        assert!(!cache.contains("b").await);
        assert!(cache.contains("c").await);
        assert_eq!(cache.len().await, 2);
    }

    #[tokio::test]
    async fn test_zero_capacity_still_dedups_latest() {
        let cache = SeenCache::new(0);
        assert!(cache.insert("a").await);
        assert!(!cache.insert("a").await);
    }

    #[test]
    fn test_http_transport_builds() {
        assert!(HttpTransport::new(Duration::from_millis(100)).is_ok());
    }
}
