use crate::peers::protocol::GetResponse;
use crate::peers::types::CallContext;

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

/// Immutable cached value with an optional expiration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteView {
    value: Arc<[u8]>,
    expire: Option<SystemTime>,
}

impl ByteView {
    pub fn new(value: impl Into<Vec<u8>>) -> Self {
        Self {
            value: Arc::from(value.into()),
            expire: None,
        }
    }

    pub fn with_expire(mut self, expire: SystemTime) -> Self {
        self.expire = Some(expire);
        self
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    pub fn expire(&self) -> Option<SystemTime> {
        self.expire
    }

    pub fn len(&self) -> usize {
        self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    pub fn is_expired_at(&self, now: SystemTime) -> bool {
        self.expire.is_some_and(|expire| expire <= now)
    }
}

impl From<GetResponse> for ByteView {
    fn from(response: GetResponse) -> Self {
        let expire = response.expires_at();
        Self {
            value: Arc::from(response.value),
            expire,
        }
    }
}

/// Type alias for a thread-safe, asynchronous loader.
/// It receives the call context and the key, and resolves to the value to cache.
pub type LoaderFn = Arc<
    dyn Fn(CallContext, String) -> Pin<Box<dyn Future<Output = anyhow::Result<ByteView>> + Send>>
        + Send
        + Sync,
>;

/// Per-group instrumentation counters.
#[derive(Debug, Default)]
pub struct GroupStats {
    /// Every call to `Group::get`.
    pub gets: AtomicU64,
    /// Gets answered from the local store.
    pub cache_hits: AtomicU64,
    /// Gets that missed the local store.
    pub loads: AtomicU64,
    /// Misses that actually ran a load, after duplicate suppression.
    pub loads_deduped: AtomicU64,
    /// Values fetched from the owning peer.
    pub peer_loads: AtomicU64,
    pub peer_errors: AtomicU64,
    /// Values produced by the group's own loader.
    pub local_loads: AtomicU64,
    pub local_load_errs: AtomicU64,
    /// Requests received from other peers over the peer protocol.
    pub server_requests: AtomicU64,
}

impl GroupStats {
    pub fn snapshot(&self) -> GroupStatsSnapshot {
        let read = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        GroupStatsSnapshot {
            gets: read(&self.gets),
            cache_hits: read(&self.cache_hits),
            loads: read(&self.loads),
            loads_deduped: read(&self.loads_deduped),
            peer_loads: read(&self.peer_loads),
            peer_errors: read(&self.peer_errors),
            local_loads: read(&self.local_loads),
            local_load_errs: read(&self.local_load_errs),
            server_requests: read(&self.server_requests),
        }
    }
}

/// Point-in-time copy of [`GroupStats`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupStatsSnapshot {
    pub gets: u64,
    pub cache_hits: u64,
    pub loads: u64,
    pub loads_deduped: u64,
    pub peer_loads: u64,
    pub peer_errors: u64,
    pub local_loads: u64,
    pub local_load_errs: u64,
    pub server_requests: u64,
}
