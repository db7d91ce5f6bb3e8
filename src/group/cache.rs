use super::types::{ByteView, GroupStats, LoaderFn};
use crate::error::CacheError;
use crate::flight::group::FlightGroup;
use crate::peers::protocol::GetRequest;
use crate::peers::registry::PeerRegistry;
use crate::peers::types::{CallContext, PeerClient};

use dashmap::DashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;
use tokio::task::JoinSet;

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// A named read-through cache.
///
/// A miss is resolved once per key across concurrent callers: by the peer
/// that owns the key when it is remote, otherwise (or when that peer fails)
/// by the group's own loader.
pub struct Group {
    name: String,
    loader: LoaderFn,
    peers: Arc<PeerRegistry>,
    main_cache: DashMap<String, ByteView>,
    loads: FlightGroup<ByteView, CacheError>,
    removals: FlightGroup<(), CacheError>,
    stats: GroupStats,
}

impl Group {
    pub fn new<F, Fut>(name: &str, peers: Arc<PeerRegistry>, loader: F) -> Arc<Self>
    where
        F: Fn(CallContext, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<ByteView>> + Send + 'static,
    {
        let loader: LoaderFn = Arc::new(move |ctx: CallContext, key: String| {
            Box::pin(loader(ctx, key))
                as Pin<Box<dyn Future<Output = anyhow::Result<ByteView>> + Send>>
        });

        Arc::new(Self {
            name: name.to_string(),
            loader,
            peers,
            main_cache: DashMap::new(),
            loads: FlightGroup::new(),
            removals: FlightGroup::new(),
            stats: GroupStats::default(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stats(&self) -> &GroupStats {
        &self.stats
    }

    /// Flight group deduplicating loads, exposed for maintenance and monitoring.
    pub fn flights(&self) -> &FlightGroup<ByteView, CacheError> {
        &self.loads
    }

    pub fn local_entry_count(&self) -> usize {
        self.main_cache.len()
    }

    /// Looks `key` up in the local store only. Expired entries are dropped.
    pub fn lookup_local(&self, key: &str) -> Option<ByteView> {
        let view = self.main_cache.get(key).map(|entry| entry.value().clone())?;
        if view.is_expired_at(SystemTime::now()) {
            self.main_cache.remove_if(key, |_, cached| cached == &view);
            return None;
        }
        Some(view)
    }

    pub async fn get(&self, ctx: &CallContext, key: &str) -> Result<ByteView, CacheError> {
        bump(&self.stats.gets);

        if let Some(view) = self.lookup_local(key) {
            bump(&self.stats.cache_hits);
            return Ok(view);
        }

        bump(&self.stats.loads);
        self.load(ctx, key).await
    }

    async fn load(&self, ctx: &CallContext, key: &str) -> Result<ByteView, CacheError> {
        let group = self;
        self.loads
            .work(key, || async move {
                // Another flight may have populated the key between our miss and now.
                if let Some(view) = group.lookup_local(key) {
                    bump(&group.stats.cache_hits);
                    return Ok(view);
                }
                bump(&group.stats.loads_deduped);

                if let Some(peer) = group.peers.pick_peer(key) {
                    match group.get_from_peer(ctx, peer.as_ref(), key).await {
                        Ok(view) => {
                            bump(&group.stats.peer_loads);
                            return Ok(view);
                        }
                        Err(e) => {
                            bump(&group.stats.peer_errors);
                            tracing::warn!(
                                request_id = %ctx.request_id,
                                "Failed to get {}/{} from peer {}, loading locally: {}",
                                group.name,
                                key,
                                peer.url(),
                                e
                            );
                        }
                    }
                }

                let view = group.get_locally(ctx, key).await?;
                bump(&group.stats.local_loads);
                group.main_cache.insert(key.to_string(), view.clone());
                Ok(view)
            })
            .await
    }

    async fn get_from_peer(
        &self,
        ctx: &CallContext,
        peer: &dyn PeerClient,
        key: &str,
    ) -> Result<ByteView, CacheError> {
        let request = GetRequest::new(self.name.as_str(), key);
        let response = peer.get(ctx, &request).await?;
        tracing::debug!("Fetched {}/{} from peer {}", self.name, key, peer.url());
        Ok(ByteView::from(response))
    }

    async fn get_locally(&self, ctx: &CallContext, key: &str) -> Result<ByteView, CacheError> {
        (self.loader)(ctx.clone(), key.to_string())
            .await
            .map_err(|e| {
                bump(&self.stats.local_load_errs);
                CacheError::load(e)
            })
    }

    /// Drops `key` from this node only. Holds the load flight lock so no new
    /// load for the group starts while the entry is removed.
    pub fn local_remove(&self, key: &str) {
        self.loads.lock(|| {
            self.main_cache.remove(key);
        });
    }

    /// Drops `key` from the owning peer, this node, and then every other
    /// peer. Concurrent removals of one key are collapsed.
    pub async fn remove(&self, ctx: &CallContext, key: &str) -> Result<(), CacheError> {
        let group = self;
        self.removals
            .work(key, || async move {
                let request = GetRequest::new(group.name.as_str(), key);

                let owner = group.peers.pick_peer(key);
                if let Some(owner) = &owner {
                    owner.remove(ctx, &request).await?;
                }

                group.local_remove(key);

                let owner_url = owner.as_ref().map(|peer| peer.url().to_string());
                let mut broadcasts = JoinSet::new();
                for peer in group.peers.get_all() {
                    if Some(peer.url()) == owner_url.as_deref() {
                        continue;
                    }
                    let ctx = ctx.clone();
                    let request = request.clone();
                    broadcasts.spawn(async move { peer.remove(&ctx, &request).await });
                }

                let mut first_error = None;
                while let Some(joined) = broadcasts.join_next().await {
                    match joined {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            tracing::warn!(
                                request_id = %ctx.request_id,
                                "Failed to remove {}/{} from peer: {}",
                                group.name,
                                key,
                                e
                            );
                            first_error.get_or_insert(e);
                        }
                        Err(e) => tracing::error!("Remove broadcast task failed: {}", e),
                    }
                }

                match first_error {
                    Some(e) => Err(e),
                    None => Ok(()),
                }
            })
            .await
    }
}
