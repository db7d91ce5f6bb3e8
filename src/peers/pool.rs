use super::client::{BufferPool, HttpPeer};
use super::handlers;
use super::registry::PeerRegistry;
use super::types::{CallContext, PeerClient, PeerPicker, PeerPoolOptions};
use crate::error::CacheError;
use crate::group::registry::GroupRegistry;
use crate::ring::hash_ring::HashRing;

use axum::Router;
use axum::http::{HeaderMap, Uri};
use axum::response::Response;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Ring and transports of one topology; always replaced together.
struct Topology {
    ring: HashRing,
    peers: HashMap<String, Arc<HttpPeer>>,
}

/// Pool of HTTP peers. Owns the hash ring deciding key ownership and one
/// transport per peer, and serves the inbound side of the peer protocol.
pub struct PeerPool {
    self_url: String,
    options: PeerPoolOptions,
    fingerprint: String,
    buffers: Arc<BufferPool>,
    topology: Mutex<Topology>,
}

impl PeerPool {
    /// Creates a pool for the node reachable at `self_url` (for example
    /// `http://10.0.0.1:8000`) and installs it as the picker of `registry`.
    ///
    /// Fails with [`CacheError::PeerPoolAlreadyRegistered`] if the registry
    /// already has a pool.
    pub fn new(
        self_url: impl Into<String>,
        options: PeerPoolOptions,
        registry: &PeerRegistry,
    ) -> Result<Arc<Self>, CacheError> {
        if registry.is_registered() {
            return Err(CacheError::PeerPoolAlreadyRegistered);
        }

        let options = options.normalized();
        let ring = HashRing::new(options.replicas, Some(options.hash_fn));
        let pool = Arc::new(Self {
            self_url: self_url.into(),
            fingerprint: ring.fingerprint(),
            options,
            buffers: Arc::new(BufferPool::new()),
            topology: Mutex::new(Topology {
                ring,
                peers: HashMap::new(),
            }),
        });

        registry.register(pool.clone())?;

        tracing::info!(
            "Peer pool for {} serving {} (replicas={}, fingerprint={})",
            pool.self_url,
            pool.options.base_path,
            pool.options.replicas,
            pool.fingerprint
        );
        Ok(pool)
    }

    /// Replaces the peer set. Each peer is a base URL such as
    /// `http://10.0.0.2:8000`; the local node should be included.
    pub fn set<I, S>(&self, peers: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let peers: Vec<String> = peers.into_iter().map(Into::into).collect();

        let mut ring = HashRing::new(self.options.replicas, Some(self.options.hash_fn));
        ring.add(&peers);
        let transports = peers
            .iter()
            .map(|peer| {
                let transport = HttpPeer::new(
                    format!("{}{}", peer, self.options.base_path),
                    self.options.client.clone(),
                    self.fingerprint.clone(),
                    self.buffers.clone(),
                );
                (peer.clone(), Arc::new(transport))
            })
            .collect();

        *self.topology.lock() = Topology {
            ring,
            peers: transports,
        };

        tracing::info!("Peer set updated: {} peer(s)", peers.len());
    }

    /// Identities of the configured peers.
    pub fn peers(&self) -> Vec<String> {
        self.topology.lock().peers.keys().cloned().collect()
    }

    pub fn self_url(&self) -> &str {
        &self.self_url
    }

    pub fn options(&self) -> &PeerPoolOptions {
        &self.options
    }

    pub fn ring_fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Router serving the peer protocol for the groups in `groups`.
    pub fn router(self: &Arc<Self>, groups: Arc<GroupRegistry>) -> Router {
        handlers::router(self.clone(), groups)
    }

    pub(crate) fn request_context(&self, headers: &HeaderMap) -> CallContext {
        match &self.options.context {
            Some(factory) => factory(headers),
            None => CallContext::from_headers(headers),
        }
    }

    pub(crate) fn handle_error(&self, ctx: &CallContext, uri: &Uri, err: CacheError) -> Response {
        match &self.options.server_error_handler {
            Some(handler) => handler(ctx, uri, err),
            None => handlers::default_server_error_handler(ctx, uri, err),
        }
    }
}

impl PeerPicker for PeerPool {
    fn pick_peer(&self, key: &str) -> Option<Arc<dyn PeerClient>> {
        let topology = self.topology.lock();
        let owner = topology.ring.get(key)?;
        if owner == self.self_url {
            return None;
        }

        tracing::trace!("Key {} owned by {}", key, owner);
        topology
            .peers
            .get(owner)
            .map(|peer| peer.clone() as Arc<dyn PeerClient>)
    }

    fn get_all(&self) -> Vec<Arc<dyn PeerClient>> {
        self.topology
            .lock()
            .peers
            .values()
            .map(|peer| peer.clone() as Arc<dyn PeerClient>)
            .collect()
    }
}
