use super::protocol::{DEFAULT_BASE_PATH, GetRequest, GetResponse, REQUEST_ID_HEADER};
use crate::error::CacheError;
use crate::ring::hash_ring::{DEFAULT_REPLICAS, HashFn, crc32_hash};

use async_trait::async_trait;
use axum::http::{HeaderMap, Uri};
use axum::response::Response;
use std::sync::Arc;
use std::time::Duration;

/// Per-call context threaded through every operation that may perform I/O.
///
/// The request id is forwarded to peers so one logical request can be
/// followed across nodes. The timeout bounds a single peer round trip.
#[derive(Debug, Clone)]
pub struct CallContext {
    pub request_id: String,
    pub timeout: Option<Duration>,
}

impl CallContext {
    pub fn new() -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Reuses the caller's request id when present.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut ctx = Self::new();
        if let Some(id) = headers
            .get(REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok())
        {
            ctx.request_id = id.to_string();
        }
        ctx
    }
}

impl Default for CallContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Capability set of a peer: fetch, remove, identify.
#[async_trait]
pub trait PeerClient: Send + Sync {
    async fn get(&self, ctx: &CallContext, request: &GetRequest)
    -> Result<GetResponse, CacheError>;

    async fn remove(&self, ctx: &CallContext, request: &GetRequest) -> Result<(), CacheError>;

    /// Base URL of the peer, unique within a pool.
    fn url(&self) -> &str;
}

/// Decides which peer owns a key.
pub trait PeerPicker: Send + Sync {
    /// Returns the owning peer, or `None` when the key should be served locally.
    fn pick_peer(&self, key: &str) -> Option<Arc<dyn PeerClient>>;

    /// Snapshot of every configured peer, in no particular order.
    fn get_all(&self) -> Vec<Arc<dyn PeerClient>>;
}

/// Produces the HTTP client used for one outgoing call.
pub type ClientFactory = Arc<dyn Fn(&CallContext) -> reqwest::Client + Send + Sync>;

/// Builds the context of an inbound request.
pub type ContextFactory = Arc<dyn Fn(&HeaderMap) -> CallContext + Send + Sync>;

/// Turns a failed inbound request into the response sent back to the peer.
pub type ServerErrorHandler =
    Arc<dyn Fn(&CallContext, &Uri, CacheError) -> Response + Send + Sync>;

/// Configuration of a [`super::pool::PeerPool`].
#[derive(Clone)]
pub struct PeerPoolOptions {
    /// Path under which the peer protocol is served.
    pub base_path: String,
    /// Virtual nodes per peer on the hash ring.
    pub replicas: usize,
    pub hash_fn: HashFn,
    /// Client factory for outgoing calls; a shared default client when `None`.
    pub client: Option<ClientFactory>,
    /// Context factory for inbound requests; [`CallContext::from_headers`] when `None`.
    pub context: Option<ContextFactory>,
    /// Error hook for inbound requests; [`super::handlers::default_server_error_handler`] when `None`.
    pub server_error_handler: Option<ServerErrorHandler>,
}

impl PeerPoolOptions {
    /// Fills blank fields with defaults and makes the base path `/`-delimited.
    pub(crate) fn normalized(mut self) -> Self {
        let trimmed = self.base_path.trim_matches('/');
        self.base_path = if trimmed.is_empty() && self.base_path.is_empty() {
            DEFAULT_BASE_PATH.to_string()
        } else if trimmed.is_empty() {
            "/".to_string()
        } else {
            format!("/{}/", trimmed)
        };

        if self.replicas == 0 {
            self.replicas = DEFAULT_REPLICAS;
        }
        self
    }
}

impl Default for PeerPoolOptions {
    fn default() -> Self {
        Self {
            base_path: DEFAULT_BASE_PATH.to_string(),
            replicas: DEFAULT_REPLICAS,
            hash_fn: crc32_hash,
            client: None,
            context: None,
            server_error_handler: None,
        }
    }
}

impl std::fmt::Debug for PeerPoolOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerPoolOptions")
            .field("base_path", &self.base_path)
            .field("replicas", &self.replicas)
            .field("client", &self.client.is_some())
            .field("context", &self.context.is_some())
            .field("server_error_handler", &self.server_error_handler.is_some())
            .finish()
    }
}
