//! HTTP Peer Transport
//!
//! Client side of the peer protocol. Every failure is normalized into a
//! [`RemoteLoadError`] so callers can tell an unreachable peer (no status)
//! from one that rejected the call (status and body present).

use super::protocol::{GetRequest, GetResponse, RING_FINGERPRINT_HEADER, REQUEST_ID_HEADER};
use super::types::{CallContext, ClientFactory, PeerClient};
use crate::error::{CacheError, RemoteLoadError};

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::{Method, Response, Url};
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, OnceLock};

/// Buffers larger than this are dropped instead of returned to the pool.
const MAX_POOLED_CAPACITY: usize = 1 << 20;
const MAX_POOLED_BUFFERS: usize = 64;

/// Pool of reusable byte buffers for response bodies.
#[derive(Default)]
pub struct BufferPool {
    buffers: Mutex<Vec<Vec<u8>>>,
}

impl BufferPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes an empty buffer out of the pool. It goes back when dropped.
    pub fn checkout(&self) -> PooledBuffer<'_> {
        let mut buf = self.buffers.lock().pop().unwrap_or_default();
        buf.clear();
        PooledBuffer { pool: self, buf }
    }

    pub fn idle(&self) -> usize {
        self.buffers.lock().len()
    }
}

pub struct PooledBuffer<'a> {
    pool: &'a BufferPool,
    buf: Vec<u8>,
}

impl Deref for PooledBuffer<'_> {
    type Target = Vec<u8>;

    fn deref(&self) -> &Vec<u8> {
        &self.buf
    }
}

impl DerefMut for PooledBuffer<'_> {
    fn deref_mut(&mut self) -> &mut Vec<u8> {
        &mut self.buf
    }
}

impl Drop for PooledBuffer<'_> {
    fn drop(&mut self) {
        if self.buf.capacity() > MAX_POOLED_CAPACITY {
            return;
        }
        let mut buffers = self.pool.buffers.lock();
        if buffers.len() < MAX_POOLED_BUFFERS {
            buffers.push(std::mem::take(&mut self.buf));
        }
    }
}

fn default_client() -> reqwest::Client {
    static CLIENT: OnceLock<reqwest::Client> = OnceLock::new();
    CLIENT.get_or_init(reqwest::Client::new).clone()
}

/// Transport to one remote peer.
pub struct HttpPeer {
    base_url: String,
    client: Option<ClientFactory>,
    fingerprint: String,
    buffers: Arc<BufferPool>,
}

impl HttpPeer {
    pub fn new(
        base_url: impl Into<String>,
        client: Option<ClientFactory>,
        fingerprint: impl Into<String>,
        buffers: Arc<BufferPool>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            client,
            fingerprint: fingerprint.into(),
            buffers,
        }
    }

    fn request_url(&self, request: &GetRequest) -> Result<Url, CacheError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| RemoteLoadError::new(request, e))?;
        url.path_segments_mut()
            .map_err(|_| {
                RemoteLoadError::new(
                    request,
                    anyhow::anyhow!("peer URL cannot be a base: {}", self.base_url),
                )
            })?
            .pop_if_empty()
            .push(&request.group)
            .push(&request.key);
        Ok(url)
    }

    async fn send(
        &self,
        ctx: &CallContext,
        method: Method,
        request: &GetRequest,
    ) -> Result<Response, CacheError> {
        let url = self.request_url(request)?;
        let client = match &self.client {
            Some(factory) => factory(ctx),
            None => default_client(),
        };

        let mut builder = client
            .request(method, url)
            .header(REQUEST_ID_HEADER, ctx.request_id.as_str())
            .header(RING_FINGERPRINT_HEADER, self.fingerprint.as_str());
        if let Some(timeout) = ctx.timeout {
            builder = builder.timeout(timeout);
        }

        builder.send().await.map_err(|e| {
            tracing::debug!("Peer {} unreachable: {}", self.base_url, e);
            RemoteLoadError::new(request, e).into()
        })
    }
}

async fn read_body(response: &mut Response, buf: &mut Vec<u8>) -> Result<(), reqwest::Error> {
    while let Some(chunk) = response.chunk().await? {
        buf.extend_from_slice(&chunk);
    }
    Ok(())
}

#[async_trait]
impl PeerClient for HttpPeer {
    async fn get(
        &self,
        ctx: &CallContext,
        request: &GetRequest,
    ) -> Result<GetResponse, CacheError> {
        let mut response = self.send(ctx, Method::GET, request).await?;
        let status = response.status();

        let mut buf = self.buffers.checkout();
        let read = read_body(&mut response, &mut buf).await;

        if !status.is_success() {
            return Err(RemoteLoadError::new(
                request,
                anyhow::anyhow!("non-OK response code: {}", status),
            )
            .with_response(status, Some(buf.to_vec()))
            .into());
        }
        if let Err(e) = read {
            return Err(RemoteLoadError::new(request, e)
                .with_response(status, None)
                .into());
        }

        GetResponse::decode(&buf).map_err(|e| {
            RemoteLoadError::new(request, e)
                .with_response(status, Some(buf.to_vec()))
                .into()
        })
    }

    async fn remove(&self, ctx: &CallContext, request: &GetRequest) -> Result<(), CacheError> {
        let mut response = self.send(ctx, Method::DELETE, request).await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let mut buf = self.buffers.checkout();
        let body = match read_body(&mut response, &mut buf).await {
            Ok(()) => Some(buf.to_vec()),
            Err(_) => None,
        };
        Err(RemoteLoadError::new(
            request,
            anyhow::anyhow!("server returned status {}", status),
        )
        .with_response(status, body)
        .into())
    }

    fn url(&self) -> &str {
        &self.base_url
    }
}
