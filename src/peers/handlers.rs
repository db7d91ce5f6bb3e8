use super::pool::PeerPool;
use super::protocol::{CONTENT_TYPE_BINCODE, GetResponse, RING_FINGERPRINT_HEADER};
use super::types::CallContext;
use crate::error::CacheError;
use crate::group::cache::Group;
use crate::group::registry::GroupRegistry;

use axum::{
    Router,
    extract::{Path, State, rejection::PathRejection},
    http::{HeaderMap, Method, StatusCode, Uri, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
    routing::get,
};
use std::sync::Arc;
use std::sync::atomic::Ordering;

/// State shared by the peer protocol handlers.
#[derive(Clone)]
pub struct PeerServer {
    pub pool: Arc<PeerPool>,
    pub groups: Arc<GroupRegistry>,
}

pub fn router(pool: Arc<PeerPool>, groups: Arc<GroupRegistry>) -> Router {
    let base = pool.options().base_path.trim_end_matches('/').to_string();

    Router::new()
        .route(
            &format!("{}/*path", base),
            get(handle_peer_get)
                .delete(handle_peer_remove)
                .fallback(handle_unsupported_method),
        )
        .fallback(handle_unrouted)
        .with_state(PeerServer { pool, groups })
}

pub async fn handle_peer_get(
    State(server): State<PeerServer>,
    uri: Uri,
    headers: HeaderMap,
    path: Result<Path<String>, PathRejection>,
) -> Response {
    let ctx = server.accept(&headers);

    match server.serve_get(&ctx, path).await {
        Ok(response) => response,
        Err(err) => server.pool.handle_error(&ctx, &uri, err),
    }
}

pub async fn handle_peer_remove(
    State(server): State<PeerServer>,
    uri: Uri,
    headers: HeaderMap,
    path: Result<Path<String>, PathRejection>,
) -> Response {
    let ctx = server.accept(&headers);

    match server.resolve(path) {
        Ok((group, key)) => {
            group.local_remove(&key);
            tracing::debug!("Removed {}/{} on peer request", group.name(), key);
            StatusCode::OK.into_response()
        }
        Err(err) => server.pool.handle_error(&ctx, &uri, err),
    }
}

/// Any method other than GET or DELETE on a peer protocol path.
pub async fn handle_unsupported_method(
    State(server): State<PeerServer>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let ctx = server.accept(&headers);
    server
        .pool
        .handle_error(&ctx, &uri, CacheError::MethodNotAllowed(method.to_string()))
}

/// Anything outside `{base}{group}/{key}`, including the bare base path.
pub async fn handle_unrouted(
    State(server): State<PeerServer>,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let ctx = server.accept(&headers);
    let base = &server.pool.options().base_path;

    let err = if uri.path().starts_with(base.as_str()) || uri.path() == base.trim_end_matches('/') {
        missing_path_parts()
    } else {
        CacheError::UnexpectedPath(uri.path().to_string())
    };
    server.pool.handle_error(&ctx, &uri, err)
}

fn missing_path_parts() -> CacheError {
    CacheError::BadRequest("invalid request URL (missing path parts)".to_string())
}

/// Splits the decoded path below the base into group and key at the first
/// `/`. `books/` names the empty key of group `books`.
fn split_group_key(path: &str) -> Option<(&str, &str)> {
    path.split_once('/')
}

impl PeerServer {
    fn accept(&self, headers: &HeaderMap) -> CallContext {
        let ctx = self.pool.request_context(headers);

        if let Some(remote) = headers
            .get(RING_FINGERPRINT_HEADER)
            .and_then(|value| value.to_str().ok())
            && remote != self.pool.ring_fingerprint()
        {
            tracing::warn!(
                request_id = %ctx.request_id,
                "Ring fingerprint mismatch: peer={} local={}; nodes may disagree on key ownership",
                remote,
                self.pool.ring_fingerprint()
            );
        }
        ctx
    }

    fn resolve(
        &self,
        path: Result<Path<String>, PathRejection>,
    ) -> Result<(Arc<Group>, String), CacheError> {
        let Path(path) = path.map_err(|e| {
            CacheError::BadRequest(format!("invalid request URL (missing path parts): {}", e))
        })?;
        let (group_name, key) = split_group_key(&path).ok_or_else(missing_path_parts)?;
        let (group_name, key) = (group_name.to_string(), key.to_string());

        let group = self
            .groups
            .get(&group_name)
            .ok_or(CacheError::GroupNotFound(group_name))?;
        group.stats().server_requests.fetch_add(1, Ordering::Relaxed);

        Ok((group, key))
    }

    async fn serve_get(
        &self,
        ctx: &CallContext,
        path: Result<Path<String>, PathRejection>,
    ) -> Result<Response, CacheError> {
        let (group, key) = self.resolve(path)?;

        let view = group.get(ctx, &key).await?;
        let body = GetResponse::new(view.value().to_vec(), view.expire())
            .encode()
            .map_err(|e| CacheError::Codec(e.to_string()))?;

        Ok(([(CONTENT_TYPE, CONTENT_TYPE_BINCODE)], body).into_response())
    }
}

/// Logs the failure and maps it to a status code with a plain-text body.
pub fn default_server_error_handler(ctx: &CallContext, uri: &Uri, err: CacheError) -> Response {
    tracing::debug!(
        request_id = %ctx.request_id,
        "Error while retrieving cache entry for request {}: {}",
        uri,
        err
    );

    (err.status_code(), err.to_string()).into_response()
}
