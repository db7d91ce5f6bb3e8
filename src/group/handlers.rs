use super::registry::GroupRegistry;
use super::types::GroupStatsSnapshot;
use crate::peers::protocol::expire_to_nanos;
use crate::peers::types::CallContext;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    routing::get,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Public endpoint for client reads through the cache.
pub const ENDPOINT_CACHE: &str = "/cache";
/// Public endpoint exposing a group's counters.
pub const ENDPOINT_STATS: &str = "/stats";

/// Public routes: read and invalidate through the cache, inspect group counters.
pub fn router(groups: Arc<GroupRegistry>) -> Router {
    Router::new()
        .route(
            &format!("{}/:group/:key", ENDPOINT_CACHE),
            get(handle_cache_get).delete(handle_cache_remove),
        )
        .route(&format!("{}/:group", ENDPOINT_STATS), get(handle_group_stats))
        .layer(Extension(groups))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CacheGetResponse {
    /// The value as UTF-8 text (lossy), `None` on failure.
    pub value: Option<String>,
    /// Expiration in nanoseconds since the UNIX epoch, `0` when the value never expires.
    pub expire: i64,
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CacheRemoveResponse {
    pub success: bool,
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GroupStatsResponse {
    pub group: String,
    pub stats: Option<GroupStatsSnapshot>,
    pub in_flight: usize,
}

pub async fn handle_cache_get(
    Extension(groups): Extension<Arc<GroupRegistry>>,
    Path((group_name, key)): Path<(String, String)>,
    headers: HeaderMap,
) -> (StatusCode, Json<CacheGetResponse>) {
    let Some(group) = groups.get(&group_name) else {
        return (
            StatusCode::NOT_FOUND,
            Json(CacheGetResponse {
                value: None,
                expire: 0,
                error: Some(format!("group not found: {}", group_name)),
            }),
        );
    };

    let ctx = CallContext::from_headers(&headers);
    match group.get(&ctx, &key).await {
        Ok(view) => (
            StatusCode::OK,
            Json(CacheGetResponse {
                value: Some(String::from_utf8_lossy(view.value()).into_owned()),
                expire: expire_to_nanos(view.expire()),
                error: None,
            }),
        ),
        Err(e) => {
            tracing::error!("Failed to get {}/{}: {}", group_name, key, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(CacheGetResponse {
                    value: None,
                    expire: 0,
                    error: Some(e.to_string()),
                }),
            )
        }
    }
}

pub async fn handle_cache_remove(
    Extension(groups): Extension<Arc<GroupRegistry>>,
    Path((group_name, key)): Path<(String, String)>,
    headers: HeaderMap,
) -> (StatusCode, Json<CacheRemoveResponse>) {
    let Some(group) = groups.get(&group_name) else {
        return (
            StatusCode::NOT_FOUND,
            Json(CacheRemoveResponse {
                success: false,
                error: Some(format!("group not found: {}", group_name)),
            }),
        );
    };

    let ctx = CallContext::from_headers(&headers);
    match group.remove(&ctx, &key).await {
        Ok(()) => (
            StatusCode::OK,
            Json(CacheRemoveResponse {
                success: true,
                error: None,
            }),
        ),
        Err(e) => {
            tracing::error!("Failed to remove {}/{}: {}", group_name, key, e);
            (
                StatusCode::BAD_GATEWAY,
                Json(CacheRemoveResponse {
                    success: false,
                    error: Some(e.to_string()),
                }),
            )
        }
    }
}

pub async fn handle_group_stats(
    Extension(groups): Extension<Arc<GroupRegistry>>,
    Path(group_name): Path<String>,
) -> (StatusCode, Json<GroupStatsResponse>) {
    match groups.get(&group_name) {
        Some(group) => (
            StatusCode::OK,
            Json(GroupStatsResponse {
                group: group_name,
                stats: Some(group.stats().snapshot()),
                in_flight: group.flights().count(),
            }),
        ),
        None => (
            StatusCode::NOT_FOUND,
            Json(GroupStatsResponse {
                group: group_name,
                stats: None,
                in_flight: 0,
            }),
        ),
    }
}
