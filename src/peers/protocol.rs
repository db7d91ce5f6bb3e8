//! Peer Wire Protocol
//!
//! Defines the HTTP layout and the messages exchanged between cache nodes.
//!
//! - `GET {base_path}{group}/{key}` answers with a bincode-encoded [`GetResponse`].
//! - `DELETE {base_path}{group}/{key}` drops the key from the serving node and answers
//!   with an empty body.
//!
//! Group and key travel percent-escaped as two path segments.

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Path prefix the peer protocol is served under.
pub const DEFAULT_BASE_PATH: &str = "/_groupcache/";
/// Content type of an encoded [`GetResponse`].
pub const CONTENT_TYPE_BINCODE: &str = "application/x-bincode";
/// Request id propagated from the calling node.
pub const REQUEST_ID_HEADER: &str = "x-request-id";
/// Ring fingerprint of the calling node.
pub const RING_FINGERPRINT_HEADER: &str = "x-ring-fingerprint";

/// Identifies one key of one group on a remote node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetRequest {
    pub group: String,
    pub key: String,
}

impl GetRequest {
    pub fn new(group: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            key: key.into(),
        }
    }
}

/// Value served by the owning node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetResponse {
    pub value: Vec<u8>,
    /// Expiration in nanoseconds since the UNIX epoch, `0` when the value never expires.
    pub expire: i64,
}

impl GetResponse {
    pub fn new(value: Vec<u8>, expire: Option<SystemTime>) -> Self {
        Self {
            value,
            expire: expire_to_nanos(expire),
        }
    }

    pub fn expires_at(&self) -> Option<SystemTime> {
        nanos_to_expire(self.expire)
    }

    pub fn encode(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }
}

pub fn expire_to_nanos(expire: Option<SystemTime>) -> i64 {
    expire
        .and_then(|at| at.duration_since(UNIX_EPOCH).ok())
        .map(|since| i64::try_from(since.as_nanos()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

pub fn nanos_to_expire(nanos: i64) -> Option<SystemTime> {
    if nanos <= 0 {
        return None;
    }
    Some(UNIX_EPOCH + Duration::from_nanos(nanos as u64))
}
