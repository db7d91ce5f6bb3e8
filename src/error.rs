//! Error types shared by the flight group, the peer pool and the inbound handler.
//!
//! Every failure the cache core can surface is a variant of [`CacheError`].
//! The enum is `Clone` so a single leader result can be handed to every
//! follower waiting on the same flight; underlying causes are kept behind an
//! `Arc` for that reason.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use reqwest::StatusCode;

use crate::peers::protocol::GetRequest;

pub use crate::flight::group::LeaderFailed;

/// Shared, type-erased cause of a failure.
pub type BoxError = Arc<dyn StdError + Send + Sync + 'static>;

#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    /// The inbound request violated the peer protocol (missing path parts).
    #[error("{0}")]
    BadRequest(String),

    /// No group with this name is registered on the serving node.
    #[error("group not found: {0:?}")]
    GroupNotFound(String),

    /// A call to a remote peer failed.
    #[error(transparent)]
    RemoteLoad(#[from] RemoteLoadError),

    #[error(transparent)]
    LeaderFailed(#[from] LeaderFailed),

    /// A second peer pool was constructed against an occupied registry.
    #[error("peer pool already registered: only one pool may serve a registry")]
    PeerPoolAlreadyRegistered,

    /// A peer protocol path was requested with a method other than GET or DELETE.
    #[error("method not allowed: {0}")]
    MethodNotAllowed(String),

    /// The handler was reached for a path outside its base path.
    #[error("peer pool serving unexpected path: {0}")]
    UnexpectedPath(String),

    /// The group's own loader failed.
    #[error("load failed: {0:#}")]
    Load(Arc<anyhow::Error>),

    #[error("encoding response failed: {0}")]
    Codec(String),
}

impl CacheError {
    pub fn load(error: anyhow::Error) -> Self {
        CacheError::Load(Arc::new(error))
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, CacheError::RemoteLoad(_))
    }

    /// HTTP status the inbound handler answers with by default.
    pub fn status_code(&self) -> StatusCode {
        match self {
            CacheError::BadRequest(_) => StatusCode::BAD_REQUEST,
            CacheError::GroupNotFound(_) | CacheError::UnexpectedPath(_) => StatusCode::NOT_FOUND,
            CacheError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            CacheError::RemoteLoad(_)
            | CacheError::LeaderFailed(_)
            | CacheError::PeerPoolAlreadyRegistered
            | CacheError::Load(_)
            | CacheError::Codec(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Structured description of a failed cross-node RPC.
///
/// A transport failure leaves `status_code`, `status` and `body` empty; a
/// peer that answered with a non-success status fills them in, which lets
/// callers tell "peer rejected the call" apart from "peer unreachable".
#[derive(Debug, Clone)]
pub struct RemoteLoadError {
    pub group: String,
    pub key: String,

    pub status_code: Option<u16>,
    pub status: Option<String>,
    pub body: Option<Vec<u8>>,
    pub cause: BoxError,
}

impl RemoteLoadError {
    pub fn new(request: &GetRequest, cause: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self {
            group: request.group.clone(),
            key: request.key.clone(),
            status_code: None,
            status: None,
            body: None,
            cause: Arc::from(cause.into()),
        }
    }

    pub fn with_response(mut self, status: StatusCode, body: Option<Vec<u8>>) -> Self {
        self.status_code = Some(status.as_u16());
        self.status = Some(status.to_string());
        self.body = body;
        self
    }

    pub fn cause(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self.cause.as_ref()
    }
}

impl fmt::Display for RemoteLoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "remote load error: {}", self.cause)
    }
}

impl StdError for RemoteLoadError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(self.cause.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            CacheError::BadRequest("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            CacheError::GroupNotFound("g".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            CacheError::UnexpectedPath("/x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            CacheError::MethodNotAllowed("POST".into()).status_code(),
            StatusCode::METHOD_NOT_ALLOWED
        );
        assert_eq!(
            CacheError::from(LeaderFailed).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            CacheError::load(anyhow::anyhow!("boom")).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_remote_load_error_keeps_cause() {
        let request = GetRequest::new("books", "key");
        let err = RemoteLoadError::new(&request, anyhow::anyhow!("connection reset"))
            .with_response(StatusCode::BAD_GATEWAY, Some(b"upstream".to_vec()));

        assert_eq!(err.to_string(), "remote load error: connection reset");
        assert_eq!(err.status_code, Some(502));
        assert_eq!(err.status.as_deref(), Some("502 Bad Gateway"));
        assert_eq!(StdError::source(&err).unwrap().to_string(), "connection reset");

        let wrapped = CacheError::from(err);
        assert!(wrapped.is_remote());
        assert_eq!(wrapped.to_string(), "remote load error: connection reset");
    }
}
