//! Peer Routing Module
//!
//! Decides which node owns a key and talks to that node over HTTP.
//!
//! ## Core Concepts
//! - **Pool**: `PeerPool` owns the peer set, the hash ring and one transport per peer.
//!   A topology change replaces ring and transports together.
//! - **Transport**: `HttpPeer` issues `GET`/`DELETE` calls and normalizes every failure
//!   into a `RemoteLoadError`.
//! - **Server**: the handlers parse `{base_path}{group}/{key}`, resolve the group and
//!   answer with a bincode `GetResponse`. Every error goes through one pluggable hook.
//! - **Registry**: `PeerRegistry` is the explicit handle through which groups find the pool.

pub mod client;
pub mod handlers;
pub mod pool;
pub mod protocol;
pub mod registry;
pub mod types;
