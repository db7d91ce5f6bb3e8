//! Distributed Read-Through Cache Library
//!
//! This library crate defines the coordination core of a peer-to-peer cache.
//! It serves as the foundation for the node binary (`main.rs`).
//!
//! ## Architecture Modules
//! The system is composed of five loosely coupled subsystems:
//!
//! - **`flight`**: Duplicate call suppression. Concurrent requests for one key share a
//!   single execution and its result.
//! - **`ring`**: Consistent hashing. Maps every key to exactly one owning peer, identically
//!   on every node configured with the same peer set.
//! - **`peers`**: The peer layer. Owns the peer set and routes keys to owners (`PeerPool`),
//!   calls remote peers over HTTP (`HttpPeer`) and serves their calls (the inbound handler).
//! - **`group`**: Named read-through caches backed by user loaders, plus the registry the
//!   inbound handler resolves group names against.
//! - **`error`**: The shared error vocabulary, including the structured `RemoteLoadError`.

pub mod error;
pub mod flight;
pub mod group;
pub mod peers;
pub mod ring;
