//! Local Cache Group Module
//!
//! The node-local side of the cache: named groups that hold values in memory
//! and fill misses through a user-supplied loader.
//!
//! ## Core Concepts
//! - **Read-through**: `Group::get` serves hits locally; a miss is collapsed per key by a
//!   flight group, then fetched from the owning peer or loaded locally.
//! - **Invalidation**: `Group::remove` clears a key on its owner, on this node, and then
//!   broadcasts the removal to every other peer.
//! - **Registry**: `GroupRegistry` resolves group names for the inbound peer handler.

pub mod cache;
pub mod handlers;
pub mod registry;
pub mod types;
