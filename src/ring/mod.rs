//! Consistent Hashing Module
//!
//! Deterministic mapping from a key to the peer that owns it. Every node in
//! the cluster must use the same replica count and hash function, otherwise
//! nodes disagree on ownership; [`hash_ring::HashRing::fingerprint`] makes
//! that configuration comparable across nodes.

pub mod hash_ring;
