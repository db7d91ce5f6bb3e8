use std::collections::BTreeMap;

/// Hash function used to place virtual nodes and keys on the ring.
pub type HashFn = fn(&[u8]) -> u32;

pub const DEFAULT_REPLICAS: usize = 50;

/// Fixed input hashed into the ring fingerprint.
const FINGERPRINT_PROBE: &[u8] = b"ring-fingerprint-probe";

/// CRC-32 (IEEE), the default ring hash.
pub fn crc32_hash(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// Consistent hash ring mapping keys to peer identities.
///
/// Each peer is placed `replicas` times on the ring at
/// `hash("{index}{peer}")`; a key belongs to the first virtual node at or
/// after `hash(key)`, wrapping around to the start of the ring.
#[derive(Debug, Clone)]
pub struct HashRing {
    replicas: usize,
    hash: HashFn,
    ring: BTreeMap<u32, String>,
}

impl HashRing {
    /// Creates an empty ring. `None` selects CRC-32.
    pub fn new(replicas: usize, hash: Option<HashFn>) -> Self {
        Self {
            replicas,
            hash: hash.unwrap_or(crc32_hash),
            ring: BTreeMap::new(),
        }
    }

    pub fn add<I, S>(&mut self, peers: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for peer in peers {
            let peer = peer.as_ref();
            for i in 0..self.replicas {
                let hash = (self.hash)(format!("{}{}", i, peer).as_bytes());
                self.ring.insert(hash, peer.to_string());
            }
        }
    }

    /// Returns the peer owning `key`, or `None` if the ring is empty.
    pub fn get(&self, key: &str) -> Option<&str> {
        if self.ring.is_empty() {
            return None;
        }

        let hash = (self.hash)(key.as_bytes());

        self.ring
            .range(hash..)
            .next()
            .or_else(|| self.ring.iter().next())
            .map(|(_, peer)| peer.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    pub fn replicas(&self) -> usize {
        self.replicas
    }

    /// Short digest of the replica count and hash function. Two nodes route
    /// keys identically only if their fingerprints match.
    pub fn fingerprint(&self) -> String {
        format!("{}-{:08x}", self.replicas, (self.hash)(FINGERPRINT_PROBE))
    }
}
