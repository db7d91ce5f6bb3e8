//! Peer Picker Registry
//!
//! Explicit handle through which cache groups discover the active peer
//! picker. A registry accepts exactly one picker; whoever owns the registry
//! therefore owns the single-pool guarantee.

use super::types::{PeerClient, PeerPicker};
use crate::error::CacheError;

use std::sync::{Arc, OnceLock};

pub struct PeerRegistry {
    picker: OnceLock<Arc<dyn PeerPicker>>,
}

impl PeerRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Installs `picker`. Fails if a picker is already installed.
    pub fn register(&self, picker: Arc<dyn PeerPicker>) -> Result<(), CacheError> {
        self.picker
            .set(picker)
            .map_err(|_| CacheError::PeerPoolAlreadyRegistered)
    }

    pub fn picker(&self) -> Option<Arc<dyn PeerPicker>> {
        self.picker.get().cloned()
    }

    pub fn is_registered(&self) -> bool {
        self.picker.get().is_some()
    }

    /// Owner of `key`, or `None` when no picker is installed or the key is local.
    pub fn pick_peer(&self, key: &str) -> Option<Arc<dyn PeerClient>> {
        self.picker.get().and_then(|picker| picker.pick_peer(key))
    }

    pub fn get_all(&self) -> Vec<Arc<dyn PeerClient>> {
        self.picker
            .get()
            .map(|picker| picker.get_all())
            .unwrap_or_default()
    }
}

impl Default for PeerRegistry {
    fn default() -> Self {
        Self {
            picker: OnceLock::new(),
        }
    }
}
