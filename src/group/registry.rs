//! Group Registry
//!
//! Maps group names to live [`Group`]s so the inbound peer handler can
//! resolve the group named in a request path.

use super::cache::Group;

use dashmap::DashMap;
use std::sync::Arc;

pub struct GroupRegistry {
    groups: DashMap<String, Arc<Group>>,
}

impl GroupRegistry {
    /// Creates a new, empty registry.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers `group` under its name, replacing any group with the same name.
    pub fn register(&self, group: Arc<Group>) {
        let name = group.name().to_string();
        if self.groups.insert(name.clone(), group).is_some() {
            tracing::warn!("Replaced existing cache group: {}", name);
        } else {
            tracing::info!("Registered cache group: {}", name);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<Group>> {
        self.groups.get(name).map(|entry| entry.value().clone())
    }

    pub fn list_groups(&self) -> Vec<String> {
        self.groups.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }
}

impl Default for GroupRegistry {
    fn default() -> Self {
        Self {
            groups: DashMap::new(),
        }
    }
}
