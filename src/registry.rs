// src/registry.rs
use std::collections::BTreeMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::core::lock::{lock_rwlock_read, lock_rwlock_write};
use crate::relay::RelayCredentials;

pub type SourceId = u32;

fn default_interval() -> u64 {
    10
}

/// One configured camera.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub id: SourceId,
    #[serde(default)]
    pub name: String,
    /// `host` or `host:port`; empty means not configured yet.
    #[serde(default)]
    pub address: String,
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    #[serde(default)]
    pub enabled: bool,
}

impl Source {
    pub fn new(id: SourceId, address: &str, interval_secs: u64) -> Self {
        Self {
            id,
            name: String::new(),
            address: address.to_string(),
            interval_secs,
            enabled: false,
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn has_address(&self) -> bool {
        !self.address.trim().is_empty()
    }

    pub fn effective_interval_secs(&self) -> u64 {
        self.interval_secs.max(1)
    }
}

/// Read side of the source store. Each call returns one consistent snapshot.
pub trait SourceRegistry: Send + Sync {
    fn list_sources(&self) -> Vec<Source>;
}

/// Registry kept in memory, seeded from configuration and editable at runtime.
#[derive(Default)]
pub struct MemoryRegistry {
    sources: RwLock<BTreeMap<SourceId, Source>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sources(sources: impl IntoIterator<Item = Source>) -> Self {
        let registry = Self::new();
        for source in sources {
            registry.upsert(source);
        }
        registry
    }

    /// Adds or replaces the record with the same id. Returns the previous record.
    pub fn upsert(&self, source: Source) -> Option<Source> {
        lock_rwlock_write(&self.sources, "registry.upsert").insert(source.id, source)
    }

    pub fn remove(&self, id: SourceId) -> Option<Source> {
        lock_rwlock_write(&self.sources, "registry.remove").remove(&id)
    }

    pub fn get(&self, id: SourceId) -> Option<Source> {
        lock_rwlock_read(&self.sources, "registry.get").get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        lock_rwlock_read(&self.sources, "registry.len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SourceRegistry for MemoryRegistry {
    fn list_sources(&self) -> Vec<Source> {
        lock_rwlock_read(&self.sources, "registry.list")
            .values()
            .cloned()
            .collect()
    }
}

/// Where relay credentials come from. `None` disables uploads only.
pub trait CredentialsProvider: Send + Sync {
    fn relay_credentials(&self) -> Option<RelayCredentials>;
}

pub struct StaticCredentials(Option<RelayCredentials>);

impl StaticCredentials {
    pub fn new(credentials: Option<RelayCredentials>) -> Self {
        Self(credentials)
    }

    pub fn none() -> Self {
        Self(None)
    }
}

impl CredentialsProvider for StaticCredentials {
    fn relay_credentials(&self) -> Option<RelayCredentials> {
        self.0.clone()
    }
}
