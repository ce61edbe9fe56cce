//! Short-lived read cache for GET responses.
//!
//! Entries are keyed by the full request URL and tagged with the resource
//! they came from, so a write can drop exactly the list views of that
//! resource and the entries of the written record. Nested views such as
//! `pacientes/4/ventas` also go stale on any write to `ventas`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;

/// Resource and optional record id addressed by an endpoint path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceKey {
    pub resource: String,
    pub id: Option<i64>,
}

impl ResourceKey {
    /// `"pacientes/12/fichas"` -> `pacientes` + `12`; `"ventas"` -> `ventas` + none.
    pub fn from_endpoint(endpoint: &str) -> Self {
        let path = endpoint.split('?').next().unwrap_or_default();
        let mut segments = path.split('/').filter(|s| !s.is_empty());
        let resource = segments.next().unwrap_or_default().to_string();
        let id = segments.next().and_then(|s| s.parse::<i64>().ok());
        Self { resource, id }
    }

    /// Resource names appearing after the first segment, e.g. `ventas` in
    /// `pacientes/4/ventas`.
    fn nested_resources(endpoint: &str) -> Vec<String> {
        let path = endpoint.split('?').next().unwrap_or_default();
        path.split('/')
            .filter(|s| !s.is_empty())
            .skip(1)
            .filter(|s| s.parse::<i64>().is_err())
            .map(str::to_string)
            .collect()
    }

    fn covers(&self, other: &ResourceKey) -> bool {
        if self.resource != other.resource {
            return false;
        }
        match (self.id, other.id) {
            // A write without an id can touch anything of the resource
            (None, _) => true,
            // List views always reflect every record
            (Some(_), None) => true,
            (Some(a), Some(b)) => a == b,
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    key: ResourceKey,
    nested: Vec<String>,
    value: Arc<Value>,
    expires_at: Instant,
}

#[derive(Debug)]
pub struct ReadCache {
    ttl: Duration,
    entries: HashMap<String, Entry>,
}

impl ReadCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the cached body for `url` if it has not expired.
    pub fn get(&mut self, url: &str) -> Option<Arc<Value>> {
        let expired = match self.entries.get(url) {
            Some(entry) => entry.expires_at <= Instant::now(),
            None => return None,
        };
        if expired {
            self.entries.remove(url);
            return None;
        }
        self.entries.get(url).map(|e| Arc::clone(&e.value))
    }

    /// Cache the body fetched from `endpoint` under its full `url`.
    pub fn insert(&mut self, url: String, endpoint: &str, value: Arc<Value>) {
        let entry = Entry {
            key: ResourceKey::from_endpoint(endpoint),
            nested: ResourceKey::nested_resources(endpoint),
            value,
            expires_at: Instant::now() + self.ttl,
        };
        self.entries.insert(url, entry);
    }

    /// Drop every entry a write to `key` may have made stale.
    /// Returns the number of entries removed.
    pub fn invalidate(&mut self, key: &ResourceKey) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| !key.covers(&entry.key) && !entry.nested.contains(&key.resource));
        before - self.entries.len()
    }

    pub fn contains(&self, url: &str) -> bool {
        self.entries.contains_key(url)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
