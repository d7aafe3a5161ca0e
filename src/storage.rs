//! # Fallback Storage
//!
//! Cached last-known-good payloads served when a live endpoint is
//! unavailable. Entries carry the time they were stored and expire after a
//! configurable maximum age, so degraded responses never present data that
//! is arbitrarily stale as current.

use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value;
use tracing::debug;

use crate::constants::DEFAULT_FALLBACK_MAX_AGE_SECS;

/// Storage for last-known-good payloads keyed by service name
pub trait FallbackStore: Send + Sync {
    /// Fetch a stored payload, if present and not expired
    fn get(&self, service: &str) -> Option<Value>;

    /// Store (or replace) the payload for a service
    fn set(&self, service: &str, data: Value);

    /// Drop the stored payload for a service
    fn delete(&self, service: &str);
}

struct StoredEntry {
    data: Value,
    stored_at: DateTime<Utc>,
}

/// In-memory [`FallbackStore`] with per-entry age expiry
pub struct MemoryStore {
    entries: DashMap<String, StoredEntry>,
    max_age: Duration,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_max_age(Duration::from_secs(DEFAULT_FALLBACK_MAX_AGE_SECS))
    }

    pub fn with_max_age(max_age: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            max_age,
        }
    }

    /// When the service's payload was stored, if one is present
    pub fn stored_at(&self, service: &str) -> Option<DateTime<Utc>> {
        self.entries.get(service).map(|e| e.stored_at)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn is_expired(&self, entry: &StoredEntry) -> bool {
        let age = Utc::now().signed_duration_since(entry.stored_at);
        age.to_std().map(|age| age > self.max_age).unwrap_or(false)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FallbackStore for MemoryStore {
    fn get(&self, service: &str) -> Option<Value> {
        let expired = match self.entries.get(service) {
            Some(entry) => {
                if self.is_expired(&entry) {
                    true
                } else {
                    return Some(entry.data.clone());
                }
            }
            None => return None,
        };

        if expired {
            debug!(service = %service, "Expired fallback entry evicted");
            self.entries.remove(service);
        }
        None
    }

    fn set(&self, service: &str, data: Value) {
        self.entries.insert(
            service.to_string(),
            StoredEntry {
                data,
                stored_at: Utc::now(),
            },
        );
    }

    fn delete(&self, service: &str) {
        self.entries.remove(service);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_get_delete_round_trip() {
        let store = MemoryStore::new();
        assert!(store.get("kpis").is_none());

        store.set("kpis", json!({ "total": 42 }));
        assert_eq!(store.get("kpis").unwrap()["total"], 42);
        assert!(store.stored_at("kpis").is_some());

        store.delete("kpis");
        assert!(store.get("kpis").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_replace_updates_payload() {
        let store = MemoryStore::new();
        store.set("rates", json!({ "rate": 1 }));
        store.set("rates", json!({ "rate": 2 }));
        assert_eq!(store.get("rates").unwrap()["rate"], 2);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_expired_entries_are_evicted_on_read() {
        let store = MemoryStore::with_max_age(Duration::ZERO);
        store.set("kpis", json!({ "total": 42 }));
        std::thread::sleep(Duration::from_millis(5));

        assert!(store.get("kpis").is_none());
        assert!(store.is_empty());
    }
}
