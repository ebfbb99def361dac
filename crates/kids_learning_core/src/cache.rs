//! crates/kids_learning_core/src/cache.rs
//!
//! A typed view over the injected local key-value store.
//!
//! Every value is wrapped in an envelope recording the policy generation and
//! the time it was stored. A read is a miss when the entry is absent, does not
//! parse, was written under another generation, or (with a TTL) is too old.
//! The default policy has no TTL, so entries never expire on their own.

use crate::ports::KeyValueStore;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const ROLE_KEY: &str = "role-cache";
pub const PROFILE_KEY: &str = "profile-cache";
pub const LESSONS_PREFIX: &str = "lessons-cache:";

/// The key under which one page of a subject's lessons is cached.
/// The first page uses the bare subject; later pages append the cursor.
pub fn lessons_key(subject: &str, cursor: Option<&str>) -> String {
    match cursor {
        None => format!("{}{}", LESSONS_PREFIX, subject),
        Some(cursor) => format!("{}{}@{}", LESSONS_PREFIX, subject, cursor),
    }
}

/// Expiry rules for cached entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CachePolicy {
    /// Entries at least this old are misses. `None` keeps them forever.
    pub ttl: Option<Duration>,
    /// Entries written under another generation are misses.
    pub generation: u64,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope<T> {
    generation: u64,
    stored_at: DateTime<Utc>,
    data: T,
}

#[derive(Clone)]
pub struct LocalCache {
    store: Arc<dyn KeyValueStore>,
    policy: CachePolicy,
}

impl LocalCache {
    pub fn new(store: Arc<dyn KeyValueStore>, policy: CachePolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.store.get(key)?;
        let envelope: Envelope<T> = match serde_json::from_str(&raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!(key, "discarding unreadable cache entry: {}", e);
                return None;
            }
        };

        if envelope.generation != self.policy.generation {
            debug!(key, "cache entry from generation {} ignored", envelope.generation);
            return None;
        }
        if let Some(ttl) = self.policy.ttl {
            let age = (Utc::now() - envelope.stored_at).to_std().unwrap_or_default();
            if age >= ttl {
                debug!(key, "cache entry expired");
                return None;
            }
        }

        debug!(key, "cache hit");
        Some(envelope.data)
    }

    pub fn put<T: Serialize>(&self, key: &str, value: &T) {
        let envelope = Envelope {
            generation: self.policy.generation,
            stored_at: Utc::now(),
            data: value,
        };
        match serde_json::to_string(&envelope) {
            Ok(raw) => self.store.set(key, raw),
            Err(e) => debug!(key, "value not cacheable: {}", e),
        }
    }

    pub fn clear(&self, key: &str) {
        self.store.remove(key);
    }

    pub fn clear_prefix(&self, prefix: &str) {
        for key in self.store.keys() {
            if key.starts_with(prefix) {
                self.store.remove(&key);
            }
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.store.get(key).is_some()
    }
}
