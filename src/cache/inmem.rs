// (C) Coralbits SL 2025
// This file is part of Cachelink and is licensed under the
// GNU Affero General Public License v3.0.
// A commercial license on request is also available;
// contact info@coralbits.com for details.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::debug;

use crate::cache::types::Cache;
use crate::types::CacheError;

struct Entry {
    value: String,
    expires_at: Instant,
}

/// In-process cache with the same observable contract as the Redis client.
/// Expired entries are evicted when read.
pub struct InMemCache {
    cache: RwLock<HashMap<String, Entry>>,
}

impl InMemCache {
    pub fn new() -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Cache for InMemCache {
    fn is_alive(&self) -> bool {
        true
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        match cache.get(key).map(|entry| (entry.expires_at > now, entry.value.clone())) {
            None => Ok(None),
            Some((true, value)) => Ok(Some(value)),
            Some((false, _)) => {
                debug!("Evicting expired key={}", key);
                cache.remove(key);
                Ok(None)
            }
        }
    }

    fn set(&self, key: &str, value: &str, ttl_secs: u64) {
        // Same as Redis refusing SETEX with 0: nothing is stored
        if ttl_secs == 0 {
            debug!("Ignoring set with zero ttl, key={}", key);
            return;
        }
        let entry = Entry {
            value: value.to_string(),
            expires_at: Instant::now() + Duration::from_secs(ttl_secs),
        };
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), entry);
    }

    fn delete(&self, key: &str) {
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    async fn sync(&self) {}
}
