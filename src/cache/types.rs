// (C) Coralbits SL 2025
// This file is part of Cachelink and is licensed under the
// GNU Affero General Public License v3.0.
// A commercial license on request is also available;
// contact info@coralbits.com for details.

use async_trait::async_trait;

use crate::types::CacheError;

/// Request/response access to a key-value cache.
///
/// `set` and `delete` are fire-and-forget: they return before the request is
/// answered and their outcome is never reported. A failed write is only
/// observable through a later `get`.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Whether the last transport signal was a successful connect. Never blocks.
    fn is_alive(&self) -> bool;

    /// Value stored under `key`, `None` when missing or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Stores `value` under `key`, expiring after `ttl_secs` seconds.
    fn set(&self, key: &str, value: &str, ttl_secs: u64);

    fn delete(&self, key: &str);

    /// Resolves once every request issued before this call has been answered.
    async fn sync(&self);
}
