// (C) Coralbits SL 2025
// This file is part of Cachelink and is licensed under the
// GNU Affero General Public License v3.0.
// A commercial license on request is also available;
// contact info@coralbits.com for details.

use once_cell::sync::OnceCell;
use std::sync::Arc;
use tracing::{info, warn};

use crate::cache::inmem::InMemCache;
use crate::cache::redis::RedisCache;
use crate::cache::types::Cache;
use crate::config::{CacheBackend, CacheConfig};
use crate::types::CacheError;

static CACHE: OnceCell<Arc<dyn Cache + Send + Sync>> = OnceCell::new();

// Main API - returns the process-wide instance, built from the environment
// on first use if init_cache was never called
pub fn cache() -> Result<Arc<dyn Cache + Send + Sync>, CacheError> {
    CACHE
        .get_or_try_init(|| build_cache(&CacheConfig::from_env()?))
        .cloned()
}

// Builds the process-wide instance. Only the first call builds anything,
// later calls get the existing instance back.
pub fn init_cache(config: &CacheConfig) -> Result<Arc<dyn Cache + Send + Sync>, CacheError> {
    let mut built = false;
    let ret = CACHE
        .get_or_try_init(|| {
            built = true;
            build_cache(config)
        })?
        .clone();
    if !built {
        warn!("Cache already initialized, ignoring new configuration");
    }
    Ok(ret)
}

pub fn build_cache(config: &CacheConfig) -> Result<Arc<dyn Cache + Send + Sync>, CacheError> {
    info!("Creating cache backend={:?}", config.backend);
    let ret: Arc<dyn Cache + Send + Sync> = match config.backend {
        CacheBackend::Inmem => Arc::new(InMemCache::new()),
        CacheBackend::Redis => Arc::new(RedisCache::new(config)?),
    };
    Ok(ret)
}
