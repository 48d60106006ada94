// (C) Coralbits SL 2025
// This file is part of Cachelink and is licensed under the
// GNU Affero General Public License v3.0.
// A commercial license on request is also available;
// contact info@coralbits.com for details.

#[allow(clippy::module_inception)]
pub mod cache;
pub mod connection;
pub mod inmem;
pub mod redis;
pub mod types;

#[cfg(test)]
pub(crate) mod testserver;

pub use cache::{build_cache, cache, init_cache};
pub use connection::ConnectionState;
pub use inmem::InMemCache;
pub use self::redis::RedisCache;
pub use types::Cache;
