// (C) Coralbits SL 2025
// This file is part of Cachelink and is licensed under the
// GNU Affero General Public License v3.0.
// A commercial license on request is also available;
// contact info@coralbits.com for details.

use std::time::Duration;
use std::{fs::File, io::BufReader};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::CacheError;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    Redis,
    Inmem,
}

impl std::str::FromStr for CacheBackend {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(CacheBackend::Redis),
            "inmem" => Ok(CacheBackend::Inmem),
            _ => Err(CacheError::config(format!("Invalid cache backend: {}", s))),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default)]
    pub backend: CacheBackend,
    /// Full `redis://` URL. When set, host, port, credentials and db are ignored.
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub db: i64,
    #[serde(default = "default_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub response_timeout_ms: u64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    6379
}

fn default_timeout_ms() -> u64 {
    5000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::default(),
            url: String::new(),
            host: default_host(),
            port: default_port(),
            username: None,
            password: None,
            db: 0,
            connect_timeout_ms: default_timeout_ms(),
            response_timeout_ms: default_timeout_ms(),
        }
    }
}

impl CacheConfig {
    /// Defaults overridden by the `CACHE_BACKEND` and `REDIS_*` environment variables.
    pub fn from_env() -> Result<Self, CacheError> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    pub fn apply_env(&mut self) -> Result<(), CacheError> {
        self.apply_env_from(|name| std::env::var(name).ok())
    }

    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), CacheError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(backend) = lookup("CACHE_BACKEND") {
            self.backend = backend.parse()?;
        }
        if let Some(url) = lookup("REDIS_URL") {
            self.url = url;
        }
        if let Some(host) = lookup("REDIS_HOST") {
            self.host = host;
        }
        if let Some(port) = lookup("REDIS_PORT") {
            self.port = port
                .parse()
                .map_err(|e| CacheError::config(format!("Invalid REDIS_PORT {}: {}", port, e)))?;
        }
        if let Some(username) = lookup("REDIS_USERNAME") {
            self.username = Some(username);
        }
        if let Some(password) = lookup("REDIS_PASSWORD") {
            self.password = Some(password);
        }
        if let Some(db) = lookup("REDIS_DB") {
            self.db = db
                .parse()
                .map_err(|e| CacheError::config(format!("Invalid REDIS_DB {}: {}", db, e)))?;
        }
        Ok(())
    }

    pub fn connection_url(&self) -> String {
        if !self.url.is_empty() {
            return self.url.clone();
        }
        let auth = match (&self.username, &self.password) {
            (Some(user), Some(pwd)) if !pwd.is_empty() => format!("{}:{}@", user, pwd),
            (Some(user), _) if !user.is_empty() => format!("{}@", user),
            (_, Some(pwd)) if !pwd.is_empty() => format!(":{}@", pwd),
            _ => String::new(),
        };
        format!("redis://{}{}:{}/{}", auth, self.host, self.port, self.db)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
}

impl Config {
    pub fn read(path: &str) -> anyhow::Result<Self> {
        let file = File::open(path)
            .map_err(|e| anyhow::anyhow!("Failed to open config file {}: {}", path, e))?;
        let reader = BufReader::new(file);
        let config: Config = serde_yaml::from_reader(reader)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file {}: {}", path, e))?;
        debug!("Loaded config from {}", path);
        Ok(config.postprocess())
    }

    fn postprocess(mut self) -> Self {
        self.cache.url = expand_env(&self.cache.url);
        if let Some(password) = self.cache.password.as_mut() {
            *password = expand_env(password);
        }
        self
    }

    pub fn empty() -> Self {
        Self {
            debug: false,
            cache: CacheConfig::default(),
        }
    }
}

/// Replaces every `$VAR` in `value` with its value from the environment.
/// Unset variables are left as they are.
fn expand_env(value: &str) -> String {
    let mut ret = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(pos) = rest.find('$') {
        ret.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        let name_len = after
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(after.len());
        let name = &after[..name_len];
        match std::env::var(name) {
            Ok(var) if !name.is_empty() => ret.push_str(&var),
            _ => {
                ret.push('$');
                ret.push_str(name);
            }
        }
        rest = &after[name_len..];
    }
    ret.push_str(rest);
    ret
}
