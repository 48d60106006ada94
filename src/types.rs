// (C) Coralbits SL 2025
// This file is part of Cachelink and is licensed under the
// GNU Affero General Public License v3.0.
// A commercial license on request is also available;
// contact info@coralbits.com for details.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("Connection error: {message}")]
    Connection { message: String },
    #[error("Command error: {message}")]
    Command { message: String },
    #[error("Configuration error: {message}")]
    Config { message: String },
    #[error("Runtime error: {message}")]
    Runtime { message: String },
}

impl CacheError {
    pub fn connection(message: impl Into<String>) -> Self {
        CacheError::Connection {
            message: message.into(),
        }
    }

    pub fn command(message: impl Into<String>) -> Self {
        CacheError::Command {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        CacheError::Config {
            message: message.into(),
        }
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        CacheError::Runtime {
            message: message.into(),
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            CacheError::Connection { .. } => "CONNECTION_ERROR",
            CacheError::Command { .. } => "COMMAND_ERROR",
            CacheError::Config { .. } => "CONFIG_ERROR",
            CacheError::Runtime { .. } => "RUNTIME_ERROR",
        }
    }

    pub fn is_connection(&self) -> bool {
        matches!(self, CacheError::Connection { .. })
    }
}

/// Errors that mean the link to the server is unusable, as opposed to the
/// server answering a single command with an error.
pub(crate) fn is_transport_error(err: &redis::RedisError) -> bool {
    err.is_io_error()
        || err.is_connection_dropped()
        || err.is_connection_refusal()
        || err.is_timeout()
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        if is_transport_error(&err) {
            CacheError::connection(err.to_string())
        } else {
            CacheError::command(err.to_string())
        }
    }
}
