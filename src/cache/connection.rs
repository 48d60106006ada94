// (C) Coralbits SL 2025
// This file is part of Cachelink and is licensed under the
// GNU Affero General Public License v3.0.
// A commercial license on request is also available;
// contact info@coralbits.com for details.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use tracing::{debug, error};

/// Lifecycle of the single connection a client owns. There is no way back
/// from `Errored`: the connection is never recreated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Initial = 0,
    Connecting = 1,
    Connected = 2,
    Errored = 3,
}

impl From<u8> for ConnectionState {
    fn from(value: u8) -> Self {
        match value {
            0 => ConnectionState::Initial,
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            _ => ConnectionState::Errored,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Initial => "initial",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Errored => "errored",
        };
        f.write_str(name)
    }
}

/// Connection state shared between the connection task, which reports
/// transport signals, and callers, which only read it.
#[derive(Debug)]
pub struct ConnectionStatus {
    state: AtomicU8,
}

impl ConnectionStatus {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(ConnectionState::Initial as u8),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state.load(Ordering::Acquire).into()
    }

    pub fn is_alive(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn on_connecting(&self) {
        // Only the first attempt moves out of Initial
        let _ = self.state.compare_exchange(
            ConnectionState::Initial as u8,
            ConnectionState::Connecting as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    pub fn on_connect(&self) {
        let prev: ConnectionState = self
            .state
            .compare_exchange(
                ConnectionState::Connecting as u8,
                ConnectionState::Connected as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .unwrap_or_else(|current| current)
            .into();
        if prev == ConnectionState::Connecting {
            debug!("Redis client connected to the server");
        }
    }

    pub fn on_error(&self, message: &str) {
        let prev: ConnectionState = self
            .state
            .swap(ConnectionState::Errored as u8, Ordering::AcqRel)
            .into();
        if prev != ConnectionState::Errored {
            error!("Redis client not connected to the server: {}", message);
        } else {
            debug!("Redis client already errored: {}", message);
        }
    }
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self::new()
    }
}
