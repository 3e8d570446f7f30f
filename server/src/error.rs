//! Error types for the lobby server

use shared::CONNECTION_REFUSED;
use std::time::Duration;
use thiserror::Error;

/// A join attempt that was refused before any session was registered
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct InvalidJoin {
    pub code: &'static str,
    pub message: &'static str,
}

impl InvalidJoin {
    pub fn no_identity() -> Self {
        Self {
            code: CONNECTION_REFUSED,
            message: "no identity provided",
        }
    }

    pub fn already_connected() -> Self {
        Self {
            code: CONNECTION_REFUSED,
            message: "client already connected",
        }
    }
}

/// Failures of the persistent display-name store
#[derive(Debug, Error)]
pub enum NameStoreError {
    #[error("no stored name for identity {0}")]
    NotFound(String),
    #[error("name store backend failed: {0}")]
    Backend(#[from] rusqlite::Error),
}

/// Failure to hand an event to one connection's writer
#[derive(Debug, Error)]
pub enum FanoutError {
    #[error("transport for {identity} is gone")]
    TransportGone { identity: String },
    #[error("send to {identity} timed out after {timeout:?}")]
    Timeout { identity: String, timeout: Duration },
    #[error("failed to encode events: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Server-level errors
#[derive(Debug, Error)]
pub enum LobbyError {
    #[error("invalid join: {0}")]
    InvalidJoin(#[from] InvalidJoin),
    #[error(transparent)]
    NameStore(#[from] NameStoreError),
    #[error("lobby coordinator is no longer running")]
    CoordinatorGone,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
