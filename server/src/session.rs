//! Per-connection lobby state
//!
//! A [`Session`] exists only for connections that completed the join step.
//! It owns the sending half of the connection's outbound queue; the writer
//! task on the other end forwards each queued frame to the websocket and
//! closes the socket once every sender is gone.

use crate::error::FanoutError;
use log::debug;
use shared::{Event, RosterEntry, ServerEnvelope};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::SendTimeoutError};
use tokio_tungstenite::tungstenite::Message;

/// Number of frames that may wait in a connection's outbound queue
pub const OUTBOUND_CAPACITY: usize = 64;

/// Encodes `events` into a single text frame.
pub fn encode_frame(events: Vec<Event>) -> Result<Message, FanoutError> {
    let text = ServerEnvelope::new(events).encode()?;
    Ok(Message::text(text))
}

/// Delivery handle for one connection's outbound queue
#[derive(Debug, Clone)]
pub struct Outbound {
    identity: String,
    sender: mpsc::Sender<Message>,
}

impl Outbound {
    pub fn new(identity: impl Into<String>, sender: mpsc::Sender<Message>) -> Self {
        Self {
            identity: identity.into(),
            sender,
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Queues `message` for the writer, waiting at most `timeout` for room.
    ///
    /// A closed queue means the writer already exited, so the transport is
    /// gone. A full queue past the deadline is reported as a timeout; both
    /// count as failed deliveries.
    pub async fn deliver(&self, message: Message, timeout: Duration) -> Result<(), FanoutError> {
        match self.sender.send_timeout(message, timeout).await {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Closed(_)) => Err(FanoutError::TransportGone {
                identity: self.identity.clone(),
            }),
            Err(SendTimeoutError::Timeout(_)) => Err(FanoutError::Timeout {
                identity: self.identity.clone(),
                timeout,
            }),
        }
    }
}

/// A joined lobby member
#[derive(Debug)]
pub struct Session {
    /// Client-declared identity, unique within the lobby
    pub identity: String,
    /// Display name resolved once at join time
    pub name: String,
    pub ready: bool,
    pub leader: bool,
    outbound: Outbound,
}

impl Session {
    pub fn new(
        identity: String,
        name: String,
        leader: bool,
        sender: mpsc::Sender<Message>,
    ) -> Self {
        Self {
            outbound: Outbound::new(identity.clone(), sender),
            identity,
            name,
            ready: false,
            leader,
        }
    }

    pub fn outbound(&self) -> &Outbound {
        &self.outbound
    }

    pub fn roster_entry(&self) -> RosterEntry {
        RosterEntry {
            identity: self.identity.clone(),
            name: self.name.clone(),
            ready: self.ready,
            leader: self.leader,
        }
    }

    /// Sends `events` to this session only.
    pub async fn send(&self, events: Vec<Event>, timeout: Duration) -> Result<(), FanoutError> {
        debug!("sending response to {}: {:?}", self.identity, events);
        let frame = encode_frame(events)?;
        self.outbound.deliver(frame, timeout).await
    }
}
