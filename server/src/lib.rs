//! # Lobby Server Library
//!
//! This library provides the realtime lobby coordinator for the multiplayer
//! game. Clients open a websocket, announce an identity, and then exchange
//! ready status, chat and the game-start handshake with every other client
//! in the single shared lobby until a match begins.
//!
//! ## Core Responsibilities
//!
//! ### Session Lifecycle
//! Each connection moves through `Unauthenticated -> Joined -> Closed`:
//! - The first envelope must carry an identity that nobody else holds
//! - A refused join receives exactly one `error` event and is disconnected
//! - A closed connection leaves the lobby and hands over leadership if needed
//!
//! ### Membership and Leadership
//! The lobby keeps its members in join order. The first member of an empty
//! lobby is leader; when the leader leaves, the earliest-joined survivor is
//! promoted. Leadership is advisory and never checked against commands.
//!
//! ### Broadcast Fanout
//! Every lobby-affecting event is delivered to all members. Membership
//! changes resend the full roster; ready, chat and start-game traffic is
//! relayed as single events.
//!
//! ## Architecture Design
//!
//! ### Single Owner of Lobby State
//! One coordinator task owns the registry and the name store. Connection
//! tasks send it messages over a channel and never share state directly, so
//! the multi-threaded runtime needs no locks around the lobby.
//!
//! ### Bounded Delivery
//! Each connection has a bounded outbound queue drained by its own writer
//! task. The coordinator waits at most the configured send timeout per
//! member; a stalled or vanished client is logged and skipped rather than
//! stalling the whole broadcast.
//!
//! ## Module Organization
//!
//! - `config`: listen address, send timeout and name backend selection
//! - `coordinator`: the lobby actor and the handle connections use to reach it
//! - `error`: error types for joins, deliveries and the name store
//! - `fanout`: broadcast and unicast delivery of events
//! - `lobby`: membership registry and leader succession
//! - `names`: persistent display names keyed by identity
//! - `network`: websocket listener and the per-connection state machine
//! - `session`: per-member state and outbound queue handle
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::LobbyServer;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::default();
//!     let names = config.names.open()?;
//!
//!     let server = LobbyServer::bind(&config, names).await?;
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod coordinator;
pub mod error;
pub mod fanout;
pub mod lobby;
pub mod names;
pub mod network;
pub mod session;
