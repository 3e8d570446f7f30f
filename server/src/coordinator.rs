//! Lobby coordinator task
//!
//! The coordinator is the only owner of the [`LobbyRegistry`] and the
//! [`NameStore`]. Connection tasks never touch either directly; they send
//! [`LobbyMessage`]s through a [`LobbyHandle`] and the coordinator applies
//! them one at a time, in arrival order. No state mutation spans an await
//! on another connection, so the registry needs no lock.
//!
//! Events produced by a mutation are fanned out before the next message is
//! read, which keeps every member's event stream in the order the
//! coordinator issued it.

use crate::error::{InvalidJoin, LobbyError, NameStoreError};
use crate::fanout::{broadcast, unicast};
use crate::lobby::LobbyRegistry;
use crate::names::NameStore;
use crate::session::Session;
use chrono::Local;
use log::{debug, error, info, warn};
use shared::{Command, Event, CHAT_TIME_FORMAT};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;

/// Messages sent from connection tasks to the coordinator
#[derive(Debug)]
pub enum LobbyMessage {
    Join {
        identity: String,
        outbound: mpsc::Sender<Message>,
        reply: oneshot::Sender<Result<(), InvalidJoin>>,
    },
    Requests {
        identity: String,
        commands: Vec<Command>,
    },
    Leave {
        identity: String,
    },
    Shutdown,
}

/// Cloneable sending side used by connection tasks
#[derive(Debug, Clone)]
pub struct LobbyHandle {
    tx: mpsc::UnboundedSender<LobbyMessage>,
}

impl LobbyHandle {
    /// Asks the coordinator to register `identity`
    ///
    /// Resolves once the session is registered or the join was refused.
    pub async fn join(
        &self,
        identity: String,
        outbound: mpsc::Sender<Message>,
    ) -> Result<(), LobbyError> {
        let (reply, response) = oneshot::channel();
        self.send(LobbyMessage::Join {
            identity,
            outbound,
            reply,
        })?;

        response
            .await
            .map_err(|_| LobbyError::CoordinatorGone)?
            .map_err(LobbyError::from)
    }

    pub fn requests(&self, identity: &str, commands: Vec<Command>) -> Result<(), LobbyError> {
        self.send(LobbyMessage::Requests {
            identity: identity.to_string(),
            commands,
        })
    }

    pub fn leave(&self, identity: &str) -> Result<(), LobbyError> {
        self.send(LobbyMessage::Leave {
            identity: identity.to_string(),
        })
    }

    pub fn shutdown(&self) -> Result<(), LobbyError> {
        self.send(LobbyMessage::Shutdown)
    }

    fn send(&self, message: LobbyMessage) -> Result<(), LobbyError> {
        self.tx.send(message).map_err(|_| LobbyError::CoordinatorGone)
    }
}

/// Owner of all lobby state
pub struct Coordinator {
    registry: LobbyRegistry,
    names: Box<dyn NameStore>,
    send_timeout: Duration,
    inbox: mpsc::UnboundedReceiver<LobbyMessage>,
}

impl Coordinator {
    pub fn new(names: Box<dyn NameStore>, send_timeout: Duration) -> (Self, LobbyHandle) {
        let (tx, inbox) = mpsc::unbounded_channel();
        let coordinator = Self {
            registry: LobbyRegistry::new(),
            names,
            send_timeout,
            inbox,
        };
        (coordinator, LobbyHandle { tx })
    }

    /// Processes messages until shutdown or until every handle is dropped
    ///
    /// A name store failure ends the loop with an error. Continuing would
    /// leave a member without a resolvable name, so the registry is dropped
    /// rather than kept in an inconsistent state.
    pub async fn run(mut self) -> Result<(), LobbyError> {
        while let Some(message) = self.inbox.recv().await {
            match message {
                LobbyMessage::Join {
                    identity,
                    outbound,
                    reply,
                } => self.handle_join(identity, outbound, reply).await?,
                LobbyMessage::Requests { identity, commands } => {
                    self.handle_requests(&identity, commands).await?
                }
                LobbyMessage::Leave { identity } => self.handle_leave(&identity).await,
                LobbyMessage::Shutdown => {
                    info!("lobby coordinator shutting down");
                    break;
                }
            }
        }

        Ok(())
    }

    async fn handle_join(
        &mut self,
        identity: String,
        outbound: mpsc::Sender<Message>,
        reply: oneshot::Sender<Result<(), InvalidJoin>>,
    ) -> Result<(), NameStoreError> {
        if self.registry.contains(&identity) {
            let _ = reply.send(Err(InvalidJoin::already_connected()));
            return Ok(());
        }

        self.names.ensure(&identity).map_err(fatal)?;
        let name = self.names.get_name(&identity).map_err(fatal)?;

        let leader = self.registry.is_empty();
        let session = Session::new(identity.clone(), name.clone(), leader, outbound);
        if self.registry.join(identity.clone(), session).is_err() {
            let _ = reply.send(Err(InvalidJoin::already_connected()));
            return Ok(());
        }

        if reply.send(Ok(())).is_err() {
            debug!("joining connection for {} went away before confirmation", identity);
        }

        let event = Event::JoinServer {
            identity: identity.clone(),
            name,
            leader,
        };
        let _ = unicast(&self.registry, &identity, vec![event], self.send_timeout).await;
        broadcast_roster(&self.registry, self.send_timeout).await;
        Ok(())
    }

    async fn handle_requests(
        &mut self,
        identity: &str,
        commands: Vec<Command>,
    ) -> Result<(), NameStoreError> {
        for command in commands {
            info!("received request from {}: {:?}", identity, command);

            let Some(session) = self.registry.get_mut(identity) else {
                warn!("dropping request from unregistered client {}", identity);
                return Ok(());
            };

            let event = match command {
                Command::GetUserName => {
                    let name = self.names.get_name(identity).map_err(fatal)?;
                    let _ = unicast(
                        &self.registry,
                        identity,
                        vec![Event::GetUserName { name }],
                        self.send_timeout,
                    )
                    .await;
                    continue;
                }
                Command::UpdateIsReady { ready } => {
                    session.ready = ready;
                    Event::UpdateIsReady {
                        identity: identity.to_string(),
                        ready,
                    }
                }
                Command::Chat { text } => Event::Chat {
                    name: session.name.clone(),
                    text,
                    timestamp: Local::now().format(CHAT_TIME_FORMAT).to_string(),
                },
                Command::InitStartGame => Event::InitStartGame,
                Command::CancelStartGame => Event::CancelStartGame,
                Command::StartGame => Event::StartGame,
                Command::Unknown(raw) => {
                    debug!("ignoring unknown command from {}: {}", identity, raw);
                    continue;
                }
            };

            broadcast(&self.registry, vec![event], self.send_timeout).await;
        }

        Ok(())
    }

    async fn handle_leave(&mut self, identity: &str) {
        let Some(was_leader) = self.registry.leave(identity) else {
            warn!("leave for unregistered client {}", identity);
            return;
        };

        if was_leader {
            self.registry.promote_next();
        }

        broadcast_roster(&self.registry, self.send_timeout).await;
    }
}

/// Sends the full roster to every member.
///
/// Borrows only the registry so the coordinator future stays `Send`; the
/// name store is not `Sync`.
async fn broadcast_roster(registry: &LobbyRegistry, send_timeout: Duration) {
    let roster = registry.roster_snapshot();
    broadcast(registry, vec![Event::GetLobbyPlayers(roster)], send_timeout).await;
}

fn fatal(e: NameStoreError) -> NameStoreError {
    error!("name store failure, stopping lobby: {}", e);
    e
}
