//! Server network layer: websocket listener and per-connection state machine
//!
//! Every accepted socket is upgraded to a websocket and split in two. A
//! writer task drains the connection's outbound queue into the socket; the
//! connection task reads frames and drives [`ConnectionState`]:
//!
//! - `Unauthenticated`: the first well-formed envelope must be a join. A
//!   missing identity or any other shape is refused with one `error` event,
//!   after which the connection is closed.
//! - `Joined`: request batches are forwarded to the coordinator in arrival
//!   order. Envelopes without `req` are logged and dropped.
//! - `Closed`: the session, if any, leaves the lobby.
//!
//! Frames that do not decode as an envelope are ignored in every state.

use crate::config::ServerConfig;
use crate::coordinator::{Coordinator, LobbyHandle};
use crate::error::{InvalidJoin, LobbyError};
use crate::names::NameStore;
use crate::session::{encode_frame, Outbound, OUTBOUND_CAPACITY};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::{ClientEnvelope, Event};
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

/// Lifecycle of one client connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Unauthenticated,
    Joined { identity: String },
    Closed,
}

/// Listener that accepts lobby connections
pub struct LobbyServer {
    listener: TcpListener,
    lobby: LobbyHandle,
    coordinator: JoinHandle<Result<(), LobbyError>>,
    send_timeout: Duration,
}

impl LobbyServer {
    /// Binds the listening socket and starts the lobby coordinator.
    pub async fn bind(
        config: &ServerConfig,
        names: Box<dyn NameStore>,
    ) -> Result<Self, LobbyError> {
        let listener = TcpListener::bind(config.address()).await?;
        info!("Server listening on {}", listener.local_addr()?);

        let (coordinator, lobby) = Coordinator::new(names, config.send_timeout);
        let coordinator = tokio::spawn(coordinator.run());

        Ok(Self {
            listener,
            lobby,
            coordinator,
            send_timeout: config.send_timeout,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, LobbyError> {
        Ok(self.listener.local_addr()?)
    }

    pub async fn run(self) -> Result<(), LobbyError> {
        self.run_until(std::future::pending::<()>()).await
    }

    /// Accepts connections until `shutdown` resolves or the coordinator stops
    ///
    /// A coordinator failure (a broken name store) is returned so the process
    /// can exit instead of serving with inconsistent lobby state.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), LobbyError>
    where
        F: Future<Output = ()>,
    {
        let LobbyServer {
            listener,
            lobby,
            mut coordinator,
            send_timeout,
        } = self;
        tokio::pin!(shutdown);

        info!("Server started successfully");

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        tokio::spawn(serve_connection(stream, addr, lobby.clone(), send_timeout));
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                },

                finished = &mut coordinator => {
                    return match finished {
                        Ok(result) => result,
                        Err(e) => {
                            error!("Lobby coordinator panicked: {}", e);
                            Err(LobbyError::CoordinatorGone)
                        }
                    };
                },

                _ = &mut shutdown => {
                    info!("server shutting down");
                    let _ = lobby.shutdown();
                    return coordinator.await.unwrap_or(Err(LobbyError::CoordinatorGone));
                },
            }
        }
    }
}

/// Upgrades `stream` and runs the connection until it closes
pub async fn serve_connection<S>(
    stream: S,
    addr: SocketAddr,
    lobby: LobbyHandle,
    send_timeout: Duration,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    info!("client connection request from {}", addr);

    let websocket = match accept_async(stream).await {
        Ok(websocket) => websocket,
        Err(e) => {
            warn!("websocket handshake with {} failed: {}", addr, e);
            return;
        }
    };

    let (sink, mut source) = websocket.split();
    let (outbound, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
    tokio::spawn(write_loop(sink, outbound_rx, addr));

    let mut handler = ConnectionHandler::new(addr, lobby, outbound, send_timeout);

    while let Some(frame) = source.next().await {
        match frame {
            Ok(Message::Text(text)) => handler.on_text(text.as_str()).await,
            Ok(Message::Close(_)) => {
                debug!("client {} closed the connection", addr);
                break;
            }
            Ok(Message::Binary(_)) => debug!("discarding binary frame from {}", addr),
            Ok(_) => {}
            // Includes text frames that are not valid UTF-8.
            Err(e) => {
                debug!("abnormal disconnect from {}: {}", addr, e);
                break;
            }
        }

        if handler.state() == &ConnectionState::Closed {
            break;
        }
    }

    handler.close();
}

/// Forwards queued frames to the socket, then closes it
async fn write_loop<S>(
    mut sink: SplitSink<WebSocketStream<S>, Message>,
    mut outbound: mpsc::Receiver<Message>,
    addr: SocketAddr,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    while let Some(message) = outbound.recv().await {
        if let Err(e) = sink.send(message).await {
            debug!("writer for {} stopped: {}", addr, e);
            return;
        }
    }

    if let Err(e) = sink.close().await {
        debug!("closing connection to {} failed: {}", addr, e);
    }
}

/// Per-connection control loop state
pub struct ConnectionHandler {
    addr: SocketAddr,
    lobby: LobbyHandle,
    outbound: mpsc::Sender<Message>,
    send_timeout: Duration,
    state: ConnectionState,
}

impl ConnectionHandler {
    pub fn new(
        addr: SocketAddr,
        lobby: LobbyHandle,
        outbound: mpsc::Sender<Message>,
        send_timeout: Duration,
    ) -> Self {
        Self {
            addr,
            lobby,
            outbound,
            send_timeout,
            state: ConnectionState::Unauthenticated,
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// Handles one text frame according to the current state
    pub async fn on_text(&mut self, text: &str) {
        match self.state.clone() {
            ConnectionState::Unauthenticated => self.on_join_frame(text).await,
            ConnectionState::Joined { identity } => self.on_request_frame(&identity, text),
            ConnectionState::Closed => {}
        }
    }

    async fn on_join_frame(&mut self, text: &str) {
        let envelope = match ClientEnvelope::decode_join(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!("discarding malformed message from {}: {}", self.addr, e);
                return;
            }
        };

        let ClientEnvelope::Join {
            identity: Some(identity),
        } = envelope
        else {
            self.reject(InvalidJoin::no_identity()).await;
            return;
        };

        match self.lobby.join(identity.clone(), self.outbound.clone()).await {
            Ok(()) => {
                debug!("{} joined as {}", self.addr, identity);
                self.state = ConnectionState::Joined { identity };
            }
            Err(LobbyError::InvalidJoin(rejection)) => self.reject(rejection).await,
            Err(e) => {
                error!("join for {} failed: {}", identity, e);
                self.state = ConnectionState::Closed;
            }
        }
    }

    fn on_request_frame(&mut self, identity: &str, text: &str) {
        match ClientEnvelope::decode_requests(text) {
            Ok(ClientEnvelope::Requests(commands)) => {
                if let Err(e) = self.lobby.requests(identity, commands) {
                    error!("dropping requests from {}: {}", identity, e);
                    self.state = ConnectionState::Closed;
                }
            }
            Ok(_) => warn!("invalid request from {}: {}", identity, text),
            Err(e) => debug!("discarding malformed message from {}: {}", identity, e),
        }
    }

    /// Sends the single `error` event and marks the connection closed.
    async fn reject(&mut self, rejection: InvalidJoin) {
        warn!(
            "invalid connection request from {}, client kicked ({})",
            self.addr, rejection
        );

        let event = Event::Error {
            code: rejection.code.to_string(),
            message: rejection.message.to_string(),
        };
        let delivery = match encode_frame(vec![event]) {
            Ok(frame) => {
                Outbound::new(self.addr.to_string(), self.outbound.clone())
                    .deliver(frame, self.send_timeout)
                    .await
            }
            Err(e) => Err(e),
        };
        if let Err(e) = delivery {
            warn!("could not notify {} of rejection: {}", self.addr, e);
        }

        self.state = ConnectionState::Closed;
    }

    /// Ends the connection, removing its session from the lobby if it joined.
    pub fn close(&mut self) {
        match std::mem::replace(&mut self.state, ConnectionState::Closed) {
            ConnectionState::Joined { identity } => {
                if let Err(e) = self.lobby.leave(&identity) {
                    error!("could not remove {} from lobby: {}", identity, e);
                }
            }
            ConnectionState::Unauthenticated => info!("unknown client disconnected: {}", self.addr),
            ConnectionState::Closed => {}
        }
    }
}
