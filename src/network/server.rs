//! WebSocket Game Server
//!
//! The broadcast/sync layer. Accepts observer connections, answers
//! "what is the round right now" with a snapshot, fans round events out
//! to every connected client, and routes bet/cashout requests into the
//! engine. Fan-out is fire-and-forget: a client whose send buffer is
//! full is dropped from the registry rather than ever stalling the
//! round driver.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, instrument, warn};

use crate::game::bet::OwnerId;
use crate::game::events::RoundEvent;
use crate::game::scheduler::RoundScheduler;
use crate::network::auth::{validate_token, AuthConfig, AuthError};
use crate::network::protocol::{
    AuthResult, ClientMessage, ErrorCode, RoundInfo, ServerError, ServerMessage,
};

/// Per-client outbound buffer. A client that falls this many messages
/// behind the tick stream is considered dead and dropped.
const CLIENT_SEND_BUFFER: usize = 64;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// JWT validation settings for bettors.
    pub auth: AuthConfig,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".parse().expect("static addr"),
            max_connections: 1000,
            auth: AuthConfig::default(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ServerConfig {
    /// Create config from environment variables, keeping defaults for
    /// anything unset or unparsable.
    ///
    /// Recognized: `BIND_ADDR`, `MAX_CONNECTIONS`, plus the `AUTH_*`
    /// variables read by [`AuthConfig::from_env`].
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: std::env::var("BIND_ADDR")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.bind_addr),
            max_connections: std::env::var("MAX_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_connections),
            auth: AuthConfig::from_env(),
            version: defaults.version,
        }
    }
}

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Connected observer state.
struct ConnectedClient {
    /// Owner identity once a bearer token has been validated. Spectating
    /// needs no auth; betting does.
    owner: Option<OwnerId>,
    /// Connection time.
    connected_at: Instant,
    /// Outbound channel feeding this client's sender task.
    sender: mpsc::Sender<ServerMessage>,
}

type ClientRegistry = Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>;

/// The game server.
///
/// Holds the observer registry and the engine handle. The engine's driver
/// loop runs as its own task; the server only reads snapshots, subscribes
/// to events, and forwards requests.
pub struct GameServer {
    /// Server configuration.
    config: ServerConfig,
    /// The round engine.
    engine: Arc<RoundScheduler>,
    /// Connected observers.
    clients: ClientRegistry,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a new game server over an engine.
    pub fn new(config: ServerConfig, engine: Arc<RoundScheduler>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            engine,
            clients: Arc::new(RwLock::new(BTreeMap::new())),
            shutdown_tx,
        }
    }

    /// Run the server: accept connections and fan engine events out
    /// until shutdown.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!("Game server listening on {}", self.config.bind_addr);

        // Fan-out task: engine events -> every connected client
        let fanout_clients = self.clients.clone();
        let fanout_events = self.engine.subscribe();
        let mut fanout_shutdown = self.shutdown_tx.subscribe();
        let fanout_handle = tokio::spawn(async move {
            tokio::select! {
                _ = Self::run_fanout_loop(fanout_clients, fanout_events) => {}
                _ = fanout_shutdown.recv() => {}
            }
        });

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let client_count = self.clients.read().await.len();
                            if client_count >= self.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }

                            debug!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        fanout_handle.abort();
        Ok(())
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let clients = self.clients.clone();
        let engine = self.engine.clone();
        let config = self.config.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    warn!("WebSocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(CLIENT_SEND_BUFFER);

            // Register client
            {
                let mut clients = clients.write().await;
                clients.insert(
                    addr,
                    ConnectedClient {
                        owner: None,
                        connected_at: Instant::now(),
                        sender: msg_tx.clone(),
                    },
                );
            }

            // Sender task: outbound channel -> websocket
            let sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    let text = match msg.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("Failed to serialize message: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
            });

            // Late-joiner sync: snapshot + history before anything else,
            // so the client can reconstruct phase and multiplier without
            // waiting for the next tick.
            Self::send_round_info(&engine, &msg_tx).await;
            let _ = msg_tx
                .send(ServerMessage::History {
                    rounds: engine.history().await,
                })
                .await;

            // Inbound loop
            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                let client_msg = match ClientMessage::from_json(&text) {
                                    Ok(m) => m,
                                    Err(e) => {
                                        debug!("Invalid message from {}: {}", addr, e);
                                        let _ = msg_tx.send(ServerMessage::Error(ServerError {
                                            code: ErrorCode::InvalidMessage,
                                            message: "Invalid message format".to_string(),
                                        })).await;
                                        continue;
                                    }
                                };

                                Self::handle_client_message(
                                    addr,
                                    client_msg,
                                    &clients,
                                    &engine,
                                    &config,
                                    &msg_tx,
                                ).await;
                            }
                            Some(Ok(Message::Ping(_))) => {
                                // tungstenite answers transport pings itself
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Client {} disconnected", addr);
                                break;
                            }
                            Some(Err(e)) => {
                                debug!("WebSocket error for {}: {}", addr, e);
                                break;
                            }
                            _ => {}
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        let _ = msg_tx.send(ServerMessage::Shutdown {
                            reason: "Server shutting down".to_string(),
                        }).await;
                        break;
                    }
                }
            }

            // An observer leaving has no effect on the round; only the
            // registry entry goes.
            sender_task.abort();
            let removed = clients.write().await.remove(&addr);
            if let Some(client) = removed {
                debug!(
                    "Client {} cleaned up after {:?}",
                    addr,
                    client.connected_at.elapsed()
                );
            }
        });
    }

    /// Handle a client message.
    async fn handle_client_message(
        addr: SocketAddr,
        msg: ClientMessage,
        clients: &ClientRegistry,
        engine: &Arc<RoundScheduler>,
        config: &ServerConfig,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        match msg {
            ClientMessage::Auth { token } => {
                Self::handle_auth(addr, &token, clients, config, sender).await;
            }
            ClientMessage::PlaceBet { amount, currency } => {
                let Some(owner) = Self::authenticated_owner(addr, clients, sender).await else {
                    return;
                };
                match engine.place_bet(owner, amount, currency).await {
                    Ok(bet) => {
                        let _ = sender
                            .send(ServerMessage::BetPlaced {
                                bet_id: bet.id,
                                amount: bet.amount,
                                currency: bet.currency,
                            })
                            .await;
                    }
                    Err(e) => {
                        let _ = sender.send(ServerMessage::bet_error(e)).await;
                    }
                }
            }
            ClientMessage::CashOut { bet_id } => {
                let Some(owner) = Self::authenticated_owner(addr, clients, sender).await else {
                    return;
                };
                match engine.cash_out(owner, bet_id).await {
                    Ok(receipt) => {
                        let _ = sender.send(ServerMessage::cashed_out(receipt)).await;
                    }
                    Err(e) => {
                        let _ = sender.send(ServerMessage::bet_error(e)).await;
                    }
                }
            }
            ClientMessage::SyncRequest => {
                Self::send_round_info(engine, sender).await;
            }
            ClientMessage::HistoryRequest => {
                let _ = sender
                    .send(ServerMessage::History {
                        rounds: engine.history().await,
                    })
                    .await;
            }
            ClientMessage::Ping { timestamp } => {
                let _ = sender
                    .send(ServerMessage::Pong {
                        timestamp,
                        server_time: Utc::now(),
                    })
                    .await;
            }
        }
    }

    /// Handle authentication.
    async fn handle_auth(
        addr: SocketAddr,
        token: &str,
        clients: &ClientRegistry,
        config: &ServerConfig,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        match validate_token(token, &config.auth) {
            Ok(claims) => {
                let owner = claims.owner_id();
                {
                    let mut clients = clients.write().await;
                    if let Some(client) = clients.get_mut(&addr) {
                        client.owner = Some(owner);
                    }
                }

                debug!("Client {} authenticated as {}", addr, owner);
                let _ = sender
                    .send(ServerMessage::AuthResult(AuthResult {
                        success: true,
                        owner_id: Some(owner.to_hex()),
                        error: None,
                        server_version: config.version.clone(),
                    }))
                    .await;
            }
            Err(e) => {
                debug!("Auth failed for {}: {}", addr, e);
                let _ = sender
                    .send(ServerMessage::AuthResult(AuthResult {
                        success: false,
                        owner_id: None,
                        error: Some(e.to_string()),
                        server_version: config.version.clone(),
                    }))
                    .await;
                let code = match e {
                    AuthError::Expired => ErrorCode::TokenExpired,
                    AuthError::NotConfigured => ErrorCode::AuthFailed,
                    _ => ErrorCode::InvalidToken,
                };
                let _ = sender
                    .send(ServerMessage::Error(ServerError {
                        code,
                        message: e.to_string(),
                    }))
                    .await;
            }
        }
    }

    /// Look up the caller's authenticated owner id, or reply with
    /// `not_authenticated`. Spectators can watch; only bettors need auth.
    async fn authenticated_owner(
        addr: SocketAddr,
        clients: &ClientRegistry,
        sender: &mpsc::Sender<ServerMessage>,
    ) -> Option<OwnerId> {
        let owner = clients.read().await.get(&addr).and_then(|c| c.owner);
        if owner.is_none() {
            let _ = sender
                .send(ServerMessage::Error(ServerError {
                    code: ErrorCode::NotAuthenticated,
                    message: "Must authenticate before betting".to_string(),
                }))
                .await;
        }
        owner
    }

    /// Send the current round snapshot to one client.
    async fn send_round_info(engine: &Arc<RoundScheduler>, sender: &mpsc::Sender<ServerMessage>) {
        let info = RoundInfo::from(engine.snapshot().await);
        let _ = sender.send(ServerMessage::RoundInfo(info)).await;
    }

    /// Deliver engine events to every registered client.
    ///
    /// Delivery is `try_send`: a client with a full or closed buffer is
    /// removed from the registry on the spot. The round driver never
    /// waits on an observer.
    async fn run_fanout_loop(
        clients: ClientRegistry,
        mut events: broadcast::Receiver<RoundEvent>,
    ) {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Fan-out lagged, {} events skipped", n);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };
            let msg = Self::event_to_message(event);

            let mut dead = Vec::new();
            {
                let clients = clients.read().await;
                for (addr, client) in clients.iter() {
                    if client.sender.try_send(msg.clone()).is_err() {
                        dead.push(*addr);
                    }
                }
            }
            if !dead.is_empty() {
                let mut clients = clients.write().await;
                for addr in dead {
                    clients.remove(&addr);
                    info!("Dropped slow observer {}", addr);
                }
            }
        }
    }

    /// Convert a round event to its wire message.
    fn event_to_message(event: RoundEvent) -> ServerMessage {
        match event {
            RoundEvent::Started {
                round_id,
                commitment,
                betting_duration_ms,
                server_time,
            } => ServerMessage::RoundStarted {
                round_id,
                hashed_server_seed: commitment,
                betting_duration_ms,
                server_time,
            },
            RoundEvent::Tick {
                round_id,
                multiplier,
                server_time,
            } => ServerMessage::MultiplierTick {
                round_id,
                multiplier,
                server_time,
            },
            RoundEvent::Crashed {
                round_id,
                crash_point,
                server_seed,
                server_time,
            } => ServerMessage::RoundCrashed {
                round_id,
                crash_point,
                server_seed,
                server_time,
            },
        }
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub async fn connection_count(&self) -> usize {
        self.clients.read().await.len()
    }
}

// =============================================================================
// TESTS
// =============================================================================
