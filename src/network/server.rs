//! WebSocket Game Server
//!
//! Async WebSocket front for the round engine. Handles authentication,
//! message routing into the engine, idle-connection cleanup, and the
//! background maintenance loops (expiry sweep, quota reset, aggregate
//! recompute) that stand in for an external scheduler.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::time::interval;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, instrument, warn};

use crate::game::engine::{EngineError, GuessOutcome, RoundEngine};
use crate::network::auth::{validate_token, AuthConfig};
use crate::network::protocol::{
    AuthRequest, AuthResult, ClientMessage, ErrorCode, GuessResultInfo, GuessSubmission,
    LeaderboardPage, LeaderboardRequest, ProfileInfo, RoundExpiredInfo, ServerError,
    ServerMessage,
};
use crate::store::{GameStore, UserId, UserRecord};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Idle connection timeout.
    pub idle_timeout: Duration,
    /// How often the expiry sweep closes stale rounds.
    pub expiry_sweep_interval: Duration,
    /// How often the quota sweep checks for due resets.
    pub quota_sweep_interval: Duration,
    /// How often aggregates are rebuilt from round history.
    pub recompute_interval: Duration,
    /// Leaderboard entries per page.
    pub leaderboard_page_size: usize,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".parse().expect("static addr parses"),
            max_connections: 1000,
            idle_timeout: Duration::from_secs(300),
            expiry_sweep_interval: Duration::from_secs(5),
            quota_sweep_interval: Duration::from_secs(60),
            recompute_interval: Duration::from_secs(900),
            leaderboard_page_size: crate::game::stats::DEFAULT_PAGE_SIZE,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ServerConfig {
    /// Overlay environment variables onto the defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(addr) = std::env::var("GEOGUESS_BIND").ok().and_then(|v| v.parse().ok()) {
            config.bind_addr = addr;
        }
        if let Some(max) = std::env::var("GEOGUESS_MAX_CONNECTIONS").ok().and_then(|v| v.parse().ok()) {
            config.max_connections = max;
        }
        if let Some(secs) = std::env::var("GEOGUESS_EXPIRY_SWEEP_SECS").ok().and_then(|v| v.parse().ok()) {
            config.expiry_sweep_interval = Duration::from_secs(secs);
        }
        config
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

/// Connected client state.
struct ConnectedClient {
    /// Authenticated user (after a successful Auth message).
    user_id: Option<UserId>,
    /// Connection time.
    #[allow(dead_code)]
    connected_at: Instant,
    /// Last activity.
    last_activity: Instant,
}

type ClientMap = Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>;

/// The game server.
pub struct GameServer {
    /// Server configuration.
    config: ServerConfig,
    /// Authentication configuration.
    auth: AuthConfig,
    /// The round engine.
    engine: Arc<RoundEngine>,
    /// Shared store (profile reads and user registration).
    store: Arc<GameStore>,
    /// Connected clients.
    clients: ClientMap,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a new game server.
    pub fn new(
        config: ServerConfig,
        auth: AuthConfig,
        engine: Arc<RoundEngine>,
        store: Arc<GameStore>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            auth,
            engine,
            store,
            clients: Arc::new(RwLock::new(BTreeMap::new())),
            shutdown_tx,
        }
    }

    /// Run the server until shutdown.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!("geoguess server listening on {}", self.config.bind_addr);

        // Maintenance loops: the in-process stand-in for the external
        // scheduler. Each invokes an idempotent engine operation.
        let expiry_handle = {
            let engine = self.engine.clone();
            let every = self.config.expiry_sweep_interval;
            tokio::spawn(async move { Self::run_expiry_sweep_loop(engine, every).await })
        };
        let quota_handle = {
            let engine = self.engine.clone();
            let every = self.config.quota_sweep_interval;
            tokio::spawn(async move { Self::run_quota_sweep_loop(engine, every).await })
        };
        let recompute_handle = {
            let engine = self.engine.clone();
            let every = self.config.recompute_interval;
            tokio::spawn(async move { Self::run_recompute_loop(engine, every).await })
        };
        let cleanup_handle = {
            let clients = self.clients.clone();
            let idle_timeout = self.config.idle_timeout;
            tokio::spawn(async move { Self::run_cleanup_loop(clients, idle_timeout).await })
        };

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let connected = self.clients.read().await.len();
                            if connected >= self.config.max_connections {
                                warn!("connection limit reached, rejecting {}", addr);
                                continue;
                            }
                            debug!("new connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("shutdown signal received");
                    break;
                }
            }
        }

        expiry_handle.abort();
        quota_handle.abort();
        recompute_handle.abort();
        cleanup_handle.abort();

        Ok(())
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let clients = self.clients.clone();
        let engine = self.engine.clone();
        let store = self.store.clone();
        let auth = self.auth.clone();
        let config = self.config.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("websocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(64);

            // Register client
            {
                let mut clients = clients.write().await;
                clients.insert(addr, ConnectedClient {
                    user_id: None,
                    connected_at: Instant::now(),
                    last_activity: Instant::now(),
                });
            }

            // Spawn message sender task
            let sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    let text = match msg.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("failed to serialize message: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
            });

            // Handle incoming messages
            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                let client_msg = match ClientMessage::from_json(&text) {
                                    Ok(m) => m,
                                    Err(e) => {
                                        debug!("invalid message from {}: {}", addr, e);
                                        let _ = msg_tx.send(ServerMessage::Error(ServerError {
                                            code: ErrorCode::InvalidInput,
                                            message: "invalid message format".to_string(),
                                        })).await;
                                        continue;
                                    }
                                };

                                // Update activity
                                {
                                    let mut clients = clients.write().await;
                                    if let Some(client) = clients.get_mut(&addr) {
                                        client.last_activity = Instant::now();
                                    }
                                }

                                Self::handle_client_message(
                                    addr,
                                    client_msg,
                                    &clients,
                                    &engine,
                                    &store,
                                    &auth,
                                    &config,
                                    &msg_tx,
                                ).await;
                            }
                            Some(Ok(Message::Ping(_))) => {
                                let _ = msg_tx.send(ServerMessage::Pong {
                                    timestamp: 0,
                                    server_time: Utc::now().timestamp_millis() as u64,
                                }).await;
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("client {} disconnected", addr);
                                break;
                            }
                            Some(Err(e)) => {
                                debug!("websocket error for {}: {}", addr, e);
                                break;
                            }
                            _ => {}
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        let _ = msg_tx.send(ServerMessage::Shutdown {
                            reason: "server shutting down".to_string(),
                        }).await;
                        break;
                    }
                }
            }

            // Cleanup
            sender_task.abort();
            clients.write().await.remove(&addr);
            debug!("client {} cleaned up", addr);
        });
    }

    /// Route one client message.
    #[allow(clippy::too_many_arguments)]
    async fn handle_client_message(
        addr: SocketAddr,
        msg: ClientMessage,
        clients: &ClientMap,
        engine: &Arc<RoundEngine>,
        store: &Arc<GameStore>,
        auth: &AuthConfig,
        config: &ServerConfig,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        match msg {
            ClientMessage::Auth(request) => {
                Self::handle_auth(addr, request, clients, engine, store, auth, config, sender).await;
            }
            ClientMessage::Ping { timestamp } => {
                let _ = sender.send(ServerMessage::Pong {
                    timestamp,
                    server_time: Utc::now().timestamp_millis() as u64,
                }).await;
            }
            authenticated_msg => {
                let Some(user_id) = Self::authenticated_user(addr, clients).await else {
                    let _ = sender.send(ServerMessage::Error(ServerError {
                        code: ErrorCode::NotAuthenticated,
                        message: "must authenticate first".to_string(),
                    })).await;
                    return;
                };
                match authenticated_msg {
                    ClientMessage::StartRound => {
                        Self::handle_start_round(user_id, engine, sender).await;
                    }
                    ClientMessage::SubmitGuess(submission) => {
                        Self::handle_submit_guess(user_id, submission, engine, sender).await;
                    }
                    ClientMessage::Leaderboard(request) => {
                        Self::handle_leaderboard(request, engine, config, sender).await;
                    }
                    ClientMessage::Profile => {
                        Self::handle_profile(user_id, store, sender).await;
                    }
                    // Auth and Ping were matched above.
                    ClientMessage::Auth(_) | ClientMessage::Ping { .. } => {}
                }
            }
        }
    }

    /// The authenticated user behind a connection, if any.
    async fn authenticated_user(addr: SocketAddr, clients: &ClientMap) -> Option<UserId> {
        clients.read().await.get(&addr).and_then(|c| c.user_id)
    }

    /// Validate the token, register a first-time user, bind the connection.
    ///
    /// This is the identity boundary: the engine itself never creates users.
    #[allow(clippy::too_many_arguments)]
    async fn handle_auth(
        addr: SocketAddr,
        request: AuthRequest,
        clients: &ClientMap,
        engine: &Arc<RoundEngine>,
        store: &Arc<GameStore>,
        auth: &AuthConfig,
        config: &ServerConfig,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        let claims = match validate_token(&request.token, auth) {
            Ok(claims) => claims,
            Err(e) => {
                debug!("auth failed for {}: {}", addr, e);
                let _ = sender.send(ServerMessage::AuthResult(AuthResult {
                    success: false,
                    user_id: None,
                    display_name: None,
                    error: Some(e.to_string()),
                    server_version: config.version.clone(),
                })).await;
                return;
            }
        };

        let user_id = claims.user_id();
        let display_name = claims.display_name();
        let created = store
            .register_user(UserRecord::new(
                user_id,
                display_name.clone(),
                engine.quota().daily_moves(),
                Utc::now(),
            ))
            .await;
        if created {
            info!(user = %user_id, name = %display_name, "first-time user registered");
        }

        {
            let mut clients = clients.write().await;
            if let Some(client) = clients.get_mut(&addr) {
                client.user_id = Some(user_id);
            }
        }

        let _ = sender.send(ServerMessage::AuthResult(AuthResult {
            success: true,
            user_id: Some(user_id.to_string()),
            display_name: Some(display_name),
            error: None,
            server_version: config.version.clone(),
        })).await;

        debug!("client {} authenticated as {}", addr, user_id);
    }

    /// Start a round on behalf of the caller.
    async fn handle_start_round(
        user_id: UserId,
        engine: &Arc<RoundEngine>,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        match engine.start_round(user_id, Utc::now()).await {
            Ok(started) => {
                let _ = sender.send(ServerMessage::RoundStarted(started.into())).await;
            }
            Err(e) => {
                let _ = sender.send(ServerMessage::Error(ServerError::from(&e))).await;
            }
        }
    }

    /// Score or expire a guess. `now` is the server receive time - the
    /// client's clock plays no part in deadline enforcement.
    async fn handle_submit_guess(
        user_id: UserId,
        submission: GuessSubmission,
        engine: &Arc<RoundEngine>,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        let Some(round_id) = submission.parse_round_id() else {
            let _ = sender.send(ServerMessage::Error(ServerError {
                code: ErrorCode::InvalidInput,
                message: format!("malformed round id: {}", submission.round_id),
            })).await;
            return;
        };

        match engine.submit_guess(round_id, user_id, submission.coordinate(), Utc::now()).await {
            Ok(GuessOutcome::Scored(score)) => {
                let _ = sender
                    .send(ServerMessage::GuessResult(GuessResultInfo::from_score(round_id, score)))
                    .await;
            }
            Ok(GuessOutcome::Expired { expired_at }) => {
                let _ = sender.send(ServerMessage::RoundExpired(RoundExpiredInfo {
                    round_id: round_id.to_string(),
                    expired_at,
                })).await;
            }
            Err(e) => {
                let _ = sender.send(ServerMessage::Error(ServerError::from(&e))).await;
            }
        }
    }

    /// Serve one leaderboard page.
    async fn handle_leaderboard(
        request: LeaderboardRequest,
        engine: &Arc<RoundEngine>,
        config: &ServerConfig,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        let entries = engine
            .stats()
            .get_leaderboard(request.sort_key, request.page, config.leaderboard_page_size)
            .await;
        let _ = sender.send(ServerMessage::Leaderboard(LeaderboardPage {
            sort_key: request.sort_key,
            page: request.page,
            entries,
        })).await;
    }

    /// Serve the caller's profile.
    async fn handle_profile(
        user_id: UserId,
        store: &Arc<GameStore>,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        match store.get_user(&user_id).await {
            Some(user) => {
                let _ = sender.send(ServerMessage::Profile(ProfileInfo::from(user))).await;
            }
            None => {
                let _ = sender.send(ServerMessage::Error(ServerError::from(
                    &EngineError::UnknownUser(user_id),
                ))).await;
            }
        }
    }

    /// Close rounds whose deadline passed without a guess.
    async fn run_expiry_sweep_loop(engine: Arc<RoundEngine>, every: Duration) {
        let mut ticker = interval(every);
        loop {
            ticker.tick().await;
            engine.expire_stale_rounds(Utc::now()).await;
        }
    }

    /// Refill quotas whose day boundary passed.
    async fn run_quota_sweep_loop(engine: Arc<RoundEngine>, every: Duration) {
        let mut ticker = interval(every);
        loop {
            ticker.tick().await;
            engine.quota().reset_all_due(Utc::now()).await;
        }
    }

    /// Periodically reconcile aggregates against round history.
    async fn run_recompute_loop(engine: Arc<RoundEngine>, every: Duration) {
        let mut ticker = interval(every);
        loop {
            ticker.tick().await;
            engine.stats().recompute_all().await;
        }
    }

    /// Drop clients that have gone quiet.
    async fn run_cleanup_loop(clients: ClientMap, idle_timeout: Duration) {
        let mut ticker = interval(Duration::from_secs(60));
        loop {
            ticker.tick().await;

            let now = Instant::now();
            let to_remove: Vec<SocketAddr> = {
                let clients = clients.read().await;
                clients
                    .iter()
                    .filter(|(_, c)| now.duration_since(c.last_activity) > idle_timeout)
                    .map(|(addr, _)| *addr)
                    .collect()
            };

            if !to_remove.is_empty() {
                let mut clients = clients.write().await;
                for addr in to_remove {
                    clients.remove(&addr);
                    info!("removed idle client {}", addr);
                }
            }
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
