//! Connection manager for the notification push channel.
//!
//! Owns at most one live channel per session and drives its lifecycle from a
//! background task:
//!
//! - Every attempt reads the token at fire time and rebuilds the channel URL
//! - A handshake rejected for auth reasons goes through the refresh
//!   coordinator once before it counts as a failure
//! - Losses and failed attempts schedule a reconnect with exponential backoff
//!   until the attempt budget runs out (`Failed`)
//! - Application-level keepalive (`ping` / any inbound frame)
//! - Session expiry reported by the refresh coordinator tears the channel down
//!
//! Lifecycle events are published on a broadcast stream
//! ([`ConnectionManager::subscribe`]) and mirrored to [`EventHandlers`].

use super::{
    transport::{ArcConnector, Transport, TransportEvent},
    websocket::{build_channel_url, redact_url},
    CLOSE_ABNORMAL, CLOSE_NORMAL, DEFAULT_EVENT_CHANNEL_CAPACITY, FAR_FUTURE,
    OUTBOUND_QUEUE_CAPACITY,
};
use crate::{
    error::{NotifyLinkError, Result},
    event_handlers::{ConnectionError, DisconnectReason, EventHandlers},
    models::{ClientMessage, ConnectionEvent, ConnectionOptions, ConnectionState},
    refresh::{RefreshCoordinator, SessionStatus},
    timeouts::NotifyLinkTimeouts,
};
use reqwest::Url;
use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc, PoisonError, RwLock,
};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant as TokioInstant;

// ── Commands ────────────────────────────────────────────────────────────────

/// Commands sent from the public API to the background connection task.
enum ConnCmd {
    Connect {
        ack: oneshot::Sender<ConnectionState>,
    },
    Disconnect {
        ack: oneshot::Sender<()>,
    },
    Shutdown,
}

// ── Channel handle ──────────────────────────────────────────────────────────

/// Handle to the live channel.
///
/// Each successful open produces a new handle with a larger [`id`](Self::id).
/// Once that connection is gone, sends on its handle fail.
#[derive(Clone)]
pub struct Channel {
    id: u64,
    outbound: mpsc::Sender<String>,
}

impl Channel {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Serialize and queue a client frame.
    pub async fn send(&self, message: &ClientMessage) -> Result<()> {
        let payload = serde_json::to_string(message)?;
        self.send_text(payload).await
    }

    /// Queue a raw text frame.
    pub async fn send_text(&self, text: impl Into<String>) -> Result<()> {
        self.outbound.send(text.into()).await.map_err(|_| {
            NotifyLinkError::WebSocketError(format!("Channel {} is closed", self.id))
        })
    }

    /// `true` once the connection behind this handle has ended.
    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

// ── State shared between the handle and the task ───────────────────────────

struct Shared {
    state_tx: watch::Sender<ConnectionState>,
    channel: RwLock<Option<Channel>>,
    attempts: AtomicU32,
    events: broadcast::Sender<ConnectionEvent>,
    handlers: EventHandlers,
}

impl Shared {
    fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            log::info!("[notify-link] Connection state {} -> {}", previous, state);
            self.handlers.emit_state_change(state);
        }
    }

    fn set_channel(&self, channel: Option<Channel>) {
        *self.channel.write().unwrap_or_else(PoisonError::into_inner) = channel;
    }

    fn publish(&self, event: ConnectionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

// ── ConnectionManager (public handle) ───────────────────────────────────────

/// Manages the single push channel of a session.
///
/// Must be created inside a tokio runtime. Dropping the manager stops its
/// task and closes any live channel.
pub struct ConnectionManager {
    cmd_tx: mpsc::Sender<ConnCmd>,
    shared: Arc<Shared>,
    _task: JoinHandle<()>,
}

impl ConnectionManager {
    pub fn new(
        endpoint: Url,
        coordinator: Arc<RefreshCoordinator>,
        connector: ArcConnector,
        options: ConnectionOptions,
        timeouts: NotifyLinkTimeouts,
        handlers: EventHandlers,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel::<ConnCmd>(64);
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (events, _) = broadcast::channel(DEFAULT_EVENT_CHANNEL_CAPACITY);

        let shared = Arc::new(Shared {
            state_tx,
            channel: RwLock::new(None),
            attempts: AtomicU32::new(0),
            events,
            handlers,
        });

        let task = ConnectionTask {
            cmd_rx,
            session_rx: coordinator.watch_session(),
            shared: Arc::clone(&shared),
            coordinator,
            connector,
            endpoint,
            options,
            timeouts,
            channel_seq: 0,
        };

        Self {
            cmd_tx,
            shared,
            _task: tokio::spawn(task.run()),
        }
    }

    /// Start connecting with the current token.
    ///
    /// Any live channel or pending attempt is dropped first and the attempt
    /// counter resets. Returns the state right after the command was applied:
    /// `Connecting`, or `Disconnected` when no token is available.
    pub async fn connect(&self) -> Result<ConnectionState> {
        let (ack, result) = oneshot::channel();
        self.cmd_tx
            .send(ConnCmd::Connect { ack })
            .await
            .map_err(|_| {
                NotifyLinkError::WebSocketError("Connection task is not running".to_string())
            })?;
        result.await.map_err(|_| {
            NotifyLinkError::WebSocketError(
                "Connection task exited before acknowledging connect".to_string(),
            )
        })
    }

    /// Close the live channel, cancel any pending backoff timer and go to
    /// `Disconnected`. Idempotent; returns once the task has applied it.
    pub async fn disconnect(&self) {
        let (ack, done) = oneshot::channel();
        if self.cmd_tx.send(ConnCmd::Disconnect { ack }).await.is_err() {
            return;
        }
        let _ = done.await;
    }

    /// The live channel, if the state is `Open`.
    pub fn current_channel(&self) -> Option<Channel> {
        self.shared
            .channel
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Lifecycle event stream. Subscribe before `connect` to see the first
    /// `Opened`.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.shared.events.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    /// Consecutive failed reconnect attempts since the last open.
    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.attempts.load(Ordering::SeqCst)
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_open()
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        let _ = self.cmd_tx.try_send(ConnCmd::Shutdown);
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("state", &self.state())
            .field("reconnect_attempts", &self.reconnect_attempts())
            .finish()
    }
}

// ── Background connection task ──────────────────────────────────────────────

enum Phase {
    /// `Disconnected` or `Failed`; waiting for a command.
    Idle,
    /// Handshake to perform now.
    Connect,
    Open(OpenChannel),
    /// `Reconnecting` until the deadline.
    Backoff(TokioInstant),
    Exit,
}

struct OpenChannel {
    id: u64,
    transport: Box<dyn Transport>,
    outbound_rx: mpsc::Receiver<String>,
}

enum Step {
    Command(Option<ConnCmd>),
    SessionExpired,
    Handshake(Result<Box<dyn Transport>>),
    Fire,
    PongTimeout,
    Keepalive,
    Outbound(Option<String>),
    Inbound(TransportEvent),
}

struct ConnectionTask {
    cmd_rx: mpsc::Receiver<ConnCmd>,
    session_rx: watch::Receiver<SessionStatus>,
    shared: Arc<Shared>,
    coordinator: Arc<RefreshCoordinator>,
    connector: ArcConnector,
    endpoint: Url,
    options: ConnectionOptions,
    timeouts: NotifyLinkTimeouts,
    channel_seq: u64,
}

/// Resolves when the session status changes to `Expired`. Cancel-safe.
async fn session_expired(rx: &mut watch::Receiver<SessionStatus>) {
    loop {
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
        if *rx.borrow_and_update() == SessionStatus::Expired {
            return;
        }
    }
}

async fn open_channel(
    connector: &ArcConnector,
    endpoint: &Url,
    token: &str,
    timeouts: &NotifyLinkTimeouts,
) -> Result<Box<dyn Transport>> {
    let url = build_channel_url(endpoint, token);
    log::debug!("[notify-link] Connecting to {}", redact_url(&url));

    if NotifyLinkTimeouts::is_no_timeout(timeouts.connection_timeout) {
        return connector.open(&url).await;
    }

    tokio::time::timeout(timeouts.connection_timeout, connector.open(&url))
        .await
        .map_err(|_| {
            NotifyLinkError::TimeoutError(format!(
                "Connection timeout ({:?})",
                timeouts.connection_timeout
            ))
        })?
}

async fn establish(
    coordinator: &RefreshCoordinator,
    connector: &ArcConnector,
    endpoint: &Url,
    timeouts: &NotifyLinkTimeouts,
) -> Result<Box<dyn Transport>> {
    let token = coordinator.ensure_fresh_token().await?;

    match open_channel(connector, endpoint, &token, timeouts).await {
        Err(e) if e.is_auth_rejection() => {
            log::info!("[notify-link] Handshake rejected ({}); refreshing token", e);
            let token = coordinator.refresh_after_rejection(&token).await?;
            open_channel(connector, endpoint, &token, timeouts).await
        },
        other => other,
    }
}

impl ConnectionTask {
    async fn run(mut self) {
        let mut phase = Phase::Idle;
        loop {
            phase = match phase {
                Phase::Idle => self.idle().await,
                Phase::Connect => self.attempt().await,
                Phase::Open(open) => self.serve(open).await,
                Phase::Backoff(deadline) => self.backoff(deadline).await,
                Phase::Exit => break,
            };
        }
        log::debug!("[notify-link] Connection task stopped");
    }

    fn handle_command(&mut self, cmd: Option<ConnCmd>) -> Phase {
        match cmd {
            Some(ConnCmd::Connect { ack }) => {
                self.shared.attempts.store(0, Ordering::SeqCst);
                let phase = if self.coordinator.current_token().is_some() {
                    self.shared.set_state(ConnectionState::Connecting);
                    Phase::Connect
                } else {
                    log::info!("[notify-link] No access token; staying disconnected");
                    self.shared.set_state(ConnectionState::Disconnected);
                    Phase::Idle
                };
                let _ = ack.send(self.shared.state());
                phase
            },
            Some(ConnCmd::Disconnect { ack }) => {
                self.shared.attempts.store(0, Ordering::SeqCst);
                self.shared.set_state(ConnectionState::Disconnected);
                let _ = ack.send(());
                Phase::Idle
            },
            Some(ConnCmd::Shutdown) | None => {
                self.shared.set_state(ConnectionState::Disconnected);
                Phase::Exit
            },
        }
    }

    fn expire(&mut self) -> Phase {
        log::warn!("[notify-link] Session expired; channel stays down until the next login");
        self.shared.set_channel(None);
        self.shared.attempts.store(0, Ordering::SeqCst);
        self.shared.set_state(ConnectionState::Disconnected);
        Phase::Idle
    }

    async fn idle(&mut self) -> Phase {
        let step = tokio::select! {
            biased;
            cmd = self.cmd_rx.recv() => Step::Command(cmd),
            _ = session_expired(&mut self.session_rx) => Step::SessionExpired,
        };

        match step {
            Step::Command(cmd) => self.handle_command(cmd),
            _ => self.expire(),
        }
    }

    async fn attempt(&mut self) -> Phase {
        let step = {
            let handshake =
                establish(&self.coordinator, &self.connector, &self.endpoint, &self.timeouts);
            tokio::pin!(handshake);

            tokio::select! {
                biased;
                cmd = self.cmd_rx.recv() => Step::Command(cmd),
                _ = session_expired(&mut self.session_rx) => Step::SessionExpired,
                result = &mut handshake => Step::Handshake(result),
            }
        };

        match step {
            Step::Command(cmd) => {
                log::debug!("[notify-link] Handshake abandoned by command");
                self.handle_command(cmd)
            },
            Step::Handshake(Ok(transport)) => self.on_opened(transport),
            Step::Handshake(Err(NotifyLinkError::SessionExpired(message))) => {
                self.shared.publish(ConnectionEvent::Error {
                    message: message.clone(),
                });
                self.shared
                    .handlers
                    .emit_error(ConnectionError::new(message, false));
                self.expire()
            },
            Step::Handshake(Err(e)) => {
                let message = e.to_string();
                log::warn!(
                    "[notify-link] Connection attempt {} failed: {}",
                    self.shared.attempts.load(Ordering::SeqCst) + 1,
                    message
                );
                self.shared.publish(ConnectionEvent::Error {
                    message: message.clone(),
                });
                self.shared
                    .handlers
                    .emit_error(ConnectionError::new(message, true));
                self.schedule_reconnect()
            },
            _ => self.expire(),
        }
    }

    fn on_opened(&mut self, transport: Box<dyn Transport>) -> Phase {
        self.channel_seq += 1;
        let id = self.channel_seq;
        let (outbound, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);

        self.shared.attempts.store(0, Ordering::SeqCst);
        self.shared.set_channel(Some(Channel { id, outbound }));
        self.shared.set_state(ConnectionState::Open);
        log::info!("[notify-link] Channel {} open", id);
        self.shared.publish(ConnectionEvent::Opened { channel_id: id });
        self.shared.handlers.emit_connect();

        Phase::Open(OpenChannel {
            id,
            transport,
            outbound_rx,
        })
    }

    async fn serve(&mut self, mut open: OpenChannel) -> Phase {
        let has_keepalive = !NotifyLinkTimeouts::is_no_timeout(self.timeouts.keepalive_interval);
        let keepalive_dur = if has_keepalive {
            self.timeouts.keepalive_interval
        } else {
            FAR_FUTURE
        };
        let pong_timeout = self.timeouts.pong_timeout;
        let has_pong_timeout = has_keepalive && !NotifyLinkTimeouts::is_no_timeout(pong_timeout);

        let mut idle_deadline = TokioInstant::now() + keepalive_dur;
        let mut awaiting_pong = false;
        let mut pong_deadline = TokioInstant::now() + FAR_FUTURE;
        let mut outbound_live = true;

        loop {
            let step = tokio::select! {
                biased;
                _ = tokio::time::sleep_until(pong_deadline), if awaiting_pong => Step::PongTimeout,
                cmd = self.cmd_rx.recv() => Step::Command(cmd),
                _ = session_expired(&mut self.session_rx) => Step::SessionExpired,
                frame = open.outbound_rx.recv(), if outbound_live => Step::Outbound(frame),
                _ = tokio::time::sleep_until(idle_deadline), if has_keepalive && !awaiting_pong => Step::Keepalive,
                event = open.transport.next_event() => Step::Inbound(event),
            };

            match step {
                Step::PongTimeout => {
                    log::warn!(
                        "[notify-link] Pong timeout ({:?}); server unresponsive",
                        pong_timeout
                    );
                    return self.on_lost(
                        open,
                        Some(CLOSE_ABNORMAL),
                        format!("Pong timeout ({:?})", pong_timeout),
                    );
                },
                Step::Command(cmd) => {
                    self.close_channel(&mut open, "Client disconnect").await;
                    return self.handle_command(cmd);
                },
                Step::SessionExpired => {
                    self.close_channel(&mut open, "Session expired").await;
                    return self.expire();
                },
                Step::Outbound(Some(text)) => {
                    if let Err(e) = open.transport.send_text(text.clone()).await {
                        return self.on_lost(open, Some(CLOSE_ABNORMAL), e.to_string());
                    }
                    self.shared.handlers.emit_send(&text);
                },
                Step::Outbound(None) => outbound_live = false,
                Step::Keepalive => {
                    let ping = match serde_json::to_string(&ClientMessage::Ping) {
                        Ok(ping) => ping,
                        Err(e) => {
                            log::warn!("[notify-link] Failed to encode ping: {}", e);
                            idle_deadline = TokioInstant::now() + keepalive_dur;
                            continue;
                        },
                    };
                    if let Err(e) = open.transport.send_text(ping.clone()).await {
                        log::warn!("[notify-link] Keepalive ping failed: {}", e);
                        return self.on_lost(open, Some(CLOSE_ABNORMAL), e.to_string());
                    }
                    self.shared.handlers.emit_send(&ping);
                    if has_pong_timeout {
                        awaiting_pong = true;
                        pong_deadline = TokioInstant::now() + pong_timeout;
                    }
                    idle_deadline = TokioInstant::now() + keepalive_dur;
                },
                Step::Inbound(event) => {
                    idle_deadline = TokioInstant::now() + keepalive_dur;
                    if awaiting_pong {
                        awaiting_pong = false;
                        pong_deadline = TokioInstant::now() + FAR_FUTURE;
                    }

                    match event {
                        TransportEvent::Text(text) => {
                            self.shared.handlers.emit_receive(&text);
                            self.shared.publish(ConnectionEvent::Message(text));
                        },
                        TransportEvent::Heartbeat => {},
                        TransportEvent::Closed { code, reason } => {
                            return self.on_lost(open, code, reason);
                        },
                        TransportEvent::Error(message) => {
                            self.shared.publish(ConnectionEvent::Error {
                                message: message.clone(),
                            });
                            self.shared
                                .handlers
                                .emit_error(ConnectionError::new(message.clone(), true));
                            return self.on_lost(open, Some(CLOSE_ABNORMAL), message);
                        },
                    }
                },
                Step::Fire | Step::Handshake(_) => {},
            }
        }
    }

    /// Client-initiated close of the live channel.
    async fn close_channel(&mut self, open: &mut OpenChannel, reason: &str) {
        self.shared.set_channel(None);
        open.transport.close().await;
        log::info!("[notify-link] Channel {} closed: {}", open.id, reason);
        self.shared.publish(ConnectionEvent::Closed {
            code: Some(CLOSE_NORMAL),
            reason: reason.to_string(),
        });
        self.shared
            .handlers
            .emit_disconnect(DisconnectReason::with_code(reason, CLOSE_NORMAL));
    }

    /// The channel went away without the client asking for it.
    fn on_lost(&mut self, open: OpenChannel, code: Option<u16>, reason: String) -> Phase {
        let id = open.id;
        drop(open);
        self.shared.set_channel(None);
        log::warn!("[notify-link] Channel {} lost (code={:?}): {}", id, code, reason);

        self.shared.publish(ConnectionEvent::Closed {
            code,
            reason: reason.clone(),
        });
        let disconnect = match code {
            Some(code) => DisconnectReason::with_code(reason, code),
            None => DisconnectReason::new(reason),
        };
        self.shared.handlers.emit_disconnect(disconnect);

        self.schedule_reconnect()
    }

    fn schedule_reconnect(&mut self) -> Phase {
        if !self.options.auto_reconnect {
            log::info!("[notify-link] Auto-reconnect disabled; waiting for an explicit connect");
            self.shared.set_state(ConnectionState::Failed);
            return Phase::Idle;
        }

        let attempt = self.shared.attempts.load(Ordering::SeqCst);
        match self.options.backoff_delay(attempt) {
            Some(delay) => {
                log::info!(
                    "[notify-link] Attempting reconnection in {}ms (attempt {})",
                    delay.as_millis(),
                    attempt + 1
                );
                self.shared.set_state(ConnectionState::Reconnecting);
                Phase::Backoff(TokioInstant::now() + delay)
            },
            None => {
                log::warn!("[notify-link] Max reconnection attempts ({}) reached", attempt);
                self.shared.handlers.emit_error(ConnectionError::new(
                    format!("Max reconnection attempts ({}) reached", attempt),
                    false,
                ));
                self.shared.set_state(ConnectionState::Failed);
                Phase::Idle
            },
        }
    }

    async fn backoff(&mut self, deadline: TokioInstant) -> Phase {
        let step = tokio::select! {
            biased;
            cmd = self.cmd_rx.recv() => Step::Command(cmd),
            _ = session_expired(&mut self.session_rx) => Step::SessionExpired,
            _ = tokio::time::sleep_until(deadline) => Step::Fire,
        };

        match step {
            Step::Command(cmd) => self.handle_command(cmd),
            Step::Fire => {
                let attempt = self.shared.attempts.fetch_add(1, Ordering::SeqCst) + 1;
                log::debug!("[notify-link] Backoff elapsed; reconnection attempt {}", attempt);
                self.shared.set_state(ConnectionState::Connecting);
                Phase::Connect
            },
            _ => self.expire(),
        }
    }
}
