//! Shared fakes for the integration tests: a scripted transport, a scripted
//! REST collaborator and a token provider with controllable refresh.

#![allow(dead_code)]

use base64::{engine::general_purpose, Engine as _};
use chrono::{TimeZone, Utc};
use notify_link::{
    models::MarkAllResponse, ArcConnector, Connector, Notification, NotificationApi,
    NotificationId, NotificationType, NotifyLinkError, NotifyLinkTimeouts, Result, TokenProvider,
    Transport, TransportEvent,
};
use reqwest::Url;
use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};
use tokio::sync::mpsc;

pub const BASE_URL: &str = "http://localhost:8000";

/// Timeouts with keepalive disabled, so paused-clock tests only see the
/// timers they arm themselves.
pub fn quiet_timeouts() -> NotifyLinkTimeouts {
    NotifyLinkTimeouts::builder()
        .keepalive_interval(Duration::ZERO)
        .pong_timeout(Duration::ZERO)
        .build()
}

pub fn notification(id: i64, is_read: bool) -> Notification {
    Notification::new(
        id,
        NotificationType::ApplicationApproved,
        format!("Application {} approved", id),
        "Your application was approved",
        Utc.with_ymd_and_hms(2025, 4, 1, 12, 0, 0).unwrap() + chrono::Duration::minutes(id),
    )
    .with_read(is_read)
}

/// A push frame carrying `notification`.
pub fn push_frame(notification: &Notification) -> String {
    serde_json::json!({
        "type": "notification",
        "notification": notification,
    })
    .to_string()
}

/// Unsigned JWT with the given `exp` (seconds since the epoch).
pub fn make_jwt(exp: i64) -> String {
    let header = general_purpose::URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = general_purpose::URL_SAFE_NO_PAD
        .encode(format!(r#"{{"token_type":"access","exp":{},"user_id":1}}"#, exp));
    format!("{}.{}.sig", header, payload)
}

// ── Token provider ──────────────────────────────────────────────────────────

/// Token provider whose refresh hands out `next` or fails.
pub struct FakeTokenProvider {
    token: Mutex<Option<String>>,
    next: Mutex<Option<String>>,
    refresh_calls: AtomicUsize,
}

impl FakeTokenProvider {
    pub fn new(token: &str) -> Arc<Self> {
        Arc::new(Self {
            token: Mutex::new(Some(token.to_string())),
            next: Mutex::new(None),
            refresh_calls: AtomicUsize::new(0),
        })
    }

    pub fn logged_out() -> Arc<Self> {
        Arc::new(Self {
            token: Mutex::new(None),
            next: Mutex::new(None),
            refresh_calls: AtomicUsize::new(0),
        })
    }

    /// Token the next refresh returns. Without one, refresh fails.
    pub fn refresh_to(&self, token: &str) {
        *self.next.lock().unwrap() = Some(token.to_string());
    }

    pub fn set_token(&self, token: &str) {
        *self.token.lock().unwrap() = Some(token.to_string());
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl TokenProvider for FakeTokenProvider {
    fn access_token(&self) -> Option<String> {
        self.token.lock().unwrap().clone()
    }

    async fn refresh(&self) -> Result<String> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        match self.next.lock().unwrap().take() {
            Some(token) => {
                *self.token.lock().unwrap() = Some(token.clone());
                Ok(token)
            },
            None => Err(NotifyLinkError::SessionExpired("refresh token revoked".into())),
        }
    }
}

// ── Transport ───────────────────────────────────────────────────────────────

/// What the next handshake does.
pub enum Outcome {
    Open,
    Fail(NotifyLinkError),
}

/// Server side of one accepted fake channel.
#[derive(Clone)]
pub struct Peer {
    inbound: mpsc::UnboundedSender<TransportEvent>,
    sent: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

impl Peer {
    pub fn push(&self, text: impl Into<String>) {
        let _ = self.inbound.send(TransportEvent::Text(text.into()));
    }

    /// Drop the connection the way a network failure would.
    pub fn drop_connection(&self) {
        let _ = self.inbound.send(TransportEvent::Closed {
            code: Some(1006),
            reason: "connection reset".into(),
        });
    }

    /// Frames the client sent on this channel.
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    /// `true` once the client closed this channel.
    pub fn closed_by_client(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

struct FakeTransport {
    inbound: mpsc::UnboundedReceiver<TransportEvent>,
    sent: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

#[async_trait::async_trait]
impl Transport for FakeTransport {
    async fn next_event(&mut self) -> TransportEvent {
        match self.inbound.recv().await {
            Some(event) => event,
            None => std::future::pending().await,
        }
    }

    async fn send_text(&mut self, text: String) -> Result<()> {
        self.sent.lock().unwrap().push(text);
        Ok(())
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Connector that plays back scripted outcomes. Once the script runs out,
/// every handshake fails.
#[derive(Default)]
pub struct ScriptedConnector {
    script: Mutex<VecDeque<Outcome>>,
    attempts: Mutex<Vec<(tokio::time::Instant, Option<String>)>>,
    peers: Mutex<Vec<Peer>>,
}

impl ScriptedConnector {
    pub fn new(script: Vec<Outcome>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            ..Default::default()
        })
    }

    pub fn always_failing() -> Arc<Self> {
        Self::new(Vec::new())
    }

    pub fn as_connector(self: &Arc<Self>) -> ArcConnector {
        self.clone()
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.lock().unwrap().len()
    }

    pub fn attempt_times(&self) -> Vec<tokio::time::Instant> {
        self.attempts.lock().unwrap().iter().map(|(at, _)| *at).collect()
    }

    /// Token carried by each handshake, in order.
    pub fn tokens(&self) -> Vec<Option<String>> {
        self.attempts.lock().unwrap().iter().map(|(_, t)| t.clone()).collect()
    }

    /// The `n`-th accepted channel (0-based).
    pub fn peer(&self, n: usize) -> Peer {
        self.peers.lock().unwrap()[n].clone()
    }

    pub fn peer_count(&self) -> usize {
        self.peers.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl Connector for ScriptedConnector {
    async fn open(&self, url: &Url) -> Result<Box<dyn Transport>> {
        let token = url
            .query_pairs()
            .find(|(k, _)| k == "token")
            .map(|(_, v)| v.into_owned());
        self.attempts
            .lock()
            .unwrap()
            .push((tokio::time::Instant::now(), token));

        let outcome = self.script.lock().unwrap().pop_front();
        match outcome {
            Some(Outcome::Open) => {
                let (tx, rx) = mpsc::unbounded_channel();
                let sent = Arc::new(Mutex::new(Vec::new()));
                let closed = Arc::new(AtomicBool::new(false));
                self.peers.lock().unwrap().push(Peer {
                    inbound: tx,
                    sent: Arc::clone(&sent),
                    closed: Arc::clone(&closed),
                });
                Ok(Box::new(FakeTransport {
                    inbound: rx,
                    sent,
                    closed,
                }))
            },
            Some(Outcome::Fail(e)) => Err(e),
            None => Err(NotifyLinkError::WebSocketError("Connection refused".into())),
        }
    }
}

// ── REST collaborator ───────────────────────────────────────────────────────

/// In-memory server state behind the REST contract.
#[derive(Default)]
pub struct FakeApi {
    server: Mutex<Vec<Notification>>,
    fail_writes: AtomicBool,
    pub list_calls: AtomicUsize,
    pub mark_read_calls: AtomicUsize,
    pub mark_all_calls: AtomicUsize,
}

impl FakeApi {
    pub fn with(notifications: Vec<Notification>) -> Arc<Self> {
        Arc::new(Self {
            server: Mutex::new(notifications),
            ..Default::default()
        })
    }

    /// Simulate the server creating a notification (newest first).
    pub fn create(&self, notification: Notification) {
        self.server.lock().unwrap().insert(0, notification);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl NotificationApi for FakeApi {
    async fn list_notifications(&self) -> Result<Vec<Notification>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.server.lock().unwrap().clone())
    }

    async fn unread_count(&self) -> Result<u64> {
        Ok(self.server.lock().unwrap().iter().filter(|n| !n.is_read).count() as u64)
    }

    async fn mark_as_read(&self, id: &NotificationId) -> Result<Notification> {
        self.mark_read_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(NotifyLinkError::NetworkError("connection reset".into()));
        }
        let mut server = self.server.lock().unwrap();
        let entry = server
            .iter_mut()
            .find(|n| &n.id == id)
            .ok_or_else(|| NotifyLinkError::NotFound("No Notification matches the given query.".into()))?;
        entry.is_read = true;
        entry.read_at = Some(Utc::now());
        Ok(entry.clone())
    }

    async fn mark_all_as_read(&self) -> Result<MarkAllResponse> {
        self.mark_all_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(NotifyLinkError::NetworkError("connection reset".into()));
        }
        let mut server = self.server.lock().unwrap();
        let mut count = 0;
        for n in server.iter_mut().filter(|n| !n.is_read) {
            n.is_read = true;
            count += 1;
        }
        Ok(MarkAllResponse {
            count,
            message: Some(format!("{} notifications marked as read", count)),
        })
    }
}
