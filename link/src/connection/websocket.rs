//! WebSocket transport and channel URL helpers.

use super::{
    transport::{Connector, Transport, TransportEvent},
    CHANNEL_PATH, CLOSE_ABNORMAL, MAX_TEXT_FRAME_BYTES,
};
use crate::error::{NotifyLinkError, Result};
use futures_util::{SinkExt, StreamExt};
use reqwest::Url;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{error::Error as WsError, protocol::Message},
    MaybeTlsStream,
};

type WebSocketStream = tokio_tungstenite::WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Resolve the push channel endpoint (without token) from the API base URL.
///
/// `http(s)://host` maps to `ws(s)://host/ws/notifications/`. An explicit
/// `override_url` must be `ws://` or `wss://`, and may not downgrade an
/// `https` base to plain `ws`.
pub fn resolve_channel_endpoint(base_url: &str, override_url: Option<&str>) -> Result<Url> {
    let base = Url::parse(base_url.trim()).map_err(|e| {
        NotifyLinkError::ConfigurationError(format!("Invalid base_url '{}': {}", base_url, e))
    })?;

    validate_endpoint(&base, false, "base_url")?;

    if let Some(url) = override_url {
        let override_parsed = Url::parse(url.trim()).map_err(|e| {
            NotifyLinkError::ConfigurationError(format!(
                "Invalid WebSocket override URL '{}': {}",
                url, e
            ))
        })?;

        validate_endpoint(&override_parsed, true, "WebSocket override URL")?;

        if base.scheme() == "https" && override_parsed.scheme() == "ws" {
            return Err(NotifyLinkError::ConfigurationError(
                "Refusing insecure ws:// override when base_url uses https://".to_string(),
            ));
        }

        return Ok(override_parsed);
    }

    let ws_scheme = match base.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(NotifyLinkError::ConfigurationError(format!(
                "Unsupported base_url scheme '{}'; expected http(s) or ws(s)",
                other
            )));
        },
    };

    let mut ws_url = base;
    ws_url.set_scheme(ws_scheme).map_err(|_| {
        NotifyLinkError::ConfigurationError("Failed to set WebSocket URL scheme".to_string())
    })?;
    ws_url.set_fragment(None);
    ws_url.set_query(None);
    ws_url.set_path(CHANNEL_PATH);

    Ok(ws_url)
}

fn validate_endpoint(url: &Url, require_ws_scheme: bool, context: &str) -> Result<()> {
    if url.host_str().is_none() {
        return Err(NotifyLinkError::ConfigurationError(format!(
            "{} must include a host",
            context
        )));
    }

    if !url.username().is_empty() || url.password().is_some() {
        return Err(NotifyLinkError::ConfigurationError(format!(
            "{} must not include username/password credentials",
            context
        )));
    }

    if require_ws_scheme && !matches!(url.scheme(), "ws" | "wss") {
        return Err(NotifyLinkError::ConfigurationError(format!(
            "{} must use ws:// or wss:// (found '{}')",
            context,
            url.scheme()
        )));
    }

    if url.query().is_some() || url.fragment().is_some() {
        return Err(NotifyLinkError::ConfigurationError(format!(
            "{} must not include query parameters or fragments",
            context
        )));
    }

    Ok(())
}

/// The endpoint with the access token attached as the `token` query value.
/// Rebuilt for every attempt so a refreshed token is always used.
pub fn build_channel_url(endpoint: &Url, token: &str) -> Url {
    let mut url = endpoint.clone();
    url.query_pairs_mut().clear().append_pair("token", token);
    url
}

/// Printable form of a channel URL with the token masked.
pub fn redact_url(url: &Url) -> String {
    if url.query().is_none() {
        return url.to_string();
    }

    let mut redacted = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let value = if k == "token" { "***".to_string() } else { v.into_owned() };
            (k.into_owned(), value)
        })
        .collect();
    redacted.query_pairs_mut().clear().extend_pairs(pairs);
    redacted.to_string()
}

/// [`Connector`] over `tokio-tungstenite`.
#[derive(Debug, Clone, Default)]
pub struct WsConnector;

impl WsConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl Connector for WsConnector {
    async fn open(&self, url: &Url) -> Result<Box<dyn Transport>> {
        log::debug!("[notify-link] Opening WebSocket to {}", redact_url(url));

        match connect_async(url.as_str()).await {
            Ok((stream, _response)) => Ok(Box::new(WsTransport { stream })),
            Err(WsError::Http(response)) => {
                let status = response.status();
                let body_text = response
                    .body()
                    .as_ref()
                    .filter(|b| !b.is_empty())
                    .map(|b| String::from_utf8_lossy(b).into_owned())
                    .unwrap_or_default();
                Err(match status.as_u16() {
                    401 => NotifyLinkError::AuthenticationError(
                        "Unauthorized: channel handshake rejected the token".to_string(),
                    ),
                    403 => NotifyLinkError::AuthenticationError(
                        "Forbidden: channel handshake denied".to_string(),
                    ),
                    code if body_text.is_empty() => {
                        NotifyLinkError::WebSocketError(format!("WebSocket HTTP error: {}", code))
                    },
                    code => NotifyLinkError::WebSocketError(format!(
                        "WebSocket HTTP error {}: {}",
                        code, body_text
                    )),
                })
            },
            Err(e) => Err(NotifyLinkError::WebSocketError(format!("Connection failed: {}", e))),
        }
    }
}

struct WsTransport {
    stream: WebSocketStream,
}

#[async_trait::async_trait]
impl Transport for WsTransport {
    async fn next_event(&mut self) -> TransportEvent {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    if text.len() > MAX_TEXT_FRAME_BYTES {
                        log::warn!("[notify-link] Text frame too large ({} bytes)", text.len());
                        continue;
                    }
                    return TransportEvent::Text(text.as_str().to_owned());
                },
                Some(Ok(Message::Binary(data))) => {
                    log::warn!(
                        "[notify-link] Ignoring binary frame ({} bytes) on notification channel",
                        data.len()
                    );
                    return TransportEvent::Heartbeat;
                },
                // tungstenite queues the pong reply itself.
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                    return TransportEvent::Heartbeat;
                },
                Some(Ok(Message::Frame(_))) => continue,
                Some(Ok(Message::Close(frame))) => {
                    return match frame {
                        Some(f) => TransportEvent::Closed {
                            code: Some(f.code.into()),
                            reason: f.reason.as_str().to_owned(),
                        },
                        None => TransportEvent::Closed {
                            code: None,
                            reason: "Server closed connection".to_string(),
                        },
                    };
                },
                Some(Err(e)) => return TransportEvent::Error(e.to_string()),
                None => {
                    return TransportEvent::Closed {
                        code: Some(CLOSE_ABNORMAL),
                        reason: "WebSocket stream ended".to_string(),
                    };
                },
            }
        }
    }

    async fn send_text(&mut self, text: String) -> Result<()> {
        self.stream
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| NotifyLinkError::WebSocketError(format!("Failed to send frame: {}", e)))
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            log::debug!("[notify-link] Close handshake failed: {}", e);
        }
    }
}
