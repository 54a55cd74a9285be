//! WebSocket channel connector using tokio-tungstenite

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::{header::AUTHORIZATION, HeaderValue, StatusCode};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use consultchat_domain::{CloseReason, SessionId};

use crate::infrastructure::message_translator::{client_frame, translate_server_frame};
use crate::infrastructure::websocket::shared::{
    channel_url, parse_server_frame, CHANNEL_BUFFER, DEFAULT_WS_BASE_URL,
};
use crate::ports::outbound::{
    ChannelConnectorPort, ChannelEvent, OutboundFrame, RawChannel, TransportError,
};

/// Opens one WebSocket per [`ChannelConnectorPort::open`] call.
///
/// Each channel runs a read task and a write task. The write task sends a
/// close frame once the outbound sender is dropped; the read task reports
/// exactly one [`ChannelEvent::Closed`] when the socket ends.
#[derive(Debug, Clone)]
pub struct WsChannelConnector {
    base_url: String,
    token: Option<String>,
}

impl WsChannelConnector {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: token.filter(|t| !t.is_empty()),
        }
    }

    /// Uses `CHAT_WS_URL` and `CHAT_API_TOKEN`, falling back to the local default.
    pub fn from_env() -> Self {
        let base_url =
            std::env::var("CHAT_WS_URL").unwrap_or_else(|_| DEFAULT_WS_BASE_URL.to_string());
        Self::new(base_url, std::env::var("CHAT_API_TOKEN").ok())
    }

    fn request(&self, session_id: SessionId) -> Result<Request, TransportError> {
        let url = channel_url(&self.base_url, session_id)
            .map_err(|e| TransportError::Protocol(format!("Invalid channel URL: {}", e)))?;
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::Protocol(e.to_string()))?;

        if let Some(token) = &self.token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| TransportError::Protocol(format!("Invalid token: {}", e)))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }
        Ok(request)
    }
}

#[async_trait]
impl ChannelConnectorPort for WsChannelConnector {
    async fn open(&self, session_id: SessionId) -> Result<RawChannel, TransportError> {
        let request = self.request(session_id)?;
        let (ws_stream, _) = connect_async(request)
            .await
            .map_err(map_handshake_error)?;
        tracing::info!(%session_id, "WebSocket channel connected");

        let (mut write, mut read) = ws_stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<OutboundFrame>(CHANNEL_BUFFER);
        let (inbound_tx, inbound_rx) = mpsc::channel::<ChannelEvent>(CHANNEL_BUFFER);

        tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                let json = match serde_json::to_string(&client_frame(frame)) {
                    Ok(j) => j,
                    Err(e) => {
                        tracing::error!("Failed to serialize WebSocket frame: {}", e);
                        continue;
                    }
                };
                if let Err(e) = write.send(Message::Text(json)).await {
                    tracing::warn!("Failed to send WebSocket frame: {}", e);
                    return;
                }
            }
            // Outbound side dropped: the owner closed the channel
            let _ = write.send(Message::Close(None)).await;
        });

        tokio::spawn(async move {
            let reason = loop {
                match read.next().await {
                    Some(Ok(Message::Text(text))) => match parse_server_frame(&text) {
                        Ok(frame) => match translate_server_frame(frame) {
                            Some(frame) => {
                                if inbound_tx.send(ChannelEvent::Frame(frame)).await.is_err() {
                                    return;
                                }
                            }
                            None => tracing::debug!("Ignoring unknown server frame"),
                        },
                        Err(e) => tracing::warn!("Failed to parse server frame: {}", e),
                    },
                    Some(Ok(Message::Close(_))) => {
                        tracing::info!(%session_id, "Server closed WebSocket channel");
                        break CloseReason::ServerClosed;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(%session_id, error = %e, "WebSocket error");
                        break CloseReason::Error;
                    }
                    None => break CloseReason::Error,
                }
            };
            let _ = inbound_tx.send(ChannelEvent::Closed(reason)).await;
        });

        Ok(RawChannel {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}

fn map_handshake_error(error: WsError) -> TransportError {
    match error {
        WsError::Http(response) => {
            let status = response.status();
            let message = response
                .body()
                .as_ref()
                .map(|body| String::from_utf8_lossy(body).into_owned())
                .unwrap_or_else(|| status.to_string());
            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                TransportError::Unauthorized(message)
            } else {
                TransportError::Server {
                    status: status.as_u16(),
                    message,
                }
            }
        }
        WsError::Url(e) => TransportError::Protocol(e.to_string()),
        other => TransportError::Network(other.to_string()),
    }
}
