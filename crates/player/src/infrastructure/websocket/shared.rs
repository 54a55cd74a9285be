//! Shared helpers for the WebSocket channel adapter.
//!
//! Runtime-agnostic (no tokio): URL building and frame parsing only.

use url::Url;

use consultchat_domain::SessionId;
use consultchat_shared::ServerFrame;

/// Default WebSocket base URL of a locally running backend.
pub const DEFAULT_WS_BASE_URL: &str = "ws://localhost:3000";

/// Buffer size of the per-connection frame channels.
pub const CHANNEL_BUFFER: usize = 64;

/// Channel endpoint for `session_id` under `base`.
///
/// `http`/`https` bases are mapped to `ws`/`wss`, so one backend URL can be
/// used for both transports.
pub fn channel_url(base: &str, session_id: SessionId) -> Result<Url, url::ParseError> {
    let mut base = Url::parse(base)?;
    let scheme = match base.scheme() {
        "http" => Some("ws"),
        "https" => Some("wss"),
        _ => None,
    };
    if let Some(scheme) = scheme {
        // Only fails for cannot-be-a-base URLs, which `join` rejects below anyway
        let _ = base.set_scheme(scheme);
    }
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join(&format!("ws/chat/{}", session_id))
}

pub fn parse_server_frame(text: &str) -> Result<ServerFrame, serde_json::Error> {
    serde_json::from_str(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_channel_url_under_base_path() {
        let session_id = SessionId::new();
        let url = channel_url("ws://localhost:3000/chat-backend", session_id).expect("valid");
        assert_eq!(
            url.as_str(),
            format!("ws://localhost:3000/chat-backend/ws/chat/{}", session_id)
        );
    }

    #[test]
    fn http_base_becomes_websocket() {
        let session_id = SessionId::new();
        let url = channel_url("https://chat.example.com/", session_id).expect("valid");
        assert_eq!(url.scheme(), "wss");
    }

    #[test]
    fn parses_ack_frames() {
        let frame = parse_server_frame(
            r#"{"type":"Ack","client_message_id":"6f1c1c34-7c43-4a47-9d6e-8ad1f1d8f7a1","server_message_id":"0b8a1c9e-2f7e-4e39-8f37-2b8f8f0d6c11","created_at":"2024-05-01T10:00:00Z"}"#,
        )
        .expect("decodes");
        assert!(matches!(frame, ServerFrame::Ack { .. }));
    }
}
