//! WebSocket handling for chat clients.
//!
//! One socket per client and session at `/ws/chat/{id}`. Client frames are
//! answered on the same socket; every message stored in the session is pushed
//! as `ServerFrame::Message`, except the submitting connection's own user
//! messages, which it already knows from the `Ack`.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::Response,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast::error::RecvError, mpsc};
use uuid::Uuid;

use consultchat_domain::{MessageId, SessionId};
use consultchat_shared::{ClientFrame, ServerFrame};

use crate::api::dto::message_dto;
use crate::app::App;
use crate::stores::LiveMessage;

/// Buffer size for per-connection outbound frames.
const CONNECTION_CHANNEL_BUFFER: usize = 64;

pub fn routes() -> Router<Arc<App>> {
    Router::new().route("/ws/chat/{id}", get(ws_handler))
}

/// WebSocket upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(id): Path<Uuid>,
    State(app): State<Arc<App>>,
) -> Response {
    let session_id = SessionId::from_uuid(id);
    ws.on_upgrade(move |socket| handle_socket(socket, session_id, app))
}

/// Handle an individual WebSocket connection.
async fn handle_socket(socket: WebSocket, session_id: SessionId, app: Arc<App>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let connection_id = Uuid::new_v4();

    // Subscribe before reading so nothing stored after the upgrade is missed
    let mut live = app.store.subscribe(session_id);
    let (tx, mut rx) = mpsc::channel::<ServerFrame>(CONNECTION_CHANNEL_BUFFER);

    tracing::info!(%session_id, connection_id = %connection_id, "WebSocket connection established");

    // Replies to this connection take precedence over session pushes so an
    // Ack always precedes the reply it triggered.
    let send_task = tokio::spawn(async move {
        loop {
            let frame = tokio::select! {
                biased;
                frame = rx.recv() => match frame {
                    Some(frame) => frame,
                    None => break,
                },
                pushed = live.recv() => match pushed {
                    Ok(LiveMessage { origin, .. }) if origin == Some(connection_id) => continue,
                    Ok(LiveMessage { message, .. }) => ServerFrame::Message {
                        message: message_dto(&message),
                    },
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(
                            connection_id = %connection_id,
                            skipped,
                            "Connection lagged behind the session feed"
                        );
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
            };
            if let Ok(json) = serde_json::to_string(&frame) {
                if ws_sender.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
        }
    });

    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientFrame>(text.as_str()) {
                Ok(frame) => {
                    if !handle_frame(frame, &app, session_id, connection_id, &tx).await {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(connection_id = %connection_id, error = %e, "Failed to parse frame");
                    let error = ServerFrame::Error {
                        code: "PARSE_ERROR".to_string(),
                        message: format!("Invalid frame format: {}", e),
                    };
                    let _ = tx.try_send(error);
                }
            },
            Ok(Message::Close(_)) => {
                tracing::info!(connection_id = %connection_id, "WebSocket closed by client");
                break;
            }
            Err(e) => {
                tracing::warn!(connection_id = %connection_id, error = %e, "WebSocket error");
                break;
            }
            _ => {}
        }
    }

    send_task.abort();
    tracing::info!(%session_id, connection_id = %connection_id, "WebSocket connection terminated");
}

/// Dispatch one client frame. Returns `false` once the connection is gone.
async fn handle_frame(
    frame: ClientFrame,
    app: &Arc<App>,
    session_id: SessionId,
    connection_id: Uuid,
    tx: &mpsc::Sender<ServerFrame>,
) -> bool {
    match frame {
        ClientFrame::Ping => tx.send(ServerFrame::Pong).await.is_ok(),
        ClientFrame::SendMessage {
            client_message_id,
            content,
        } => {
            let accepted = app.submit.accept(
                session_id,
                MessageId::from_uuid(client_message_id),
                &content,
                Some(connection_id),
            );
            let stored = match accepted {
                Ok(stored) => stored,
                Err(e) => {
                    return tx
                        .send(ServerFrame::Error {
                            code: "INVALID_MESSAGE".to_string(),
                            message: e.to_string(),
                        })
                        .await
                        .is_ok();
                }
            };

            let ack = ServerFrame::Ack {
                client_message_id,
                server_message_id: stored.message.id.to_uuid(),
                created_at: stored.message.created_at,
            };
            if tx.send(ack).await.is_err() {
                return false;
            }

            // The reply reaches every connection through the session feed
            let app = app.clone();
            tokio::spawn(async move {
                app.submit.reply(&stored).await;
            });
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::time::Duration;

    use consultchat_shared::MessageRoleData;
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::client::IntoClientRequest;
    use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
    use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
    use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

    type Client = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

    const WAIT: Duration = Duration::from_secs(5);

    async fn spawn_server(app: Arc<App>) -> (SocketAddr, tokio::task::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = crate::api::router(app);

        let handle = tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        (addr, handle)
    }

    async fn ws_connect(addr: SocketAddr, session: Uuid) -> Client {
        let url = format!("ws://{}/ws/chat/{}", addr, session);
        let (ws, _resp) = connect_async(url).await.unwrap();
        ws
    }

    async fn ws_send(ws: &mut Client, frame: &ClientFrame) {
        let json = serde_json::to_string(frame).unwrap();
        ws.send(WsMessage::Text(json)).await.unwrap();
    }

    async fn ws_recv(ws: &mut Client) -> ServerFrame {
        loop {
            match ws.next().await.unwrap().unwrap() {
                WsMessage::Text(text) => return serde_json::from_str(&text).unwrap(),
                WsMessage::Close(_) => panic!("socket closed"),
                _ => {}
            }
        }
    }

    async fn ws_expect_frame<F>(ws: &mut Client, mut predicate: F) -> ServerFrame
    where
        F: FnMut(&ServerFrame) -> bool,
    {
        tokio::time::timeout(WAIT, async {
            loop {
                let frame = ws_recv(ws).await;
                if predicate(&frame) {
                    return frame;
                }
            }
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn ping_is_answered_with_pong() {
        let (addr, server) = spawn_server(Arc::new(App::in_memory(None))).await;
        let mut ws = ws_connect(addr, Uuid::new_v4()).await;

        ws_send(&mut ws, &ClientFrame::Ping).await;
        let frame = ws_expect_frame(&mut ws, |_| true).await;
        assert_eq!(frame, ServerFrame::Pong);

        server.abort();
    }

    #[tokio::test]
    async fn send_is_acked_then_reply_is_pushed() {
        let (addr, server) = spawn_server(Arc::new(App::in_memory(None))).await;
        let session = Uuid::new_v4();
        let mut ws = ws_connect(addr, session).await;
        let client_message_id = Uuid::new_v4();

        ws_send(
            &mut ws,
            &ClientFrame::SendMessage {
                client_message_id,
                content: "Hello".to_string(),
            },
        )
        .await;

        let first = ws_expect_frame(&mut ws, |_| true).await;
        let ServerFrame::Ack {
            client_message_id: acked,
            ..
        } = first
        else {
            panic!("expected Ack first, got {:?}", first);
        };
        assert_eq!(acked, client_message_id);

        let second = ws_expect_frame(&mut ws, |_| true).await;
        let ServerFrame::Message { message } = second else {
            panic!("expected reply, got {:?}", second);
        };
        assert_eq!(message.role, MessageRoleData::Assistant);
        assert_eq!(message.content, "Hi, how can I help?");

        server.abort();
    }

    #[tokio::test]
    async fn resend_is_acked_with_the_same_server_id() {
        let app = Arc::new(App::in_memory(None));
        let (addr, server) = spawn_server(app.clone()).await;
        let session = Uuid::new_v4();
        let mut ws = ws_connect(addr, session).await;
        let frame = ClientFrame::SendMessage {
            client_message_id: Uuid::new_v4(),
            content: "Hello".to_string(),
        };

        ws_send(&mut ws, &frame).await;
        let first = ws_expect_frame(&mut ws, |f| matches!(f, ServerFrame::Ack { .. })).await;
        ws_send(&mut ws, &frame).await;
        let second = ws_expect_frame(&mut ws, |f| matches!(f, ServerFrame::Ack { .. })).await;

        let server_id = |f: &ServerFrame| match f {
            ServerFrame::Ack {
                server_message_id, ..
            } => *server_message_id,
            _ => Uuid::nil(),
        };
        assert_eq!(server_id(&first), server_id(&second));

        // One user message and one reply
        let stored_count = || {
            app.store
                .messages_after(
                    SessionId::from_uuid(session),
                    &consultchat_domain::PollingCursor::empty(),
                )
                .len()
        };
        tokio::time::timeout(WAIT, async {
            while stored_count() < 2 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(stored_count(), 2);

        server.abort();
    }

    #[tokio::test]
    async fn other_connections_see_the_user_message_too() {
        let (addr, server) = spawn_server(Arc::new(App::in_memory(None))).await;
        let session = Uuid::new_v4();
        let mut sender = ws_connect(addr, session).await;
        let mut watcher = ws_connect(addr, session).await;

        // Make sure the watcher's subscription is live before sending
        ws_send(&mut watcher, &ClientFrame::Ping).await;
        ws_expect_frame(&mut watcher, |f| *f == ServerFrame::Pong).await;

        ws_send(
            &mut sender,
            &ClientFrame::SendMessage {
                client_message_id: Uuid::new_v4(),
                content: "Hello".to_string(),
            },
        )
        .await;

        let pushed = ws_expect_frame(&mut watcher, |_| true).await;
        let ServerFrame::Message { message } = pushed else {
            panic!("expected user message, got {:?}", pushed);
        };
        assert_eq!(message.role, MessageRoleData::User);
        assert_eq!(message.content, "Hello");

        server.abort();
    }

    #[tokio::test]
    async fn garbage_is_answered_with_parse_error() {
        let (addr, server) = spawn_server(Arc::new(App::in_memory(None))).await;
        let mut ws = ws_connect(addr, Uuid::new_v4()).await;

        ws.send(WsMessage::Text("{not json".to_string())).await.unwrap();
        let frame = ws_expect_frame(&mut ws, |_| true).await;
        assert!(matches!(frame, ServerFrame::Error { ref code, .. } if code == "PARSE_ERROR"));

        server.abort();
    }

    #[tokio::test]
    async fn upgrade_without_token_is_rejected() {
        let (addr, server) = spawn_server(Arc::new(App::in_memory(Some("secret".into())))).await;
        let url = format!("ws://{}/ws/chat/{}", addr, Uuid::new_v4());

        match connect_async(url.as_str()).await {
            Err(WsError::Http(response)) => assert_eq!(response.status().as_u16(), 401),
            other => panic!("expected 401 handshake, got {:?}", other.map(|_| ())),
        }

        let mut request = url.into_client_request().unwrap();
        request
            .headers_mut()
            .insert(AUTHORIZATION, "Bearer secret".parse().unwrap());
        assert!(connect_async(request).await.is_ok());

        server.abort();
    }
}
