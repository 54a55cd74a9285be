//! End-to-end: a real `ChatSessionClient` against the reference backend over
//! WebSocket and HTTP on an ephemeral port.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::net::TcpListener;

use consultchat_backend::App;
use consultchat_client::infrastructure::{HttpChatApi, WsChannelConnector};
use consultchat_client::{ChatConfig, ChatSessionClient, SessionError, SessionNotice};
use consultchat_domain::{ChatMessage, DeliveryStatus, MessageRole, SessionId, TransportMode};

const WAIT: Duration = Duration::from_secs(20);

async fn spawn_backend(token: Option<&str>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = Arc::new(App::in_memory(token.map(str::to_string)));
    tokio::spawn(consultchat_backend::serve(listener, app));
    addr
}

/// An address nothing listens on.
async fn dead_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

fn fast_config(mode: TransportMode) -> ChatConfig {
    ChatConfig {
        mode,
        active_poll_interval_ms: 100,
        base_poll_interval_ms: 200,
        idle_poll_interval_ms: 1_000,
        connect_timeout_ms: 2_000,
        ..ChatConfig::default()
    }
}

fn start_client(
    session_id: SessionId,
    config: ChatConfig,
    http: SocketAddr,
    ws: SocketAddr,
    token: Option<&str>,
) -> ChatSessionClient {
    ChatSessionClient::start(
        session_id,
        config,
        Arc::new(HttpChatApi::new(
            &format!("http://{}", http),
            token.map(str::to_string),
        )),
        Arc::new(WsChannelConnector::new(
            format!("ws://{}", ws),
            token.map(str::to_string),
        )),
    )
    .unwrap()
}

async fn wait_for_messages(
    client: &ChatSessionClient,
    predicate: impl Fn(&[ChatMessage]) -> bool,
) -> Vec<ChatMessage> {
    let mut snapshots = client.observe_messages();
    tokio::time::timeout(WAIT, async {
        while let Some(messages) = snapshots.next().await {
            if predicate(&messages) {
                return messages;
            }
        }
        panic!("message stream ended");
    })
    .await
    .expect("messages reached the expected state")
}

fn delivered_exchange(messages: &[ChatMessage]) -> bool {
    messages.iter().any(|m| {
        m.role == MessageRole::User
            && m.content == "Hello"
            && m.delivery_status == DeliveryStatus::Delivered
    }) && messages
        .iter()
        .any(|m| m.role == MessageRole::Assistant && m.content == "Hi, how can I help?")
}

#[tokio::test]
async fn persistent_session_round_trips_over_websocket() {
    let addr = spawn_backend(None).await;
    let client = start_client(
        SessionId::new(),
        fast_config(TransportMode::Persistent),
        addr,
        addr,
        None,
    );

    let sent = client.send_message("Hello").unwrap();
    let messages = wait_for_messages(&client, delivered_exchange).await;

    assert_eq!(messages.len(), 2);
    assert!(messages[0].answers_to(sent));
    assert_eq!(messages[1].role, MessageRole::Assistant);
    assert_eq!(client.connection_state().mode, TransportMode::Persistent);

    client.close();
    assert_eq!(client.closed().await, Ok(()));
}

#[tokio::test]
async fn polling_session_receives_inline_reply_once() {
    let addr = spawn_backend(None).await;
    let client = start_client(
        SessionId::new(),
        fast_config(TransportMode::Polling),
        addr,
        addr,
        None,
    );

    client.send_message("Hello").unwrap();
    wait_for_messages(&client, delivered_exchange).await;

    // Several polls later the reply is still there exactly once
    tokio::time::sleep(Duration::from_millis(600)).await;
    let messages = client.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(client.connection_state().mode, TransportMode::Polling);

    client.close();
}

#[tokio::test]
async fn polling_client_sees_messages_sent_by_a_persistent_client() {
    let addr = spawn_backend(None).await;
    let session_id = SessionId::new();
    let watcher = start_client(
        session_id,
        fast_config(TransportMode::Polling),
        addr,
        addr,
        None,
    );
    let writer = start_client(
        session_id,
        fast_config(TransportMode::Persistent),
        addr,
        addr,
        None,
    );

    writer.send_message("Hello").unwrap();
    let seen = wait_for_messages(&watcher, delivered_exchange).await;

    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].role, MessageRole::User);
    assert_eq!(seen[1].role, MessageRole::Assistant);

    watcher.close();
    writer.close();
}

#[tokio::test]
async fn unreachable_channel_falls_back_to_polling_and_still_delivers() {
    let addr = spawn_backend(None).await;
    let client = start_client(
        SessionId::new(),
        fast_config(TransportMode::Auto),
        addr,
        dead_addr().await,
        None,
    );
    let mut notices = client.observe_notices();

    client.send_message("Hello").unwrap();
    wait_for_messages(&client, delivered_exchange).await;

    let notice = tokio::time::timeout(WAIT, notices.next())
        .await
        .expect("notice in time")
        .expect("notice stream open");
    assert!(matches!(notice, SessionNotice::FellBack { .. }), "{:?}", notice);
    assert_eq!(client.connection_state().mode, TransportMode::Polling);
    assert_eq!(client.messages().len(), 2);

    client.close();
}

#[tokio::test]
async fn wrong_token_ends_the_session() {
    let addr = spawn_backend(Some("secret")).await;
    let client = start_client(
        SessionId::new(),
        fast_config(TransportMode::Persistent),
        addr,
        addr,
        Some("not-the-secret"),
    );

    let outcome = tokio::time::timeout(WAIT, client.closed())
        .await
        .expect("session ended in time");
    assert!(matches!(outcome, Err(SessionError::Unauthorized(_))), "{:?}", outcome);
    assert_eq!(client.send_message("Hello"), Err(SessionError::Closed));
}

#[tokio::test]
async fn matching_token_is_accepted_on_both_transports() {
    let addr = spawn_backend(Some("secret")).await;
    let persistent = start_client(
        SessionId::new(),
        fast_config(TransportMode::Persistent),
        addr,
        addr,
        Some("secret"),
    );
    let polling = start_client(
        SessionId::new(),
        fast_config(TransportMode::Polling),
        addr,
        addr,
        Some("secret"),
    );

    persistent.send_message("Hello").unwrap();
    polling.send_message("Hello").unwrap();
    wait_for_messages(&persistent, delivered_exchange).await;
    wait_for_messages(&polling, delivered_exchange).await;

    assert!(!persistent.is_closed());
    assert!(!polling.is_closed());

    persistent.close();
    polling.close();
}
