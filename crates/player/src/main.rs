//! Consultchat Client - terminal chat against a running backend.
//!
//! Lines typed on stdin are sent as messages. Commands:
//! `/retry <id>` retries a failed message, `/persistent` and `/poll` switch
//! transports, `/quit` ends the session.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Context;
use futures_util::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use consultchat_client::infrastructure::{HttpChatApi, WsChannelConnector};
use consultchat_client::{ChatConfig, ChatSessionClient, SessionError, SessionNotice};
use consultchat_domain::{DeliveryStatus, MessageId, MessageRole, SessionId, TransportMode};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv_from_repo_root();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "consultchat_client=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = ChatConfig::from_env().context("Invalid CHAT_* configuration")?;
    let session_id = match std::env::var("CHAT_SESSION_ID") {
        Ok(raw) => SessionId::from_uuid(Uuid::from_str(&raw).context("CHAT_SESSION_ID is not a UUID")?),
        Err(_) => SessionId::new(),
    };
    tracing::info!(%session_id, mode = %config.mode, "Starting Consultchat session");

    let client = ChatSessionClient::start(
        session_id,
        config,
        Arc::new(HttpChatApi::from_env()),
        Arc::new(WsChannelConnector::from_env()),
    )?;

    tokio::spawn(print_messages(client.clone()));
    tokio::spawn(print_notices(client.clone()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            outcome = client.closed() => {
                return finish(outcome);
            }
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    break;
                };
                if !handle_line(&client, line.trim()) {
                    break;
                }
            }
        }
    }

    client.close();
    finish(client.closed().await)
}

/// Returns `false` when the user asked to quit.
fn handle_line(client: &ChatSessionClient, line: &str) -> bool {
    let result = match line.split_once(' ').unwrap_or((line, "")) {
        ("", _) => Ok(()),
        ("/quit", _) => return false,
        ("/poll", _) => client.request_mode(TransportMode::Polling),
        ("/persistent", _) => client.retry_persistent(),
        ("/retry", id) => match Uuid::from_str(id.trim()) {
            Ok(uuid) => client.retry_message(MessageId::from_uuid(uuid)),
            Err(_) => {
                eprintln!("usage: /retry <message id>");
                Ok(())
            }
        },
        _ => client.send_message(line).map(|_| ()),
    };

    match result {
        Ok(()) => true,
        Err(SessionError::InvalidMessage(e)) => {
            eprintln!("{}", e);
            true
        }
        Err(e) => {
            eprintln!("{}", e);
            false
        }
    }
}

async fn print_messages(client: ChatSessionClient) {
    let mut shown: HashMap<MessageId, DeliveryStatus> = HashMap::new();
    let mut snapshots = client.observe_messages();
    while let Some(messages) = snapshots.next().await {
        for message in messages {
            let key = message.client_id.unwrap_or(message.id);
            if shown.get(&key) == Some(&message.delivery_status) {
                continue;
            }
            shown.insert(key, message.delivery_status);
            match message.role {
                MessageRole::User => println!(
                    "[you] {} ({}, {})",
                    message.content, message.delivery_status, key
                ),
                MessageRole::Assistant => println!("[consultant] {}", message.content),
                MessageRole::System => println!("[system] {}", message.content),
            }
        }
    }
}

async fn print_notices(client: ChatSessionClient) {
    let mut notices = client.observe_notices();
    while let Some(notice) = notices.next().await {
        match notice {
            SessionNotice::FellBack { reason, .. } => {
                println!("-- live connection lost ({:?}), polling for messages", reason)
            }
            SessionNotice::PersistentRestored { .. } => println!("-- live connection restored"),
            SessionNotice::PollingDegraded => println!("-- having trouble reaching the server"),
            SessionNotice::PollingRecovered => println!("-- back online"),
            SessionNotice::MessageFailed { id } => {
                println!("-- message {} failed; /retry {} to try again", id, id)
            }
            SessionNotice::AuthRejected { message } => println!("-- signed out: {}", message),
        }
    }
}

fn finish(outcome: Result<(), SessionError>) -> anyhow::Result<()> {
    match outcome {
        Ok(()) => Ok(()),
        Err(e) => Err(anyhow::Error::new(e).context("Session ended")),
    }
}

fn load_dotenv_from_repo_root() {
    let repo_root = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..");

    // Prefer local overrides.
    for filename in [".env.local", ".env"] {
        let path = repo_root.join(filename);
        if path.exists() {
            let _ = dotenvy::from_path(path);
        }
    }
}
