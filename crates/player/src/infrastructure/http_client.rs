//! HTTP adapter for the request/response chat API (reqwest)

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;

use consultchat_domain::{MessageId, PollingCursor, SessionId};
use consultchat_shared::{
    ErrorResponse, FetchMessagesResponse, SendMessageRequest, SendMessageResponse,
};

use crate::infrastructure::message_translator;
use crate::ports::outbound::{ChatApiPort, FetchPage, SendAck, TransportError};

/// Default base URL of a locally running backend.
pub const DEFAULT_HTTP_BASE_URL: &str = "http://localhost:3000";

/// Upper bound for any single request; the session applies tighter deadlines.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct HttpChatApi {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpChatApi {
    pub fn new(base_url: &str, token: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty()),
        }
    }

    /// Uses `CHAT_HTTP_URL` and `CHAT_API_TOKEN`, falling back to the local default.
    pub fn from_env() -> Self {
        let base_url =
            std::env::var("CHAT_HTTP_URL").unwrap_or_else(|_| DEFAULT_HTTP_BASE_URL.to_string());
        Self::new(&base_url, std::env::var("CHAT_API_TOKEN").ok())
    }

    fn messages_url(&self, session_id: SessionId) -> String {
        format!("{}/api/chat/sessions/{}/messages", self.base_url, session_id)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, TransportError> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let response = check_status(response).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| TransportError::Protocol(e.to_string()))
    }
}

#[async_trait]
impl ChatApiPort for HttpChatApi {
    async fn send_message(
        &self,
        session_id: SessionId,
        content: String,
        client_message_id: MessageId,
    ) -> Result<SendAck, TransportError> {
        let body = SendMessageRequest {
            content,
            client_message_id: client_message_id.to_uuid(),
        };
        let response: SendMessageResponse = self
            .execute(self.client.post(self.messages_url(session_id)).json(&body))
            .await?;
        Ok(message_translator::translate_send_response(response))
    }

    async fn fetch_messages_since(
        &self,
        session_id: SessionId,
        cursor: PollingCursor,
    ) -> Result<FetchPage, TransportError> {
        let query = message_translator::cursor_query(&cursor);
        let response: FetchMessagesResponse = self
            .execute(self.client.get(self.messages_url(session_id)).query(&query))
            .await?;
        Ok(message_translator::translate_page(response))
    }
}

fn map_reqwest_error(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout
    } else if error.is_decode() {
        TransportError::Protocol(error.to_string())
    } else {
        TransportError::Network(error.to_string())
    }
}

async fn check_status(response: Response) -> Result<Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorResponse>(&body)
        .map(|e| e.message)
        .unwrap_or(body);

    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => TransportError::Unauthorized(message),
        _ => TransportError::Server {
            status: status.as_u16(),
            message,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_is_normalized() {
        let api = HttpChatApi::new("http://localhost:3000/", None);
        let session_id = SessionId::new();
        assert_eq!(
            api.messages_url(session_id),
            format!("http://localhost:3000/api/chat/sessions/{}/messages", session_id)
        );
    }

    #[test]
    fn empty_token_means_no_auth() {
        let api = HttpChatApi::new("http://localhost:3000", Some(String::new()));
        assert!(api.token.is_none());
    }
}
