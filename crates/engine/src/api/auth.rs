//! Bearer token authentication for chat routes.
//!
//! ```rust,ignore
//! let chat = chat_routes()
//!     .route_layer(middleware::from_fn_with_state(app.clone(), require_bearer));
//! ```
//!
//! Applies to the WebSocket upgrade as well, so a rejected token surfaces as a
//! 401 handshake response.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};

use crate::api::http::ApiError;
use crate::app::App;

/// Rejects requests without `Authorization: Bearer <token>` matching the
/// configured token. Passes everything through when no token is configured.
pub async fn require_bearer(
    State(app): State<Arc<App>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(expected) = app.api_token.as_deref() else {
        return Ok(next.run(request).await);
    };

    let provided = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);

    if provided != Some(expected) {
        tracing::warn!(
            path = %request.uri().path(),
            has_credentials = provided.is_some(),
            "Rejected request with missing or invalid bearer token"
        );
        return Err(ApiError::Unauthorized);
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request as HttpRequest, StatusCode},
        Router,
    };
    use tower::ServiceExt;

    fn router(token: Option<&str>) -> Router {
        crate::api::router(Arc::new(App::in_memory(token.map(str::to_string))))
    }

    fn fetch(auth: Option<&str>) -> HttpRequest<Body> {
        let mut builder = HttpRequest::builder().uri(format!(
            "/api/chat/sessions/{}/messages",
            uuid::Uuid::new_v4()
        ));
        if let Some(auth) = auth {
            builder = builder.header(AUTHORIZATION, auth);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn matching_token_passes() {
        let response = router(Some("secret"))
            .oneshot(fetch(Some("Bearer secret")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_or_wrong_token_is_unauthorized() {
        for auth in [None, Some("Bearer nope"), Some("secret")] {
            let response = router(Some("secret")).oneshot(fetch(auth)).await.unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "auth: {:?}", auth);
        }
    }

    #[tokio::test]
    async fn no_configured_token_disables_the_check() {
        let response = router(None).oneshot(fetch(None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn health_never_requires_a_token() {
        let response = router(Some("secret"))
            .oneshot(
                HttpRequest::builder()
                    .uri("/api/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
