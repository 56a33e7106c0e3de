//! HTTP trigger endpoint.
//!
//! `POST /notify` with `{host_id, title, body, url?}` fans a notification
//! out to the host's browsers. Callers authenticate with a pre-shared
//! bearer secret; there is no other trust level.
//!
//! Responses carry only aggregate counts. Endpoints and key material never
//! leave the process.

use axum::{
    body::Bytes,
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tokio::net::TcpListener;

use crate::notifications::fanout::{FanoutError, FanoutSummary, Notifier};

/// Errors returned to the trigger caller as `{"error": ...}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Missing or wrong bearer secret.
    #[error("unauthorized")]
    Unauthorized,
    /// Body could not be parsed or lacks a host id.
    #[error("{0}")]
    BadRequest(String),
    /// VAPID keys are absent or invalid, so nothing can be sent.
    #[error("web push is not configured")]
    NotConfigured,
    /// Subscription store failure.
    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotConfigured => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<FanoutError> for ApiError {
    fn from(err: FanoutError) -> Self {
        match err {
            FanoutError::MissingOwner => Self::BadRequest(err.to_string()),
            FanoutError::Store(_) => {
                log::error!("[Server] {}", err);
                Self::Internal("failed to load push subscriptions".to_string())
            }
        }
    }
}

/// Body of `POST /notify`.
#[derive(Debug, Deserialize)]
pub struct NotifyRequest {
    /// Owner whose subscriptions receive the notification.
    #[serde(default)]
    pub host_id: String,
    /// Notification title.
    pub title: String,
    /// Notification body text.
    pub body: String,
    /// Click destination.
    #[serde(default)]
    pub url: Option<String>,
}

/// Shared state for request handlers.
#[derive(Debug)]
pub struct AppState {
    service_secret: String,
    notifier: Option<Notifier>,
}

impl AppState {
    /// Creates handler state.
    ///
    /// `notifier` is `None` when VAPID keys are not configured; requests
    /// then fail with 503 after authentication.
    pub fn new(service_secret: impl Into<String>, notifier: Option<Notifier>) -> Self {
        Self {
            service_secret: service_secret.into(),
            notifier,
        }
    }

    /// Constant-time check of the `Authorization: Bearer` header.
    ///
    /// An empty configured secret rejects every request.
    fn is_authorized(&self, headers: &HeaderMap) -> bool {
        if self.service_secret.is_empty() {
            return false;
        }
        let Some(token) = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
        else {
            return false;
        };
        token
            .as_bytes()
            .ct_eq(self.service_secret.as_bytes())
            .into()
    }
}

/// Build the router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/notify", post(notify_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

async fn health_handler() -> &'static str {
    "ok"
}

async fn notify_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<FanoutSummary>, ApiError> {
    if !state.is_authorized(&headers) {
        log::warn!("[Server] Rejected /notify with missing or invalid bearer token");
        return Err(ApiError::Unauthorized);
    }

    let request: NotifyRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("invalid request body: {e}")))?;

    let notifier = state.notifier.as_ref().ok_or(ApiError::NotConfigured)?;

    let summary = notifier
        .notify_owner(
            &request.host_id,
            &request.title,
            &request.body,
            request.url.as_deref(),
        )
        .await?;

    Ok(Json(summary))
}

/// Bind `addr` and serve until Ctrl-C or SIGTERM.
pub async fn serve(addr: &str, state: Arc<AppState>) -> anyhow::Result<()> {
    use anyhow::Context;

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    log::info!("[Server] Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    log::info!("[Server] Shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("[Server] Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
        log::info!("[Server] Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                log::info!("[Server] Received terminate signal, shutting down");
            }
            Err(e) => {
                log::error!("[Server] Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_bearer_check() {
        let state = AppState::new("s3cret", None);
        assert!(state.is_authorized(&headers("Bearer s3cret")));
        assert!(!state.is_authorized(&headers("Bearer s3cre")));
        assert!(!state.is_authorized(&headers("Bearer s3cret2")));
        assert!(!state.is_authorized(&headers("bearer s3cret")));
        assert!(!state.is_authorized(&headers("s3cret")));
        assert!(!state.is_authorized(&HeaderMap::new()));
    }

    #[test]
    fn test_empty_secret_rejects_everything() {
        let state = AppState::new("", None);
        assert!(!state.is_authorized(&headers("Bearer ")));
        assert!(!state.is_authorized(&HeaderMap::new()));
    }

    #[test]
    fn test_missing_owner_maps_to_bad_request() {
        let response = ApiError::from(FanoutError::MissingOwner).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_store_error_maps_to_internal() {
        let err = FanoutError::Store(anyhow::anyhow!("disk on fire"));
        let response = ApiError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
