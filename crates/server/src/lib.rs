//! Phone Agent Server
//!
//! Twilio voice webhooks, the media-stream WebSocket and operational HTTP
//! endpoints for the phone agent.

pub mod http;
pub mod metrics;
pub mod session;
pub mod state;
pub mod twilio;
pub mod twiml;
pub mod websocket;

pub use http::create_router;
pub use metrics::{init_metrics, spawn_event_recorder};
pub use session::{ActiveCall, CallGuard, CallRegistry};
pub use state::AppState;
pub use twilio::TwilioClient;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Session error: {0}")]
    Session(String),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Not configured: {0}")]
    NotConfigured(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ServerError> for StatusCode {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::Session(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::WebSocket(_) => StatusCode::BAD_REQUEST,
            ServerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::NotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        match &self {
            ServerError::Internal(_) | ServerError::Upstream(_) => {
                tracing::error!(error = %message, "Request failed")
            },
            _ => tracing::debug!(error = %message, "Request rejected"),
        }
        let status = StatusCode::from(self);
        (status, Json(serde_json::json!({ "success": false, "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            StatusCode::from(ServerError::Session("full".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            StatusCode::from(ServerError::NotConfigured("twilio".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(StatusCode::from(ServerError::Upstream("x".into())), StatusCode::BAD_GATEWAY);
        assert_eq!(StatusCode::from(ServerError::InvalidRequest("x".into())), StatusCode::BAD_REQUEST);
    }
}
