//! HTTP Endpoints
//!
//! Twilio voice webhooks, outbound calling and operational endpoints.

use std::time::Duration;

use axum::{
    extract::{Form, Query, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use phone_agent_config::Settings;

use crate::metrics::{metrics_handler, record_outbound_call, record_request};
use crate::state::AppState;
use crate::twiml::StreamTwiml;
use crate::websocket::media_stream_handler;
use crate::ServerError;

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let cors_layer = build_cors_layer(&state.config.server.cors_origins, state.config.server.cors_enabled);
    let timeout = Duration::from_secs(state.config.server.timeout_seconds.max(1));

    // The media stream lives for the whole call, so only webhooks get a timeout
    let webhooks = Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_handler))
        .route("/voice/incoming", get(incoming_call).post(incoming_call))
        .route("/voice/outbound", post(outbound_call))
        .route("/call/start", post(start_outbound_call))
        .layer(TimeoutLayer::new(timeout));

    Router::new()
        .route("/media-stream", get(media_stream_handler))
        .merge(webhooks)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(state)
}

/// Build CORS layer from configured origins
///
/// - If cors_enabled is false, returns permissive layer (for dev)
/// - If cors_origins is empty, defaults to localhost:3000
/// - Otherwise, uses the configured origins
fn build_cors_layer(origins: &[String], enabled: bool) -> CorsLayer {
    if !enabled {
        tracing::warn!("CORS is disabled - allowing all origins (NOT FOR PRODUCTION)");
        return CorsLayer::permissive();
    }

    let parsed_origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            origin.parse::<HeaderValue>().ok().or_else(|| {
                tracing::warn!("Invalid CORS origin: {}", origin);
                None
            })
        })
        .collect();

    if parsed_origins.is_empty() {
        if !origins.is_empty() {
            tracing::error!("All configured CORS origins are invalid, falling back to localhost");
        }
        return CorsLayer::new()
            .allow_origin(HeaderValue::from_static("http://localhost:3000"))
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers(Any);
    }

    tracing::info!("CORS configured with {} origins", parsed_origins.len());
    CorsLayer::new()
        .allow_origin(parsed_origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}

/// Service status
async fn root(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "running",
        "service": "phone-agent",
        "version": env!("CARGO_PKG_VERSION"),
        "active_calls": state.active_calls(),
    }))
}

/// Health check
async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Readiness check
///
/// Ready once the speech services have credentials and there is room for
/// another call. Twilio is reported but optional; it only gates `/call/start`.
async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let sarvam_ready = !state.config.sarvam.api_key.is_empty();
    let capacity_ready = state.calls.count() < state.calls.max_calls();
    let ready = sarvam_ready && capacity_ready;

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(serde_json::json!({
            "ready": ready,
            "checks": {
                "sarvam": sarvam_ready,
                "capacity": capacity_ready,
                "twilio": state.twilio.is_some(),
            },
            "active_calls": state.calls.count(),
        })),
    )
}

/// Fields Twilio posts to voice webhooks
#[derive(Debug, Default, Deserialize)]
struct CallWebhook {
    #[serde(rename = "CallSid")]
    call_sid: Option<String>,
    #[serde(rename = "From")]
    from: Option<String>,
    #[serde(rename = "To")]
    to: Option<String>,
}

/// Incoming call webhook (GET reads the query string, POST the form body)
async fn incoming_call(
    State(state): State<AppState>,
    headers: HeaderMap,
    webhook: Option<Form<CallWebhook>>,
) -> Response {
    record_request("incoming");
    let webhook = webhook.map(|Form(w)| w).unwrap_or_default();
    tracing::info!(
        call_sid = webhook.call_sid.as_deref().unwrap_or("unknown"),
        from = webhook.from.as_deref().unwrap_or("unknown"),
        "Incoming call"
    );

    stream_response(&state.config, &headers, &state.config.twilio.incoming_greeting)
}

/// Webhook Twilio fetches when an outbound call is answered
async fn outbound_call(
    State(state): State<AppState>,
    headers: HeaderMap,
    webhook: Option<Form<CallWebhook>>,
) -> Response {
    record_request("outbound");
    let webhook = webhook.map(|Form(w)| w).unwrap_or_default();
    tracing::info!(
        call_sid = webhook.call_sid.as_deref().unwrap_or("unknown"),
        to = webhook.to.as_deref().unwrap_or("unknown"),
        "Outbound call answered"
    );

    stream_response(&state.config, &headers, &state.config.twilio.outbound_greeting)
}

fn stream_response(config: &Settings, headers: &HeaderMap, greeting: &str) -> Response {
    let host = stream_host(config, headers);
    let xml = StreamTwiml {
        greeting,
        voice: &config.twilio.say_voice,
        host: &host,
        language: config.default_language(),
    }
    .render();

    ([(header::CONTENT_TYPE, "application/xml")], xml).into_response()
}

/// Host for the `wss://` stream URL
///
/// Configured `public_host` wins, then the request `Host` header, then the
/// host part of the public base URL.
fn stream_host(config: &Settings, headers: &HeaderMap) -> String {
    if let Some(host) = config.server.public_host.as_deref().filter(|h| !h.trim().is_empty()) {
        return strip_scheme(host).to_string();
    }

    if let Some(host) = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .filter(|h| !h.is_empty())
    {
        return host.to_string();
    }

    strip_scheme(&config.twilio.public_base_url).to_string()
}

fn strip_scheme(url: &str) -> &str {
    let url = url.trim();
    let host = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .or_else(|| url.strip_prefix("wss://"))
        .unwrap_or(url);
    host.trim_end_matches('/')
}

#[derive(Debug, Deserialize)]
struct CallStartQuery {
    to: String,
}

/// Place an outbound call
async fn start_outbound_call(
    State(state): State<AppState>,
    Query(query): Query<CallStartQuery>,
) -> Result<Json<serde_json::Value>, ServerError> {
    record_request("call_start");
    let client = state
        .twilio
        .as_ref()
        .ok_or_else(|| ServerError::NotConfigured("Twilio credentials are not set".to_string()))?;

    // An unencoded `+` in the query string arrives as a space
    let to = match query.to.strip_prefix(' ') {
        Some(rest) => format!("+{}", rest.trim()),
        None => query.to.trim().to_string(),
    };
    tracing::info!(to = %to, "Starting outbound call");

    match client.place_call(&to).await {
        Ok(call_sid) => {
            record_outbound_call(true);
            Ok(Json(serde_json::json!({
                "success": true,
                "call_sid": call_sid,
            })))
        },
        Err(e) => {
            record_outbound_call(false);
            Err(e)
        },
    }
}
