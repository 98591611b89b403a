//! HTTP routes
//!
//! JSON endpoints for session control plus one server-sent event feed per
//! session. Handlers are thin: every operation goes straight to the
//! [`SessionManager`].

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use parley_core::{Error, PermissionResponse, ServerConfig, SessionManager};

/// Interval between SSE keep-alive comments
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionManager<()>>,
}

impl AppState {
    pub fn new(sessions: Arc<SessionManager<()>>) -> Self {
        Self { sessions }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Core(#[from] Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Core(e) => match e {
                Error::SessionNotFound(_) | Error::RequestNotFound(_) => StatusCode::NOT_FOUND,
                Error::EmptyMessage => StatusCode::BAD_REQUEST,
                Error::StreamAlreadyOpen(_) => StatusCode::CONFLICT,
                Error::SessionClosed(_) => StatusCode::GONE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        };
        let body = Json(json!({ "error": self.to_string() }));
        (code, body).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Deserialize)]
struct MessageBody {
    #[serde(default)]
    text: Option<String>,
}

/// Build the router, nested under `config.base_path`
pub fn router(state: AppState, config: &ServerConfig) -> Router {
    let api = Router::new()
        .route("/health", get(health))
        .route("/sessions", post(create_session))
        .route("/sessions/{id}", delete(delete_session))
        .route("/sessions/{id}/messages", post(post_message))
        .route("/sessions/{id}/events", get(session_events))
        .route("/sessions/{id}/permissions", post(post_permission))
        .with_state(state);

    let base = config.base_path.trim_end_matches('/');
    let app = if base.is_empty() {
        api
    } else {
        Router::new().nest(base, api)
    };

    let app = app.layer(TraceLayer::new_for_http());
    if config.cors {
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "sessions": state.sessions.len(),
    }))
}

async fn create_session(State(state): State<AppState>) -> Json<Value> {
    let session = state.sessions.create();
    Json(json!({ "sessionId": session.id() }))
}

async fn post_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    // Unknown sessions win over malformed bodies
    if state.sessions.get(&id).is_none() {
        return Err(Error::SessionNotFound(id).into());
    }

    let text = serde_json::from_slice::<MessageBody>(&body)
        .ok()
        .and_then(|body| body.text)
        .unwrap_or_default();
    state.sessions.push_message(&id, &text)?;

    Ok(Json(json!({ "ok": true })))
}

async fn post_permission(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    if state.sessions.get(&id).is_none() {
        return Err(Error::SessionNotFound(id).into());
    }

    let response: PermissionResponse = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid permission response: {}", e)))?;
    state.sessions.respond(&id, response)?;

    Ok(Json(json!({ "ok": true })))
}

async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    if !state.sessions.delete(&id) {
        return Err(Error::SessionNotFound(id).into());
    }
    Ok(Json(json!({ "ok": true })))
}

async fn session_events(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let feed = state.sessions.open_stream(&id)?;
    debug!(session_id = %id, "SSE client attached");

    let events = feed.filter_map(move |event| {
        let frame = match event.to_frame() {
            Ok(frame) => Some(Ok::<_, Infallible>(
                Event::default().event(frame.event).data(frame.data),
            )),
            Err(e) => {
                warn!(event = event.name(), error = %e, "Dropping unserializable event");
                None
            }
        };
        futures::future::ready(frame)
    });

    let keep_alive = KeepAlive::new().interval(KEEP_ALIVE_INTERVAL);
    Ok(Sse::new(events).keep_alive(keep_alive).into_response())
}
