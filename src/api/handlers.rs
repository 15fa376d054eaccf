//! HTTP request handlers

use super::assets::{get_index_html, serve_static};
use super::sse::sse_stream;
use super::types::{
    ChatRequest, ChatResponse, CreateSessionRequest, ErrorResponse, SessionResponse,
    StatusResponse, SuccessResponse,
};
use super::{AppState, CONNECTION_ADVICE};
use crate::dispatcher::{DispatchError, SseEvent};
use crate::state_machine::TransitionError;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(serve_index))
        .route("/assets/*path", get(serve_static))
        .route("/api/status", get(get_status))
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/:id", get(get_session))
        .route("/api/sessions/:id/chat", post(send_chat))
        .route("/api/sessions/:id/stream", get(stream_session))
        .route("/api/sessions/:id/end", post(end_session))
        .route("/version", get(get_version))
        .with_state(state)
}

async fn serve_index() -> impl IntoResponse {
    match get_index_html() {
        Some(content) => Html(content).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Html("<h1>404 - UI not found</h1>".to_string()),
        )
            .into_response(),
    }
}

// ============================================================
// Status
// ============================================================

async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let connected = state.connection.is_connected();
    Json(StatusResponse {
        connected,
        warning: state.connection.warning(),
        advice: (!connected).then_some(CONNECTION_ADVICE),
        sessions: state.sessions.session_count().await,
    })
}

/// No session may start or proceed without a working connection
fn require_connection(state: &AppState) -> Result<(), AppError> {
    match state.connection.warning() {
        None => Ok(()),
        Some(warning) => Err(AppError::Unavailable(warning)),
    }
}

// ============================================================
// Sessions
// ============================================================

async fn create_session(
    State(state): State<AppState>,
    body: Option<Json<CreateSessionRequest>>,
) -> Result<Json<SessionResponse>, AppError> {
    require_connection(&state)?;

    let request = body.map(|Json(req)| req).unwrap_or_default();
    let handle = state.sessions.create(request.function).await;
    let snapshot = handle.snapshot().await;

    Ok(Json(SessionResponse {
        id: handle.id,
        function: handle.function,
        turns: snapshot.turns,
        busy: snapshot.busy,
    }))
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionResponse>, AppError> {
    let handle = state.sessions.get(&id).await?;
    let snapshot = handle.snapshot().await;

    Ok(Json(SessionResponse {
        id: handle.id,
        function: handle.function,
        turns: snapshot.turns,
        busy: snapshot.busy,
    }))
}

async fn send_chat(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    require_connection(&state)?;

    let submitted = state.sessions.submit(&id, req.text).await?;
    Ok(Json(submitted.into()))
}

async fn stream_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let handle = state.sessions.get(&id).await?;
    let (snapshot, broadcast_rx) = handle.subscribe().await;

    let init_event = SseEvent::Init {
        snapshot,
        function: handle.function,
    };

    Ok(sse_stream(init_event, broadcast_rx))
}

async fn end_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, AppError> {
    state.sessions.end(&id).await?;
    Ok(Json(SuccessResponse { success: true }))
}

async fn get_version() -> &'static str {
    concat!("helpdocs-chat ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
enum AppError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Unavailable(String),
    Internal(String),
}

impl From<DispatchError> for AppError {
    fn from(error: DispatchError) -> Self {
        let message = error.to_string();
        match error {
            DispatchError::Rejected(TransitionError::EmptyInput) => AppError::BadRequest(message),
            DispatchError::Rejected(TransitionError::Busy) => AppError::Conflict(message),
            DispatchError::Rejected(TransitionError::InvalidTransition(_)) => {
                AppError::Internal(message)
            }
            DispatchError::NotFound(_) | DispatchError::SessionClosed => {
                AppError::NotFound(message)
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
