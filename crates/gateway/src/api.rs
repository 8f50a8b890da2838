//! Chat HTTP API.
//!
//! Endpoints:
//!
//! - `GET  /`                    Ensure the session user, list models and chats
//! - `GET  /models`              Model registry
//! - `GET|POST /chat`            One chat turn, answered as SSE or JSON
//! - `POST /chat/new`            Create a conversation under a fresh id
//! - `GET  /chat/history/{id}`   A conversation with all its messages
//! - `POST /chat/update/{id}`    Set a conversation's title
//! - `POST /chat/rename/{id}`    Set a conversation's title, echoing it back
//! - `POST /chat/delete/{id}`    Delete a conversation

use axum::{
    Router,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::sse::{Event as SseEvent, Sse},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

use relaychat_agent::{TurnOutcome, TurnRequest};
use relaychat_core::error::StoreError;
use relaychat_core::message::{Conversation, ConversationId, UserId};
use relaychat_core::model::ModelRegistry;

use crate::SharedState;
use crate::session::{resolve_user, session_user};

const UNTITLED: &str = "Untitled Chat";

pub fn api_router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/models", get(models_handler))
        .route("/chat", get(chat_get_handler).post(chat_post_handler))
        .route("/chat/new", post(new_chat_handler))
        .route("/chat/history/{id}", get(history_handler))
        .route("/chat/update/{id}", post(update_title_handler))
        .route("/chat/rename/{id}", post(rename_handler))
        .route("/chat/delete/{id}", post(delete_handler))
        .with_state(state)
}

// ── Request / Response types ──────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct ChatParams {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub chat_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatReply {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub done: bool,
}

#[derive(Debug, Default, Deserialize)]
struct TitleRequest {
    #[serde(default)]
    title: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IndexResponse {
    pub models: ModelRegistry,
    pub chats: Vec<Conversation>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat: Option<Conversation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl ChatResponse {
    fn success() -> Self {
        Self {
            status: "success".into(),
            chat_id: None,
            chat: None,
            title: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: &str) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

fn require_session(headers: &HeaderMap) -> Result<UserId, ApiError> {
    session_user(headers).ok_or_else(|| api_error(StatusCode::UNAUTHORIZED, "No session found"))
}

fn store_error(err: StoreError) -> ApiError {
    match err {
        StoreError::NotFound(_) => api_error(StatusCode::NOT_FOUND, "Chat not found"),
        other => {
            warn!(error = %other, "Store operation failed");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, &other.to_string())
        }
    }
}

fn parse_title(body: &Bytes) -> String {
    let request: TitleRequest = if body.is_empty() {
        TitleRequest::default()
    } else {
        serde_json::from_slice(body).unwrap_or_default()
    };
    request.title.unwrap_or_else(|| UNTITLED.to_string())
}

// ── Handlers ──────────────────────────────────────────────────────────────

async fn index_handler(State(state): State<SharedState>, headers: HeaderMap) -> Response {
    let (user, cookie) = resolve_user(&headers);
    let store = state.turns.store();
    store
        .ensure_user(&user, &ConversationId::from(state.config.chat.default_chat_id.as_str()))
        .await;

    let body = IndexResponse {
        models: state.turns.models().clone(),
        chats: store.list(&user).await,
    };
    (cookie, Json(body)).into_response()
}

async fn models_handler(State(state): State<SharedState>) -> Json<ModelRegistry> {
    Json(state.turns.models().clone())
}

async fn chat_get_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(params): Query<ChatParams>,
) -> Response {
    run_chat(state, headers, params).await
}

async fn chat_post_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let params = match serde_json::from_slice::<ChatParams>(&body) {
        Ok(params) => params,
        Err(e) if body.is_empty() => {
            tracing::debug!(error = %e, "Empty chat body, using defaults");
            ChatParams::default()
        }
        Err(e) => {
            return api_error(StatusCode::BAD_REQUEST, &format!("Invalid request body: {e}"))
                .into_response();
        }
    };
    run_chat(state, headers, params).await
}

async fn run_chat(state: SharedState, headers: HeaderMap, params: ChatParams) -> Response {
    let (user, cookie) = resolve_user(&headers);
    let turn = TurnRequest {
        user,
        conversation: ConversationId::from(
            params
                .chat_id
                .unwrap_or_else(|| state.config.chat.default_chat_id.clone()),
        ),
        model: params
            .model
            .unwrap_or_else(|| state.config.chat.default_model.clone()),
        text: params.message,
    };

    info!(conversation = %turn.conversation, model = %turn.model, "Chat request");

    match state.turns.handle(turn).await {
        Ok(TurnOutcome::Streaming(rx)) => {
            let stream = ReceiverStream::new(rx).map(|event| {
                let data = serde_json::to_string(&event.to_payload()).unwrap_or_default();
                Ok::<_, Infallible>(SseEvent::default().data(data))
            });
            (cookie, Sse::new(stream)).into_response()
        }
        Ok(TurnOutcome::Complete(text)) => (
            cookie,
            Json(ChatReply {
                response: Some(text),
                error: None,
                done: true,
            }),
        )
            .into_response(),
        Err(e) => (
            cookie,
            Json(ChatReply {
                response: None,
                error: Some(e.to_string()),
                done: true,
            }),
        )
            .into_response(),
    }
}

async fn new_chat_handler(State(state): State<SharedState>, headers: HeaderMap) -> Response {
    let (user, cookie) = resolve_user(&headers);
    let chat = state.turns.store().new_conversation(&user).await;
    info!(conversation = %chat.id, "New conversation");

    let body = ChatResponse {
        chat_id: Some(chat.id.to_string()),
        chat: Some(chat),
        ..ChatResponse::success()
    };
    (cookie, Json(body)).into_response()
}

async fn history_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<ChatResponse>, ApiError> {
    let user = require_session(&headers)?;
    let chat = state
        .turns
        .store()
        .get(&user, &ConversationId::from(id))
        .await
        .map_err(store_error)?;

    Ok(Json(ChatResponse {
        chat: Some(chat),
        ..ChatResponse::success()
    }))
}

async fn update_title_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<ChatResponse>, ApiError> {
    let user = require_session(&headers)?;
    let title = parse_title(&body);
    state
        .turns
        .store()
        .rename(&user, &ConversationId::from(id.as_str()), title)
        .await
        .map_err(store_error)?;

    Ok(Json(ChatResponse {
        chat_id: Some(id),
        ..ChatResponse::success()
    }))
}

async fn rename_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<ChatResponse>, ApiError> {
    let user = require_session(&headers)?;
    let title = parse_title(&body);
    state
        .turns
        .store()
        .rename(&user, &ConversationId::from(id.as_str()), title.clone())
        .await
        .map_err(store_error)?;

    Ok(Json(ChatResponse {
        chat_id: Some(id),
        title: Some(title),
        ..ChatResponse::success()
    }))
}

async fn delete_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<ChatResponse>, ApiError> {
    let user = require_session(&headers)?;
    state
        .turns
        .store()
        .delete(&user, &ConversationId::from(id))
        .await
        .map_err(store_error)?;

    Ok(Json(ChatResponse::success()))
}

// ── Tests ─────────────────────────────────────────────────────────────────
