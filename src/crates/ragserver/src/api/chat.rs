//! Public, unauthenticated chat routes (spec.md §6): chatbot info by slug,
//! session creation, the server-push message stream, and cancellation.

use crate::api::error::{ApiError, ApiResult};
use crate::api::routes::AppState;
use crate::streaming::terminal_event;
use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use futures::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

#[derive(Debug, Serialize)]
pub struct ChatbotInfoResponse {
    pub name: String,
    pub greeting: Option<String>,
}

pub async fn get_chatbot_info(State(state): State<AppState>, Path(access_slug): Path<String>) -> ApiResult<Json<ChatbotInfoResponse>> {
    let tenant = state
        .meta
        .get_tenant_by_slug(&access_slug)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("no chatbot at {access_slug}")))?;
    Ok(Json(ChatbotInfoResponse { name: tenant.name, greeting: tenant.persona_greeting }))
}

#[derive(Debug, Deserialize, Default)]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub initial_message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub id: String,
    pub expires_at: String,
}

/// Creates a session and, if the request names an `initial_message`,
/// fires the Answer Streamer for it in the background so the turn is
/// already on record by the time the client opens the message stream.
pub async fn create_session(
    State(state): State<AppState>,
    Path(access_slug): Path<String>,
    Json(body): Json<CreateSessionRequest>,
) -> ApiResult<Json<SessionResponse>> {
    let tenant = state
        .meta
        .get_tenant_by_slug(&access_slug)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("no chatbot at {access_slug}")))?;
    let session = state.meta.create_session(&tenant.id, state.config.session_ttl_min).await?;

    if let Some(message) = body.initial_message.filter(|m| !m.trim().is_empty()) {
        let streamer = state.streamer.clone();
        let session_id = session.id.clone();
        tokio::spawn(async move {
            let (tx, mut rx) = mpsc::channel(32);
            let stream_task = streamer.stream(&tenant, &session_id, &message, tx);
            let drain_task = async { while rx.recv().await.is_some() {} };
            tokio::join!(stream_task, drain_task);
        });
    }

    Ok(Json(SessionResponse { id: session.id, expires_at: session.expires_at }))
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub message: String,
}

pub async fn stream_message(
    State(state): State<AppState>,
    Path((access_slug, session_id)): Path<(String, String)>,
    Json(body): Json<SendMessageRequest>,
) -> ApiResult<impl IntoResponse> {
    let tenant = state
        .meta
        .get_tenant_by_slug(&access_slug)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("no chatbot at {access_slug}")))?;

    let (tx, rx) = mpsc::channel(32);
    let streamer = state.streamer.clone();
    tokio::spawn(async move {
        streamer.stream(&tenant, &session_id, &body.message, tx).await;
    });

    let events = ReceiverStream::new(rx).map(|event| Ok::<Event, Infallible>(event.into_sse_event()));
    let terminated: DynEventStream = Box::pin(events.chain(stream::once(async { Ok::<Event, Infallible>(terminal_event()) })));

    Ok(Sse::new(terminated).keep_alive(KeepAlive::default()))
}

type DynEventStream = std::pin::Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>>;

pub async fn stop_session(
    State(state): State<AppState>,
    Path((_access_slug, session_id)): Path<(String, String)>,
) -> ApiResult<axum::http::StatusCode> {
    state.cancellation.publish(&session_id, true);
    Ok(axum::http::StatusCode::NO_CONTENT)
}
