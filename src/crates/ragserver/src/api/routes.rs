//! Router assembly: wires the administrator and public chat handlers onto
//! one axum `Router`, sharing the [`AppState`] handles every handler needs.

use crate::api::middleware::{cors_layer, logging_layer};
use crate::api::{admin, auth, chat};
use crate::bus::CancellationBus;
use crate::config::ServerConfig;
use crate::ingestion::pipeline::{IngestionPipeline, ProgressBus};
use crate::streaming::AnswerStreamer;
use crate::version_manager::VersionManager;
use axum::routing::{delete, get, patch, post};
use axum::{middleware, Router};
use std::sync::Arc;
use storage::MetaStore;
use tokio::sync::Semaphore;

#[derive(Clone)]
pub struct AppState {
    pub meta: MetaStore,
    pub pipeline: Arc<IngestionPipeline>,
    pub versions: Arc<VersionManager>,
    pub streamer: Arc<AnswerStreamer>,
    pub progress: ProgressBus,
    pub cancellation: CancellationBus,
    pub config: Arc<ServerConfig>,
    /// Bounds how many documents ingest concurrently (spec.md §5 worker
    /// pool counting semaphore), independent of the LLM Gateway's own cap.
    pub ingestion_slots: Arc<Semaphore>,
}

pub fn create_router(state: AppState) -> Router {
    let admin_hash = Arc::new(state.config.admin_bootstrap_password_hash.clone());

    let admin_routes = Router::new()
        .route("/chatbots", post(admin::create_chatbot))
        .route("/chatbots/:id", get(admin::get_chatbot).patch(admin::update_chatbot).delete(admin::delete_chatbot))
        .route("/chatbots/:id/status", patch(admin::update_status))
        .route("/chatbots/:id/documents", post(admin::upload_document).get(admin::list_documents))
        .route("/chatbots/:id/documents/:doc_id", delete(admin::delete_document))
        .route("/chatbots/:id/documents/:doc_id/progress", get(admin::document_progress))
        .route("/chatbots/:id/versions", get(admin::list_versions))
        .route("/chatbots/:id/versions/:version/activate", post(admin::activate_version))
        .route("/chatbots/:id/stats", get(admin::stats))
        .layer(middleware::from_fn_with_state(admin_hash, auth::require_admin_token));

    let public_routes = Router::new()
        .route("/chat/:access_slug", get(chat::get_chatbot_info))
        .route("/chat/:access_slug/sessions", post(chat::create_session))
        .route("/chat/:access_slug/sessions/:session_id/messages", post(chat::stream_message))
        .route("/chat/:access_slug/sessions/:session_id/stop", post(chat::stop_session));

    Router::new()
        .nest("/api/v1", admin_routes.merge(public_routes))
        .layer(cors_layer())
        .layer(logging_layer())
        .with_state(state)
}
