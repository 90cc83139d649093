//! ragserver binary: wires storage, the LLM Gateway, the ingestion
//! pipeline, the Hybrid Retriever, and the Answer Streamer behind the
//! axum HTTP API (spec.md §6).

use llm_gateway::{Gateway, LocalLlmConfig, OllamaClient, OpenAiClient, RemoteLlmConfig};
use ragserver::api::routes::{create_router, AppState};
use ragserver::config::ServerConfig;
use ragserver::ingestion::pipeline::{new_progress_bus, IngestionPipeline};
use ragserver::ingestion::HeuristicPdfParser;
use ragserver::retrieval::HybridRetriever;
use ragserver::streaming::AnswerStreamer;
use ragserver::version_manager::VersionManager;
use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use storage::{DatabaseConnection, GraphStore, MetaStore, VectorStore};
use tokio::sync::Semaphore;

#[tokio::main]
async fn main() -> ExitCode {
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt().with_env_filter(rust_log).init();

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!("configuration invalid: {err}");
            return ExitCode::from(1);
        }
    };

    tracing::info!(host = %config.host, port = config.port, "starting ragserver");

    let conn = match DatabaseConnection::new(&config.database_url()).await {
        Ok(conn) => conn,
        Err(err) => {
            tracing::error!("database connection failed: {err}");
            return ExitCode::from(2);
        }
    };
    if let Err(err) = conn.run_migrations().await {
        tracing::error!("migration failed: {err}");
        return ExitCode::from(2);
    }

    let meta = MetaStore::from_connection(conn.clone());
    let graph = GraphStore::new(conn.clone());
    let vectors = match VectorStore::new(&config.qdrant_url, config.embedding_dim) {
        Ok(store) => Arc::new(store),
        Err(err) => {
            tracing::error!("vector store init failed: {err}");
            return ExitCode::from(1);
        }
    };

    let gateway = Arc::new(build_gateway(&config));

    let parser: Arc<dyn ragserver::ingestion::PdfParser> = Arc::new(HeuristicPdfParser::new());
    let progress_bus = new_progress_bus();
    let cancellation_bus = ragserver::bus::new_cancellation_bus();

    let versions = Arc::new(VersionManager::new(meta.clone(), graph.clone(), vectors.clone(), config.storage_root.clone()));
    let pipeline = Arc::new(IngestionPipeline::new(
        meta.clone(),
        graph.clone(),
        vectors.clone(),
        gateway.clone(),
        versions.clone(),
        progress_bus.clone(),
        parser,
    ));
    let retrieval_tuning = ragserver::retrieval::RetrievalTuning {
        top_k: config.top_k,
        score_threshold: config.vector_score_threshold,
        max_hops: config.max_hops,
    };
    let retriever = HybridRetriever::with_tuning(graph.clone(), vectors.clone(), gateway.clone(), retrieval_tuning);
    let streamer = Arc::new(AnswerStreamer::with_tuning(
        meta.clone(),
        retriever,
        gateway.clone(),
        cancellation_bus.clone(),
        config.history_turns,
        config.context_token_budget,
    ));

    let state = AppState {
        meta,
        pipeline,
        versions,
        streamer,
        progress: progress_bus,
        cancellation: cancellation_bus,
        ingestion_slots: Arc::new(Semaphore::new(config.worker_concurrency)),
        config: Arc::new(config.clone()),
    };

    let app = create_router(state);
    let addr: SocketAddr = match format!("{}:{}", config.host, config.port).parse() {
        Ok(addr) => addr,
        Err(err) => {
            tracing::error!("invalid bind address: {err}");
            return ExitCode::from(1);
        }
    };

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!("failed to bind {addr}: {err}");
            return ExitCode::from(1);
        }
    };

    tracing::info!("listening on {addr}");
    if let Err(err) = axum::serve(listener, app.into_make_service()).with_graceful_shutdown(shutdown_signal()).await {
        tracing::error!("server error: {err}");
        return ExitCode::from(1);
    }

    tracing::info!("ragserver shut down gracefully");
    ExitCode::from(0)
}

/// Builds the chat/embedding gateway from `LLM_REMOTE_*` if a remote chat
/// endpoint is configured, otherwise falls back to the local Ollama-
/// compatible provider (spec.md §4.6). The embedding model is always built
/// from `EMBEDDING_BASE_URL`/`EMBEDDING_MODEL`, which may name a different
/// endpoint than the chat model.
fn build_gateway(config: &ServerConfig) -> Gateway {
    let embed_config = LocalLlmConfig::new(config.embedding_base_url.clone(), config.embedding_model.clone()).with_embedding_dim(config.embedding_dim as usize);
    let embedder = Arc::new(OllamaClient::new(embed_config));

    match (&config.llm_remote_base_url, &config.llm_remote_model, &config.llm_remote_api_key) {
        (Some(base_url), Some(model), Some(api_key)) => {
            let remote_config = RemoteLlmConfig::new(api_key.clone(), base_url.clone(), model.clone()).with_embedding_dim(config.embedding_dim as usize);
            let chat = Arc::new(OpenAiClient::new(remote_config));
            Gateway::with_capacity(chat, embedder, config.llm_concurrency, llm_gateway::DEFAULT_REQUEST_TIMEOUT)
        }
        _ => {
            let local_config = LocalLlmConfig::new(config.llm_base_url.clone(), config.llm_model.clone()).with_embedding_dim(config.embedding_dim as usize);
            let chat = Arc::new(OllamaClient::new(local_config));
            Gateway::with_capacity(chat, embedder, config.llm_concurrency, llm_gateway::DEFAULT_REQUEST_TIMEOUT)
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install CTRL-C signal handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received CTRL-C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
