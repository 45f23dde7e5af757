//! ============================================================================
//! COACH-SERVER: HTTP API for the RAG wellness coach
//! ============================================================================
//! Wires the core services into an axum application: REST endpoints, SSE
//! streaming, permissive CORS for the hackathon frontend and graceful
//! shutdown.
//! ============================================================================

pub mod error;
pub mod http;

use anyhow::{Context, Result};
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use coach_core::{
    ChatClient, ChatService, ConversationStore, EmbeddingClient, GuardrailConfig, KnowledgeBase,
    MedicalGuardrails, RagService, Settings, TextChunker, VectorStore,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub chat: Arc<ChatService>,
    pub rag: Arc<RagService>,
}

/// Initialize every service and ingest the knowledge base.
pub async fn build_state(settings: &Settings) -> Result<AppState> {
    let kb = KnowledgeBase::new(&settings.kb_directory, &settings.documents_directory);
    kb.ensure_directories()
        .context("Failed to create knowledge-base directories")?;

    let store = VectorStore::new(&settings.qdrant_url)
        .await
        .context("Failed to connect to the vector store")?;
    let embeddings = EmbeddingClient::new(
        settings.openai_api_key.clone(),
        settings.openai_base_url.clone(),
        settings.embedding_model.clone(),
    );
    let chunker = TextChunker::new(settings.chunk_size, settings.chunk_overlap);
    let rag = Arc::new(RagService::new(store, embeddings, kb, chunker));

    let report = rag.reload().await.context("Initial ingest failed")?;
    info!(
        "Knowledge base ready: {} documents, {} chunks",
        report.documents, report.chunks
    );

    // The coach keeps answering without persistence if the history database
    // cannot be opened.
    let history = match ConversationStore::open(settings.history_db_path.as_deref()) {
        Ok(store) => Some(store),
        Err(e) => {
            warn!("Conversation history disabled: {:#}", e);
            None
        }
    };

    let guardrails = MedicalGuardrails::with_config(GuardrailConfig {
        enabled: settings.enable_medical_guardrails,
        high_risk_threshold: settings.high_risk_threshold,
        critical_risk_threshold: settings.critical_risk_threshold,
    });
    let llm = ChatClient::new(
        settings.openai_api_key.clone(),
        settings.openai_base_url.clone(),
        settings.openai_model.clone(),
    );
    let chat = Arc::new(ChatService::new(llm, rag.clone(), history, guardrails));

    Ok(AppState { chat, rag })
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(http::root))
        .route("/health", get(http::health))
        .route("/chat", post(http::chat))
        .route("/coach", post(http::coach))
        .route("/coach/stream", post(http::coach_stream))
        .route("/documents/list", get(http::documents_list))
        .route("/documents/upload", post(http::documents_upload))
        .route("/documents/reload", post(http::documents_reload))
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Start the server and block until shutdown
pub async fn run(settings: Settings) -> Result<()> {
    let state = build_state(&settings).await?;
    let app = router(state);

    let addr = format!("{}:{}", settings.service_host, settings.service_port)
        .parse::<SocketAddr>()
        .context("Invalid bind address")?;

    info!("Coach API listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind")?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

/// Graceful shutdown on ctrl-c or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutting down...");
}
