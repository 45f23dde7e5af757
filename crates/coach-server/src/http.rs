//! ============================================================================
//! HTTP Handlers - REST + SSE endpoints of the coach API
//! ============================================================================

use axum::extract::{Multipart, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures_util::{pin_mut, Stream, StreamExt};
use serde::Deserialize;
use std::convert::Infallible;
use std::path::Path;
use tracing::{error, info, warn};

use coach_core::kb::extract;
use coach_core::types::{
    ChatRequest, ChatResponse, CoachRequest, CoachResponse, DocumentListResponse,
    DocumentUploadResponse, HealthResponse,
};

use crate::error::ApiError;
use crate::AppState;

/// Basic liveness probe. Always answers, even while initializing.
pub async fn root() -> Json<HealthResponse> {
    Json(HealthResponse::new("ok", "RAG Chat API está funcionando"))
}

/// Readiness probe: reports whether the vector store has been built.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    if state.chat.is_ready() {
        Json(HealthResponse::new("ready", "Servicios listos"))
    } else {
        Json(HealthResponse::new("initializing", "Servicios inicializando"))
    }
}

/// Stateless question answering (no conversation memory).
pub async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    if !state.chat.is_ready() {
        return Err(ApiError::NotReady);
    }
    if request.question.trim().is_empty() {
        return Err(ApiError::BadRequest("question must not be empty".to_string()));
    }

    info!("Processing question: {}", request.question);
    let answer = state
        .chat
        .ask(&request.question)
        .await
        .map_err(ApiError::from_service)?;

    Ok(Json(ChatResponse {
        answer,
        question: request.question,
        conversation_id: request.conversation_id,
    }))
}

/// Personalized two-week coaching plan.
pub async fn coach(
    State(state): State<AppState>,
    Json(request): Json<CoachRequest>,
) -> Result<Json<CoachResponse>, ApiError> {
    request.validate().map_err(ApiError::BadRequest)?;
    if !state.chat.is_ready() {
        return Err(ApiError::NotReady);
    }

    let response = state
        .chat
        .generate_coach_plan(&request.user_profile, request.risk_score, &request.top_drivers)
        .await
        .map_err(ApiError::from_service)?;

    Ok(Json(response))
}

/// Conversational answer streamed as Server-Sent Events.
/// Each token arrives as a `data:` event; the stream ends with `data: [DONE]`.
pub async fn coach_stream(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    if !state.chat.is_ready() {
        return Err(ApiError::NotReady);
    }
    if request.question.trim().is_empty() {
        return Err(ApiError::BadRequest("question must not be empty".to_string()));
    }

    let conversation_id = request
        .conversation_id
        .unwrap_or_else(|| "default".to_string());
    info!(
        "Streaming answer for conversation {}: {}",
        conversation_id, request.question
    );

    let tokens = state.chat.clone().ask_stream(request.question, conversation_id);

    let events = async_stream::stream! {
        pin_mut!(tokens);
        while let Some(item) = tokens.next().await {
            match item {
                Ok(token) => yield Ok::<_, Infallible>(Event::default().data(token)),
                Err(e) => {
                    // Headers are already out; signal the failure in-band.
                    error!("Streaming failure: {:#}", e);
                    yield Ok(Event::default().data(format!("[ERROR] {}", e)));
                    break;
                }
            }
        }
        yield Ok(Event::default().data("[DONE]"));
    };

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

/// List every supported document in the KB and documents directories.
pub async fn documents_list(
    State(state): State<AppState>,
) -> Result<Json<DocumentListResponse>, ApiError> {
    let kb = state.rag.knowledge_base();
    let documents = kb.list_files();

    Ok(Json(DocumentListResponse {
        count: documents.len(),
        documents,
        kb_directory: kb.kb_dir().display().to_string(),
        documents_directory: kb.documents_dir().display().to_string(),
    }))
}

/// Rebuild the vector store from the documents on disk.
pub async fn documents_reload(
    State(state): State<AppState>,
) -> Result<Json<HealthResponse>, ApiError> {
    if !state.chat.is_ready() {
        return Err(ApiError::NotReady);
    }

    let report = state.rag.reload().await.map_err(ApiError::from_service)?;
    info!(
        "Reload complete: {} documents, {} chunks",
        report.documents, report.chunks
    );

    Ok(Json(HealthResponse::new(
        "ready",
        "Documentos recargados y vector store reconstruido",
    )))
}

#[derive(Debug, Deserialize)]
pub struct UploadParams {
    #[serde(default = "default_true")]
    pub reload_vector_store: bool,
}

fn default_true() -> bool {
    true
}

/// Upload a document into the knowledge base.
/// The file must be extractable; invalid uploads are deleted again.
pub async fn documents_upload(
    State(state): State<AppState>,
    Query(params): Query<UploadParams>,
    mut multipart: Multipart,
) -> Result<Json<DocumentUploadResponse>, ApiError> {
    let mut upload: Option<(String, Vec<u8>)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("invalid multipart body: {}", e)))?
    {
        let Some(file_name) = field.file_name().map(|n| n.to_string()) else {
            continue;
        };
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("failed to read upload: {}", e)))?;
        upload = Some((file_name, bytes.to_vec()));
        break;
    }

    let Some((file_name, bytes)) = upload else {
        return Err(ApiError::BadRequest("missing \"file\" field".to_string()));
    };

    // Keep only the final path component so uploads cannot escape the KB dir.
    let file_name = Path::new(&file_name)
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.to_string())
        .ok_or_else(|| ApiError::BadRequest("invalid file name".to_string()))?;

    let extension = Path::new(&file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
        .unwrap_or_default();
    if !extract::SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(ApiError::BadRequest(format!(
            "Formato de archivo no soportado: .{}. Formatos permitidos: .txt, .svg",
            extension
        )));
    }

    let kb = state.rag.knowledge_base();
    kb.ensure_directories()
        .map_err(|e| ApiError::Internal(format!("failed to create directories: {}", e)))?;

    let file_path = kb.kb_dir().join(&file_name);
    tokio::fs::write(&file_path, &bytes)
        .await
        .map_err(|e| ApiError::Internal(format!("failed to save upload: {}", e)))?;
    info!("Uploaded document: {}", file_path.display());

    // Verify the file is usable before it can poison the next reload.
    if let Err(e) = extract::extract_file(&file_path) {
        let _ = tokio::fs::remove_file(&file_path).await;
        return Err(ApiError::BadRequest(format!(
            "Error al procesar el archivo: {}",
            e
        )));
    }

    let mut reloaded = false;
    if params.reload_vector_store && state.chat.is_ready() {
        match state.rag.reload().await {
            Ok(_) => reloaded = true,
            Err(e) => warn!("Failed to reload vector store after upload: {:#}", e),
        }
    }

    Ok(Json(DocumentUploadResponse {
        message: "Archivo cargado exitosamente".to_string(),
        file_path: file_path.display().to_string(),
        file_type: format!(".{}", extension),
        reloaded,
    }))
}
