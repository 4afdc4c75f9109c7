use std::path::PathBuf;

use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::spawn;
use tracing::{error, info};

use crate::{
    app_state::{AppState, Status},
    chat::Conversation,
    error::AssistantError,
    ingest,
    models::{DocumentSummary, IndexStats, Message},
    relevance,
    router::RoutingDecision,
};

type ApiError = (StatusCode, Json<serde_json::Value>);

// --- Payloads y Respuestas de la API ---

#[derive(Deserialize)]
pub struct ChatPayload {
    message: String,
}

#[derive(Serialize)]
pub struct ChatResponse {
    reply: Message,
    decision: RoutingDecision,
}

#[derive(Deserialize)]
pub struct RoutePayload {
    query: String,
}

#[derive(Deserialize)]
pub struct UploadPayload {
    name: String,
    content: String,
}

#[derive(Deserialize)]
pub struct ImportPayload {
    path: String,
}

#[derive(Deserialize)]
pub struct SearchParams {
    q: String,
}

#[derive(Serialize)]
pub struct KeywordMatch {
    document: DocumentSummary,
    score: f32,
}

#[derive(Deserialize)]
pub struct SearchKeyPayload {
    api_key: String,
}

#[derive(Serialize)]
pub struct SettingsResponse {
    search_configured: bool,
    llm_provider: &'static str,
    chat_model: String,
    embedding_backend: &'static str,
}

// --- Router ---

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/api/chat", post(chat_handler))
        .route("/api/messages", get(messages_handler).delete(clear_messages_handler))
        .route("/api/web-search/toggle", post(toggle_web_search_handler))
        .route("/api/route", post(route_handler))
        .route(
            "/api/documents",
            get(list_documents_handler)
                .post(upload_document_handler)
                .delete(clear_documents_handler),
        )
        .route("/api/documents/stats", get(stats_handler))
        .route("/api/documents/search", get(keyword_search_handler))
        .route("/api/documents/import", post(import_handler))
        .route("/api/documents/:id", delete(delete_document_handler))
        .route("/api/status", get(status_handler))
        .route("/api/settings", get(settings_handler))
        .route(
            "/api/settings/search-key",
            put(set_search_key_handler).delete(clear_search_key_handler),
        )
        .route("/api/shutdown", post(shutdown_handler))
        .with_state(app_state)
}

/// Traduce un error del núcleo a código HTTP + cuerpo `{"error": ...}`.
fn error_response(err: AssistantError) -> ApiError {
    let status = match &err {
        AssistantError::InvalidInput(_) | AssistantError::MissingCredential => StatusCode::BAD_REQUEST,
        AssistantError::Busy => StatusCode::CONFLICT,
        AssistantError::NotFound(_) => StatusCode::NOT_FOUND,
        AssistantError::WebSearch(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!("Error interno: {err}");
    }
    (status, Json(json!({ "error": err.to_string() })))
}

// --- Handlers de conversación ---

#[axum::debug_handler]
async fn chat_handler(
    State(state): State<AppState>,
    Json(payload): Json<ChatPayload>,
) -> Result<Json<ChatResponse>, ApiError> {
    let (reply, outcome) = state
        .chat
        .submit(&state.assistant, &payload.message)
        .await
        .map_err(error_response)?;

    Ok(Json(ChatResponse {
        reply,
        decision: outcome.decision,
    }))
}

#[axum::debug_handler]
async fn messages_handler(State(state): State<AppState>) -> Json<Conversation> {
    Json(state.chat.snapshot())
}

#[axum::debug_handler]
async fn clear_messages_handler(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    state.chat.clear().map_err(error_response)?;
    Ok(StatusCode::NO_CONTENT)
}

#[axum::debug_handler]
async fn toggle_web_search_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let enabled = state.chat.toggle_web_search();
    info!("Búsqueda web {}", if enabled { "activada" } else { "desactivada" });
    Json(json!({ "enabled": enabled }))
}

#[axum::debug_handler]
async fn route_handler(
    State(state): State<AppState>,
    Json(payload): Json<RoutePayload>,
) -> Json<RoutingDecision> {
    let web_toggle = state.chat.snapshot().web_search_enabled;
    Json(state.assistant.route(&payload.query, web_toggle).await)
}

// --- Handlers de la base de conocimiento ---

#[axum::debug_handler]
async fn list_documents_handler(State(state): State<AppState>) -> Json<Vec<DocumentSummary>> {
    let index = state.index.read().await;
    Json(index.all().iter().map(DocumentSummary::from).collect())
}

#[axum::debug_handler]
async fn upload_document_handler(
    State(state): State<AppState>,
    Json(payload): Json<UploadPayload>,
) -> Result<Response, ApiError> {
    let document = ingest::upload_document(
        &state.index,
        state.embedder.as_ref(),
        &payload.name,
        &payload.content,
    )
    .await
    .map_err(error_response)?;

    // Borrado mientras se calculaba el embedding: no hay nada que devolver.
    Ok(match document {
        Some(document) => (StatusCode::CREATED, Json(DocumentSummary::from(&document))).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    })
}

#[axum::debug_handler]
async fn clear_documents_handler(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    state
        .index
        .write()
        .await
        .clear_all()
        .await
        .map_err(error_response)?;
    Ok(StatusCode::NO_CONTENT)
}

#[axum::debug_handler]
async fn delete_document_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let removed = state
        .index
        .write()
        .await
        .delete(&id)
        .await
        .map_err(error_response)?;

    if removed {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(error_response(AssistantError::NotFound(id)))
    }
}

#[axum::debug_handler]
async fn stats_handler(State(state): State<AppState>) -> Json<IndexStats> {
    Json(state.index.read().await.stats())
}

#[axum::debug_handler]
async fn keyword_search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Json<Vec<KeywordMatch>> {
    let index = state.index.read().await;
    let matches = relevance::keyword_search(&params.q, index.all())
        .into_iter()
        .map(|(doc, score)| KeywordMatch {
            document: DocumentSummary::from(doc),
            score,
        })
        .collect();
    Json(matches)
}

#[axum::debug_handler]
async fn import_handler(
    State(state): State<AppState>,
    Json(payload): Json<ImportPayload>,
) -> Result<StatusCode, ApiError> {
    let root_dir = PathBuf::from(&payload.path);
    if !root_dir.is_dir() {
        return Err(error_response(AssistantError::InvalidInput(
            "La ruta proporcionada no es un directorio válido.".into(),
        )));
    }

    {
        let mut status = state.status.lock().unwrap_or_else(|p| p.into_inner());
        if status.is_busy {
            return Err(error_response(AssistantError::Busy));
        }
        status.is_busy = true;
        status.message = "Iniciando importación...".to_string();
        status.progress = 0.0;
    }

    spawn(async move {
        let result = ingest::ingest_directory(
            &state.index,
            state.embedder.as_ref(),
            &root_dir,
            state.status.clone(),
        )
        .await;

        let mut status = state.status.lock().unwrap_or_else(|p| p.into_inner());
        status.is_busy = false;
        status.progress = 0.0;
        match result {
            Ok(summary) => {
                status.message = format!("¡Importación completada! {}", summary);
            }
            Err(err) => {
                status.message = format!("Error en la importación: {}", err);
                error!("Error de importación: {}", err);
            }
        }
    });

    Ok(StatusCode::ACCEPTED)
}

#[axum::debug_handler]
async fn status_handler(State(state): State<AppState>) -> Json<Status> {
    Json(state.status.lock().unwrap_or_else(|p| p.into_inner()).clone())
}

// --- Handlers de ajustes ---

#[axum::debug_handler]
async fn settings_handler(State(state): State<AppState>) -> Json<SettingsResponse> {
    let search_configured = matches!(state.credentials.get().await, Ok(Some(_)));
    Json(SettingsResponse {
        search_configured,
        llm_provider: state.config.llm_provider.as_str(),
        chat_model: state.config.llm_chat_model.clone(),
        embedding_backend: state.config.embedding_backend.as_str(),
    })
}

#[axum::debug_handler]
async fn set_search_key_handler(
    State(state): State<AppState>,
    Json(payload): Json<SearchKeyPayload>,
) -> Result<StatusCode, ApiError> {
    state
        .credentials
        .set(&payload.api_key)
        .await
        .map_err(error_response)?;
    Ok(StatusCode::NO_CONTENT)
}

#[axum::debug_handler]
async fn clear_search_key_handler(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    state.credentials.clear().await.map_err(error_response)?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Handler de Apagado ---

#[axum::debug_handler]
async fn shutdown_handler(State(state): State<AppState>) -> impl IntoResponse {
    info!("Petición de apagado recibida.");
    if let Some(sender) = state
        .shutdown_sender
        .lock()
        .unwrap_or_else(|p| p.into_inner())
        .take()
    {
        let _ = sender.send(());
    }
    StatusCode::OK
}
