use std::sync::{Arc, Mutex};

use tokio::sync::{oneshot, RwLock};

use crate::{
    chat::ChatSession, config::AppConfig, credentials::CredentialStore, embedding::Embedder,
    rag::Assistant, vector_store::VectorIndex,
};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub index: Arc<RwLock<VectorIndex>>,
    pub embedder: Arc<dyn Embedder>,
    pub assistant: Arc<Assistant>,
    pub credentials: Arc<dyn CredentialStore>,
    pub chat: ChatSession,
    pub status: Arc<Mutex<Status>>,
    pub shutdown_sender: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

/// Progreso de la importación de documentos en segundo plano.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct Status {
    pub is_busy: bool,
    pub message: String,
    pub progress: f32, // Valor entre 0.0 y 1.0
}
