//! Dobles de prueba de los colaboradores (embedding, generación y búsqueda).

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::{Notify, RwLock};

use crate::{
    embedding::Embedder,
    error::{AssistantError, Result},
    llm::Generator,
    models::{Document, Message, SearchResult},
    vector_store::{JsonFileStore, VectorIndex},
    web_search::WebSearch,
};

/// Índice respaldado por un fichero temporal con los documentos dados
/// `(nombre, contenido, embedding)`. El `TempDir` debe seguir vivo.
pub async fn index_with_docs(docs: &[(&str, &str, Vec<f32>)]) -> (Arc<RwLock<VectorIndex>>, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(JsonFileStore::new(dir.path().join("documents.json")));
    let mut index = VectorIndex::load(store).await.unwrap();
    for (name, content, embedding) in docs {
        index
            .store(Document::new(*name, *content), embedding.clone())
            .await
            .unwrap();
    }
    (Arc::new(RwLock::new(index)), dir)
}

/// Devuelve siempre el mismo vector.
pub struct FixedEmbedder(pub Vec<f32>);

#[async_trait]
impl Embedder for FixedEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(self.0.clone())
    }
}

pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(AssistantError::Embedding("modelo no disponible".into()))
    }
}

/// Generador que registra cada llamada y responde con un texto fijo.
pub struct RecordingGenerator {
    reply: Option<String>,
    gate: Option<Arc<Notify>>,
    calls: Mutex<Vec<(usize, String)>>,
}

impl RecordingGenerator {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            gate: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: None,
            gate: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// No responde hasta que se notifique `gate`.
    pub fn gated(reply: &str, gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::replying(reply)
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn last_system_prompt(&self) -> String {
        self.calls.lock().unwrap().last().map(|(_, p)| p.clone()).unwrap_or_default()
    }

    pub fn last_history_len(&self) -> usize {
        self.calls.lock().unwrap().last().map(|(n, _)| *n).unwrap_or_default()
    }
}

#[async_trait]
impl Generator for RecordingGenerator {
    async fn generate(&self, history: &[Message], system_prompt: &str) -> Result<String> {
        self.calls
            .lock()
            .unwrap()
            .push((history.len(), system_prompt.to_string()));

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        self.reply
            .clone()
            .ok_or_else(|| AssistantError::Generation("el modelo se quedó sin memoria".into()))
    }
}

/// Búsqueda web simulada.
pub struct FakeSearch {
    configured: bool,
    results: Option<Vec<SearchResult>>,
}

impl FakeSearch {
    pub fn unconfigured() -> Self {
        Self {
            configured: false,
            results: Some(Vec::new()),
        }
    }

    pub fn with_results(results: Vec<SearchResult>) -> Self {
        Self {
            configured: true,
            results: Some(results),
        }
    }

    pub fn failing() -> Self {
        Self {
            configured: true,
            results: None,
        }
    }
}

#[async_trait]
impl WebSearch for FakeSearch {
    async fn is_configured(&self) -> bool {
        self.configured
    }

    async fn search(&self, _query: &str) -> Result<Vec<SearchResult>> {
        if !self.configured {
            return Err(AssistantError::MissingCredential);
        }
        self.results
            .clone()
            .ok_or_else(|| AssistantError::WebSearch("La API de búsqueda respondió 401".into()))
    }
}
