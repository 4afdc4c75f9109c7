//! Cálculo de embeddings de consultas y documentos.
//!
//! Todos los vectores devueltos están normalizados (norma L2 = 1), de modo
//! que la similitud coseno del índice se reduce a un producto escalar.

use std::{env, sync::Arc};

use async_trait::async_trait;
use rig::providers::openai;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::{
    config::{AppConfig, EmbeddingBackend},
    error::{AssistantError, Result},
};

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embedding normalizado de un texto.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embedding de un documento subido. Por defecto se embebe el contenido completo.
    async fn embed_document(&self, name: &str, content: &str) -> Result<Vec<f32>> {
        debug!("Calculando embedding del documento '{name}'");
        self.embed(content).await
    }
}

/// Construye el backend de embeddings indicado en la configuración.
pub fn from_config(cfg: &AppConfig) -> Arc<dyn Embedder> {
    match cfg.embedding_backend {
        EmbeddingBackend::OpenAI => Arc::new(RigEmbedder::new(&cfg.llm_embedding_model)),
        EmbeddingBackend::Hash => Arc::new(HashEmbedder::new(cfg.embedding_dim)),
    }
}

/// Normaliza un vector a norma 1. Un vector nulo se devuelve tal cual.
pub fn normalize(mut vector: Vec<f32>) -> Vec<f32> {
    let norm = vector
        .iter()
        .map(|x| f64::from(*x) * f64::from(*x))
        .sum::<f64>()
        .sqrt();
    if norm > 0.0 {
        for x in &mut vector {
            *x = (f64::from(*x) / norm) as f32;
        }
    }
    vector
}

/// Embeddings de OpenAI a través de Rig. El cliente se crea una única vez,
/// en la primera llamada; las llamadas concurrentes esperan a esa misma
/// inicialización.
pub struct RigEmbedder {
    model: String,
    client: OnceCell<openai::Client>,
}

impl RigEmbedder {
    pub fn new(model: &str) -> Self {
        let model = if model.is_empty() {
            openai::TEXT_EMBEDDING_3_SMALL.to_string()
        } else {
            model.to_string()
        };
        Self {
            model,
            client: OnceCell::new(),
        }
    }

    async fn client(&self) -> Result<&openai::Client> {
        self.client
            .get_or_try_init(|| async {
                if env::var("OPENAI_API_KEY").is_err() {
                    return Err(AssistantError::Config(
                        "Falta OPENAI_API_KEY en el entorno".to_string(),
                    ));
                }
                info!("Cliente de embeddings inicializado ({})", self.model);
                Ok(openai::Client::from_env())
            })
            .await
    }
}

#[async_trait]
impl Embedder for RigEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        use rig::client::EmbeddingsClient as _;
        use rig::embeddings::EmbeddingModel as _;

        let client = self.client().await?;
        let embedding_model = client.embedding_model(&self.model);

        let embeddings = embedding_model
            .embed_texts(vec![text.to_string()])
            .await
            .map_err(|e| AssistantError::Embedding(e.to_string()))?;

        let vector: Vec<f32> = embeddings
            .first()
            .map(|e| e.vec.iter().map(|v| *v as f32).collect())
            .ok_or_else(|| AssistantError::Embedding("El modelo no devolvió ningún embedding".into()))?;

        if vector.is_empty() {
            return Err(AssistantError::Embedding("Embedding vacío".into()));
        }
        Ok(normalize(vector))
    }
}

/// Embeddings deterministas sin red, derivados de un hash del texto.
///
/// No capturan semántica: el mismo texto produce siempre el mismo vector y
/// todas las componentes son no negativas. Útil sin conexión y en pruebas.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn text_hash(text: &str) -> i32 {
        text.encode_utf16().fold(0_i32, |hash, unit| {
            hash.wrapping_shl(5)
                .wrapping_sub(hash)
                .wrapping_add(i32::from(unit))
        })
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        let hash = f64::from(Self::text_hash(text));
        let raw = (0..self.dimension)
            .map(|i| ((hash + i as f64).sin() * 0.5 + 0.5) as f32)
            .collect();
        normalize(raw)
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if self.dimension == 0 {
            return Err(AssistantError::Embedding("Dimensión de embedding 0".into()));
        }
        Ok(self.vector_for(text))
    }
}
