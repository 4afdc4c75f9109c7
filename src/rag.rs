//! Orquestación de una consulta: enrutado, recuperación de contexto y
//! generación.
//!
//! Flujo:
//!   1. El router decide la fuente (RAG, web o sólo LLM).
//!   2. RAG: embedding de la consulta + búsqueda vectorial. Cualquier fallo
//!      degrada a una generación sin contexto (sólo se registra en logs).
//!   3. Web: búsqueda en Tavily. Un fallo aquí se devuelve al usuario, porque
//!      la búsqueda web la activó él explícitamente.
//!   4. Se compone el prompt de sistema y el LLM responde con toda la
//!      conversación previa.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::{
    config::RetrievalConfig,
    embedding::Embedder,
    error::{AssistantError, Result},
    llm::Generator,
    models::{Message, Role},
    router::{query_preview, route_query, RoutingDecision, SourceKind},
    vector_store::VectorIndex,
    web_search::WebSearch,
};

const SYSTEM_PREAMBLE: &str = "You are GENESIS-1, a private AI assistant running entirely on the user's device.

Your core principles:
1. Privacy First: All conversations and data stay on the user's device.
2. Honesty: Be transparent about your limitations.
3. Helpfulness: Provide clear, concise, and actionable responses.
4. Respect: Treat the user with respect and acknowledge their concerns.";

/// Respuesta usada cuando el modelo devuelve un texto vacío.
pub const FALLBACK_RESPONSE: &str =
    "I am GENESIS-1, your private AI assistant. How can I help you today?";

/// Contexto recuperado para una consulta.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetrievedContext {
    pub text: String,
    pub sources: Vec<String>,
}

/// Respuesta final con las fuentes citadas y la decisión tomada.
#[derive(Debug, Clone, Serialize)]
pub struct AssistantReply {
    pub content: String,
    pub sources: Vec<String>,
    pub decision: RoutingDecision,
}

/// Orquestador de recuperación y generación. Se construye una vez y se
/// comparte por referencia.
pub struct Assistant {
    index: Arc<RwLock<VectorIndex>>,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    web: Arc<dyn WebSearch>,
    retrieval: RetrievalConfig,
}

impl Assistant {
    pub fn new(
        index: Arc<RwLock<VectorIndex>>,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
        web: Arc<dyn WebSearch>,
        retrieval: RetrievalConfig,
    ) -> Self {
        Self {
            index,
            embedder,
            generator,
            web,
            retrieval,
        }
    }

    /// Decide la fuente para la consulta sin recuperar nada.
    pub async fn route(&self, query: &str, web_search_toggle: bool) -> RoutingDecision {
        let has_documents = self.index.read().await.has_documents();
        let web_enabled = web_search_toggle && self.web.is_configured().await;
        route_query(query, has_documents, web_enabled)
    }

    /// Responde al último mensaje de `history`, que debe ser del usuario.
    pub async fn answer(&self, history: &[Message], web_search_toggle: bool) -> Result<AssistantReply> {
        let query = match history.last() {
            Some(message) if message.role == Role::User => message.content.as_str(),
            _ => {
                return Err(AssistantError::InvalidInput(
                    "No hay pregunta del usuario que responder".into(),
                ))
            }
        };

        let decision = self.route(query, web_search_toggle).await;
        info!(
            "Consulta '{}' enrutada a {:?}: {}",
            query_preview(query),
            decision.kind,
            decision.reason
        );

        let context = match decision.kind {
            SourceKind::Rag => self.retrieve_documents(query).await,
            SourceKind::Web => self.retrieve_web(query).await?,
            SourceKind::Llm | SourceKind::Local => RetrievedContext::default(),
        };

        let system_prompt = build_system_prompt(&context.text);
        let response = self.generator.generate(history, &system_prompt).await?;

        let content = if response.is_empty() {
            FALLBACK_RESPONSE.to_string()
        } else {
            response
        };

        Ok(AssistantReply {
            content,
            sources: context.sources,
            decision,
        })
    }

    /// Recupera contexto de la base de conocimiento. Nunca falla: ante
    /// cualquier error devuelve un contexto vacío.
    pub async fn retrieve_documents(&self, query: &str) -> RetrievedContext {
        let embedding = match self.embedder.embed(query).await {
            Ok(embedding) => embedding,
            Err(e) => {
                warn!("Fallo en el embedding de la consulta, se responde sin contexto: {e}");
                return RetrievedContext::default();
            }
        };

        let results = {
            let index = self.index.read().await;
            index.search_similar(&embedding, self.retrieval.top_k, self.retrieval.threshold)
        };

        let results = match results {
            Ok(results) => results,
            Err(e) => {
                warn!("Fallo en la búsqueda vectorial, se responde sin contexto: {e}");
                return RetrievedContext::default();
            }
        };

        if results.is_empty() {
            info!("Ningún documento supera el umbral de similitud {}", self.retrieval.threshold);
            return RetrievedContext::default();
        }

        let text = results
            .iter()
            .map(|r| {
                format!(
                    "Document: {}\nContent: {}...",
                    r.document.name,
                    r.document.excerpt(self.retrieval.snippet_chars)
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n");
        let sources = results.into_iter().map(|r| r.document.name).collect();

        RetrievedContext { text, sources }
    }

    /// Recupera contexto de la web. Los errores se propagan al llamante.
    pub async fn retrieve_web(&self, query: &str) -> Result<RetrievedContext> {
        let results = self.web.search(query).await?;

        let text = results
            .iter()
            .map(|r| format!("{}\n{}", r.title, r.snippet))
            .collect::<Vec<_>>()
            .join("\n\n");
        let sources = results.into_iter().map(|r| r.url).collect();

        Ok(RetrievedContext { text, sources })
    }
}

/// Prompt de sistema: preámbulo fijo más el bloque de contexto, si lo hay.
pub fn build_system_prompt(context: &str) -> String {
    if context.is_empty() {
        SYSTEM_PREAMBLE.to_string()
    } else {
        format!("{SYSTEM_PREAMBLE}\n\nContext from knowledge base:\n{context}")
    }
}
