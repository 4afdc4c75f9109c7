//! Modelos de dominio: documentos de la base de conocimiento, mensajes de
//! la conversación y resultados de búsqueda.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Ciclo de vida del embedding de un documento: `pending → completed | failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingStatus {
    Pending,
    Completed,
    Failed,
}

/// Documento de la base de conocimiento, con su embedding opcional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub name: String,
    pub content: String,
    pub size_bytes: u64,
    pub uploaded_at: DateTime<Utc>,
    pub embedding_status: EmbeddingStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl Document {
    /// Crea un documento nuevo en estado `pending`.
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            size_bytes: content.len() as u64,
            content,
            uploaded_at: Utc::now(),
            embedding_status: EmbeddingStatus::Pending,
            embedding: None,
        }
    }

    /// Primeros `max_chars` caracteres del contenido (sin cortar un carácter UTF-8).
    pub fn excerpt(&self, max_chars: usize) -> &str {
        match self.content.char_indices().nth(max_chars) {
            Some((idx, _)) => &self.content[..idx],
            None => &self.content,
        }
    }
}

/// Vista de un documento sin el vector, para listados.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentSummary {
    pub id: String,
    pub name: String,
    pub size_bytes: u64,
    pub uploaded_at: DateTime<Utc>,
    pub embedding_status: EmbeddingStatus,
}

impl From<&Document> for DocumentSummary {
    fn from(doc: &Document) -> Self {
        Self {
            id: doc.id.clone(),
            name: doc.name.clone(),
            size_bytes: doc.size_bytes,
            uploaded_at: doc.uploaded_at,
            embedding_status: doc.embedding_status,
        }
    }
}

/// Documento emparejado con su similitud respecto a la consulta.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorSearchResult {
    pub document: Document,
    pub similarity: f32,
}

/// Resultado de la búsqueda web.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
    pub domain: String,
}

/// Estadísticas de la base de conocimiento.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IndexStats {
    pub document_count: usize,
    pub total_size_bytes: u64,
    pub embedding_dimension: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Mensaje de la conversación.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content.into(), Vec::new())
    }

    pub fn assistant(content: impl Into<String>, sources: Vec<String>) -> Self {
        Self::new(Role::Assistant, content.into(), sources)
    }

    fn new(role: Role, content: String, sources: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content,
            timestamp: Utc::now(),
            sources,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_document_is_pending_and_sized_in_bytes() {
        let doc = Document::new("notas.md", "año");
        assert_eq!(doc.embedding_status, EmbeddingStatus::Pending);
        assert_eq!(doc.size_bytes, 4);
        assert!(doc.embedding.is_none());
    }

    #[test]
    fn excerpt_respects_char_boundaries() {
        let doc = Document::new("a", "ñandú veloz");
        assert_eq!(doc.excerpt(5), "ñandú");
        assert_eq!(doc.excerpt(100), "ñandú veloz");
        assert_eq!(doc.excerpt(0), "");
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&EmbeddingStatus::Completed).unwrap();
        assert_eq!(json, "\"completed\"");
    }

    #[test]
    fn assistant_message_without_sources_omits_field() {
        let msg = Message::assistant("hola", Vec::new());
        let value = serde_json::to_value(&msg).unwrap();
        assert!(value.get("sources").is_none());
        assert_eq!(value["role"], "assistant");
    }
}
