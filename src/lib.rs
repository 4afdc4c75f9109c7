//! GENESIS-1: asistente de IA privado que decide, para cada consulta, si
//! responder con los documentos locales (RAG), con una búsqueda web o sólo
//! con el modelo de lenguaje.

pub mod api;
pub mod app_state;
pub mod chat;
pub mod config;
pub mod credentials;
pub mod embedding;
pub mod error;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod rag;
pub mod relevance;
pub mod router;
pub mod vector_store;
pub mod web_search;

#[cfg(test)]
mod test_support;

pub use error::{AssistantError, Result};
