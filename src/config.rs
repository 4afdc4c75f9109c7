//! Carga y gestión de configuración de la aplicación (LLM, embeddings,
//! recuperación RAG y búsqueda web).

use std::{env, path::PathBuf, str::FromStr};

use anyhow::{anyhow, Context, Result};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LlmProvider {
    OpenAI,
    Gemini,
    Ollama,
}

impl LlmProvider {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "gemini" => Ok(Self::Gemini),
            "ollama" => Ok(Self::Ollama),
            other => Err(anyhow!("Proveedor LLM no soportado: {other}")),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAI => "openai",
            Self::Gemini => "gemini",
            Self::Ollama => "ollama",
        }
    }
}

/// Backend usado para calcular embeddings de documentos y consultas.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EmbeddingBackend {
    /// Embeddings de OpenAI vía Rig.
    OpenAI,
    /// Embeddings deterministas locales, sin red.
    Hash,
}

impl EmbeddingBackend {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "hash" => Ok(Self::Hash),
            other => Err(anyhow!("Backend de embeddings no soportado: {other}")),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAI => "openai",
            Self::Hash => "hash",
        }
    }
}

/// Parámetros de la fase de recuperación RAG.
#[derive(Clone, Debug, PartialEq)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub threshold: f32,
    pub snippet_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            threshold: 0.4,
            snippet_chars: 200,
        }
    }
}

/// Configuración del proveedor de búsqueda web.
#[derive(Clone, Debug, PartialEq)]
pub struct SearchConfig {
    pub endpoint: String,
    pub max_results: u32,
    pub timeout_secs: u64,
}

/// Configuración completa de la aplicación.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server_addr: String,
    pub data_dir: PathBuf,

    pub llm_provider: LlmProvider,
    pub llm_chat_model: String,
    pub llm_temperature: f64,
    pub llm_max_tokens: u64,

    pub embedding_backend: EmbeddingBackend,
    pub llm_embedding_model: String,
    pub embedding_dim: usize,

    pub retrieval: RetrievalConfig,
    pub search: SearchConfig,
}

impl AppConfig {
    /// Carga la configuración desde variables de entorno (usando .env si existe).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Construye la configuración a partir de una función de consulta de
    /// variables. Permite probar la carga sin tocar el entorno del proceso.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let server_addr = get("SERVER_ADDR", "127.0.0.1:3322");

        let data_dir = match lookup("DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => dirs::data_dir()
                .ok_or_else(|| anyhow!("No se pudo determinar el directorio de datos del usuario"))?
                .join("genesis-assistant"),
        };

        let llm_provider = LlmProvider::from_str(&get("LLM_PROVIDER", "openai"))?;
        let llm_chat_model = get("LLM_CHAT_MODEL", "gpt-4o-mini");
        let llm_temperature: f64 = parse_var(&lookup, "LLM_TEMPERATURE", 0.7)?;
        let llm_max_tokens: u64 = parse_var(&lookup, "LLM_MAX_TOKENS", 512)?;

        let embedding_backend = EmbeddingBackend::from_str(&get("EMBEDDING_BACKEND", "openai"))?;
        let llm_embedding_model = get("LLM_EMBEDDING_MODEL", "text-embedding-3-small");
        let embedding_dim: usize = parse_var(&lookup, "EMBEDDING_DIM", 384)?;
        if embedding_dim == 0 {
            return Err(anyhow!("EMBEDDING_DIM debe ser mayor que 0"));
        }

        let defaults = RetrievalConfig::default();
        let retrieval = RetrievalConfig {
            top_k: parse_var(&lookup, "RAG_TOP_K", defaults.top_k)?,
            threshold: parse_var(&lookup, "RAG_THRESHOLD", defaults.threshold)?,
            snippet_chars: parse_var(&lookup, "RAG_SNIPPET_CHARS", defaults.snippet_chars)?,
        };
        if retrieval.top_k == 0 {
            return Err(anyhow!("RAG_TOP_K debe ser mayor que 0"));
        }
        if !(0.0..=1.0).contains(&retrieval.threshold) {
            return Err(anyhow!(
                "RAG_THRESHOLD debe estar entre 0 y 1 (recibido {})",
                retrieval.threshold
            ));
        }

        let search = SearchConfig {
            endpoint: get("SEARCH_ENDPOINT", "https://api.tavily.com/search"),
            max_results: parse_var(&lookup, "SEARCH_MAX_RESULTS", 5)?,
            timeout_secs: parse_var(&lookup, "SEARCH_TIMEOUT_SECS", 30)?,
        };

        Ok(Self {
            server_addr,
            data_dir,
            llm_provider,
            llm_chat_model,
            llm_temperature,
            llm_max_tokens,
            embedding_backend,
            llm_embedding_model,
            embedding_dim,
            retrieval,
            search,
        })
    }

    pub fn documents_path(&self) -> PathBuf {
        self.data_dir.join("documents.json")
    }

    pub fn credential_path(&self) -> PathBuf {
        self.data_dir.join("search_api_key")
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Valor no válido para {key}: '{raw}'")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<AppConfig> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_when_environment_is_empty() {
        let cfg = config_from(&[("DATA_DIR", "/tmp/genesis")]).unwrap();

        assert_eq!(cfg.server_addr, "127.0.0.1:3322");
        assert_eq!(cfg.data_dir, PathBuf::from("/tmp/genesis"));
        assert_eq!(cfg.llm_provider, LlmProvider::OpenAI);
        assert_eq!(cfg.llm_chat_model, "gpt-4o-mini");
        assert_eq!(cfg.llm_max_tokens, 512);
        assert_eq!(cfg.embedding_backend, EmbeddingBackend::OpenAI);
        assert_eq!(cfg.embedding_dim, 384);
        assert_eq!(cfg.retrieval, RetrievalConfig::default());
        assert_eq!(cfg.search.endpoint, "https://api.tavily.com/search");
        assert_eq!(cfg.search.max_results, 5);
        assert_eq!(cfg.documents_path(), PathBuf::from("/tmp/genesis/documents.json"));
    }

    #[test]
    fn overrides_are_parsed() {
        let cfg = config_from(&[
            ("DATA_DIR", "/data"),
            ("LLM_PROVIDER", "Ollama"),
            ("EMBEDDING_BACKEND", "hash"),
            ("EMBEDDING_DIM", "16"),
            ("RAG_TOP_K", "5"),
            ("RAG_THRESHOLD", "0.25"),
            ("SEARCH_MAX_RESULTS", " 8 "),
        ])
        .unwrap();

        assert_eq!(cfg.llm_provider, LlmProvider::Ollama);
        assert_eq!(cfg.embedding_backend, EmbeddingBackend::Hash);
        assert_eq!(cfg.embedding_dim, 16);
        assert_eq!(cfg.retrieval.top_k, 5);
        assert_eq!(cfg.retrieval.threshold, 0.25);
        assert_eq!(cfg.search.max_results, 8);
    }

    #[test]
    fn rejects_unknown_provider() {
        let err = config_from(&[("DATA_DIR", "/d"), ("LLM_PROVIDER", "skynet")]).unwrap_err();
        assert!(err.to_string().contains("skynet"));
    }

    #[test]
    fn rejects_invalid_numbers_and_ranges() {
        assert!(config_from(&[("DATA_DIR", "/d"), ("RAG_TOP_K", "tres")]).is_err());
        assert!(config_from(&[("DATA_DIR", "/d"), ("RAG_TOP_K", "0")]).is_err());
        assert!(config_from(&[("DATA_DIR", "/d"), ("RAG_THRESHOLD", "1.5")]).is_err());
        assert!(config_from(&[("DATA_DIR", "/d"), ("EMBEDDING_DIM", "0")]).is_err());
    }
}
