//! Búsqueda web en tiempo real a través de la API de Tavily.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use url::Url;

use crate::{
    config::SearchConfig,
    credentials::CredentialStore,
    error::{AssistantError, Result},
    models::SearchResult,
};

#[async_trait]
pub trait WebSearch: Send + Sync {
    /// Indica si hay credencial configurada. Sin ella la búsqueda web nunca
    /// se considera activa.
    async fn is_configured(&self) -> bool;

    async fn search(&self, query: &str) -> Result<Vec<SearchResult>>;
}

#[derive(Debug, Serialize)]
struct TavilyRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    include_answer: bool,
    max_results: u32,
    search_depth: &'a str,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
    #[serde(default)]
    answer: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    #[serde(default)]
    title: String,
    url: String,
    #[serde(default)]
    snippet: Option<String>,
    #[serde(default)]
    content: Option<String>,
}

impl From<TavilyResult> for SearchResult {
    fn from(result: TavilyResult) -> Self {
        let domain = extract_domain(&result.url);
        Self {
            title: result.title,
            snippet: result.snippet.or(result.content).unwrap_or_default(),
            url: result.url,
            domain,
        }
    }
}

/// Host de una URL, o `"unknown"` si no se puede analizar.
pub fn extract_domain(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Cliente de la API de búsqueda de Tavily.
pub struct TavilyClient {
    http: Client,
    endpoint: String,
    max_results: u32,
    credentials: Arc<dyn CredentialStore>,
}

impl TavilyClient {
    pub fn new(cfg: &SearchConfig, credentials: Arc<dyn CredentialStore>) -> Result<Self> {
        Url::parse(&cfg.endpoint).map_err(|e| {
            AssistantError::Config(format!("SEARCH_ENDPOINT no válido ('{}'): {e}", cfg.endpoint))
        })?;

        let http = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .map_err(|e| AssistantError::Config(format!("No se pudo crear el cliente HTTP: {e}")))?;

        Ok(Self {
            http,
            endpoint: cfg.endpoint.clone(),
            max_results: cfg.max_results,
            credentials,
        })
    }

    /// Búsqueda que además devuelve la respuesta resumida por Tavily.
    pub async fn search_with_answer(&self, query: &str) -> Result<(String, Vec<SearchResult>)> {
        let response = self.request(query).await?;
        let results = response.results.into_iter().map(SearchResult::from).collect();
        Ok((response.answer.unwrap_or_default(), results))
    }

    async fn request(&self, query: &str) -> Result<TavilyResponse> {
        let api_key = self
            .credentials
            .get()
            .await?
            .ok_or(AssistantError::MissingCredential)?;

        let body = TavilyRequest {
            api_key: &api_key,
            query,
            include_answer: true,
            max_results: self.max_results,
            search_depth: "basic",
        };

        let response = self
            .http
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!("Fallo de red en la búsqueda web: {e}");
                AssistantError::WebSearch(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            error!("La API de búsqueda respondió {status}");
            return Err(AssistantError::WebSearch(format!(
                "La API de búsqueda respondió {status}"
            )));
        }

        response.json::<TavilyResponse>().await.map_err(|e| {
            error!("Respuesta de búsqueda no válida: {e}");
            AssistantError::WebSearch(format!("Respuesta no válida: {e}"))
        })
    }
}

#[async_trait]
impl WebSearch for TavilyClient {
    async fn is_configured(&self) -> bool {
        matches!(self.credentials.get().await, Ok(Some(_)))
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchResult>> {
        let response = self.request(query).await?;
        let results: Vec<SearchResult> = response.results.into_iter().map(SearchResult::from).collect();
        info!("Búsqueda web completada con {} resultados", results.len());
        Ok(results)
    }
}
