//! Enrutado de consultas: decide si una pregunta se responde con los
//! documentos locales (RAG), con búsqueda web o sólo con el LLM.
//!
//! Todas las funciones son puras y síncronas.

use std::sync::LazyLock;

use regex::{Regex, RegexSet};
use serde::{Deserialize, Serialize};

const REAL_TIME_KEYWORDS: &[&str] = &[
    "today",
    "now",
    "current",
    "latest",
    "news",
    "weather",
    "recent",
    "breaking",
    "happening",
    "live",
    "update",
    "today's",
    "this week",
    "this month",
    "this year",
    "right now",
];

static REAL_TIME_PATTERNS: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"(?i)what.*happening",
        r"(?i)what.*going on",
        r"(?i)latest.*news",
        r"(?i)current.*weather",
        r"(?i)today.*weather",
        r"(?i)stock.*price",
        r"(?i)crypto.*price",
        r"(?i)exchange.*rate",
        r"(?i)sports.*score",
        r"(?i)game.*result",
    ])
    .expect("los patrones de tiempo real son válidos")
});

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("regex de espacios válida"));

/// Fuente de contexto elegida para una consulta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Reservado. `route_query` nunca lo produce.
    Local,
    Rag,
    Web,
    Llm,
}

/// Decisión del router, con un motivo legible y una pista de contexto.
/// Ambos textos son informativos: nada aguas abajo depende de ellos.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingDecision {
    #[serde(rename = "type")]
    pub kind: SourceKind,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl RoutingDecision {
    fn new(kind: SourceKind, reason: &str, context: &str) -> Self {
        Self {
            kind,
            reason: reason.to_string(),
            context: Some(context.to_string()),
        }
    }
}

/// Detecta si la consulta pregunta por información en tiempo real.
pub fn is_real_time_query(query: &str) -> bool {
    let lower = query.to_lowercase();

    let has_keyword = REAL_TIME_KEYWORDS.iter().any(|kw| lower.contains(kw));

    has_keyword || REAL_TIME_PATTERNS.is_match(query)
}

/// Negación lógica de [`is_real_time_query`].
pub fn is_general_query(query: &str) -> bool {
    !is_real_time_query(query)
}

/// Decide la fuente para responder una consulta.
///
/// El orden de las reglas es estricto (gana la primera):
///   1. Con documentos locales siempre se consulta la base de conocimiento;
///      la relevancia la decide después el umbral de la búsqueda vectorial.
///   2. Consulta de tiempo real con búsqueda web activa → web.
///   3. En cualquier otro caso, sólo el LLM local.
pub fn route_query(query: &str, has_local_documents: bool, web_search_enabled: bool) -> RoutingDecision {
    if has_local_documents {
        return RoutingDecision::new(
            SourceKind::Rag,
            "User has uploaded documents. Performing semantic search first.",
            "Will search local documents and use RAG if relevant content found.",
        );
    }

    if web_search_enabled && is_real_time_query(query) {
        return RoutingDecision::new(
            SourceKind::Web,
            "Query appears to be about real-time information. Using web search.",
            "Will fetch latest web results and synthesize with LLM.",
        );
    }

    RoutingDecision::new(
        SourceKind::Llm,
        "Using local LLM for general knowledge question.",
        "Query will be processed by the language model without external context.",
    )
}

/// Versión compacta de la consulta para trazas (espacios colapsados, recortada).
pub fn query_preview(query: &str) -> String {
    let collapsed = WHITESPACE.replace_all(query.trim(), " ");
    match collapsed.char_indices().nth(80) {
        Some((idx, _)) => format!("{}…", &collapsed[..idx]),
        None => collapsed.into_owned(),
    }
}
