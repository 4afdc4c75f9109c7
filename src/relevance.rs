//! Extracción de palabras clave y puntuación de relevancia por solapamiento
//! de palabras. Es una señal gruesa, independiente de la similitud
//! semántica del índice vectorial.

use std::collections::HashSet;

use crate::models::Document;

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
    "from", "is", "are", "was", "were", "be", "been", "being", "over", "under",
];

/// Palabras de la consulta con más de 3 caracteres que no son stop-words.
/// Conserva el orden y los duplicados.
pub fn extract_keywords(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split_whitespace()
        .filter(|word| word.chars().count() > 3 && !STOP_WORDS.contains(word))
        .map(str::to_string)
        .collect()
}

/// Fracción de palabras de la consulta (con repetición) presentes en el
/// documento, en [0, 1]. Una consulta sin palabras puntúa 0.
pub fn calculate_query_relevance(query: &str, document: &str) -> f32 {
    let query = query.to_lowercase();
    let document = document.to_lowercase();

    let query_words: Vec<&str> = query.split_whitespace().collect();
    if query_words.is_empty() {
        return 0.0;
    }

    let document_words: HashSet<&str> = document.split_whitespace().collect();
    let matches = query_words
        .iter()
        .filter(|word| document_words.contains(*word))
        .count();

    (matches as f32 / query_words.len() as f32).min(1.0)
}

/// Busca documentos por palabras clave de la consulta, ordenados de mayor a
/// menor relevancia. Los documentos sin ninguna coincidencia se descartan.
pub fn keyword_search<'a>(query: &str, documents: &'a [Document]) -> Vec<(&'a Document, f32)> {
    let keywords = extract_keywords(query);
    if keywords.is_empty() {
        return Vec::new();
    }
    let keyword_query = keywords.join(" ");

    let mut scored: Vec<(&Document, f32)> = documents
        .iter()
        .map(|doc| (doc, calculate_query_relevance(&keyword_query, &doc.content)))
        .filter(|(_, score)| *score > 0.0)
        .collect();

    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored
}
