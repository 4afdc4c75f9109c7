//! Ingesta de documentos en la base de conocimiento: subida individual y
//! importación recursiva de un directorio del sistema de archivos.

use std::{
    fs,
    path::Path,
    sync::{Arc, Mutex},
};

use anyhow::{anyhow, Result};
use mime_guess::MimeGuess;
use tokio::sync::RwLock;
use tracing::{error, info, warn};
use walkdir::WalkDir;

use crate::{
    app_state::Status,
    embedding::Embedder,
    error::AssistantError,
    models::{Document, EmbeddingStatus},
    vector_store::VectorIndex,
};

const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "rs", "toml", "log", "html", "css", "js", "json", "csv",
];

/// Resumen de los resultados de una importación.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct IngestionSummary {
    pub files_scanned: u32,
    pub files_ingested: u32,
    pub files_skipped: u32,
    pub files_failed: u32,
}

impl std::fmt::Display for IngestionSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Resumen: {} ficheros escaneados, {} ingeridos, {} omitidos, {} con embedding fallido.",
            self.files_scanned, self.files_ingested, self.files_skipped, self.files_failed
        )
    }
}

/// Sube un documento: lo registra como `pending`, calcula su embedding y lo
/// deja como `completed` o `failed`. Devuelve el documento resultante, o
/// `None` si se borró del índice mientras se calculaba el embedding.
///
/// El lock del índice sólo se toma para cada mutación, nunca durante el
/// cálculo del embedding.
pub async fn upload_document(
    index: &RwLock<VectorIndex>,
    embedder: &dyn Embedder,
    name: &str,
    content: &str,
) -> crate::error::Result<Option<Document>> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AssistantError::InvalidInput("El documento necesita un nombre".into()));
    }
    if content.trim().is_empty() {
        return Err(AssistantError::InvalidInput(format!("El documento '{name}' está vacío")));
    }

    let document = Document::new(name, content);
    index.write().await.register(document.clone()).await?;

    let embedding = embedder.embed_document(&document.name, &document.content).await;

    let mut index = index.write().await;
    let kept = match embedding {
        Ok(embedding) => index.complete(&document.id, embedding).await?,
        Err(e) => {
            error!("Fallo calculando el embedding de '{}': {e}", document.name);
            if index.get(&document.id).is_some() {
                index.mark_failed(&document.id).await?;
                true
            } else {
                false
            }
        }
    };

    if !kept {
        info!("'{}' se borró durante el cálculo del embedding; se descarta", document.name);
        return Ok(None);
    }
    Ok(index.get(&document.id).cloned())
}

/// Recorre recursivamente un directorio e ingiere los ficheros de texto y
/// PDF que encuentre, actualizando el progreso en `status_arc`.
pub async fn ingest_directory(
    index: &RwLock<VectorIndex>,
    embedder: &dyn Embedder,
    root: &Path,
    status_arc: Arc<Mutex<Status>>,
) -> Result<IngestionSummary> {
    if !root.is_dir() {
        return Err(anyhow!("La ruta no es un directorio: {}", root.display()));
    }

    let mut summary = IngestionSummary::default();
    let file_entries: Vec<_> = WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .collect();

    let total_files = file_entries.len();

    for (i, entry) in file_entries.iter().enumerate() {
        summary.files_scanned += 1;
        let path = entry.path();
        let filename = path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string_lossy().to_string());
        let progress = (i + 1) as f32 / total_files as f32;

        set_status(
            &status_arc,
            format!("[{}/{}] Procesando: {}...", i + 1, total_files, filename),
            progress,
        );

        let Some(text) = read_text(path) else {
            summary.files_skipped += 1;
            set_status(
                &status_arc,
                format!("[{}/{}] Omitido: {}", i + 1, total_files, filename),
                progress,
            );
            continue;
        };

        match upload_document(index, embedder, &filename, &text).await {
            Ok(Some(doc)) if doc.embedding_status == EmbeddingStatus::Completed => {
                summary.files_ingested += 1;
            }
            Ok(Some(_)) => {
                summary.files_failed += 1;
            }
            Ok(None) => {
                summary.files_skipped += 1;
            }
            Err(AssistantError::InvalidInput(reason)) => {
                warn!("Saltando {}: {reason}", path.display());
                summary.files_skipped += 1;
            }
            Err(err) => {
                error!("Error ingiriendo {}: {err}", path.display());
                set_status(
                    &status_arc,
                    format!("ERROR en {}: {}", path.display(), err),
                    progress,
                );
                return Err(err.into());
            }
        }
    }

    info!("Importación de {} completada. {}", root.display(), summary);
    Ok(summary)
}

/// Extrae el texto de un fichero soportado. `None` si se debe omitir.
fn read_text(path: &Path) -> Option<String> {
    let extension = path
        .extension()
        .and_then(std::ffi::OsStr::to_str)
        .unwrap_or("")
        .to_lowercase();

    if extension == "pdf" {
        return match pdf_extract::extract_text(path) {
            Ok(content) => Some(content),
            Err(e) => {
                warn!("No se pudo extraer texto del PDF {}: {}. Saltando fichero.", path.display(), e);
                None
            }
        };
    }

    if !TEXT_EXTENSIONS.contains(&extension.as_str()) {
        let mime = MimeGuess::from_path(path)
            .first()
            .map(|m| m.to_string())
            .unwrap_or_else(|| "desconocido".to_string());
        info!("Saltando fichero no soportado ({}): {}", mime, path.display());
        return None;
    }

    match fs::read_to_string(path) {
        Ok(content) => Some(content),
        Err(_) => {
            warn!("Saltando fichero no-texto o no-UTF8: {}", path.display());
            None
        }
    }
}

fn set_status(status_arc: &Mutex<Status>, message: String, progress: f32) {
    let mut status = status_arc.lock().unwrap_or_else(|p| p.into_inner());
    status.message = message;
    status.progress = progress;
}
