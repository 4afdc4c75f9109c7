//! Índice vectorial local de la base de conocimiento.
//!
//! API pública:
//!   - `cosine_similarity(&[f32], &[f32])`
//!   - `VectorIndex::load(store)` y sus operaciones de mutación/búsqueda.
//!   - `DocumentStore` / `JsonFileStore` para la persistencia.
//!
//! Las mutaciones toman `&mut self`: quien comparta el índice debe
//! serializarlas (p. ej. con un `RwLock`). Cada mutación persiste el
//! conjunto completo de documentos antes de aplicarse en memoria.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::{fs, io::AsyncWriteExt};
use tracing::{debug, info};

use crate::{
    error::{AssistantError, Result},
    models::{Document, EmbeddingStatus, IndexStats, VectorSearchResult},
};

/// Similitud coseno `dot(a,b) / (|a|·|b|)`.
///
/// Devuelve 0 si alguno de los vectores tiene norma 0. Vectores de distinta
/// longitud son un error de contrato.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(AssistantError::DimensionMismatch {
            left: a.len(),
            right: b.len(),
        });
    }

    let mut dot = 0.0_f64;
    let mut norm_a = 0.0_f64;
    let mut norm_b = 0.0_f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }

    Ok((dot / (norm_a.sqrt() * norm_b.sqrt())) as f32)
}

/// Almacén duradero del conjunto de documentos.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn load(&self) -> Result<Vec<Document>>;

    /// Sustituye el contenido persistido por `documents` de forma atómica.
    async fn save(&self, documents: &[Document]) -> Result<()>;
}

#[derive(Serialize, Deserialize)]
struct PersistedDocuments {
    version: u32,
    documents: Vec<Document>,
}

/// Persistencia en un fichero JSON, escrito mediante fichero temporal +
/// `rename` para que nunca se observe una escritura parcial.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "documents.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl DocumentStore for JsonFileStore {
    async fn load(&self) -> Result<Vec<Document>> {
        let raw = match fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let persisted: PersistedDocuments = serde_json::from_slice(&raw).map_err(|e| {
            AssistantError::Storage(format!(
                "Fichero de documentos corrupto ({}): {e}",
                self.path.display()
            ))
        })?;
        Ok(persisted.documents)
    }

    async fn save(&self, documents: &[Document]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let payload = serde_json::to_vec(&PersistedDocuments {
            version: 1,
            documents: documents.to_vec(),
        })?;

        let tmp = self.temp_path();
        let mut file = fs::File::create(&tmp).await?;
        file.write_all(&payload).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&tmp, &self.path).await?;
        debug!("Persistidos {} documentos en {}", documents.len(), self.path.display());
        Ok(())
    }
}

/// Índice de documentos con embeddings y búsqueda por similitud coseno.
pub struct VectorIndex {
    store: Arc<dyn DocumentStore>,
    // Orden de inserción: desempata resultados con igual similitud.
    documents: Vec<Document>,
}

impl VectorIndex {
    /// Inicializa el índice a partir del estado persistido.
    pub async fn load(store: Arc<dyn DocumentStore>) -> Result<Self> {
        let documents = store.load().await?;
        info!("Índice vectorial inicializado con {} documentos", documents.len());
        Ok(Self { store, documents })
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn has_documents(&self) -> bool {
        !self.is_empty()
    }

    pub fn all(&self) -> &[Document] {
        &self.documents
    }

    pub fn get(&self, id: &str) -> Option<&Document> {
        self.documents.iter().find(|d| d.id == id)
    }

    /// Registra un documento recién subido en estado `pending`.
    pub async fn register(&mut self, mut document: Document) -> Result<()> {
        document.embedding_status = EmbeddingStatus::Pending;
        document.embedding = None;
        self.upsert(document).await
    }

    /// Asocia el embedding a un documento, lo marca `completed` y persiste.
    /// Sobrescribe cualquier entrada previa con el mismo id.
    pub async fn store(&mut self, mut document: Document, embedding: Vec<f32>) -> Result<()> {
        document.embedding = Some(embedding);
        document.embedding_status = EmbeddingStatus::Completed;
        let name = document.name.clone();
        self.upsert(document).await?;
        info!("Documento almacenado en el índice: {name}");
        Ok(())
    }

    /// Completa un documento registrado con su embedding. Devuelve `false`
    /// (sin tocar el índice) si el documento ya no está, p. ej. porque se
    /// borró mientras se calculaba el embedding.
    pub async fn complete(&mut self, id: &str, embedding: Vec<f32>) -> Result<bool> {
        let Some(mut document) = self.get(id).cloned() else {
            return Ok(false);
        };
        document.embedding = Some(embedding);
        document.embedding_status = EmbeddingStatus::Completed;
        self.upsert(document).await?;
        Ok(true)
    }

    /// Marca como fallido el embedding de un documento registrado.
    pub async fn mark_failed(&mut self, id: &str) -> Result<()> {
        let mut document = self
            .get(id)
            .cloned()
            .ok_or_else(|| AssistantError::NotFound(id.to_string()))?;
        document.embedding_status = EmbeddingStatus::Failed;
        document.embedding = None;
        self.upsert(document).await
    }

    /// Elimina un documento. Devuelve `false` si el id no existía.
    pub async fn delete(&mut self, id: &str) -> Result<bool> {
        let Some(position) = self.documents.iter().position(|d| d.id == id) else {
            return Ok(false);
        };

        let mut next = self.documents.clone();
        next.remove(position);
        self.commit(next).await?;
        info!("Documento eliminado del índice: {id}");
        Ok(true)
    }

    pub async fn clear_all(&mut self) -> Result<()> {
        self.commit(Vec::new()).await?;
        info!("Base de conocimiento vaciada");
        Ok(())
    }

    /// Busca los `top_k` documentos más similares a `query_embedding` con
    /// similitud `>= threshold`, ordenados de mayor a menor. Los documentos
    /// sin embedding se ignoran. A igual similitud se mantiene el orden de
    /// inserción.
    pub fn search_similar(
        &self,
        query_embedding: &[f32],
        top_k: usize,
        threshold: f32,
    ) -> Result<Vec<VectorSearchResult>> {
        let mut results = Vec::new();

        for document in &self.documents {
            let Some(embedding) = document.embedding.as_deref() else {
                continue;
            };

            let similarity = cosine_similarity(query_embedding, embedding)?;
            if similarity >= threshold {
                results.push(VectorSearchResult {
                    document: document.clone(),
                    similarity,
                });
            }
        }

        results.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        results.truncate(top_k);
        Ok(results)
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            document_count: self.documents.len(),
            total_size_bytes: self.documents.iter().map(|d| d.size_bytes).sum(),
            embedding_dimension: self
                .documents
                .iter()
                .find_map(|d| d.embedding.as_ref().map(Vec::len)),
        }
    }

    async fn upsert(&mut self, document: Document) -> Result<()> {
        let mut next = self.documents.clone();
        match next.iter_mut().find(|d| d.id == document.id) {
            Some(existing) => *existing = document,
            None => next.push(document),
        }
        self.commit(next).await
    }

    // Persiste primero; si falla, memoria y disco quedan en el estado previo.
    async fn commit(&mut self, next: Vec<Document>) -> Result<()> {
        self.store.save(&next).await?;
        self.documents = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Almacén en memoria que puede forzarse a fallar.
    #[derive(Default)]
    struct MemoryStore {
        saved: Mutex<Vec<Document>>,
        fail: Mutex<bool>,
    }

    #[async_trait]
    impl DocumentStore for MemoryStore {
        async fn load(&self) -> Result<Vec<Document>> {
            Ok(self.saved.lock().unwrap().clone())
        }

        async fn save(&self, documents: &[Document]) -> Result<()> {
            if *self.fail.lock().unwrap() {
                return Err(AssistantError::Storage("disco lleno".into()));
            }
            *self.saved.lock().unwrap() = documents.to_vec();
            Ok(())
        }
    }

    fn unit(v: &[f32]) -> Vec<f32> {
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        v.iter().map(|x| x / norm).collect()
    }

    async fn index_with(store: Arc<MemoryStore>) -> VectorIndex {
        VectorIndex::load(store).await.unwrap()
    }

    #[test]
    fn cosine_of_identical_unit_vectors_is_one() {
        let a = unit(&[0.3, 0.4, 0.5]);
        let sim = cosine_similarity(&a, &a).unwrap();
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_of_orthogonal_vectors_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).unwrap(), 0.0);
    }

    #[test]
    fn cosine_is_symmetric() {
        let a = [0.1, 0.7, 0.2, 0.9];
        let b = [0.5, 0.3, 0.8, 0.1];
        assert_eq!(
            cosine_similarity(&a, &b).unwrap(),
            cosine_similarity(&b, &a).unwrap()
        );
    }

    #[test]
    fn cosine_with_zero_vector_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]).unwrap(), 0.0);
    }

    #[test]
    fn cosine_rejects_dimension_mismatch() {
        let err = cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]).unwrap_err();
        assert!(matches!(
            err,
            AssistantError::DimensionMismatch { left: 2, right: 3 }
        ));
    }

    #[tokio::test]
    async fn search_filters_sorts_and_truncates() {
        let store = Arc::new(MemoryStore::default());
        let mut index = index_with(store).await;

        let docs = [
            ("lejos", unit(&[0.0, 1.0])),
            ("cerca", unit(&[1.0, 0.1])),
            ("medio", unit(&[1.0, 1.0])),
            ("exacto", unit(&[1.0, 0.0])),
        ];
        for (name, emb) in docs {
            index.store(Document::new(name, name), emb).await.unwrap();
        }
        // Sin embedding: se ignora.
        index.register(Document::new("pendiente", "x")).await.unwrap();

        let results = index.search_similar(&unit(&[1.0, 0.0]), 2, 0.5).unwrap();
        let names: Vec<&str> = results.iter().map(|r| r.document.name.as_str()).collect();
        assert_eq!(names, vec!["exacto", "cerca"]);

        let all = index.search_similar(&unit(&[1.0, 0.0]), 10, 0.5).unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0].similarity >= w[1].similarity));
        assert!(all.iter().all(|r| r.similarity >= 0.5));

        assert!(index.search_similar(&unit(&[1.0, 0.0]), 0, 0.0).unwrap().is_empty());
    }

    #[tokio::test]
    async fn search_ties_keep_insertion_order() {
        let store = Arc::new(MemoryStore::default());
        let mut index = index_with(store).await;
        for name in ["primero", "segundo", "tercero"] {
            index.store(Document::new(name, name), vec![1.0, 0.0]).await.unwrap();
        }

        let results = index.search_similar(&[1.0, 0.0], 3, 0.0).unwrap();
        let names: Vec<&str> = results.iter().map(|r| r.document.name.as_str()).collect();
        assert_eq!(names, vec!["primero", "segundo", "tercero"]);
    }

    #[tokio::test]
    async fn search_propagates_dimension_mismatch() {
        let store = Arc::new(MemoryStore::default());
        let mut index = index_with(store).await;
        index.store(Document::new("a", "a"), vec![1.0, 0.0, 0.0]).await.unwrap();

        assert!(matches!(
            index.search_similar(&[1.0, 0.0], 3, 0.0),
            Err(AssistantError::DimensionMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn store_overwrites_same_id_in_place() {
        let store = Arc::new(MemoryStore::default());
        let mut index = index_with(store.clone()).await;

        let doc = Document::new("a", "v1");
        index.register(doc.clone()).await.unwrap();
        index.store(Document::new("b", "b"), vec![0.0, 1.0]).await.unwrap();
        index.store(doc.clone(), vec![1.0, 0.0]).await.unwrap();

        assert_eq!(index.len(), 2);
        assert_eq!(index.all()[0].id, doc.id);
        assert_eq!(index.all()[0].embedding_status, EmbeddingStatus::Completed);
        assert_eq!(store.saved.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn mark_failed_transitions_status() {
        let store = Arc::new(MemoryStore::default());
        let mut index = index_with(store).await;
        let doc = Document::new("a", "a");
        index.register(doc.clone()).await.unwrap();

        index.mark_failed(&doc.id).await.unwrap();
        assert_eq!(index.get(&doc.id).unwrap().embedding_status, EmbeddingStatus::Failed);

        assert!(matches!(
            index.mark_failed("desconocido").await,
            Err(AssistantError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn complete_only_touches_registered_documents() {
        let store = Arc::new(MemoryStore::default());
        let mut index = index_with(store.clone()).await;
        let doc = Document::new("a", "a");
        index.register(doc.clone()).await.unwrap();

        assert!(index.complete(&doc.id, vec![1.0, 0.0]).await.unwrap());
        let stored = index.get(&doc.id).unwrap();
        assert_eq!(stored.embedding_status, EmbeddingStatus::Completed);
        assert_eq!(stored.embedding.as_deref(), Some(&[1.0, 0.0][..]));

        index.delete(&doc.id).await.unwrap();
        assert!(!index.complete(&doc.id, vec![1.0, 0.0]).await.unwrap());
        assert!(index.is_empty());
        assert!(store.saved.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_and_clear_persist() {
        let store = Arc::new(MemoryStore::default());
        let mut index = index_with(store.clone()).await;
        let a = Document::new("a", "aaaa");
        let b = Document::new("b", "bb");
        index.store(a.clone(), vec![1.0]).await.unwrap();
        index.store(b.clone(), vec![1.0]).await.unwrap();

        assert_eq!(
            index.stats(),
            IndexStats {
                document_count: 2,
                total_size_bytes: 6,
                embedding_dimension: Some(1),
            }
        );

        assert!(index.delete(&a.id).await.unwrap());
        assert!(!index.delete(&a.id).await.unwrap());
        assert_eq!(store.saved.lock().unwrap().len(), 1);

        index.clear_all().await.unwrap();
        assert!(index.is_empty());
        assert!(store.saved.lock().unwrap().is_empty());
        assert_eq!(index.stats(), IndexStats::default());
    }

    #[tokio::test]
    async fn failed_persist_leaves_state_untouched() {
        let store = Arc::new(MemoryStore::default());
        let mut index = index_with(store.clone()).await;
        index.store(Document::new("a", "a"), vec![1.0]).await.unwrap();

        *store.fail.lock().unwrap() = true;
        assert!(index.store(Document::new("b", "b"), vec![1.0]).await.is_err());
        assert!(index.clear_all().await.is_err());

        assert_eq!(index.len(), 1);
        assert_eq!(store.saved.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn json_store_round_trip_and_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested").join("documents.json"));

        assert!(store.load().await.unwrap().is_empty());

        let mut doc = Document::new("a.md", "contenido");
        doc.embedding = Some(vec![0.1, 0.2, 0.3]);
        doc.embedding_status = EmbeddingStatus::Completed;
        store.save(std::slice::from_ref(&doc)).await.unwrap();

        assert_eq!(store.load().await.unwrap(), vec![doc]);
        assert!(!store.temp_path().exists());
    }

    #[tokio::test]
    async fn json_store_reports_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("documents.json");
        std::fs::write(&path, b"{ not json").unwrap();

        let err = JsonFileStore::new(path).load().await.unwrap_err();
        assert!(matches!(err, AssistantError::Storage(_)));
    }
}
