use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use tokio::sync::{oneshot, RwLock};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use genesis_assistant::{
    api,
    app_state::{AppState, Status},
    chat::ChatSession,
    config::AppConfig,
    credentials::{CredentialStore, FileCredentialStore},
    embedding,
    llm::LlmManager,
    rag::Assistant,
    vector_store::{JsonFileStore, VectorIndex},
    web_search::TavilyClient,
};

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Cargar .env e inicializar logging
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Cargar configuración
    let cfg = AppConfig::from_env().context("Error al cargar la configuración")?;
    info!(
        "Proveedor LLM: {} ({}), embeddings: {}",
        cfg.llm_provider.as_str(),
        cfg.llm_chat_model,
        cfg.embedding_backend.as_str()
    );

    // 3. Abrir la base de conocimiento persistida
    let store = Arc::new(JsonFileStore::new(cfg.documents_path()));
    let index = VectorIndex::load(store)
        .await
        .context("Error cargando la base de conocimiento")?;
    info!("Base de conocimiento cargada: {} documentos.", index.len());
    let index = Arc::new(RwLock::new(index));

    // 4. Colaboradores: embeddings, LLM y búsqueda web
    let embedder = embedding::from_config(&cfg);
    let generator = Arc::new(LlmManager::from_config(&cfg));
    let credentials: Arc<dyn CredentialStore> =
        Arc::new(FileCredentialStore::new(cfg.credential_path()));
    let web = Arc::new(
        TavilyClient::new(&cfg.search, credentials.clone())
            .context("Error inicializando el cliente de búsqueda web")?,
    );
    if !matches!(credentials.get().await, Ok(Some(_))) {
        warn!("Sin clave de búsqueda web: las consultas en tiempo real irán al LLM.");
    }

    let assistant = Assistant::new(
        index.clone(),
        embedder.clone(),
        generator,
        web,
        cfg.retrieval.clone(),
    );

    // Crear canal para la señal de apagado.
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    // 5. Crear estado compartido de la aplicación
    let app_state = AppState {
        config: cfg.clone(),
        index,
        embedder,
        assistant: Arc::new(assistant),
        credentials,
        chat: ChatSession::new(),
        status: Arc::new(Mutex::new(Status {
            is_busy: false,
            message: "Servidor listo.".to_string(),
            progress: 0.0,
        })),
        shutdown_sender: Arc::new(Mutex::new(Some(shutdown_tx))),
    };

    // 6. Configurar el router de la API
    let app = api::create_router(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    // 7. Iniciar el servidor
    let listener = tokio::net::TcpListener::bind(&cfg.server_addr)
        .await
        .with_context(|| format!("No se pudo escuchar en {}", cfg.server_addr))?;
    info!("🚀 Servidor escuchando en http://{}", cfg.server_addr);

    // Configurar el apagado ordenado.
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::select! {
                _ = shutdown_rx => {}
                _ = tokio::signal::ctrl_c() => {}
            }
            info!("Señal de apagado recibida, iniciando cierre del servidor.");
        })
        .await
        .context("Error en el servidor HTTP")?;

    info!("✅ Servidor cerrado correctamente.");
    Ok(())
}
