//! Taxonomía de errores del núcleo de enrutado y recuperación.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AssistantError>;

#[derive(Error, Debug)]
pub enum AssistantError {
    #[error("Error de configuración: {0}")]
    Config(String),

    #[error("API key de búsqueda web no configurada. Añádela en Ajustes.")]
    MissingCredential,

    #[error("Entrada no válida: {0}")]
    InvalidInput(String),

    #[error("Ya hay una consulta en curso en esta conversación")]
    Busy,

    #[error("Documento no encontrado: {0}")]
    NotFound(String),

    /// Violación de contrato: nunca se trunca un vector para poder compararlo.
    #[error("Las dimensiones de los vectores no coinciden ({left} vs {right})")]
    DimensionMismatch { left: usize, right: usize },

    #[error("Error de embedding: {0}")]
    Embedding(String),

    #[error("Error de almacenamiento: {0}")]
    Storage(String),

    #[error("Búsqueda web fallida: {0}")]
    WebSearch(String),

    #[error("Error de generación: {0}")]
    Generation(String),

    #[error("Error de E/S: {0}")]
    Io(#[from] std::io::Error),

    #[error("Error de serialización: {0}")]
    Json(#[from] serde_json::Error),
}

impl AssistantError {
    /// Indica si el error debe mostrarse al usuario en lugar de
    /// degradarse silenciosamente.
    pub fn is_user_visible(&self) -> bool {
        matches!(
            self,
            Self::Config(_)
                | Self::MissingCredential
                | Self::InvalidInput(_)
                | Self::Busy
                | Self::NotFound(_)
                | Self::WebSearch(_)
                | Self::Generation(_)
        )
    }
}
