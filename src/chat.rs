//! Estado de la conversación: mensajes, indicador de carga, último error y
//! el interruptor de búsqueda web.
//!
//! Una conversación procesa una sola consulta a la vez: mientras hay una en
//! curso, nuevas entradas se rechazan con `AssistantError::Busy`.

use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tracing::error;

use crate::{
    error::{AssistantError, Result},
    models::Message,
    rag::{Assistant, AssistantReply},
};

#[derive(Debug, Clone, Default, Serialize)]
pub struct Conversation {
    pub messages: Vec<Message>,
    pub is_loading: bool,
    pub error: Option<String>,
    pub web_search_enabled: bool,
}

/// Libera `is_loading` si la consulta en curso se abandona (p. ej. el
/// cliente HTTP se desconecta y el futuro se descarta).
struct LoadingGuard {
    state: Arc<Mutex<Conversation>>,
    armed: bool,
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        if self.armed {
            let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            state.is_loading = false;
        }
    }
}

/// Conversación compartida entre peticiones.
#[derive(Clone, Default)]
pub struct ChatSession {
    state: Arc<Mutex<Conversation>>,
}

impl ChatSession {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Conversation> {
        // Un pánico con el lock tomado no deja el estado a medias: se reutiliza.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> Conversation {
        self.lock().clone()
    }

    /// Invierte el interruptor de búsqueda web y devuelve el nuevo valor.
    pub fn toggle_web_search(&self) -> bool {
        let mut state = self.lock();
        state.web_search_enabled = !state.web_search_enabled;
        state.web_search_enabled
    }

    /// Vacía la conversación. No se permite con una consulta en curso.
    pub fn clear(&self) -> Result<()> {
        let mut state = self.lock();
        if state.is_loading {
            return Err(AssistantError::Busy);
        }
        state.messages.clear();
        state.error = None;
        Ok(())
    }

    /// Envía un mensaje del usuario y espera la respuesta del asistente.
    ///
    /// El mensaje del usuario queda registrado aunque la generación falle;
    /// en ese caso no se añade ningún mensaje del asistente y el error queda
    /// guardado en el estado.
    pub async fn submit(&self, assistant: &Assistant, text: &str) -> Result<(Message, AssistantReply)> {
        if text.trim().is_empty() {
            return Err(AssistantError::InvalidInput("El mensaje está vacío".into()));
        }

        let (history, web_search_enabled) = {
            let mut state = self.lock();
            if state.is_loading {
                return Err(AssistantError::Busy);
            }
            state.messages.push(Message::user(text));
            state.is_loading = true;
            state.error = None;
            (state.messages.clone(), state.web_search_enabled)
        };
        let mut loading = LoadingGuard {
            state: self.state.clone(),
            armed: true,
        };

        let result = assistant.answer(&history, web_search_enabled).await;

        let mut state = self.lock();
        state.is_loading = false;
        loading.armed = false;
        match result {
            Ok(reply) => {
                let message = Message::assistant(reply.content.clone(), reply.sources.clone());
                state.messages.push(message.clone());
                Ok((message, reply))
            }
            Err(e) => {
                error!("Error procesando la consulta: {e}");
                state.error = Some(e.to_string());
                Err(e)
            }
        }
    }
}
