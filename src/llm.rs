//! Abstracción sobre Rig para la generación de respuestas con distintos
//! proveedores de LLM. De momento se implementa OpenAI; Gemini/Ollama quedan
//! preparados para el futuro.

use std::env;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use rig::providers::openai;
use tokio::sync::OnceCell;
use tracing::{error, info};

use crate::{
    config::{AppConfig, LlmProvider},
    error::{AssistantError, Result},
    models::{Message, Role},
};

/// Colaborador de generación de texto.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Genera la respuesta a la conversación `history` (cuyo último mensaje
    /// es la pregunta del usuario) bajo el prompt de sistema dado.
    async fn generate(&self, history: &[Message], system_prompt: &str) -> Result<String>;

    /// Variante en streaming: secuencia finita de fragmentos cuya
    /// concatenación es igual a la respuesta completa.
    async fn stream(
        &self,
        history: &[Message],
        system_prompt: &str,
    ) -> Result<BoxStream<'static, Result<String>>> {
        let response = self.generate(history, system_prompt).await?;
        Ok(stream::iter(split_chunks(&response).into_iter().map(Ok)).boxed())
    }
}

/// Parte un texto en fragmentos de palabra (cada uno con su espacio final).
pub fn split_chunks(text: &str) -> Vec<String> {
    text.split_inclusive(char::is_whitespace)
        .map(str::to_string)
        .collect()
}

/// Gestor de LLMs para chat.
pub struct LlmManager {
    pub provider: LlmProvider,
    pub chat_model: String,
    pub temperature: f64,
    pub max_tokens: u64,
    client: OnceCell<openai::Client>,
}

impl LlmManager {
    /// Construye el manager a partir de la configuración. El cliente del
    /// proveedor se crea de forma perezosa en la primera generación.
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            provider: cfg.llm_provider.clone(),
            chat_model: cfg.llm_chat_model.clone(),
            temperature: cfg.llm_temperature,
            max_tokens: cfg.llm_max_tokens,
            client: OnceCell::new(),
        }
    }

    async fn openai_client(&self) -> Result<&openai::Client> {
        self.client
            .get_or_try_init(|| async {
                if env::var("OPENAI_API_KEY").is_err() {
                    return Err(AssistantError::Config(
                        "Falta OPENAI_API_KEY en el entorno".to_string(),
                    ));
                }
                info!("Cliente LLM inicializado con {}", self.chat_model);
                Ok(openai::Client::from_env())
            })
            .await
    }

    async fn generate_with_openai(&self, history: &[Message], system_prompt: &str) -> Result<String> {
        use rig::client::CompletionClient as _;
        use rig::completion::Chat;

        let (prompt, previous) = split_prompt(history)?;
        let chat_history = previous.iter().map(to_rig_message).collect::<Vec<_>>();

        let client = self.openai_client().await?;

        // Modelo de chat por defecto si no se ha configurado otro
        let model_name = if self.chat_model.is_empty() {
            "gpt-4o-mini"
        } else {
            self.chat_model.as_str()
        };

        let agent = client
            .agent(model_name)
            .preamble(system_prompt)
            .temperature(self.temperature)
            .max_tokens(self.max_tokens)
            .build();

        agent
            .chat(prompt.content.clone(), chat_history)
            .await
            .map_err(|e| {
                error!("Fallo en la generación del LLM: {e}");
                AssistantError::Generation(e.to_string())
            })
    }
}

#[async_trait]
impl Generator for LlmManager {
    async fn generate(&self, history: &[Message], system_prompt: &str) -> Result<String> {
        match self.provider {
            LlmProvider::OpenAI => self.generate_with_openai(history, system_prompt).await,
            ref other => Err(AssistantError::Generation(format!(
                "Proveedor LLM {:?} aún no implementado para chat",
                other
            ))),
        }
    }
}

/// Separa la conversación en (pregunta actual, turnos previos).
fn split_prompt(history: &[Message]) -> Result<(&Message, &[Message])> {
    match history.split_last() {
        Some((last, previous)) if last.role == Role::User => Ok((last, previous)),
        Some(_) => Err(AssistantError::InvalidInput(
            "El último mensaje de la conversación debe ser del usuario".into(),
        )),
        None => Err(AssistantError::InvalidInput("Conversación vacía".into())),
    }
}

fn to_rig_message(message: &Message) -> rig::completion::Message {
    match message.role {
        Role::User => rig::completion::Message::user(message.content.clone()),
        Role::Assistant => rig::completion::Message::assistant(message.content.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    struct Canned(&'static str);

    #[async_trait]
    impl Generator for Canned {
        async fn generate(&self, _history: &[Message], _system_prompt: &str) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    #[test]
    fn chunks_concatenate_to_original() {
        let text = "Hola,  soy\nGENESIS-1 ";
        assert_eq!(split_chunks(text).concat(), text);
        assert!(split_chunks("").is_empty());
    }

    #[test]
    fn default_stream_matches_generate() {
        let generator = Canned("respuesta en varios trozos");
        let history = vec![Message::user("hola")];

        let chunks: Vec<String> = tokio_test::block_on(async {
            let stream = generator.stream(&history, "sistema").await.unwrap();
            stream.try_collect().await.unwrap()
        });

        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks.concat(), "respuesta en varios trozos");
    }

    #[test]
    fn split_prompt_requires_trailing_user_message() {
        let history = vec![Message::user("uno"), Message::assistant("dos", vec![]), Message::user("tres")];
        let (prompt, previous) = split_prompt(&history).unwrap();
        assert_eq!(prompt.content, "tres");
        assert_eq!(previous.len(), 2);

        assert!(split_prompt(&[]).is_err());
        assert!(split_prompt(&[Message::assistant("x", vec![])]).is_err());
    }

    #[tokio::test]
    async fn unimplemented_provider_fails_with_generation_error() {
        let manager = LlmManager {
            provider: LlmProvider::Gemini,
            chat_model: "gemini-pro".into(),
            temperature: 0.7,
            max_tokens: 512,
            client: OnceCell::new(),
        };

        let err = manager
            .generate(&[Message::user("hola")], "sistema")
            .await
            .unwrap_err();
        assert!(matches!(err, AssistantError::Generation(_)));
    }
}
