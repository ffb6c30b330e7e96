//! Text-completion facade used by every node of the agent graph
//!
//! Nodes never see `ProviderError`: the synchronous call folds failures into
//! an `ERROR_`-prefixed sentinel and the streaming call folds them into a
//! single apologetic fragment.

use super::provider::{truncate, ModelProvider, ProviderError};
use crate::{log_error, log_info};
use async_trait::async_trait;
use futures::future;
use futures::stream::{self, Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;

/// Prefix shared by every completion-failure sentinel
pub const ERROR_PREFIX: &str = "ERROR_";

/// Lazy, single-pass sequence of answer fragments
pub type TokenStream = Pin<Box<dyn Stream<Item = String> + Send>>;

/// Whether a synchronous completion must be treated as a failure
pub fn is_failed_completion(text: &str) -> bool {
    text.starts_with(ERROR_PREFIX) || text.trim().is_empty()
}

#[async_trait]
pub trait CompletionFacade: Send + Sync {
    /// Full completion. Never fails: errors come back as `ERROR_...` sentinels.
    async fn complete_sync(&self, prompt: &str) -> String;

    /// Streaming completion. Never fails: errors come back as one fragment.
    async fn complete_stream(&self, prompt: &str) -> TokenStream;
}

/// Wraps a provider as a `CompletionFacade`
pub struct ProviderCompletion {
    provider: Arc<dyn ModelProvider>,
}

impl ProviderCompletion {
    pub fn new(provider: Arc<dyn ModelProvider>) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &dyn ModelProvider {
        self.provider.as_ref()
    }
}

fn stream_failure(error: &ProviderError) -> String {
    format!("Error generating content with the model (stream): {}", error)
}

#[async_trait]
impl CompletionFacade for ProviderCompletion {
    async fn complete_sync(&self, prompt: &str) -> String {
        match self.provider.generate(prompt).await {
            Ok(response) if response.content.is_empty() => {
                log_error!(
                    "[{}] No text extracted from completion. Prompt: '{}'",
                    self.provider.model_name(),
                    truncate(prompt, 100)
                );
                format!("{}NO_TEXT_EXTRACTED", ERROR_PREFIX)
            }
            Ok(response) => response.content,
            Err(e) => {
                log_error!(
                    "[{}] Completion call failed (prompt: '{}'): {}",
                    self.provider.model_name(),
                    truncate(prompt, 100),
                    e
                );
                format!("{}MODEL_CALL_FAILED: {}", ERROR_PREFIX, e)
            }
        }
    }

    async fn complete_stream(&self, prompt: &str) -> TokenStream {
        log_info!(
            "[{}] Starting completion stream. Prompt: '{}'",
            self.provider.model_name(),
            truncate(prompt, 100)
        );

        let fragments = match self.provider.generate_stream(prompt).await {
            Ok(fragments) => fragments,
            Err(e) => {
                log_error!("Could not start completion stream: {}", e);
                return Box::pin(stream::once(future::ready(stream_failure(&e))));
            }
        };

        // A transport error mid-stream becomes the last fragment
        Box::pin(fragments.scan(false, |failed, item| {
            if *failed {
                return future::ready(None);
            }
            let fragment = match item {
                Ok(text) => text,
                Err(e) => {
                    log_error!("Completion stream interrupted: {}", e);
                    *failed = true;
                    stream_failure(&e)
                }
            };
            future::ready(Some(fragment))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelProvider as ProviderType;
    use crate::llm::provider::{ProviderResponse, ProviderStream};

    /// Provider that fails or answers with a fixed script
    struct FixedProvider {
        answer: Result<String, ()>,
        fragments: Vec<Result<String, ()>>,
    }

    #[async_trait]
    impl ModelProvider for FixedProvider {
        async fn generate(&self, _prompt: &str) -> Result<ProviderResponse, ProviderError> {
            match &self.answer {
                Ok(content) => Ok(ProviderResponse {
                    content: content.clone(),
                    model: "fixed".to_string(),
                    finish_reason: None,
                }),
                Err(()) => Err(ProviderError::ConnectionError("refused".to_string())),
            }
        }

        async fn generate_stream(&self, _prompt: &str) -> Result<ProviderStream, ProviderError> {
            if self.fragments.is_empty() {
                return Err(ProviderError::Timeout);
            }
            let items: Vec<Result<String, ProviderError>> = self
                .fragments
                .iter()
                .map(|f| f.clone().map_err(|_| ProviderError::InvalidResponse("cut".to_string())))
                .collect();
            Ok(Box::pin(stream::iter(items)))
        }

        async fn validate_connection(&self) -> Result<(), ProviderError> {
            Ok(())
        }

        fn model_name(&self) -> &str {
            "fixed"
        }

        fn provider_type(&self) -> ProviderType {
            ProviderType::Ollama
        }
    }

    fn facade(answer: Result<&str, ()>, fragments: Vec<Result<&str, ()>>) -> ProviderCompletion {
        ProviderCompletion::new(Arc::new(FixedProvider {
            answer: answer.map(str::to_string),
            fragments: fragments
                .into_iter()
                .map(|f| f.map(str::to_string))
                .collect(),
        }))
    }

    #[tokio::test]
    async fn test_sync_failure_becomes_sentinel() {
        let text = facade(Err(()), vec![]).complete_sync("hola").await;
        assert!(text.starts_with("ERROR_MODEL_CALL_FAILED: "));
        assert!(is_failed_completion(&text));

        let text = facade(Ok(""), vec![]).complete_sync("hola").await;
        assert_eq!(text, "ERROR_NO_TEXT_EXTRACTED");
    }

    #[tokio::test]
    async fn test_sync_success_is_passed_through() {
        let text = facade(Ok(" 123456 "), vec![]).complete_sync("hola").await;
        assert_eq!(text, " 123456 ");
        assert!(!is_failed_completion(&text));
    }

    #[tokio::test]
    async fn test_stream_start_failure_yields_single_fragment() {
        let fragments: Vec<String> = facade(Ok(""), vec![])
            .complete_stream("hola")
            .await
            .collect()
            .await;
        assert_eq!(fragments.len(), 1);
        assert!(fragments[0].starts_with("Error generating content with the model (stream): "));
    }

    #[tokio::test]
    async fn test_stream_error_ends_the_sequence() {
        let fragments: Vec<String> = facade(Ok(""), vec![Ok("Hola"), Err(()), Ok("nunca")])
            .complete_stream("hola")
            .await
            .collect()
            .await;
        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0], "Hola");
        assert!(fragments[1].contains("(stream)"));
    }
}
