//! Response facade: turns a deferred prompt into the final answer

use super::router::NodeId;
use crate::i18n::{Locale, Text};
use crate::llm::provider::truncate;
use crate::llm::{CompletionFacade, TokenStream, ERROR_PREFIX};
use crate::{log_info, log_warn};
use futures::stream::{self, StreamExt};
use std::sync::Arc;

/// Outcome of a non-streaming generation
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedText {
    pub text: String,
    pub success: bool,
    pub error: Option<String>,
}

/// Generate the whole answer at once.
///
/// A failed completion still yields displayable text: the localized apology,
/// with `success = false` and the raw failure in `error`.
pub async fn generate_text(
    llm: &dyn CompletionFacade,
    prompt: &str,
    node: NodeId,
    locale: Locale,
) -> GeneratedText {
    let full_response = llm.complete_sync(prompt).await;

    if full_response.contains(ERROR_PREFIX) || full_response.trim().is_empty() {
        let error = format!(
            "Invalid response from model (non-stream) for {}: {}",
            node.label(),
            full_response
        );
        log_warn!("{}", error);
        return GeneratedText {
            text: Text::GenerationFailed.in_locale(locale).to_string(),
            success: false,
            error: Some(error),
        };
    }

    GeneratedText {
        text: full_response.trim().to_string(),
        success: true,
        error: None,
    }
}

/// Stream the answer for a deferred prompt.
///
/// The model is not called until the returned stream is first polled.
pub fn stream_text(llm: Arc<dyn CompletionFacade>, prompt: String, node: NodeId) -> TokenStream {
    Box::pin(
        stream::once(async move {
            log_info!(
                "{}: initiating completion stream with prompt: {}",
                node.label(),
                truncate(&prompt, 100)
            );
            llm.complete_stream(&prompt).await
        })
        .flatten(),
    )
}
