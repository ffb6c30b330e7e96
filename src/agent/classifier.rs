//! Intent classifier: one model call mapping the query to a fixed label

use super::prompts::{PromptKind, PromptLibrary, HISTORY, QUERY};
use super::router::NodeId;
use super::state::{ExecutionState, Intent};
use crate::llm::CompletionFacade;
use crate::{log_info, log_warn};

/// Map raw model output to an intent.
///
/// Anything that is not exactly one of the five labels after trimming
/// (including sentinels and blank output) becomes `GeneralConversation`.
pub fn classify_label(raw: &str) -> Intent {
    let label = raw.trim();
    Intent::parse(label).unwrap_or_else(|| {
        log_warn!(
            "Invalid intent '{}', defaulting to {}",
            label,
            Intent::GeneralConversation
        );
        Intent::GeneralConversation
    })
}

/// `determine_intent` node
pub async fn determine_intent(
    llm: &dyn CompletionFacade,
    prompts: &PromptLibrary,
    state: &mut ExecutionState,
) {
    let node = NodeId::DetermineIntent;
    log_info!("Node: {}, query: {}", node.label(), state.original_query);

    let prompt = prompts.render(
        PromptKind::Orchestrator,
        &[
            (HISTORY, state.formatted_chat_history.as_str()),
            (QUERY, state.original_query.as_str()),
        ],
    );
    let intent = classify_label(&llm.complete_sync(&prompt).await);

    log_info!("Intent determined: {} for '{}'", intent, state.original_query);
    state.intent = Some(intent);
}
