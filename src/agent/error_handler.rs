//! Error handler node: turns `error_message` into user-facing text
//!
//! Always answers synchronously so the user gets a message even when the
//! model is unreachable.

use super::router::NodeId;
use super::state::ExecutionState;
use crate::i18n::{Locale, Text};
use crate::log_error;

/// Wording shown to the user for an internal error message
pub fn user_message(error: &str, locale: Locale) -> String {
    if error.contains("could not identify") {
        Text::IdNotIdentified.in_locale(locale).to_string()
    } else if error.contains("no details found") {
        format!(
            "{}. {}",
            error.trim_end_matches('.'),
            Text::CheckNumberAndRetry.in_locale(locale)
        )
    } else {
        Text::TechnicalIssue.in_locale(locale).to_string()
    }
}

/// `error_handler` node
pub fn handle_error(state: &ExecutionState, locale: Locale) -> String {
    let error = state
        .error_message
        .as_deref()
        .filter(|message| !message.is_empty())
        .unwrap_or("unknown error");
    log_error!("Node: {}, handling error: {}", NodeId::ErrorHandler.label(), error);
    user_message(error, locale)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_id_asks_to_retry() {
        let text = user_message("could not identify a convocatoria id in the query", Locale::Spanish);
        assert_eq!(text, Text::IdNotIdentified.in_locale(Locale::Spanish));
    }

    #[test]
    fn test_missing_details_echoes_error() {
        let text = user_message("no details found for id '42'", Locale::English);
        assert_eq!(
            text,
            "no details found for id '42'. Please check the number and try again."
        );
    }

    #[test]
    fn test_everything_else_is_a_technical_issue() {
        for error in [
            "API error while searching convocatorias: HTTP 503",
            "Could Not Identify",
            "unknown error",
        ] {
            assert_eq!(
                user_message(error, Locale::Spanish),
                Text::TechnicalIssue.in_locale(Locale::Spanish)
            );
        }
    }

    #[test]
    fn test_node_without_error_message() {
        let state = ExecutionState::default();
        assert_eq!(
            handle_error(&state, Locale::English),
            Text::TechnicalIssue.in_locale(Locale::English)
        );
    }
}
