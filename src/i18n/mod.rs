//! Internationalization module - Spanish and English support
//!
//! Only user-facing fixed strings live here. Internal `error_message` values
//! stay in English because routing matches on their substrings.

use std::sync::{Mutex, OnceLock};

static CURRENT_LOCALE: OnceLock<Mutex<Locale>> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Locale {
    English,
    #[default]
    Spanish,
}

impl Locale {
    /// Detect locale from system environment
    pub fn detect() -> Self {
        let lang = std::env::var("LANG")
            .or_else(|_| std::env::var("LC_ALL"))
            .or_else(|_| std::env::var("LC_MESSAGES"))
            .unwrap_or_default()
            .to_lowercase();

        if lang.starts_with("en") {
            Locale::English
        } else {
            // El registro es español: sin pista explícita, respondemos en español
            Locale::Spanish
        }
    }

    /// Parse a configured language name ("es", "español", "en", ...)
    pub fn from_language(language: &str) -> Option<Self> {
        match language.trim().to_lowercase().as_str() {
            "es" | "español" | "espanol" | "spanish" => Some(Locale::Spanish),
            "en" | "english" | "inglés" | "ingles" => Some(Locale::English),
            _ => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Locale::English => "en",
            Locale::Spanish => "es",
        }
    }
}

/// Initialize the global locale from the environment
pub fn init_locale() -> Locale {
    let locale = Locale::detect();
    let _ = CURRENT_LOCALE.set(Mutex::new(locale));
    locale
}

/// Initialize with specific locale
pub fn init_locale_with(locale: Locale) -> Locale {
    let _ = CURRENT_LOCALE.set(Mutex::new(locale));
    locale
}

/// Get current locale
pub fn current_locale() -> Locale {
    CURRENT_LOCALE
        .get()
        .and_then(|m| m.lock().ok())
        .map(|l| *l)
        .unwrap_or_default()
}

/// Translation keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Text {
    // Error handler wording
    IdNotIdentified,
    CheckNumberAndRetry,
    TechnicalIssue,

    // Session defaults
    DefaultApology,
    EmptyQuery,
    EmptyResponse,
    GenerationFailed,
    StreamInterrupted,

    // CLI
    ChatWelcome,
    ChatPrompt,
    ChatGoodbye,
}

impl Text {
    pub fn get(&self) -> &'static str {
        self.in_locale(current_locale())
    }

    pub fn in_locale(&self, locale: Locale) -> &'static str {
        match locale {
            Locale::English => self.english(),
            Locale::Spanish => self.spanish(),
        }
    }

    fn english(&self) -> &'static str {
        match self {
            Text::IdNotIdentified => {
                "I couldn't identify a grant call id. Please try again specifying the call number."
            }
            Text::CheckNumberAndRetry => "Please check the number and try again.",
            Text::TechnicalIssue => {
                "Sorry, a technical issue occurred while processing your request."
            }
            Text::DefaultApology => "I'm sorry, I couldn't process your request adequately.",
            Text::EmptyQuery => "A query is required. Ask me something about public grants.",
            Text::EmptyResponse => "No response could be generated. Please try again.",
            Text::GenerationFailed => "I'm sorry, there was an issue generating the response.",
            Text::StreamInterrupted => " Sorry, an error occurred while generating the response.",
            Text::ChatWelcome => {
                "Grants assistant ready. Ask about calls, beneficiaries or political parties (type 'exit' to quit)."
            }
            Text::ChatPrompt => "you> ",
            Text::ChatGoodbye => "Bye!",
        }
    }

    fn spanish(&self) -> &'static str {
        match self {
            Text::IdNotIdentified => {
                "No he podido identificar un ID de convocatoria. Por favor, inténtalo de nuevo indicando el número de la convocatoria."
            }
            Text::CheckNumberAndRetry => "Por favor, verifica el número e inténtalo de nuevo.",
            Text::TechnicalIssue => {
                "Lo siento, ha ocurrido un problema técnico al procesar tu solicitud."
            }
            Text::DefaultApology => {
                "Lo siento, no he podido procesar tu solicitud adecuadamente."
            }
            Text::EmptyQuery => {
                "La consulta es obligatoria. Pregúntame algo sobre subvenciones públicas."
            }
            Text::EmptyResponse => "No se pudo generar una respuesta. Inténtalo de nuevo.",
            Text::GenerationFailed => "Lo siento, hubo un problema al generar la respuesta.",
            Text::StreamInterrupted => " Lo siento, ha ocurrido un error al generar la respuesta.",
            Text::ChatWelcome => {
                "Asistente de subvenciones listo. Pregunta por convocatorias, beneficiarios o partidos políticos ('salir' para terminar)."
            }
            Text::ChatPrompt => "tú> ",
            Text::ChatGoodbye => "¡Hasta luego!",
        }
    }
}

/// Shorthand for getting translated text
pub fn t(text: Text) -> &'static str {
    text.get()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locale_detection() {
        let locale = Locale::detect();
        assert!(matches!(locale, Locale::English | Locale::Spanish));
    }

    #[test]
    fn test_language_names() {
        assert_eq!(Locale::from_language("ES"), Some(Locale::Spanish));
        assert_eq!(Locale::from_language("english"), Some(Locale::English));
        assert_eq!(Locale::from_language("klingon"), None);
    }

    #[test]
    fn test_translations_exist() {
        let texts = [
            Text::IdNotIdentified,
            Text::CheckNumberAndRetry,
            Text::TechnicalIssue,
            Text::DefaultApology,
            Text::EmptyQuery,
            Text::EmptyResponse,
            Text::GenerationFailed,
            Text::StreamInterrupted,
        ];

        for text in texts {
            assert!(!text.english().trim().is_empty());
            assert!(!text.spanish().trim().is_empty());
        }
    }
}
