//! Sesiones de conversación: historial acotado y orquestación de cada turno
//!
//! `SessionOrchestrator` arma el estado inicial, ejecuta el grafo y entrega
//! la respuesta como texto o como stream. El historial se inyecta como
//! `HistoryStore`; la implementación en memoria guarda los últimos turnos de
//! cada conversación.

use super::graph::AgentGraph;
use super::response::{generate_text, stream_text};
use super::state::{ExecutionState, ResponsePlan};
use crate::i18n::{Locale, Text};
use crate::llm::TokenStream;
use crate::{log_error, log_info, log_warn};
use futures::future::FutureExt;
use futures::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

/// Turnos que se conservan por conversación
pub const DEFAULT_HISTORY_TURNS: usize = 5;

/// Un turno de conversación ya completado
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub query: String,
    pub response: String,
}

impl Turn {
    pub fn new(query: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            response: response.into(),
        }
    }
}

/// Historial formateado para los prompts
pub fn format_history(turns: &[Turn]) -> String {
    if turns.is_empty() {
        return "No previous chat history.".to_string();
    }
    turns
        .iter()
        .map(|turn| format!("User: {}\nAssistant: {}", turn.query, turn.response))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Almacén de historial por id de conversación
pub trait HistoryStore: Send + Sync {
    /// Turnos guardados, del más antiguo al más reciente
    fn history(&self, conversation_id: &str) -> Vec<Turn>;

    /// Añade un turno. Los turnos con respuesta vacía se ignoran.
    fn append(&self, conversation_id: &str, turn: Turn);

    fn clear(&self, conversation_id: &str);
}

/// Historial en memoria del proceso, sin expiración de conversaciones
#[derive(Debug)]
pub struct InMemoryHistoryStore {
    conversations: Mutex<HashMap<String, VecDeque<Turn>>>,
    max_turns: usize,
}

impl Default for InMemoryHistoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_TURNS)
    }
}

impl InMemoryHistoryStore {
    pub fn new(max_turns: usize) -> Self {
        Self {
            conversations: Mutex::new(HashMap::new()),
            max_turns: max_turns.max(1),
        }
    }

    pub fn conversation_count(&self) -> usize {
        self.conversations
            .lock()
            .map(|conversations| conversations.len())
            .unwrap_or_default()
    }
}

impl HistoryStore for InMemoryHistoryStore {
    fn history(&self, conversation_id: &str) -> Vec<Turn> {
        self.conversations
            .lock()
            .ok()
            .and_then(|conversations| {
                conversations
                    .get(conversation_id)
                    .map(|turns| turns.iter().cloned().collect())
            })
            .unwrap_or_default()
    }

    fn append(&self, conversation_id: &str, turn: Turn) {
        if turn.response.trim().is_empty() {
            return;
        }
        let Ok(mut conversations) = self.conversations.lock() else {
            log_error!("History store lock poisoned, turn not recorded");
            return;
        };
        let turns = conversations.entry(conversation_id.to_string()).or_default();
        turns.push_back(turn);
        while turns.len() > self.max_turns {
            turns.pop_front();
        }
    }

    fn clear(&self, conversation_id: &str) {
        if let Ok(mut conversations) = self.conversations.lock() {
            conversations.remove(conversation_id);
        }
    }
}

/// Resultado de un turno: texto completo o fragmentos perezosos
pub enum TurnOutput {
    Text(String),
    Stream(TokenStream),
}

impl TurnOutput {
    /// Consume la salida entera (drena el stream si lo hay)
    pub async fn into_text(self) -> String {
        match self {
            TurnOutput::Text(text) => text,
            TurnOutput::Stream(stream) => stream.collect::<Vec<_>>().await.concat(),
        }
    }

    pub fn is_stream(&self) -> bool {
        matches!(self, TurnOutput::Stream(_))
    }
}

impl std::fmt::Debug for TurnOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TurnOutput::Text(text) => f.debug_tuple("Text").field(text).finish(),
            TurnOutput::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Stream que guarda el turno en el historial solo al agotarse.
///
/// Si el consumidor lo abandona a medias, el turno no se registra.
struct RecordingStream {
    inner: TokenStream,
    history: Arc<dyn HistoryStore>,
    conversation_id: String,
    query: String,
    buffer: String,
    locale: Locale,
    finished: bool,
}

impl Stream for RecordingStream {
    type Item = String;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<String>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }

        match this.inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(fragment)) => {
                this.buffer.push_str(&fragment);
                Poll::Ready(Some(fragment))
            }
            Poll::Ready(None) => {
                this.finished = true;
                if this.buffer.trim().is_empty() {
                    log_warn!("Stream for conversation {} produced no text", this.conversation_id);
                    let apology = Text::StreamInterrupted.in_locale(this.locale).trim_start();
                    return Poll::Ready(Some(apology.to_string()));
                }
                this.history.append(
                    &this.conversation_id,
                    Turn::new(this.query.clone(), this.buffer.trim()),
                );
                this.buffer.clear();
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Punto de entrada de cada turno de conversación
pub struct SessionOrchestrator {
    graph: Arc<AgentGraph>,
    history: Arc<dyn HistoryStore>,
    streaming: bool,
}

impl SessionOrchestrator {
    pub fn new(graph: Arc<AgentGraph>, history: Arc<dyn HistoryStore>) -> Self {
        Self {
            graph,
            history,
            streaming: true,
        }
    }

    /// Con `false`, las respuestas diferidas se generan completas antes de devolverlas
    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    /// Nuevo id de conversación
    pub fn new_conversation_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// Procesa un turno leyendo el historial del almacén
    pub async fn process_conversation(&self, query: &str, conversation_id: &str) -> TurnOutput {
        let history = self.history.history(conversation_id);
        self.process(query, &history, conversation_id).await
    }

    /// Procesa un turno con un historial explícito.
    ///
    /// Nunca falla: cualquier error acaba en un texto de disculpa.
    pub async fn process(&self, query: &str, history: &[Turn], conversation_id: &str) -> TurnOutput {
        let locale = self.graph.locale();
        let query = query.trim();
        if query.is_empty() {
            log_warn!("Empty query for conversation {}", conversation_id);
            return TurnOutput::Text(Text::EmptyQuery.in_locale(locale).to_string());
        }

        log_info!("Processing query: '{}', conversation: {}", query, conversation_id);
        let state = ExecutionState::new(query, format_history(history));

        // Un pánico dentro de un nodo llega aquí como JoinError
        let graph = Arc::clone(&self.graph);
        let final_state = match tokio::spawn(async move { graph.run(state).await }).await {
            Ok(final_state) => final_state,
            Err(e) => {
                log_error!("Graph execution failed for conversation {}: {}", conversation_id, e);
                let apology = Text::DefaultApology.in_locale(locale).to_string();
                return self.finish_text(query, conversation_id, apology);
            }
        };

        match final_state.plan() {
            Some(ResponsePlan::Deferred { prompt, node }) if self.streaming => {
                let recording = RecordingStream {
                    inner: stream_text(self.graph.llm(), prompt, node),
                    history: Arc::clone(&self.history),
                    conversation_id: conversation_id.to_string(),
                    query: query.to_string(),
                    buffer: String::new(),
                    locale,
                    finished: false,
                };
                // Un pánico al consumir el stream lo cierra con la disculpa, sin guardar el turno
                let id = conversation_id.to_string();
                let apology = Text::DefaultApology.in_locale(locale).to_string();
                let guarded = AssertUnwindSafe(recording).catch_unwind().map(move |item| {
                    item.unwrap_or_else(|_| {
                        log_error!("Response stream panicked for conversation {}", id);
                        apology.clone()
                    })
                });
                TurnOutput::Stream(Box::pin(guarded))
            }
            Some(ResponsePlan::Deferred { prompt, node }) => {
                let llm = self.graph.llm();
                let generation = generate_text(llm.as_ref(), &prompt, node, locale);
                match AssertUnwindSafe(generation).catch_unwind().await {
                    Ok(generated) => {
                        if let Some(error) = &generated.error {
                            log_warn!("{}", error);
                        }
                        self.finish_text(query, conversation_id, generated.text)
                    }
                    Err(_) => {
                        log_error!("Response generation panicked for conversation {}", conversation_id);
                        let apology = Text::DefaultApology.in_locale(locale).to_string();
                        self.finish_text(query, conversation_id, apology)
                    }
                }
            }
            Some(ResponsePlan::Complete(text)) => {
                log_info!("Returning non-stream text response");
                self.finish_text(query, conversation_id, text)
            }
            None => {
                log_error!("Graph finished without response text or prompt");
                let text = if final_state.has_error() {
                    Text::TechnicalIssue
                } else {
                    Text::DefaultApology
                };
                self.finish_text(query, conversation_id, text.in_locale(locale).to_string())
            }
        }
    }

    fn finish_text(&self, query: &str, conversation_id: &str, text: String) -> TurnOutput {
        if text.trim().is_empty() {
            return TurnOutput::Text(Text::EmptyResponse.in_locale(self.graph.locale()).to_string());
        }
        self.history
            .append(conversation_id, Turn::new(query, text.trim()));
        TurnOutput::Text(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_history() {
        assert_eq!(format_history(&[]), "No previous chat history.");
        let turns = vec![Turn::new("hola", "¡Hola!"), Turn::new("¿qué haces?", "Ayudo")];
        assert_eq!(
            format_history(&turns),
            "User: hola\nAssistant: ¡Hola!\nUser: ¿qué haces?\nAssistant: Ayudo"
        );
    }

    #[test]
    fn test_history_is_capped() {
        let store = InMemoryHistoryStore::default();
        for i in 0..8 {
            store.append("c1", Turn::new(format!("q{i}"), format!("a{i}")));
        }
        let turns = store.history("c1");
        assert_eq!(turns.len(), DEFAULT_HISTORY_TURNS);
        assert_eq!(turns[0].query, "q3");
        assert_eq!(turns[4].response, "a7");
    }

    #[test]
    fn test_blank_responses_are_not_recorded() {
        let store = InMemoryHistoryStore::new(3);
        store.append("c1", Turn::new("hola", "   "));
        assert!(store.history("c1").is_empty());
        assert_eq!(store.conversation_count(), 0);
    }

    #[test]
    fn test_conversations_are_isolated() {
        let store = InMemoryHistoryStore::new(2);
        store.append("a", Turn::new("q", "r"));
        assert!(store.history("b").is_empty());
        store.clear("a");
        assert!(store.history("a").is_empty());
    }

    #[test]
    fn test_conversation_ids_are_unique() {
        assert_ne!(
            SessionOrchestrator::new_conversation_id(),
            SessionOrchestrator::new_conversation_id()
        );
    }
}
