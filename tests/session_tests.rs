//! Tests de sesión: entrega en streaming, historial y recuperación de fallos

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use subvenciones::agent::{
    AgentGraph, HistoryStore, InMemoryHistoryStore, PromptLibrary, SessionOrchestrator, Turn,
    TurnOutput,
};
use subvenciones::llm::{CompletionFacade, TokenStream};
use subvenciones::testing::{ScriptedCompletion, StubRegistry};
use subvenciones::{Locale, Text};

fn session(
    llm: ScriptedCompletion,
    registry: StubRegistry,
) -> (SessionOrchestrator, Arc<InMemoryHistoryStore>) {
    let history = Arc::new(InMemoryHistoryStore::default());
    let graph = AgentGraph::new(
        Arc::new(llm),
        Arc::new(registry),
        PromptLibrary::builtin(),
        Locale::Spanish,
    );
    (SessionOrchestrator::new(Arc::new(graph), history.clone()), history)
}

#[tokio::test]
async fn test_details_answer_is_streamed_and_recorded() {
    let (session, history) = session(
        ScriptedCompletion::new()
            .reply("OBTENER_CONVOCATORIA_DETALLES")
            .reply("123456")
            .stream(&["La convocatoria 123456 ", "ofrece becas de estudio."]),
        StubRegistry::new().with_detail(json!({"content": [{"id": 123456}]})),
    );

    let output = session
        .process("¿Qué es la convocatoria 123456?", &[], "c1")
        .await;
    let TurnOutput::Stream(mut stream) = output else {
        panic!("expected a stream");
    };

    let first = stream.next().await;
    assert_eq!(first.as_deref(), Some("La convocatoria 123456 "));
    assert!(history.history("c1").is_empty(), "recorded before the stream was drained");

    let rest: Vec<String> = stream.collect().await;
    assert_eq!(rest, vec!["ofrece becas de estudio."]);
    assert_eq!(
        history.history("c1"),
        vec![Turn::new(
            "¿Qué es la convocatoria 123456?",
            "La convocatoria 123456 ofrece becas de estudio."
        )]
    );
}

#[tokio::test]
async fn test_model_is_not_called_until_first_poll() {
    let llm = Arc::new(
        ScriptedCompletion::new()
            .reply("GENERAL_CONVERSATION")
            .stream(&["Hola"]),
    );
    let graph = AgentGraph::new(
        llm.clone(),
        Arc::new(StubRegistry::new()),
        PromptLibrary::builtin(),
        Locale::Spanish,
    );
    let session = SessionOrchestrator::new(Arc::new(graph), Arc::new(InMemoryHistoryStore::default()));

    let output = session.process_conversation("hola", "c1").await;
    assert_eq!(llm.pending_replies(), 0);
    assert_eq!(llm.prompts().len(), 1, "only the classifier ran");

    let TurnOutput::Stream(mut stream) = output else {
        panic!("expected a stream");
    };
    assert_eq!(stream.next().await.as_deref(), Some("Hola"));
    assert_eq!(llm.prompts().len(), 2);
}

#[tokio::test]
async fn test_recorded_stream_response_is_trimmed() {
    let (session, history) = session(
        ScriptedCompletion::new()
            .reply("GENERAL_CONVERSATION")
            .stream(&["  Hola ", "mundo \n"]),
        StubRegistry::new(),
    );

    let text = session
        .process_conversation("hola", "c1")
        .await
        .into_text()
        .await;
    assert_eq!(text, "  Hola mundo \n");
    assert_eq!(history.history("c1"), vec![Turn::new("hola", "Hola mundo")]);
}

#[tokio::test]
async fn test_abandoned_stream_is_not_recorded() {
    let (session, history) = session(
        ScriptedCompletion::new()
            .reply("GENERAL_CONVERSATION")
            .stream(&["Hola", ", ¿en qué puedo ayudarte?"]),
        StubRegistry::new(),
    );

    let output = session.process_conversation("hola", "c1").await;
    let TurnOutput::Stream(mut stream) = output else {
        panic!("expected a stream");
    };
    assert_eq!(stream.next().await.as_deref(), Some("Hola"));
    drop(stream);

    assert!(history.history("c1").is_empty());
}

#[tokio::test]
async fn test_empty_query_short_circuits() {
    let llm = ScriptedCompletion::new().reply("GENERAL_CONVERSATION");
    let (session, history) = session(llm, StubRegistry::new());

    let text = session.process("   ", &[], "c1").await.into_text().await;
    assert_eq!(text, Text::EmptyQuery.in_locale(Locale::Spanish));
    assert!(history.history("c1").is_empty());
}

#[tokio::test]
async fn test_error_handler_text_is_returned_and_recorded() {
    let (session, history) = session(
        ScriptedCompletion::new()
            .reply("OBTENER_CONVOCATORIA_DETALLES")
            .reply("NO_ID"),
        StubRegistry::new(),
    );

    let output = session.process_conversation("detalles de esa", "c1").await;
    assert!(!output.is_stream());
    let text = output.into_text().await;

    assert_eq!(text, Text::IdNotIdentified.in_locale(Locale::Spanish));
    assert_eq!(history.history("c1"), vec![Turn::new("detalles de esa", text)]);
}

#[tokio::test]
async fn test_history_reaches_the_prompts_and_stays_capped() {
    let history = Arc::new(InMemoryHistoryStore::new(2));
    let mut llm = ScriptedCompletion::new();
    for i in 0..4 {
        llm = llm
            .reply("GENERAL_CONVERSATION")
            .stream(&[format!("respuesta {i}").as_str()]);
    }
    let llm = Arc::new(llm);
    let graph = AgentGraph::new(
        llm.clone(),
        Arc::new(StubRegistry::new()),
        PromptLibrary::builtin(),
        Locale::Spanish,
    );
    let session = SessionOrchestrator::new(Arc::new(graph), history.clone());

    for i in 0..4 {
        let text = session
            .process_conversation(&format!("pregunta {i}"), "c1")
            .await
            .into_text()
            .await;
        assert_eq!(text, format!("respuesta {i}"));
    }

    let turns = history.history("c1");
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0].query, "pregunta 2");

    let prompts = llm.prompts();
    let last_classifier_prompt = &prompts[prompts.len() - 2];
    assert!(last_classifier_prompt.contains("User: pregunta 2\nAssistant: respuesta 2"));
    assert!(!last_classifier_prompt.contains("pregunta 0"));
}

#[tokio::test]
async fn test_empty_stream_apologizes_without_recording() {
    let (session, history) = session(
        ScriptedCompletion::new().reply("GENERAL_CONVERSATION").stream(&[]),
        StubRegistry::new(),
    );

    let text = session
        .process_conversation("hola", "c1")
        .await
        .into_text()
        .await;
    assert_eq!(text, Text::StreamInterrupted.in_locale(Locale::Spanish).trim_start());
    assert!(history.history("c1").is_empty());
}

#[tokio::test]
async fn test_non_streaming_failure_is_recorded() {
    let (session, history) = session(
        ScriptedCompletion::new().reply("GENERAL_CONVERSATION"),
        StubRegistry::new(),
    );
    let session = session.with_streaming(false);

    let output = session.process_conversation("hola", "c1").await;
    let text = output.into_text().await;

    assert_eq!(text, Text::GenerationFailed.in_locale(Locale::Spanish));
    assert_eq!(history.history("c1").len(), 1);
}

struct PanickingCompletion;

#[async_trait]
impl CompletionFacade for PanickingCompletion {
    async fn complete_sync(&self, _prompt: &str) -> String {
        panic!("model backend exploded");
    }

    async fn complete_stream(&self, _prompt: &str) -> TokenStream {
        panic!("model backend exploded");
    }
}

#[tokio::test]
async fn test_panicking_node_yields_apology() {
    let history = Arc::new(InMemoryHistoryStore::default());
    let graph = AgentGraph::new(
        Arc::new(PanickingCompletion),
        Arc::new(StubRegistry::new()),
        PromptLibrary::builtin(),
        Locale::English,
    );
    let session = SessionOrchestrator::new(Arc::new(graph), history.clone());

    let text = session
        .process_conversation("hello", "c1")
        .await
        .into_text()
        .await;
    assert_eq!(text, Text::DefaultApology.in_locale(Locale::English));
}

/// Classifies every query as general conversation, then panics when asked for the answer
#[derive(Default)]
struct FailingGeneration {
    sync_calls: AtomicUsize,
}

#[async_trait]
impl CompletionFacade for FailingGeneration {
    async fn complete_sync(&self, _prompt: &str) -> String {
        if self.sync_calls.fetch_add(1, Ordering::SeqCst) == 0 {
            return "GENERAL_CONVERSATION".to_string();
        }
        panic!("model backend exploded");
    }

    async fn complete_stream(&self, _prompt: &str) -> TokenStream {
        panic!("model backend exploded");
    }
}

fn failing_session(streaming: bool) -> (SessionOrchestrator, Arc<InMemoryHistoryStore>) {
    let history = Arc::new(InMemoryHistoryStore::default());
    let graph = AgentGraph::new(
        Arc::new(FailingGeneration::default()),
        Arc::new(StubRegistry::new()),
        PromptLibrary::builtin(),
        Locale::Spanish,
    );
    let session = SessionOrchestrator::new(Arc::new(graph), history.clone()).with_streaming(streaming);
    (session, history)
}

#[tokio::test]
async fn test_panicking_stream_start_yields_apology() {
    let (session, history) = failing_session(true);

    let output = session.process_conversation("hola", "c1").await;
    let TurnOutput::Stream(stream) = output else {
        panic!("expected a stream");
    };
    let fragments: Vec<String> = stream.collect().await;

    assert_eq!(fragments, vec![Text::DefaultApology.in_locale(Locale::Spanish).to_string()]);
    assert!(history.history("c1").is_empty());
}

#[tokio::test]
async fn test_panicking_generation_yields_apology() {
    let (session, history) = failing_session(false);

    let text = session
        .process_conversation("hola", "c1")
        .await
        .into_text()
        .await;
    assert_eq!(text, Text::DefaultApology.in_locale(Locale::Spanish));
    assert_eq!(history.history("c1").len(), 1);
}
