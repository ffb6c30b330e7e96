//! Scripted collaborators for tests and offline runs
//!
//! `ScriptedCompletion` answers completion calls from a queue, and
//! `StubRegistry` answers registry calls with fixed JSON bodies. Both record
//! what they were asked so tests can assert on prompts and calls.

use crate::llm::{CompletionFacade, TokenStream};
use crate::registry::{PartyParams, RegistryError, SearchParams, SubsidyRegistry};
use async_trait::async_trait;
use futures::stream;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;

fn push<T>(target: &Mutex<Vec<T>>, item: T) {
    if let Ok(mut guard) = target.lock() {
        guard.push(item);
    }
}

fn snapshot<T: Clone>(source: &Mutex<Vec<T>>) -> Vec<T> {
    source.lock().map(|guard| guard.clone()).unwrap_or_default()
}

/// Completion facade fed from queues of canned answers
#[derive(Debug, Default)]
pub struct ScriptedCompletion {
    replies: Mutex<VecDeque<String>>,
    streams: Mutex<VecDeque<Vec<String>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedCompletion {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the answer for the next `complete_sync` call
    pub fn reply(self, text: &str) -> Self {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(text.to_string());
        }
        self
    }

    /// Queue the fragments for the next `complete_stream` call
    pub fn stream(self, fragments: &[&str]) -> Self {
        if let Ok(mut streams) = self.streams.lock() {
            streams.push_back(fragments.iter().map(|f| f.to_string()).collect());
        }
        self
    }

    /// Every prompt received, in call order
    pub fn prompts(&self) -> Vec<String> {
        snapshot(&self.prompts)
    }

    /// Sync replies not consumed yet
    pub fn pending_replies(&self) -> usize {
        self.replies.lock().map(|r| r.len()).unwrap_or_default()
    }
}

#[async_trait]
impl CompletionFacade for ScriptedCompletion {
    async fn complete_sync(&self, prompt: &str) -> String {
        push(&self.prompts, prompt.to_string());
        self.replies
            .lock()
            .ok()
            .and_then(|mut replies| replies.pop_front())
            .unwrap_or_else(|| "ERROR_MODEL_CALL_FAILED: no scripted reply".to_string())
    }

    async fn complete_stream(&self, prompt: &str) -> TokenStream {
        push(&self.prompts, prompt.to_string());
        let fragments = self
            .streams
            .lock()
            .ok()
            .and_then(|mut streams| streams.pop_front())
            .unwrap_or_else(|| {
                vec!["Error generating content with the model (stream): no scripted stream".to_string()]
            });
        Box::pin(stream::iter(fragments))
    }
}

/// Registry answering from fixed bodies; a missing body answers HTTP 503
#[derive(Debug, Default)]
pub struct StubRegistry {
    search: Option<Value>,
    detail: Option<Value>,
    beneficiaries: Option<Value>,
    parties: Option<Value>,
    calls: Mutex<Vec<String>>,
}

impl StubRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_search(mut self, body: Value) -> Self {
        self.search = Some(body);
        self
    }

    pub fn with_detail(mut self, body: Value) -> Self {
        self.detail = Some(body);
        self
    }

    pub fn with_beneficiaries(mut self, body: Value) -> Self {
        self.beneficiaries = Some(body);
        self
    }

    pub fn with_parties(mut self, body: Value) -> Self {
        self.parties = Some(body);
        self
    }

    /// `operation:argument` for every call received
    pub fn calls(&self) -> Vec<String> {
        snapshot(&self.calls)
    }

    fn answer(&self, endpoint: &str, body: &Option<Value>) -> Result<Value, RegistryError> {
        body.clone().ok_or_else(|| RegistryError::Status {
            endpoint: endpoint.to_string(),
            status: 503,
        })
    }
}

#[async_trait]
impl SubsidyRegistry for StubRegistry {
    async fn search_convocatorias(&self, params: &SearchParams) -> Result<Value, RegistryError> {
        push(&self.calls, format!("search_convocatorias:{}", params.description));
        self.answer("convocatorias/busqueda", &self.search)
    }

    async fn get_convocatoria(&self, id: &str) -> Result<Value, RegistryError> {
        push(&self.calls, format!("get_convocatoria:{}", id));
        self.answer("convocatorias", &self.detail)
    }

    async fn beneficiaries_by_year(&self, years: &[i32]) -> Result<Value, RegistryError> {
        push(&self.calls, format!("beneficiaries_by_year:{:?}", years));
        self.answer("grandesbeneficiarios/busqueda", &self.beneficiaries)
    }

    async fn search_political_parties(&self, params: &PartyParams) -> Result<Value, RegistryError> {
        push(&self.calls, format!("search_political_parties:{}", params.name));
        self.answer("partidospoliticos/busqueda", &self.parties)
    }
}
