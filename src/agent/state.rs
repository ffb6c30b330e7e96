//! Execution state threaded through every node of the agent graph

use super::router::NodeId;
use crate::registry::{PartyParams, SearchParams};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Fixed intent labels produced by the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intent {
    ConvocatoriaDetails,
    SearchConvocatorias,
    BeneficiariesByYear,
    PoliticalParties,
    GeneralConversation,
}

impl Intent {
    pub const ALL: [Intent; 5] = [
        Intent::ConvocatoriaDetails,
        Intent::SearchConvocatorias,
        Intent::BeneficiariesByYear,
        Intent::PoliticalParties,
        Intent::GeneralConversation,
    ];

    /// Label the model is asked to answer with
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::ConvocatoriaDetails => "OBTENER_CONVOCATORIA_DETALLES",
            Intent::SearchConvocatorias => "BUSCAR_CONVOCATORIAS_GENERAL",
            Intent::BeneficiariesByYear => "BUSCAR_BENEFICIARIOS_POR_ANNO",
            Intent::PoliticalParties => "BUSCAR_PARTIDOS_POLITICOS",
            Intent::GeneralConversation => "GENERAL_CONVERSATION",
        }
    }

    /// Exact, case-sensitive label match
    pub fn parse(label: &str) -> Option<Intent> {
        Self::ALL.into_iter().find(|intent| intent.as_str() == label)
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters an extractor hands to its dispatch agent
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ApiParams {
    Search(SearchParams),
    Party(PartyParams),
    Years(Vec<i32>),
}

/// Normalized convocatoria search result
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub items: Vec<Value>,
    /// Total matches available upstream, not just this page
    pub total_count: u64,
    /// Enrichment keyed by convocatoria id
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub convocatorias_details: Map<String, Value>,
    /// Diagnostic flag for a response that could not be read
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SearchResult {
    pub fn empty_with_error(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

/// One requested fiscal year: its records, or a placeholder when there are none
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum YearBucket {
    Records(Vec<Value>),
    Message(String),
}

impl YearBucket {
    pub fn no_data(year: i32) -> Self {
        YearBucket::Message(format!("no data for year {}.", year))
    }
}

/// Canonical payload produced by the dispatch agents
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ApiPayload {
    Detail(Value),
    Search(SearchResult),
    Beneficiaries(BTreeMap<i32, YearBucket>),
    Parties(Value),
    /// Upstream body with no usable canonical shape, kept for diagnostics
    Raw(Value),
}

/// How the turn's answer is delivered
#[derive(Debug, Clone, PartialEq)]
pub enum ResponsePlan {
    Complete(String),
    Deferred { prompt: String, node: NodeId },
}

/// State accumulated along one traversal of the graph
#[derive(Debug, Clone, Default)]
pub struct ExecutionState {
    pub original_query: String,
    pub formatted_chat_history: String,
    pub intent: Option<Intent>,
    pub extracted_convocatoria_id: Option<String>,
    pub extracted_years: Option<String>,
    pub api_call_params: Option<ApiParams>,
    pub api_response_data: Option<ApiPayload>,
    pub error_message: Option<String>,
    pub stream_generation_prompt: Option<String>,
    pub stream_generation_node: Option<NodeId>,
    pub agent_response_text: Option<String>,
    pub stream_completed_successfully: Option<bool>,
}

impl ExecutionState {
    pub fn new(query: impl Into<String>, formatted_chat_history: impl Into<String>) -> Self {
        Self {
            original_query: query.into(),
            formatted_chat_history: formatted_chat_history.into(),
            ..Default::default()
        }
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.error_message = Some(message.into());
    }

    pub fn has_error(&self) -> bool {
        self.error_message
            .as_deref()
            .is_some_and(|message| !message.is_empty())
    }

    /// Record a preparer's or the error handler's outcome
    pub fn apply_plan(&mut self, plan: ResponsePlan, success: bool) {
        match plan {
            ResponsePlan::Complete(text) => {
                self.stream_generation_prompt = None;
                self.stream_generation_node = None;
                self.agent_response_text = Some(text);
            }
            ResponsePlan::Deferred { prompt, node } => {
                self.stream_generation_prompt = Some(prompt);
                self.stream_generation_node = Some(node);
                self.agent_response_text = None;
            }
        }
        self.stream_completed_successfully = Some(success);
    }

    /// What a terminal state left behind, if anything
    pub fn plan(&self) -> Option<ResponsePlan> {
        if let Some(prompt) = self.stream_generation_prompt.as_ref().filter(|p| !p.is_empty()) {
            return Some(ResponsePlan::Deferred {
                prompt: prompt.clone(),
                node: self.stream_generation_node.unwrap_or(NodeId::GenerateGeneralResponse),
            });
        }
        self.agent_response_text
            .as_ref()
            .filter(|text| !text.is_empty())
            .map(|text| ResponsePlan::Complete(text.clone()))
    }
}
