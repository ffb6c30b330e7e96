//! Node identifiers and the conditional edges of the agent graph
//!
//! The graph is a fixed layered DAG:
//!
//! ```text
//! determine_intent ─┬─> extract_* ──> dispatch ──> generate_*
//!                   └─> generate_general_response
//! (any conditional edge) ──> error_handler
//! ```
//!
//! Routing is done on `NodeId`; `NodeId::label` is only used for logs.

use super::state::{ExecutionState, Intent};

/// Closed set of graph nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeId {
    DetermineIntent,
    ExtractConvocatoriaId,
    ExtractSearchParams,
    ExtractYears,
    ExtractPartyParams,
    GetConvocatoriaDetails,
    SearchConvocatorias,
    GetBeneficiaries,
    SearchPoliticalParties,
    GenerateDetailedResponse,
    GenerateSearchSummary,
    GenerateGeneralResponse,
    GenerateBeneficiariesSummary,
    GeneratePartiesSummary,
    ErrorHandler,
}

impl NodeId {
    /// Entry point of every traversal
    pub const ENTRY: NodeId = NodeId::DetermineIntent;

    /// Human-readable label for diagnostics
    pub fn label(&self) -> &'static str {
        match self {
            NodeId::DetermineIntent => "determine_intent_node",
            NodeId::ExtractConvocatoriaId => "extract_convocatoria_id_node",
            NodeId::ExtractSearchParams => "extract_search_params_node",
            NodeId::ExtractYears => "extract_years_node",
            NodeId::ExtractPartyParams => "extract_party_params_node",
            NodeId::GetConvocatoriaDetails => "call_infosubvenciones_get_details_node",
            NodeId::SearchConvocatorias => "call_infosubvenciones_search_node",
            NodeId::GetBeneficiaries => "get_beneficiaries_node",
            NodeId::SearchPoliticalParties => "search_political_parties_node",
            NodeId::GenerateDetailedResponse => "generate_detailed_response_node",
            NodeId::GenerateSearchSummary => "generate_search_summary_node",
            NodeId::GenerateGeneralResponse => "generate_general_response_node",
            NodeId::GenerateBeneficiariesSummary => "generate_beneficiaries_summary_node",
            NodeId::GeneratePartiesSummary => "generate_parties_summary_node",
            NodeId::ErrorHandler => "error_handler",
        }
    }

    /// Absorbing states: the five generators and the error handler
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            NodeId::GenerateDetailedResponse
                | NodeId::GenerateSearchSummary
                | NodeId::GenerateGeneralResponse
                | NodeId::GenerateBeneficiariesSummary
                | NodeId::GeneratePartiesSummary
                | NodeId::ErrorHandler
        )
    }
}

/// After `determine_intent`: pick the extractor, or answer conversationally
pub fn route_after_intent(state: &ExecutionState) -> NodeId {
    if state.has_error() {
        return NodeId::ErrorHandler;
    }
    match state.intent {
        Some(Intent::ConvocatoriaDetails) => NodeId::ExtractConvocatoriaId,
        Some(Intent::SearchConvocatorias) => NodeId::ExtractSearchParams,
        Some(Intent::BeneficiariesByYear) => NodeId::ExtractYears,
        Some(Intent::PoliticalParties) => NodeId::ExtractPartyParams,
        Some(Intent::GeneralConversation) => NodeId::GenerateGeneralResponse,
        None => NodeId::ErrorHandler,
    }
}

/// After an extractor: call the matching registry endpoint
pub fn route_after_extraction(state: &ExecutionState) -> NodeId {
    if state.has_error() {
        return NodeId::ErrorHandler;
    }
    match state.intent {
        Some(Intent::ConvocatoriaDetails) => NodeId::GetConvocatoriaDetails,
        Some(Intent::SearchConvocatorias) => NodeId::SearchConvocatorias,
        Some(Intent::BeneficiariesByYear) => NodeId::GetBeneficiaries,
        Some(Intent::PoliticalParties) => NodeId::SearchPoliticalParties,
        Some(Intent::GeneralConversation) | None => NodeId::ErrorHandler,
    }
}

/// After a dispatch agent: only upstream API failures abort generation
pub fn route_after_dispatch(state: &ExecutionState) -> NodeId {
    let api_failed = state
        .error_message
        .as_deref()
        .is_some_and(|message| message.contains("API error"));
    if api_failed {
        return NodeId::ErrorHandler;
    }
    match state.intent {
        Some(Intent::ConvocatoriaDetails) => NodeId::GenerateDetailedResponse,
        Some(Intent::SearchConvocatorias) => NodeId::GenerateSearchSummary,
        Some(Intent::BeneficiariesByYear) => NodeId::GenerateBeneficiariesSummary,
        Some(Intent::PoliticalParties) => NodeId::GeneratePartiesSummary,
        Some(Intent::GeneralConversation) | None => NodeId::ErrorHandler,
    }
}

/// Conditional edge leaving `node`, or `None` for a terminal node
pub fn next_node(node: NodeId, state: &ExecutionState) -> Option<NodeId> {
    match node {
        NodeId::DetermineIntent => Some(route_after_intent(state)),
        NodeId::ExtractConvocatoriaId
        | NodeId::ExtractSearchParams
        | NodeId::ExtractYears
        | NodeId::ExtractPartyParams => Some(route_after_extraction(state)),
        NodeId::GetConvocatoriaDetails
        | NodeId::SearchConvocatorias
        | NodeId::GetBeneficiaries
        | NodeId::SearchPoliticalParties => Some(route_after_dispatch(state)),
        _ => None,
    }
}
