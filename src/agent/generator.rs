//! Response preparers: fill the answer prompt and defer generation
//!
//! None of these call the model. They leave a `ResponsePlan::Deferred` so
//! the session can stream the answer after the graph has finished.

use super::prompts::{
    PromptKind, PromptLibrary, BENEFICIARIES_JSON, DETAILS_JSON, HISTORY, NUM_ITEMS,
    PARTIES_JSON, QUERY, SEARCH_DIGEST, SEARCH_PARAMS_JSON,
};
use super::router::NodeId;
use super::state::{ApiPayload, ExecutionState, ResponsePlan, SearchResult};
use crate::log_info;
use crate::registry::shapes::id_string;
use serde::Serialize;
use serde_json::Value;

fn deferred(node: NodeId, prompt: String) -> ResponsePlan {
    log_info!("Node: {} (prepared for streaming)", node.label());
    ResponsePlan::Deferred { prompt, node }
}

fn pretty<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}

/// `generate_detailed_response` node
pub fn prepare_detailed_response(state: &ExecutionState, prompts: &PromptLibrary) -> ResponsePlan {
    let details = state
        .api_response_data
        .as_ref()
        .map(pretty)
        .unwrap_or_else(|| "No se encontró la convocatoria.".to_string());

    let prompt = prompts.render(
        PromptKind::GenerateDetailedResponse,
        &[
            (HISTORY, state.formatted_chat_history.as_str()),
            (QUERY, state.original_query.as_str()),
            (DETAILS_JSON, details.as_str()),
        ],
    );
    deferred(NodeId::GenerateDetailedResponse, prompt)
}

fn field<'a>(item: &'a Value, name: &str) -> std::borrow::Cow<'a, str> {
    match item.get(name) {
        Some(Value::String(s)) => s.as_str().into(),
        Some(Value::Null) | None => "None".into(),
        Some(other) => other.to_string().into(),
    }
}

/// One line per hit, with the enrichment budget when there is one
pub fn search_digest(result: &SearchResult) -> String {
    if result.total_count == 0 {
        return "No se encontraron resultados.".to_string();
    }
    if result.items.is_empty() {
        return "Info no disponible.".to_string();
    }

    result
        .items
        .iter()
        .map(|item| {
            let mut line = format!(
                "ID: {}, Num. Convocatoria: {}, Fecha: {}, Título: {}, Entidad: {}",
                field(item, "id"),
                field(item, "numeroConvocatoria"),
                field(item, "fechaRecepcion"),
                field(item, "descripcion"),
                field(item, "nivel2"),
            );
            let budget = item
                .get("id")
                .map(id_string)
                .and_then(|id| result.convocatorias_details.get(&id))
                .and_then(|details| details.get("presupuestoTotal"))
                .filter(|budget| !budget.is_null());
            if let Some(budget) = budget {
                line.push_str(&format!(", Presupuesto total: {}", budget));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// `generate_search_summary` node
pub fn prepare_search_summary(state: &ExecutionState, prompts: &PromptLibrary) -> ResponsePlan {
    let empty = SearchResult::default();
    let result = match &state.api_response_data {
        Some(ApiPayload::Search(result)) => result,
        _ => &empty,
    };
    let params = state
        .api_call_params
        .as_ref()
        .and_then(|params| serde_json::to_string(params).ok())
        .unwrap_or_else(|| "{}".to_string());
    let digest = search_digest(result);
    let num_items = result.total_count.to_string();

    let prompt = prompts.render(
        PromptKind::GenerateSearchSummary,
        &[
            (HISTORY, state.formatted_chat_history.as_str()),
            (QUERY, state.original_query.as_str()),
            (SEARCH_PARAMS_JSON, params.as_str()),
            (SEARCH_DIGEST, digest.as_str()),
            (NUM_ITEMS, num_items.as_str()),
        ],
    );
    deferred(NodeId::GenerateSearchSummary, prompt)
}

/// `generate_general_response` node
pub fn prepare_general_response(state: &ExecutionState, prompts: &PromptLibrary) -> ResponsePlan {
    let prompt = prompts.render(
        PromptKind::GenerateGeneralResponse,
        &[
            (HISTORY, state.formatted_chat_history.as_str()),
            (QUERY, state.original_query.as_str()),
        ],
    );
    deferred(NodeId::GenerateGeneralResponse, prompt)
}

/// `generate_beneficiaries_summary` node
pub fn prepare_beneficiaries_summary(
    state: &ExecutionState,
    prompts: &PromptLibrary,
) -> ResponsePlan {
    let data = state
        .api_response_data
        .as_ref()
        .map(pretty)
        .unwrap_or_else(|| "{}".to_string());

    let prompt = prompts.render(
        PromptKind::GenerateBeneficiariesSummary,
        &[
            (HISTORY, state.formatted_chat_history.as_str()),
            (QUERY, state.original_query.as_str()),
            (BENEFICIARIES_JSON, data.as_str()),
        ],
    );
    deferred(NodeId::GenerateBeneficiariesSummary, prompt)
}

/// `generate_parties_summary` node
pub fn prepare_parties_summary(state: &ExecutionState, prompts: &PromptLibrary) -> ResponsePlan {
    let data = state
        .api_response_data
        .as_ref()
        .map(pretty)
        .unwrap_or_else(|| "{}".to_string());

    let prompt = prompts.render(
        PromptKind::GeneratePartiesSummary,
        &[
            (HISTORY, state.formatted_chat_history.as_str()),
            (QUERY, state.original_query.as_str()),
            (PARTIES_JSON, data.as_str()),
        ],
    );
    deferred(NodeId::GeneratePartiesSummary, prompt)
}
