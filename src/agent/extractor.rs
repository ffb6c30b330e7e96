//! Parameter extractors: one model call each, turning the query into the
//! arguments of a registry call.
//!
//! Failures are written to `error_message` with English wording; the error
//! handler matches on "could not identify".

use super::json::{parse_json_object, string_field};
use super::prompts::{PromptKind, PromptLibrary, HISTORY, QUERY};
use super::router::NodeId;
use super::state::{ApiParams, ExecutionState};
use crate::llm::{CompletionFacade, ERROR_PREFIX};
use crate::registry::{PartyParams, SearchParams};
use crate::{log_info, log_warn};
use serde_json::{Map, Value};

/// Answer of the id prompt when the query names no convocatoria
pub const NO_ID: &str = "NO_ID";

async fn ask(
    llm: &dyn CompletionFacade,
    prompts: &PromptLibrary,
    kind: PromptKind,
    state: &ExecutionState,
) -> String {
    let prompt = prompts.render(
        kind,
        &[
            (HISTORY, state.formatted_chat_history.as_str()),
            (QUERY, state.original_query.as_str()),
        ],
    );
    llm.complete_sync(&prompt).await
}

// ============================================================================
// Convocatoria id
// ============================================================================

/// Validate the id prompt's answer
pub fn interpret_id(raw: &str) -> Result<String, String> {
    if raw.starts_with(ERROR_PREFIX) {
        log_warn!("Model failed while extracting the convocatoria id: {}", raw);
        return Err("could not identify a convocatoria id: the model call failed".to_string());
    }
    let id = raw.trim();
    if id.is_empty() || id == NO_ID {
        return Err("could not identify a convocatoria id in the query".to_string());
    }
    Ok(id.to_string())
}

/// `extract_convocatoria_id` node
pub async fn extract_convocatoria_id(
    llm: &dyn CompletionFacade,
    prompts: &PromptLibrary,
    state: &mut ExecutionState,
) {
    let node = NodeId::ExtractConvocatoriaId;
    let raw = ask(llm, prompts, PromptKind::ConvocatoriaExtractor, state).await;

    match interpret_id(&raw) {
        Ok(id) => {
            log_info!("{}: convocatoria id extracted: {}", node.label(), id);
            state.extracted_convocatoria_id = Some(id);
        }
        Err(message) => {
            state.extracted_convocatoria_id = None;
            state.fail(message);
        }
    }
}

// ============================================================================
// Search parameters
// ============================================================================

/// Build search parameters from the model's JSON, falling back to the raw
/// query when it gives no description.
pub fn build_search_params(
    parsed: Option<&Map<String, Value>>,
    query: &str,
) -> Result<SearchParams, String> {
    let Some(map) = parsed.filter(|map| !map.is_empty()) else {
        return Err("could not determine valid search parameters".to_string());
    };

    let description = string_field(map, &["description", "descripcion"])
        .unwrap_or_else(|| query.trim().to_string());
    if description.is_empty() {
        return Err("no search term provided".to_string());
    }

    let mut params = SearchParams::new(description);
    if let Some(page) = string_field(map, &["page"]) {
        params.page = page;
    }
    if let Some(page_size) = string_field(map, &["pageSize", "page_size"]) {
        params.page_size = page_size;
    }
    if let Some(mode) = string_field(map, &["descriptionSearchMode", "descripcionTipoBusqueda"]) {
        params.description_search_mode = mode;
    }
    params.date_from = string_field(map, &["dateFrom", "fechaDesde"]);
    params.date_to = string_field(map, &["dateTo", "fechaHasta"]);

    Ok(params)
}

/// `extract_search_params` node
pub async fn extract_search_params(
    llm: &dyn CompletionFacade,
    prompts: &PromptLibrary,
    state: &mut ExecutionState,
) {
    let node = NodeId::ExtractSearchParams;
    let raw = ask(llm, prompts, PromptKind::ExtractParams, state).await;
    let parsed = parse_json_object(&raw);
    log_info!("{}: parameters parsed from model: {:?}", node.label(), parsed);

    match build_search_params(parsed.as_ref(), &state.original_query) {
        Ok(params) => {
            log_info!("{}: final API parameters: {:?}", node.label(), params);
            state.api_call_params = Some(ApiParams::Search(params));
        }
        Err(message) => {
            log_warn!("{}: {} (model output: '{}')", node.label(), message, raw);
            state.api_call_params = None;
            state.fail(message);
        }
    }
}

// ============================================================================
// Years
// ============================================================================

/// Integers of a comma-separated list; non-numeric tokens are dropped
pub fn parse_years(text: &str) -> Vec<i32> {
    text.split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty() && token.chars().all(|c| c.is_ascii_digit()))
        .filter_map(|token| token.parse().ok())
        .collect()
}

/// Canonical comma-separated form of a year list
pub fn join_years(years: &[i32]) -> String {
    years
        .iter()
        .map(i32::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// `extract_years` node
pub async fn extract_years(
    llm: &dyn CompletionFacade,
    prompts: &PromptLibrary,
    state: &mut ExecutionState,
) {
    let node = NodeId::ExtractYears;
    let raw = ask(llm, prompts, PromptKind::ExtractYears, state).await;

    let years = if raw.starts_with(ERROR_PREFIX) {
        log_warn!("{}: model failed: {}", node.label(), raw);
        Vec::new()
    } else {
        parse_years(&raw)
    };

    if years.is_empty() {
        state.extracted_years = None;
        state.fail("could not identify any year in the query");
        return;
    }

    log_info!("{}: years extracted: {:?}", node.label(), years);
    state.extracted_years = Some(raw.trim().to_string());
    state.api_call_params = Some(ApiParams::Years(years));
}

// ============================================================================
// Political party
// ============================================================================

/// Party name and optional date range from the model's JSON
pub fn build_party_params(parsed: Option<&Map<String, Value>>) -> Result<PartyParams, String> {
    let map = parsed.ok_or_else(|| "could not identify a party name in the query".to_string())?;
    let name = string_field(map, &["beneficiario", "name", "nombre"])
        .ok_or_else(|| "could not identify a party name in the query".to_string())?;

    Ok(PartyParams {
        name,
        date_from: string_field(map, &["fechaDesde", "dateFrom"]).unwrap_or_default(),
        date_to: string_field(map, &["fechaHasta", "dateTo"]).unwrap_or_default(),
    })
}

/// `extract_party_params` node
pub async fn extract_party_params(
    llm: &dyn CompletionFacade,
    prompts: &PromptLibrary,
    state: &mut ExecutionState,
) {
    let node = NodeId::ExtractPartyParams;
    let raw = ask(llm, prompts, PromptKind::ExtractPartyParams, state).await;
    let parsed = parse_json_object(&raw);
    log_info!("{}: parameters parsed from model: {:?}", node.label(), parsed);

    match build_party_params(parsed.as_ref()) {
        Ok(params) => state.api_call_params = Some(ApiParams::Party(params)),
        Err(message) => state.fail(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedCompletion;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_interpret_id() {
        assert_eq!(interpret_id(" 123456\n"), Ok("123456".to_string()));
        for raw in ["NO_ID", "", "  ", "ERROR_MODEL_CALL_FAILED: timeout"] {
            let error = interpret_id(raw).unwrap_err();
            assert!(error.contains("could not identify"), "{raw:?}");
        }
    }

    #[test]
    fn test_search_params_defaults_and_fallback() {
        let map = object(json!({"fechaDesde": "01/01/2024"}));
        let params = build_search_params(Some(&map), "becas comedor").unwrap();
        assert_eq!(params.description, "becas comedor");
        assert_eq!(params.page, "0");
        assert_eq!(params.page_size, "50");
        assert_eq!(params.description_search_mode, "1");
        assert_eq!(params.date_from.as_deref(), Some("01/01/2024"));
        assert_eq!(params.date_to, None);
    }

    #[test]
    fn test_search_params_errors() {
        assert!(build_search_params(None, "algo").is_err());
        assert!(build_search_params(Some(&Map::new()), "algo").is_err());

        let map = object(json!({"descripcion": ""}));
        assert_eq!(
            build_search_params(Some(&map), "   "),
            Err("no search term provided".to_string())
        );
    }

    #[test]
    fn test_search_params_accept_numbers() {
        let map = object(json!({"descripcion": "agua", "page": 2, "pageSize": 10}));
        let params = build_search_params(Some(&map), "").unwrap();
        assert_eq!(params.page, "2");
        assert_eq!(params.page_size, "10");
    }

    #[test]
    fn test_parse_years() {
        assert_eq!(parse_years("2022,2023"), vec![2022, 2023]);
        assert_eq!(parse_years(" 2021 , dos mil, 2020a,,2019"), vec![2021, 2019]);
        assert!(parse_years("ninguno").is_empty());
        assert!(parse_years("-2020").is_empty());
    }

    #[test]
    fn test_year_parsing_is_idempotent() {
        for input in ["2022,2023", "2023", " 2020 ,x, 2021", "", "99999999999,2024"] {
            let once = parse_years(input);
            assert_eq!(parse_years(&join_years(&once)), once, "{input:?}");
        }
    }

    #[test]
    fn test_party_params() {
        let map = object(json!({"beneficiario": "Partido Ejemplo", "fechaDesde": "01/01/2023"}));
        let params = build_party_params(Some(&map)).unwrap();
        assert_eq!(params.name, "Partido Ejemplo");
        assert_eq!(params.date_from, "01/01/2023");
        assert_eq!(params.date_to, "");

        let error = build_party_params(Some(&object(json!({"fechaDesde": "x"})))).unwrap_err();
        assert!(error.contains("could not identify a party name"));
        assert!(build_party_params(None).is_err());
    }

    #[tokio::test]
    async fn test_extract_years_node() {
        let llm = ScriptedCompletion::new().reply("2022,2023");
        let mut state = ExecutionState::new("beneficiarios de 2022 y 2023", "");
        extract_years(&llm, &PromptLibrary::builtin(), &mut state).await;

        assert_eq!(state.extracted_years.as_deref(), Some("2022,2023"));
        assert_eq!(state.api_call_params, Some(ApiParams::Years(vec![2022, 2023])));
        assert!(state.error_message.is_none());
    }

    #[tokio::test]
    async fn test_extract_years_node_without_years() {
        let llm = ScriptedCompletion::new().reply("no sé");
        let mut state = ExecutionState::new("beneficiarios", "");
        extract_years(&llm, &PromptLibrary::builtin(), &mut state).await;

        assert!(state.extracted_years.is_none());
        assert!(state.has_error());
    }

    #[tokio::test]
    async fn test_extract_search_params_node_with_fenced_json() {
        let llm = ScriptedCompletion::new()
            .reply("```json\n{\"descripcion\": \"energía solar\", \"fechaHasta\": \"31/12/2024\"}\n```");
        let mut state = ExecutionState::new("convocatorias de energía solar", "");
        extract_search_params(&llm, &PromptLibrary::builtin(), &mut state).await;

        match state.api_call_params {
            Some(ApiParams::Search(params)) => {
                assert_eq!(params.description, "energía solar");
                assert_eq!(params.date_to.as_deref(), Some("31/12/2024"));
            }
            other => panic!("unexpected params: {other:?}"),
        }
    }
}
