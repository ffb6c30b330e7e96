//! Tests de las llamadas al registro a través del grafo completo

use serde_json::json;
use std::sync::Arc;
use subvenciones::agent::{
    AgentGraph, ApiPayload, ExecutionState, NodeId, PromptLibrary, ResponsePlan, YearBucket,
};
use subvenciones::testing::{ScriptedCompletion, StubRegistry};
use subvenciones::Locale;

async fn run(
    llm: ScriptedCompletion,
    registry: StubRegistry,
    query: &str,
) -> (ExecutionState, Vec<NodeId>, Arc<StubRegistry>) {
    let registry = Arc::new(registry);
    let graph = AgentGraph::new(
        Arc::new(llm),
        registry.clone(),
        PromptLibrary::builtin(),
        Locale::Spanish,
    );
    let (state, path) = graph.traverse(ExecutionState::new(query, "")).await;
    (state, path, registry)
}

#[tokio::test]
async fn test_wrapped_detail_is_unwrapped() {
    let (state, path, registry) = run(
        ScriptedCompletion::new()
            .reply("OBTENER_CONVOCATORIA_DETALLES")
            .reply("123456"),
        StubRegistry::new().with_detail(json!({"content": [{"id": 123456, "descripcion": "Becas"}]})),
        "detalles de la convocatoria 123456",
    )
    .await;

    assert_eq!(registry.calls(), vec!["get_convocatoria:123456"]);
    assert_eq!(path.last(), Some(&NodeId::GenerateDetailedResponse));
    assert!(state.error_message.is_none());
    assert_eq!(
        state.api_response_data,
        Some(ApiPayload::Detail(json!({"id": 123456, "descripcion": "Becas"})))
    );
}

#[tokio::test]
async fn test_list_detail_and_bare_record() {
    for body in [json!([{"id": 9}]), json!({"id": 9})] {
        let (state, _, _) = run(
            ScriptedCompletion::new()
                .reply("OBTENER_CONVOCATORIA_DETALLES")
                .reply("9"),
            StubRegistry::new().with_detail(body),
            "convocatoria 9",
        )
        .await;
        assert_eq!(state.api_response_data, Some(ApiPayload::Detail(json!({"id": 9}))));
    }
}

#[tokio::test]
async fn test_no_id_never_reaches_the_registry() {
    let (state, path, registry) = run(
        ScriptedCompletion::new()
            .reply("OBTENER_CONVOCATORIA_DETALLES")
            .reply("NO_ID"),
        StubRegistry::new().with_detail(json!({"id": 1})),
        "dime los detalles de esa convocatoria",
    )
    .await;

    assert!(registry.calls().is_empty());
    assert_eq!(path.last(), Some(&NodeId::ErrorHandler));
    assert_eq!(
        state.plan(),
        Some(ResponsePlan::Complete(
            subvenciones::Text::IdNotIdentified.in_locale(Locale::Spanish).to_string()
        ))
    );
}

#[tokio::test]
async fn test_beneficiaries_for_two_years() {
    let (state, path, registry) = run(
        ScriptedCompletion::new()
            .reply("BUSCAR_BENEFICIARIOS_POR_ANNO")
            .reply("2022,2023"),
        StubRegistry::new().with_beneficiaries(json!({"content": [
            {"ejercicio": 2022, "beneficiario": "EMPRESA A", "importe": 1200000},
            {"ejercicio": "2022", "beneficiario": "EMPRESA B", "importe": 900000}
        ]})),
        "grandes beneficiarios de 2022 y 2023",
    )
    .await;

    assert_eq!(registry.calls(), vec!["beneficiaries_by_year:[2022, 2023]"]);
    assert_eq!(path.last(), Some(&NodeId::GenerateBeneficiariesSummary));

    let Some(ApiPayload::Beneficiaries(buckets)) = &state.api_response_data else {
        panic!("unexpected payload {:?}", state.api_response_data);
    };
    assert_eq!(buckets.keys().copied().collect::<Vec<_>>(), vec![2022, 2023]);
    assert!(matches!(&buckets[&2022], YearBucket::Records(items) if items.len() == 2));
    assert_eq!(buckets[&2023], YearBucket::no_data(2023));

    let wire = serde_json::to_value(state.api_response_data.as_ref().unwrap()).unwrap();
    assert_eq!(wire["2023"], json!("no data for year 2023."));
    assert_eq!(wire["2022"][1]["beneficiario"], "EMPRESA B");
}

#[tokio::test]
async fn test_beneficiaries_registry_failure_is_terminal() {
    let (state, path, _) = run(
        ScriptedCompletion::new()
            .reply("BUSCAR_BENEFICIARIOS_POR_ANNO")
            .reply("2021"),
        StubRegistry::new(),
        "beneficiarios de 2021",
    )
    .await;

    assert_eq!(path.last(), Some(&NodeId::ErrorHandler));
    assert!(state.error_message.unwrap().contains("API error"));
    assert_eq!(
        state.agent_response_text.as_deref(),
        Some(subvenciones::Text::TechnicalIssue.in_locale(Locale::Spanish))
    );
}

#[tokio::test]
async fn test_empty_search_still_summarizes() {
    let (state, path, _) = run(
        ScriptedCompletion::new()
            .reply("BUSCAR_CONVOCATORIAS_GENERAL")
            .reply(r#"{"description": "cultivo de trufa en la luna"}"#),
        StubRegistry::new().with_search(json!({"content": [], "totalElements": 0})),
        "ayudas para cultivar trufa en la luna",
    )
    .await;

    assert_eq!(path.last(), Some(&NodeId::GenerateSearchSummary));
    match state.plan() {
        Some(ResponsePlan::Deferred { prompt, .. }) => {
            assert!(prompt.contains("No se encontraron resultados."));
            assert!(prompt.contains("0 convocatorias"));
        }
        other => panic!("unexpected plan {other:?}"),
    }
}

#[tokio::test]
async fn test_party_search_passes_payload_through() {
    let body = json!({"content": [{"beneficiario": "PARTIDO EJEMPLO", "importe": 50000}]});
    let (state, path, registry) = run(
        ScriptedCompletion::new()
            .reply("BUSCAR_PARTIDOS_POLITICOS")
            .reply(r#"{"beneficiario": "Partido Ejemplo", "fechaDesde": "01/01/2020"}"#),
        StubRegistry::new().with_parties(body.clone()),
        "subvenciones al Partido Ejemplo desde 2020",
    )
    .await;

    assert_eq!(registry.calls(), vec!["search_political_parties:Partido Ejemplo"]);
    assert_eq!(path.last(), Some(&NodeId::GeneratePartiesSummary));
    assert_eq!(state.api_response_data, Some(ApiPayload::Parties(body)));
}
