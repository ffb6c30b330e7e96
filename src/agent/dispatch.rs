//! API dispatch agents: one registry call each, normalized into `ApiPayload`
//!
//! Every `RegistryError` is caught here and turned into an `error_message`
//! containing "API error", which is what stops the graph before generation.

use super::extractor::parse_years;
use super::router::NodeId;
use super::state::{ApiParams, ApiPayload, ExecutionState, SearchResult, YearBucket};
use crate::registry::shapes::{beneficiary_records, detail_record, fiscal_year};
use crate::registry::SubsidyRegistry;
use crate::{log_error, log_info, log_warn};
use serde_json::Value;
use std::collections::BTreeMap;

// ============================================================================
// Details
// ============================================================================

/// `call_infosubvenciones_get_details` node
pub async fn get_details(registry: &dyn SubsidyRegistry, state: &mut ExecutionState) {
    let node = NodeId::GetConvocatoriaDetails;
    let Some(id) = state
        .extracted_convocatoria_id
        .clone()
        .filter(|id| !id.is_empty() && id != super::extractor::NO_ID)
    else {
        state.fail("could not identify a valid convocatoria id in the query");
        return;
    };

    match registry.get_convocatoria(&id).await {
        Ok(raw) => match detail_record(&raw) {
            Some(record) => {
                log_info!("{}: details found for id '{}'", node.label(), id);
                state.api_response_data = Some(ApiPayload::Detail(record.clone()));
            }
            None => {
                log_warn!("{}: no usable record for id '{}': {}", node.label(), id, raw);
                state.fail(format!("no details found for id '{}'", id));
                state.api_response_data = Some(ApiPayload::Raw(raw));
            }
        },
        Err(e) => {
            log_error!("{}: registry call failed for id '{}': {}", node.label(), id, e);
            state.fail(format!("API error while fetching details for id '{}': {}", id, e));
        }
    }
}

// ============================================================================
// Search
// ============================================================================

/// Read a search body. The count is taken from `totalElements` rather than
/// the nominal `itemCount`, so it covers every page and not just this one.
pub fn normalize_search(raw: Value) -> SearchResult {
    let Value::Object(mut map) = raw else {
        return SearchResult::empty_with_error("registry response is not an object");
    };

    let total = map
        .get("totalElements")
        .and_then(Value::as_u64)
        .unwrap_or_default();

    let items = match map.remove("content") {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    };
    let convocatorias_details = match map.remove("convocatoriasDetails") {
        Some(Value::Object(details)) => details,
        _ => Default::default(),
    };

    SearchResult {
        items,
        total_count: total,
        convocatorias_details,
        error: None,
    }
}

/// `call_infosubvenciones_search` node
pub async fn search(registry: &dyn SubsidyRegistry, state: &mut ExecutionState) {
    let node = NodeId::SearchConvocatorias;
    let Some(ApiParams::Search(params)) = state.api_call_params.clone() else {
        state.fail("could not determine the search parameters");
        state.api_response_data = Some(ApiPayload::Search(SearchResult::default()));
        return;
    };

    match registry.search_convocatorias(&params).await {
        Ok(raw) => {
            let result = normalize_search(raw);
            if let Some(flag) = &result.error {
                log_warn!("{}: {}", node.label(), flag);
            }
            log_info!(
                "{}: {} results available, {} on this page",
                node.label(),
                result.total_count,
                result.items.len()
            );
            state.api_response_data = Some(ApiPayload::Search(result));
        }
        Err(e) => {
            log_error!("{}: registry call failed: {}", node.label(), e);
            state.fail(format!("API error while searching convocatorias: {}", e));
            state.api_response_data =
                Some(ApiPayload::Search(SearchResult::empty_with_error(e.to_string())));
        }
    }
}

// ============================================================================
// Beneficiaries
// ============================================================================

/// One bucket per requested year; records of unrequested or unreadable
/// years are dropped, empty years get the "no data" placeholder.
pub fn bucket_beneficiaries(years: &[i32], raw: &Value) -> BTreeMap<i32, YearBucket> {
    let node = NodeId::GetBeneficiaries;
    let mut records: BTreeMap<i32, Vec<Value>> = years.iter().map(|y| (*y, Vec::new())).collect();

    match beneficiary_records(raw) {
        Some(items) => {
            if items.is_empty() {
                log_info!("{}: registry returned no beneficiaries", node.label());
            }
            for item in items {
                match fiscal_year(item) {
                    Some(year) => match records.get_mut(&year) {
                        Some(bucket) => bucket.push(item.clone()),
                        None => log_warn!(
                            "{}: dropping record for unrequested year {}",
                            node.label(),
                            year
                        ),
                    },
                    None => log_warn!(
                        "{}: dropping record without a numeric fiscal year: {}",
                        node.label(),
                        crate::llm::provider::truncate(&item.to_string(), 100)
                    ),
                }
            }
        }
        None => log_warn!("{}: unexpected beneficiaries response shape", node.label()),
    }

    records
        .into_iter()
        .map(|(year, items)| {
            let bucket = if items.is_empty() {
                YearBucket::no_data(year)
            } else {
                YearBucket::Records(items)
            };
            (year, bucket)
        })
        .collect()
}

/// `get_beneficiaries` node
pub async fn get_beneficiaries(registry: &dyn SubsidyRegistry, state: &mut ExecutionState) {
    let node = NodeId::GetBeneficiaries;
    let years = match &state.api_call_params {
        Some(ApiParams::Years(years)) => years.clone(),
        _ => state
            .extracted_years
            .as_deref()
            .map(parse_years)
            .unwrap_or_default(),
    };

    if years.is_empty() {
        log_warn!("{}: no valid years to query", node.label());
        state.fail("no valid years provided");
        state.api_response_data = Some(ApiPayload::Beneficiaries(BTreeMap::new()));
        return;
    }

    match registry.beneficiaries_by_year(&years).await {
        Ok(raw) => {
            let buckets = bucket_beneficiaries(&years, &raw);
            state.api_response_data = Some(ApiPayload::Beneficiaries(buckets));
        }
        Err(e) => {
            log_error!("{}: registry call failed for years {:?}: {}", node.label(), years, e);
            state.fail(format!(
                "API error while fetching beneficiaries for years {:?}: {}",
                years, e
            ));
        }
    }
}

// ============================================================================
// Political parties
// ============================================================================

/// `search_political_parties` node
pub async fn search_parties(registry: &dyn SubsidyRegistry, state: &mut ExecutionState) {
    let node = NodeId::SearchPoliticalParties;
    let Some(ApiParams::Party(params)) = state.api_call_params.clone() else {
        log_warn!("{}: no party name to search for", node.label());
        state.fail("please specify the name of the political party");
        return;
    };

    match registry.search_political_parties(&params).await {
        Ok(raw) => {
            log_info!("{}: registry answered for '{}'", node.label(), params.name);
            state.api_response_data = Some(ApiPayload::Parties(raw));
        }
        Err(e) => {
            log_error!("{}: registry call failed: {}", node.label(), e);
            state.fail(format!("API error while searching political parties: {}", e));
        }
    }
}
