//! reqwest implementation of the registry facade

use super::shapes::{detail_record, id_string};
use super::{PartyParams, RegistryError, SearchParams, SubsidyRegistry};
use crate::config::RegistryConfig;
use crate::{log_debug, log_error, log_info, log_warn};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use serde_json::{json, Map, Value};
use std::time::Duration;

/// Client for https://www.infosubvenciones.es/bdnstrans/api
#[derive(Debug, Clone)]
pub struct InfoSubvencionesClient {
    client: Client,
    base_url: String,
    enrichment_workers: usize,
    enrich_search_results: bool,
}

impl InfoSubvencionesClient {
    pub fn new(config: &RegistryConfig) -> Self {
        let client = Client::builder()
            .user_agent(format!("subvenciones/{}", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();

        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            enrichment_workers: config.enrichment_workers.max(1),
            enrich_search_results: config.enrich_search_results,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<Value, RegistryError> {
        let url = format!("{}/{}", self.base_url, endpoint);
        log_debug!("GET {} {:?}", url, query);

        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RegistryError::Timeout {
                        endpoint: endpoint.to_string(),
                    }
                } else {
                    RegistryError::Request {
                        endpoint: endpoint.to_string(),
                        source: e,
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RegistryError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            });
        }

        response.json::<Value>().await.map_err(|e| RegistryError::Decode {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })
    }

    /// Attach budget, regions and beneficiary types of every hit under
    /// `convocatoriasDetails`, looked up through a bounded pool.
    async fn enrich(&self, data: &mut Value) {
        let numbers: Vec<String> = data
            .get("content")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.get("numeroConvocatoria"))
                    .filter(|number| !number.is_null())
                    .map(id_string)
                    .collect()
            })
            .unwrap_or_default();

        if numbers.is_empty() {
            return;
        }

        let lookups: Vec<(String, Result<Value, RegistryError>)> = stream::iter(numbers)
            .map(|number| async move {
                let result = self.get_convocatoria(&number).await;
                (number, result)
            })
            .buffer_unordered(self.enrichment_workers)
            .collect()
            .await;

        let mut details = Map::new();
        for (number, result) in lookups {
            match result {
                Ok(raw) => match enrichment_summary(&raw) {
                    Some((id, summary)) => {
                        details.insert(id, summary);
                    }
                    None => log_warn!("Convocatoria {} returned no usable detail record", number),
                },
                Err(e) => log_error!("Failed to fetch convocatoria {}: {}", number, e),
            }
        }

        if let Some(object) = data.as_object_mut() {
            object.insert("convocatoriasDetails".to_string(), Value::Object(details));
        }
    }
}

/// `(record id, {presupuestoTotal, regiones, tiposBeneficiarios})` of a detail response
fn enrichment_summary(raw: &Value) -> Option<(String, Value)> {
    let record = detail_record(raw)?;
    let id = record.get("id").filter(|id| !id.is_null()).map(id_string)?;
    let field = |name: &str| record.get(name).cloned().unwrap_or(Value::Null);
    Some((
        id,
        json!({
            "presupuestoTotal": field("presupuestoTotal"),
            "regiones": field("regiones"),
            "tiposBeneficiarios": field("tiposBeneficiarios"),
        }),
    ))
}

#[async_trait]
impl SubsidyRegistry for InfoSubvencionesClient {
    async fn search_convocatorias(&self, params: &SearchParams) -> Result<Value, RegistryError> {
        log_info!("Searching convocatorias with params: {:?}", params);
        let mut data = self
            .get_json("convocatorias/busqueda", &params.wire_query())
            .await?;

        if self.enrich_search_results {
            self.enrich(&mut data).await;
        }
        Ok(data)
    }

    async fn get_convocatoria(&self, id: &str) -> Result<Value, RegistryError> {
        self.get_json("convocatorias", &[("numConv", id.to_string())])
            .await
    }

    async fn beneficiaries_by_year(&self, years: &[i32]) -> Result<Value, RegistryError> {
        log_info!("Fetching beneficiaries for years: {:?}", years);
        let query: Vec<(&str, String)> = years.iter().map(|y| ("anios", y.to_string())).collect();
        self.get_json("grandesbeneficiarios/busqueda", &query).await
    }

    async fn search_political_parties(&self, params: &PartyParams) -> Result<Value, RegistryError> {
        log_info!("Searching political parties with params: {:?}", params);
        self.get_json("partidospoliticos/busqueda", &params.wire_query())
            .await
    }
}
