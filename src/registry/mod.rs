//! Public subsidies registry (BDNS / infosubvenciones.es)
//!
//! The registry is consumed through the four-operation `SubsidyRegistry`
//! trait. Every operation returns the parsed JSON body or a single
//! `RegistryError`; there are no retries.

pub mod client;
pub mod shapes;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use client::InfoSubvencionesClient;
pub use shapes::DetailShape;

/// The only failure the registry facade declares
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("request to {endpoint} failed: {source}")]
    Request {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request to {endpoint} timed out")]
    Timeout { endpoint: String },

    #[error("{endpoint} answered HTTP {status}")]
    Status { endpoint: String, status: u16 },

    #[error("could not decode {endpoint} response: {reason}")]
    Decode { endpoint: String, reason: String },
}

/// Convocatoria search parameters, named as the extractor produces them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    pub page: String,
    pub page_size: String,
    pub description: String,
    pub description_search_mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_to: Option<String>,
}

impl SearchParams {
    pub const DEFAULT_PAGE: &'static str = "0";
    pub const DEFAULT_PAGE_SIZE: &'static str = "50";
    pub const DEFAULT_SEARCH_MODE: &'static str = "1";

    /// First page of 50 results matching `description`
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            page: Self::DEFAULT_PAGE.to_string(),
            page_size: Self::DEFAULT_PAGE_SIZE.to_string(),
            description: description.into(),
            description_search_mode: Self::DEFAULT_SEARCH_MODE.to_string(),
            date_from: None,
            date_to: None,
        }
    }

    /// Query string pairs with the registry's field names. Empty values are not sent.
    pub fn wire_query(&self) -> Vec<(&'static str, String)> {
        let pairs = [
            ("page", Some(&self.page)),
            ("pageSize", Some(&self.page_size)),
            ("descripcion", Some(&self.description)),
            ("descripcionTipoBusqueda", Some(&self.description_search_mode)),
            ("fechaDesde", self.date_from.as_ref()),
            ("fechaHasta", self.date_to.as_ref()),
        ];
        non_empty(pairs)
    }
}

/// Political party search parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartyParams {
    pub name: String,
    #[serde(default)]
    pub date_from: String,
    #[serde(default)]
    pub date_to: String,
}

impl PartyParams {
    pub fn wire_query(&self) -> Vec<(&'static str, String)> {
        non_empty([
            ("nombre", Some(&self.name)),
            ("fechaDesde", Some(&self.date_from)),
            ("fechaHasta", Some(&self.date_to)),
        ])
    }
}

fn non_empty<const N: usize>(pairs: [(&'static str, Option<&String>); N]) -> Vec<(&'static str, String)> {
    pairs
        .into_iter()
        .filter_map(|(key, value)| {
            value
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(|v| (key, v.to_string()))
        })
        .collect()
}

/// Remote procedure facade over the registry's REST API
#[async_trait]
pub trait SubsidyRegistry: Send + Sync {
    /// Paginated convocatoria search: `{content, totalElements, itemCount, ...}`
    async fn search_convocatorias(&self, params: &SearchParams) -> Result<Value, RegistryError>;

    /// One convocatoria: a record, `{content: [record]}` or `[record]`
    async fn get_convocatoria(&self, id: &str) -> Result<Value, RegistryError>;

    /// Large beneficiaries for every requested fiscal year in one call
    async fn beneficiaries_by_year(&self, years: &[i32]) -> Result<Value, RegistryError>;

    /// Grants awarded to political parties, payload passed through as-is
    async fn search_political_parties(&self, params: &PartyParams) -> Result<Value, RegistryError>;
}
