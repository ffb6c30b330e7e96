//! Prompt templates for every model call of the graph
//!
//! Built-in Spanish templates live in `prompts/` and are compiled in. A
//! configured `prompts_dir` can override any of them with `<name>.txt`.
//! Placeholders are literal `{{TOKEN}}` markers replaced in a single pass, so
//! a substituted value is never scanned for further placeholders.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const HISTORY: &str = "{{HISTORY}}";
pub const QUERY: &str = "{{QUERY}}";
pub const DETAILS_JSON: &str = "{{DETAILS_JSON}}";
pub const SEARCH_PARAMS_JSON: &str = "{{SEARCH_PARAMS_JSON}}";
pub const SEARCH_DIGEST: &str = "{{SEARCH_DIGEST}}";
pub const NUM_ITEMS: &str = "{{NUM_ITEMS}}";
pub const BENEFICIARIES_JSON: &str = "{{BENEFICIARIES_JSON}}";
pub const PARTIES_JSON: &str = "{{PARTIES_JSON}}";

#[derive(Error, Debug)]
pub enum PromptError {
    #[error("Failed to read prompt template {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Prompt template {0} is empty")]
    Empty(PathBuf),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptKind {
    Orchestrator,
    ConvocatoriaExtractor,
    ExtractParams,
    ExtractYears,
    ExtractPartyParams,
    GenerateDetailedResponse,
    GenerateSearchSummary,
    GenerateGeneralResponse,
    GenerateBeneficiariesSummary,
    GeneratePartiesSummary,
}

impl PromptKind {
    pub const ALL: [PromptKind; 10] = [
        PromptKind::Orchestrator,
        PromptKind::ConvocatoriaExtractor,
        PromptKind::ExtractParams,
        PromptKind::ExtractYears,
        PromptKind::ExtractPartyParams,
        PromptKind::GenerateDetailedResponse,
        PromptKind::GenerateSearchSummary,
        PromptKind::GenerateGeneralResponse,
        PromptKind::GenerateBeneficiariesSummary,
        PromptKind::GeneratePartiesSummary,
    ];

    /// File stem used for overrides
    pub fn name(&self) -> &'static str {
        match self {
            PromptKind::Orchestrator => "orchestrator",
            PromptKind::ConvocatoriaExtractor => "convocatoria_extractor",
            PromptKind::ExtractParams => "extract_params",
            PromptKind::ExtractYears => "extract_years",
            PromptKind::ExtractPartyParams => "extract_party_params",
            PromptKind::GenerateDetailedResponse => "generate_detailed_response",
            PromptKind::GenerateSearchSummary => "generate_search_summary",
            PromptKind::GenerateGeneralResponse => "generate_general_response",
            PromptKind::GenerateBeneficiariesSummary => "generate_beneficiaries_summary",
            PromptKind::GeneratePartiesSummary => "generate_parties_summary",
        }
    }

    fn builtin(&self) -> &'static str {
        match self {
            PromptKind::Orchestrator => include_str!("../../prompts/orchestrator.txt"),
            PromptKind::ConvocatoriaExtractor => {
                include_str!("../../prompts/convocatoria_extractor.txt")
            }
            PromptKind::ExtractParams => include_str!("../../prompts/extract_params.txt"),
            PromptKind::ExtractYears => include_str!("../../prompts/extract_years.txt"),
            PromptKind::ExtractPartyParams => {
                include_str!("../../prompts/extract_party_params.txt")
            }
            PromptKind::GenerateDetailedResponse => {
                include_str!("../../prompts/generate_detailed_response.txt")
            }
            PromptKind::GenerateSearchSummary => {
                include_str!("../../prompts/generate_search_summary.txt")
            }
            PromptKind::GenerateGeneralResponse => {
                include_str!("../../prompts/generate_general_response.txt")
            }
            PromptKind::GenerateBeneficiariesSummary => {
                include_str!("../../prompts/generate_beneficiaries_summary.txt")
            }
            PromptKind::GeneratePartiesSummary => {
                include_str!("../../prompts/generate_parties_summary.txt")
            }
        }
    }
}

/// The ten templates, built-in or overridden
#[derive(Debug, Clone)]
pub struct PromptLibrary {
    templates: HashMap<PromptKind, String>,
}

impl Default for PromptLibrary {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PromptLibrary {
    pub fn builtin() -> Self {
        let templates = PromptKind::ALL
            .into_iter()
            .map(|kind| (kind, kind.builtin().to_string()))
            .collect();
        Self { templates }
    }

    /// Built-ins, overridden by any `<name>.txt` found in `dir`
    pub fn load(dir: Option<&Path>) -> Result<Self, PromptError> {
        let mut library = Self::builtin();
        let Some(dir) = dir else {
            return Ok(library);
        };

        for kind in PromptKind::ALL {
            let path = dir.join(format!("{}.txt", kind.name()));
            if !path.exists() {
                continue;
            }
            let content = std::fs::read_to_string(&path).map_err(|source| PromptError::Io {
                path: path.clone(),
                source,
            })?;
            if content.trim().is_empty() {
                return Err(PromptError::Empty(path));
            }
            tracing::info!("Prompt '{}' overridden from {:?}", kind.name(), path);
            library.templates.insert(kind, content);
        }

        Ok(library)
    }

    pub fn template(&self, kind: PromptKind) -> &str {
        self.templates
            .get(&kind)
            .map(String::as_str)
            .unwrap_or_else(|| kind.builtin())
    }

    pub fn render(&self, kind: PromptKind, replacements: &[(&str, &str)]) -> String {
        fill(self.template(kind), replacements)
    }
}

/// Replace `{{TOKEN}}` placeholders in one left-to-right pass.
///
/// Unknown placeholders are kept verbatim.
pub fn fill(template: &str, replacements: &[(&str, &str)]) -> String {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        output.push_str(&rest[..start]);
        let tail = &rest[start..];
        match replacements
            .iter()
            .find(|(token, _)| tail.starts_with(*token))
        {
            Some((token, value)) => {
                output.push_str(value);
                rest = &tail[token.len()..];
            }
            None => {
                output.push_str("{{");
                rest = &tail[2..];
            }
        }
    }
    output.push_str(rest);
    output
}
