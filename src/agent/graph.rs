//! Agent graph: runs nodes from `determine_intent` until a terminal node

use super::prompts::PromptLibrary;
use super::router::{next_node, NodeId};
use super::state::{ExecutionState, ResponsePlan};
use super::{classifier, dispatch, error_handler, extractor, generator};
use crate::i18n::Locale;
use crate::llm::CompletionFacade;
use crate::log_debug;
use crate::registry::SubsidyRegistry;
use std::sync::Arc;
use tracing::Instrument;

/// Fixed layered DAG over the model, the registry and the prompt templates
pub struct AgentGraph {
    llm: Arc<dyn CompletionFacade>,
    registry: Arc<dyn SubsidyRegistry>,
    prompts: Arc<PromptLibrary>,
    locale: Locale,
}

impl AgentGraph {
    pub fn new(
        llm: Arc<dyn CompletionFacade>,
        registry: Arc<dyn SubsidyRegistry>,
        prompts: PromptLibrary,
        locale: Locale,
    ) -> Self {
        Self {
            llm,
            registry,
            prompts: Arc::new(prompts),
            locale,
        }
    }

    pub fn locale(&self) -> Locale {
        self.locale
    }

    /// Model used by the nodes, also used to produce the deferred answer
    pub fn llm(&self) -> Arc<dyn CompletionFacade> {
        Arc::clone(&self.llm)
    }

    /// Run one traversal and return the terminal state
    pub async fn run(&self, state: ExecutionState) -> ExecutionState {
        self.traverse(state).await.0
    }

    /// Run one traversal, also returning the nodes visited in order
    pub async fn traverse(&self, mut state: ExecutionState) -> (ExecutionState, Vec<NodeId>) {
        let mut node = NodeId::ENTRY;
        let mut path = Vec::with_capacity(4);

        loop {
            let span = tracing::info_span!("node", node = node.label());
            self.execute(node, &mut state).instrument(span).await;
            path.push(node);

            match next_node(node, &state) {
                Some(next) => node = next,
                None => break,
            }
        }

        log_debug!(
            "Graph path: {}",
            path.iter().map(NodeId::label).collect::<Vec<_>>().join(" -> ")
        );
        (state, path)
    }

    /// Run a single node against `state`
    pub async fn execute(&self, node: NodeId, state: &mut ExecutionState) {
        let llm = self.llm.as_ref();
        let registry = self.registry.as_ref();
        let prompts = self.prompts.as_ref();

        match node {
            NodeId::DetermineIntent => classifier::determine_intent(llm, prompts, state).await,

            NodeId::ExtractConvocatoriaId => {
                extractor::extract_convocatoria_id(llm, prompts, state).await
            }
            NodeId::ExtractSearchParams => extractor::extract_search_params(llm, prompts, state).await,
            NodeId::ExtractYears => extractor::extract_years(llm, prompts, state).await,
            NodeId::ExtractPartyParams => extractor::extract_party_params(llm, prompts, state).await,

            NodeId::GetConvocatoriaDetails => dispatch::get_details(registry, state).await,
            NodeId::SearchConvocatorias => dispatch::search(registry, state).await,
            NodeId::GetBeneficiaries => dispatch::get_beneficiaries(registry, state).await,
            NodeId::SearchPoliticalParties => dispatch::search_parties(registry, state).await,

            NodeId::GenerateDetailedResponse => {
                let plan = generator::prepare_detailed_response(state, prompts);
                state.apply_plan(plan, true);
            }
            NodeId::GenerateSearchSummary => {
                let plan = generator::prepare_search_summary(state, prompts);
                state.apply_plan(plan, true);
            }
            NodeId::GenerateGeneralResponse => {
                let plan = generator::prepare_general_response(state, prompts);
                state.apply_plan(plan, true);
            }
            NodeId::GenerateBeneficiariesSummary => {
                let plan = generator::prepare_beneficiaries_summary(state, prompts);
                state.apply_plan(plan, true);
            }
            NodeId::GeneratePartiesSummary => {
                let plan = generator::prepare_parties_summary(state, prompts);
                state.apply_plan(plan, true);
            }

            NodeId::ErrorHandler => {
                let text = error_handler::handle_error(state, self.locale);
                state.apply_plan(ResponsePlan::Complete(text), false);
            }
        }
    }
}
