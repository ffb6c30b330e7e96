//! Language model access: HTTP providers and the completion facade

pub mod facade;
pub mod provider;

pub use facade::{is_failed_completion, CompletionFacade, ProviderCompletion, TokenStream, ERROR_PREFIX};
pub use provider::{create_provider, ModelProvider, ProviderError, ProviderResponse};
