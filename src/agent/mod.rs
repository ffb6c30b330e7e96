//! Módulo de Agentes - grafo de intención, extracción, consulta y respuesta
//!
//! Cada turno recorre un grafo fijo por capas: clasificar la intención,
//! extraer parámetros con el modelo, llamar al registro de subvenciones y
//! preparar el prompt de respuesta, que la sesión entrega en streaming.
//!
//! # Componentes Principales
//!
//! - [`graph::AgentGraph`] - Recorrido del grafo de nodos
//! - [`router`] - Identificadores de nodo y tablas de routing
//! - [`session::SessionOrchestrator`] - Historial y entrega de la respuesta
//! - [`prompts::PromptLibrary`] - Plantillas de prompt

mod classifier;
pub mod dispatch;
mod error_handler;
pub mod extractor;
pub mod generator;
pub mod graph;
pub mod json;
pub mod prompts;
pub mod response;
pub mod router;
pub mod session;
pub mod state;

pub use classifier::classify_label;
pub use error_handler::user_message;
pub use graph::AgentGraph;
pub use prompts::{PromptError, PromptKind, PromptLibrary};
pub use response::{generate_text, GeneratedText};
pub use router::NodeId;
pub use session::{
    format_history, HistoryStore, InMemoryHistoryStore, SessionOrchestrator, Turn, TurnOutput,
};
pub use state::{ApiParams, ApiPayload, ExecutionState, Intent, ResponsePlan, SearchResult, YearBucket};
