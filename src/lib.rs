//! Subvenciones - asistente conversacional sobre el registro nacional de subvenciones
//!
//! Responde en lenguaje natural a preguntas sobre convocatorias, grandes
//! beneficiarios y ayudas a partidos políticos, consultando la API pública de
//! la BDNS (InfoSubvenciones) y redactando la respuesta con un modelo de lenguaje.
//!
//! # Arquitectura
//!
//! - **Agent Graph**: grafo fijo de nodos (intención, extracción, llamada al
//!   registro, respuesta) con routing por capas
//! - **Deferred Generation**: los nodos finales dejan preparado el prompt y la
//!   sesión genera la respuesta en streaming
//! - **Model Providers**: Ollama, OpenAI-compatible y Gemini detrás de un mismo trait
//!
//! # Módulos Principales
//!
//! - [`agent`] - Grafo, nodos y sesiones de conversación
//! - [`llm`] - Proveedores de modelo y fachada de completado
//! - [`registry`] - Cliente de la API de InfoSubvenciones
//! - [`config`] - Configuración de la aplicación
//!
//! # Ejemplo de Uso
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use subvenciones::agent::{AgentGraph, InMemoryHistoryStore, PromptLibrary, SessionOrchestrator};
//! use subvenciones::config::AppConfig;
//! use subvenciones::llm::{create_provider, ProviderCompletion};
//! use subvenciones::registry::InfoSubvencionesClient;
//! use subvenciones::Locale;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = AppConfig::default();
//! let provider = create_provider(config.model.clone())?;
//! let llm = Arc::new(ProviderCompletion::new(Arc::from(provider)));
//! let registry = Arc::new(InfoSubvencionesClient::new(&config.registry));
//! let graph = AgentGraph::new(llm, registry, PromptLibrary::builtin(), Locale::Spanish);
//!
//! let session = SessionOrchestrator::new(Arc::new(graph), Arc::new(InMemoryHistoryStore::default()));
//! let answer = session
//!     .process_conversation("ayudas para placas solares en 2024", "demo")
//!     .await
//!     .into_text()
//!     .await;
//! println!("{answer}");
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod config;
pub mod i18n;
pub mod llm;
pub mod logging;
pub mod registry;
#[doc(hidden)]
pub mod testing;

pub use agent::{AgentGraph, SessionOrchestrator};
pub use i18n::{current_locale, init_locale, t, Locale, Text};
pub use registry::{InfoSubvencionesClient, SubsidyRegistry};
