//! Subvenciones - asistente conversacional para la BDNS
//!
//! Chat interactivo, preguntas sueltas y consultas directas al registro.

use anyhow::Context;
use clap::Parser;
use futures::StreamExt;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use subvenciones::{
    agent::{AgentGraph, InMemoryHistoryStore, PromptLibrary, SessionOrchestrator, TurnOutput},
    config::AppConfig,
    i18n::{init_locale, init_locale_with, Locale, Text},
    llm::{create_provider, ModelProvider, ProviderCompletion},
    log_error, log_info, logging,
    registry::{InfoSubvencionesClient, SearchParams, SubsidyRegistry},
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Interactive conversation (default)
    Chat {
        /// Conversation id (a new one is generated if omitted)
        #[arg(long)]
        conversation: Option<String>,
    },
    /// Ask a single question and print the answer
    Ask {
        /// Question in natural language
        query: String,
        /// Conversation id
        #[arg(long, default_value = "cli")]
        conversation: String,
        /// Generate the whole answer before printing it
        #[arg(long)]
        no_stream: bool,
    },
    /// Search grant calls directly, without the model
    Buscar {
        /// Free-text description
        #[arg(long)]
        descripcion: String,
        /// Zero-based page
        #[arg(long, default_value = "0")]
        page: String,
        #[arg(long, default_value = "50")]
        page_size: String,
        /// Lower date bound (dd/mm/yyyy)
        #[arg(long)]
        fecha_desde: Option<String>,
        /// Upper date bound (dd/mm/yyyy)
        #[arg(long)]
        fecha_hasta: Option<String>,
        /// 1 = any word, 2 = all words, 3 = exact phrase
        #[arg(long, default_value = "1")]
        tipo_busqueda: String,
    },
    /// Print the details of one grant call
    Convocatoria {
        /// Call id or call number
        id: String,
    },
}

#[derive(Parser, Debug)]
#[command(name = "subvenciones")]
#[command(version)]
#[command(about = "Conversational assistant for the Spanish subsidies registry (BDNS)", long_about = None)]
struct Args {
    /// Configuration file path (overrides defaults)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Language for fixed messages: es | en
    #[arg(long)]
    language: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let app_config = AppConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    let command = args.command.unwrap_or(Command::Chat { conversation: None });
    let interactive = matches!(command, Command::Chat { .. });
    init_logging(args.verbose || app_config.debug, interactive);

    let locale = match args.language.as_deref().or(app_config.language.as_deref()) {
        Some(language) => init_locale_with(Locale::from_language(language).unwrap_or_else(Locale::detect)),
        None => init_locale(),
    };

    let registry = Arc::new(InfoSubvencionesClient::new(&app_config.registry));

    match command {
        Command::Buscar {
            descripcion,
            page,
            page_size,
            fecha_desde,
            fecha_hasta,
            tipo_busqueda,
        } => {
            let params = SearchParams {
                page,
                page_size,
                description_search_mode: tipo_busqueda,
                date_from: fecha_desde,
                date_to: fecha_hasta,
                ..SearchParams::new(descripcion)
            };
            let body = registry
                .search_convocatorias(&params)
                .await
                .context("Registry search failed")?;
            println!("{}", serde_json::to_string_pretty(&body)?);
            Ok(())
        }
        Command::Convocatoria { id } => {
            let body = registry
                .get_convocatoria(&id)
                .await
                .with_context(|| format!("Could not fetch convocatoria {}", id))?;
            println!("{}", serde_json::to_string_pretty(&body)?);
            Ok(())
        }
        Command::Ask {
            query,
            conversation,
            no_stream,
        } => {
            let session = build_session(&app_config, registry, locale).await?;
            let session = session.with_streaming(!no_stream);
            let output = session.process_conversation(&query, &conversation).await;
            print_output(output).await?;
            Ok(())
        }
        Command::Chat { conversation } => {
            let session = build_session(&app_config, registry, locale).await?;
            let conversation = conversation.unwrap_or_else(SessionOrchestrator::new_conversation_id);
            run_chat(session, &conversation, locale).await
        }
    }
}

/// Build the provider, check it answers, and wire the graph into a session
async fn build_session(
    config: &AppConfig,
    registry: Arc<InfoSubvencionesClient>,
    locale: Locale,
) -> anyhow::Result<SessionOrchestrator> {
    log_info!(
        "Connecting to {} at {} ({})",
        config.model.provider,
        config.model.url,
        config.model.model
    );
    let provider: Arc<dyn ModelProvider> = Arc::from(
        create_provider(config.model.clone()).context("Failed to create model provider")?,
    );

    if let Err(e) = provider.validate_connection().await {
        log_error!("❌ Failed to connect to model provider: {}", e);
        log_error!("For Ollama, make sure it's running and the model is pulled:");
        log_error!("  ollama serve");
        log_error!("  ollama pull {}", config.model.model);
        log_error!("For other providers, check your API keys and configuration.");
        return Err(e.into());
    }

    let prompts = PromptLibrary::load(config.prompts_dir.as_deref())
        .context("Failed to load prompt templates")?;
    let llm = Arc::new(ProviderCompletion::new(provider));
    let graph = AgentGraph::new(llm, registry, prompts, locale);
    let history = Arc::new(InMemoryHistoryStore::new(config.history_turns));

    Ok(SessionOrchestrator::new(Arc::new(graph), history))
}

/// Print a turn as it arrives
async fn print_output(output: TurnOutput) -> anyhow::Result<()> {
    let mut stdout = std::io::stdout();
    match output {
        TurnOutput::Text(text) => writeln!(stdout, "{}", text)?,
        TurnOutput::Stream(mut stream) => {
            while let Some(fragment) = stream.next().await {
                write!(stdout, "{}", fragment)?;
                stdout.flush()?;
            }
            writeln!(stdout)?;
        }
    }
    Ok(())
}

async fn run_chat(session: SessionOrchestrator, conversation: &str, locale: Locale) -> anyhow::Result<()> {
    println!("{}", Text::ChatWelcome.in_locale(locale));
    println!("(log: {})", logging::get_log_path_display());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("{}", Text::ChatPrompt.in_locale(locale));
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let query = line.trim();
        if matches!(query, "exit" | "quit" | "salir") {
            break;
        }
        if query.is_empty() {
            continue;
        }

        let output = session.process_conversation(query, conversation).await;
        print_output(output).await?;
    }

    println!("{}", Text::ChatGoodbye.in_locale(locale));
    Ok(())
}

/// Initialize logging
fn init_logging(verbose: bool, interactive: bool) {
    // The chat streams answers to stdout, so its logs go to the file only
    if interactive {
        if let Err(e) = logging::init_logger() {
            eprintln!("Could not open log file: {}", e);
        }
        return;
    }

    let filter = if verbose {
        "subvenciones=debug,info"
    } else {
        "subvenciones=info,warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}
