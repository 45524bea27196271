use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::{info, warn};

use oxidized_travel::{
    config::Config,
    context::ConversationStore,
    db::{self, InMemoryStore, PgStore},
    llm::LlmGateway,
    places::PlacesGateway,
    router::{KeywordClassifier, KeywordOutcome},
    utils::init_logger,
};

#[derive(Parser)]
#[command(name = "oxidized-travel", version, about = "Multi-agent travel planning router")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP service (default)
    Serve {
        /// Overrides PORT
        #[arg(long)]
        port: Option<u16>,
    },
    /// Show how a message would be routed by keywords, without calling any provider
    Classify {
        message: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = Config::from_env()?;

    match cli.command.unwrap_or(Command::Serve { port: None }) {
        Command::Serve { port } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            serve(config).await
        }
        Command::Classify { message } => classify(&config, &message),
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let _log_guard = init_logger(&config.logging)?;
    info!(host = %config.server.host, port = config.server.port, "Configuration loaded");

    let store: Arc<dyn ConversationStore> = match &config.database {
        Some(database) => {
            let pool = db::create_pool(database)
                .await
                .context("Failed to connect to DATABASE_URL")?;
            info!("Using Postgres conversation store");
            Arc::new(PgStore::new(pool))
        }
        None => {
            warn!("DATABASE_URL not set; conversations are kept in memory");
            Arc::new(InMemoryStore::new())
        }
    };

    let llm = LlmGateway::from_config(&config.llm);
    let places = PlacesGateway::from_config(&config.places);

    let host = config.server.host.clone();
    let port = config.server.port;
    let state = oxidized_travel::build_state(config, llm, places, store);
    let app = oxidized_travel::create_router(state);

    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", host, port))?;
    info!("Server listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    Ok(())
}

fn classify(config: &Config, message: &str) -> anyhow::Result<()> {
    let classifier = KeywordClassifier::new(config.router.min_keyword_signal as u32);

    let scores: serde_json::Map<String, serde_json::Value> = classifier
        .scores(message)
        .into_iter()
        .map(|(agent, score)| (agent.label().to_string(), score.into()))
        .collect();

    let outcome = match classifier.classify(message) {
        KeywordOutcome::Match(agent, score) => serde_json::json!({ "match": agent, "score": score }),
        KeywordOutcome::Ambiguous(tied) => serde_json::json!({ "ambiguous": tied }),
        KeywordOutcome::NoSignal => serde_json::json!("no_signal"),
    };

    let report = serde_json::json!({
        "message": message,
        "threshold": classifier.threshold(),
        "scores": scores,
        "outcome": outcome,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
