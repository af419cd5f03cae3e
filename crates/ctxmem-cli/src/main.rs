//! `ctxmem` -- serves the context memory HTTP API (spec.md §6, §7).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use ctxmem_bus::{Bus, BusConfig};
use ctxmem_llm::{HttpEmbeddingClient, HttpLlmClient};
use ctxmem_server::AppState;
use ctxmem_store::Database;
use ctxmem_types::{CoreConfig, ProjectConfig};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

const DEFAULT_LLM_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Parser)]
#[command(name = "ctxmem")]
#[command(about = "Agent-driven context memory service", long_about = None)]
#[command(version)]
struct Cli {
    /// Core config file (TOML). Falls back to CTXMEM_* environment variables.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Per-project customization file (TOML). Falls back to defaults.
    #[arg(long)]
    project_config: Option<PathBuf>,

    /// Address to bind the HTTP server to.
    #[arg(long, default_value = "0.0.0.0:8080")]
    listen: SocketAddr,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = CoreConfig::from_env_and_file(cli.config.as_deref()).context("loading core config")?;
    let project_config = load_project_config(cli.project_config.as_deref())?;

    let db = Database::open(std::path::Path::new(&config.database_url)).context("opening database")?;
    let db = Arc::new(Mutex::new(db));

    let base_url = config.llm_base_url.clone().unwrap_or_else(|| DEFAULT_LLM_BASE_URL.to_string());
    let llm = Arc::new(HttpLlmClient::new(base_url.clone(), config.llm_api_key.clone(), config.llm_model.clone()));
    let embedder = Arc::new(HttpEmbeddingClient::new(base_url, config.llm_api_key.clone(), config.embedding_model.clone()));

    let bus = Arc::new(Bus::new(BusConfig::from(&config)));

    let state = AppState {
        db,
        llm,
        embedder,
        bus,
        config: Arc::new(config),
        project_config: Arc::new(project_config),
    };

    let router = ctxmem_server::build_router(state);

    let listener = TcpListener::bind(cli.listen).await.context("binding listener")?;
    tracing::info!(addr = %cli.listen, "ctxmem listening");
    axum::serve(listener, router).await.context("serving")?;

    Ok(())
}

fn load_project_config(path: Option<&std::path::Path>) -> Result<ProjectConfig> {
    let Some(path) = path else {
        return Ok(ProjectConfig::default());
    };
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}
