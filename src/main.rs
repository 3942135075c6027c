//! Research search server
//!
//! Serves the JSON search API over the configured providers.

use anyhow::Result;
use research_search::{
    config::{self, SETTINGS_PATH_ENV},
    users::InMemoryUserDirectory,
    web::{create_router, AppState},
    SearchService,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, reload, EnvFilter};

/// Environment variable naming a YAML file of user records
const USERS_PATH_ENV: &str = "RESEARCH_USERS_PATH";

const LIMITER_PRUNE_INTERVAL: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> Result<()> {
    if !handle_args()? {
        return Ok(());
    }

    // Logging starts at info so settings discovery is visible; the file's
    // debug flag is applied once it has been read
    let from_env = EnvFilter::try_from_default_env().ok();
    let has_env_filter = from_env.is_some();
    let (filter, filter_handle) =
        reload::Layer::new(from_env.unwrap_or_else(|| EnvFilter::new("info")));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .init();

    info!("Starting research-search v{}", research_search::VERSION);

    let settings = config::load()?;
    if settings.general.debug && !has_env_filter {
        filter_handle.reload(EnvFilter::new("debug"))?;
    }
    info!("Loaded configuration for instance: {}", settings.general.instance_name);

    let directory = match std::env::var(USERS_PATH_ENV) {
        Ok(path) => {
            info!("Loading users from: {}", path);
            InMemoryUserDirectory::from_file(&path)?
        }
        Err(_) => {
            warn!("{} not set, starting with no users", USERS_PATH_ENV);
            InMemoryUserDirectory::new()
        }
    };
    info!("{} users loaded", directory.len().await);

    let addr = SocketAddr::new(settings.server.bind_address.parse()?, settings.server.port);

    let service = SearchService::new(settings)?;
    let state = AppState::new(service, Arc::new(directory));
    spawn_limiter_pruning(state.clone());
    let app = create_router(state);

    info!("Starting server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

fn spawn_limiter_pruning(state: AppState) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(LIMITER_PRUNE_INTERVAL);
        loop {
            ticker.tick().await;
            state.prune_limiters();
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

/// Handle `--config`, `--help` and `--version`; `false` means exit now
fn handle_args() -> Result<bool> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-c" | "--config" => {
                let path = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("{} requires a file path", arg))?;
                std::env::set_var(SETTINGS_PATH_ENV, path);
            }
            "-h" | "--help" => {
                print_usage();
                return Ok(false);
            }
            "-V" | "--version" => {
                println!("research-search {}", research_search::VERSION);
                return Ok(false);
            }
            other => anyhow::bail!("unknown argument: {} (try --help)", other),
        }
    }
    Ok(true)
}

fn print_usage() {
    println!(
        r#"
research-search v{}
Cascading research search across AI and web providers

USAGE:
    research-search [OPTIONS]

OPTIONS:
    -c, --config <FILE>    Path to configuration file
    -h, --help             Print help information
    -V, --version          Print version information

ENVIRONMENT VARIABLES:
    RESEARCH_SETTINGS_PATH     Path to settings.yml
    RESEARCH_USERS_PATH        Path to a YAML list of user records
    RESEARCH_DEBUG             Enable debug logging (true/false)
    RESEARCH_PORT              Server port
    RESEARCH_BIND_ADDRESS      Bind address
    RESEARCH_FALLBACK_ENABLED  Serve offline previews when providers fail
    OPENAI_API_KEY             Default suggestion provider key
    PERPLEXITY_API_KEY         Default answer provider key
    PERPLEXITY_SHARED_API_KEY  Shared answer provider key
    SERPAPI_API_KEY            Default web search provider key
    RUST_LOG                   Log filter, overrides RESEARCH_DEBUG
"#,
        research_search::VERSION
    );
}
