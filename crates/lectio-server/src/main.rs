use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use anyhow::Context;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{Level, info};
use tracing_subscriber::EnvFilter;

use lectio_server::rate_limit::RateLimiterLayer;
use lectio_server::{AppState, CommandAnalyzer, router};
use lectio_store::{LexiconStore, LoadMode};

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_STORE_PATH: &str = "lexicon.json";
const DEFAULT_ANALYZER_TIMEOUT_SECS: u64 = 30;
const DEFAULT_RATE_LIMIT_RPS: u32 = 5;
const DEFAULT_RATE_LIMIT_BURST: u32 = 10;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = load_config();
    info!("binding to {}:{}", config.host, config.port);
    match &config.store_path {
        Some(path) => info!(
            "using store snapshot at {} (mode: {:?})",
            path.display(),
            config.store_mode
        ),
        None => info!("persistence disabled; store is in-memory only"),
    }
    info!(
        "analyzer command: {} (timeout {}s)",
        config.analyzer_cmd,
        config.analyzer_timeout.as_secs()
    );
    info!(
        "rate limit: {} req/s (burst {})",
        config.rate_limit_rps, config.rate_limit_burst
    );

    let start = Instant::now();
    let store = match &config.store_path {
        Some(path) if path.exists() => LexiconStore::load(path, config.store_mode)
            .with_context(|| format!("loading snapshot from {}", path.display()))?,
        _ => LexiconStore::new(),
    };
    info!(
        "store ready in {} ms ({} entries, {} links)",
        start.elapsed().as_millis(),
        store.entry_count(),
        store.link_count()
    );

    let analyzer = CommandAnalyzer::from_command_line(&config.analyzer_cmd, config.analyzer_timeout)
        .context("ANALYZER_CMD must name a program")?;

    let state = AppState {
        store: Arc::new(RwLock::new(store)),
        analyzer: Arc::new(analyzer),
        store_path: config.store_path.clone(),
    };

    let rate_limiter = RateLimiterLayer::new(config.rate_limit_rps, config.rate_limit_burst);
    let app = router(state)
        .layer(rate_limiter)
        .layer(TraceLayer::new_for_http());
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("invalid listen address")?;
    let listener = TcpListener::bind(addr).await?;

    axum::serve(listener, app).await?;
    Ok(())
}

#[derive(Debug, Clone)]
struct Config {
    host: String,
    port: u16,
    store_path: Option<PathBuf>,
    store_mode: LoadMode,
    analyzer_cmd: String,
    analyzer_timeout: Duration,
    rate_limit_rps: u32,
    rate_limit_burst: u32,
}

fn load_config() -> Config {
    let mut no_persist = false;
    let mut cli_store: Option<PathBuf> = None;
    let mut cli_analyzer: Option<String> = None;
    for arg in env::args().skip(1) {
        if arg == "--no-persist" {
            no_persist = true;
        } else if let Some(path) = arg.strip_prefix("--store=") {
            cli_store = Some(PathBuf::from(path));
        } else if let Some(cmd) = arg.strip_prefix("--analyzer-cmd=") {
            cli_analyzer = Some(cmd.to_string());
        }
    }

    let host = env::var("HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());
    let port = env::var("PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(DEFAULT_PORT);
    let store_path = if no_persist {
        None
    } else {
        Some(
            cli_store
                .or_else(|| env::var("STORE_PATH").ok().map(PathBuf::from))
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_PATH)),
        )
    };
    let store_mode = env::var("STORE_LOAD_MODE")
        .ok()
        .as_deref()
        .and_then(parse_load_mode)
        .unwrap_or(LoadMode::Mmap);
    let analyzer_cmd = cli_analyzer
        .or_else(|| env::var("ANALYZER_CMD").ok())
        .unwrap_or_else(|| "latin-analyzer".to_string());
    let analyzer_timeout = env::var("ANALYZER_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|v| *v > 0)
        .map(Duration::from_secs)
        .unwrap_or(Duration::from_secs(DEFAULT_ANALYZER_TIMEOUT_SECS));
    let rate_limit_rps = env::var("RATE_LIMIT_RPS")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(DEFAULT_RATE_LIMIT_RPS);
    let rate_limit_burst = env::var("RATE_LIMIT_BURST")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(DEFAULT_RATE_LIMIT_BURST);

    Config {
        host,
        port,
        store_path,
        store_mode,
        analyzer_cmd,
        analyzer_timeout,
        rate_limit_rps,
        rate_limit_burst,
    }
}

fn parse_load_mode(raw: &str) -> Option<LoadMode> {
    match raw.to_ascii_lowercase().as_str() {
        "mmap" => Some(LoadMode::Mmap),
        "owned" => Some(LoadMode::Owned),
        _ => None,
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let max_level = env_filter
        .max_level_hint()
        .and_then(|hint| hint.into_level())
        .unwrap_or(Level::INFO);
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_level(true)
        .with_max_level(max_level)
        .init();
}
