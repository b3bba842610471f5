use clap::Parser;
use nim_proxy::config::{config_search_paths, UpstreamFormat};
use nim_proxy::{build_router, AppState, ProxyConfig, SharedLogger};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "nim-proxy",
    about = "OpenAI-compatible proxy for NVIDIA NIM hosted models",
    version
)]
struct Cli {
    /// Path to config file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config and $PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Upstream preset name (overrides config)
    #[arg(long)]
    upstream: Option<String>,

    /// JSONL request log path
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Print config search paths and exit
    #[arg(long)]
    show_config_paths: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "nim_proxy=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if cli.show_config_paths {
        println!("Config search paths:");
        for (i, path) in config_search_paths().iter().enumerate() {
            println!("  {}. {}", i + 1, path.display());
        }
        return Ok(());
    }

    let mut config = ProxyConfig::find_and_load(cli.config.as_deref())?;

    if let Some(ref upstream) = cli.upstream {
        config.select_upstream(upstream);
    }

    config.apply_env()?;
    if let Some(port) = cli.port {
        config.port = port;
    }

    let logger = match cli.log_file {
        Some(ref path) => SharedLogger::new(path)?,
        None => SharedLogger::disabled(),
    };

    let base_url = config.effective_base_url()?;
    if config.api_key.is_none() {
        warn!(
            "{} is not set; chat requests will fail with a configuration error",
            config.upstream.api_key_env
        );
    }

    let format = match config.effective_format() {
        UpstreamFormat::Chat => "chat completions",
        UpstreamFormat::Prompt => "raw prompt",
    };

    info!("nim-proxy v{}", env!("CARGO_PKG_VERSION"));
    info!("  Upstream:      {} ({})", config.upstream.name, format);
    info!("  Base URL:      {}", base_url);
    info!("  Default model: {}", config.defaults.model);
    info!("  Max tokens:    {}", config.defaults.max_tokens);
    info!("  Always filter: {}", config.filter.always);
    info!("  Port:          {}", config.port);

    logger.info(
        "startup",
        format!(
            "Starting nim-proxy upstream={} base_url={} port={}",
            config.upstream.name, base_url, config.port
        ),
    );

    let port = config.port;
    let state = Arc::new(AppState::from_config(config, logger)?);
    info!("  Models:        {} registered", state.registry.len());

    let app = build_router(state);
    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    info!("Listening on http://{}", bind_addr);
    info!("  OPENAI_BASE_URL=http://localhost:{}/v1", port);

    axum::serve(listener, app).await?;

    Ok(())
}
