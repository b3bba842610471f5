//! Start a nim-proxy server programmatically.
//!
//! Usage:
//!   export NVIDIA_API_KEY=nvapi-your-key
//!   cargo run --example basic_proxy

use nim_proxy::{build_router, AppState, ProxyConfig, SharedLogger};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let mut config = ProxyConfig::find_and_load(None)?;
    config.apply_env()?;
    let base_url = config.effective_base_url()?;

    println!("Upstream: {} ({})", config.upstream.name, base_url);
    println!("Default model: {}", config.defaults.model);

    let logger = SharedLogger::new("proxy-example.log")?;
    let port = config.port;
    let state = Arc::new(AppState::from_config(config, logger)?);

    let app = build_router(state);
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    println!("Listening on http://{}", addr);
    println!();
    println!("  curl http://localhost:{}/v1/chat/completions \\", port);
    println!("    -H 'Content-Type: application/json' \\");
    println!("    -d '{{\"messages\":[{{\"role\":\"user\",\"content\":\"hi\"}}],\"disable_reasoning\":true}}'");

    axum::serve(listener, app).await?;
    Ok(())
}
