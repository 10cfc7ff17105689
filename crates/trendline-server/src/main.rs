use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use trendline_server::state::AppState;

/// `trendline health` — liveness check for Docker HEALTHCHECK.
///
/// Calls `GET http://localhost:$TRENDLINE_PORT/health`.
/// Exits 0 if the server responds with HTTP 200, exits 1 otherwise.
fn run_health_check() -> ! {
    let port = std::env::var("TRENDLINE_PORT").unwrap_or_else(|_| "3000".to_string());
    let url = format!("http://localhost:{}/health", port);
    match ureq::get(&url).call() {
        Ok(resp) if resp.status() == 200 => std::process::exit(0),
        _ => std::process::exit(1),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.get(1).map(|s| s.as_str()) == Some("health") {
        run_health_check();
    }
    // Structured JSON logging. Level controlled via RUST_LOG.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("trendline=info".parse()?),
        )
        .json()
        .init();

    let cfg = trendline_core::config::Config::from_env().map_err(|e| anyhow::anyhow!(e))?;

    std::fs::create_dir_all(&cfg.data_dir)?;
    let db_path = format!("{}/trendline.db", cfg.data_dir);
    let db = trendline_duckdb::DuckDbBackend::open(&db_path, &cfg.duckdb_memory_limit)?;

    let missing = cfg.missing_settings();
    if !missing.is_empty() {
        warn!(
            missing = %missing.join(", "),
            "Some settings are unset. Report generation needs the GA settings; \
             narratives need OPENAI_API_KEY."
        );
    }

    let state = Arc::new(AppState::new(db, cfg.clone())?);
    if state.narrator.is_none() {
        info!("OPENAI_API_KEY not set: reports get the unavailable-analysis placeholder");
    }

    let addr = format!("0.0.0.0:{}", cfg.port);
    let app = trendline_server::app::build_app(Arc::clone(&state));

    info!(port = cfg.port, "Trendline listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;

    Ok(())
}
