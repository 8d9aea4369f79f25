use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::http::HeaderValue;
use clap::Parser;
use compute::HeatmapConfig;
use heatmap_server::{router, AppState, HttpListingSource, DEFAULT_LISTINGS_URL};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Real-estate price heatmap tile service")]
struct Args {
    #[arg(long, env = "HEATMAP_ADDR", default_value = "127.0.0.1:9200")]
    addr: SocketAddr,

    /// Directory for rendered tiles; tiles are not cached on disk when unset
    #[arg(long, env = "HEATMAP_CACHE_ROOT")]
    cache_root: Option<PathBuf>,

    /// Listing search endpoint
    #[arg(long, env = "LISTINGS_URL", default_value = DEFAULT_LISTINGS_URL)]
    listings_url: String,

    /// Single origin allowed by CORS; any origin when unset
    #[arg(long, env = "HEATMAP_ALLOW_ORIGIN")]
    allow_origin: Option<String>,

    /// JSON file with heatmap tunables
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config: HeatmapConfig = match &args.config {
        Some(path) => serde_json::from_slice(&tokio::fs::read(path).await?)?,
        None => HeatmapConfig::default(),
    };

    if let Some(root) = &args.cache_root {
        if let Err(err) = tokio::fs::create_dir_all(root).await {
            warn!("failed to create cache root {}: {err}", root.display());
        }
    }

    let allow_origin = args
        .allow_origin
        .as_deref()
        .map(HeaderValue::from_str)
        .transpose()?;

    let source = HttpListingSource::new(reqwest::Client::new(), args.listings_url.clone());
    let state = AppState::new(Arc::new(source), config, args.cache_root.clone());
    let app = router(state, allow_origin);

    info!(listings = %args.listings_url, "heatmap server listening on http://{}", args.addr);
    let listener = tokio::net::TcpListener::bind(args.addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
