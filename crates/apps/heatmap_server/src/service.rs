//! `GET /heatmap`: renders one tile for a search and returns its RGBA bytes
//! as a JSON array.
//!
//! Responses are cached on disk for the current week, keyed by a hash of the
//! week and the request parameters.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::{Query, State};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use compute::{HeatmapConfig, HeatmapRenderer, RenderError, Renderer};
use dashmap::DashMap;
use foundation::Tile;
use serde::{Deserialize, Serialize};
use serde_json::json;
use streaming::{PropertyLoader, PropertySource, SearchSettings};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

pub const ONE_WEEK_MS: u64 = 1000 * 60 * 60 * 24 * 7;

const MAX_TILE_SIZE: u32 = 1024;
const MAX_RADIUS: u32 = 256;
const MAX_TILE_ZOOM: u8 = 24;
/// How many zoom levels above the property block zoom a tile may sit; each
/// level quadruples the blocks one render fetches.
const MAX_BLOCK_ZOOM_GAP: u8 = 2;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("missing query parameter `{0}`")]
    Missing(&'static str),
    #[error("invalid query parameter `{name}`: {reason}")]
    Invalid { name: &'static str, reason: String },
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("failed to encode tile: {0}")]
    Encode(#[from] serde_json::Error),
}

impl ServiceError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::Missing(_) | ServiceError::Invalid { .. } => StatusCode::BAD_REQUEST,
            ServiceError::Render(_) | ServiceError::Encode(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(error = %self, "heatmap request failed");
        }
        (status, Json(json!({ "message": self.to_string() }))).into_response()
    }
}

/// Raw query string of `GET /heatmap`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeatmapQuery {
    pub search_options: Option<String>,
    pub tile: Option<String>,
    pub radius: Option<String>,
    pub tile_size: Option<String>,
}

/// Validated request; also the cache key material.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeatmapParams {
    pub search_options: SearchSettings,
    pub tile: Tile,
    pub radius: u32,
    pub tile_size: u32,
}

impl HeatmapParams {
    pub fn parse(query: &HeatmapQuery) -> Result<Self, ServiceError> {
        let search_options = query
            .search_options
            .as_deref()
            .ok_or(ServiceError::Missing("searchOptions"))?;
        let tile = query.tile.as_deref().ok_or(ServiceError::Missing("tile"))?;
        let radius = query.radius.as_deref().ok_or(ServiceError::Missing("radius"))?;
        let tile_size = query
            .tile_size
            .as_deref()
            .ok_or(ServiceError::Missing("tileSize"))?;

        let search_options: SearchSettings =
            serde_json::from_str(search_options).map_err(|err| ServiceError::Invalid {
                name: "searchOptions",
                reason: err.to_string(),
            })?;
        let tile: Tile = serde_json::from_str(tile).map_err(|err| ServiceError::Invalid {
            name: "tile",
            reason: err.to_string(),
        })?;
        check_tile(&tile)?;
        let tile_size = parse_bounded("tileSize", tile_size, 1, MAX_TILE_SIZE)?;
        // The kernel margin must stay within one neighbouring tile.
        let radius = parse_bounded("radius", radius, 0, MAX_RADIUS.min(tile_size))?;

        Ok(Self {
            search_options: search_options.normalized(),
            tile,
            radius,
            tile_size,
        })
    }
}

fn check_tile(tile: &Tile) -> Result<(), ServiceError> {
    if tile.zoom > MAX_TILE_ZOOM {
        return Err(ServiceError::Invalid {
            name: "tile",
            reason: format!("zoom {} is above {MAX_TILE_ZOOM}", tile.zoom),
        });
    }
    let n = 1i64 << tile.zoom;
    if !(0..n).contains(&tile.point.x) || !(0..n).contains(&tile.point.y) {
        return Err(ServiceError::Invalid {
            name: "tile",
            reason: format!("{tile} is outside the zoom {} grid", tile.zoom),
        });
    }
    Ok(())
}

fn parse_bounded(name: &'static str, value: &str, min: u32, max: u32) -> Result<u32, ServiceError> {
    let parsed: u32 = value.trim().parse().map_err(|_| ServiceError::Invalid {
        name,
        reason: format!("`{value}` is not a whole number"),
    })?;
    if parsed < min || parsed > max {
        return Err(ServiceError::Invalid {
            name,
            reason: format!("{parsed} is outside {min}..={max}"),
        });
    }
    Ok(parsed)
}

/// `now_ms` floored to a whole week.
pub fn week_timestamp(now_ms: u64) -> u64 {
    now_ms / ONE_WEEK_MS * ONE_WEEK_MS
}

/// Hex blake3 of `{ "timestamp": .., "params": .. }`.
pub fn cache_key(timestamp: u64, params: &HeatmapParams) -> Result<String, ServiceError> {
    let material = serde_json::to_vec(&json!({ "timestamp": timestamp, "params": params }))?;
    Ok(blake3::hash(&material).to_hex().to_string())
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}

#[derive(Clone)]
pub struct AppState {
    inner: Arc<ServiceInner>,
}

struct ServiceInner {
    source: Arc<dyn PropertySource>,
    config: HeatmapConfig,
    cache_root: Option<PathBuf>,
    loaders: DashMap<(SearchSettings, u32), Arc<PropertyLoader>>,
}

impl AppState {
    pub fn new(
        source: Arc<dyn PropertySource>,
        config: HeatmapConfig,
        cache_root: Option<PathBuf>,
    ) -> Self {
        Self {
            inner: Arc::new(ServiceInner {
                source,
                config,
                cache_root,
                loaders: DashMap::new(),
            }),
        }
    }

    pub fn loader_count(&self) -> usize {
        self.inner.loaders.len()
    }

    /// One loader per normalized search and tile size, so block caches are
    /// shared between requests.
    fn loader(&self, params: &HeatmapParams) -> Arc<PropertyLoader> {
        let key = (params.search_options.clone(), params.tile_size);
        self.inner
            .loaders
            .entry(key)
            .or_insert_with(|| {
                debug!(tile_size = params.tile_size, "creating property loader");
                let config = HeatmapConfig {
                    tile_size: params.tile_size,
                    ..self.inner.config.clone()
                };
                Arc::new(PropertyLoader::new(
                    self.inner.source.clone(),
                    params.search_options.clone(),
                    config.loader_options(),
                ))
            })
            .clone()
    }

    /// JSON-encoded tile for `params`, from the disk cache when present.
    ///
    /// Returns the body and whether it came from the cache.
    pub async fn heatmap(
        &self,
        params: &HeatmapParams,
        timestamp: u64,
    ) -> Result<(Vec<u8>, bool), ServiceError> {
        let min_zoom = self
            .inner
            .config
            .property_block_zoom
            .saturating_sub(MAX_BLOCK_ZOOM_GAP);
        if params.tile.zoom < min_zoom {
            return Err(ServiceError::Invalid {
                name: "tile",
                reason: format!("zoom {} is below {min_zoom}", params.tile.zoom),
            });
        }

        let key = cache_key(timestamp, params)?;
        let cached_path = self
            .inner
            .cache_root
            .as_ref()
            .map(|root| root.join(format!("{key}.json")));

        if let Some(path) = &cached_path {
            if let Ok(body) = tokio::fs::read(path).await {
                debug!(key = %key, "serving cached heatmap");
                return Ok((body, true));
            }
        }

        let config = HeatmapConfig {
            tile_size: params.tile_size,
            radius: params.radius,
            ..self.inner.config.clone()
        };
        let renderer = HeatmapRenderer::new(self.loader(params), &config);
        let image = renderer.render_tile(params.tile).await?;
        let body = serde_json::to_vec(&*image)?;
        info!(tile = %params.tile, key = %key, "generated heatmap");

        if let Some(path) = &cached_path {
            if let Err(err) = tokio::fs::write(path, &body).await {
                warn!(path = %path.display(), error = %err, "failed to cache heatmap");
            }
        }
        Ok((body, false))
    }
}

pub fn router(state: AppState, allow_origin: Option<HeaderValue>) -> Router {
    let origin = match allow_origin {
        Some(origin) => AllowOrigin::exact(origin),
        None => AllowOrigin::from(Any),
    };
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_headers(Any)
        .allow_methods([Method::GET, Method::OPTIONS]);

    Router::new()
        .route("/healthz", get(healthz))
        .route("/heatmap", get(get_heatmap))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> Response {
    (StatusCode::OK, "ok").into_response()
}

async fn get_heatmap(
    State(state): State<AppState>,
    Query(query): Query<HeatmapQuery>,
) -> Result<Response, ServiceError> {
    let params = HeatmapParams::parse(&query)?;
    let (body, _) = state.heatmap(&params, week_timestamp(now_ms())).await?;

    let mut headers = HeaderMap::new();
    headers.insert(
        http::header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    headers.insert(
        http::header::CACHE_CONTROL,
        HeaderValue::from_static("max-age=604800"),
    );
    Ok((StatusCode::OK, headers, body).into_response())
}
