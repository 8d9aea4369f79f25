use std::sync::Arc;

use dashmap::DashMap;
use foundation::Tile;
use futures_util::FutureExt;
use futures_util::future::Shared;
use runtime::WorkerError;
use streaming::{BoxFuture, LoadError, PriceRange, PropertyLoader};
use tracing::debug;

use crate::config::HeatmapConfig;
use crate::gaussian::{GaussianKernel, gaussian_kernel};
use crate::price_grid::generate_price_grid;
use crate::raster::{rasterize, transparent_tile};
use crate::worker::WorkerRenderer;

/// Row-major RGBA pixels of one tile.
pub type TileImage = Arc<[u8]>;

pub type RenderFuture = BoxFuture<'static, Result<TileImage, RenderError>>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RenderError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Worker(#[from] WorkerError),
    #[error("remote renderer failed: {0}")]
    Remote(String),
}

/// Produces the pixels of a tile.
///
/// The returned future owns everything it needs so callers can spawn it; it
/// may never resolve, and callers must not block on it.
pub trait Renderer: Send + Sync {
    fn render_tile(&self, tile: Tile) -> RenderFuture;
}

impl<R: Renderer + ?Sized> Renderer for Arc<R> {
    fn render_tile(&self, tile: Tile) -> RenderFuture {
        (**self).render_tile(tile)
    }
}

/// Heatmap tiles computed on the async runtime.
#[derive(Clone)]
pub struct HeatmapRenderer {
    loader: Arc<PropertyLoader>,
    kernel: GaussianKernel,
    tile_size: u32,
    radius: u32,
    max_weight: f64,
    price_range: Option<PriceRange>,
}

impl HeatmapRenderer {
    pub fn new(loader: Arc<PropertyLoader>, config: &HeatmapConfig) -> Self {
        Self {
            loader,
            kernel: gaussian_kernel(config.radius),
            tile_size: config.tile_size,
            radius: config.radius,
            max_weight: config.max_weight,
            price_range: config.price_range,
        }
    }

    /// Uses a fixed color scale instead of the loader's robust range.
    pub fn with_price_range(mut self, range: PriceRange) -> Self {
        self.price_range = Some(range);
        self
    }
}

/// Fixed range if configured, otherwise the loader's memoized one.
pub(crate) async fn resolve_price_range(
    fixed: Option<PriceRange>,
    loader: &PropertyLoader,
) -> Result<Option<PriceRange>, LoadError> {
    match fixed {
        Some(range) => Ok(Some(range)),
        None => loader.fetch_property_range().await,
    }
}

impl Renderer for HeatmapRenderer {
    fn render_tile(&self, tile: Tile) -> RenderFuture {
        let this = self.clone();
        Box::pin(async move {
            let Some(range) = resolve_price_range(this.price_range, &this.loader).await? else {
                debug!(tile = %tile, "no price range, rendering transparent tile");
                return Ok(transparent_tile(this.tile_size).into());
            };

            let grid =
                generate_price_grid(this.tile_size, this.radius, &this.kernel, &this.loader, tile)
                    .await?;
            tokio::task::yield_now().await;
            let image = rasterize(this.tile_size, &range, this.max_weight, &grid);
            debug!(tile = %tile, cells = grid.len(), "rendered tile");
            Ok(image.into())
        })
    }
}

type SharedRender = Shared<RenderFuture>;

/// Coalesces renders by tile.
///
/// The first request for a tile starts the inner render; every later request
/// gets the same pending-or-completed result, failures included.
pub struct CachingRenderer<R> {
    inner: R,
    renders: DashMap<Tile, SharedRender>,
}

impl<R: Renderer> CachingRenderer<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            renders: DashMap::new(),
        }
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    pub fn len(&self) -> usize {
        self.renders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.renders.is_empty()
    }

    /// Forgets one tile so the next request renders it again.
    pub fn invalidate(&self, tile: &Tile) {
        self.renders.remove(tile);
    }

    pub fn clear(&self) {
        self.renders.clear();
    }
}

impl<R: Renderer> Renderer for CachingRenderer<R> {
    fn render_tile(&self, tile: Tile) -> RenderFuture {
        let shared = self
            .renders
            .entry(tile)
            .or_insert_with(|| self.inner.render_tile(tile).shared())
            .clone();
        Box::pin(shared)
    }
}

/// Renderer selected by `config`: on the runtime, or on worker threads when
/// `render_workers > 0`, wrapped in a [`CachingRenderer`].
pub fn build_renderer(
    config: &HeatmapConfig,
    loader: Arc<PropertyLoader>,
) -> CachingRenderer<Arc<dyn Renderer>> {
    let inner: Arc<dyn Renderer> = if config.render_workers > 0 {
        Arc::new(WorkerRenderer::new(loader, config))
    } else {
        Arc::new(HeatmapRenderer::new(loader, config))
    };
    CachingRenderer::new(inner)
}
