use std::sync::Arc;

use foundation::Tile;
use runtime::WorkerPool;
use streaming::{PriceRange, PropertyInformation, PropertyLoader};
use tracing::debug;

use crate::config::HeatmapConfig;
use crate::gaussian::{GaussianKernel, gaussian_kernel};
use crate::price_grid::{compute_price_grid, tile_area_with_margin};
use crate::raster::{rasterize, transparent_tile};
use crate::renderer::{RenderFuture, Renderer, TileImage, resolve_price_range};

/// Everything a worker thread needs to paint one tile.
pub struct RenderJob {
    pub tile_size: u32,
    pub tile: Tile,
    pub properties: Vec<PropertyInformation>,
    pub kernel: GaussianKernel,
    pub range: PriceRange,
    pub max_weight: f64,
}

/// Grid and raster stages of a render, run off the async runtime.
pub fn run_render_job(job: RenderJob) -> TileImage {
    let grid = compute_price_grid(job.tile_size, job.tile, &job.properties, &job.kernel);
    rasterize(job.tile_size, &job.range, job.max_weight, &grid).into()
}

/// Loads listings on the runtime and hands the CPU-bound part to a
/// [`WorkerPool`] keyed by tile.
#[derive(Clone)]
pub struct WorkerRenderer {
    loader: Arc<PropertyLoader>,
    pool: Arc<WorkerPool<Tile, RenderJob, TileImage>>,
    kernel: GaussianKernel,
    tile_size: u32,
    radius: u32,
    max_weight: f64,
    price_range: Option<PriceRange>,
}

impl WorkerRenderer {
    pub fn new(loader: Arc<PropertyLoader>, config: &HeatmapConfig) -> Self {
        Self {
            loader,
            pool: Arc::new(WorkerPool::new(
                "render-worker",
                config.render_workers.max(1),
                run_render_job,
            )),
            kernel: gaussian_kernel(config.radius),
            tile_size: config.tile_size,
            radius: config.radius,
            max_weight: config.max_weight,
            price_range: config.price_range,
        }
    }

    pub fn workers(&self) -> usize {
        self.pool.capacity()
    }
}

impl Renderer for WorkerRenderer {
    fn render_tile(&self, tile: Tile) -> RenderFuture {
        let this = self.clone();
        Box::pin(async move {
            let Some(range) = resolve_price_range(this.price_range, &this.loader).await? else {
                return Ok(transparent_tile(this.tile_size).into());
            };

            let area = tile_area_with_margin(this.tile_size, tile, this.radius);
            let properties = this.loader.fetch_properties_in_area(area).await?;
            debug!(tile = %tile, properties = properties.len(), "dispatching render job");

            let job = RenderJob {
                tile_size: this.tile_size,
                tile,
                properties,
                kernel: this.kernel.clone(),
                range,
                max_weight: this.max_weight,
            };
            Ok(this.pool.execute(tile, job).await?)
        })
    }
}
