use std::time::Duration;

use serde::{Deserialize, Serialize};
use streaming::{LoaderOptions, PriceRange};

/// Tunables for the heatmap pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HeatmapConfig {
    pub tile_size: u32,
    /// Gaussian kernel radius in pixels.
    pub radius: u32,
    pub property_block_zoom: u8,
    pub fetch_concurrency: usize,
    pub page_size: u32,
    pub range_sample_size: usize,
    /// Weight that maps to full opacity.
    pub max_weight: f64,
    /// 0 renders on the async runtime; otherwise the number of worker threads.
    pub render_workers: usize,
    pub coalesce_window_ms: u64,
    /// Color scale override; the loader's robust range is used when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_range: Option<PriceRange>,
}

impl Default for HeatmapConfig {
    fn default() -> Self {
        Self {
            tile_size: 256,
            radius: 50,
            property_block_zoom: 12,
            fetch_concurrency: 5,
            page_size: 200,
            range_sample_size: 200,
            max_weight: 10.0,
            render_workers: 0,
            coalesce_window_ms: 16,
            price_range: None,
        }
    }
}

impl HeatmapConfig {
    pub fn loader_options(&self) -> LoaderOptions {
        LoaderOptions {
            tile_size: self.tile_size,
            block_zoom: self.property_block_zoom,
            concurrency: self.fetch_concurrency,
            page_size: self.page_size,
            sample_size: self.range_sample_size,
        }
    }

    pub fn coalesce_window(&self) -> Duration {
        Duration::from_millis(self.coalesce_window_ms)
    }
}
