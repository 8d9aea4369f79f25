use std::sync::Arc;

use compute::{RenderError, RenderFuture, Renderer};
use foundation::Tile;
use streaming::SearchSettings;
use tracing::debug;

/// Renders tiles by asking a remote heatmap tile service.
#[derive(Debug, Clone)]
pub struct ApiRenderer {
    client: reqwest::Client,
    url: String,
    radius: u32,
    tile_size: u32,
    search: Arc<SearchSettings>,
}

impl ApiRenderer {
    pub fn new(
        client: reqwest::Client,
        url: impl Into<String>,
        radius: u32,
        tile_size: u32,
        search: SearchSettings,
    ) -> Self {
        Self {
            client,
            url: url.into(),
            radius,
            tile_size,
            search: Arc::new(search),
        }
    }

    fn query(&self, tile: Tile) -> Result<Vec<(&'static str, String)>, RenderError> {
        let encode = |err: serde_json::Error| RenderError::Remote(err.to_string());
        Ok(vec![
            ("searchOptions", serde_json::to_string(&*self.search).map_err(encode)?),
            ("tile", serde_json::to_string(&tile).map_err(encode)?),
            ("radius", self.radius.to_string()),
            ("tileSize", self.tile_size.to_string()),
        ])
    }
}

impl Renderer for ApiRenderer {
    fn render_tile(&self, tile: Tile) -> RenderFuture {
        let this = self.clone();
        Box::pin(async move {
            let query = this.query(tile)?;
            let response = this
                .client
                .get(&this.url)
                .query(&query)
                .send()
                .await
                .map_err(|err| RenderError::Remote(err.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                return Err(RenderError::Remote(format!(
                    "tile service returned status {}",
                    status.as_u16()
                )));
            }

            let bytes: Vec<u8> = response
                .json()
                .await
                .map_err(|err| RenderError::Remote(err.to_string()))?;
            let expected = 4 * this.tile_size as usize * this.tile_size as usize;
            if bytes.len() != expected {
                return Err(RenderError::Remote(format!(
                    "expected {expected} bytes for tile {tile}, got {}",
                    bytes.len()
                )));
            }
            debug!(tile = %tile, "fetched remote tile");
            Ok(bytes.into())
        })
    }
}
