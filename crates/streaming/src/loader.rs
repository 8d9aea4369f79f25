use std::sync::Arc;

use foundation::{CoordinateArea, Tile, calculate_visible_tiles, coordinate_is_inside_area, tile_to_area};
use futures_util::FutureExt;
use futures_util::future::join_all;
use parking_lot::{Mutex, RwLock};
use runtime::ResourcePool;
use tracing::{debug, warn};

use crate::cache::{ResidencyHandle, SharedCache, SharedResult};
use crate::property::{PropertyInformation, normalize_listings};
use crate::range::{PriceRange, robust_maximum, robust_minimum};
use crate::residency::ResidencyState;
use crate::search::{SearchSettings, SortType};
use crate::source::{PageRequest, PropertySource, SourceError};

/// Listings of one block, shared by every tile that needs them.
pub type PropertyBlock = Arc<[PropertyInformation]>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LoadError {
    #[error("failed to fetch property block {tile}: {source}")]
    Block { tile: Tile, source: SourceError },
    #[error("failed to fetch the price sample: {0}")]
    Sample(SourceError),
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct LoaderOptions {
    pub tile_size: u32,
    /// Zoom of the cache blocks; coarser than the rendered tiles.
    pub block_zoom: u8,
    pub concurrency: usize,
    pub page_size: u32,
    pub sample_size: usize,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            tile_size: 256,
            block_zoom: 12,
            concurrency: 5,
            page_size: 200,
            sample_size: 200,
        }
    }
}

/// Fetches listings by block, coalescing and caching every block fetch.
///
/// All upstream requests go through one [`ResourcePool`]. Changing the search
/// settings affects later fetches only; blocks already cached keep the
/// listings they were fetched with until [`PropertyLoader::clear_cache`].
pub struct PropertyLoader {
    source: Arc<dyn PropertySource>,
    options: LoaderOptions,
    pool: ResourcePool,
    settings: RwLock<Arc<SearchSettings>>,
    blocks: SharedCache<Tile, PropertyBlock, LoadError>,
    range: Mutex<Option<SharedResult<Option<PriceRange>, LoadError>>>,
}

impl PropertyLoader {
    pub fn new(
        source: Arc<dyn PropertySource>,
        settings: SearchSettings,
        options: LoaderOptions,
    ) -> Self {
        Self {
            source,
            pool: ResourcePool::new(options.concurrency),
            options,
            settings: RwLock::new(Arc::new(settings)),
            blocks: SharedCache::new(),
            range: Mutex::new(None),
        }
    }

    pub fn options(&self) -> &LoaderOptions {
        &self.options
    }

    pub fn pool(&self) -> &ResourcePool {
        &self.pool
    }

    pub fn search_settings(&self) -> Arc<SearchSettings> {
        self.settings.read().clone()
    }

    /// Applies to fetches started from now on and forgets the memoized range.
    pub fn set_search_settings(&self, settings: SearchSettings) {
        *self.settings.write() = Arc::new(settings);
        *self.range.lock() = None;
    }

    /// Forgets every block and the price range, failed ones included.
    pub fn clear_cache(&self) {
        self.blocks.clear();
        *self.range.lock() = None;
    }

    pub fn block_state(&self, block: &Tile) -> Option<ResidencyState> {
        self.blocks.state(block)
    }

    pub fn cached_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Listings inside `block`, fetched at most once.
    ///
    /// Pages through the source until it reports no next page. The returned
    /// future is shared: concurrent and later callers get the same result.
    pub fn fetch_properties_in_tile(&self, block: Tile) -> SharedResult<PropertyBlock, LoadError> {
        let (result, hit) = self.blocks.get_or_fetch(block, |residency| {
            fetch_block(
                self.source.clone(),
                self.pool.clone(),
                self.search_settings(),
                block,
                tile_to_area(self.options.tile_size, block),
                self.options.page_size,
                residency,
            )
        });
        if hit {
            debug!(block = %block, "property block cache hit");
        }
        result
    }

    /// Every listing inside `area`, gathered from the blocks it touches.
    pub async fn fetch_properties_in_area(
        &self,
        area: CoordinateArea,
    ) -> Result<Vec<PropertyInformation>, LoadError> {
        let blocks = calculate_visible_tiles(self.options.tile_size, self.options.block_zoom, &area);
        let results = join_all(blocks.into_iter().map(|block| self.fetch_properties_in_tile(block))).await;

        let mut properties = Vec::new();
        for block in results {
            // Blocks overhang the requested area.
            properties.extend(
                block?
                    .iter()
                    .filter(|property| coordinate_is_inside_area(property.coordinates(), &area))
                    .cloned(),
            );
        }
        Ok(properties)
    }

    /// Outlier-trimmed price range for the current search settings, memoized
    /// until the settings change. `None` when the samples are empty.
    pub fn fetch_property_range(&self) -> SharedResult<Option<PriceRange>, LoadError> {
        let mut memo = self.range.lock();
        if let Some(range) = memo.as_ref() {
            return range.clone();
        }

        let source = self.source.clone();
        let pool = self.pool.clone();
        let settings = self.search_settings();
        let sample_size = self.options.sample_size;
        let range = async move {
            let (cheapest, dearest) = futures_util::try_join!(
                fetch_sample(&*source, &pool, &settings, sample_size, SortType::PriceAsc),
                fetch_sample(&*source, &pool, &settings, sample_size, SortType::PriceDesc),
            )?;
            let range = robust_minimum(&cheapest)
                .zip(robust_maximum(&dearest))
                .map(|(min, max)| PriceRange::new(min, max));
            match range {
                Some(range) => debug!(min = range.min, max = range.max, "price range"),
                None => warn!("price sample was empty"),
            }
            Ok::<_, LoadError>(range)
        }
        .boxed()
        .shared();

        *memo = Some(range.clone());
        range
    }
}

async fn fetch_block(
    source: Arc<dyn PropertySource>,
    pool: ResourcePool,
    settings: Arc<SearchSettings>,
    block: Tile,
    area: CoordinateArea,
    page_size: u32,
    residency: ResidencyHandle,
) -> Result<PropertyBlock, LoadError> {
    debug!(block = %block, "fetching property block");
    let mut request = PageRequest::first(page_size).within(area);
    let mut properties = Vec::new();
    let mut pages = 0u32;

    loop {
        let page = pool
            .run(async {
                residency.set(ResidencyState::Downloading);
                source.fetch_page(&settings, request.clone()).await
            })
            .await
            .map_err(|err| {
                warn!(block = %block, error = %err, "property block fetch failed");
                LoadError::Block {
                    tile: block,
                    source: err,
                }
            })?;

        pages += 1;
        properties.extend(normalize_listings(page.records));
        if !page.has_next_page {
            break;
        }
        request = request.next();
    }

    debug!(block = %block, pages, properties = properties.len(), "property block resident");
    Ok(properties.into())
}

/// First `count` prices in `sort` order, paging as needed.
async fn fetch_sample(
    source: &dyn PropertySource,
    pool: &ResourcePool,
    settings: &SearchSettings,
    count: usize,
    sort: SortType,
) -> Result<Vec<f64>, LoadError> {
    let mut request = PageRequest::first(count.max(1) as u32).sorted(sort);
    let mut prices = Vec::with_capacity(count);

    while prices.len() < count {
        let page = pool
            .run(source.fetch_page(settings, request.clone()))
            .await
            .map_err(LoadError::Sample)?;
        prices.extend(normalize_listings(page.records).into_iter().map(|p| p.price));
        if !page.has_next_page {
            break;
        }
        request = request.next();
    }

    prices.truncate(count);
    Ok(prices)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use foundation::{CoordinateArea, Coordinates, Tile, calculate_visible_tiles, tile_to_area};

    use super::{LoadError, LoaderOptions, PropertyLoader};
    use crate::property::{Channel, PropertyInformation, PropertyType, RawListing, RawPrice};
    use crate::range::PriceRange;
    use crate::residency::ResidencyState;
    use crate::search::SearchSettings;
    use crate::source::{MemorySource, SourceError};

    fn property(id: &str, price: f64, at: Coordinates) -> PropertyInformation {
        PropertyInformation {
            id: id.to_string(),
            price,
            latitude: at.latitude,
            longitude: at.longitude,
            bedrooms: None,
            bathrooms: None,
            car_spaces: None,
            property_type: PropertyType::UnitApartment,
            channel: Channel::Rent,
        }
    }

    fn block_of(at: Coordinates) -> Tile {
        calculate_visible_tiles(256, 12, &CoordinateArea::point(at))[0]
    }

    fn melbourne() -> Coordinates {
        Coordinates::new(-37.808295, 144.996736)
    }

    fn loader(source: Arc<MemorySource>, page_size: u32) -> PropertyLoader {
        PropertyLoader::new(
            source,
            SearchSettings::default(),
            LoaderOptions {
                page_size,
                ..LoaderOptions::default()
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_block_requests_fetch_once() {
        let at = melbourne();
        let source = Arc::new(
            MemorySource::from_properties(vec![property("a", 400.0, at)])
                .with_latency(Duration::from_millis(30)),
        );
        let loader = loader(source.clone(), 200);
        let block = block_of(at);

        let first = loader.fetch_properties_in_tile(block);
        let second = loader.fetch_properties_in_tile(block);
        let (a, b) = tokio::join!(first, second);

        assert_eq!(a.unwrap().len(), 1);
        assert_eq!(b.unwrap().len(), 1);
        assert_eq!(source.requests(), 1);
        assert_eq!(loader.block_state(&block), Some(ResidencyState::Resident));
    }

    #[tokio::test]
    async fn pages_until_no_next_page_and_drops_bad_prices() {
        let at = melbourne();
        let mut listings: Vec<RawListing> = Vec::new();
        for i in 0..5 {
            listings.push(RawListing {
                id: i.to_string(),
                price: RawPrice::Display(format!("${}", 300 + i)),
                latitude: at.latitude,
                longitude: at.longitude,
                bedrooms: None,
                bathrooms: None,
                car_spaces: None,
                property_type: PropertyType::House,
                channel: Channel::Rent,
            });
        }
        listings[2].price = RawPrice::Display("Contact agent".into());

        let source = Arc::new(MemorySource::new(listings));
        let loader = loader(source.clone(), 2);
        let block = loader.fetch_properties_in_tile(block_of(at)).await.unwrap();

        assert_eq!(source.requests(), 3);
        let ids: Vec<&str> = block.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["0", "1", "3", "4"]);
    }

    #[tokio::test]
    async fn area_results_are_refiltered_against_the_area() {
        let at = melbourne();
        let block_area = tile_to_area(256, block_of(at));
        let corner = Coordinates::new(
            block_area.north() - 0.0001,
            block_area.west() + 0.0001,
        );
        let source = Arc::new(MemorySource::from_properties(vec![
            property("inside", 500.0, at),
            property("same-block", 600.0, corner),
        ]));
        let loader = loader(source, 200);

        let area = CoordinateArea::new(
            Coordinates::new(at.latitude + 0.001, at.longitude - 0.001),
            Coordinates::new(at.latitude - 0.001, at.longitude + 0.001),
        );
        let properties = loader.fetch_properties_in_area(area).await.unwrap();
        let ids: Vec<&str> = properties.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["inside"]);
    }

    #[tokio::test]
    async fn failed_blocks_stay_failed_until_cleared() {
        let at = melbourne();
        let source = Arc::new(MemorySource::from_properties(vec![property("a", 400.0, at)]));
        let loader = loader(source.clone(), 200);
        let block = block_of(at);

        source.set_failing(true);
        let failed = loader.fetch_properties_in_tile(block).await;
        assert_eq!(
            failed.unwrap_err(),
            LoadError::Block {
                tile: block,
                source: SourceError::Status { status: 503 }
            }
        );
        assert_eq!(loader.block_state(&block), Some(ResidencyState::Failed));

        source.set_failing(false);
        assert!(loader.fetch_properties_in_tile(block).await.is_err());

        loader.clear_cache();
        assert_eq!(loader.fetch_properties_in_tile(block).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn property_range_is_memoized_per_settings() {
        let at = melbourne();
        let properties = (0..20).map(|i| property(&i.to_string(), 100.0 + 10.0 * i as f64, at));
        let source = Arc::new(MemorySource::from_properties(properties));
        let loader = loader(source.clone(), 200);

        let range = loader.fetch_property_range().await.unwrap();
        assert_eq!(range, Some(PriceRange::new(100.0, 290.0)));
        assert_eq!(source.requests(), 2);

        loader.fetch_property_range().await.unwrap();
        assert_eq!(source.requests(), 2);

        loader.set_search_settings(SearchSettings::new(Channel::Buy));
        assert_eq!(loader.fetch_property_range().await.unwrap(), None);
        assert_eq!(source.requests(), 4);
    }
}
