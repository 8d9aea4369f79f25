//! Listing source capability and an in-memory implementation.
//!
//! The loader never talks to a transport directly; it pages through a
//! [`PropertySource`]. Implementations return raw listings and leave price
//! normalization to the loader.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use foundation::{CoordinateArea, coordinate_is_inside_area};
use tokio::sync::RwLock;

use crate::property::{PropertyInformation, RawListing, RawPrice};
use crate::search::{SearchSettings, SortType};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    #[error("listing request failed: {0}")]
    Transport(String),
    #[error("listing service returned status {status}")]
    Status { status: u16 },
    #[error("failed to decode listing response: {0}")]
    Decode(String),
}

/// One page of a listing query. Pages are 1-based.
#[derive(Debug, Clone, PartialEq)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
    pub bounding_box: Option<CoordinateArea>,
    pub sort: Option<SortType>,
}

impl PageRequest {
    pub fn first(page_size: u32) -> Self {
        Self {
            page: 1,
            page_size,
            bounding_box: None,
            sort: None,
        }
    }

    pub fn within(mut self, area: CoordinateArea) -> Self {
        self.bounding_box = Some(area);
        self
    }

    pub fn sorted(mut self, sort: SortType) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn next(&self) -> Self {
        Self {
            page: self.page + 1,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyPage {
    pub records: Vec<RawListing>,
    pub has_next_page: bool,
}

/// Upstream listing search.
///
/// Implementations must be `Send + Sync`; the loader shares one source across
/// every block fetch.
pub trait PropertySource: Send + Sync {
    fn fetch_page<'a>(
        &'a self,
        settings: &'a SearchSettings,
        request: PageRequest,
    ) -> BoxFuture<'a, Result<PropertyPage, SourceError>>;
}

/// In-memory listing source.
///
/// Filters by bounding box, sorts by normalized price when asked and counts
/// every page request. Search settings other than the channel are ignored.
#[derive(Debug, Default)]
pub struct MemorySource {
    listings: RwLock<Vec<RawListing>>,
    requests: AtomicUsize,
    failing: AtomicBool,
    latency: Option<Duration>,
}

impl MemorySource {
    pub fn new(listings: Vec<RawListing>) -> Self {
        Self {
            listings: RwLock::new(listings),
            ..Self::default()
        }
    }

    pub fn from_properties(properties: impl IntoIterator<Item = PropertyInformation>) -> Self {
        Self::new(properties.into_iter().map(raw_listing).collect())
    }

    /// Delays every page by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub async fn insert(&self, listing: RawListing) {
        self.listings.write().await.push(listing);
    }

    /// Page requests served so far, including failed ones.
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl PropertySource for MemorySource {
    fn fetch_page<'a>(
        &'a self,
        settings: &'a SearchSettings,
        request: PageRequest,
    ) -> BoxFuture<'a, Result<PropertyPage, SourceError>> {
        Box::pin(async move {
            self.requests.fetch_add(1, Ordering::SeqCst);
            if let Some(latency) = self.latency {
                tokio::time::sleep(latency).await;
            }
            if self.failing.load(Ordering::SeqCst) {
                return Err(SourceError::Status { status: 503 });
            }

            let listings = self.listings.read().await;
            let mut matching: Vec<&RawListing> = listings
                .iter()
                .filter(|listing| listing.channel == settings.channel)
                .filter(|listing| match &request.bounding_box {
                    Some(area) => coordinate_is_inside_area(
                        foundation::Coordinates::new(listing.latitude, listing.longitude),
                        area,
                    ),
                    None => true,
                })
                .collect();

            if let Some(sort) = request.sort {
                // Unpriced listings sort last in either direction.
                let key = |listing: &&RawListing| listing.price.normalize();
                matching.sort_by(|a, b| match (key(a), key(b)) {
                    (Some(a), Some(b)) => match sort {
                        SortType::PriceAsc => a.total_cmp(&b),
                        SortType::PriceDesc => b.total_cmp(&a),
                    },
                    (Some(_), None) => std::cmp::Ordering::Less,
                    (None, Some(_)) => std::cmp::Ordering::Greater,
                    (None, None) => std::cmp::Ordering::Equal,
                });
            }

            let size = request.page_size.max(1) as usize;
            let start = (request.page.max(1) as usize - 1) * size;
            let end = (start + size).min(matching.len());
            let records = matching
                .get(start..end)
                .unwrap_or_default()
                .iter()
                .map(|listing| (*listing).clone())
                .collect();

            Ok(PropertyPage {
                records,
                has_next_page: end < matching.len(),
            })
        })
    }
}

fn raw_listing(property: PropertyInformation) -> RawListing {
    RawListing {
        id: property.id,
        price: RawPrice::Value(property.price),
        latitude: property.latitude,
        longitude: property.longitude,
        bedrooms: property.bedrooms,
        bathrooms: property.bathrooms,
        car_spaces: property.car_spaces,
        property_type: property.property_type,
        channel: property.channel,
    }
}
