//! Listing search API client.
//!
//! The upstream service takes the whole query as one JSON document in the
//! `query` parameter and answers with listings grouped into tiers. A
//! `_links.next.href` entry means another page exists.

use serde::Deserialize;
use serde_json::{json, Map, Value};
use streaming::{
    BoxFuture, Channel, PageRequest, PropertyPage, PropertySource, PropertyType, RawListing,
    RawPrice, SearchSettings, SourceError,
};
use tracing::debug;

pub const DEFAULT_LISTINGS_URL: &str = "https://services.realestate.com.au/services/listings/search";

/// Builds the `query` document for one page.
pub fn build_query(settings: &SearchSettings, request: &PageRequest) -> Value {
    let mut filters = Map::new();
    filters.insert("surroundingSuburbs".into(), json!("false"));
    filters.insert("excludeTier2".into(), json!(false));
    filters.insert("geoPrecision".into(), json!("address"));
    filters.insert("excludeAddressHidden".into(), json!("true"));
    if !settings.property_types.is_empty() {
        filters.insert("propertyTypes".into(), json!(settings.property_types));
    }
    if let Some(range) = settings.price_range {
        filters.insert("priceRange".into(), json!(range));
    }
    if let Some(range) = settings.bedrooms_range {
        filters.insert("bedroomsRange".into(), json!(range));
    }
    if let Some(bathrooms) = settings.minimum_bathrooms {
        filters.insert("minimumBathroom".into(), json!(bathrooms));
    }
    if let Some(cars) = settings.minimum_cars {
        filters.insert("minimumCars".into(), json!(cars));
    }

    let mut query = Map::new();
    query.insert("channel".into(), json!(settings.channel));
    query.insert("page".into(), json!(request.page));
    query.insert("pageSize".into(), json!(request.page_size));
    query.insert("filters".into(), Value::Object(filters));
    if let Some(suburb) = &settings.suburb {
        query.insert("localities".into(), json!([{ "searchLocation": suburb }]));
    }
    if let Some(area) = request.bounding_box {
        query.insert(
            "boundingBoxSearch".into(),
            json!([area.south(), area.west(), area.north(), area.east()]),
        );
    }
    if let Some(sort) = request.sort {
        query.insert("sortType".into(), json!(sort));
    }
    Value::Object(query)
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default, rename = "tieredResults")]
    tiered_results: Vec<Tier>,
    #[serde(default, rename = "_links")]
    links: Option<Links>,
}

#[derive(Debug, Deserialize)]
struct Tier {
    #[serde(default)]
    results: Vec<ApiListing>,
}

#[derive(Debug, Deserialize)]
struct Links {
    next: Option<Link>,
}

#[derive(Debug, Deserialize)]
struct Link {
    href: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiListing {
    #[serde(default)]
    listing_id: String,
    price: Option<RawPrice>,
    address: Option<Address>,
    features: Option<Features>,
    property_type: Option<PropertyType>,
    #[serde(default)]
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Address {
    location: Option<Location>,
}

#[derive(Debug, Deserialize)]
struct Location {
    latitude: f64,
    longitude: f64,
}

#[derive(Debug, Deserialize)]
struct Features {
    general: Option<GeneralFeatures>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeneralFeatures {
    bedrooms: Option<u32>,
    bathrooms: Option<u32>,
    parking_spaces: Option<u32>,
}

impl ApiListing {
    /// Listings without a price or a location are dropped.
    fn into_raw(self) -> Option<RawListing> {
        let location = self.address?.location?;
        let general = self.features.and_then(|features| features.general);
        Some(RawListing {
            id: self.listing_id,
            price: self.price?,
            latitude: location.latitude,
            longitude: location.longitude,
            bedrooms: general.as_ref().and_then(|g| g.bedrooms),
            bathrooms: general.as_ref().and_then(|g| g.bathrooms),
            car_spaces: general.as_ref().and_then(|g| g.parking_spaces),
            property_type: self.property_type.unwrap_or(PropertyType::Other),
            channel: self.channel,
        })
    }
}

/// Decodes one search response.
pub fn decode_page(body: &[u8]) -> Result<PropertyPage, SourceError> {
    let response: SearchResponse =
        serde_json::from_slice(body).map_err(|err| SourceError::Decode(err.to_string()))?;
    let has_next_page = response
        .links
        .and_then(|links| links.next)
        .and_then(|next| next.href)
        .is_some_and(|href| !href.is_empty());
    let records = response
        .tiered_results
        .into_iter()
        .flat_map(|tier| tier.results)
        .filter_map(ApiListing::into_raw)
        .collect();
    Ok(PropertyPage {
        records,
        has_next_page,
    })
}

/// [`PropertySource`] backed by the listing search API.
#[derive(Debug, Clone)]
pub struct HttpListingSource {
    client: reqwest::Client,
    url: String,
}

impl HttpListingSource {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl PropertySource for HttpListingSource {
    fn fetch_page<'a>(
        &'a self,
        settings: &'a SearchSettings,
        request: PageRequest,
    ) -> BoxFuture<'a, Result<PropertyPage, SourceError>> {
        Box::pin(async move {
            let query = build_query(settings, &request).to_string();
            let response = self
                .client
                .get(&self.url)
                .query(&[("query", query)])
                .send()
                .await
                .map_err(|err| SourceError::Transport(err.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                return Err(SourceError::Status {
                    status: status.as_u16(),
                });
            }

            let body = response
                .bytes()
                .await
                .map_err(|err| SourceError::Transport(err.to_string()))?;
            let page = decode_page(&body)?;
            debug!(
                page = request.page,
                records = page.records.len(),
                has_next_page = page.has_next_page,
                "fetched listing page"
            );
            Ok(page)
        })
    }
}
