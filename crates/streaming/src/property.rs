use foundation::Coordinates;
use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    #[default]
    Rent,
    Buy,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PropertyType {
    #[serde(rename = "townhouse")]
    Townhouse,
    #[serde(rename = "unit+apartment")]
    UnitApartment,
    #[serde(rename = "house")]
    House,
    #[serde(rename = "retire")]
    Retirement,
    #[serde(rename = "unitblock")]
    BlockOfUnits,
    #[serde(rename = "acreage")]
    Acreage,
    #[serde(rename = "villa")]
    Villa,
    #[serde(other, rename = "other")]
    Other,
}

/// Normalized listing. `price` is always finite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyInformation {
    pub id: String,
    pub price: f64,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bedrooms: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bathrooms: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub car_spaces: Option<u32>,
    pub property_type: PropertyType,
    pub channel: Channel,
}

impl PropertyInformation {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.latitude, self.longitude)
    }
}

/// Price as reported upstream: a number, a display string, or both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawPrice {
    Value(f64),
    Display(String),
    Listed {
        #[serde(default)]
        value: Option<f64>,
        #[serde(default)]
        display: String,
    },
}

impl RawPrice {
    /// Finite numeric price, or `None` if the listing carries no usable price.
    pub fn normalize(&self) -> Option<f64> {
        let price = match self {
            RawPrice::Value(value) => Some(*value),
            RawPrice::Display(display) => parse_display_price(display),
            RawPrice::Listed { value, display } => match value {
                Some(value) if *value != 0.0 => Some(*value),
                _ => parse_display_price(display),
            },
        }?;
        price.is_finite().then_some(price)
    }
}

/// Listing record before normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawListing {
    pub id: String,
    pub price: RawPrice,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub bedrooms: Option<u32>,
    #[serde(default)]
    pub bathrooms: Option<u32>,
    #[serde(default)]
    pub car_spaces: Option<u32>,
    pub property_type: PropertyType,
    pub channel: Channel,
}

impl RawListing {
    /// Drops listings whose price or location is unusable.
    pub fn normalize(self) -> Option<PropertyInformation> {
        let price = self.price.normalize()?;
        if !self.latitude.is_finite() || !self.longitude.is_finite() {
            return None;
        }
        Some(PropertyInformation {
            id: self.id,
            price,
            latitude: self.latitude,
            longitude: self.longitude,
            bedrooms: self.bedrooms,
            bathrooms: self.bathrooms,
            car_spaces: self.car_spaces,
            property_type: self.property_type,
            channel: self.channel,
        })
    }
}

pub fn normalize_listings(listings: impl IntoIterator<Item = RawListing>) -> Vec<PropertyInformation> {
    listings.into_iter().filter_map(RawListing::normalize).collect()
}

/// Parses display prices such as `$450,000`, `$1.2m`, `650k` or
/// `$500,000 - $550,000` (midpoint). Text without digits yields `None`.
pub fn parse_display_price(display: &str) -> Option<f64> {
    let lowered = display.to_ascii_lowercase();
    let parts: Vec<&str> = if lowered.contains(" to ") {
        lowered.split(" to ").collect()
    } else {
        lowered.split('-').collect()
    };

    let values: Vec<f64> = parts.iter().filter_map(|part| parse_amount(part)).collect();
    match values.as_slice() {
        [] => None,
        [single] => Some(*single),
        [low, high, ..] => Some((low + high) / 2.0),
    }
}

fn parse_amount(text: &str) -> Option<f64> {
    // Skip leading words ("from", "offers over") up to the first digit.
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let mut chars = text[start..].chars().peekable();
    let mut number = String::new();

    while let Some(&c) = chars.peek() {
        match c {
            '0'..='9' | '.' => number.push(c),
            ',' => {}
            _ => break,
        }
        chars.next();
    }

    let multiplier = match chars.peek() {
        Some('k') => 1_000.0,
        Some('m') => 1_000_000.0,
        _ => 1.0,
    };
    let value: f64 = number.trim_end_matches('.').parse().ok()?;
    Some(value * multiplier)
}
