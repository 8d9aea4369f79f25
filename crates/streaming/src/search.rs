use serde::{Deserialize, Serialize};

use crate::property::{Channel, PropertyType};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortType {
    #[serde(rename = "price-asc")]
    PriceAsc,
    #[serde(rename = "price-desc")]
    PriceDesc,
}

/// Inclusive bounds; either side may be open.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Range {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<u64>,
}

/// Listing filters shared by every fetch a loader makes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchSettings {
    #[serde(default)]
    pub channel: Channel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suburb: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub property_types: Vec<PropertyType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_range: Option<Range>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bedrooms_range: Option<Range>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_bathrooms: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_cars: Option<u32>,
}

impl SearchSettings {
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            ..Self::default()
        }
    }

    /// Same filters with property types in a canonical order, so equivalent
    /// settings compare and hash equal.
    pub fn normalized(&self) -> Self {
        let mut settings = self.clone();
        settings.property_types.sort();
        settings.property_types.dedup();
        settings
    }
}
