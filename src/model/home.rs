//! Home and metering point types

use super::null_as_default;
use serde::{Deserialize, Serialize};

/// A home registered in the Tibber account
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Home {
    pub id: String,
    /// HOUSE, APARTMENT, ...
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub home_type: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub size: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub number_of_residents: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub time_zone: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub app_nickname: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub app_avatar: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub main_fuse_size: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub address: Address,
    #[serde(default, deserialize_with = "null_as_default")]
    pub metering_point_data: MeteringPointData,
    #[serde(default, deserialize_with = "null_as_default")]
    pub features: HomeFeatures,
}

impl Home {
    /// Create a home with only an id set
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// A home produces energy when it has a production metering point
    pub fn has_production(&self) -> bool {
        !self.metering_point_data.production_ean.is_empty()
    }

    /// A home has consumption data when it has a consumption metering point
    pub fn has_consumption(&self) -> bool {
        !self.metering_point_data.consumption_ean.is_empty()
    }

    pub fn realtime_enabled(&self) -> bool {
        self.features.real_time_consumption_enabled
    }
}

/// Postal address of a home
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    #[serde(default, deserialize_with = "null_as_default")]
    pub address1: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub address2: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub address3: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub postal_code: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub city: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub country: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub latitude: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub longitude: String,
}

/// Grid connection details
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeteringPointData {
    #[serde(default, deserialize_with = "null_as_default")]
    pub consumption_ean: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub grid_company: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub grid_area_code: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub price_area_code: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub production_ean: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub energy_tax_type: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub vat_type: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub estimated_annual_consumption: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HomeFeatures {
    #[serde(default, deserialize_with = "null_as_default")]
    pub real_time_consumption_enabled: bool,
}
