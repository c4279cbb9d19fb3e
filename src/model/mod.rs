//! Domain Model
//!
//! Types shared by the Tibber client, the energy store, the API and the
//! live feed client:
//!
//! - **home**: Homes with address, metering point data and features
//! - **energy**: Consumption and production intervals
//! - **price**: Hourly prices and price levels
//! - **measurement**: Live measurements and the `LiveData` push record
//!
//! All types serialize with camelCase keys, matching both the Tibber
//! GraphQL schema and the JSON served to dashboards.

mod energy;
mod home;
mod measurement;
mod price;

pub use energy::{Consumption, EnergyTotals, Production};
pub use home::{Address, Home, HomeFeatures, MeteringPointData};
pub use measurement::{LiveData, Measurement, MeasurementSummary};
pub use price::{Price, PriceInfo, PriceLevel};

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Granularity of consumption and production intervals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Resolution {
    Hourly,
    Daily,
    Weekly,
    Monthly,
    Annual,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::Hourly => "HOURLY",
            Resolution::Daily => "DAILY",
            Resolution::Weekly => "WEEKLY",
            Resolution::Monthly => "MONTHLY",
            Resolution::Annual => "ANNUAL",
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "HOURLY" | "HOUR" => Ok(Resolution::Hourly),
            "DAILY" | "DAY" => Ok(Resolution::Daily),
            "WEEKLY" | "WEEK" => Ok(Resolution::Weekly),
            "MONTHLY" | "MONTH" => Ok(Resolution::Monthly),
            "ANNUAL" | "YEAR" => Ok(Resolution::Annual),
            other => Err(format!("Unknown resolution: {}", other)),
        }
    }
}

/// Deserialize a possibly-null field into its default value.
///
/// The Tibber API returns explicit `null` for many optional fields, which
/// `#[serde(default)]` alone does not cover.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_roundtrip_names() {
        assert_eq!("daily".parse::<Resolution>().unwrap(), Resolution::Daily);
        assert_eq!("HOUR".parse::<Resolution>().unwrap(), Resolution::Hourly);
        assert!("fortnightly".parse::<Resolution>().is_err());
        assert_eq!(Resolution::Monthly.to_string(), "MONTHLY");
    }

    #[test]
    fn test_resolution_serializes_upper_case() {
        let json = serde_json::to_string(&Resolution::Daily).unwrap();
        assert_eq!(json, "\"DAILY\"");
    }
}
