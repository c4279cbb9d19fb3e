//! Live measurements
//!
//! [`Measurement`] is the full sample delivered by the Tibber real-time
//! subscription. [`LiveData`] is the compact record pushed to dashboards over
//! the live event stream and appended to client-side measurement stores.

use super::null_as_default;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Live measurement record streamed to dashboards
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveData {
    pub timestamp: DateTime<Utc>,
    /// Instantaneous draw in W
    #[serde(default)]
    pub power: f64,
    /// Instantaneous production in W
    #[serde(default)]
    pub power_production: f64,
    /// kWh since midnight
    #[serde(default)]
    pub accumulated_consumption: f64,
    /// kWh since midnight
    #[serde(default)]
    pub accumulated_production: f64,
}

/// Full real-time sample from a Tibber Pulse or Watty
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Measurement {
    /// `None` when the upstream sample carried no timestamp
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub power: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub power_production: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub min_power: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub average_power: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub max_power: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub max_power_production: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub accumulated_consumption: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub accumulated_production: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub last_meter_consumption: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub last_meter_production: f64,
    #[serde(default, rename = "currentL1", skip_serializing_if = "Option::is_none")]
    pub current_l1: Option<f64>,
    #[serde(default, rename = "currentL2", skip_serializing_if = "Option::is_none")]
    pub current_l2: Option<f64>,
    #[serde(default, rename = "currentL3", skip_serializing_if = "Option::is_none")]
    pub current_l3: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voltage_phase1: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voltage_phase2: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voltage_phase3: Option<f64>,
}

/// Condensed view of a measurement for status output
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasurementSummary {
    pub timestamp: Option<DateTime<Utc>>,
    pub power: f64,
    pub power_production: f64,
    pub accumulated_consumption: f64,
    pub accumulated_production: f64,
    pub is_producing: bool,
}

impl Measurement {
    /// Project onto the dashboard record. Samples without a timestamp yield `None`.
    pub fn to_live_data(&self) -> Option<LiveData> {
        let timestamp = self.timestamp?;
        Some(LiveData {
            timestamp,
            power: self.power,
            power_production: self.power_production,
            accumulated_consumption: self.accumulated_consumption,
            accumulated_production: self.accumulated_production,
        })
    }

    pub fn summary(&self) -> MeasurementSummary {
        MeasurementSummary {
            timestamp: self.timestamp,
            power: self.power,
            power_production: self.power_production,
            accumulated_consumption: self.accumulated_consumption,
            accumulated_production: self.accumulated_production,
            is_producing: self.power_production > 0.0,
        }
    }
}

impl LiveData {
    /// Net grid draw in W; negative while exporting
    pub fn net_power(&self) -> f64 {
        self.power - self.power_production
    }
}

impl From<&LiveData> for Measurement {
    fn from(data: &LiveData) -> Self {
        Measurement {
            timestamp: Some(data.timestamp),
            power: data.power,
            power_production: data.power_production,
            accumulated_consumption: data.accumulated_consumption,
            accumulated_production: data.accumulated_production,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_live_data_wire_format() {
        let data = LiveData {
            timestamp: Utc.with_ymd_and_hms(2024, 3, 2, 12, 0, 0).unwrap(),
            power: 1234.5,
            power_production: 0.0,
            accumulated_consumption: 3.2,
            accumulated_production: 0.0,
        };

        let value = serde_json::to_value(&data).unwrap();
        assert_eq!(value["timestamp"], "2024-03-02T12:00:00Z");
        assert_eq!(value["power"], 1234.5);
        assert_eq!(value["powerProduction"], 0.0);
        assert_eq!(value["accumulatedConsumption"], 3.2);
        assert!(value.get("accumulatedProduction").is_some());
    }

    #[test]
    fn test_live_data_accepts_offset_timestamps() {
        let json = r#"{"timestamp":"2024-03-02T13:00:00.000+01:00","power":500}"#;
        let data: LiveData = serde_json::from_str(json).unwrap();
        assert_eq!(data.timestamp, Utc.with_ymd_and_hms(2024, 3, 2, 12, 0, 0).unwrap());
        assert_eq!(data.power, 500.0);
        assert_eq!(data.power_production, 0.0);
    }

    #[test]
    fn test_measurement_from_tibber_payload() {
        let json = r#"{
            "timestamp": "2024-03-02T13:00:05.000+01:00",
            "power": 820,
            "powerProduction": null,
            "accumulatedConsumption": 4.1,
            "currentL1": 2.5,
            "voltagePhase1": null
        }"#;
        let m: Measurement = serde_json::from_str(json).unwrap();
        assert_eq!(m.power, 820.0);
        assert_eq!(m.power_production, 0.0);
        assert_eq!(m.current_l1, Some(2.5));
        assert_eq!(m.voltage_phase1, None);

        let live = m.to_live_data().unwrap();
        assert_eq!(live.accumulated_consumption, 4.1);
        assert!(!m.summary().is_producing);
    }

    #[test]
    fn test_measurement_without_timestamp() {
        let m: Measurement = serde_json::from_str(r#"{"power": 10}"#).unwrap();
        assert!(m.to_live_data().is_none());
    }

    #[test]
    fn test_net_power() {
        let data = LiveData {
            timestamp: Utc::now(),
            power: 200.0,
            power_production: 500.0,
            accumulated_consumption: 0.0,
            accumulated_production: 0.0,
        };
        assert_eq!(data.net_power(), -300.0);
    }
}
