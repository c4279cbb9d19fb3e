//! Data Transfer Objects
//!
//! Request and response types for the API endpoints. The CLI decodes the
//! same types, so responses derive both directions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::collector::TaskStatus;
use crate::model::{Consumption, Home, Measurement, PriceInfo, Production};

// ============================================
// HOME DTOs
// ============================================

/// Home list response
#[derive(Debug, Serialize, Deserialize)]
pub struct HomeListResponse {
    pub homes: Vec<Home>,
    pub total: usize,
}

// ============================================
// CHART DTOs
// ============================================

/// Price chart series for today and tomorrow
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct PriceChartResponse {
    /// Interval start times as reported by Tibber
    pub times: Vec<String>,
    /// Total price per interval
    pub prices: Vec<f64>,
    pub currency: String,
}

impl From<&PriceInfo> for PriceChartResponse {
    fn from(info: &PriceInfo) -> Self {
        let (times, prices) = info
            .today
            .iter()
            .chain(&info.tomorrow)
            .map(|p| (p.starts_at.clone(), p.total))
            .unzip();

        Self {
            times,
            prices,
            currency: info.current.currency.clone(),
        }
    }
}

/// Daily consumption series, oldest first
#[derive(Debug, Serialize, Deserialize)]
pub struct ConsumptionChartResponse {
    pub dates: Vec<String>,
    pub consumption: Vec<f64>,
    pub cost: Vec<f64>,
    pub currency: String,
}

impl ConsumptionChartResponse {
    pub const DEFAULT_CURRENCY: &'static str = "EUR";

    pub fn from_intervals(mut items: Vec<Consumption>) -> Self {
        Consumption::sort_oldest_first(&mut items);

        let currency = items
            .first()
            .map(|c| c.currency.clone())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| Self::DEFAULT_CURRENCY.to_string());

        Self {
            dates: items.iter().map(|c| c.from.clone()).collect(),
            consumption: items.iter().map(|c| c.consumption).collect(),
            cost: items.iter().map(|c| c.cost).collect(),
            currency,
        }
    }
}

/// Daily production series, oldest first
#[derive(Debug, Serialize, Deserialize)]
pub struct ProductionChartResponse {
    pub dates: Vec<String>,
    pub production: Vec<f64>,
    pub profit: Vec<f64>,
}

impl ProductionChartResponse {
    pub fn from_intervals(mut items: Vec<Production>) -> Self {
        Production::sort_oldest_first(&mut items);

        Self {
            dates: items.iter().map(|p| p.from.clone()).collect(),
            production: items.iter().map(|p| p.production).collect(),
            profit: items.iter().map(|p| p.profit).collect(),
        }
    }
}

// ============================================
// MEASUREMENT DTOs
// ============================================

/// Query parameters for stored live measurements
#[derive(Debug, Default, Deserialize)]
pub struct MeasurementsQuery {
    /// Maximum rows, newest first (default 100)
    #[serde(default)]
    pub limit: Option<usize>,
    /// RFC 3339 timestamp or relative time like "now-2h"
    #[serde(default)]
    pub since: Option<String>,
}

/// Stored live measurements
#[derive(Debug, Serialize, Deserialize)]
pub struct MeasurementsResponse {
    pub home_id: String,
    pub count: usize,
    pub measurements: Vec<Measurement>,
}

// ============================================
// HEALTH DTOs
// ============================================

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Overall status: healthy, degraded, unhealthy
    pub status: String,
    pub title: String,
    /// Storage status
    pub storage: String,
    /// Open live stream connections
    pub live_connections: usize,
    /// Server uptime in seconds
    pub uptime_seconds: u64,
    /// Application version
    pub version: String,
    /// Collector task status, empty when no collector runs in-process
    #[serde(default)]
    pub tasks: BTreeMap<String, TaskStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Price;

    fn price(starts_at: &str, total: f64) -> Price {
        Price {
            starts_at: starts_at.to_string(),
            total,
            currency: "EUR".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_price_chart_joins_today_and_tomorrow() {
        let info = PriceInfo {
            current: price("2024-03-02T10:00:00+01:00", 0.3),
            today: vec![price("2024-03-02T10:00:00+01:00", 0.3)],
            tomorrow: vec![price("2024-03-03T00:00:00+01:00", 0.2)],
        };

        let chart = PriceChartResponse::from(&info);
        assert_eq!(chart.times.len(), 2);
        assert_eq!(chart.prices, vec![0.3, 0.2]);
        assert_eq!(chart.currency, "EUR");
    }

    #[test]
    fn test_consumption_chart_sorted_oldest_first() {
        let rows = vec![
            Consumption {
                from: "2024-03-02T00:00:00+01:00".into(),
                consumption: 8.0,
                cost: 2.4,
                currency: "NOK".into(),
                ..Default::default()
            },
            Consumption {
                from: "2024-03-01T00:00:00+01:00".into(),
                consumption: 7.0,
                cost: 2.1,
                currency: "NOK".into(),
                ..Default::default()
            },
        ];

        let chart = ConsumptionChartResponse::from_intervals(rows);
        assert_eq!(chart.consumption, vec![7.0, 8.0]);
        assert_eq!(chart.cost, vec![2.1, 2.4]);
        assert_eq!(chart.currency, "NOK");
    }

    #[test]
    fn test_empty_consumption_defaults_currency() {
        let chart = ConsumptionChartResponse::from_intervals(Vec::new());
        assert!(chart.dates.is_empty());
        assert_eq!(chart.currency, "EUR");

        let json = serde_json::to_value(&chart).unwrap();
        assert_eq!(json["consumption"], serde_json::json!([]));
    }
}
