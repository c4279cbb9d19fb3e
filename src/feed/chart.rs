//! Chart-ready views over live records

use chrono::{Local, TimeZone};
use serde::Serialize;

use crate::model::LiveData;

pub const CHART_TITLE: &str = "Live Power Data";
pub const CONSUMPTION_LABEL: &str = "Power Consumption (W)";
pub const PRODUCTION_LABEL: &str = "Power Production (W)";

/// One line series
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    pub label: String,
    pub data: Vec<f64>,
    pub border_color: String,
    pub tension: f64,
}

/// Labels and series for a line chart, one point per record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartView {
    pub title: String,
    pub labels: Vec<String>,
    pub datasets: Vec<Dataset>,
}

impl ChartView {
    /// Labels use local `HH:MM:SS`
    pub fn from_measurements(records: &[LiveData]) -> Self {
        Self::from_measurements_in(records, &Local)
    }

    pub fn from_measurements_in<Tz: TimeZone>(records: &[LiveData], tz: &Tz) -> Self
    where
        Tz::Offset: std::fmt::Display,
    {
        let labels = records
            .iter()
            .map(|r| r.timestamp.with_timezone(tz).format("%H:%M:%S").to_string())
            .collect();

        Self {
            title: CHART_TITLE.to_string(),
            labels,
            datasets: vec![
                Dataset {
                    label: CONSUMPTION_LABEL.to_string(),
                    data: records.iter().map(|r| r.power).collect(),
                    border_color: "rgb(255, 99, 132)".to_string(),
                    tension: 0.1,
                },
                Dataset {
                    label: PRODUCTION_LABEL.to_string(),
                    data: records.iter().map(|r| r.power_production).collect(),
                    border_color: "rgb(75, 192, 192)".to_string(),
                    tension: 0.1,
                },
            ],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn dataset(&self, label: &str) -> Option<&Dataset> {
        self.datasets.iter().find(|d| d.label == label)
    }
}

/// The latest record as display lines, two decimals
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrentValues {
    pub power: String,
    pub power_production: String,
    pub accumulated_consumption: String,
    pub accumulated_production: String,
}

impl CurrentValues {
    /// `None` until a record has arrived
    pub fn from_latest(latest: Option<&LiveData>) -> Option<Self> {
        latest.map(|r| Self {
            power: format!("Power Consumption: {:.2} W", r.power),
            power_production: format!("Power Production: {:.2} W", r.power_production),
            accumulated_consumption: format!(
                "Total Consumption: {:.2} kWh",
                r.accumulated_consumption
            ),
            accumulated_production: format!(
                "Total Production: {:.2} kWh",
                r.accumulated_production
            ),
        })
    }

    pub fn lines(&self) -> [&str; 4] {
        [
            &self.power,
            &self.power_production,
            &self.accumulated_consumption,
            &self.accumulated_production,
        ]
    }
}

impl std::fmt::Display for CurrentValues {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.lines().join(" | "))
    }
}
