//! Hourly energy prices

use super::null_as_default;
use chrono::{DateTime, Duration, FixedOffset};
use serde::{Deserialize, Serialize};

/// Tibber price level relative to the trailing average
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PriceLevel {
    VeryCheap,
    Cheap,
    Normal,
    Expensive,
    VeryExpensive,
    #[serde(other)]
    Unknown,
}

impl PriceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriceLevel::VeryCheap => "VERY_CHEAP",
            PriceLevel::Cheap => "CHEAP",
            PriceLevel::Normal => "NORMAL",
            PriceLevel::Expensive => "EXPENSIVE",
            PriceLevel::VeryExpensive => "VERY_EXPENSIVE",
            PriceLevel::Unknown => "UNKNOWN",
        }
    }

    pub fn parse(s: &str) -> Self {
        serde_json::from_value(serde_json::Value::String(s.to_string()))
            .unwrap_or(PriceLevel::Unknown)
    }
}

/// Price for one hour
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Price {
    #[serde(default, deserialize_with = "null_as_default")]
    pub total: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub energy: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tax: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub starts_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ends_at: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<PriceLevel>,
}

impl Price {
    /// Parsed start of the hour this price applies to
    pub fn start(&self) -> Option<DateTime<FixedOffset>> {
        DateTime::parse_from_rfc3339(&self.starts_at).ok()
    }

    /// End of validity: `endsAt` when present, otherwise one hour after start
    pub fn ends_at(&self) -> Option<DateTime<FixedOffset>> {
        if let Some(end) = self.ends_at.as_deref() {
            if let Ok(parsed) = DateTime::parse_from_rfc3339(end) {
                return Some(parsed);
            }
        }
        self.start().map(|start| start + Duration::hours(1))
    }

    /// Fill in `ends_at` from the start time when missing
    pub fn with_end_time(mut self) -> Self {
        if self.ends_at.is_none() {
            self.ends_at = self.ends_at().map(|t| t.to_rfc3339());
        }
        self
    }
}

/// Current, today's and tomorrow's prices for a home
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceInfo {
    #[serde(default, deserialize_with = "null_as_default")]
    pub current: Price,
    #[serde(default, deserialize_with = "null_as_default")]
    pub today: Vec<Price>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tomorrow: Vec<Price>,
}

impl PriceInfo {
    /// Whether a current price is known
    pub fn has_current(&self) -> bool {
        !self.current.starts_at.is_empty()
    }

    /// Today's prices followed by tomorrow's
    pub fn all(&self) -> impl Iterator<Item = &Price> {
        self.today.iter().chain(self.tomorrow.iter())
    }

    /// Cheapest hour of today, optionally including tomorrow
    pub fn lowest(&self, include_tomorrow: bool) -> Option<&Price> {
        let tomorrow: &[Price] = if include_tomorrow { &self.tomorrow } else { &[] };
        self.today
            .iter()
            .chain(tomorrow.iter())
            .fold(None, |lowest: Option<&Price>, p| match lowest {
                Some(l) if l.total <= p.total => Some(l),
                _ => Some(p),
            })
    }
}
