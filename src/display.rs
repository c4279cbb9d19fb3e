//! Human-readable formatting for homes, prices and times

use chrono::{DateTime, TimeZone, Timelike};

use crate::model::{Home, PriceLevel};

/// Nickname, else `address1, city`, else the id
pub fn home_display_name(home: &Home) -> String {
    if !home.app_nickname.is_empty() {
        home.app_nickname.clone()
    } else if !home.address.address1.is_empty() {
        format!("{}, {}", home.address.address1, home.address.city)
    } else {
        home.id.clone()
    }
}

/// Shorten to at most `max` characters, ending in `...` when cut
pub fn trim_string(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    if max <= 3 {
        return s.chars().take(max).collect();
    }
    let mut out: String = s.chars().take(max - 3).collect();
    out.push_str("...");
    out
}

pub fn status_indicator(active: bool) -> &'static str {
    if active {
        "🟢"
    } else {
        "🔴"
    }
}

pub fn price_level_indicator(level: Option<PriceLevel>) -> &'static str {
    match level {
        Some(PriceLevel::VeryCheap) => "🟢",
        Some(PriceLevel::Cheap) => "🟩",
        Some(PriceLevel::Normal) => "⬜",
        Some(PriceLevel::Expensive) => "🟧",
        Some(PriceLevel::VeryExpensive) => "🔴",
        Some(PriceLevel::Unknown) | None => "⚪",
    }
}

/// Price per kWh in cents, one decimal, comma separator: `0.2534` → `25,3`
pub fn format_cents(price: f64) -> String {
    format!("{:.1}", price * 100.0).replacen('.', ",", 1)
}

/// Hour of an RFC 3339 start time in its own offset: `"14 uur"`
pub fn format_hour(starts_at: &str) -> Option<String> {
    DateTime::parse_from_rfc3339(starts_at)
        .ok()
        .map(|t| format!("{} uur", t.hour()))
}

pub fn format_date_time<Tz: TimeZone>(t: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    t.format("%Y-%m-%d %H:%M").to_string()
}

pub fn format_time_only<Tz: TimeZone>(t: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    t.format("%H:%M").to_string()
}
