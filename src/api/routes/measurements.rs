//! Measurement Routes
//!
//! - GET /api/measurements/:home_id?limit=&since= - Stored live samples
//!
//! Without `since` the newest `limit` rows are returned newest first. With
//! `since` (RFC 3339 or `now-Nh`/`now-Nm`/`now-Nd`) every row from that
//! moment on is returned oldest first, truncated to `limit`.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

use crate::api::dto::{MeasurementsQuery, MeasurementsResponse};
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;

const DEFAULT_LIMIT: usize = 100;
const MAX_LIMIT: usize = 10_000;

/// GET /api/measurements/:home_id
pub async fn list_measurements(
    State(state): State<Arc<AppState>>,
    Path(home_id): Path<String>,
    Query(query): Query<MeasurementsQuery>,
) -> ApiResult<Json<MeasurementsResponse>> {
    state.store.require_home(&home_id)?;

    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    if limit == 0 || limit > MAX_LIMIT {
        return Err(ApiError::Validation(format!(
            "limit must be between 1 and {}",
            MAX_LIMIT
        )));
    }

    let measurements = match query.since.as_deref() {
        Some(since) => {
            let since = parse_since(since)?;
            state.store.measurements_since(&home_id, since, limit)?
        }
        None => state.store.latest_measurements(&home_id, limit)?,
    };

    Ok(Json(MeasurementsResponse {
        home_id,
        count: measurements.len(),
        measurements,
    }))
}

/// Parse an absolute or relative start time
pub fn parse_since(s: &str) -> ApiResult<DateTime<Utc>> {
    if s.starts_with("now") {
        return parse_relative_time(s, Utc::now());
    }

    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| ApiError::Validation(format!("Cannot parse timestamp: {}", s)))
}

/// Parse relative time like "now-2h" against `now`
fn parse_relative_time(s: &str, now: DateTime<Utc>) -> ApiResult<DateTime<Utc>> {
    if s == "now" {
        return Ok(now);
    }

    let re = regex::Regex::new(r"^now-(\d+)([smhd])$")
        .map_err(|_| ApiError::Internal("Regex error".to_string()))?;

    let caps = re
        .captures(s)
        .ok_or_else(|| ApiError::Validation(format!("Cannot parse relative time: {}", s)))?;

    let amount: i64 = caps[1]
        .parse()
        .map_err(|_| ApiError::Validation("Invalid number in time expression".to_string()))?;

    let offset = match &caps[2] {
        "s" => Duration::try_seconds(amount),
        "m" => Duration::try_minutes(amount),
        "h" => Duration::try_hours(amount),
        "d" => Duration::try_days(amount),
        unit => {
            return Err(ApiError::Validation(format!("Invalid time unit: {}", unit)));
        }
    }
    .ok_or_else(|| ApiError::Validation(format!("Time offset out of range: {}", s)))?;

    now.checked_sub_signed(offset)
        .ok_or_else(|| ApiError::Validation(format!("Time offset out of range: {}", s)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_relative_time() {
        let now = Utc.with_ymd_and_hms(2024, 3, 2, 12, 0, 0).unwrap();

        assert_eq!(parse_relative_time("now", now).unwrap(), now);
        assert_eq!(
            parse_relative_time("now-2h", now).unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 2, 10, 0, 0).unwrap()
        );
        assert_eq!(
            parse_relative_time("now-30m", now).unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 2, 11, 30, 0).unwrap()
        );
        assert_eq!(
            parse_relative_time("now-1d", now).unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
        );
        assert!(parse_relative_time("now-2y", now).is_err());
        assert!(parse_relative_time("now+2h", now).is_err());
    }

    #[test]
    fn test_parse_since_absolute() {
        let since = parse_since("2024-03-02T13:00:00+01:00").unwrap();
        assert_eq!(since, Utc.with_ymd_and_hms(2024, 3, 2, 12, 0, 0).unwrap());
        assert!(parse_since("yesterday").is_err());
    }
}
