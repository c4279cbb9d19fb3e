//! Chart Routes
//!
//! JSON series for the dashboard charts, read from the local store.
//!
//! - GET /api/price/:home_id - Today and tomorrow prices
//! - GET /api/consumption/:home_id - Daily consumption, oldest first
//! - GET /api/production/:home_id - Daily production, oldest first

use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use crate::api::dto::{ConsumptionChartResponse, PriceChartResponse, ProductionChartResponse};
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;

/// Daily rows shown in the energy charts
const CHART_DAYS: usize = 7;

/// GET /api/price/:home_id
pub async fn price_chart(
    State(state): State<Arc<AppState>>,
    Path(home_id): Path<String>,
) -> ApiResult<Json<PriceChartResponse>> {
    state.store.require_home(&home_id)?;

    let info = state
        .store
        .price_info(&home_id)?
        .ok_or_else(|| ApiError::NotFound(format!("No price data for home {}", home_id)))?;

    Ok(Json(PriceChartResponse::from(&info)))
}

/// GET /api/consumption/:home_id
pub async fn consumption_chart(
    State(state): State<Arc<AppState>>,
    Path(home_id): Path<String>,
) -> ApiResult<Json<ConsumptionChartResponse>> {
    let home = state.store.require_home(&home_id)?;
    if !home.has_consumption() {
        return Err(ApiError::NotFound("No consumption data available".to_string()));
    }

    let rows = state.store.consumption(&home_id, CHART_DAYS)?;
    Ok(Json(ConsumptionChartResponse::from_intervals(rows)))
}

/// GET /api/production/:home_id
pub async fn production_chart(
    State(state): State<Arc<AppState>>,
    Path(home_id): Path<String>,
) -> ApiResult<Json<ProductionChartResponse>> {
    let home = state.store.require_home(&home_id)?;
    if !home.has_production() {
        return Err(ApiError::NotFound("No production data available".to_string()));
    }

    let rows = state.store.production(&home_id, CHART_DAYS)?;
    Ok(Json(ProductionChartResponse::from_intervals(rows)))
}
