//! Home Routes
//!
//! - GET /api/homes - All stored homes
//! - GET /api/homes/:home_id - One home with address and metering data

use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use crate::api::dto::HomeListResponse;
use crate::api::error::ApiResult;
use crate::api::state::AppState;
use crate::model::Home;

/// GET /api/homes
pub async fn list_homes(State(state): State<Arc<AppState>>) -> ApiResult<Json<HomeListResponse>> {
    let homes = state.store.homes()?;

    Ok(Json(HomeListResponse {
        total: homes.len(),
        homes,
    }))
}

/// GET /api/homes/:home_id
pub async fn get_home(
    State(state): State<Arc<AppState>>,
    Path(home_id): Path<String>,
) -> ApiResult<Json<Home>> {
    Ok(Json(state.store.require_home(&home_id)?))
}
