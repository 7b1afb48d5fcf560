use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use uniride_core::stats::{DriverSummary, Statistics};

use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/stats/overview", get(overview))
        .route("/api/stats/driver/{email}", get(driver_summary))
}

/// GET /api/health
async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "activeTrips": state.trips.active_count().await,
    }))
}

/// GET /api/stats/overview
async fn overview(State(state): State<AppState>) -> Json<Statistics> {
    Json(state.stats.snapshot().await)
}

/// GET /api/stats/driver/{email}
async fn driver_summary(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Json<DriverSummary> {
    let active = state.trips.driver_trip_count(&email).await;
    Json(state.stats.driver_summary(&email, active).await)
}
