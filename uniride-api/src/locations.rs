use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uniride_core::location::{Coordinate, LocationFix};
use uniride_trip::DriverPosition;

use crate::error::AppError;
use crate::middleware::{admin_middleware, email_from_headers};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct DriverLocationRequest {
    pub email: Option<String>,
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Deserialize, Default)]
pub struct LogoutRequest {
    pub email: Option<String>,
}

pub fn routes() -> Router<AppState> {
    let admin = Router::new()
        .route("/api/admin/driver-locations", get(driver_locations))
        .layer(middleware::from_fn(admin_middleware));

    Router::new()
        .route("/api/driver/location", post(report_driver_location))
        .route("/api/logout", post(logout))
        .merge(admin)
}

/// POST /api/driver/location
async fn report_driver_location(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<DriverLocationRequest>,
) -> Result<Json<LocationFix>, AppError> {
    let email = req
        .email
        .filter(|e| !e.trim().is_empty())
        .or_else(|| email_from_headers(&headers))
        .ok_or_else(|| AppError::ValidationError("driver email is required".to_string()))?;

    let fix = state
        .trips
        .report_driver(&email, Coordinate::new(req.lat, req.lon))
        .await;
    Ok(Json(fix))
}

/// GET /api/admin/driver-locations
async fn driver_locations(State(state): State<AppState>) -> Json<Vec<DriverPosition>> {
    Json(state.trips.drivers().await)
}

/// POST /api/logout
async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let email = serde_json::from_slice::<LogoutRequest>(&body)
        .ok()
        .and_then(|req| req.email)
        .filter(|e| !e.trim().is_empty())
        .or_else(|| email_from_headers(&headers))
        .ok_or_else(|| AppError::AuthenticationError("no identity to log out".to_string()))?;

    state.trips.forget(&email).await;
    state.codes.invalidate(&email).await;
    Ok(Json(json!({ "success": true })))
}
