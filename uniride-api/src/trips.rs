use axum::{
    extract::{Path, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uniride_core::identity::{Party, Role};
use uniride_core::location::Coordinate;
use uniride_core::repository::TripRecord;
use uniride_core::TripId;
use uniride_trip::{ActiveTrip, RatingOutcome, StatusView, TripOffer};

use crate::error::AppError;
use crate::middleware::{caller_from_headers, email_from_headers};
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestTripRequest {
    pub passenger_name: String,
    pub passenger_email: Option<String>,
    pub origin: String,
    pub destination: String,
    pub payment_method: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestTripResponse {
    pub message: String,
    pub trip_id: TripId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptTripRequest {
    pub trip_id: TripId,
    pub driver_name: String,
    pub driver_email: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AcceptTripResponse {
    pub message: String,
    pub trip: ActiveTrip,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteTripRequest {
    pub trip_id: TripId,
    pub driver_email: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CompleteTripResponse {
    pub message: String,
    pub cost: String,
}

#[derive(Debug, Deserialize)]
pub struct PositionRequest {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateTripRequest {
    pub rating: i32,
    pub comment: Option<String>,
    /// Role label of the rater (`pasajero`, `conductor`, English aliases).
    pub rated_by: Option<String>,
}

// ============================================================================
// Routes
// ============================================================================

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/trips/offers", get(list_offers))
        .route("/api/trips/request", post(request_trip))
        .route("/api/trips/accept", post(accept_trip))
        .route("/api/trips/complete", post(complete_trip))
        .route("/api/trips/history", get(trip_history))
        .route("/api/trips/{id}/resume", post(resume_trip))
        .route("/api/trips/{id}/status", get(trip_status))
        .route("/api/trips/{id}/driverLocation", get(driver_location))
        .route(
            "/api/trips/{id}/passengerLocation",
            get(passenger_location).post(report_passenger_location),
        )
        .route("/api/trips/{id}/rate", post(rate_trip))
}

/// GET /api/trips/offers
async fn list_offers(State(state): State<AppState>) -> Json<Vec<TripOffer>> {
    Json(state.trips.offers().await)
}

/// POST /api/trips/request
async fn request_trip(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RequestTripRequest>,
) -> Result<Json<RequestTripResponse>, AppError> {
    let email = req
        .passenger_email
        .or_else(|| email_from_headers(&headers))
        .unwrap_or_default();

    let offer = state
        .trips
        .create(
            Party::new(req.passenger_name, &email),
            &req.origin,
            &req.destination,
            req.payment_method.as_deref(),
        )
        .await?;
    state.metrics.trips_requested.inc();

    Ok(Json(RequestTripResponse {
        message: "Trip requested. Looking for a driver...".to_string(),
        trip_id: offer.id,
    }))
}

/// POST /api/trips/accept
async fn accept_trip(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<AcceptTripRequest>,
) -> Result<Json<AcceptTripResponse>, AppError> {
    let email = req
        .driver_email
        .or_else(|| email_from_headers(&headers))
        .ok_or_else(|| AppError::ValidationError("driverEmail is required".to_string()))?;

    let trip = state
        .trips
        .accept(req.trip_id, Party::new(req.driver_name, &email))
        .await?;
    state.metrics.trips_accepted.inc();

    Ok(Json(AcceptTripResponse {
        message: "Trip accepted".to_string(),
        trip,
    }))
}

/// POST /api/trips/complete
async fn complete_trip(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CompleteTripRequest>,
) -> Result<Json<CompleteTripResponse>, AppError> {
    let email = req
        .driver_email
        .or_else(|| email_from_headers(&headers))
        .unwrap_or_default();

    let trip = state.trips.complete(req.trip_id, &email).await?;
    state.metrics.trips_completed.inc();

    Ok(Json(CompleteTripResponse {
        message: "Trip finished".to_string(),
        cost: format!("{:.2}", trip.cost.unwrap_or_default()),
    }))
}

/// POST /api/trips/{id}/resume
async fn resume_trip(
    State(state): State<AppState>,
    Path(id): Path<TripId>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    let caller = caller_from_headers(&headers)?;
    let trip = state.trips.resume(id, &caller).await?;

    Ok(Json(json!({
        "success": true,
        "message": "Trip resumed",
        "trip": trip,
    })))
}

/// GET /api/trips/{id}/status
async fn trip_status(
    State(state): State<AppState>,
    Path(id): Path<TripId>,
) -> Result<Json<StatusView>, AppError> {
    Ok(Json(state.trips.status(id).await?))
}

/// GET /api/trips/{id}/driverLocation
async fn driver_location(
    State(state): State<AppState>,
    Path(id): Path<TripId>,
) -> Result<Json<Coordinate>, AppError> {
    Ok(Json(state.trips.driver_location(id).await?))
}

/// GET /api/trips/{id}/passengerLocation
async fn passenger_location(
    State(state): State<AppState>,
    Path(id): Path<TripId>,
) -> Result<Json<Coordinate>, AppError> {
    Ok(Json(state.trips.passenger_location(id).await?))
}

/// POST /api/trips/{id}/passengerLocation
async fn report_passenger_location(
    State(state): State<AppState>,
    Path(id): Path<TripId>,
    headers: HeaderMap,
    Json(req): Json<PositionRequest>,
) -> Result<Json<Value>, AppError> {
    let email = email_from_headers(&headers);
    state
        .trips
        .report_passenger(id, email.as_deref(), Coordinate::new(req.lat, req.lon))
        .await?;

    Ok(Json(json!({ "success": true })))
}

/// POST /api/trips/{id}/rate
async fn rate_trip(
    State(state): State<AppState>,
    Path(id): Path<TripId>,
    headers: HeaderMap,
    Json(req): Json<RateTripRequest>,
) -> Result<Json<RatingOutcome>, AppError> {
    let rated_by: Role = match req.rated_by.as_deref() {
        Some(label) => label
            .parse()
            .map_err(|_| AppError::ValidationError(format!("unknown role '{}'", label)))?,
        None => caller_from_headers(&headers)?.role,
    };

    let outcome = state
        .trips
        .rate(id, req.rating, rated_by, req.comment.as_deref())
        .await?;
    Ok(Json(outcome))
}

/// GET /api/trips/history
async fn trip_history(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<TripRecord>>, AppError> {
    let caller = caller_from_headers(&headers)?;
    Ok(Json(state.trips.history(&caller).await))
}
