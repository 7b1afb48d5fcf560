use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uniride_core::normalize_email;
use uniride_core::verification::CodePurpose;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct IssueCodeRequest {
    pub email: String,
    pub purpose: CodePurpose,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Deserialize)]
pub struct ResendCodeRequest {
    pub email: String,
    pub purpose: CodePurpose,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmCodeRequest {
    pub email: String,
    pub code: String,
    pub purpose: CodePurpose,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfirmCodeResponse {
    pub verified: bool,
    pub payload: Value,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/verification/request", post(request_code))
        .route("/api/verification/resend", post(resend_code))
        .route("/api/verification/confirm", post(confirm_code))
}

/// Registration and recovery are limited to the institutional domain.
fn check_domain(state: &AppState, email: &str, purpose: CodePurpose) -> Result<(), AppError> {
    if purpose == CodePurpose::AdminLogin {
        return Ok(());
    }
    match &state.allowed_domain {
        Some(domain) if !normalize_email(email).ends_with(&format!("@{}", domain)) => Err(
            AppError::ValidationError(format!("only @{} addresses are accepted", domain)),
        ),
        _ => Ok(()),
    }
}

/// POST /api/verification/request
async fn request_code(
    State(state): State<AppState>,
    Json(req): Json<IssueCodeRequest>,
) -> Result<Json<Value>, AppError> {
    check_domain(&state, &req.email, req.purpose)?;

    state.codes.issue(&req.email, req.purpose, req.payload).await?;
    state.metrics.codes_issued.inc();

    Ok(Json(json!({
        "success": true,
        "message": format!("Verification code sent to {}", normalize_email(&req.email)),
    })))
}

/// POST /api/verification/resend
async fn resend_code(
    State(state): State<AppState>,
    Json(req): Json<ResendCodeRequest>,
) -> Result<Json<Value>, AppError> {
    check_domain(&state, &req.email, req.purpose)?;

    state.codes.resend(&req.email, req.purpose).await?;
    state.metrics.codes_issued.inc();

    Ok(Json(json!({ "success": true })))
}

/// POST /api/verification/confirm
async fn confirm_code(
    State(state): State<AppState>,
    Json(req): Json<ConfirmCodeRequest>,
) -> Result<Json<ConfirmCodeResponse>, AppError> {
    let payload = state.codes.verify(&req.email, &req.code, req.purpose).await?;
    Ok(Json(ConfirmCodeResponse {
        verified: true,
        payload,
    }))
}
