use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use uniride_chat::ChatError;
use uniride_core::CoreError;
use uniride_trip::TripError;

#[derive(Debug)]
pub enum AppError {
    AuthenticationError(String),
    AuthorizationError(String),
    ValidationError(String),
    NotFoundError(String),
    Anyhow(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::AuthenticationError(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::AuthorizationError(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Anyhow(err) => match into_domain(err) {
                Ok(domain) => domain_response(domain),
                Err(err) => {
                    tracing::error!("Internal Server Error: {}", err);
                    (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
                }
            },
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::Anyhow(err.into())
    }
}

/// Recover the core taxonomy from whichever domain error was raised.
fn into_domain(err: anyhow::Error) -> Result<CoreError, anyhow::Error> {
    let err = match err.downcast::<CoreError>() {
        Ok(core) => return Ok(core),
        Err(err) => err,
    };
    let err = match err.downcast::<TripError>() {
        Ok(trip) => return Ok(trip.into()),
        Err(err) => err,
    };
    err.downcast::<ChatError>().map(CoreError::from)
}

fn domain_response(err: CoreError) -> (StatusCode, String) {
    let status = match &err {
        CoreError::NotFound(_) | CoreError::Unavailable(_) => StatusCode::NOT_FOUND,
        CoreError::Forbidden(_) => StatusCode::FORBIDDEN,
        CoreError::InvalidState(_)
        | CoreError::Validation(_)
        | CoreError::Expired(_)
        | CoreError::Mismatch(_) => StatusCode::BAD_REQUEST,
        CoreError::PersistenceDegraded(_) => StatusCode::SERVICE_UNAVAILABLE,
        CoreError::Delivery(_) => {
            tracing::error!("Delivery failure: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_domain_errors_keep_their_status() {
        assert_eq!(status_of(TripError::NotFound(3).into()), StatusCode::NOT_FOUND);
        assert_eq!(
            status_of(TripError::Forbidden("x".into()).into()),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_of(ChatError::Incomplete("sender").into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(CoreError::Expired("a@b".into()).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(TripError::Degraded("down".into()).into()),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_of(anyhow::anyhow!("boom").into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
