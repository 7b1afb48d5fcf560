use axum::{
    extract::Request,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use uniride_core::identity::{Caller, Role};

use crate::error::AppError;

// ============================================================================
// Identity headers
// ============================================================================

pub const EMAIL_HEADER: &str = "user-email";
pub const ROLE_HEADER: &str = "user-role";

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Caller email as supplied by the client, if any.
pub fn email_from_headers(headers: &HeaderMap) -> Option<String> {
    header(headers, EMAIL_HEADER).map(str::to_string)
}

/// Both identity headers are required; an unknown role is a bad request.
pub fn caller_from_headers(headers: &HeaderMap) -> Result<Caller, AppError> {
    let (Some(email), Some(role)) = (header(headers, EMAIL_HEADER), header(headers, ROLE_HEADER))
    else {
        return Err(AppError::AuthenticationError(
            "user-email and user-role headers are required".to_string(),
        ));
    };

    let role: Role = role
        .parse()
        .map_err(|_| AppError::ValidationError(format!("unknown role '{}'", role)))?;
    Ok(Caller::new(email, role))
}

// ============================================================================
// Admin Middleware
// ============================================================================

pub async fn admin_middleware(mut req: Request, next: Next) -> Result<Response, StatusCode> {
    let caller = caller_from_headers(req.headers()).map_err(|_| StatusCode::UNAUTHORIZED)?;

    if caller.role != Role::Admin {
        return Err(StatusCode::FORBIDDEN);
    }

    req.extensions_mut().insert(caller);

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_caller_from_headers() {
        let mut headers = HeaderMap::new();
        assert!(matches!(
            caller_from_headers(&headers),
            Err(AppError::AuthenticationError(_))
        ));

        headers.insert(EMAIL_HEADER, HeaderValue::from_static(" Ana@ESPOCH.edu.ec "));
        headers.insert(ROLE_HEADER, HeaderValue::from_static("pasajero"));
        let caller = caller_from_headers(&headers).unwrap();
        assert_eq!(caller.email, "ana@espoch.edu.ec");
        assert_eq!(caller.role, Role::Passenger);

        headers.insert(ROLE_HEADER, HeaderValue::from_static("pilot"));
        assert!(matches!(
            caller_from_headers(&headers),
            Err(AppError::ValidationError(_))
        ));
    }
}
