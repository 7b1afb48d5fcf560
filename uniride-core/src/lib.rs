pub mod identity;
pub mod location;
pub mod repository;
pub mod persistence;
pub mod mail;
pub mod verification;
pub mod stats;

/// Trip identifier, assigned by the database or generated locally when the
/// database is unreachable.
pub type TripId = i64;

/// Sender label used for every message the server injects into a trip chat.
pub const SYSTEM_SENDER: &str = "UniRide";

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Code expired for {0}")]
    Expired(String),
    #[error("Code mismatch for {0}")]
    Mismatch(String),
    #[error("Unavailable: {0}")]
    Unavailable(String),
    #[error("Persistence degraded: {0}")]
    PersistenceDegraded(String),
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Delivery failed: {0}")]
    Delivery(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

/// Trimmed, lower-cased email used as the key for every identity lookup.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Ana.Perez@ESPOCH.edu.ec "), "ana.perez@espoch.edu.ec");
        assert_eq!(normalize_email(""), "");
    }
}
