pub mod identity;

pub use identity::{admin_middleware, caller_from_headers, email_from_headers};
