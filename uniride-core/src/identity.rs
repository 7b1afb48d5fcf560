use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{normalize_email, CoreError};

/// Role carried by every inbound request. The boundary layer supplies it
/// verbatim; nothing in the core authenticates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Passenger,
    Driver,
    Admin,
}

impl Role {
    /// Label used in the persisted user records and in request headers.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Passenger => "pasajero",
            Role::Driver => "conductor",
            Role::Admin => "administrador",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pasajero" | "passenger" => Ok(Role::Passenger),
            "conductor" | "driver" => Ok(Role::Driver),
            "administrador" | "admin" => Ok(Role::Admin),
            other => Err(CoreError::Validation(format!("unknown role '{}'", other))),
        }
    }
}

/// Identity of the caller of an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub email: String,
    pub role: Role,
}

impl Caller {
    pub fn new(email: &str, role: Role) -> Self {
        Self {
            email: normalize_email(email),
            role,
        }
    }

    /// Case-insensitive comparison against a persisted email.
    pub fn owns(&self, email: Option<&str>) -> bool {
        email.map(normalize_email).as_deref() == Some(self.email.as_str())
    }
}

/// A named participant of a trip (passenger or driver).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    pub name: String,
    pub email: String,
}

impl Party {
    pub fn new(name: impl Into<String>, email: &str) -> Self {
        Self {
            name: name.into(),
            email: normalize_email(email),
        }
    }
}
