use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::LazyLock;
use tokio::sync::RwLock;

use crate::normalize_email;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    /// Campus pickup point; drivers start here until they report a position.
    pub const CAMPUS_PICKUP: Coordinate = Coordinate { lat: -1.65, lon: -78.68 };
    /// Default drop-off point for destinations without explicit coordinates.
    pub const CAMPUS_DROPOFF: Coordinate = Coordinate { lat: -1.66, lon: -78.69 };

    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Extract a signed decimal pair from free text, e.g.
    /// `"Lat: -1.65, Lon: -78.68"` or `"-1.65,-78.68"`. Integers alone
    /// (room numbers, floors) never match.
    pub fn parse_loose(text: &str) -> Option<Self> {
        let caps = COORD_REGEX.captures(text)?;
        let lat: f64 = caps[1].parse().ok()?;
        let lon: f64 = caps[2].parse().ok()?;
        (lat.abs() <= 90.0 && lon.abs() <= 180.0).then(|| Self::new(lat, lon))
    }

    /// Human readable form, parseable again with [`Coordinate::parse_loose`].
    pub fn label(&self) -> String {
        format!("Lat: {:?}, Lon: {:?}", self.lat, self.lon)
    }
}

/// Signed decimal pair, optionally labelled `Lat:` / `Lon:`.
static COORD_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:lat:\s*)?(-?\d+\.\d+)\s*,\s*(?:lon:\s*)?(-?\d+\.\d+)")
        .expect("Invalid coordinate regex pattern")
});

/// Last reported position of a participant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationFix {
    pub coordinate: Coordinate,
    pub reported_at: DateTime<Utc>,
}

/// Ephemeral map of identity -> last known position, for drivers and
/// passengers separately.
#[derive(Default)]
pub struct LocationStore {
    drivers: RwLock<HashMap<String, LocationFix>>,
    passengers: RwLock<HashMap<String, LocationFix>>,
}

impl LocationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record_driver(&self, email: &str, coordinate: Coordinate) -> LocationFix {
        let fix = LocationFix { coordinate, reported_at: Utc::now() };
        self.drivers.write().await.insert(normalize_email(email), fix);
        fix
    }

    pub async fn record_passenger(&self, email: &str, coordinate: Coordinate) -> LocationFix {
        let fix = LocationFix { coordinate, reported_at: Utc::now() };
        self.passengers.write().await.insert(normalize_email(email), fix);
        fix
    }

    pub async fn driver(&self, email: &str) -> Option<LocationFix> {
        self.drivers.read().await.get(&normalize_email(email)).copied()
    }

    pub async fn passenger(&self, email: &str) -> Option<LocationFix> {
        self.passengers.read().await.get(&normalize_email(email)).copied()
    }

    /// Snapshot of every driver position, sorted by email.
    pub async fn drivers(&self) -> Vec<(String, LocationFix)> {
        let mut all: Vec<_> = self
            .drivers
            .read()
            .await
            .iter()
            .map(|(email, fix)| (email.clone(), *fix))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    /// Drop every position reported under this identity (logout).
    pub async fn forget(&self, email: &str) {
        let key = normalize_email(email);
        self.drivers.write().await.remove(&key);
        self.passengers.write().await.remove(&key);
    }
}
