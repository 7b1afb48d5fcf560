use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uniride_core::identity::Party;
use uniride_core::location::Coordinate;
use uniride_core::repository::{status, TripRecord};
use uniride_core::TripId;

/// Trip status in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TripStatus {
    Pending,
    Accepted,
    Finished,
}

impl TripStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TripStatus::Pending => status::PENDING,
            TripStatus::Accepted => status::ACCEPTED,
            TripStatus::Finished => status::FINISHED,
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            status::PENDING => Some(TripStatus::Pending),
            status::ACCEPTED => Some(TripStatus::Accepted),
            status::FINISHED => Some(TripStatus::Finished),
            _ => None,
        }
    }
}

/// A trip request no driver has taken yet
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TripOffer {
    pub id: TripId,
    pub passenger: Party,
    pub origin: String,
    pub destination: String,
    pub origin_coords: Coordinate,
    pub destination_coords: Coordinate,
    pub payment_method: String,
    pub created_at: DateTime<Utc>,
    pub status: TripStatus,
}

impl TripOffer {
    pub fn new(
        id: TripId,
        passenger: Party,
        origin: &str,
        destination: &str,
        payment_method: &str,
    ) -> Self {
        Self {
            id,
            passenger,
            origin: origin.to_string(),
            destination: destination.to_string(),
            origin_coords: Coordinate::parse_loose(origin).unwrap_or(Coordinate::CAMPUS_PICKUP),
            destination_coords: Coordinate::parse_loose(destination)
                .unwrap_or(Coordinate::CAMPUS_DROPOFF),
            payment_method: payment_method.to_string(),
            created_at: Utc::now(),
            status: TripStatus::Pending,
        }
    }
}

/// A trip a driver has accepted, tracked until the process forgets it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActiveTrip {
    pub id: TripId,
    pub passenger: Party,
    pub driver: Party,
    pub origin: String,
    pub destination: String,
    pub origin_coords: Coordinate,
    pub destination_coords: Coordinate,
    pub payment_method: String,
    pub status: TripStatus,
    pub driver_location: Option<Coordinate>,
    pub passenger_location: Option<Coordinate>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub cost: Option<f64>,
}

impl ActiveTrip {
    /// Acceptance moves the offer here; the driver starts at the campus pickup.
    pub fn from_offer(offer: TripOffer, driver: Party) -> Self {
        Self {
            id: offer.id,
            passenger: offer.passenger,
            driver,
            passenger_location: Some(offer.origin_coords),
            origin: offer.origin,
            destination: offer.destination,
            origin_coords: offer.origin_coords,
            destination_coords: offer.destination_coords,
            payment_method: offer.payment_method,
            status: TripStatus::Accepted,
            driver_location: Some(Coordinate::CAMPUS_PICKUP),
            started_at: Utc::now(),
            finished_at: None,
            cost: None,
        }
    }

    /// Rebuild an accepted trip from its persisted row. Missing names fall
    /// back to the email.
    pub fn from_record(record: &TripRecord) -> Option<Self> {
        let driver_email = record.driver_email.as_deref()?;
        let passenger_name = record
            .passenger_name
            .clone()
            .unwrap_or_else(|| record.passenger_email.clone());
        let driver_name = record
            .driver_name
            .clone()
            .unwrap_or_else(|| driver_email.to_string());

        Some(Self {
            id: record.id,
            passenger: Party::new(passenger_name, &record.passenger_email),
            driver: Party::new(driver_name, driver_email),
            origin: record.origin.clone(),
            destination: record.destination.clone(),
            origin_coords: Coordinate::parse_loose(&record.origin)
                .unwrap_or(Coordinate::CAMPUS_PICKUP),
            destination_coords: Coordinate::parse_loose(&record.destination)
                .unwrap_or(Coordinate::CAMPUS_DROPOFF),
            payment_method: record.payment_method.clone(),
            status: TripStatus::Accepted,
            driver_location: None,
            passenger_location: None,
            started_at: record.accepted_at.unwrap_or_else(Utc::now),
            finished_at: None,
            cost: None,
        })
    }

    pub fn involves(&self, email: &str) -> bool {
        self.passenger.email.eq_ignore_ascii_case(email) || self.driver.email.eq_ignore_ascii_case(email)
    }

    /// Still being serviced, i.e. not finished.
    pub fn is_open(&self) -> bool {
        self.status != TripStatus::Finished
    }
}

/// Answer to a status query
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusView {
    pub status: TripStatus,
    pub driver: Option<String>,
}

/// Last known driver position as shown to administrators
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DriverPosition {
    pub email: String,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    pub available: bool,
    pub last_update: DateTime<Utc>,
}

/// Result of rating the counterpart of a trip
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RatingOutcome {
    pub rated_user: String,
    pub avg_rating: String,
}
