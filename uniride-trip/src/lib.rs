pub mod fare;
pub mod models;
pub mod registry;

pub use fare::{FarePolicy, FixedFare, RandomFare};
pub use models::{ActiveTrip, DriverPosition, RatingOutcome, StatusView, TripOffer, TripStatus};
pub use registry::{TripError, TripRegistry};
