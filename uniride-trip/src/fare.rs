use rand::Rng;

use crate::models::ActiveTrip;

/// Prices a trip at completion.
pub trait FarePolicy: Send + Sync {
    fn quote(&self, trip: &ActiveTrip) -> f64;
}

/// Uniform random fare within bounds, rounded to cents.
///
/// Stand-in until fares are computed from distance and time; the trip
/// itself is ignored.
#[derive(Debug, Clone)]
pub struct RandomFare {
    min: f64,
    max: f64,
}

impl RandomFare {
    pub fn new(min: f64, max: f64) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }
}

impl Default for RandomFare {
    fn default() -> Self {
        Self::new(2.0, 7.0)
    }
}

impl FarePolicy for RandomFare {
    fn quote(&self, _trip: &ActiveTrip) -> f64 {
        let raw = rand::thread_rng().gen_range(self.min..=self.max);
        ((raw * 100.0).round() / 100.0).clamp(self.min, self.max)
    }
}

/// Same price for every trip.
#[derive(Debug, Clone)]
pub struct FixedFare(pub f64);

impl FarePolicy for FixedFare {
    fn quote(&self, _trip: &ActiveTrip) -> f64 {
        self.0
    }
}
