//! Prometheus counters for the trip and chat core.

use axum::{extract::State, http::StatusCode};
use prometheus::{IntCounter, IntGauge, Opts, Registry, TextEncoder};
use uniride_core::persistence::degraded_events;

use crate::state::AppState;

pub struct Metrics {
    registry: Registry,
    pub trips_requested: IntCounter,
    pub trips_accepted: IntCounter,
    pub trips_completed: IntCounter,
    pub chat_messages: IntCounter,
    pub codes_issued: IntCounter,
    active_trips: IntGauge,
    persistence_degraded: IntGauge,
}

impl Metrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let trips_requested = IntCounter::with_opts(Opts::new(
            "uniride_trips_requested_total",
            "Trip requests accepted into the pending list",
        ))?;
        let trips_accepted = IntCounter::with_opts(Opts::new(
            "uniride_trips_accepted_total",
            "Offers taken by a driver",
        ))?;
        let trips_completed = IntCounter::with_opts(Opts::new(
            "uniride_trips_completed_total",
            "Trips finished by their driver",
        ))?;
        let chat_messages = IntCounter::with_opts(Opts::new(
            "uniride_chat_messages_total",
            "User chat messages appended",
        ))?;
        let codes_issued = IntCounter::with_opts(Opts::new(
            "uniride_verification_codes_issued_total",
            "Verification codes mailed",
        ))?;
        let active_trips = IntGauge::with_opts(Opts::new(
            "uniride_active_trips",
            "Trips currently in ACCEPTED state",
        ))?;
        let persistence_degraded = IntGauge::with_opts(Opts::new(
            "uniride_persistence_degraded_events",
            "Storage calls that failed since start",
        ))?;

        registry.register(Box::new(trips_requested.clone()))?;
        registry.register(Box::new(trips_accepted.clone()))?;
        registry.register(Box::new(trips_completed.clone()))?;
        registry.register(Box::new(chat_messages.clone()))?;
        registry.register(Box::new(codes_issued.clone()))?;
        registry.register(Box::new(active_trips.clone()))?;
        registry.register(Box::new(persistence_degraded.clone()))?;

        Ok(Self {
            registry,
            trips_requested,
            trips_accepted,
            trips_completed,
            chat_messages,
            codes_issued,
            active_trips,
            persistence_degraded,
        })
    }

    pub fn render(&self, active_trips: usize) -> prometheus::Result<String> {
        self.active_trips.set(active_trips as i64);
        self.persistence_degraded.set(degraded_events() as i64);

        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder.encode_to_string(&metric_families)
    }
}

pub async fn metrics_handler(State(state): State<AppState>) -> Result<String, StatusCode> {
    let active = state.trips.active_count().await;
    state.metrics.render(active).map_err(|e| {
        tracing::error!("Failed to encode metrics: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })
}
