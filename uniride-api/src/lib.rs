use axum::{http::HeaderName, http::Method, routing::get, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod chat;
pub mod error;
pub mod locations;
pub mod metrics;
pub mod middleware;
pub mod state;
pub mod stats;
pub mod trips;
pub mod verification;
pub mod worker;

pub use state::{AppState, Gateways};

pub fn app(state: AppState) -> Router {
    // CORS Middleware
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            HeaderName::from_static(middleware::identity::EMAIL_HEADER),
            HeaderName::from_static(middleware::identity::ROLE_HEADER),
        ]);

    Router::new()
        .merge(trips::routes())
        .merge(chat::routes())
        .merge(locations::routes())
        .merge(verification::routes())
        .merge(stats::routes())
        .route("/metrics", get(metrics::metrics_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
