//! HTTP API surface

pub mod conversion;

use axum::routing::{get, post};
use axum::Router;

use self::conversion::CurrencyApiState;

/// Currency conversion routes
pub fn router(state: CurrencyApiState) -> Router {
    Router::new()
        .route("/api/currency/convert", post(conversion::convert_currency))
        .route("/api/currency/rate", get(conversion::get_rate))
        .route(
            "/api/currency/conversions",
            get(conversion::list_conversions),
        )
        .route(
            "/api/currency/conversions/{id}/history",
            get(conversion::list_conversion_history),
        )
        .with_state(state)
}
