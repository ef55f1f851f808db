//! HTTP adapter.
//!
//! Axum router exposing the account and stock services. Every response body is
//! an [`Envelope`].

mod deadline;
mod envelope;
mod error;
mod handlers;

pub use envelope::{Envelope, ResultInfo, unwrap_double_encoded};
pub use error::ApiError;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;

use crate::ports::store_port::StorePort;

pub struct AppState {
    pub store: Arc<dyn StorePort>,
    /// Budget for the store work of one request.
    pub request_timeout: Duration,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/securities/new/personal", post(handlers::create_personal))
        .route("/securities/new/corporate", post(handlers::create_corporate))
        .route("/stock/all", get(handlers::fetch_all_stock))
        .route("/stock/one", post(handlers::fetch_one_stock))
        .route("/stock/update", post(handlers::update_stock))
        .route("/stock/update_list", post(handlers::update_stock_list))
        .route(
            "/stock/update_list/state/{new_state}",
            post(handlers::update_stock_list_state),
        )
        .route(
            "/stock/update_list/limit/{new_limit}",
            post(handlers::update_stock_list_limit),
        )
        .route("/stock/{privilege}", get(handlers::fetch_stock_under_priv))
        .route(
            "/stock/{privilege}/like",
            post(handlers::fetch_stock_under_priv_like),
        )
        .fallback(handlers::not_found)
        .method_not_allowed_fallback(handlers::method_not_allowed)
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}
