//! Router assembly

use axum::{routing::get, Router};
use std::sync::Arc;

use super::handlers;
use crate::service::DataPointStore;

/// Create all API routes with state
pub fn create_api_routes(store: Arc<DataPointStore>) -> Router {
    Router::new()
        .route("/v1/checkConnect", get(handlers::check_connect))
        .route("/v1/getAllVariables", get(handlers::get_all_variables_v1))
        .route("/v2/getAllVariables", get(handlers::get_all_variables_v2))
        // Access by id
        .route(
            "/v1/variables/{id}",
            get(handlers::read_variable).post(handlers::write_variable),
        )
        // Access by name
        .route(
            "/v1/ports/{port}/devices/{device}/variables/{variable}",
            get(handlers::read_variable_by_name).put(handlers::write_variable_by_name),
        )
        .route("/v1/ports", get(handlers::list_ports))
        .route(
            "/v1/log/level",
            get(handlers::get_log_level).put(handlers::set_log_level),
        )
        .layer(axum::middleware::from_fn(common::logging::http_request_logger))
        .with_state(store)
}
