//! HTTP API over the data point store

pub mod handlers;
pub mod models;
pub mod routes;

pub use routes::create_api_routes;
