//! HTTP API Module
//!
//! Provides a REST API for peer membership and address allocation.

mod http;

pub use http::{AppState, HttpServer};
