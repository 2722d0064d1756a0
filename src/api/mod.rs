//! HTTP API Module
//!
//! Provides a REST API for producing and consuming log records.

mod http;

pub use http::{AppState, HttpServer};
