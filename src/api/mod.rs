//! HTTP API Module
//!
//! Provides the REST API for writes, reads and node introspection.

mod http;

pub use http::{AppState, ErrorResponse, HealthResponse, HttpServer, NodeRole, ReadResponse, WriteResponse};
