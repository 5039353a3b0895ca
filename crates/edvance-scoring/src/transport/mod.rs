//! Transport layer for the scoring service.
//!
//! HTTP via axum is the only transport.

pub mod http;

pub use http::{ServerConfig, serve};
