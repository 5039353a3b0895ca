//! Pipe bridge between the scoring service and its worker subprocess.
//!
//! - **protocol**: request/response types and the readiness sentinel
//! - **codec**: newline-delimited JSON framing over AsyncRead/AsyncWrite

pub mod codec;
pub mod protocol;
