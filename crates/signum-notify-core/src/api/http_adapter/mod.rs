//! Native HTTP client for Signum node APIs.
//!
//! Implements [`Transport`](super::Transport) over `reqwest`, with optional
//! per-host request rate limiting, envelope decoding, domain error
//! detection, and transport failure classification.

mod client;
mod connection;
mod protocol;

pub use client::HttpTransport;
pub(crate) use connection::parse_host;
