//! # Runtime
//!
//! Adapter process runtime: initialization and the HTTP server.

pub mod initialization;
pub mod server;
