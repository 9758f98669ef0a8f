//! Genie Gateway
//!
//! HTTP service that lets end users chat with the Genie completion service
//! under their own identity, with per-user token caching handled by
//! `genie-client`.

pub mod config;
pub mod error;
pub mod server;

pub use config::GatewayConfig;
pub use error::{GatewayError, Result};
pub use server::{AppState, router};
