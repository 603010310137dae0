//! # Tourney Server
//!
//! HTTP and WebSocket surface of the tournament service, plus the process
//! wiring around the `tourney` library: configuration, logging, metrics.

pub mod api;
pub mod config;
pub mod logging;
pub mod metrics;
