//! # Controller
//!
//! Core controller modules for the Credential Request Controller.
//!
//! - `backoff`: Fibonacci backoff mechanism for retries
//! - `queue`: Per-key retry budget and requeue decisions
//! - `reconciler`: Core reconciliation logic
//! - `server`: HTTP server for metrics and health checks

pub mod backoff;
pub mod queue;
pub mod reconciler;
pub mod server;
