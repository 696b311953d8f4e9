//! # Runtime
//!
//! Process-level wiring around the reconciler.
//!
//! - `initialization`: rustls, tracing, metrics, HTTP server and client setup
//! - `watch_loop`: One `kube_runtime` controller per request kind
//! - `error_policy`: Requeue decisions for failed passes

pub mod error_policy;
pub mod initialization;
pub mod watch_loop;
