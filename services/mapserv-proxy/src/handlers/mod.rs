//! HTTP request handlers.
//!
//! - `map`: the per-map dispatcher forwarding requests to the renderer
//! - `metrics`: health check and Prometheus metrics
//! - `common`: CORS headers and shared responses

pub mod common;
pub mod map;
pub mod metrics;

pub use common::{add_cors_headers, bad_request, slash_redirect};
pub use map::{decode_params, map_handler};
pub use metrics::{health_handler, metrics_handler};
