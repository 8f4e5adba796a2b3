//! Mapserv proxy service library.
//!
//! HTTP front-end that resolves each request to a mapfile, normalizes its
//! parameters and runs the renderer through a process gateway.

pub mod access_log;
pub mod config;
pub mod gateway;
pub mod handlers;
pub mod router;
pub mod state;

pub use config::ProxyConfig;
pub use gateway::{CgiGateway, GatewayRequest, InvocationContract, ProcessGateway};
pub use router::build_router;
pub use state::AppState;
