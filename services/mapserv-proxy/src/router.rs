//! Router construction.
//!
//! Each map is mounted at its URL prefix and everything below it. A map
//! served at `/` becomes the fallback, so it only sees paths no other map or
//! service endpoint claims.

use axum::{
    extract::{ConnectInfo, Extension, Request},
    routing::{any, get},
    Router,
};
use map_common::MapDefinition;
use metrics_exporter_prometheus::PrometheusHandle;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::handlers::{health_handler, map_handler, metrics_handler, slash_redirect};
use crate::state::AppState;

pub const HEALTH_PATH: &str = "/_health";
pub const METRICS_PATH: &str = "/_metrics";

/// Build the application router.
///
/// The metrics endpoint is only mounted when a Prometheus handle is given.
pub fn build_router(state: Arc<AppState>, prometheus: Option<PrometheusHandle>) -> Router {
    let mut app = Router::new().route(HEALTH_PATH, get(health_handler));

    if let Some(handle) = prometheus {
        app = app.route(
            METRICS_PATH,
            get(metrics_handler).layer(Extension(handle)),
        );
    }

    for map in &state.config.maps {
        app = mount_map(app, map.clone());
    }

    app.layer(Extension(state)).layer(TraceLayer::new_for_http())
}

fn mount_map(app: Router, map: Arc<MapDefinition>) -> Router {
    let path = map.url_path().to_string();
    info!(map = %map.name(), path = %path, "Mounting map");

    let handler = {
        let map = map.clone();
        move |Extension(state): Extension<Arc<AppState>>,
              connect: Option<ConnectInfo<SocketAddr>>,
              request: Request| {
            let map = map.clone();
            async move { map_handler(state, map, connect.map(|c| c.0), request).await }
        }
    };

    if path == "/" {
        return app.fallback(handler);
    }

    let bare = path.trim_end_matches('/').to_string();
    let redirect_target = path.clone();

    app.route(&path, any(handler.clone()))
        .route(&format!("{}*rest", path), any(handler))
        .route(
            &bare,
            any(move |request: Request| {
                let target = redirect_target.clone();
                async move { slash_redirect(&target, request.uri().query()) }
            }),
        )
}
