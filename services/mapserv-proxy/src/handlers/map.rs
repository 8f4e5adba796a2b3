//! Per-map request dispatcher.
//!
//! Every request under a map's URL prefix goes through here:
//! pre-flight requests are answered directly, everything else has its
//! parameters decoded and normalized, `MAP` pinned to the mapfile picked
//! from `SRS`, and is then handed to the process gateway. Each request
//! produces exactly one access record, whichever way it ends.

use axum::{
    body::{Body, HttpBody},
    extract::Request,
    http::{header, request::Parts, Method, StatusCode},
    response::{IntoResponse, Response},
};
use map_common::{encode_query, normalize, parse_query, MapDefinition, MapError, MapResult};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, instrument, warn};

use super::common::{add_cors_headers, bad_request};
use crate::access_log::{log_access, RequestLine};
use crate::gateway::GatewayRequest;
use crate::state::AppState;

/// Upper bound on urlencoded form bodies parsed by the proxy. Other bodies
/// are streamed to the renderer untouched.
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

#[instrument(skip_all, fields(map = %map.name()))]
pub async fn map_handler(
    state: Arc<AppState>,
    map: Arc<MapDefinition>,
    remote_addr: Option<SocketAddr>,
    request: Request,
) -> Response {
    let started = Instant::now();
    let (parts, body) = request.into_parts();
    let request_line = RequestLine::from_parts(&parts, remote_addr);
    let origin = parts.headers.get(header::ORIGIN).cloned();

    if parts.method == Method::OPTIONS {
        let mut response = StatusCode::NO_CONTENT.into_response();
        add_cors_headers(response.headers_mut(), origin.as_ref());
        return finish(&map, &request_line, started, "preflight", response);
    }

    let (pairs, forwarded) = match decode_params(&parts, body).await {
        Ok(decoded) => decoded,
        Err(e) => {
            warn!(error = %e, uri = %parts.uri, "Rejecting malformed request");
            let mut response = bad_request();
            add_cors_headers(response.headers_mut(), origin.as_ref());
            return finish(&map, &request_line, started, "malformed", response);
        }
    };

    let params = normalize(pairs, &map);
    debug!(
        mapfile = params.get("MAP").map(String::as_str).unwrap_or_default(),
        request = params.get("REQUEST").map(String::as_str).unwrap_or_default(),
        "Dispatching to renderer"
    );

    let contract = state.contract(encode_query(&params));
    let gateway_request = GatewayRequest {
        parts,
        body: forwarded,
        remote_addr,
        script_name: map.url_path().trim_end_matches('/').to_string(),
    };

    let mut response = state.gateway.invoke(&contract, gateway_request).await;
    add_cors_headers(response.headers_mut(), origin.as_ref());
    finish(&map, &request_line, started, "dispatched", response)
}

/// Decode query parameters, plus form body parameters when the request
/// carries a urlencoded body.
///
/// Body pairs come first so they win when keys collapse. Returns the body
/// still to be forwarded, which is empty once it has been read as a form.
/// Only form bodies are read here; anything else is passed on unread.
pub async fn decode_params(parts: &Parts, body: Body) -> MapResult<(Vec<(String, String)>, Body)> {
    let mut pairs = Vec::new();
    let forwarded = if is_form_body(parts) {
        let bytes = axum::body::to_bytes(body, MAX_BODY_BYTES)
            .await
            .map_err(|e| MapError::MalformedBody(e.to_string()))?;
        pairs.extend(parse_query(&String::from_utf8_lossy(&bytes))?);
        Body::empty()
    } else {
        body
    };

    pairs.extend(parse_query(parts.uri.query().unwrap_or(""))?);
    Ok((pairs, forwarded))
}

fn is_form_body(parts: &Parts) -> bool {
    let method = &parts.method;
    if *method != Method::POST && *method != Method::PUT && *method != Method::PATCH {
        return false;
    }

    parts
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|ct| ct.split(';').next())
        .map(|mime| mime.trim().eq_ignore_ascii_case(FORM_CONTENT_TYPE))
        .unwrap_or(false)
}

fn finish(
    map: &MapDefinition,
    request_line: &RequestLine,
    started: Instant,
    outcome: &'static str,
    response: Response,
) -> Response {
    let status = response.status().as_u16();
    let size = response.body().size_hint().exact().unwrap_or(0);
    log_access(request_line, status, size);

    metrics::counter!(
        "mapserv_requests_total",
        "map" => map.name().to_string(),
        "outcome" => outcome
    )
    .increment(1);
    metrics::histogram!(
        "mapserv_request_duration_seconds",
        "map" => map.name().to_string()
    )
    .record(started.elapsed().as_secs_f64());

    response
}
