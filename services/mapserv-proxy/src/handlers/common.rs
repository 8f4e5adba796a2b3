//! Common utilities shared across handlers.

use axum::{
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};

pub const CORS_ALLOW_METHODS: &str = "GET, OPTIONS";
pub const CORS_ALLOW_HEADERS: &str = "Authorization,Content-Type,Accept,Origin,User-Agent,DNT,Cache-Control,X-Mx-ReqToken,Keep-Alive,X-Requested-With,If-Modified-Since";
/// Pre-flight results stay valid for 20 days.
pub const CORS_MAX_AGE: &str = "1728000";

/// Set the CORS headers on a response, echoing the request's `Origin`.
///
/// Requests without an `Origin` get an empty allow-origin value.
pub fn add_cors_headers(headers: &mut HeaderMap, origin: Option<&HeaderValue>) {
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        origin.cloned().unwrap_or_else(|| HeaderValue::from_static("")),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(CORS_ALLOW_METHODS),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(CORS_ALLOW_HEADERS),
    );
    headers.insert(
        header::ACCESS_CONTROL_MAX_AGE,
        HeaderValue::from_static(CORS_MAX_AGE),
    );
}

/// Plain-text `400` for requests whose parameters cannot be decoded.
pub fn bad_request() -> Response {
    (StatusCode::BAD_REQUEST, "400").into_response()
}

/// `301` from a map prefix without its trailing slash to the slash form.
pub fn slash_redirect(url_path: &str, query: Option<&str>) -> Response {
    let location = match query {
        Some(q) => format!("{}?{}", url_path, q),
        None => url_path.to_string(),
    };

    match HeaderValue::from_str(&location) {
        Ok(value) => (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, value)]).into_response(),
        Err(_) => StatusCode::BAD_REQUEST.into_response(),
    }
}
