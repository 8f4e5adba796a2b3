//! Common Log Format access records.

use axum::http::request::Parts;
use chrono::{DateTime, TimeZone};
use std::fmt;
use std::net::SocketAddr;
use tracing::info;

/// Timestamp layout of the Common Log Format.
const CLF_TIME_FORMAT: &str = "%d/%b/%Y:%H:%M:%S %z";

/// The parts of a request an access record needs, captured up front so the
/// request itself can be handed on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    pub remote_addr: String,
    pub method: String,
    pub uri: String,
    pub protocol: String,
}

impl RequestLine {
    pub fn from_parts(parts: &Parts, remote_addr: Option<SocketAddr>) -> Self {
        Self {
            remote_addr: remote_addr
                .map(|a| a.to_string())
                .unwrap_or_else(|| "-".to_string()),
            method: parts.method.to_string(),
            uri: parts
                .uri
                .path_and_query()
                .map(|pq| pq.as_str().to_string())
                .unwrap_or_else(|| parts.uri.path().to_string()),
            protocol: format!("{:?}", parts.version),
        }
    }
}

/// Format one access record:
/// `host - - [02/Jan/2006:15:04:05 -0700] "GET /uri HTTP/1.1" 200 1234`.
pub fn format_access_log<Tz>(request: &RequestLine, ts: &DateTime<Tz>, status: u16, size: u64) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    format!(
        "{} - {} [{}] \"{} {} {}\" {} {}",
        client_host(&request.remote_addr),
        "-",
        ts.format(CLF_TIME_FORMAT),
        request.method,
        request.uri,
        request.protocol,
        status,
        size,
    )
}

/// Emit an access record for a finished request.
pub fn log_access(request: &RequestLine, status: u16, size: u64) {
    let line = format_access_log(request, &chrono::Local::now(), status, size);
    info!(target: "access", "{}", line);
}

/// Host part of a remote address, or the address itself if it has no port.
fn client_host(remote: &str) -> String {
    if let Ok(addr) = remote.parse::<SocketAddr>() {
        return addr.ip().to_string();
    }
    match remote.rsplit_once(':') {
        Some((host, _)) if !host.is_empty() && !host.contains(':') => host.to_string(),
        _ => remote.to_string(),
    }
}
