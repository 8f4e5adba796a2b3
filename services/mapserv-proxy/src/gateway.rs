//! Process gateway: runs the renderer for a request and turns its output
//! into an HTTP response.
//!
//! The dispatcher only builds an [`InvocationContract`]; everything about
//! how the renderer is actually run lives behind [`ProcessGateway`]. The
//! shipped implementation is [`CgiGateway`], which speaks CGI/1.1 to a
//! local executable.

use async_trait::async_trait;
use axum::{
    body::{Body, HttpBody},
    http::{
        header::{self, HeaderMap, HeaderName, HeaderValue},
        request::Parts,
        StatusCode,
    },
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures::StreamExt;
use std::collections::BTreeMap;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, error, warn};

/// Fallback `PATH` for the renderer when the proxy has none.
const DEFAULT_PATH: &str = "/bin:/usr/bin:/usr/ucb:/usr/bsd:/usr/local/bin";

/// Everything the gateway needs to know about which renderer to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationContract {
    pub executable: PathBuf,
    pub working_dir: PathBuf,
    /// Extra environment, applied over the gateway's own CGI variables
    pub env: Vec<(String, String)>,
}

impl InvocationContract {
    /// Contract whose only custom variable is `QUERY_STRING`.
    pub fn new(
        executable: impl Into<PathBuf>,
        working_dir: impl Into<PathBuf>,
        query_string: String,
    ) -> Self {
        Self {
            executable: executable.into(),
            working_dir: working_dir.into(),
            env: vec![("QUERY_STRING".to_string(), query_string)],
        }
    }

    pub fn query_string(&self) -> Option<&str> {
        self.env
            .iter()
            .find(|(k, _)| k == "QUERY_STRING")
            .map(|(_, v)| v.as_str())
    }
}

/// The inbound request as seen by the gateway.
#[derive(Debug)]
pub struct GatewayRequest {
    pub parts: Parts,
    /// Body still to be forwarded; empty once a form body was consumed
    pub body: Body,
    pub remote_addr: Option<SocketAddr>,
    /// URL prefix of the map, without its trailing slash
    pub script_name: String,
}

/// Runs a renderer and produces the response for the client.
///
/// Implementations always answer; their own failures become error responses.
#[async_trait]
pub trait ProcessGateway: Send + Sync {
    async fn invoke(&self, contract: &InvocationContract, request: GatewayRequest) -> Response;
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("failed to start {path}: {source}")]
    Spawn {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("renderer I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("renderer output ended inside the header block")]
    IncompleteHeaders,

    #[error("invalid Status header: {0}")]
    InvalidStatus(String),

    #[error("missing required Content-Type in renderer output")]
    MissingContentType,

    #[error("renderer exited with {status}: {cause}")]
    Exit {
        status: ExitStatus,
        #[source]
        cause: Box<GatewayError>,
    },
}

/// CGI/1.1 gateway spawning the renderer as a child process.
///
/// No timeout is applied; the request waits for the renderer to exit.
#[derive(Debug, Clone)]
pub struct CgiGateway {
    server_software: String,
}

impl CgiGateway {
    pub fn new() -> Self {
        Self {
            server_software: format!("mapserv-proxy/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    async fn run(
        &self,
        contract: &InvocationContract,
        request: GatewayRequest,
    ) -> Result<Response, GatewayError> {
        let env = self.build_env(contract, &request);

        let mut child = Command::new(&contract.executable)
            .current_dir(&contract.working_dir)
            .env_clear()
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| GatewayError::Spawn {
                path: contract.executable.display().to_string(),
                source,
            })?;

        // Feed stdin concurrently so a renderer that writes before reading
        // cannot deadlock against us.
        let body = request.body;
        let writer = child.stdin.take().map(|mut stdin| {
            tokio::spawn(async move {
                let mut chunks = body.into_data_stream();
                while let Some(chunk) = chunks.next().await {
                    let chunk = chunk.map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
                    stdin.write_all(&chunk).await?;
                }
                stdin.shutdown().await
            })
        });

        let output = child.wait_with_output().await?;

        if let Some(writer) = writer {
            if let Ok(Err(e)) = writer.await {
                debug!(error = %e, "Renderer did not consume the full request body");
            }
        }

        for line in String::from_utf8_lossy(&output.stderr).lines() {
            if !line.trim().is_empty() {
                warn!(executable = ?contract.executable, "{}", line);
            }
        }

        match parse_cgi_output(&output.stdout) {
            Ok(response) => {
                if !output.status.success() {
                    warn!(status = %output.status, "Renderer exited unsuccessfully");
                }
                Ok(response)
            }
            Err(cause) if !output.status.success() => Err(GatewayError::Exit {
                status: output.status,
                cause: Box::new(cause),
            }),
            Err(e) => Err(e),
        }
    }

    /// CGI meta-variables for a request, with the contract's entries last.
    pub fn build_env(
        &self,
        contract: &InvocationContract,
        request: &GatewayRequest,
    ) -> BTreeMap<String, String> {
        let parts = &request.parts;
        let mut env = BTreeMap::new();

        env.insert(
            "PATH".to_string(),
            std::env::var("PATH").unwrap_or_else(|_| DEFAULT_PATH.to_string()),
        );
        env.insert("GATEWAY_INTERFACE".to_string(), "CGI/1.1".to_string());
        env.insert("SERVER_SOFTWARE".to_string(), self.server_software.clone());
        env.insert("SERVER_PROTOCOL".to_string(), format!("{:?}", parts.version));
        env.insert("REQUEST_METHOD".to_string(), parts.method.to_string());
        env.insert(
            "QUERY_STRING".to_string(),
            parts.uri.query().unwrap_or("").to_string(),
        );
        env.insert(
            "REQUEST_URI".to_string(),
            parts
                .uri
                .path_and_query()
                .map(|pq| pq.as_str().to_string())
                .unwrap_or_else(|| parts.uri.path().to_string()),
        );
        env.insert("SCRIPT_NAME".to_string(), request.script_name.clone());
        env.insert(
            "SCRIPT_FILENAME".to_string(),
            contract.executable.display().to_string(),
        );
        env.insert(
            "PATH_INFO".to_string(),
            path_info(parts.uri.path(), &request.script_name),
        );

        let (server_name, server_port) = split_host(
            parts
                .headers
                .get(header::HOST)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("localhost"),
        );
        env.insert("SERVER_NAME".to_string(), server_name);
        env.insert("SERVER_PORT".to_string(), server_port);

        if let Some(addr) = request.remote_addr {
            env.insert("REMOTE_ADDR".to_string(), addr.ip().to_string());
            env.insert("REMOTE_HOST".to_string(), addr.ip().to_string());
            env.insert("REMOTE_PORT".to_string(), addr.port().to_string());
        }

        let content_length = request.body.size_hint().exact().or_else(|| {
            parts
                .headers
                .get(header::CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
        });
        if let Some(len) = content_length.filter(|len| *len > 0) {
            env.insert("CONTENT_LENGTH".to_string(), len.to_string());
        }
        if let Some(ct) = parts
            .headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
        {
            env.insert("CONTENT_TYPE".to_string(), ct.to_string());
        }

        for name in parts.headers.keys() {
            // httpoxy: never let a client set HTTP_PROXY for the child
            if name.as_str().eq_ignore_ascii_case("proxy") {
                continue;
            }
            let separator = if *name == header::COOKIE { "; " } else { ", " };
            let joined = parts
                .headers
                .get_all(name)
                .iter()
                .filter_map(|v| v.to_str().ok())
                .collect::<Vec<_>>()
                .join(separator);
            let key = format!("HTTP_{}", name.as_str().to_uppercase().replace('-', "_"));
            env.insert(key, joined);
        }

        for (key, value) in &contract.env {
            env.insert(key.clone(), value.clone());
        }

        env
    }
}

impl Default for CgiGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessGateway for CgiGateway {
    async fn invoke(&self, contract: &InvocationContract, request: GatewayRequest) -> Response {
        match self.run(contract, request).await {
            Ok(response) => response,
            Err(e) => {
                error!(
                    error = %e,
                    executable = ?contract.executable,
                    "CGI invocation failed"
                );
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

/// Parse CGI program output into a response.
///
/// Headers run until the first empty line. `Status` sets the code,
/// `Location` alone implies `302`, otherwise a `Content-Type` is required.
pub fn parse_cgi_output(stdout: &[u8]) -> Result<Response, GatewayError> {
    let mut rest = stdout;
    let mut headers = HeaderMap::new();
    let mut status: Option<StatusCode> = None;

    loop {
        let newline = rest
            .iter()
            .position(|b| *b == b'\n')
            .ok_or(GatewayError::IncompleteHeaders)?;
        let raw = &rest[..newline];
        rest = &rest[newline + 1..];

        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        if raw.is_empty() {
            break;
        }

        let line = String::from_utf8_lossy(raw);
        let Some((name, value)) = line.split_once(':') else {
            warn!(line = %line, "Ignoring bogus CGI header line");
            continue;
        };
        let name = name.trim();
        let value = value.trim();

        if name.eq_ignore_ascii_case("Status") {
            let code = value
                .get(..3)
                .and_then(|c| c.parse::<u16>().ok())
                .and_then(|c| StatusCode::from_u16(c).ok())
                .ok_or_else(|| GatewayError::InvalidStatus(value.to_string()))?;
            status = Some(code);
            continue;
        }

        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => warn!(header = %name, "Ignoring invalid CGI header"),
        }
    }

    let status = match status {
        Some(status) => status,
        None if headers.contains_key(header::LOCATION) => StatusCode::FOUND,
        None if !headers.contains_key(header::CONTENT_TYPE) => {
            return Err(GatewayError::MissingContentType)
        }
        None => StatusCode::OK,
    };

    let mut response = Response::new(Body::from(Bytes::copy_from_slice(rest)));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}

/// Path below the map prefix, always starting with `/` when non-empty.
fn path_info(path: &str, script_name: &str) -> String {
    match path.strip_prefix(script_name) {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest.to_string(),
        _ => path.to_string(),
    }
}

fn split_host(host: &str) -> (String, String) {
    if let Some(stripped) = host.strip_prefix('[') {
        if let Some((ip, port)) = stripped.split_once(']') {
            let port = port.strip_prefix(':').unwrap_or("80");
            return (ip.to_string(), if port.is_empty() { "80" } else { port }.to_string());
        }
    }
    match host.rsplit_once(':') {
        Some((name, port)) if !name.contains(':') => (name.to_string(), port.to_string()),
        _ => (host.to_string(), "80".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{Method, Request};

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn gateway_request(method: Method, uri: &str, body: &str) -> GatewayRequest {
        let (parts, _) = Request::builder()
            .method(method)
            .uri(uri)
            .header("Host", "maps.example.com:8080")
            .header("X-Test", "yes")
            .header("Proxy", "http://evil")
            .header("Cookie", "session=abc")
            .header("Cookie", "theme=dark")
            .header("Accept", "image/png")
            .header("Accept", "image/jpeg")
            .body(())
            .unwrap()
            .into_parts();
        GatewayRequest {
            parts,
            body: Body::from(body.to_string()),
            remote_addr: Some("10.1.2.3:45678".parse().unwrap()),
            script_name: "/world".to_string(),
        }
    }

    #[test]
    fn test_parse_output_defaults_to_ok() {
        let response = parse_cgi_output(b"Content-Type: image/png\r\n\r\nPNG").unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    }

    #[test]
    fn test_parse_output_status_header() {
        let response =
            parse_cgi_output(b"Status: 404 Not Found\nContent-Type: text/plain\n\nmissing").unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().get("status").is_none());
    }

    #[test]
    fn test_parse_output_location_redirects() {
        let response = parse_cgi_output(b"Location: /elsewhere\n\n").unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[header::LOCATION], "/elsewhere");
    }

    #[test]
    fn test_parse_output_errors() {
        assert!(matches!(
            parse_cgi_output(b"X-Only: 1\n\nbody"),
            Err(GatewayError::MissingContentType)
        ));
        assert!(matches!(
            parse_cgi_output(b"Content-Type: text/plain\n"),
            Err(GatewayError::IncompleteHeaders)
        ));
        assert!(matches!(
            parse_cgi_output(b"Status: abc\n\n"),
            Err(GatewayError::InvalidStatus(_))
        ));
    }

    #[test]
    fn test_split_host() {
        assert_eq!(split_host("example.com:8080"), ("example.com".into(), "8080".into()));
        assert_eq!(split_host("example.com"), ("example.com".into(), "80".into()));
        assert_eq!(split_host("[::1]:9000"), ("::1".into(), "9000".into()));
        assert_eq!(split_host("[::1]"), ("::1".into(), "80".into()));
    }

    #[test]
    fn test_path_info() {
        assert_eq!(path_info("/world/", "/world"), "/");
        assert_eq!(path_info("/world/tiles/1", "/world"), "/tiles/1");
        assert_eq!(path_info("/other", "/world"), "/other");
    }

    #[test]
    fn test_build_env() {
        let gateway = CgiGateway::new();
        let contract = InvocationContract::new(
            "/usr/bin/mapserv",
            "/srv/maps",
            "MAP=world.map".to_string(),
        );
        let request = gateway_request(Method::GET, "/world/?map=evil", "");
        let env = gateway.build_env(&contract, &request);

        assert_eq!(env["QUERY_STRING"], "MAP=world.map");
        assert_eq!(env["REQUEST_METHOD"], "GET");
        assert_eq!(env["REQUEST_URI"], "/world/?map=evil");
        assert_eq!(env["SCRIPT_NAME"], "/world");
        assert_eq!(env["PATH_INFO"], "/");
        assert_eq!(env["SERVER_NAME"], "maps.example.com");
        assert_eq!(env["SERVER_PORT"], "8080");
        assert_eq!(env["REMOTE_ADDR"], "10.1.2.3");
        assert_eq!(env["REMOTE_PORT"], "45678");
        assert_eq!(env["HTTP_X_TEST"], "yes");
        assert!(!env.contains_key("HTTP_PROXY"));
        assert!(!env.contains_key("CONTENT_LENGTH"));
    }

    #[test]
    fn test_build_env_joins_repeated_headers() {
        let gateway = CgiGateway::new();
        let contract = InvocationContract::new("/usr/bin/mapserv", "/srv/maps", String::new());
        let request = gateway_request(Method::GET, "/world/", "");
        let env = gateway.build_env(&contract, &request);

        assert_eq!(env["HTTP_COOKIE"], "session=abc; theme=dark");
        assert_eq!(env["HTTP_ACCEPT"], "image/png, image/jpeg");
    }

    #[test]
    fn test_build_env_content_length() {
        let gateway = CgiGateway::new();
        let contract = InvocationContract::new("/usr/bin/mapserv", "/srv/maps", String::new());
        let request = gateway_request(Method::POST, "/world/", "<GetFeature/>");
        let env = gateway.build_env(&contract, &request);

        assert_eq!(env["CONTENT_LENGTH"], "13");
    }

    #[cfg(unix)]
    mod process {
        use super::*;

        /// `/bin/sh` with no arguments runs the script it reads on stdin,
        /// which here is the request body.
        fn sh_contract(dir: &std::path::Path) -> InvocationContract {
            InvocationContract::new("/bin/sh", dir, "MAP=world_3857.map&SRS=EPSG%3A3857".to_string())
        }

        #[tokio::test]
        async fn test_runs_renderer_with_query_string() {
            let dir = tempfile::tempdir().unwrap();
            let script = r#"printf 'Content-Type: text/plain\r\n\r\n%s|%s|%s' "$QUERY_STRING" "$REQUEST_METHOD" "$HTTP_X_TEST""#;
            let request = gateway_request(Method::POST, "/world/", script);

            let response = CgiGateway::new().invoke(&sh_contract(dir.path()), request).await;

            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(
                body_string(response).await,
                "MAP=world_3857.map&SRS=EPSG%3A3857|POST|yes"
            );
        }

        #[tokio::test]
        async fn test_runs_in_working_directory() {
            let dir = tempfile::tempdir().unwrap();
            std::fs::write(dir.path().join("world.map"), "MAP END").unwrap();
            let script = "printf 'Content-Type: text/plain\\n\\n'; cat world.map";
            let request = gateway_request(Method::POST, "/world/", script);

            let response = CgiGateway::new().invoke(&sh_contract(dir.path()), request).await;

            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(body_string(response).await, "MAP END");
        }

        #[tokio::test]
        async fn test_status_from_renderer() {
            let dir = tempfile::tempdir().unwrap();
            let script = "printf 'Status: 503 Busy\\nContent-Type: text/plain\\n\\nbusy'";
            let request = gateway_request(Method::POST, "/world/", script);

            let response = CgiGateway::new().invoke(&sh_contract(dir.path()), request).await;

            assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
            assert_eq!(body_string(response).await, "busy");
        }

        #[tokio::test]
        async fn test_failed_renderer_is_server_error() {
            let dir = tempfile::tempdir().unwrap();
            let request = gateway_request(Method::POST, "/world/", "echo broken >&2; exit 3");

            let response = CgiGateway::new().invoke(&sh_contract(dir.path()), request).await;

            assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        }

        #[tokio::test]
        async fn test_missing_executable_is_server_error() {
            let dir = tempfile::tempdir().unwrap();
            let contract = InvocationContract::new(
                dir.path().join("no-such-mapserv"),
                dir.path(),
                String::new(),
            );
            let request = gateway_request(Method::GET, "/world/", "");

            let response = CgiGateway::new().invoke(&contract, request).await;

            assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        }
    }
}
