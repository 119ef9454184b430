//! `POST /predict` over HTTP.
//!
//! A fixed pool of worker threads pulls requests from one shared listener.
//! Each request is handled to completion by one worker; the only shared state
//! is the read-only [`SingleShot`] handle.

use std::io::{Cursor, Read};
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde::Serialize;
use tiny_http::{Header, Method, Request, Response, StatusCode};
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::endpoint::{PredictionResponse, SingleShot};
use crate::error::{Error, Result};
use crate::pipeline::StopHandle;

pub const PREDICT_PATH: &str = "/predict";

const IMAGE_FIELD: &str = "image";
const POLL_INTERVAL: Duration = Duration::from_millis(200);
const DISCARD_LIMIT: u64 = 1024 * 1024;

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

/// Response produced for one request, before it is written to the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: u16,
    /// JSON body; empty for preflight responses.
    pub body: String,
    pub allow: Option<&'static str>,
}

impl Reply {
    fn json<T: Serialize>(status: u16, value: &T) -> Self {
        let body = serde_json::to_string(value)
            .unwrap_or_else(|_| r#"{"error":"serialization failed"}"#.to_string());
        Self {
            status,
            body,
            allow: None,
        }
    }

    fn error(status: u16, message: &str) -> Self {
        Self::json(status, &ErrorBody { error: message })
    }

    fn preflight() -> Self {
        Self {
            status: 204,
            body: String::new(),
            allow: Some("POST, OPTIONS"),
        }
    }

    fn into_response(self) -> Response<Cursor<Vec<u8>>> {
        let mut headers = vec![("Access-Control-Allow-Origin", "*")];
        if let Some(allow) = self.allow {
            headers.extend([
                ("Allow", allow),
                ("Access-Control-Allow-Methods", allow),
                ("Access-Control-Allow-Headers", "Content-Type"),
            ]);
        }
        if !self.body.is_empty() {
            headers.push(("Content-Type", "application/json"));
        }
        let headers = headers
            .into_iter()
            .filter_map(|(field, value)| Header::from_bytes(field, value).ok())
            .collect();

        let length = self.body.len();
        Response::new(
            StatusCode(self.status),
            headers,
            Cursor::new(self.body.into_bytes()),
            Some(length),
            None,
        )
    }
}

/// Route one request. Transport-free so it can be tested directly.
pub fn handle(
    shot: &SingleShot,
    method: &Method,
    url: &str,
    content_type: Option<&str>,
    body: &[u8],
) -> Reply {
    let path = url.split('?').next().unwrap_or(url);
    if path != PREDICT_PATH {
        return Reply::error(404, "not found");
    }

    match method {
        Method::Options => Reply::preflight(),
        Method::Post => predict(shot, content_type, body),
        _ => Reply {
            allow: Some("POST, OPTIONS"),
            ..Reply::error(405, "method not allowed")
        },
    }
}

fn predict(shot: &SingleShot, content_type: Option<&str>, body: &[u8]) -> Reply {
    let image = match content_type.and_then(multipart_boundary) {
        Some(boundary) => match multipart_field(body, boundary, IMAGE_FIELD) {
            Some(bytes) => bytes,
            None => return Reply::error(400, "missing image field"),
        },
        None => body,
    };
    if image.is_empty() {
        return Reply::error(400, "empty image");
    }

    match shot.infer_bytes(image) {
        Ok(inference) => Reply::json(200, &PredictionResponse::from(inference)),
        Err(e @ Error::Image(_)) => Reply::error(400, &e.to_string()),
        Err(e) => {
            error!(error = %e, "prediction failed");
            Reply::error(500, &e.to_string())
        }
    }
}

/// Boundary parameter of a `multipart/form-data` content type.
pub fn multipart_boundary(content_type: &str) -> Option<&str> {
    let mut params = content_type.split(';').map(str::trim);
    let mime = params.next()?;
    if !mime.eq_ignore_ascii_case("multipart/form-data") {
        return None;
    }
    params
        .filter_map(|p| p.split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("boundary"))
        .map(|(_, value)| value.trim().trim_matches('"'))
        .filter(|b| !b.is_empty())
}

/// Content of the named field in a multipart body.
///
/// After the first one, a delimiter only counts at the start of a line, so
/// field content may contain `--boundary` elsewhere. Lines may end in CRLF
/// or a bare LF.
pub fn multipart_field<'a>(body: &'a [u8], boundary: &str, name: &str) -> Option<&'a [u8]> {
    let dash_boundary = format!("--{boundary}");
    let delimiter = format!("\n{dash_boundary}");

    let mut cursor = if body.starts_with(dash_boundary.as_bytes()) {
        dash_boundary.len()
    } else {
        find(body, delimiter.as_bytes(), 0)? + delimiter.len()
    };

    loop {
        let rest = &body[cursor..];
        if rest.starts_with(b"--") {
            return None;
        }
        let part_start = cursor + line_break_len(rest);
        let part_end = find(body, delimiter.as_bytes(), part_start)?;
        let part = &body[part_start..part_end];

        if let Some((headers, content)) = split_part(part) {
            if field_name(&String::from_utf8_lossy(headers)).as_deref() == Some(name) {
                return Some(content.strip_suffix(b"\r").unwrap_or(content));
            }
        }
        cursor = part_end + delimiter.len();
    }
}

fn line_break_len(bytes: &[u8]) -> usize {
    if bytes.starts_with(b"\r\n") {
        2
    } else if bytes.starts_with(b"\n") {
        1
    } else {
        0
    }
}

/// Split a part at the blank line that ends its headers.
fn split_part(part: &[u8]) -> Option<(&[u8], &[u8])> {
    let crlf = find(part, b"\r\n\r\n", 0).map(|i| (i, 4));
    let lf = find(part, b"\n\n", 0).map(|i| (i, 2));
    let (at, len) = match (crlf, lf) {
        (Some(a), Some(b)) => std::cmp::min_by_key(a, b, |(i, _)| *i),
        (a, b) => a.or(b)?,
    };
    Some((&part[..at], &part[at + len..]))
}

fn field_name(headers: &str) -> Option<String> {
    headers
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("content-disposition"))
        .and_then(|(_, value)| {
            value
                .split(';')
                .filter_map(|p| p.split_once('='))
                .find(|(key, _)| key.trim() == "name")
                .map(|(_, v)| v.trim().trim_matches('"').to_string())
        })
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|i| i + from)
}

pub struct PredictServer {
    server: Arc<tiny_http::Server>,
    shot: SingleShot,
    workers: usize,
    max_body_bytes: usize,
}

impl PredictServer {
    pub fn bind(shot: SingleShot, config: &ServerConfig) -> Result<Self> {
        let server = tiny_http::Server::http(config.listen_addr.as_str())
            .map_err(|e| Error::unavailable("http listener", e))?;
        Ok(Self {
            server: Arc::new(server),
            shot,
            workers: config.workers.max(1),
            max_body_bytes: config.max_body_bytes,
        })
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.server_addr().to_ip()
    }

    /// Serve until `stop` is triggered, then wait for the workers to finish
    /// their current request.
    pub fn run(self, stop: StopHandle) {
        info!(addr = ?self.local_addr(), workers = self.workers, "serving {PREDICT_PATH}");

        let handles: Vec<_> = (0..self.workers)
            .map(|id| {
                let server = self.server.clone();
                let shot = self.shot.clone();
                let stop = stop.clone();
                let max_body_bytes = self.max_body_bytes;
                thread::Builder::new()
                    .name(format!("http-worker-{id}"))
                    .spawn(move || worker(id, &server, &shot, &stop, max_body_bytes))
            })
            .filter_map(|spawned| match spawned {
                Ok(handle) => Some(handle),
                Err(e) => {
                    error!(error = %e, "failed to spawn http worker");
                    None
                }
            })
            .collect();

        for handle in handles {
            if handle.join().is_err() {
                error!("http worker panicked");
            }
        }
        info!("server stopped");
    }
}

fn worker(
    id: usize,
    server: &tiny_http::Server,
    shot: &SingleShot,
    stop: &StopHandle,
    max_body_bytes: usize,
) {
    while !stop.is_stopped() {
        match server.recv_timeout(POLL_INTERVAL) {
            Ok(Some(request)) => respond(request, shot, max_body_bytes),
            Ok(None) => {}
            Err(e) => {
                error!(worker = id, error = %e, "listener failed");
                break;
            }
        }
    }
}

fn respond(mut request: Request, shot: &SingleShot, max_body_bytes: usize) {
    let method = request.method().clone();
    let url = request.url().to_string();
    let content_type = request
        .headers()
        .iter()
        .find(|h| h.field.equiv("Content-Type"))
        .map(|h| h.value.as_str().to_string());

    let reply = match read_body(&mut request, max_body_bytes) {
        Ok(Some(body)) => handle(shot, &method, &url, content_type.as_deref(), &body),
        Ok(None) => {
            discard_body(&mut request);
            Reply::error(413, "request body too large")
        }
        Err(e) => {
            warn!(error = %e, "failed to read request body");
            Reply::error(400, "unreadable request body")
        }
    };

    debug!(%method, url = %url, status = reply.status, "request");
    if let Err(e) = request.respond(reply.into_response()) {
        warn!(error = %e, "failed to send response");
    }
}

/// `None` when the body exceeds the limit.
fn read_body(request: &mut Request, limit: usize) -> std::io::Result<Option<Vec<u8>>> {
    if request.body_length().is_some_and(|len| len > limit) {
        return Ok(None);
    }
    let mut body = Vec::new();
    request
        .as_reader()
        .take(limit as u64 + 1)
        .read_to_end(&mut body)?;
    Ok((body.len() <= limit).then_some(body))
}

/// Read what is left of a rejected body so the client sees the response
/// instead of a reset connection.
fn discard_body(request: &mut Request) {
    let _ = std::io::copy(
        &mut request.as_reader().take(DISCARD_LIMIT),
        &mut std::io::sink(),
    );
}
