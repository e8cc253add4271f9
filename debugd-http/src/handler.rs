use debugd_core::DebugdError;
use debugd_core::snapshot::{DebugSnapshot, RequestDetail, timestamp_now};
use debugd_observability::{AccessLogEntry, AccessLogStore};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;

// ── Pre-built static error response (zero heap alloc) ─────────

pub const RESP_400: &[u8] =
    b"HTTP/1.1 400 Bad Request\r\ncontent-type: application/json\r\ncontent-length: 36\r\nconnection: close\r\n\r\n{\"error\":\"Bad Request\",\"status\":400}";

const CONTENT_TYPE_TEXT: &str = "text/plain";
const CONTENT_TYPE_JSON: &str = "application/json";

// ── DebugService ──────────────────────────────────────────────

/// Request dispatcher. One instance is shared by every worker thread.
///
/// The access log is injected so tests can hand in their own store.
pub struct DebugService {
    access_log: Arc<dyn AccessLogStore>,
}

impl DebugService {
    pub fn new(access_log: Arc<dyn AccessLogStore>) -> Self {
        Self { access_log }
    }

    /// Record the request, then answer it.
    ///
    /// Only GET is served: `/ping` for liveness, `/logs` for the access ring,
    /// anything else for a debug snapshot. Every other method gets 405 but is
    /// still recorded.
    pub fn handle_request(
        &self,
        method: &str,
        path: &str,
        headers: &[(&str, &str)],
        peer: SocketAddr,
    ) -> RequestResult {
        self.access_log.append(AccessLogEntry::from_request(
            timestamp_now(),
            method,
            path,
            peer,
            headers,
        ));

        if method != "GET" {
            return method_not_allowed(method);
        }

        match path {
            "/ping" => RequestResult {
                status: 200,
                headers: vec![content_type(CONTENT_TYPE_TEXT)],
                body: b"pong".to_vec(),
            },
            "/logs" => {
                // Copy under the lock, encode outside it.
                let entries = self.access_log.snapshot();
                json_response(&entries)
            }
            _ => json_response(&DebugSnapshot::capture(RequestDetail::new(
                path, peer, headers,
            ))),
        }
    }
}

// ── Request result ────────────────────────────────────────────

/// A generated response, written to the socket by the connection loop.
#[derive(Debug, PartialEq)]
pub struct RequestResult {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RequestResult {
    pub fn status(&self) -> u16 {
        self.status
    }
}

fn content_type(value: &str) -> (String, String) {
    ("content-type".to_string(), value.to_string())
}

fn method_not_allowed(method: &str) -> RequestResult {
    let err = DebugdError::MethodNotAllowed(method.to_string());
    RequestResult {
        status: err.status_code(),
        headers: vec![
            content_type(CONTENT_TYPE_JSON),
            ("allow".to_string(), "GET".to_string()),
        ],
        body: err.to_json_body(),
    }
}

/// Pretty-printed UTF-8 JSON; non-ASCII is written as-is.
fn json_response<T: Serialize>(value: &T) -> RequestResult {
    match serde_json::to_vec_pretty(value) {
        Ok(body) => RequestResult {
            status: 200,
            headers: vec![content_type(CONTENT_TYPE_JSON)],
            body,
        },
        Err(e) => {
            let err = DebugdError::from(e);
            tracing::error!(error = %err, "Response encoding failed");
            RequestResult {
                status: err.status_code(),
                headers: vec![content_type(CONTENT_TYPE_JSON)],
                body: err.to_json_body(),
            }
        }
    }
}

// ── Response building helpers ─────────────────────────────────

/// Build HTTP response into a buffer (no format! overhead).
pub fn build_response(
    buf: &mut Vec<u8>,
    status: u16,
    headers: &[(String, String)],
    body: &[u8],
    keep_alive: bool,
) {
    build_response_head(buf, status, headers, body.len(), keep_alive);
    buf.extend_from_slice(body);
}

/// Status line and headers only. Used for HEAD, where `content-length`
/// still announces the body that a GET would have carried.
pub fn build_response_head(
    buf: &mut Vec<u8>,
    status: u16,
    headers: &[(String, String)],
    content_length: usize,
    keep_alive: bool,
) {
    buf.clear();
    buf.extend_from_slice(b"HTTP/1.1 ");
    let mut itoa_buf = itoa::Buffer::new();
    buf.extend_from_slice(itoa_buf.format(status).as_bytes());
    buf.push(b' ');
    buf.extend_from_slice(status_text(status).as_bytes());
    buf.extend_from_slice(b"\r\ncontent-length: ");
    buf.extend_from_slice(itoa_buf.format(content_length).as_bytes());
    if keep_alive {
        buf.extend_from_slice(b"\r\nconnection: keep-alive\r\n");
    } else {
        buf.extend_from_slice(b"\r\nconnection: close\r\n");
    }
    for (k, v) in headers {
        buf.extend_from_slice(k.as_bytes());
        buf.extend_from_slice(b": ");
        buf.extend_from_slice(v.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }
    buf.extend_from_slice(b"\r\n");
}

pub fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}
