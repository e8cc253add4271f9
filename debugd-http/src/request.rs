use debugd_core::DebugdError;

/// Largest request head accepted before answering 400.
pub const MAX_HEAD_BYTES: usize = 64 * 1024;

/// Largest request body drained to keep a connection alive. Bigger bodies
/// are answered and the connection is closed without reading them.
pub const MAX_DRAIN_BODY_BYTES: usize = 1024 * 1024;

/// Header count accepted per request; more is answered with 400.
pub const MAX_HEADERS: usize = 128;

/// Owned request line and headers, copied out of the read buffer so the
/// buffer can keep filling while the request is served.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestHead {
    pub method: String,
    /// Raw request target, query string included.
    pub path: String,
    /// Minor HTTP version: 0 for HTTP/1.0, 1 for HTTP/1.1.
    pub version: u8,
    /// Header names exactly as received.
    pub headers: Vec<(String, String)>,
    /// Bytes taken by the request line and headers, terminator included.
    pub head_len: usize,
}

impl RequestHead {
    /// Borrowed `(name, value)` view used by the request handler.
    pub fn header_refs(&self) -> Vec<(&str, &str)> {
        self.headers
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Declared body length, 0 when absent or unparsable.
    pub fn content_length(&self) -> usize {
        self.header("content-length")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0)
    }

    pub fn is_chunked(&self) -> bool {
        self.header("transfer-encoding")
            .is_some_and(|v| v.to_ascii_lowercase().contains("chunked"))
    }

    pub fn expects_continue(&self) -> bool {
        self.header("expect")
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("100-continue"))
    }

    /// HTTP/1.1 defaults to keep-alive, HTTP/1.0 to close; an explicit
    /// `Connection` header wins either way.
    pub fn wants_keep_alive(&self) -> bool {
        match self.header("connection") {
            Some(v) if v.eq_ignore_ascii_case("close") => false,
            Some(v) if v.eq_ignore_ascii_case("keep-alive") => true,
            _ => self.version >= 1,
        }
    }
}

/// Parse a request head from the start of `buf`.
///
/// `Ok(None)` means more bytes are needed.
pub fn parse_head(buf: &[u8]) -> Result<Option<RequestHead>, DebugdError> {
    let mut headers_raw = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut req = httparse::Request::new(&mut headers_raw);

    match req.parse(buf) {
        Ok(httparse::Status::Complete(head_len)) => {
            let headers = req
                .headers
                .iter()
                .take_while(|h| !h.name.is_empty())
                .map(|h| {
                    (
                        h.name.to_string(),
                        String::from_utf8_lossy(h.value).into_owned(),
                    )
                })
                .collect();
            Ok(Some(RequestHead {
                method: req.method.unwrap_or("GET").to_string(),
                path: req.path.unwrap_or("/").to_string(),
                version: req.version.unwrap_or(1),
                headers,
                head_len,
            }))
        }
        Ok(httparse::Status::Partial) => {
            if buf.len() >= MAX_HEAD_BYTES {
                Err(DebugdError::HeaderTooLarge)
            } else {
                Ok(None)
            }
        }
        Err(e) => Err(DebugdError::BadRequest(e.to_string())),
    }
}
