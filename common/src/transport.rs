use crate::error::TransportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: String,
}

impl Response {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// One blocking HTTP round-trip per call against a fixed base URL.
///
/// Implementations open and close a connection per request and never retry;
/// a non-2xx status is still `Ok`, callers inspect `status` themselves.
/// POST requests with a body must carry `Content-Type: application/json`.
pub trait Transport {
    fn request(
        &mut self,
        method: Method,
        path: &str,
        body: Option<&str>,
    ) -> Result<Response, TransportError>;

    fn get(&mut self, path: &str) -> Result<Response, TransportError> {
        self.request(Method::Get, path, None)
    }

    fn post_json(&mut self, path: &str, body: &str) -> Result<Response, TransportError> {
        self.request(Method::Post, path, Some(body))
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn request(
        &mut self,
        method: Method,
        path: &str,
        body: Option<&str>,
    ) -> Result<Response, TransportError> {
        (**self).request(method, path, body)
    }
}

pub fn join_url(base_url: &str, path: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        return base.to_string();
    }
    format!("{base}/{path}")
}

/// Percent-encodes a query value (RFC 3986 unreserved characters pass through).
pub fn encode_query_value(value: &str) -> String {
    let mut encoded = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(byte as char)
            }
            other => {
                use core::fmt::Write as _;
                let _ = write!(&mut encoded, "%{other:02X}");
            }
        }
    }
    encoded
}
