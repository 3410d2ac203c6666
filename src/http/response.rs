//! Minimal HTTP/1.1 response serializer used by the connection driver.
//!
//! Responses built here either carry a handler's reply to a completed
//! request or report a terminal [`Request`](super::Request) error back to
//! the client via [`Response::from_status`].

use bytes::{BufMut, BytesMut};

use super::{Headers, StatusCode};

/// An HTTP/1.1 response, ready to be serialized and sent.
///
/// # Examples
///
/// ```
/// use rttp_ingest::http::{Response, StatusCode};
///
/// let bytes = Response::from_status(StatusCode::LengthRequired).into_bytes();
/// let text = std::str::from_utf8(&bytes).unwrap();
/// assert!(text.starts_with("HTTP/1.1 411 Length Required\r\n"));
/// assert!(text.contains("Connection: close\r\n"));
/// ```
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: Headers,
    body: Vec<u8>,
    keep_alive: bool,
}

impl Response {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Vec::new(),
            keep_alive: true,
        }
    }

    /// An error reply for a rejected request: reason phrase as the body and
    /// `Connection: close`, since the rest of the stream cannot be trusted.
    pub fn from_status(status: StatusCode) -> Self {
        Self::new(status)
            .body(status.canonical_reason())
            .keep_alive(false)
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    #[must_use]
    pub fn keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn is_keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// Serializes to wire format.
    ///
    /// Adds `Content-Type: text/plain` for a non-empty body without one,
    /// then `Connection` and `Content-Length`.
    pub fn into_bytes(self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(128 + self.headers.len() * 64 + self.body.len());

        buf.put(
            format!(
                "HTTP/1.1 {} {}\r\n",
                self.status.as_u16(),
                self.status.canonical_reason()
            )
            .as_bytes(),
        );
        for (name, value) in self.headers.iter() {
            buf.put(format!("{name}: {value}\r\n").as_bytes());
        }
        if !self.body.is_empty() && !self.headers.contains("content-type") {
            buf.put(&b"Content-Type: text/plain; charset=utf-8\r\n"[..]);
        }
        let connection = if self.keep_alive { "keep-alive" } else { "close" };
        buf.put(format!("Connection: {connection}\r\n").as_bytes());
        buf.put(format!("Content-Length: {}\r\n\r\n", self.body.len()).as_bytes());
        buf.put(self.body.as_slice());
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn to_string(bytes: BytesMut) -> String {
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn ok_with_body() {
        let s = to_string(Response::new(StatusCode::Ok).body("hello").into_bytes());
        assert!(s.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(s.contains("Content-Type: text/plain; charset=utf-8\r\n"));
        assert!(s.contains("Connection: keep-alive\r\n"));
        assert!(s.ends_with("Content-Length: 5\r\n\r\nhello"));
    }

    #[test]
    fn error_status_closes() {
        let response = Response::from_status(StatusCode::PayloadTooLarge);
        assert!(!response.is_keep_alive());
        let s = to_string(response.into_bytes());
        assert!(s.starts_with("HTTP/1.1 413 Payload Too Large\r\n"));
        assert!(s.ends_with("\r\n\r\nPayload Too Large"));
    }

    #[test]
    fn explicit_content_type_kept() {
        let s = to_string(
            Response::new(StatusCode::Ok)
                .header("Content-Type", "application/json")
                .body("{}")
                .into_bytes(),
        );
        assert!(s.contains("content-type: application/json\r\n"));
        assert!(!s.contains("text/plain"));
    }

    #[test]
    fn empty_body() {
        let s = to_string(Response::new(StatusCode::NoContent).into_bytes());
        assert!(!s.contains("Content-Type"));
        assert!(s.ends_with("Content-Length: 0\r\n\r\n"));
    }
}
