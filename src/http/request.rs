//! The request ingestion state machine.
//!
//! A [`Request`] is owned by one connection and fed bytes as they arrive via
//! [`Request::ingest`]. It never blocks and never fails the call itself: the
//! outcome is read back from [`Request::state`] and [`Request::status_code`].
//!
//! ```text
//!  Begin ──► Line ──► Headers ──┬──► Body ──┬──► Complete
//!              │          │     └───────────┼──► Complete
//!              └──────────┴─────────────────┴──► Error
//! ```

use bytes::{Buf, Bytes, BytesMut};
use tracing::{debug, trace};

use super::{
    Body, CRLF, HEADER_TERMINATOR, Headers, Method, ParseError, RequestLine, StatusCode, Version,
};
use crate::config::Limits;

/// Where a [`Request`] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    /// Nothing buffered yet.
    Begin,
    /// Waiting for the start line's CRLF.
    Line,
    /// Waiting for the empty line that ends the header block.
    Headers,
    /// Accumulating the body.
    Body,
    /// Terminal: parsed successfully.
    Complete,
    /// Terminal: rejected; see [`Request::status_code`].
    Error,
}

impl State {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }
}

// Whether a step consumed input / changed state, or needs more bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Progress {
    Advanced,
    NeedMore,
}

/// An immutable snapshot of a completed request.
#[derive(Debug, Clone)]
pub struct Message {
    pub line: RequestLine,
    pub headers: Headers,
    pub body: Bytes,
}

impl Message {
    pub fn method(&self) -> &Method {
        self.line.method()
    }

    pub fn path(&self) -> &str {
        self.line.path()
    }

    /// HTTP/1.1 defaults to keep-alive; HTTP/1.0 defaults to close.
    pub fn is_keep_alive(&self) -> bool {
        match self.headers.get("connection") {
            Some(conn) if conn.eq_ignore_ascii_case("close") => false,
            Some(conn) if conn.eq_ignore_ascii_case("keep-alive") => true,
            _ => self.line.version() == Version::Http11,
        }
    }
}

/// Incremental HTTP/1.1 request parser.
///
/// # Examples
///
/// ```
/// use rttp_ingest::http::{Request, State, StatusCode};
///
/// let mut request = Request::new();
/// request.ingest(b"POST /echo HTTP/1.1\r\nHost: x\r\nContent-");
/// assert_eq!(request.state(), State::Headers);
/// assert_eq!(request.status_code(), None);
///
/// request.ingest(b"Length: 5\r\n\r\nhel");
/// request.ingest(b"lo");
/// assert_eq!(request.state(), State::Complete);
/// assert_eq!(request.status_code(), Some(StatusCode::Ok));
/// assert_eq!(request.body().bytes().as_ref(), b"hello");
/// ```
#[derive(Debug)]
pub struct Request {
    state: State,
    // `None` until an outcome exists; only written by `set_outcome`.
    status: Option<StatusCode>,
    buffer: BytesMut,
    // Prefix of `buffer` already searched for the pending delimiter.
    scanned: usize,
    line: Option<RequestLine>,
    headers: Headers,
    body: Body,
    limits: Limits,
}

impl Default for Request {
    fn default() -> Self {
        Self::new()
    }
}

impl Request {
    /// Creates an empty request with default [`Limits`].
    pub fn new() -> Self {
        Self::with_limits(Limits::default())
    }

    pub fn with_limits(limits: Limits) -> Self {
        Self {
            state: State::Begin,
            status: None,
            buffer: BytesMut::new(),
            scanned: 0,
            line: None,
            headers: Headers::new(),
            body: Body::new(limits.max_body_size),
            limits,
        }
    }

    /// Appends `bytes` and advances as far as the buffered input allows.
    ///
    /// Bytes arriving after the request is done are ignored.
    pub fn ingest(&mut self, bytes: &[u8]) {
        if self.is_done() {
            if !bytes.is_empty() {
                trace!(len = bytes.len(), state = ?self.state, "ignoring bytes after terminal state");
            }
            return;
        }
        self.buffer.extend_from_slice(bytes);

        while !self.is_done() {
            match self.step() {
                Ok(Progress::Advanced) => {}
                Ok(Progress::NeedMore) => break,
                Err(e) => {
                    debug!(error = %e, state = ?self.state, "request rejected");
                    self.set_outcome(e.status_code());
                }
            }
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// `None` while no outcome exists, `Some(Ok)` on success, otherwise the
    /// error status.
    pub fn status_code(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn is_done(&self) -> bool {
        self.state.is_terminal()
    }

    /// Forces an error outcome, e.g. on a read timeout. No-op once done or
    /// when given [`StatusCode::Ok`].
    pub fn abort(&mut self, status: StatusCode) {
        if self.is_done() || status == StatusCode::Ok {
            return;
        }
        debug!(status = %status, state = ?self.state, "request aborted");
        self.set_outcome(status);
    }

    /// Returns the request to its freshly constructed state.
    pub fn reset(&mut self) {
        self.state = State::Begin;
        self.status = None;
        self.buffer.clear();
        self.scanned = 0;
        self.line = None;
        self.headers.clear();
        self.body.clear();
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    pub fn line(&self) -> Option<&RequestLine> {
        self.line.as_ref()
    }

    pub fn method(&self) -> Option<&Method> {
        self.line.as_ref().map(RequestLine::method)
    }

    pub fn target(&self) -> Option<&str> {
        self.line.as_ref().map(RequestLine::target)
    }

    pub fn version(&self) -> Option<Version> {
        self.line.as_ref().map(RequestLine::version)
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    /// Snapshot of the parsed request, available once [`State::Complete`].
    pub fn message(&self) -> Option<Message> {
        if self.state != State::Complete {
            return None;
        }
        Some(Message {
            line: self.line.clone()?,
            headers: self.headers.clone(),
            body: self.body.bytes().clone(),
        })
    }

    /// The only writer of `status`; anything but OK moves to [`State::Error`].
    fn set_outcome(&mut self, status: StatusCode) {
        self.status = Some(status);
        if status == StatusCode::Ok {
            self.state = State::Complete;
        } else {
            self.state = State::Error;
        }
    }

    fn step(&mut self) -> Result<Progress, ParseError> {
        trace!(state = ?self.state, buffered = self.buffer.len(), "step");
        match self.state {
            State::Begin => Ok(self.begin()),
            State::Line => self.parse_line(),
            State::Headers => self.parse_headers(),
            State::Body => self.parse_body(),
            State::Complete | State::Error => Ok(Progress::NeedMore),
        }
    }

    fn begin(&mut self) -> Progress {
        if self.buffer.is_empty() {
            return Progress::NeedMore;
        }
        self.state = State::Line;
        Progress::Advanced
    }

    fn parse_line(&mut self) -> Result<Progress, ParseError> {
        let Some(end) = self.find_delimiter(CRLF) else {
            if self.buffer.len() > self.limits.max_line_len {
                return Err(ParseError::LineTooLong {
                    max: self.limits.max_line_len,
                });
            }
            return Ok(Progress::NeedMore);
        };
        if end > self.limits.max_line_len {
            return Err(ParseError::LineTooLong {
                max: self.limits.max_line_len,
            });
        }

        let raw = std::str::from_utf8(&self.buffer[..end])
            .map_err(|_| ParseError::MalformedRequestLine)?;
        let line = RequestLine::parse(raw, &self.limits)?;
        trace!(method = %line.method(), target = line.target(), "start line parsed");

        self.buffer.advance(end + CRLF.len());
        self.line = Some(line);
        self.state = State::Headers;
        Ok(Progress::Advanced)
    }

    fn parse_headers(&mut self) -> Result<Progress, ParseError> {
        let block_len = if self.buffer.starts_with(CRLF) {
            CRLF.len()
        } else {
            match self.find_delimiter(HEADER_TERMINATOR) {
                Some(end) => end + HEADER_TERMINATOR.len(),
                None if self.buffer.len() > self.limits.max_header_bytes => {
                    return Err(ParseError::HeadersTooLarge {
                        max: self.limits.max_header_bytes,
                    });
                }
                None => return Ok(Progress::NeedMore),
            }
        };

        self.headers = Headers::parse(&self.buffer[..block_len], &self.limits)?;
        self.buffer.advance(block_len);
        self.scanned = 0;
        trace!(count = self.headers.len(), "headers parsed");

        self.resolve_framing()?;
        self.validate_method_body()?;

        let Some(method) = self.method() else {
            return Err(ParseError::EmptyRequestLine);
        };
        let no_body = self.body.content_length() == 0 && !self.body.is_chunked();
        let bodiless = match method {
            Method::Get => true,
            Method::Delete => no_body,
            _ => false,
        };
        if bodiless && self.buffer.is_empty() {
            self.complete();
        } else {
            self.state = State::Body;
        }
        Ok(Progress::Advanced)
    }

    /// Reads `content-length` / `transfer-encoding` / `content-type` into the body record.
    fn resolve_framing(&mut self) -> Result<(), ParseError> {
        if let Some(raw) = self.headers.get("content-length") {
            let length = parse_content_length(raw, self.limits.max_body_size)?;
            let method = self.method();
            let skip = length == 0 && matches!(method, Some(Method::Get | Method::Delete));
            if !skip {
                self.body.set_content_length(length);
            }
        } else if let Some(coding) = self
            .headers
            .get_combined("transfer-encoding")
            .filter(|coding| !coding.is_empty())
        {
            if !is_chunked_coding(&coding) {
                return Err(ParseError::UnsupportedTransferEncoding(coding));
            }
            self.body.set_chunked();
        }

        if let Some(content_type) = self.headers.get("content-type") {
            self.body.set_content_type(content_type);
        }
        Ok(())
    }

    fn validate_method_body(&self) -> Result<(), ParseError> {
        let Some(method) = self.method() else {
            return Ok(());
        };
        let length = self.body.content_length();
        let chunked = self.body.is_chunked();
        let has_body = length > 0 || chunked;

        match method {
            Method::Get if has_body => Err(ParseError::UnexpectedBody {
                method: method.to_string(),
            }),
            Method::Post if !has_body => Err(ParseError::LengthRequired {
                method: method.to_string(),
            }),
            Method::Delete if chunked && length > 0 => Err(ParseError::ConflictingFraming),
            _ => Ok(()),
        }
    }

    /// Finds `needle` in the buffer, resuming where the previous miss
    /// stopped so a trickled header block is scanned once overall.
    fn find_delimiter(&mut self, needle: &[u8]) -> Option<usize> {
        let start = self.scanned.saturating_sub(needle.len() - 1);
        match find(&self.buffer[start..], needle) {
            Some(pos) => {
                self.scanned = 0;
                Some(start + pos)
            }
            None => {
                self.scanned = self.buffer.len();
                None
            }
        }
    }

    fn parse_body(&mut self) -> Result<Progress, ParseError> {
        if !self.buffer.is_empty() {
            self.body.receive(&self.buffer)?;
            self.buffer.clear();
        }
        if !self.body.is_completed() {
            return Ok(Progress::NeedMore);
        }

        self.body.finalize()?;
        self.complete();
        Ok(Progress::Advanced)
    }

    fn complete(&mut self) {
        debug!(
            method = ?self.method().map(Method::as_str),
            target = ?self.target(),
            body_len = self.body.bytes().len(),
            "request complete"
        );
        self.set_outcome(StatusCode::Ok);
    }
}

/// Strict decimal `Content-Length`: digits only, bounded by `max`.
fn parse_content_length(raw: &str, max: u64) -> Result<u64, ParseError> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseError::InvalidContentLength(raw.to_owned()));
    }
    match raw.parse::<u64>() {
        Ok(length) if length <= max => Ok(length),
        _ => Err(ParseError::BodyTooLarge { max }),
    }
}

/// `true` when the last `chunked` token is followed only by separators.
///
/// Codings before `chunked` are not inspected.
fn is_chunked_coding(value: &str) -> bool {
    let value = value.to_ascii_lowercase();
    value.rfind("chunked").is_some_and(|pos| {
        value[pos + "chunked".len()..]
            .bytes()
            .all(|b| matches!(b, b' ' | b',' | b'\t' | b'\r' | b'\n'))
    })
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
