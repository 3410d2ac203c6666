//! Request body accumulation.
//!
//! A [`Body`] is fed raw bytes in fragments of any size and tracks whether
//! the framing-declared body has fully arrived. Two framings exist:
//!
//! - fixed length (`Content-Length`): bytes are appended until exactly the
//!   declared count is held;
//! - chunked (`Transfer-Encoding: chunked`): an incremental decoder strips
//!   the chunk framing, stops at the zero-size chunk and discards trailers.
//!
//! Chunked wire format:
//!
//! ```text
//! chunk-size [; ext] CRLF
//! chunk-data CRLF
//! ...
//! 0 CRLF
//! [trailer-field CRLF]*
//! CRLF
//! ```

use bytes::{Bytes, BytesMut};

use super::ParseError;

/// Longest chunk-size or trailer line accepted before its CRLF.
const MAX_CHUNK_LINE: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkState {
    /// Expecting `size[;ext] CRLF`.
    Size,
    /// Copying chunk payload.
    Data { remaining: u64 },
    /// Expecting the CRLF that closes a chunk's payload.
    DataEnd,
    /// After the zero-size chunk: trailer lines until an empty line.
    Trailers,
    Done,
}

/// The body record of a request.
#[derive(Debug, Clone)]
pub struct Body {
    content_length: u64,
    chunked: bool,
    content_type: Option<String>,
    max_size: u64,
    data: BytesMut,
    finalized: bool,
    // Chunked decoder state; `line` holds a size/trailer line split across fragments.
    chunk: ChunkState,
    line: Vec<u8>,
    payload: Bytes,
    form: Vec<(String, String)>,
}

impl Body {
    /// Creates an empty body that will refuse to grow past `max_size` bytes.
    pub fn new(max_size: u64) -> Self {
        Self {
            content_length: 0,
            chunked: false,
            content_type: None,
            max_size,
            data: BytesMut::new(),
            finalized: false,
            chunk: ChunkState::Size,
            line: Vec::new(),
            payload: Bytes::new(),
            form: Vec::new(),
        }
    }

    pub(crate) fn set_content_length(&mut self, length: u64) {
        self.content_length = length;
        self.data.reserve(length.min(64 * 1024) as usize);
    }

    pub(crate) fn set_chunked(&mut self) {
        self.chunked = true;
    }

    pub(crate) fn set_content_type(&mut self, content_type: impl Into<String>) {
        self.content_type = Some(content_type.into());
    }

    /// Declared `Content-Length`, or 0 when absent or chunked.
    pub fn content_length(&self) -> u64 {
        self.content_length
    }

    pub fn is_chunked(&self) -> bool {
        self.chunked
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// `true` once the declared amount of data, or the terminal chunk, has
    /// been received.
    pub fn is_completed(&self) -> bool {
        if self.finalized {
            true
        } else if self.chunked {
            self.chunk == ChunkState::Done
        } else {
            self.data.len() as u64 == self.content_length
        }
    }

    /// Decoded bytes received so far; drained into [`bytes`](Self::bytes)
    /// by [`finalize`](Self::finalize).
    pub fn received(&self) -> &[u8] {
        &self.data
    }

    /// The final payload; empty until [`finalize`](Self::finalize) succeeds.
    pub fn bytes(&self) -> &Bytes {
        &self.payload
    }

    /// Decoded `application/x-www-form-urlencoded` pairs, in body order.
    pub fn form(&self) -> &[(String, String)] {
        &self.form
    }

    /// Feeds the next fragment of raw body bytes.
    ///
    /// # Errors
    ///
    /// - [`ParseError::ExcessBody`] when more bytes arrive than the framing declared.
    /// - [`ParseError::BodyTooLarge`] when decoded chunks exceed the size limit.
    /// - [`ParseError::InvalidChunk`] / [`ParseError::BareLineFeed`] for
    ///   malformed chunk framing.
    pub fn receive(&mut self, bytes: &[u8]) -> Result<(), ParseError> {
        if self.chunked {
            return self.decode_chunked(bytes);
        }

        let remaining = self.content_length - self.data.len() as u64;
        if bytes.len() as u64 > remaining {
            return Err(ParseError::ExcessBody);
        }
        self.data.extend_from_slice(bytes);
        Ok(())
    }

    fn decode_chunked(&mut self, mut input: &[u8]) -> Result<(), ParseError> {
        while !input.is_empty() {
            match self.chunk {
                ChunkState::Size => {
                    let Some(line) = take_line(&mut self.line, &mut input)? else {
                        break;
                    };
                    let size = parse_chunk_size(&line)?
                        .filter(|&size| size <= self.max_size - self.data.len() as u64)
                        .ok_or(ParseError::BodyTooLarge { max: self.max_size })?;
                    self.chunk = if size == 0 {
                        ChunkState::Trailers
                    } else {
                        ChunkState::Data { remaining: size }
                    };
                }
                ChunkState::Data { remaining } => {
                    let take = remaining.min(input.len() as u64) as usize;
                    self.data.extend_from_slice(&input[..take]);
                    input = &input[take..];
                    let remaining = remaining - take as u64;
                    self.chunk = if remaining == 0 {
                        ChunkState::DataEnd
                    } else {
                        ChunkState::Data { remaining }
                    };
                }
                ChunkState::DataEnd => {
                    let Some(line) = take_line(&mut self.line, &mut input)? else {
                        break;
                    };
                    if !line.is_empty() {
                        return Err(ParseError::InvalidChunk("missing CRLF after chunk data"));
                    }
                    self.chunk = ChunkState::Size;
                }
                ChunkState::Trailers => {
                    let Some(line) = take_line(&mut self.line, &mut input)? else {
                        break;
                    };
                    if line.is_empty() {
                        self.chunk = ChunkState::Done;
                    } else if !line.contains(&b':') {
                        return Err(ParseError::InvalidChunk("malformed trailer field"));
                    }
                }
                ChunkState::Done => return Err(ParseError::ExcessBody),
            }
        }
        Ok(())
    }

    /// Validates content-type specific structure and freezes the payload.
    ///
    /// # Errors
    ///
    /// - [`ParseError::InvalidForm`] for a malformed url-encoded form.
    /// - [`ParseError::InvalidJson`] for a non-empty body that is not JSON.
    /// - [`ParseError::MissingBoundary`] for multipart without a boundary.
    pub fn finalize(&mut self) -> Result<(), ParseError> {
        let media_type = self
            .content_type
            .as_deref()
            .map(|ct| ct.split(';').next().unwrap_or("").trim().to_ascii_lowercase());

        match media_type.as_deref() {
            Some("application/x-www-form-urlencoded") => {
                self.form = parse_form(&self.data)?;
            }
            Some("application/json") if !self.data.is_empty() => {
                serde_json::from_slice::<serde::de::IgnoredAny>(&self.data)?;
            }
            Some(mt) if mt.starts_with("multipart/") => {
                let has_boundary = self.content_type.as_deref().is_some_and(|ct| {
                    ct.split(';').skip(1).any(|param| {
                        param.trim().split_once('=').is_some_and(|(name, value)| {
                            name.trim().eq_ignore_ascii_case("boundary")
                                && !value.trim().trim_matches('"').is_empty()
                        })
                    })
                });
                if !has_boundary {
                    return Err(ParseError::MissingBoundary);
                }
            }
            _ => {}
        }

        self.payload = self.data.split().freeze();
        self.finalized = true;
        Ok(())
    }

    /// `true` once [`finalize`](Self::finalize) has succeeded.
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Returns the record to its empty state, keeping the size limit.
    pub fn clear(&mut self) {
        *self = Self::new(self.max_size);
    }
}

/// Moves bytes from `input` into `pending` up to and including the next LF.
///
/// Returns the completed line without its CRLF, or `None` when `input` ran
/// out first.
fn take_line(pending: &mut Vec<u8>, input: &mut &[u8]) -> Result<Option<Vec<u8>>, ParseError> {
    let data = *input;
    let Some(lf) = data.iter().position(|&b| b == b'\n') else {
        pending.extend_from_slice(data);
        *input = &[];
        if pending.len() > MAX_CHUNK_LINE {
            return Err(ParseError::InvalidChunk("chunk line too long"));
        }
        return Ok(None);
    };

    pending.extend_from_slice(&data[..=lf]);
    *input = &data[lf + 1..];
    if pending.len() > MAX_CHUNK_LINE + 2 {
        return Err(ParseError::InvalidChunk("chunk line too long"));
    }

    let mut line = std::mem::take(pending);
    line.pop();
    if line.pop() != Some(b'\r') {
        return Err(ParseError::BareLineFeed);
    }
    Ok(Some(line))
}

/// Parses the hex size of a chunk line, ignoring extensions. `None` means
/// the size does not fit in a `u64`.
fn parse_chunk_size(line: &[u8]) -> Result<Option<u64>, ParseError> {
    let size = line.split(|&b| b == b';').next().unwrap_or_default();
    let size = size.trim_ascii();
    if size.is_empty() || !size.iter().all(u8::is_ascii_hexdigit) {
        return Err(ParseError::InvalidChunk("invalid chunk size"));
    }

    Ok(size.iter().try_fold(0u64, |acc, &digit| {
        let value = (digit as char).to_digit(16)? as u64;
        acc.checked_mul(16)?.checked_add(value)
    }))
}

fn parse_form(data: &[u8]) -> Result<Vec<(String, String)>, ParseError> {
    if data.is_empty() {
        return Ok(Vec::new());
    }
    data.split(|&b| b == b'&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let mut parts = pair.splitn(2, |&b| b == b'=');
            let name = percent_decode(parts.next().unwrap_or_default())?;
            let value = percent_decode(parts.next().unwrap_or_default())?;
            Ok((name, value))
        })
        .collect()
}

fn percent_decode(raw: &[u8]) -> Result<String, ParseError> {
    let mut out = Vec::with_capacity(raw.len());
    let mut iter = raw.iter();
    while let Some(&b) = iter.next() {
        match b {
            b'+' => out.push(b' '),
            b'%' => {
                let hi = iter.next().and_then(|&h| (h as char).to_digit(16));
                let lo = iter.next().and_then(|&l| (l as char).to_digit(16));
                match (hi, lo) {
                    (Some(hi), Some(lo)) => out.push((hi * 16 + lo) as u8),
                    _ => return Err(ParseError::InvalidForm),
                }
            }
            _ => out.push(b),
        }
    }
    String::from_utf8(out).map_err(|_| ParseError::InvalidForm)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX: u64 = 1024;

    fn fixed(length: u64) -> Body {
        let mut body = Body::new(MAX);
        body.set_content_length(length);
        body
    }

    fn chunked() -> Body {
        let mut body = Body::new(MAX);
        body.set_chunked();
        body
    }

    #[test]
    fn fixed_length_in_fragments() {
        let mut body = fixed(5);
        body.receive(b"he").unwrap();
        assert!(!body.is_completed());
        body.receive(b"llo").unwrap();
        assert!(body.is_completed());
        body.finalize().unwrap();
        assert_eq!(body.bytes().as_ref(), b"hello");
    }

    #[test]
    fn fixed_length_overflow() {
        let mut body = fixed(3);
        body.receive(b"ab").unwrap();
        assert!(matches!(body.receive(b"cd"), Err(ParseError::ExcessBody)));
    }

    #[test]
    fn zero_length_is_complete() {
        let body = fixed(0);
        assert!(body.is_completed());
    }

    #[test]
    fn chunked_single_call() {
        let mut body = chunked();
        body.receive(b"5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n").unwrap();
        assert!(body.is_completed());
        body.finalize().unwrap();
        assert_eq!(body.bytes().as_ref(), b"hello world");
    }

    #[test]
    fn chunked_byte_by_byte() {
        let raw = b"4;name=value\r\nWiki\r\nA\r\npedia in\r\n\r\n0\r\nX-Trailer: 1\r\n\r\n";
        let mut body = chunked();
        for byte in raw.iter() {
            assert!(!body.is_completed());
            body.receive(std::slice::from_ref(byte)).unwrap();
        }
        assert!(body.is_completed());
        assert_eq!(body.received(), b"Wikipedia in\r\n");
    }

    #[test]
    fn chunked_invalid_size() {
        let mut body = chunked();
        assert!(matches!(
            body.receive(b"zz\r\n"),
            Err(ParseError::InvalidChunk(_))
        ));
        let mut body = chunked();
        assert!(matches!(
            body.receive(b"\r\n"),
            Err(ParseError::InvalidChunk(_))
        ));
    }

    #[test]
    fn chunked_missing_data_terminator() {
        let mut body = chunked();
        assert!(matches!(
            body.receive(b"3\r\nabcX\r\n"),
            Err(ParseError::InvalidChunk(_))
        ));
    }

    #[test]
    fn chunked_bare_lf() {
        let mut body = chunked();
        assert!(matches!(
            body.receive(b"3\nabc"),
            Err(ParseError::BareLineFeed)
        ));
    }

    #[test]
    fn chunked_over_limit() {
        let mut body = chunked();
        assert!(matches!(
            body.receive(b"401\r\n"),
            Err(ParseError::BodyTooLarge { max: MAX })
        ));
    }

    #[test]
    fn chunked_size_overflow() {
        let mut body = chunked();
        assert!(matches!(
            body.receive(b"fffffffffffffffffff\r\n"),
            Err(ParseError::BodyTooLarge { max: MAX })
        ));
    }

    #[test]
    fn chunked_line_too_long() {
        let mut body = chunked();
        let long = vec![b'0'; MAX_CHUNK_LINE + 1];
        assert!(matches!(
            body.receive(&long),
            Err(ParseError::InvalidChunk(_))
        ));
    }

    #[test]
    fn bytes_after_last_chunk() {
        let mut body = chunked();
        assert!(matches!(
            body.receive(b"0\r\n\r\nGET"),
            Err(ParseError::ExcessBody)
        ));
    }

    #[test]
    fn malformed_trailer() {
        let mut body = chunked();
        assert!(matches!(
            body.receive(b"0\r\nnot a trailer\r\n\r\n"),
            Err(ParseError::InvalidChunk(_))
        ));
    }

    #[test]
    fn url_encoded_form() {
        let mut body = fixed(27);
        body.set_content_type("application/x-www-form-urlencoded; charset=utf-8");
        body.receive(b"name=J%C3%BCrgen&q=a+b&flag").unwrap();
        body.finalize().unwrap();
        assert_eq!(
            body.form(),
            &[
                ("name".to_owned(), "Jürgen".to_owned()),
                ("q".to_owned(), "a b".to_owned()),
                ("flag".to_owned(), String::new()),
            ]
        );
        assert_eq!(body.bytes().as_ref(), b"name=J%C3%BCrgen&q=a+b&flag");
    }

    #[test]
    fn url_encoded_form_bad_escape() {
        let mut body = fixed(5);
        body.set_content_type("application/x-www-form-urlencoded");
        body.receive(b"a=%zz").unwrap();
        assert!(matches!(body.finalize(), Err(ParseError::InvalidForm)));
    }

    #[test]
    fn json_validation() {
        let mut body = fixed(8);
        body.set_content_type("Application/JSON");
        body.receive(br#"{"a": 1}"#).unwrap();
        body.finalize().unwrap();

        let mut body = fixed(7);
        body.set_content_type("application/json");
        body.receive(br#"{"a": }"#).unwrap();
        assert!(matches!(body.finalize(), Err(ParseError::InvalidJson(_))));
    }

    #[test]
    fn multipart_requires_boundary() {
        let mut body = fixed(0);
        body.set_content_type("multipart/form-data");
        assert!(matches!(body.finalize(), Err(ParseError::MissingBoundary)));

        let mut body = fixed(0);
        body.set_content_type("multipart/form-data; boundary=\"xyz\"");
        body.finalize().unwrap();
    }

    #[test]
    fn completion_survives_finalize() {
        let mut body = fixed(3);
        body.receive(b"abc").unwrap();
        body.finalize().unwrap();
        assert!(body.is_completed());
        assert!(body.is_finalized());
        assert!(body.received().is_empty());
    }

    #[test]
    fn clear_keeps_limit() {
        let mut body = chunked();
        body.receive(b"3\r\nabc").unwrap();
        body.clear();
        assert!(!body.is_chunked());
        assert!(body.received().is_empty());

        body.set_chunked();
        assert!(matches!(
            body.receive(b"401\r\n"),
            Err(ParseError::BodyTooLarge { max: MAX })
        ));
    }
}
