//! Header block parsing and a case-insensitive header map.
//!
//! Names are normalized to lower case when stored, so lookups with any
//! casing agree with RFC 9110 §5.1.

use super::ParseError;
use crate::config::Limits;

/// An ordered, multi-value HTTP header map keyed by lower-cased name.
///
/// Duplicate fields are all kept in arrival order. [`get`](Self::get)
/// returns the first value and [`get_combined`](Self::get_combined) joins
/// every value with `", "`, which is how list-valued fields such as
/// `Transfer-Encoding` are read.
///
/// # Examples
///
/// ```
/// use rttp_ingest::http::Headers;
///
/// let mut headers = Headers::new();
/// headers.insert("Transfer-Encoding", "gzip");
/// headers.insert("transfer-encoding", "chunked");
///
/// assert_eq!(headers.get("TRANSFER-ENCODING"), Some("gzip"));
/// assert_eq!(headers.get_combined("transfer-encoding").as_deref(), Some("gzip, chunked"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    inner: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Vec::with_capacity(capacity),
        }
    }

    /// Parses a raw header block, terminating empty line included.
    ///
    /// A block consisting only of `\r\n` yields an empty map.
    ///
    /// # Errors
    ///
    /// - [`ParseError::HeadersTooLarge`] / [`ParseError::TooManyHeaders`] when
    ///   `limits` are exceeded.
    /// - [`ParseError::BareLineFeed`] for an LF without its CR.
    /// - [`ParseError::InvalidHeader`] for a missing colon, invalid name or
    ///   value bytes, and folded continuation lines.
    /// - [`ParseError::HeaderNotUtf8`] for a value that is not UTF-8.
    /// - [`ParseError::ConflictingContentLength`] when repeated
    ///   `Content-Length` fields disagree.
    pub fn parse(block: &[u8], limits: &Limits) -> Result<Self, ParseError> {
        if block.len() > limits.max_header_bytes {
            return Err(ParseError::HeadersTooLarge {
                max: limits.max_header_bytes,
            });
        }
        if has_bare_line_feed(block) {
            return Err(ParseError::BareLineFeed);
        }

        let mut slots = vec![httparse::EMPTY_HEADER; limits.max_headers];
        let parsed = match httparse::parse_headers(block, &mut slots) {
            Ok(httparse::Status::Complete((_, parsed))) => parsed,
            Ok(httparse::Status::Partial) => return Err(ParseError::UnterminatedHeaders),
            Err(httparse::Error::TooManyHeaders) => {
                return Err(ParseError::TooManyHeaders {
                    max: limits.max_headers,
                });
            }
            Err(e) => return Err(e.into()),
        };

        let mut headers = Self::with_capacity(parsed.len());
        for header in parsed {
            let value = std::str::from_utf8(header.value).map_err(|_| {
                ParseError::HeaderNotUtf8 {
                    name: header.name.to_ascii_lowercase(),
                }
            })?;
            headers.insert(header.name, value.trim_matches([' ', '\t']));
        }

        let conflicting = {
            let mut lengths = headers.get_all("content-length");
            lengths
                .next()
                .is_some_and(|first| lengths.any(|other| other != first))
        };
        if conflicting {
            return Err(ParseError::ConflictingContentLength);
        }

        Ok(headers)
    }

    /// Appends a header entry under its lower-cased name.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let mut name = name.into();
        name.make_ascii_lowercase();
        self.inner.push((name, value.into()));
    }

    /// Returns the first value for `name` (case-insensitive).
    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns every value for `name` in arrival order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.inner
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Joins every value for `name` with `", "`, or `None` if absent.
    pub fn get_combined(&self, name: &str) -> Option<String> {
        let values: Vec<&str> = self.get_all(name).collect();
        (!values.is_empty()).then(|| values.join(", "))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
    }

    /// Number of entries (not unique names).
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Iterates `(name, value)` pairs in arrival order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }
}

fn has_bare_line_feed(block: &[u8]) -> bool {
    block
        .iter()
        .enumerate()
        .any(|(i, &b)| b == b'\n' && (i == 0 || block[i - 1] != b'\r'))
}
