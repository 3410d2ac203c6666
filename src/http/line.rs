//! Request start line: `method SP request-target SP HTTP-version`.

use super::{Method, ParseError, Version};
use crate::config::Limits;

/// A parsed request line.
///
/// # Examples
///
/// ```
/// use rttp_ingest::config::Limits;
/// use rttp_ingest::http::{Method, RequestLine, Version};
///
/// let line = RequestLine::parse("GET /search?q=rust HTTP/1.1", &Limits::default()).unwrap();
/// assert_eq!(line.method(), &Method::Get);
/// assert_eq!(line.path(), "/search");
/// assert_eq!(line.query(), Some("q=rust"));
/// assert_eq!(line.version(), Version::Http11);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    method: Method,
    target: String,
    version: Version,
}

impl RequestLine {
    /// Parses a start line with its CRLF already stripped.
    ///
    /// # Errors
    ///
    /// - [`ParseError::EmptyRequestLine`] for an empty line.
    /// - [`ParseError::MalformedRequestLine`] unless there are exactly three
    ///   tokens separated by single spaces.
    /// - [`ParseError::InvalidMethod`] / [`ParseError::InvalidTarget`] for
    ///   characters outside the allowed sets.
    /// - [`ParseError::LineTooLong`] for a target longer than `max_line_len`.
    /// - [`ParseError::InvalidVersion`] / [`ParseError::UnsupportedVersion`].
    pub fn parse(line: &str, limits: &Limits) -> Result<Self, ParseError> {
        if line.is_empty() {
            return Err(ParseError::EmptyRequestLine);
        }

        let mut parts = line.split(' ');
        let (Some(method), Some(target), Some(version), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(ParseError::MalformedRequestLine);
        };

        if method.is_empty() || target.is_empty() || version.is_empty() {
            return Err(ParseError::MalformedRequestLine);
        }
        if !method.bytes().all(is_token_char) {
            return Err(ParseError::InvalidMethod);
        }
        if target.len() > limits.max_line_len {
            return Err(ParseError::LineTooLong {
                max: limits.max_line_len,
            });
        }
        if !target.bytes().all(|b| b.is_ascii_graphic()) {
            return Err(ParseError::InvalidTarget);
        }

        let version = version.parse()?;
        let method = method.parse::<Method>().unwrap_or_else(|never| match never {});

        Ok(Self {
            method,
            target: target.to_owned(),
            version,
        })
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The raw request target as sent.
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// The target without its query string.
    pub fn path(&self) -> &str {
        self.target
            .split_once('?')
            .map_or(self.target.as_str(), |(path, _)| path)
    }

    /// The query string (without the leading `?`), if any.
    pub fn query(&self) -> Option<&str> {
        self.target.split_once('?').map(|(_, query)| query)
    }
}

/// `tchar` from RFC 9110 §5.6.2.
pub(crate) fn is_token_char(b: u8) -> bool {
    matches!(
        b,
        b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.' | b'^' | b'_' | b'`'
            | b'|' | b'~' | b'0'..=b'9' | b'A'..=b'Z' | b'a'..=b'z'
    )
}
