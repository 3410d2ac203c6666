//! HTTP/1.1 request ingestion.
//!
//! The engine is split along the shape of a request on the wire:
//!
//! - [`line`]: the start line (`method SP target SP version`).
//! - [`headers`]: the CRLF-delimited header block.
//! - [`body`]: fixed-length and chunked body accumulation.
//! - [`request`]: the [`Request`] state machine that owns the input buffer
//!   and drives the three parsers above as bytes arrive.
//!
//! The shared primitives [`Method`], [`Version`] and [`StatusCode`] live here.

use std::fmt;

pub mod body;
pub mod error;
pub mod headers;
pub mod line;
pub mod request;
pub mod response;

pub use body::Body;
pub use error::ParseError;
pub use headers::Headers;
pub use line::RequestLine;
pub use request::{Message, Request, State};
pub use response::Response;

/// HTTP line terminator.
pub const CRLF: &[u8] = b"\r\n";

/// Terminator of the header block: the last header's CRLF plus an empty line.
pub const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Upper bound on any declared or accumulated body size (8 MiB).
///
/// This is the default for [`Limits::max_body_size`](crate::config::Limits::max_body_size).
pub const MAX_BODY_SIZE: u64 = 8 * 1024 * 1024;

/// An HTTP status code surfaced by the engine or written by the driver.
///
/// # Examples
///
/// ```
/// use rttp_ingest::http::StatusCode;
///
/// let status = StatusCode::PayloadTooLarge;
/// assert_eq!(status.as_u16(), 413);
/// assert_eq!(status.canonical_reason(), "Payload Too Large");
/// assert!(!status.is_success());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum StatusCode {
    // 2xx Success
    Ok = 200,
    NoContent = 204,

    // 4xx Client Error
    BadRequest = 400,
    RequestTimeout = 408,
    LengthRequired = 411,
    PayloadTooLarge = 413,
    UriTooLong = 414,
    RequestHeaderFieldsTooLarge = 431,

    // 5xx Server Error
    HttpVersionNotSupported = 505,
}

impl StatusCode {
    /// Returns the numeric status code as a `u16`.
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Returns `true` for 2xx codes.
    pub fn is_success(self) -> bool {
        (200..300).contains(&self.as_u16())
    }

    /// Returns the canonical reason phrase for this status code.
    pub fn canonical_reason(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::NoContent => "No Content",
            Self::BadRequest => "Bad Request",
            Self::RequestTimeout => "Request Timeout",
            Self::LengthRequired => "Length Required",
            Self::PayloadTooLarge => "Payload Too Large",
            Self::UriTooLong => "URI Too Long",
            Self::RequestHeaderFieldsTooLarge => "Request Header Fields Too Large",
            Self::HttpVersionNotSupported => "HTTP Version Not Supported",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.as_u16(), self.canonical_reason())
    }
}

impl From<StatusCode> for u16 {
    fn from(code: StatusCode) -> u16 {
        code.as_u16()
    }
}

/// An HTTP request method.
///
/// Standard methods are unit variants; anything else that is a valid token
/// is kept verbatim in [`Method::Custom`].
///
/// # Examples
///
/// ```
/// use rttp_ingest::http::Method;
///
/// let method: Method = "DELETE".parse().unwrap();
/// assert_eq!(method, Method::Delete);
/// assert_eq!(method.as_str(), "DELETE");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Head,
    Options,
    Patch,
    Connect,
    Trace,
    /// A non-standard extension method.
    Custom(String),
}

impl Method {
    /// Returns the method as a string slice.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
            Self::Patch => "PATCH",
            Self::Connect => "CONNECT",
            Self::Trace => "TRACE",
            Self::Custom(s) => s.as_str(),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Method {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "GET" => Self::Get,
            "POST" => Self::Post,
            "PUT" => Self::Put,
            "DELETE" => Self::Delete,
            "HEAD" => Self::Head,
            "OPTIONS" => Self::Options,
            "PATCH" => Self::Patch,
            "CONNECT" => Self::Connect,
            "TRACE" => Self::Trace,
            other => Self::Custom(other.to_owned()),
        })
    }
}

impl AsRef<str> for Method {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// HTTP protocol version accepted on the start line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Version {
    Http10,
    Http11,
}

impl Version {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Http10 => "HTTP/1.0",
            Self::Http11 => "HTTP/1.1",
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Version {
    type Err = ParseError;

    /// Accepts `HTTP/<digit>.<digit>`; versions other than 1.0 and 1.1 are
    /// well-formed but unsupported.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix("HTTP/")
            .map(str::as_bytes)
            .ok_or(ParseError::InvalidVersion)?;

        match digits {
            [b'1', b'.', b'0'] => Ok(Self::Http10),
            [b'1', b'.', b'1'] => Ok(Self::Http11),
            [major, b'.', minor] if major.is_ascii_digit() && minor.is_ascii_digit() => {
                Err(ParseError::UnsupportedVersion(s.to_owned()))
            }
            _ => Err(ParseError::InvalidVersion),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_display() {
        assert_eq!(StatusCode::LengthRequired.to_string(), "411 Length Required");
        assert_eq!(u16::from(StatusCode::UriTooLong), 414);
    }

    #[test]
    fn status_codes_are_engine_and_driver_outcomes() {
        use StatusCode::*;

        let all = [
            Ok,
            NoContent,
            BadRequest,
            RequestTimeout,
            LengthRequired,
            PayloadTooLarge,
            UriTooLong,
            RequestHeaderFieldsTooLarge,
            HttpVersionNotSupported,
        ];
        let codes: Vec<u16> = all.iter().map(|s| s.as_u16()).collect();
        assert_eq!(codes, [200, 204, 400, 408, 411, 413, 414, 431, 505]);
        assert!(all.iter().all(|s| !s.canonical_reason().is_empty()));
    }

    #[test]
    fn custom_method_round_trips_name() {
        let method: Method = "PURGE".parse().unwrap();
        assert_eq!(method, Method::Custom("PURGE".to_owned()));
        assert_eq!(method.to_string(), "PURGE");
    }

    #[test]
    fn version_parse() {
        assert_eq!("HTTP/1.1".parse::<Version>().unwrap(), Version::Http11);
        assert_eq!("HTTP/1.0".parse::<Version>().unwrap(), Version::Http10);
        assert!(matches!(
            "HTTP/2.0".parse::<Version>(),
            Err(ParseError::UnsupportedVersion(_))
        ));
        assert!(matches!(
            "HTTP/1.12".parse::<Version>(),
            Err(ParseError::InvalidVersion)
        ));
        assert!(matches!(
            "http/1.1".parse::<Version>(),
            Err(ParseError::InvalidVersion)
        ));
    }
}
