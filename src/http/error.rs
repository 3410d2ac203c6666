//! Protocol errors raised while ingesting a request.

use thiserror::Error;

use super::StatusCode;

/// A terminal protocol error.
///
/// Every sub-parser reports failure through this type; [`ParseError::status_code`]
/// gives the status the [`Request`](super::Request) ends with.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("empty request line")]
    EmptyRequestLine,

    #[error("malformed request line")]
    MalformedRequestLine,

    #[error("invalid method token")]
    InvalidMethod,

    #[error("invalid request target")]
    InvalidTarget,

    #[error("invalid HTTP version")]
    InvalidVersion,

    #[error("unsupported HTTP version: {0}")]
    UnsupportedVersion(String),

    #[error("request line exceeds {max} bytes")]
    LineTooLong { max: usize },

    #[error("malformed header: {0}")]
    InvalidHeader(#[from] httparse::Error),

    #[error("header block is not terminated by an empty line")]
    UnterminatedHeaders,

    #[error("bare LF line terminator")]
    BareLineFeed,

    #[error("header `{name}` is not valid UTF-8")]
    HeaderNotUtf8 { name: String },

    #[error("header block exceeds {max} bytes")]
    HeadersTooLarge { max: usize },

    #[error("more than {max} header fields")]
    TooManyHeaders { max: usize },

    #[error("conflicting content-length values")]
    ConflictingContentLength,

    #[error("invalid content-length: {0:?}")]
    InvalidContentLength(String),

    #[error("request body exceeds maximum allowed size of {max} bytes")]
    BodyTooLarge { max: u64 },

    #[error("transfer-encoding does not end in chunked: {0:?}")]
    UnsupportedTransferEncoding(String),

    #[error("{method} request must not carry a body")]
    UnexpectedBody { method: String },

    #[error("{method} request requires content-length or chunked transfer-encoding")]
    LengthRequired { method: String },

    #[error("request declares both chunked framing and a content-length")]
    ConflictingFraming,

    #[error("malformed chunked body: {0}")]
    InvalidChunk(&'static str),

    #[error("received more body bytes than the framing declared")]
    ExcessBody,

    #[error("malformed url-encoded form body")]
    InvalidForm,

    #[error("malformed JSON body: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("multipart body without a boundary parameter")]
    MissingBoundary,
}

impl ParseError {
    /// The status code this error terminates the request with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::UnsupportedVersion(_) => StatusCode::HttpVersionNotSupported,
            Self::LineTooLong { .. } => StatusCode::UriTooLong,
            Self::HeadersTooLarge { .. } | Self::TooManyHeaders { .. } => {
                StatusCode::RequestHeaderFieldsTooLarge
            }
            Self::InvalidHeader(httparse::Error::TooManyHeaders) => {
                StatusCode::RequestHeaderFieldsTooLarge
            }
            Self::BodyTooLarge { .. } | Self::ExcessBody => StatusCode::PayloadTooLarge,
            Self::LengthRequired { .. } => StatusCode::LengthRequired,
            _ => StatusCode::BadRequest,
        }
    }
}
