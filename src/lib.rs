//! # rttp-ingest
//!
//! The request-ingestion core of an HTTP/1.1 server: a non-blocking state
//! machine that turns an arbitrarily fragmented byte stream into a validated
//! request or a terminal protocol error.
//!
//! ## Quick Start
//!
//! ```
//! use rttp_ingest::{Request, State, StatusCode};
//!
//! let mut request = Request::new();
//! for fragment in [&b"GET / HT"[..], b"TP/1.1\r\nHost: x\r", b"\n\r\n"] {
//!     request.ingest(fragment);
//! }
//! assert_eq!(request.state(), State::Complete);
//! assert_eq!(request.status_code(), Some(StatusCode::Ok));
//! assert_eq!(request.headers().get("host"), Some("x"));
//! ```

pub mod config;
pub mod http;
pub mod server;

pub use config::{Config, ConfigError, Limits};
pub use http::{
    Body, Headers, Message, Method, ParseError, Request, RequestLine, Response, State, StatusCode,
    Version,
};
pub use server::{Server, ServerError};
