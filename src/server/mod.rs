//! Tokio connection driver for the ingestion engine.
//!
//! Each accepted connection owns exactly one [`Request`]. Bytes read from
//! the socket are handed to [`Request::ingest`]; once the request is done the
//! driver either dispatches the completed [`Message`] to the handler or maps
//! the error status to a response, then resets the request for the next
//! message on a persistent connection.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::http::{Message, Request, Response, State, StatusCode};

/// Errors produced by the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Read buffer capacity per connection.
const READ_BUF_SIZE: usize = 4096;

/// Accepts connections and drives one [`Request`] per connection.
///
/// # Examples
///
/// ```rust,no_run
/// use rttp_ingest::server::Server;
/// use rttp_ingest::http::{Response, StatusCode};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let server = Server::bind("127.0.0.1:8080").await?;
///     server.run(|message| async move {
///         Response::new(StatusCode::Ok).body(message.body.to_vec())
///     }).await?;
///     Ok(())
/// }
/// ```
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    config: Config,
}

impl Server {
    /// Binds with the default [`Config`] and the given address.
    pub async fn bind(addr: impl AsRef<str>) -> Result<Self, ServerError> {
        let config = Config {
            listen_addr: addr.as_ref().to_owned(),
            ..Config::default()
        };
        Self::with_config(config).await
    }

    /// Binds to `config.listen_addr`.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be bound.
    pub async fn with_config(config: Config) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(&config.listen_addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: config.listen_addr.clone(),
                source: e,
            })?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
            config,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts connections until the process ends, dispatching each
    /// completed request to `handler`.
    pub async fn run<H, F>(self, handler: H) -> Result<(), ServerError>
    where
        H: Fn(Message) -> F + Send + Sync + 'static,
        F: Future<Output = Response> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let config = Arc::new(self.config);
        info!(address = %self.local_addr, "listening");

        loop {
            let (stream, peer_addr) = match self.listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    error!(error = %e, "failed to accept connection");
                    continue;
                }
            };

            debug!(peer = %peer_addr, "connection accepted");
            let handler = Arc::clone(&handler);
            let config = Arc::clone(&config);

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, peer_addr, &config, handler).await {
                    warn!(peer = %peer_addr, error = %e, "connection closed with error");
                }
            });
        }
    }
}

async fn handle_connection<H, F>(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    config: &Config,
    handler: Arc<H>,
) -> Result<(), std::io::Error>
where
    H: Fn(Message) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    let mut request = Request::with_limits(config.limits.clone());
    let mut buf = BytesMut::with_capacity(READ_BUF_SIZE);

    loop {
        buf.clear();
        match timeout(config.read_timeout(), stream.read_buf(&mut buf)).await {
            Ok(Ok(0)) => {
                debug!(peer = %peer_addr, "connection closed by peer");
                break;
            }
            Ok(Ok(_)) => request.ingest(&buf),
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                // An idle connection between requests just closes.
                if request.state() == State::Begin {
                    debug!(peer = %peer_addr, "idle connection timed out");
                    break;
                }
                request.abort(StatusCode::RequestTimeout);
            }
        }

        if !request.is_done() {
            continue;
        }

        let response = match request.message() {
            Some(message) => {
                debug!(
                    peer = %peer_addr,
                    method = %message.method(),
                    path = message.path(),
                    "dispatching request"
                );
                let keep_alive = message.is_keep_alive();
                handler(message).await.keep_alive(keep_alive)
            }
            None => {
                let status = request.status_code().unwrap_or(StatusCode::BadRequest);
                warn!(peer = %peer_addr, status = %status, "rejecting request");
                Response::from_status(status)
            }
        };

        let keep_alive = response.is_keep_alive();
        stream.write_all(&response.into_bytes()).await?;
        stream.flush().await?;

        if !keep_alive {
            debug!(peer = %peer_addr, "closing connection");
            break;
        }
        request.reset();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn spawn_echo(config: Config) -> SocketAddr {
        let server = Server::with_config(config).await.unwrap();
        let addr = server.local_addr();
        tokio::spawn(server.run(|message: Message| async move {
            Response::new(StatusCode::Ok).body(message.body.to_vec())
        }));
        addr
    }

    fn local() -> Config {
        Config {
            listen_addr: "127.0.0.1:0".to_owned(),
            ..Config::default()
        }
    }

    async fn read_response(stream: &mut TcpStream) -> String {
        let mut out = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&out);
            if let Some((head, body)) = text.split_once("\r\n\r\n") {
                let length: usize = head
                    .lines()
                    .find_map(|l| l.strip_prefix("Content-Length: "))
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(0);
                if body.len() >= length {
                    break;
                }
            }
        }
        String::from_utf8(out).unwrap()
    }

    #[tokio::test]
    async fn echoes_fragmented_body() {
        let addr = spawn_echo(local()).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        stream
            .write_all(b"POST /echo HTTP/1.1\r\nHost: x\r\nContent-Le")
            .await
            .unwrap();
        stream.flush().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        stream.write_all(b"ngth: 5\r\n\r\nhello").await.unwrap();

        let response = read_response(&mut stream).await;
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(response.ends_with("\r\n\r\nhello"));
    }

    #[tokio::test]
    async fn keep_alive_serves_second_request() {
        let addr = spawn_echo(local()).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        stream
            .write_all(b"PUT /a HTTP/1.1\r\nContent-Length: 3\r\n\r\none")
            .await
            .unwrap();
        assert!(read_response(&mut stream).await.ends_with("one"));

        stream
            .write_all(b"PUT /b HTTP/1.1\r\nContent-Length: 3\r\n\r\ntwo")
            .await
            .unwrap();
        assert!(read_response(&mut stream).await.ends_with("two"));
    }

    #[tokio::test]
    async fn rejected_request_gets_status_and_close() {
        let addr = spawn_echo(local()).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        stream
            .write_all(b"POST / HTTP/1.1\r\nHost: x\r\n\r\n")
            .await
            .unwrap();
        let response = read_response(&mut stream).await;
        assert!(response.starts_with("HTTP/1.1 411 Length Required\r\n"));
        assert!(response.contains("Connection: close\r\n"));
    }

    #[tokio::test]
    async fn stalled_request_times_out() {
        let config = Config {
            read_timeout_secs: 1,
            ..local()
        };
        let addr = spawn_echo(config).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        stream.write_all(b"GET / HTTP/1.1\r\nHost").await.unwrap();
        let response = read_response(&mut stream).await;
        assert!(response.starts_with("HTTP/1.1 408 Request Timeout\r\n"));
    }

    #[tokio::test]
    async fn bind_failure_is_reported() {
        let err = Server::bind("no-port-given").await.err().unwrap();
        assert!(matches!(err, ServerError::Bind { .. }));
    }
}
