//! Echo server: replies to every completed request with its body.
//!
//! ```text
//! RUST_LOG=rttp_ingest=trace cargo run --example echo
//! curl -d 'hello' http://127.0.0.1:8080/
//! ```

use rttp_ingest::config::Config;
use rttp_ingest::http::{Message, Response, StatusCode};
use rttp_ingest::server::Server;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_target(false)
        .init();

    let config = Config::load()?;
    let server = Server::with_config(config).await?;
    println!("Listening on http://{}", server.local_addr());

    server
        .run(|message: Message| async move {
            let content_type = message
                .headers
                .get("content-type")
                .unwrap_or("application/octet-stream")
                .to_owned();
            Response::new(StatusCode::Ok)
                .header("Content-Type", content_type)
                .header("X-Echo-Path", message.path())
                .body(message.body.to_vec())
        })
        .await?;

    Ok(())
}
