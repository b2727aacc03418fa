/*
    lib.rs - TCP front end

    One request per connection: the client writes a JSON request and
    half-closes; the server replies and closes. Requests larger than the
    configured cap are rejected with a plain-text notice before any
    decoding happens.
*/

use anyhow::Result;
use shardchat_core::{Config, Dispatcher, Stores};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{info, warn};

const OVERSIZED_REPLY: &[u8] = b"Query is too big";

/// Open the stores and serve on the configured address until the task
/// is cancelled.
pub async fn run(config: Config) -> Result<()> {
    let stores = Arc::new(Stores::open(&config.store)?);
    let dispatcher = Arc::new(Dispatcher::new(stores));
    let listener = TcpListener::bind(config.server.bind_address).await?;
    serve(listener, dispatcher, config.server.max_request_bytes).await
}

/// Accept loop over an already-bound listener. Split out so tests can
/// bind an ephemeral port themselves.
pub async fn serve(
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
    max_request_bytes: usize,
) -> Result<()> {
    info!(addr = %listener.local_addr()?, "listening");
    loop {
        let (stream, peer) = listener.accept().await?;
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, dispatcher, max_request_bytes).await {
                warn!(peer = %peer, error = %e, "connection failed");
            }
        });
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    dispatcher: Arc<Dispatcher>,
    max_request_bytes: usize,
) -> Result<()> {
    let mut request = Vec::with_capacity(512);
    let mut chunk = [0u8; 1024];
    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        request.extend_from_slice(&chunk[..n]);
        if request.len() > max_request_bytes {
            stream.write_all(OVERSIZED_REPLY).await?;
            stream.shutdown().await?;
            return Ok(());
        }
    }

    // dispatching touches the filesystem, keep it off the reactor
    let reply = tokio::task::spawn_blocking(move || dispatcher.handle_raw(&request)).await?;

    stream.write_all(reply.as_bytes()).await?;
    stream.shutdown().await?;
    Ok(())
}
