pub mod connection;
pub mod framing;

use crate::server::Server;
use anyhow::Context;
use connection::{Connection, ConnectionId, Outbound};
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{lookup_host, TcpListener, TcpStream};
use tokio::sync::mpsc;

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
const READ_CHUNK: usize = 4096;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

pub async fn listen(port: u16) -> anyhow::Result<TcpListener> {
    TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("could not listen on port {port}"))
}

/// The accept loop: one accept in flight at a time, each accepted socket
/// handed off to its own session task. An accept failure ends the loop —
/// the server keeps serving existing connections but no new ones arrive.
pub async fn accept_loop(listener: TcpListener, server: Arc<Server>) {
    loop {
        let (socket, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(error) => {
                tracing::error!(?error, "accept failed, no longer accepting connections");
                return;
            }
        };
        let id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
        tokio::spawn(handle_socket(socket, peer, id, Arc::clone(&server)));
    }
}

/// Dials a server: resolve (preferring IPv4, falling back to a literal IP
/// when resolution fails), connect with a 3 second cap, and disable send
/// batching — a latency-sensitive game cannot sit behind Nagle.
pub async fn connect(host: &str, port: u16) -> anyhow::Result<TcpStream> {
    let address = resolve(host, port).await?;
    let stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(address))
        .await
        .with_context(|| format!("timed out connecting to {address}"))?
        .with_context(|| format!("could not connect to {address}"))?;
    stream.set_nodelay(true).context("could not disable send batching")?;
    Ok(stream)
}

async fn resolve(host: &str, port: u16) -> anyhow::Result<SocketAddr> {
    match lookup_host((host, port)).await {
        Ok(addresses) => {
            let mut fallback = None;
            for address in addresses {
                if address.is_ipv4() {
                    return Ok(address);
                }
                fallback.get_or_insert(address);
            }
            fallback.ok_or_else(|| anyhow::anyhow!("no address found for {host}"))
        }
        Err(_) => {
            let ip: IpAddr = host
                .parse()
                .with_context(|| format!("could not resolve {host}"))?;
            Ok(SocketAddr::new(ip, port))
        }
    }
}

async fn handle_socket(socket: TcpStream, peer: SocketAddr, id: ConnectionId, server: Arc<Server>) {
    if let Err(error) = socket.set_nodelay(true) {
        tracing::warn!(?error, id, "could not disable send batching");
    }
    let (read_half, write_half) = socket.into_split();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let conn = Arc::new(Connection::new(id, peer, outbound_tx));
    let writer = tokio::spawn(write_loop(write_half, outbound_rx));

    tracing::debug!(id, %peer, "client connected");
    server.register(&conn).await;

    // A register that already closed the connection (capacity rejection)
    // never arms the receive loop.
    if !conn.is_closed() {
        receive_loop(read_half, &conn, &server).await;
        server.on_disconnect(&conn).await;
    }

    conn.close();
    // Let queued writes flush; the writer ends at the Close marker.
    let _ = writer.await;
}

/// One receive at a time. A zero-length read is a disconnect; the session
/// layer decides after every delivery whether to arm the next read —
/// there is no implicit re-arm.
async fn receive_loop(mut read_half: OwnedReadHalf, conn: &Arc<Connection>, server: &Arc<Server>) {
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        match read_half.read(&mut chunk).await {
            Ok(0) => {
                conn.set_error("connection closed by peer");
                return;
            }
            Ok(count) => {
                conn.append_received(&String::from_utf8_lossy(&chunk[..count]));
                if !server.on_data(conn).await {
                    return;
                }
            }
            Err(error) => {
                conn.set_error(format!("receive failed: {error}"));
                return;
            }
        }
    }
}

/// Drains the outbound queue onto the socket. A failed write closes the
/// stream and stops the loop; the peer finds out through its next receive,
/// the sender never does — send is fire-and-forget by contract.
async fn write_loop(mut write_half: OwnedWriteHalf, mut outbound: mpsc::UnboundedReceiver<Outbound>) {
    while let Some(message) = outbound.recv().await {
        match message {
            Outbound::Data(text) => {
                if write_half.write_all(text.as_bytes()).await.is_err() {
                    return;
                }
            }
            Outbound::Close => {
                let _ = write_half.shutdown().await;
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolve_carries_the_requested_port() {
        let address = resolve("localhost", 4000).await.unwrap();
        assert_eq!(address.port(), 4000);
    }

    #[tokio::test]
    async fn resolve_accepts_literal_addresses() {
        let address = resolve("127.0.0.1", 11000).await.unwrap();
        assert_eq!(address, "127.0.0.1:11000".parse().unwrap());
    }

    #[tokio::test]
    async fn resolve_rejects_garbage_hosts() {
        assert!(resolve("not a host name", 1).await.is_err());
    }

    #[tokio::test]
    async fn connect_fails_fast_on_refused_port() {
        // Bind and drop a listener to get a port nothing listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        assert!(connect("127.0.0.1", port).await.is_err());
    }
}
