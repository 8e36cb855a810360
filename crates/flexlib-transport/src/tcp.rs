//! TCP connection setup for the SmartSDR command channel.
//!
//! The command channel is a plain line-oriented TCP stream on port 4992.
//! This module only establishes the connection; line framing and the
//! read/write split belong to the session.

use std::time::Duration;

use flexlib_core::error::{Error, Result};
use tokio::net::TcpStream;

/// Default connection timeout (5 seconds).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Connect to a `host:port` endpoint, giving up after `timeout`.
///
/// Nagle is disabled on success: commands are short and latency-sensitive.
pub async fn connect_with_timeout(addr: &str, timeout: Duration) -> Result<TcpStream> {
    tracing::debug!(
        addr = %addr,
        timeout_ms = timeout.as_millis(),
        "Connecting to TCP endpoint"
    );

    let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| {
            tracing::error!(addr = %addr, "TCP connection timed out");
            Error::Timeout
        })?
        .map_err(|e| {
            tracing::error!(addr = %addr, error = %e, "TCP connection failed");
            map_connect_error(e, addr)
        })?;

    if let Err(e) = stream.set_nodelay(true) {
        tracing::warn!(addr = %addr, error = %e, "Failed to set TCP_NODELAY");
    }

    tracing::info!(addr = %addr, "TCP connection established");
    Ok(stream)
}

fn map_connect_error(e: std::io::Error, addr: &str) -> Error {
    match e.kind() {
        std::io::ErrorKind::ConnectionRefused => {
            Error::Transport(format!("connection refused by {addr}"))
        }
        std::io::ErrorKind::TimedOut => Error::Timeout,
        _ => Error::Io(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn connect_to_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let accept = tokio::spawn(async move { listener.accept().await.unwrap() });
        let stream = connect_with_timeout(&addr, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(stream.peer_addr().unwrap().to_string(), addr);
        accept.await.unwrap();
    }

    #[tokio::test]
    async fn connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let result = connect_with_timeout(&addr, Duration::from_secs(2)).await;
        assert!(result.is_err());
    }
}
