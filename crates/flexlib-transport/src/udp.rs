//! UDP socket wrapper for VITA-49 streams and discovery.
//!
//! [`UdpTransport`] wraps a [`tokio::net::UdpSocket`] with error mapping
//! and logging consistent with the rest of flexlib. The session binds one
//! of these for stream data using [`UdpTransport::bind_scan`], which walks
//! forward from the advertised port until a bind succeeds.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use flexlib_core::error::{Error, Result};
use tokio::net::UdpSocket;

/// A bound UDP socket.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    local_addr: SocketAddr,
}

impl UdpTransport {
    /// Bind to a local `host:port` address.
    pub async fn bind(addr: &str) -> Result<Self> {
        tracing::debug!(addr = %addr, "Binding UDP socket");

        let socket = UdpSocket::bind(addr).await.map_err(|e| {
            tracing::debug!(addr = %addr, error = %e, "Failed to bind UDP socket");
            Error::Io(e)
        })?;
        let local_addr = socket.local_addr().map_err(Error::Io)?;

        tracing::debug!(local_addr = %local_addr, "UDP socket bound");
        Ok(Self { socket, local_addr })
    }

    /// Bind on `ip`, trying `start_port`, `start_port + 1`, ... until a bind
    /// succeeds or `max_attempts` ports have been tried.
    ///
    /// A `start_port` of 0 asks the OS for any free port and needs only one
    /// attempt.
    pub async fn bind_scan(ip: IpAddr, start_port: u16, max_attempts: u32) -> Result<Self> {
        let mut last_error = String::from("no ports tried");
        let mut attempts = 0;

        for offset in 0..max_attempts {
            let Some(port) = u16::try_from(offset)
                .ok()
                .and_then(|o| start_port.checked_add(o))
            else {
                break;
            };
            attempts += 1;

            match Self::bind(&SocketAddr::new(ip, port).to_string()).await {
                Ok(transport) => {
                    if offset > 0 {
                        tracing::debug!(
                            requested = start_port,
                            bound = transport.local_addr.port(),
                            "UDP port scan moved past busy ports"
                        );
                    }
                    return Ok(transport);
                }
                Err(e) => last_error = e.to_string(),
            }
        }

        tracing::error!(
            start_port = start_port,
            attempts = attempts,
            error = %last_error,
            "UDP bind scan exhausted"
        );
        Err(Error::BindFailed {
            attempts,
            message: last_error,
        })
    }

    /// Bind to a specific port on all IPv4 interfaces.
    pub async fn bind_port(port: u16) -> Result<Self> {
        Self::bind(&SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port).to_string()).await
    }

    /// The local address this socket is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Send one datagram to `addr`.
    pub async fn send_to(&self, data: &[u8], addr: SocketAddr) -> Result<()> {
        tracing::trace!(
            local = %self.local_addr,
            remote = %addr,
            bytes = data.len(),
            "Sending datagram"
        );
        self.socket.send_to(data, addr).await.map_err(|e| {
            tracing::error!(remote = %addr, error = %e, "Failed to send datagram");
            Error::Io(e)
        })?;
        Ok(())
    }

    /// Wait for the next datagram with no deadline.
    pub async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)> {
        self.socket.recv_from(buf).await.map_err(Error::Io)
    }

    /// Wait up to `timeout` for the next datagram.
    ///
    /// Returns [`Error::Timeout`] if nothing arrives in time.
    pub async fn recv_from_timeout(
        &self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<(usize, SocketAddr)> {
        match tokio::time::timeout(timeout, self.socket.recv_from(buf)).await {
            Ok(Ok((n, src))) => {
                tracing::trace!(local = %self.local_addr, remote = %src, bytes = n, "Received datagram");
                Ok((n, src))
            }
            Ok(Err(e)) => Err(Error::Io(e)),
            Err(_) => Err(Error::Timeout),
        }
    }

    /// Enable or disable broadcast on this socket.
    pub fn set_broadcast(&self, enable: bool) -> Result<()> {
        self.socket.set_broadcast(enable).map_err(Error::Io)
    }
}
