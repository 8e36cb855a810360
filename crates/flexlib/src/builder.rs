//! SessionBuilder -- fluent builder for connecting a [`RadioSession`].
//!
//! Separates configuration from construction so that callers can set up
//! the target, client identity and timeouts before the TCP connection is
//! made.
//!
//! # Example
//!
//! ```no_run
//! use flexlib::builder::SessionBuilder;
//! use std::time::Duration;
//!
//! # async fn example() -> flexlib_core::Result<()> {
//! let session = SessionBuilder::new()
//!     .host("192.168.1.100")
//!     .program("Logger")
//!     .command_timeout(Duration::from_secs(3))
//!     .connect()
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::net::IpAddr;
use std::time::Duration;

use flexlib_core::error::{Error, Result};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::discovery::DiscoveredRadio;
use crate::session::{DEFAULT_TCP_PORT, RadioSession, SessionOptions, WanConnectParams};

/// Pre-connected async streams for running a session without opening a
/// TCP connection itself.
///
/// Pass any `AsyncRead`/`AsyncWrite` pair, for example the halves of a
/// TLS stream for SmartLink or of [`tokio::io::duplex()`] in tests. The
/// session wraps `tcp_read` in a `BufReader`; provide a raw reader.
pub struct FlexTransports {
    /// Read half of the command stream.
    pub tcp_read: Box<dyn AsyncRead + Unpin + Send + 'static>,
    /// Write half of the command stream.
    pub tcp_write: Box<dyn AsyncWrite + Unpin + Send + 'static>,
    /// Our address on the link, the client-IP fallback.
    pub local_ip: Option<IpAddr>,
    /// The radio's address, target of WAN UDP registration.
    pub remote_ip: Option<IpAddr>,
}

impl FlexTransports {
    pub fn new<R, W>(read: R, write: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        Self {
            tcp_read: Box::new(read),
            tcp_write: Box::new(write),
            local_ip: None,
            remote_ip: None,
        }
    }

    pub fn with_addresses(mut self, local_ip: Option<IpAddr>, remote_ip: Option<IpAddr>) -> Self {
        self.local_ip = local_ip;
        self.remote_ip = remote_ip;
        self
    }
}

/// Fluent builder for [`RadioSession`].
///
/// ```ignore
/// let session = SessionBuilder::new().host("192.168.1.100").connect().await?;
/// ```
#[derive(Debug, Clone)]
pub struct SessionBuilder {
    host: Option<String>,
    tcp_port: u16,
    wan: Option<WanConnectParams>,
    options: SessionOptions,
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionBuilder {
    pub fn new() -> Self {
        SessionBuilder {
            host: None,
            tcp_port: DEFAULT_TCP_PORT,
            wan: None,
            options: SessionOptions::default(),
        }
    }

    /// Set the radio's IP address or hostname.
    pub fn host(mut self, host: &str) -> Self {
        self.host = Some(host.to_string());
        self
    }

    /// Set the SmartSDR TCP command port (default: 4992).
    pub fn tcp_port(mut self, port: u16) -> Self {
        self.tcp_port = port;
        self
    }

    /// Target a radio found by discovery.
    pub fn radio(mut self, radio: &DiscoveredRadio) -> Self {
        self.host = Some(radio.ip.to_string());
        self.tcp_port = radio.port;
        self
    }

    /// Connect through SmartLink with these parameters.
    pub fn wan(mut self, params: WanConnectParams) -> Self {
        self.wan = Some(params);
        self
    }

    /// Replace all options at once.
    pub fn options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    /// Client program name (default: "flexlib").
    pub fn program(mut self, name: &str) -> Self {
        self.options.program = name.to_string();
        self
    }

    pub fn station(mut self, name: &str) -> Self {
        self.options.station = name.to_string();
        self
    }

    /// Register as a GUI client.
    pub fn gui(mut self, enable: bool) -> Self {
        self.options.is_gui = enable;
        self
    }

    /// Persistent GUI client id; a fresh one is generated otherwise.
    pub fn client_id(mut self, id: &str) -> Self {
        self.options.client_id = Some(id.to_string());
        self
    }

    /// Bind this non-GUI client to a GUI client.
    pub fn bind_client_id(mut self, id: &str) -> Self {
        self.options.bind_client_id = Some(id.to_string());
        self
    }

    /// First UDP port to try for streams (default: 4991).
    pub fn udp_port(mut self, port: u16) -> Self {
        self.options.udp_port = port;
        self
    }

    /// Command reply timeout (default: 2s).
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.options.command_timeout = timeout;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.options.connect_timeout = timeout;
        self
    }

    pub fn client_ip_timeout(mut self, timeout: Duration) -> Self {
        self.options.client_ip_timeout = timeout;
        self
    }

    pub fn ping_interval(mut self, interval: Duration) -> Self {
        self.options.ping_interval = interval;
        self
    }

    pub fn mtu(mut self, mtu: u16) -> Self {
        self.options.mtu = mtu;
        self
    }

    pub fn reduced_bandwidth_dax(mut self, enable: bool) -> Self {
        self.options.reduced_bandwidth_dax = enable;
        self
    }

    pub fn max_bind_attempts(mut self, attempts: u32) -> Self {
        self.options.max_bind_attempts = attempts;
        self
    }

    /// Build an unconnected session.
    pub fn build(self) -> RadioSession {
        RadioSession::new(self.options)
    }

    /// Connect and return the session once it reaches `ClientConnected`.
    ///
    /// Requires that [`host()`](Self::host) has been called (either
    /// directly or via [`radio()`](Self::radio)).
    pub async fn connect(self) -> Result<RadioSession> {
        let host = self.host.clone().ok_or_else(|| {
            Error::InvalidParameter(
                "host is required: call .host() or .radio() before .connect()".into(),
            )
        })?;
        let tcp_port = self.tcp_port;
        let wan = self.wan.clone();
        let session = self.build();
        match wan {
            Some(params) => session.connect_wan(&host, tcp_port, params).await?,
            None => session.connect(&host, tcp_port).await?,
        }
        Ok(session)
    }

    /// Connect over pre-connected streams.
    pub async fn connect_with_transport(self, transports: FlexTransports) -> Result<RadioSession> {
        let wan = self.wan.clone();
        let session = self.build();
        session.connect_with_transport(transports, wan).await?;
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_requires_host() {
        let err = SessionBuilder::new().connect().await.err();
        assert!(matches!(err, Some(Error::InvalidParameter(_))));
    }

    #[test]
    fn setters_reach_options() {
        let builder = SessionBuilder::new()
            .program("Logger")
            .gui(true)
            .udp_port(5000)
            .mtu(1200)
            .max_bind_attempts(3);
        assert_eq!(builder.options.program, "Logger");
        assert!(builder.options.is_gui);
        assert_eq!(builder.options.udp_port, 5000);
        assert_eq!(builder.options.mtu, 1200);
        assert_eq!(builder.options.max_bind_attempts, 3);
        assert_eq!(builder.tcp_port, DEFAULT_TCP_PORT);
    }
}
