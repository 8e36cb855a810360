//! Socket plumbing for flexlib.
//!
//! - [`tcp::connect_with_timeout`]: the SmartSDR command channel
//! - [`UdpTransport`]: VITA-49 stream reception, WAN registration, and
//!   discovery broadcasts

pub mod tcp;
pub mod udp;

pub use tcp::{DEFAULT_CONNECT_TIMEOUT, connect_with_timeout};
pub use udp::UdpTransport;
