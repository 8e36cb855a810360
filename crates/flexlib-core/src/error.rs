//! Error types for flexlib.
//!
//! All fallible operations across the library return [`Result<T>`], which
//! uses [`Error`] as the error type. Decode failures inside the status and
//! stream pipelines are logged and skipped where they occur; only session
//! level operations (connect, send, disconnect) hand these errors back to
//! the caller.

/// The error type for all flexlib operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A transport-level error (TCP socket, UDP socket).
    #[error("transport error: {0}")]
    Transport(String),

    /// A protocol-level error (malformed status line, bad VITA-49 header).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Timed out waiting for the radio.
    #[error("timeout waiting for response")]
    Timeout,

    /// An invalid parameter was passed to a command builder or setter.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// No session is connected.
    #[error("not connected")]
    NotConnected,

    /// `connect` was called on a session that is already connected.
    #[error("already connected")]
    AlreadyConnected,

    /// The connection to the radio was lost while an operation was pending.
    #[error("connection lost")]
    ConnectionLost,

    /// Every UDP port tried during setup was unavailable.
    #[error("UDP bind failed after {attempts} attempts: {message}")]
    BindFailed {
        /// Number of ports tried.
        attempts: u32,
        /// The last bind error reported by the OS.
        message: String,
    },

    /// The radio answered a command with a non-zero result code.
    #[error("command failed with code 0x{code:08X}: {message}")]
    CommandFailed {
        /// SmartSDR result code.
        code: u32,
        /// Reply text accompanying the code.
        message: String,
    },

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_protocol() {
        let e = Error::Protocol("bad header".into());
        assert_eq!(e.to_string(), "protocol error: bad header");
    }

    #[test]
    fn error_display_bind_failed() {
        let e = Error::BindFailed {
            attempts: 20,
            message: "address in use".into(),
        };
        assert_eq!(
            e.to_string(),
            "UDP bind failed after 20 attempts: address in use"
        );
    }

    #[test]
    fn error_display_command_failed() {
        let e = Error::CommandFailed {
            code: 0x5000_0015,
            message: "Invalid slice".into(),
        };
        assert_eq!(
            e.to_string(),
            "command failed with code 0x50000015: Invalid slice"
        );
    }

    #[test]
    fn error_display_misuse() {
        assert_eq!(Error::NotConnected.to_string(), "not connected");
        assert_eq!(Error::AlreadyConnected.to_string(), "already connected");
    }

    #[test]
    fn error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use");
        let e: Error = io_err.into();
        assert!(matches!(e, Error::Io(_)));
        assert!(e.to_string().contains("in use"));
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Error>();
    }
}
