//! flexlib-core: error, event, and shared-state types for flexlib.
//!
//! This crate carries no I/O. The protocol crate, the transport crate, and
//! the test harness all build on these types.
//!
//! # Key types
//!
//! - [`Error`] / [`Result`] -- error handling
//! - [`RadioEvent`] -- asynchronous change notifications
//! - [`ConnectionState`] -- the session state published through `watch`
//! - [`Guarded`] -- lock wrapper for fields shared with network tasks
//! - [`FirmwareVersion`] -- negotiated radio version

pub mod error;
pub mod events;
pub mod guarded;
pub mod version;

pub use error::{Error, Result};
pub use events::{ConnectionState, DisconnectReason, MessageSeverity, ObjectKind, RadioEvent};
pub use guarded::Guarded;
pub use version::FirmwareVersion;
