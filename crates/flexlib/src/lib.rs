//! FlexRadio SmartSDR client library.
//!
//! This crate connects to FLEX-6000/8000 series software-defined radios,
//! mirrors their internal state, and streams sample data from them. It
//! provides:
//!
//! - **Session** ([`session`]) -- the connection state machine: handshake,
//!   bootstrap, client-IP rendezvous, UDP bind and keep-alive.
//! - **Builder** ([`builder`]) -- fluent [`SessionBuilder`] and the
//!   [`FlexTransports`] hook for pre-connected streams.
//! - **Object model** ([`dispatch`], [`objects`], [`registry`]) -- status
//!   routing into typed, change-notifying mirrors of slices, panadapters,
//!   waterfalls, streams, meters and the radio-wide singletons.
//! - **Wire codec** ([`codec`], [`keyvalue`], [`tokens`]) -- line
//!   classification, key/value tokenizing, command builders and the
//!   wire-name tables.
//! - **VITA-49** ([`vita49`]) and **streams** ([`streams`]) -- datagram
//!   decoding and the per-stream frame accumulators.
//! - **Discovery** ([`discovery`]) -- LAN radio announcements.
//! - **SmartLink** ([`smartlink`]) -- relay server message decoding.
//!
//! # Architecture
//!
//! The radio splits its traffic over two channels:
//! - **TCP** for commands (`C<seq>|<cmd>\n`), replies, status and messages
//! - **UDP** for VITA-49 datagrams: meters, spectra, DAX audio and I/Q
//!
//! The [`RadioSession`] runs one task per channel. The TCP task applies
//! status lines to the [`ObjectModel`] in arrival order; the UDP task hands
//! datagrams to the owning stream object, which reassembles frames and
//! delivers them to its consumer. Changes are published as
//! [`RadioEvent`](flexlib_core::RadioEvent)s on a broadcast channel.
//!
//! # Example
//!
//! ```no_run
//! use flexlib::{SessionBuilder, discovery};
//! use std::time::Duration;
//!
//! # async fn example() -> flexlib_core::Result<()> {
//! let radios = discovery::discover(Duration::from_secs(3)).await?;
//! if let Some(radio) = radios.first() {
//!     let session = SessionBuilder::new().radio(radio).connect().await?;
//!     let mut events = session.subscribe();
//!     while let Ok(event) = events.recv().await {
//!         println!("{event:?}");
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod codec;
pub mod commands;
pub mod discovery;
pub mod dispatch;
pub mod keyvalue;
pub mod objects;
pub mod registry;
pub mod session;
pub mod smartlink;
pub mod streams;
pub mod tokens;
pub mod vita49;

pub use builder::{FlexTransports, SessionBuilder};
pub use discovery::{DiscoveredRadio, DiscoveryEvent, DiscoveryListener, DiscoveryOptions};
pub use dispatch::ObjectModel;
pub use session::{RadioSession, SessionOptions, WanConnectParams};
pub use smartlink::{SmartLinkMessage, WanRadio, parse_smartlink_message};
