//! Test doubles for flexlib.
//!
//! - [`MockRadio`]: a scripted SmartSDR TCP endpoint for session tests
//! - [`VitaPacketBuilder`] and the [`vita`] payload helpers: VITA-49
//!   datagrams for decoder and stream tests

pub mod mock_radio;
pub mod vita;

pub use mock_radio::{MockRadio, MockRadioConfig};
pub use vita::VitaPacketBuilder;
