//! Asynchronous radio event types.
//!
//! Events are published through a [`tokio::sync::broadcast`] channel after
//! the guarded write that caused them has completed. Connection state is
//! the exception: it lives in a single `watch` channel owned by the
//! session, and [`RadioEvent::ConnectionStateChanged`] merely mirrors it.

use std::fmt;

use crate::version::FirmwareVersion;

/// The kinds of object the radio reports status for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Slice,
    Panadapter,
    Waterfall,
    IqStream,
    AudioStream,
    MicAudioStream,
    TxAudioStream,
    OpusStream,
    Transverter,
    Meter,
    Transmit,
    Interlock,
    Gps,
    Atu,
    Wan,
    Waveform,
    Profile,
    Radio,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ObjectKind::Slice => "slice",
            ObjectKind::Panadapter => "panadapter",
            ObjectKind::Waterfall => "waterfall",
            ObjectKind::IqStream => "iq stream",
            ObjectKind::AudioStream => "audio stream",
            ObjectKind::MicAudioStream => "mic audio stream",
            ObjectKind::TxAudioStream => "tx audio stream",
            ObjectKind::OpusStream => "opus stream",
            ObjectKind::Transverter => "transverter",
            ObjectKind::Meter => "meter",
            ObjectKind::Transmit => "transmit",
            ObjectKind::Interlock => "interlock",
            ObjectKind::Gps => "gps",
            ObjectKind::Atu => "atu",
            ObjectKind::Wan => "wan",
            ObjectKind::Waveform => "waveform",
            ObjectKind::Profile => "profile",
            ObjectKind::Radio => "radio",
        };
        f.write_str(name)
    }
}

/// Session connection state. The session's `watch` channel is the only
/// authoritative copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    /// TCP handshake done, bootstrap commands in flight.
    TcpConnected,
    /// The VITA-49 receive socket is bound.
    UdpBound { port: u16 },
    /// Registration finished; streams and pings are running.
    ClientConnected,
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Explicit `disconnect()` or an orderly close by the radio.
    Normal,
    /// Setup or the connection failed; carries the failure text.
    Error(String),
    /// No UDP port could be bound for the VITA-49 stream.
    BindFailed {
        /// Number of ports tried.
        attempts: u32,
        /// The last bind error reported by the OS.
        message: String,
    },
}

/// Severity bits of an `M` message line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSeverity {
    Info,
    Warning,
    Error,
    Fatal,
}

impl MessageSeverity {
    /// Severity lives in bits 24-25 of the message number.
    pub fn from_message_number(number: u32) -> Self {
        match (number >> 24) & 0x03 {
            0 => MessageSeverity::Info,
            1 => MessageSeverity::Warning,
            2 => MessageSeverity::Error,
            _ => MessageSeverity::Fatal,
        }
    }
}

/// An event published by a radio session.
#[derive(Debug, Clone)]
pub enum RadioEvent {
    /// The session moved to a new connection state.
    ConnectionStateChanged(ConnectionState),

    /// The session ended.
    Disconnected { reason: DisconnectReason },

    /// The radio firmware is newer than this library supports. The session
    /// continues regardless.
    DowngradeRequired {
        radio: FirmwareVersion,
        supported: FirmwareVersion,
    },

    /// A collection object finished initializing. Fires once per lifetime.
    ObjectAdded { kind: ObjectKind, id: u32 },

    /// A collection object was removed by the radio or by teardown.
    ObjectRemoved { kind: ObjectKind, id: u32 },

    /// Fields of an object changed. `id` is `None` for session singletons;
    /// `properties` holds the wire names of the fields that were written.
    PropertiesChanged {
        kind: ObjectKind,
        id: Option<u32>,
        properties: Vec<&'static str>,
    },

    /// Another client connected to the radio.
    ClientAdded {
        handle: u32,
        program: String,
        station: String,
    },

    /// A client disconnected from the radio.
    ClientRemoved { handle: u32 },

    /// A text message pushed by the radio (`M` line).
    Message {
        severity: MessageSeverity,
        text: String,
    },

    /// Packets or frames were skipped on a stream.
    PacketsLost { stream_id: u32, lost: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_from_message_number() {
        assert_eq!(
            MessageSeverity::from_message_number(0x0000_0001),
            MessageSeverity::Info
        );
        assert_eq!(
            MessageSeverity::from_message_number(0x1000_0002),
            MessageSeverity::Info
        );
        assert_eq!(
            MessageSeverity::from_message_number(0x0100_0000),
            MessageSeverity::Warning
        );
        assert_eq!(
            MessageSeverity::from_message_number(0x0200_0000),
            MessageSeverity::Error
        );
        assert_eq!(
            MessageSeverity::from_message_number(0x0300_0000),
            MessageSeverity::Fatal
        );
    }

    #[test]
    fn default_state_is_disconnected() {
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
    }

    #[test]
    fn kind_display() {
        assert_eq!(ObjectKind::IqStream.to_string(), "iq stream");
        assert_eq!(ObjectKind::Profile.to_string(), "profile");
    }
}
