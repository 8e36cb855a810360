//! VITA-49.0 packet decoder for SmartSDR UDP traffic.
//!
//! The radio frames every UDP stream, and its discovery broadcast, in
//! VITA-49.0 packets. Unlike a fixed 28-byte layout, the header here is
//! decoded from the indicator bits in the first word: stream id, class id,
//! integer and fractional timestamps and the trailer are each optional.
//! Everything is big-endian on the wire.
//!
//! This module is pure. It maps a datagram to a [`VitaHeader`] plus a
//! borrowed payload slice and never logs; callers decide what a rejected
//! packet means.

use flexlib_core::{Error, Result};

/// The first header word is the only mandatory part.
pub const MIN_PACKET_SIZE: usize = 4;

/// FlexRadio OUI carried in the class id.
pub const FLEX_OUI: u32 = 0x001C2D;

/// Information class code the radio puts in every class id.
pub const FLEX_INFO_CLASS: u16 = 0x534C;

/// VITA-49 packet type from bits 31-28 of the header word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    IfData,
    IfDataWithStream,
    ExtData,
    ExtDataWithStream,
    IfContext,
    ExtContext,
    Reserved(u8),
}

impl PacketType {
    fn from_bits(bits: u8) -> Self {
        match bits {
            0 => PacketType::IfData,
            1 => PacketType::IfDataWithStream,
            2 => PacketType::ExtData,
            3 => PacketType::ExtDataWithStream,
            4 => PacketType::IfContext,
            5 => PacketType::ExtContext,
            other => PacketType::Reserved(other),
        }
    }

    /// Data packets of type 1 and 3 carry a stream id, as do context
    /// packets.
    pub fn has_stream_id(self) -> bool {
        matches!(
            self,
            PacketType::IfDataWithStream
                | PacketType::ExtDataWithStream
                | PacketType::IfContext
                | PacketType::ExtContext
        )
    }
}

/// Stream class identified by the packet class code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamClass {
    /// Meter readings, 0x8002.
    Meter,
    /// Panadapter FFT bins, 0x8003.
    Panadapter,
    /// Waterfall lines, 0x8004.
    Waterfall,
    /// Opus-compressed remote audio, 0x8005.
    Opus,
    /// DAX I/Q at 24/48/96/192 ksps, 0x02E3..=0x02E6.
    DaxIq24,
    DaxIq48,
    DaxIq96,
    DaxIq192,
    /// DAX audio, stereo float32, 0x03E3.
    DaxAudio,
    /// Reduced-bandwidth DAX audio, mono int16, 0x0123.
    DaxReducedBandwidth,
    /// Discovery broadcast, 0xFFFF.
    Discovery,
    Unknown(u16),
}

impl StreamClass {
    pub fn from_code(code: u16) -> Self {
        match code {
            0x8002 => StreamClass::Meter,
            0x8003 => StreamClass::Panadapter,
            0x8004 => StreamClass::Waterfall,
            0x8005 => StreamClass::Opus,
            0x02E3 => StreamClass::DaxIq24,
            0x02E4 => StreamClass::DaxIq48,
            0x02E5 => StreamClass::DaxIq96,
            0x02E6 => StreamClass::DaxIq192,
            0x03E3 => StreamClass::DaxAudio,
            0x0123 => StreamClass::DaxReducedBandwidth,
            0xFFFF => StreamClass::Discovery,
            other => StreamClass::Unknown(other),
        }
    }

    /// I/Q sample rate for the DAX I/Q classes.
    pub fn iq_sample_rate(self) -> Option<u32> {
        match self {
            StreamClass::DaxIq24 => Some(24_000),
            StreamClass::DaxIq48 => Some(48_000),
            StreamClass::DaxIq96 => Some(96_000),
            StreamClass::DaxIq192 => Some(192_000),
            _ => None,
        }
    }
}

/// Class id words (present when the C bit is set).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassId {
    pub oui: u32,
    pub info_class_code: u16,
    pub packet_class_code: u16,
}

/// Decoded VITA-49 header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VitaHeader {
    pub packet_type: PacketType,
    pub class_id_present: bool,
    pub trailer_present: bool,
    /// Integer timestamp kind, bits 23-22.
    pub tsi: u8,
    /// Fractional timestamp kind, bits 21-20.
    pub tsf: u8,
    /// Rolling mod-16 packet counter, bits 19-16.
    pub packet_count: u8,
    /// Packet size in 32-bit words including the header.
    pub packet_size_words: u16,
    pub stream_id: Option<u32>,
    pub class_id: Option<ClassId>,
    pub timestamp_int: Option<u32>,
    pub timestamp_frac: Option<u64>,
    /// Header length in bytes.
    pub header_len: usize,
}

impl VitaHeader {
    pub fn stream_class(&self) -> StreamClass {
        match self.class_id {
            Some(class) => StreamClass::from_code(class.packet_class_code),
            None => StreamClass::Unknown(0),
        }
    }
}

/// A decoded packet: header plus the payload between header and trailer.
#[derive(Debug, PartialEq)]
pub struct VitaPacket<'a> {
    pub header: VitaHeader,
    pub payload: &'a [u8],
    pub trailer: Option<u32>,
}

fn word(data: &[u8], offset: usize) -> Result<u32> {
    data.get(offset..offset + 4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| {
            Error::Protocol(format!(
                "VITA-49 header truncated at offset {offset} ({} bytes)",
                data.len()
            ))
        })
}

/// Decode one datagram.
///
/// Rejects packets that are shorter than their indicated header, that
/// declare more words than the buffer holds, that carry no class id, or
/// whose OUI is not [`FLEX_OUI`]. Bytes beyond the declared packet size
/// are ignored.
pub fn parse_packet(data: &[u8]) -> Result<VitaPacket<'_>> {
    if data.len() < MIN_PACKET_SIZE {
        return Err(Error::Protocol(format!(
            "VITA-49 packet too short: {} bytes",
            data.len()
        )));
    }

    let header_word = word(data, 0)?;
    let packet_type = PacketType::from_bits(((header_word >> 28) & 0x0F) as u8);
    let class_id_present = (header_word >> 27) & 1 == 1;
    let trailer_present = (header_word >> 26) & 1 == 1;
    let tsi = ((header_word >> 22) & 0x03) as u8;
    let tsf = ((header_word >> 20) & 0x03) as u8;
    let packet_count = ((header_word >> 16) & 0x0F) as u8;
    let packet_size_words = (header_word & 0xFFFF) as u16;

    let packet_len = packet_size_words as usize * 4;
    if packet_len > data.len() {
        return Err(Error::Protocol(format!(
            "VITA-49 packet size ({packet_size_words} words) exceeds buffer length ({} bytes)",
            data.len()
        )));
    }
    let data = &data[..packet_len];

    let mut offset = 4;
    let stream_id = if packet_type.has_stream_id() {
        let id = word(data, offset)?;
        offset += 4;
        Some(id)
    } else {
        None
    };

    let class_id = if class_id_present {
        let upper = word(data, offset)?;
        let lower = word(data, offset + 4)?;
        offset += 8;
        Some(ClassId {
            oui: upper & 0x00FF_FFFF,
            info_class_code: (lower >> 16) as u16,
            packet_class_code: (lower & 0xFFFF) as u16,
        })
    } else {
        None
    };

    match class_id {
        Some(class) if class.oui == FLEX_OUI => {}
        Some(class) => {
            return Err(Error::Protocol(format!(
                "VITA-49 OUI 0x{:06X} is not 0x{FLEX_OUI:06X}",
                class.oui
            )));
        }
        None => return Err(Error::Protocol("VITA-49 packet has no class id".into())),
    }

    let timestamp_int = if tsi != 0 {
        let ts = word(data, offset)?;
        offset += 4;
        Some(ts)
    } else {
        None
    };

    let timestamp_frac = if tsf != 0 {
        let hi = word(data, offset)? as u64;
        let lo = word(data, offset + 4)? as u64;
        offset += 8;
        Some((hi << 32) | lo)
    } else {
        None
    };

    let trailer_len = if trailer_present { 4 } else { 0 };
    if offset + trailer_len > data.len() {
        return Err(Error::Protocol(format!(
            "VITA-49 packet size ({packet_size_words} words) smaller than its header"
        )));
    }
    let payload_end = data.len() - trailer_len;
    let trailer = if trailer_present {
        Some(word(data, payload_end)?)
    } else {
        None
    };

    Ok(VitaPacket {
        header: VitaHeader {
            packet_type,
            class_id_present,
            trailer_present,
            tsi,
            tsf,
            packet_count,
            packet_size_words,
            stream_id,
            class_id,
            timestamp_int,
            timestamp_frac,
            header_len: offset,
        },
        payload: &data[offset..payload_end],
        trailer,
    })
}

/// One meter reading from a meter packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeterReading {
    pub meter_id: u16,
    /// Raw reading; scale with the meter's units.
    pub value: i16,
}

/// Split a meter payload into `(u16 id, i16 value)` readings.
pub fn parse_meter_payload(payload: &[u8]) -> Result<Vec<MeterReading>> {
    if payload.len() % 4 != 0 {
        return Err(Error::Protocol(format!(
            "meter payload length {} is not divisible by 4",
            payload.len()
        )));
    }

    Ok(payload
        .chunks_exact(4)
        .map(|c| MeterReading {
            meter_id: u16::from_be_bytes([c[0], c[1]]),
            value: i16::from_be_bytes([c[2], c[3]]),
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
