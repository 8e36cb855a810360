//! VITA-49 packet builders.
//!
//! [`VitaPacketBuilder`] produces datagrams the way the radio frames them:
//! extension data with stream id, a FlexRadio class id, integer and
//! fractional timestamps, and an optional trailer. The payload helpers
//! build the type-specific payloads that ride inside.
//!
//! # Example
//!
//! ```
//! use flexlib_test_harness::vita::{VitaPacketBuilder, panadapter_payload};
//!
//! let bins: Vec<u16> = (0..60).collect();
//! let pkt = VitaPacketBuilder::new(0x8003)
//!     .stream_id(0x4000_0000)
//!     .payload(&panadapter_payload(0, 100, 7, &bins))
//!     .build();
//! assert_eq!(pkt.len() % 4, 0);
//! ```

use bytes::{BufMut, BytesMut};

/// FlexRadio OUI.
pub const FLEX_OUI: u32 = 0x001C2D;
/// FlexRadio information class code.
pub const FLEX_INFO_CLASS: u16 = 0x534C;

/// Builder for a single VITA-49 datagram.
#[derive(Debug, Clone)]
pub struct VitaPacketBuilder {
    packet_type: u8,
    class_id: bool,
    oui: u32,
    info_class: u16,
    class_code: u16,
    stream_id: u32,
    packet_count: u8,
    timestamps: Option<(u32, u64)>,
    trailer: Option<u32>,
    payload: Vec<u8>,
}

impl VitaPacketBuilder {
    /// Extension data with stream id, FlexRadio class id, timestamps zero.
    pub fn new(class_code: u16) -> Self {
        Self {
            packet_type: 0x3,
            class_id: true,
            oui: FLEX_OUI,
            info_class: FLEX_INFO_CLASS,
            class_code,
            stream_id: 0,
            packet_count: 0,
            timestamps: Some((0, 0)),
            trailer: None,
            payload: Vec::new(),
        }
    }

    pub fn packet_type(mut self, packet_type: u8) -> Self {
        self.packet_type = packet_type & 0x0F;
        self
    }

    pub fn stream_id(mut self, stream_id: u32) -> Self {
        self.stream_id = stream_id;
        self
    }

    /// Packet counter; only the low four bits are encoded.
    pub fn packet_count(mut self, count: u8) -> Self {
        self.packet_count = count & 0x0F;
        self
    }

    pub fn oui(mut self, oui: u32) -> Self {
        self.oui = oui;
        self
    }

    pub fn without_class_id(mut self) -> Self {
        self.class_id = false;
        self
    }

    pub fn timestamps(mut self, integer: u32, fractional: u64) -> Self {
        self.timestamps = Some((integer, fractional));
        self
    }

    pub fn without_timestamps(mut self) -> Self {
        self.timestamps = None;
        self
    }

    pub fn trailer(mut self, trailer: u32) -> Self {
        self.trailer = Some(trailer);
        self
    }

    /// Payload bytes; zero-padded to a word boundary on build.
    pub fn payload(mut self, payload: &[u8]) -> Self {
        self.payload = payload.to_vec();
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let has_stream_id = matches!(self.packet_type, 1 | 3 | 4 | 5);
        let padded = self.payload.len().div_ceil(4) * 4;
        let words = 1
            + usize::from(has_stream_id)
            + if self.class_id { 2 } else { 0 }
            + if self.timestamps.is_some() { 3 } else { 0 }
            + padded / 4
            + usize::from(self.trailer.is_some());

        let mut header: u32 = (self.packet_type as u32) << 28;
        if self.class_id {
            header |= 1 << 27;
        }
        if self.trailer.is_some() {
            header |= 1 << 26;
        }
        if self.timestamps.is_some() {
            // TSI = UTC, TSF = sample count
            header |= 0x1 << 22;
            header |= 0x1 << 20;
        }
        header |= (self.packet_count as u32 & 0x0F) << 16;
        header |= words as u32 & 0xFFFF;

        let mut buf = BytesMut::with_capacity(words * 4);
        buf.put_u32(header);
        if has_stream_id {
            buf.put_u32(self.stream_id);
        }
        if self.class_id {
            buf.put_u32(self.oui & 0x00FF_FFFF);
            buf.put_u32(((self.info_class as u32) << 16) | self.class_code as u32);
        }
        if let Some((integer, fractional)) = self.timestamps {
            buf.put_u32(integer);
            buf.put_u64(fractional);
        }
        buf.put_slice(&self.payload);
        buf.put_bytes(0, padded - self.payload.len());
        if let Some(trailer) = self.trailer {
            buf.put_u32(trailer);
        }
        buf.to_vec()
    }
}

/// Current-layout panadapter payload: `u16 start, u16 count, u16 bin size,
/// u16 total, u32 frame` followed by big-endian bins.
pub fn panadapter_payload(start: u16, total: u16, frame_index: u32, bins: &[u16]) -> Vec<u8> {
    let mut buf = BytesMut::new();
    buf.put_u16(start);
    buf.put_u16(bins.len() as u16);
    buf.put_u16(2);
    buf.put_u16(total);
    buf.put_u32(frame_index);
    for bin in bins {
        buf.put_u16(*bin);
    }
    buf.to_vec()
}

/// Pre-2.3 panadapter payload: `u32 start, u32 count, u32 bin size,
/// u32 frame` followed by big-endian bins.
pub fn panadapter_payload_legacy(start: u32, frame_index: u32, bins: &[u16]) -> Vec<u8> {
    let mut buf = BytesMut::new();
    buf.put_u32(start);
    buf.put_u32(bins.len() as u32);
    buf.put_u32(2);
    buf.put_u32(frame_index);
    for bin in bins {
        buf.put_u16(*bin);
    }
    buf.to_vec()
}

/// Fields of a waterfall tile header.
#[derive(Debug, Clone, Copy, Default)]
pub struct WaterfallTile {
    /// First bin frequency in Hz; encoded as 20-bit fixed point.
    pub first_bin_freq_hz: f64,
    /// Bin bandwidth in Hz; encoded as 20-bit fixed point.
    pub bin_bandwidth_hz: f64,
    pub line_duration_ms: u32,
    pub height: u16,
    pub time_code: u32,
    pub auto_black_level: u32,
    pub total_bins: u16,
    pub first_bin_index: u16,
}

/// Current-layout waterfall payload (36-byte header, then bins).
pub fn waterfall_payload(tile: &WaterfallTile, bins: &[u16]) -> Vec<u8> {
    let mut buf = waterfall_header(tile, bins, tile.height);
    buf.put_u16(tile.total_bins);
    buf.put_u16(tile.first_bin_index);
    for bin in bins {
        buf.put_u16(*bin);
    }
    buf.to_vec()
}

/// Pre-2.3 waterfall payload (32-byte header, then bins).
pub fn waterfall_payload_legacy(tile: &WaterfallTile, bins: &[u16]) -> Vec<u8> {
    let mut buf = waterfall_header(tile, bins, tile.height);
    for bin in bins {
        buf.put_u16(*bin);
    }
    buf.to_vec()
}

fn waterfall_header(tile: &WaterfallTile, bins: &[u16], height: u16) -> BytesMut {
    let height = height.max(1);
    let mut buf = BytesMut::new();
    buf.put_u64((tile.first_bin_freq_hz * 1_048_576.0) as u64);
    buf.put_u64((tile.bin_bandwidth_hz * 1_048_576.0) as u64);
    buf.put_u32(tile.line_duration_ms);
    buf.put_u16(bins.len() as u16 / height);
    buf.put_u16(height);
    buf.put_u32(tile.time_code);
    buf.put_u32(tile.auto_black_level);
    buf
}

/// Interleaved big-endian float32 sample pairs (I/Q or left/right).
pub fn float_pairs_payload(pairs: &[(f32, f32)]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(pairs.len() * 8);
    for (a, b) in pairs {
        buf.put_f32(*a);
        buf.put_f32(*b);
    }
    buf.to_vec()
}

/// Big-endian int16 mono samples (reduced-bandwidth DAX).
pub fn int16_payload(samples: &[i16]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(samples.len() * 2);
    for s in samples {
        buf.put_i16(*s);
    }
    buf.to_vec()
}

/// Meter packet payload of `(id, raw value)` pairs.
pub fn meter_payload(readings: &[(u16, i16)]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(readings.len() * 4);
    for (id, value) in readings {
        buf.put_u16(*id);
        buf.put_i16(*value);
    }
    buf.to_vec()
}

/// A discovery broadcast: space-separated `key=value` text in a VITA
/// packet of class 0xFFFF on stream 0x800.
pub fn discovery_packet(fields: &[(&str, &str)]) -> Vec<u8> {
    let text = fields
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(" ");
    VitaPacketBuilder::new(0xFFFF)
        .stream_id(0x800)
        .payload(text.as_bytes())
        .build()
}
