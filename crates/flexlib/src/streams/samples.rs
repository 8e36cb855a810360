//! I/Q and audio sample streams.
//!
//! Each packet is one frame. Full-rate DAX audio, mic audio and DAX I/Q
//! carry interleaved big-endian float32 pairs; reduced-bandwidth DAX
//! carries big-endian int16 mono. Both are normalised by [`SAMPLE_SCALE`].

use bytes::Buf;

use super::SAMPLE_SCALE;
use super::sequence::{Continuity, PacketCounter};

/// Payload sample encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleEncoding {
    /// Interleaved float32 pairs: left/right or I/Q.
    Float32Pairs,
    /// Mono int16 (reduced-bandwidth DAX).
    Int16Mono,
}

/// One packet of de-interleaved samples.
///
/// For I/Q streams `left` is I and `right` is Q. Mono streams carry the
/// same samples in both channels.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleFrame {
    pub stream_id: u32,
    pub sample_rate: Option<u32>,
    pub left: Vec<f32>,
    pub right: Vec<f32>,
}

impl SampleFrame {
    pub fn len(&self) -> usize {
        self.left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }
}

/// Decode a sample payload into two channels, scaled.
pub fn deinterleave(payload: &[u8], encoding: SampleEncoding) -> (Vec<f32>, Vec<f32>) {
    let mut buf = payload;
    match encoding {
        SampleEncoding::Float32Pairs => {
            let count = payload.len() / 8;
            let mut left = Vec::with_capacity(count);
            let mut right = Vec::with_capacity(count);
            for _ in 0..count {
                left.push(buf.get_f32() * SAMPLE_SCALE);
                right.push(buf.get_f32() * SAMPLE_SCALE);
            }
            (left, right)
        }
        SampleEncoding::Int16Mono => {
            let count = payload.len() / 2;
            let mut mono = Vec::with_capacity(count);
            for _ in 0..count {
                mono.push(buf.get_i16() as f32 * SAMPLE_SCALE);
            }
            (mono.clone(), mono)
        }
    }
}

/// Sequence checking plus decoding for one sample stream.
#[derive(Debug)]
pub struct SampleAccumulator {
    stream_id: u32,
    counter: PacketCounter,
}

impl SampleAccumulator {
    pub fn new(stream_id: u32) -> Self {
        Self {
            stream_id,
            counter: PacketCounter::new(),
        }
    }

    /// Feed one packet. Stale packets yield `None`; a gap is logged and the
    /// packet is still decoded.
    pub fn accept(
        &mut self,
        packet_count: u8,
        payload: &[u8],
        encoding: SampleEncoding,
        sample_rate: Option<u32>,
    ) -> Option<SampleFrame> {
        match self.counter.check(packet_count) {
            Continuity::Stale => {
                tracing::warn!(
                    stream_id = format!("0x{:08X}", self.stream_id),
                    packet_count,
                    "Stale sample packet discarded"
                );
                return None;
            }
            Continuity::Skipped(lost) => {
                tracing::warn!(
                    stream_id = format!("0x{:08X}", self.stream_id),
                    packet_count,
                    lost,
                    "Sample packets lost"
                );
            }
            Continuity::First | Continuity::InOrder => {}
        }

        let (left, right) = deinterleave(payload, encoding);
        Some(SampleFrame {
            stream_id: self.stream_id,
            sample_rate,
            left,
            right,
        })
    }

    pub fn lost_packets(&self) -> u64 {
        self.counter.lost_packets()
    }

    pub fn reset(&mut self) {
        self.counter.reset();
    }
}
