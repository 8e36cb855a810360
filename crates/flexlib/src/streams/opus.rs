//! Opus remote-audio stream. Payloads are passed through undecoded.

use bytes::Bytes;

use super::sequence::{Continuity, PacketCounter};

/// One Opus packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpusFrame {
    pub stream_id: u32,
    pub data: Bytes,
}

#[derive(Debug)]
pub struct OpusAccumulator {
    stream_id: u32,
    counter: PacketCounter,
}

impl OpusAccumulator {
    pub fn new(stream_id: u32) -> Self {
        Self {
            stream_id,
            counter: PacketCounter::new(),
        }
    }

    pub fn accept(&mut self, packet_count: u8, payload: &[u8]) -> Option<OpusFrame> {
        match self.counter.check(packet_count) {
            Continuity::Stale => {
                tracing::warn!(stream_id = format!("0x{:08X}", self.stream_id), packet_count, "Stale opus packet discarded");
                return None;
            }
            Continuity::Skipped(lost) => {
                tracing::warn!(stream_id = format!("0x{:08X}", self.stream_id), lost, "Opus packets lost");
            }
            Continuity::First | Continuity::InOrder => {}
        }
        Some(OpusFrame {
            stream_id: self.stream_id,
            data: Bytes::copy_from_slice(payload),
        })
    }

    pub fn lost_packets(&self) -> u64 {
        self.counter.lost_packets()
    }

    pub fn reset(&mut self) {
        self.counter.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_payload_through() {
        let mut acc = OpusAccumulator::new(0x0400_0000);
        let frame = acc.accept(0, &[0xFC, 0x01, 0x02]).unwrap();
        assert_eq!(&frame.data[..], &[0xFC, 0x01, 0x02]);
        assert!(acc.accept(0, &[1]).is_none());
        assert!(acc.accept(3, &[1]).is_some());
        assert_eq!(acc.lost_packets(), 2);
    }
}
