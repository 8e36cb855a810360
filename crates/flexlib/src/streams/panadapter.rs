//! Panadapter FFT frame reassembly.
//!
//! A panadapter frame is one line of `total_bins_in_frame` bins. Wide
//! displays split a frame across several packets, each declaring the
//! range of bins it carries and the frame it belongs to.

use bytes::Buf;
use flexlib_core::{Error, Result};

use super::sequence::{Continuity, FrameTracker};
use super::{MAX_BINS, PayloadLayout};

/// Decoded per-packet panadapter header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanadapterHeader {
    pub starting_bin_index: u32,
    pub number_of_bins: u32,
    pub bin_size: u32,
    pub total_bins_in_frame: u32,
    pub frame_index: u32,
}

impl PanadapterHeader {
    pub const CURRENT_LEN: usize = 12;
    pub const LEGACY_LEN: usize = 16;

    /// Decode the header and return it with the remaining bin bytes.
    pub fn parse(payload: &[u8], layout: PayloadLayout) -> Result<(Self, &[u8])> {
        let mut buf = payload;
        let header = match layout {
            PayloadLayout::Current => {
                if buf.len() < Self::CURRENT_LEN {
                    return Err(short_payload(payload.len(), Self::CURRENT_LEN));
                }
                PanadapterHeader {
                    starting_bin_index: buf.get_u16() as u32,
                    number_of_bins: buf.get_u16() as u32,
                    bin_size: buf.get_u16() as u32,
                    total_bins_in_frame: buf.get_u16() as u32,
                    frame_index: buf.get_u32(),
                }
            }
            PayloadLayout::Legacy => {
                if buf.len() < Self::LEGACY_LEN {
                    return Err(short_payload(payload.len(), Self::LEGACY_LEN));
                }
                let starting_bin_index = buf.get_u32();
                let number_of_bins = buf.get_u32();
                let bin_size = buf.get_u32();
                let frame_index = buf.get_u32();
                PanadapterHeader {
                    starting_bin_index,
                    number_of_bins,
                    bin_size,
                    total_bins_in_frame: number_of_bins,
                    frame_index,
                }
            }
        };
        Ok((header, buf))
    }
}

fn short_payload(len: usize, need: usize) -> Error {
    Error::Protocol(format!(
        "panadapter payload too short: {len} bytes, header needs {need}"
    ))
}

/// One complete panadapter line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanadapterFrame {
    pub stream_id: u32,
    pub frame_index: u32,
    /// Bin values in display order; `bins.len()` is the frame total.
    pub bins: Vec<u16>,
}

/// Reassembles panadapter frames for one stream.
#[derive(Debug)]
pub struct PanadapterAccumulator {
    stream_id: u32,
    bins: Vec<u16>,
    accrued: usize,
    /// Starting bin of every packet applied to the current frame.
    written: Vec<u32>,
    tracker: FrameTracker,
}

impl PanadapterAccumulator {
    pub fn new(stream_id: u32) -> Self {
        Self {
            stream_id,
            bins: vec![0; MAX_BINS],
            accrued: 0,
            written: Vec::with_capacity(MAX_BINS),
            tracker: FrameTracker::new(),
        }
    }

    /// Feed one packet payload. Returns the frame this packet completed.
    pub fn accept(&mut self, payload: &[u8], layout: PayloadLayout) -> Option<PanadapterFrame> {
        let (header, mut data) = match PanadapterHeader::parse(payload, layout) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::debug!(stream_id = format!("0x{:08X}", self.stream_id), error = %e, "Dropping panadapter packet");
                return None;
            }
        };

        match self.tracker.check(header.frame_index) {
            Continuity::Stale => {
                tracing::warn!(
                    stream_id = format!("0x{:08X}", self.stream_id),
                    frame = header.frame_index,
                    expected = self.tracker.expected(),
                    "Stale panadapter packet discarded"
                );
                return None;
            }
            Continuity::Skipped(gap) => {
                tracing::warn!(
                    stream_id = format!("0x{:08X}", self.stream_id),
                    frame = header.frame_index,
                    skipped = gap,
                    "Panadapter frames skipped"
                );
                self.restart();
            }
            Continuity::First | Continuity::InOrder => {}
        }

        let start = header.starting_bin_index as usize;
        let count = header.number_of_bins as usize;
        let total = header.total_bins_in_frame as usize;
        if header.bin_size != 2 || start + count > MAX_BINS || total > MAX_BINS || total == 0 {
            tracing::debug!(
                stream_id = format!("0x{:08X}", self.stream_id),
                start,
                count,
                total,
                bin_size = header.bin_size,
                "Panadapter packet out of range"
            );
            return None;
        }
        if data.len() < count * 2 {
            tracing::debug!(
                stream_id = format!("0x{:08X}", self.stream_id),
                count,
                available = data.len(),
                "Panadapter packet truncated"
            );
            return None;
        }

        if self.written.contains(&header.starting_bin_index) {
            tracing::debug!(
                stream_id = format!("0x{:08X}", self.stream_id),
                frame = header.frame_index,
                start,
                "Duplicate panadapter packet ignored"
            );
            return None;
        }

        for slot in &mut self.bins[start..start + count] {
            *slot = data.get_u16();
        }
        self.written.push(header.starting_bin_index);
        self.accrued += count;

        if self.accrued < total {
            return None;
        }

        let accrued = self.accrued;
        self.restart();
        self.tracker.complete();
        if accrued > total {
            // Overlapping ranges: some bins were written twice and others
            // may still hold the previous frame.
            tracing::warn!(
                stream_id = format!("0x{:08X}", self.stream_id),
                frame = header.frame_index,
                accrued,
                total,
                "Panadapter frame overran its bin count, abandoned"
            );
            return None;
        }
        Some(PanadapterFrame {
            stream_id: self.stream_id,
            frame_index: header.frame_index,
            bins: self.bins[..total].to_vec(),
        })
    }

    pub fn lost_frames(&self) -> u64 {
        self.tracker.lost_frames()
    }

    pub fn reset(&mut self) {
        self.restart();
        self.tracker.reset();
    }

    /// Forget the partial frame.
    fn restart(&mut self) {
        self.accrued = 0;
        self.written.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flexlib_test_harness::vita::{panadapter_payload, panadapter_payload_legacy};

    #[test]
    fn frame_split_across_two_packets() {
        let mut acc = PanadapterAccumulator::new(0x4000_0000);
        let first: Vec<u16> = (0..60).collect();
        let second: Vec<u16> = (60..100).collect();

        assert!(acc
            .accept(&panadapter_payload(0, 100, 7, &first), PayloadLayout::Current)
            .is_none());
        let frame = acc
            .accept(&panadapter_payload(60, 100, 7, &second), PayloadLayout::Current)
            .expect("frame complete");

        assert_eq!(frame.frame_index, 7);
        assert_eq!(frame.bins, (0..100).collect::<Vec<u16>>());
        assert_eq!(acc.lost_frames(), 0);
    }

    #[test]
    fn single_packet_frames_advance() {
        let mut acc = PanadapterAccumulator::new(1);
        for frame in 20..25 {
            let out = acc.accept(&panadapter_payload(0, 4, frame, &[1, 2, 3, 4]), PayloadLayout::Current);
            assert_eq!(out.map(|f| f.frame_index), Some(frame));
        }
    }

    #[test]
    fn stale_frame_discarded_without_disturbing_partial() {
        let mut acc = PanadapterAccumulator::new(1);
        acc.accept(&panadapter_payload(0, 2, 5, &[1, 1]), PayloadLayout::Current);
        acc.accept(&panadapter_payload(0, 4, 6, &[9, 9]), PayloadLayout::Current);
        // Old frame: ignored.
        assert!(acc
            .accept(&panadapter_payload(0, 2, 5, &[7, 7]), PayloadLayout::Current)
            .is_none());
        let frame = acc
            .accept(&panadapter_payload(2, 4, 6, &[8, 8]), PayloadLayout::Current)
            .unwrap();
        assert_eq!(frame.bins, vec![9, 9, 8, 8]);
    }

    #[test]
    fn skipped_frame_resets_partial() {
        let mut acc = PanadapterAccumulator::new(1);
        acc.accept(&panadapter_payload(0, 4, 1, &[1, 1]), PayloadLayout::Current);
        // Frame 1 never finishes; frame 3 arrives whole.
        let frame = acc
            .accept(&panadapter_payload(0, 4, 3, &[5, 6, 7, 8]), PayloadLayout::Current)
            .unwrap();
        assert_eq!(frame.frame_index, 3);
        assert_eq!(frame.bins, vec![5, 6, 7, 8]);
        assert_eq!(acc.lost_frames(), 2);
    }

    #[test]
    fn duplicate_packet_does_not_complete_frame() {
        let mut acc = PanadapterAccumulator::new(1);
        let whole: Vec<u16> = (0..100).collect();
        acc.accept(&panadapter_payload(0, 100, 7, &whole), PayloadLayout::Current)
            .expect("frame 7 complete");

        let first_half = [9u16; 60];
        let repeat = panadapter_payload(0, 100, 8, &first_half);
        assert!(acc.accept(&repeat, PayloadLayout::Current).is_none());
        assert!(acc.accept(&repeat, PayloadLayout::Current).is_none());

        let second_half = [4u16; 40];
        let frame = acc
            .accept(&panadapter_payload(60, 100, 8, &second_half), PayloadLayout::Current)
            .expect("frame 8 complete");
        assert_eq!(frame.frame_index, 8);
        assert_eq!(frame.bins[59], 9);
        assert_eq!(frame.bins[60], 4);
        assert_eq!(frame.bins[99], 4);
    }

    #[test]
    fn overlapping_ranges_abandon_frame() {
        let mut acc = PanadapterAccumulator::new(1);
        assert!(acc
            .accept(&panadapter_payload(0, 4, 3, &[1, 1, 1]), PayloadLayout::Current)
            .is_none());
        assert!(acc
            .accept(&panadapter_payload(2, 4, 3, &[2, 2]), PayloadLayout::Current)
            .is_none());
        // Later packets of the abandoned frame are stale; the next one is whole.
        assert!(acc
            .accept(&panadapter_payload(0, 4, 3, &[5, 5, 5, 5]), PayloadLayout::Current)
            .is_none());
        let frame = acc
            .accept(&panadapter_payload(0, 4, 4, &[6, 7, 8, 9]), PayloadLayout::Current)
            .unwrap();
        assert_eq!(frame.bins, vec![6, 7, 8, 9]);
    }

    #[test]
    fn legacy_layout() {
        let mut acc = PanadapterAccumulator::new(1);
        let frame = acc
            .accept(&panadapter_payload_legacy(0, 9, &[10, 20, 30]), PayloadLayout::Legacy)
            .unwrap();
        assert_eq!(frame.frame_index, 9);
        assert_eq!(frame.bins, vec![10, 20, 30]);
    }

    #[test]
    fn out_of_range_and_short_packets_dropped() {
        let mut acc = PanadapterAccumulator::new(1);
        let too_far = panadapter_payload(5119, 5120, 1, &[1, 2]);
        assert!(acc.accept(&too_far, PayloadLayout::Current).is_none());
        assert!(acc.accept(&[0; 5], PayloadLayout::Current).is_none());

        let mut truncated = panadapter_payload(0, 3, 2, &[1, 2, 3]);
        truncated.pop();
        assert!(acc.accept(&truncated, PayloadLayout::Current).is_none());
    }
}
