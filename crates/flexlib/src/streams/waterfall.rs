//! Waterfall tile reassembly.
//!
//! A waterfall packet carries a tile: `number_of_bins` columns by
//! `line_height` rows, stored column-major. Tiles covering the same time
//! code are stitched side by side until `total_bins_in_frame` columns
//! have arrived.

use bytes::Buf;
use flexlib_core::{Error, Result};

use super::sequence::{Continuity, FrameTracker};
use super::{MAX_BINS, PayloadLayout};

/// Frequencies are 20-bit fixed point.
const FIXED_POINT_SCALE: f64 = 1_048_576.0;

/// Tallest tile accepted. Taller tiles are dropped.
pub const MAX_LINE_HEIGHT: usize = 16;

/// Decoded per-packet waterfall header.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaterfallHeader {
    pub first_bin_freq_hz: f64,
    pub bin_bandwidth_hz: f64,
    pub line_duration_ms: u32,
    pub number_of_bins: u16,
    pub line_height: u16,
    pub time_code: u32,
    pub auto_black_level: u32,
    pub total_bins_in_frame: u16,
    pub first_bin_index: u16,
}

impl WaterfallHeader {
    pub const CURRENT_LEN: usize = 36;
    pub const LEGACY_LEN: usize = 32;

    pub fn parse(payload: &[u8], layout: PayloadLayout) -> Result<(Self, &[u8])> {
        let need = match layout {
            PayloadLayout::Current => Self::CURRENT_LEN,
            PayloadLayout::Legacy => Self::LEGACY_LEN,
        };
        if payload.len() < need {
            return Err(Error::Protocol(format!(
                "waterfall payload too short: {} bytes, header needs {need}",
                payload.len()
            )));
        }

        let mut buf = payload;
        let first_bin_freq_hz = buf.get_u64() as f64 / FIXED_POINT_SCALE;
        let bin_bandwidth_hz = buf.get_u64() as f64 / FIXED_POINT_SCALE;
        let line_duration_ms = buf.get_u32();
        let number_of_bins = buf.get_u16();
        let line_height = buf.get_u16();
        let time_code = buf.get_u32();
        let auto_black_level = buf.get_u32();
        let (total_bins_in_frame, first_bin_index) = match layout {
            PayloadLayout::Current => (buf.get_u16(), buf.get_u16()),
            PayloadLayout::Legacy => (number_of_bins, 0),
        };

        Ok((
            WaterfallHeader {
                first_bin_freq_hz,
                bin_bandwidth_hz,
                line_duration_ms,
                number_of_bins,
                line_height,
                time_code,
                auto_black_level,
                total_bins_in_frame,
                first_bin_index,
            },
            buf,
        ))
    }
}

/// One complete waterfall tile.
#[derive(Debug, Clone, PartialEq)]
pub struct WaterfallFrame {
    pub stream_id: u32,
    pub first_bin_freq_hz: f64,
    pub bin_bandwidth_hz: f64,
    pub line_duration_ms: u32,
    /// Columns in the tile.
    pub width: u16,
    /// Rows in the tile.
    pub height: u16,
    pub time_code: u32,
    pub auto_black_level: u32,
    /// `width * height` values.
    pub data: Vec<u16>,
}

/// Reassembles waterfall tiles for one stream.
#[derive(Debug)]
pub struct WaterfallAccumulator {
    stream_id: u32,
    data: Vec<u16>,
    frame_len: usize,
    accrued: usize,
    /// First column of every tile applied to the current frame.
    written: Vec<u16>,
    first_bin_freq_hz: f64,
    tracker: FrameTracker,
}

impl WaterfallAccumulator {
    pub fn new(stream_id: u32) -> Self {
        Self {
            stream_id,
            data: vec![0; MAX_BINS * MAX_LINE_HEIGHT],
            frame_len: 0,
            accrued: 0,
            written: Vec::with_capacity(MAX_BINS),
            first_bin_freq_hz: 0.0,
            tracker: FrameTracker::new(),
        }
    }

    /// Feed one packet payload. Returns the tile this packet completed.
    pub fn accept(&mut self, payload: &[u8], layout: PayloadLayout) -> Option<WaterfallFrame> {
        let stream_id = format!("0x{:08X}", self.stream_id);
        let (header, mut body) = match WaterfallHeader::parse(payload, layout) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::debug!(stream_id, error = %e, "Dropping waterfall packet");
                return None;
            }
        };

        match self.tracker.check(header.time_code) {
            Continuity::Stale => {
                tracing::warn!(stream_id, time_code = header.time_code, "Stale waterfall packet discarded");
                return None;
            }
            Continuity::Skipped(gap) => {
                tracing::warn!(stream_id, time_code = header.time_code, skipped = gap, "Waterfall tiles skipped");
                self.restart();
            }
            Continuity::First | Continuity::InOrder => {}
        }

        let height = header.line_height.max(1) as usize;
        let width = header.number_of_bins as usize;
        let total = header.total_bins_in_frame as usize;
        let first = header.first_bin_index as usize;
        let capacity = total * height;
        if total == 0
            || total > MAX_BINS
            || height > MAX_LINE_HEIGHT
            || first + width > total
        {
            tracing::debug!(stream_id, first, width, total, height, "Waterfall packet out of range");
            return None;
        }
        let count = width * height;
        if body.len() < count * 2 {
            tracing::debug!(stream_id, count, available = body.len(), "Waterfall packet truncated");
            return None;
        }

        if self.accrued == 0 {
            self.frame_len = capacity;
            self.first_bin_freq_hz = header.first_bin_freq_hz;
        } else if self.frame_len != capacity {
            tracing::debug!(stream_id, "Waterfall tile geometry changed mid-frame");
            self.restart();
            return None;
        }
        if self.written.contains(&header.first_bin_index) {
            tracing::debug!(stream_id, time_code = header.time_code, first, "Duplicate waterfall tile ignored");
            return None;
        }
        if first == 0 {
            self.first_bin_freq_hz = header.first_bin_freq_hz;
        }

        let offset = first * height;
        for slot in &mut self.data[offset..offset + count] {
            *slot = body.get_u16();
        }
        self.written.push(header.first_bin_index);
        self.accrued += width;

        if self.accrued < total {
            return None;
        }

        let accrued = self.accrued;
        self.restart();
        self.tracker.complete();
        if accrued > total {
            tracing::warn!(stream_id, time_code = header.time_code, accrued, total, "Waterfall frame overran its bin count, abandoned");
            return None;
        }
        Some(WaterfallFrame {
            stream_id: self.stream_id,
            first_bin_freq_hz: self.first_bin_freq_hz,
            bin_bandwidth_hz: header.bin_bandwidth_hz,
            line_duration_ms: header.line_duration_ms,
            width: header.total_bins_in_frame,
            height: height as u16,
            time_code: header.time_code,
            auto_black_level: header.auto_black_level,
            data: self.data[..self.frame_len].to_vec(),
        })
    }

    pub fn lost_frames(&self) -> u64 {
        self.tracker.lost_frames()
    }

    pub fn reset(&mut self) {
        self.restart();
        self.tracker.reset();
    }

    fn restart(&mut self) {
        self.accrued = 0;
        self.written.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flexlib_test_harness::vita::{WaterfallTile, waterfall_payload, waterfall_payload_legacy};

    fn tile(time_code: u32, total: u16, first: u16) -> WaterfallTile {
        WaterfallTile {
            first_bin_freq_hz: 14_000_000.0,
            bin_bandwidth_hz: 100.0,
            line_duration_ms: 100,
            height: 1,
            time_code,
            auto_black_level: 42,
            total_bins: total,
            first_bin_index: first,
        }
    }

    #[test]
    fn two_tiles_form_a_frame() {
        let mut acc = WaterfallAccumulator::new(0x4200_0000);
        assert!(acc
            .accept(&waterfall_payload(&tile(3, 6, 0), &[1, 2, 3]), PayloadLayout::Current)
            .is_none());
        let frame = acc
            .accept(&waterfall_payload(&tile(3, 6, 3), &[4, 5, 6]), PayloadLayout::Current)
            .unwrap();
        assert_eq!(frame.data, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(frame.width, 6);
        assert_eq!(frame.time_code, 3);
        assert_eq!(frame.auto_black_level, 42);
        assert!((frame.first_bin_freq_hz - 14_000_000.0).abs() < 1.0);
        assert!((frame.bin_bandwidth_hz - 100.0).abs() < 1e-3);
    }

    #[test]
    fn multi_row_tile_offsets_by_height() {
        let mut acc = WaterfallAccumulator::new(1);
        let mut left = tile(1, 4, 0);
        left.height = 2;
        let mut right = tile(1, 4, 2);
        right.height = 2;
        acc.accept(&waterfall_payload(&left, &[1, 2, 3, 4]), PayloadLayout::Current);
        let frame = acc
            .accept(&waterfall_payload(&right, &[5, 6, 7, 8]), PayloadLayout::Current)
            .unwrap();
        assert_eq!(frame.height, 2);
        assert_eq!(frame.data, vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn repeated_tile_waits_for_the_rest() {
        let mut acc = WaterfallAccumulator::new(1);
        acc.accept(&waterfall_payload(&tile(4, 4, 0), &[1, 2, 3, 4]), PayloadLayout::Current)
            .expect("tile 4 complete");

        let left = waterfall_payload(&tile(5, 4, 0), &[7, 7]);
        assert!(acc.accept(&left, PayloadLayout::Current).is_none());
        assert!(acc.accept(&left, PayloadLayout::Current).is_none());
        let frame = acc
            .accept(&waterfall_payload(&tile(5, 4, 2), &[8, 8]), PayloadLayout::Current)
            .expect("tile 5 complete");
        assert_eq!(frame.data, vec![7, 7, 8, 8]);
    }

    #[test]
    fn oversized_tile_dropped_without_growing() {
        let mut acc = WaterfallAccumulator::new(1);
        let capacity = acc.data.len();
        let mut tall = tile(1, 5120, 0);
        tall.height = 30_000;
        let bins = vec![1u16; 30_000];
        assert!(acc.accept(&waterfall_payload(&tall, &bins), PayloadLayout::Current).is_none());
        assert_eq!(acc.data.len(), capacity);

        let frame = acc
            .accept(&waterfall_payload(&tile(1, 2, 0), &[3, 4]), PayloadLayout::Current)
            .unwrap();
        assert_eq!(frame.data, vec![3, 4]);
    }

    #[test]
    fn legacy_single_packet() {
        let mut acc = WaterfallAccumulator::new(1);
        let frame = acc
            .accept(&waterfall_payload_legacy(&tile(8, 0, 0), &[9, 8, 7]), PayloadLayout::Legacy)
            .unwrap();
        assert_eq!(frame.width, 3);
        assert_eq!(frame.data, vec![9, 8, 7]);
    }

    #[test]
    fn stale_time_code_ignored() {
        let mut acc = WaterfallAccumulator::new(1);
        acc.accept(&waterfall_payload(&tile(10, 2, 0), &[1, 1]), PayloadLayout::Current);
        assert!(acc
            .accept(&waterfall_payload(&tile(9, 2, 0), &[2, 2]), PayloadLayout::Current)
            .is_none());
        let frame = acc
            .accept(&waterfall_payload(&tile(11, 2, 0), &[3, 3]), PayloadLayout::Current)
            .unwrap();
        assert_eq!(frame.time_code, 11);
        assert_eq!(acc.lost_frames(), 0);
    }
}
