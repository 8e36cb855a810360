//! Sequence continuity tracking.
//!
//! Two cursors are used. [`PacketCounter`] follows the 4-bit VITA packet
//! counter of packet-per-frame streams (I/Q, audio, opus) with modulo-16
//! distance. [`FrameTracker`] follows the 32-bit frame index carried in
//! panadapter and waterfall payloads.

/// Outcome of checking one packet against the expected sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuity {
    /// First packet seen; adopted as the baseline.
    First,
    /// Exactly the expected sequence.
    InOrder,
    /// Sequence jumped ahead; this many were lost. The cursor has been
    /// resynchronised and the packet should be processed.
    Skipped(u32),
    /// Older than expected (duplicate or reordered). Discard.
    Stale,
}

impl Continuity {
    /// Whether the packet should be processed.
    pub fn accepts(self) -> bool {
        !matches!(self, Continuity::Stale)
    }
}

/// Half the mod-16 ring. Distances at or beyond this are behind us.
const STALE_DISTANCE: u8 = 8;

/// Mod-16 packet counter cursor.
#[derive(Debug, Clone, Default)]
pub struct PacketCounter {
    expected: Option<u8>,
    lost: u64,
}

impl PacketCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check `count` (low 4 bits used) and advance on acceptance.
    pub fn check(&mut self, count: u8) -> Continuity {
        let count = count & 0x0F;
        let Some(expected) = self.expected else {
            self.expected = Some((count + 1) & 0x0F);
            return Continuity::First;
        };

        let distance = count.wrapping_sub(expected) & 0x0F;
        match distance {
            0 => {
                self.expected = Some((count + 1) & 0x0F);
                Continuity::InOrder
            }
            d if d < STALE_DISTANCE => {
                self.lost += d as u64;
                self.expected = Some((count + 1) & 0x0F);
                Continuity::Skipped(d as u32)
            }
            _ => Continuity::Stale,
        }
    }

    pub fn lost_packets(&self) -> u64 {
        self.lost
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// 32-bit frame index cursor for bin-oriented streams.
///
/// Unlike [`PacketCounter`] the cursor only advances when a frame
/// completes, via [`FrameTracker::complete`].
#[derive(Debug, Clone, Default)]
pub struct FrameTracker {
    expected: Option<u32>,
    lost: u64,
}

impl FrameTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&mut self, index: u32) -> Continuity {
        let Some(expected) = self.expected else {
            self.expected = Some(index);
            return Continuity::First;
        };

        if index == expected {
            Continuity::InOrder
        } else if index < expected {
            Continuity::Stale
        } else {
            let gap = index - expected;
            self.lost += gap as u64;
            self.expected = Some(index);
            Continuity::Skipped(gap)
        }
    }

    /// The current frame finished; expect the next index.
    pub fn complete(&mut self) {
        if let Some(expected) = self.expected.as_mut() {
            *expected = expected.wrapping_add(1);
        }
    }

    pub fn expected(&self) -> Option<u32> {
        self.expected
    }

    pub fn lost_frames(&self) -> u64 {
        self.lost
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn run(counter: &mut PacketCounter, seq: &[u8]) -> Vec<Continuity> {
        seq.iter().map(|s| counter.check(*s)).collect()
    }

    #[test]
    fn single_gap_reported_once() {
        let mut c = PacketCounter::new();
        let out = run(&mut c, &[0, 1, 2, 4, 5]);
        assert_eq!(
            out,
            vec![
                Continuity::First,
                Continuity::InOrder,
                Continuity::InOrder,
                Continuity::Skipped(1),
                Continuity::InOrder,
            ]
        );
        assert_eq!(c.lost_packets(), 1);
    }

    #[test]
    fn wraparound_is_not_a_gap() {
        let mut c = PacketCounter::new();
        let out = run(&mut c, &[14, 15, 0, 1]);
        assert!(out[1..].iter().all(|r| *r == Continuity::InOrder));
        assert_eq!(c.lost_packets(), 0);
    }

    #[test]
    fn duplicate_and_reordered_are_stale() {
        let mut c = PacketCounter::new();
        run(&mut c, &[5, 6, 7]);
        assert_eq!(c.check(7), Continuity::Stale);
        assert_eq!(c.check(6), Continuity::Stale);
        // Stale packets do not move the cursor.
        assert_eq!(c.check(8), Continuity::InOrder);
        assert_eq!(c.lost_packets(), 0);
    }

    #[test]
    fn gap_across_wrap() {
        let mut c = PacketCounter::new();
        run(&mut c, &[14, 15]);
        assert_eq!(c.check(2), Continuity::Skipped(2));
        assert_eq!(c.lost_packets(), 2);
    }

    #[test]
    fn frame_tracker_lifecycle() {
        let mut t = FrameTracker::new();
        assert_eq!(t.check(10), Continuity::First);
        assert_eq!(t.check(10), Continuity::InOrder);
        t.complete();
        assert_eq!(t.expected(), Some(11));
        assert_eq!(t.check(9), Continuity::Stale);
        assert_eq!(t.check(14), Continuity::Skipped(3));
        assert_eq!(t.expected(), Some(14));
        assert_eq!(t.lost_frames(), 3);
        t.reset();
        assert_eq!(t.expected(), None);
    }

    proptest! {
        #[test]
        fn in_order_stream_never_loses(start in 0u8..16, len in 1usize..64) {
            let mut c = PacketCounter::new();
            for i in 0..len {
                let r = c.check(start.wrapping_add(i as u8) & 0x0F);
                prop_assert!(r == Continuity::First || r == Continuity::InOrder);
            }
            prop_assert_eq!(c.lost_packets(), 0);
        }

        #[test]
        fn skip_within_half_ring_counts_exactly(start in 0u8..16, skip in 1u8..8) {
            let mut c = PacketCounter::new();
            c.check(start);
            let next = (start + 1 + skip) & 0x0F;
            prop_assert_eq!(c.check(next), Continuity::Skipped(skip as u32));
            prop_assert_eq!(c.lost_packets(), skip as u64);
        }
    }
}
