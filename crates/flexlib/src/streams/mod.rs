//! Stream frame accumulators.
//!
//! One accumulator per stream object turns VITA payloads into frames:
//! bin-oriented streams (panadapter, waterfall) reassemble a frame from one
//! or more packets keyed by a frame index, while sample streams (I/Q, DAX
//! audio, mic audio, opus) map each packet to one frame. Every accumulator
//! checks sequence continuity and counts what it lost. None of them block
//! or allocate per packet beyond the frame handed to the consumer.

pub mod opus;
pub mod panadapter;
pub mod samples;
pub mod sequence;
pub mod waterfall;

use flexlib_core::{FirmwareVersion, Guarded};
use tokio::sync::mpsc;

pub use opus::{OpusAccumulator, OpusFrame};
pub use panadapter::{PanadapterAccumulator, PanadapterFrame};
pub use samples::{SampleAccumulator, SampleEncoding, SampleFrame};
pub use sequence::{Continuity, FrameTracker, PacketCounter};
pub use waterfall::{WaterfallAccumulator, WaterfallFrame};

/// Largest bin count of any panadapter or waterfall frame.
pub const MAX_BINS: usize = 5120;

/// Fixed-point full scale to float full scale.
pub const SAMPLE_SCALE: f32 = 1.0 / 32768.0;

/// Which payload header schema the radio uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PayloadLayout {
    /// Firmware before 2.3.
    Legacy,
    /// Firmware 2.3 and later.
    #[default]
    Current,
}

impl PayloadLayout {
    pub fn for_firmware(version: &FirmwareVersion) -> Self {
        if version.at_least(2, 3) {
            PayloadLayout::Current
        } else {
            PayloadLayout::Legacy
        }
    }
}

/// The consumer registered for one stream's completed frames.
///
/// Delivery never waits: with no consumer, or a full or closed channel,
/// the frame is dropped.
#[derive(Debug)]
pub struct FrameSink<F> {
    sender: Guarded<Option<mpsc::Sender<F>>>,
}

impl<F> Default for FrameSink<F> {
    fn default() -> Self {
        Self {
            sender: Guarded::new(None),
        }
    }
}

impl<F> FrameSink<F> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install (or with `None`, remove) the consumer.
    pub fn set(&self, sender: Option<mpsc::Sender<F>>) {
        self.sender.replace(sender);
    }

    /// Install a fresh channel of `capacity` frames and return its receiver.
    pub fn subscribe(&self, capacity: usize) -> mpsc::Receiver<F> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        self.set(Some(tx));
        rx
    }

    pub fn has_consumer(&self) -> bool {
        self.sender.read(|s| s.as_ref().is_some_and(|tx| !tx.is_closed()))
    }

    /// Hand `frame` to the consumer. Returns whether it was queued.
    pub fn deliver(&self, frame: F) -> bool {
        self.sender.read(|sender| match sender {
            Some(tx) => match tx.try_send(frame) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::trace!("Frame consumer full, frame dropped");
                    false
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            },
            None => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sink_delivers_and_drops() {
        let sink: FrameSink<u32> = FrameSink::new();
        assert!(!sink.deliver(1));
        assert!(!sink.has_consumer());

        let mut rx = sink.subscribe(1);
        assert!(sink.has_consumer());
        assert!(sink.deliver(2));
        assert!(!sink.deliver(3));
        assert_eq!(rx.recv().await, Some(2));

        drop(rx);
        assert!(!sink.deliver(4));
        assert!(!sink.has_consumer());
    }

    #[test]
    fn layout_boundary() {
        let v = |s: &str| s.parse::<FirmwareVersion>().unwrap();
        assert_eq!(PayloadLayout::for_firmware(&v("2.2.8")), PayloadLayout::Legacy);
        assert_eq!(PayloadLayout::for_firmware(&v("2.3.0")), PayloadLayout::Current);
        assert_eq!(PayloadLayout::for_firmware(&v("3.1.8.25")), PayloadLayout::Current);
        assert_eq!(PayloadLayout::for_firmware(&v("1.4.0")), PayloadLayout::Legacy);
    }
}
