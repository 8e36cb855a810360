//! Panadapter and waterfall display streams (`display pan 0x..`,
//! `display waterfall 0x..`).
//!
//! Both are created the first time the radio mentions them; there is no
//! `in_use` key. A bare `removed` token destroys them. Each owns the frame
//! accumulator for its VITA stream and the consumer its frames go to.

use std::sync::atomic::AtomicBool;

use flexlib_core::{Guarded, ObjectKind};

use crate::keyvalue::coerce;
use crate::objects::{DynamicObject, assign, note, unknown_key};
use crate::streams::{
    FrameSink, PanadapterAccumulator, PanadapterFrame, PayloadLayout, WaterfallAccumulator,
    WaterfallFrame,
};
use crate::tokens::{PanadapterToken, WaterfallToken};

// ---------------------------------------------------------------------------
// Panadapter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PanadapterState {
    pub center_hz: u64,
    pub bandwidth_hz: u64,
    pub min_dbm: f64,
    pub max_dbm: f64,
    pub fps: u32,
    pub average: u32,
    pub weighted_average: bool,
    pub rf_gain: i32,
    pub rx_antenna: String,
    pub wide: bool,
    pub loop_a: bool,
    pub loop_b: bool,
    pub band: String,
    pub daxiq_channel: u32,
    /// Stream id of the attached waterfall.
    pub waterfall: u32,
    pub x_pixels: u32,
    pub y_pixels: u32,
    pub client_handle: u32,
    pub wnb: bool,
    pub wnb_level: i32,
    pub preamp: String,
}

#[derive(Debug)]
pub struct Panadapter {
    id: u32,
    state: Guarded<PanadapterState>,
    initialized: AtomicBool,
    accumulator: Guarded<PanadapterAccumulator>,
    sink: FrameSink<PanadapterFrame>,
}

impl Panadapter {
    pub fn state(&self) -> PanadapterState {
        self.state.get()
    }

    /// Consumer for completed frames.
    pub fn frames(&self) -> &FrameSink<PanadapterFrame> {
        &self.sink
    }

    pub fn lost_frames(&self) -> u64 {
        self.accumulator.read(|a| a.lost_frames())
    }

    /// Feed one VITA payload for this stream.
    pub(crate) fn process_payload(&self, payload: &[u8], layout: PayloadLayout) {
        if let Some(frame) = self.accumulator.write(|a| a.accept(payload, layout)) {
            self.sink.deliver(frame);
        }
    }
}

impl DynamicObject for Panadapter {
    const KIND: ObjectKind = ObjectKind::Panadapter;
    const CREATED_BY_IN_USE: bool = false;

    fn create(id: u32) -> Self {
        Self {
            id,
            state: Guarded::default(),
            initialized: AtomicBool::new(false),
            accumulator: Guarded::new(PanadapterAccumulator::new(id)),
            sink: FrameSink::new(),
        }
    }

    fn id(&self) -> u32 {
        self.id
    }

    fn apply_properties(&self, properties: &[(String, String)]) -> Vec<&'static str> {
        self.state.write(|s| {
            let mut changed = Vec::new();
            for (key, value) in properties {
                let Some(token) = PanadapterToken::from_wire(key) else {
                    unknown_key(Self::KIND, key);
                    continue;
                };
                let flag = Some(coerce::bool(value));
                let outcome = match token {
                    PanadapterToken::Center => assign(&mut s.center_hz, coerce::mhz_to_hz(value)),
                    PanadapterToken::Bandwidth => {
                        assign(&mut s.bandwidth_hz, coerce::mhz_to_hz(value))
                    }
                    PanadapterToken::MinDbm => assign(&mut s.min_dbm, coerce::float(value)),
                    PanadapterToken::MaxDbm => assign(&mut s.max_dbm, coerce::float(value)),
                    PanadapterToken::Fps => assign(&mut s.fps, coerce::int(value)),
                    PanadapterToken::Average => assign(&mut s.average, coerce::int(value)),
                    PanadapterToken::WeightedAverage => assign(&mut s.weighted_average, flag),
                    PanadapterToken::RfGain => assign(&mut s.rf_gain, coerce::int(value)),
                    PanadapterToken::RxAntenna => assign(&mut s.rx_antenna, Some(value.clone())),
                    PanadapterToken::Wide => assign(&mut s.wide, flag),
                    PanadapterToken::LoopA => assign(&mut s.loop_a, flag),
                    PanadapterToken::LoopB => assign(&mut s.loop_b, flag),
                    PanadapterToken::Band => assign(&mut s.band, Some(value.clone())),
                    PanadapterToken::DaxIqChannel => {
                        assign(&mut s.daxiq_channel, coerce::int(value))
                    }
                    PanadapterToken::Waterfall => assign(&mut s.waterfall, coerce::hex_u32(value)),
                    PanadapterToken::XPixels => assign(&mut s.x_pixels, coerce::int(value)),
                    PanadapterToken::YPixels => assign(&mut s.y_pixels, coerce::int(value)),
                    PanadapterToken::ClientHandle => {
                        assign(&mut s.client_handle, coerce::hex_u32(value))
                    }
                    PanadapterToken::WidebandNoiseBlanker => assign(&mut s.wnb, flag),
                    PanadapterToken::WidebandNoiseBlankerLevel => {
                        assign(&mut s.wnb_level, coerce::int(value))
                    }
                    PanadapterToken::Preamp => assign(&mut s.preamp, Some(value.clone())),
                };
                note(&mut changed, Self::KIND, token.as_str(), value, outcome);
            }
            changed
        })
    }

    /// Center, bandwidth and the dBm range are known.
    fn is_ready(&self) -> bool {
        self.state.read(|s| {
            s.center_hz != 0 && s.bandwidth_hz != 0 && (s.min_dbm != 0.0 || s.max_dbm != 0.0)
        })
    }

    fn initialized_flag(&self) -> &AtomicBool {
        &self.initialized
    }
}

// ---------------------------------------------------------------------------
// Waterfall
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WaterfallState {
    /// Stream id of the parent panadapter.
    pub panadapter: u32,
    pub center_hz: u64,
    pub bandwidth_hz: u64,
    pub line_duration_ms: u32,
    pub color_gain: i32,
    pub auto_black: bool,
    pub black_level: i32,
    pub gradient_index: u32,
    pub x_pixels: u32,
    pub client_handle: u32,
    pub band: String,
    pub rx_antenna: String,
    pub daxiq_channel: u32,
}

#[derive(Debug)]
pub struct Waterfall {
    id: u32,
    state: Guarded<WaterfallState>,
    initialized: AtomicBool,
    accumulator: Guarded<WaterfallAccumulator>,
    sink: FrameSink<WaterfallFrame>,
}

impl Waterfall {
    pub fn state(&self) -> WaterfallState {
        self.state.get()
    }

    pub fn frames(&self) -> &FrameSink<WaterfallFrame> {
        &self.sink
    }

    pub fn lost_frames(&self) -> u64 {
        self.accumulator.read(|a| a.lost_frames())
    }

    pub(crate) fn process_payload(&self, payload: &[u8], layout: PayloadLayout) {
        if let Some(frame) = self.accumulator.write(|a| a.accept(payload, layout)) {
            self.sink.deliver(frame);
        }
    }
}

impl DynamicObject for Waterfall {
    const KIND: ObjectKind = ObjectKind::Waterfall;
    const CREATED_BY_IN_USE: bool = false;

    fn create(id: u32) -> Self {
        Self {
            id,
            state: Guarded::default(),
            initialized: AtomicBool::new(false),
            accumulator: Guarded::new(WaterfallAccumulator::new(id)),
            sink: FrameSink::new(),
        }
    }

    fn id(&self) -> u32 {
        self.id
    }

    fn apply_properties(&self, properties: &[(String, String)]) -> Vec<&'static str> {
        self.state.write(|s| {
            let mut changed = Vec::new();
            for (key, value) in properties {
                let Some(token) = WaterfallToken::from_wire(key) else {
                    unknown_key(Self::KIND, key);
                    continue;
                };
                let outcome = match token {
                    WaterfallToken::Panadapter => assign(&mut s.panadapter, coerce::hex_u32(value)),
                    WaterfallToken::Center => assign(&mut s.center_hz, coerce::mhz_to_hz(value)),
                    WaterfallToken::Bandwidth => {
                        assign(&mut s.bandwidth_hz, coerce::mhz_to_hz(value))
                    }
                    WaterfallToken::LineDuration => {
                        assign(&mut s.line_duration_ms, coerce::int(value))
                    }
                    WaterfallToken::ColorGain => assign(&mut s.color_gain, coerce::int(value)),
                    WaterfallToken::AutoBlack => {
                        assign(&mut s.auto_black, Some(coerce::bool(value)))
                    }
                    WaterfallToken::BlackLevel => assign(&mut s.black_level, coerce::int(value)),
                    WaterfallToken::GradientIndex => {
                        assign(&mut s.gradient_index, coerce::int(value))
                    }
                    WaterfallToken::XPixels => assign(&mut s.x_pixels, coerce::int(value)),
                    WaterfallToken::ClientHandle => {
                        assign(&mut s.client_handle, coerce::hex_u32(value))
                    }
                    WaterfallToken::Band => assign(&mut s.band, Some(value.clone())),
                    WaterfallToken::RxAntenna => assign(&mut s.rx_antenna, Some(value.clone())),
                    WaterfallToken::DaxIqChannel => {
                        assign(&mut s.daxiq_channel, coerce::int(value))
                    }
                };
                note(&mut changed, Self::KIND, token.as_str(), value, outcome);
            }
            changed
        })
    }

    /// Attached to a panadapter.
    fn is_ready(&self) -> bool {
        self.state.read(|s| s.panadapter != 0)
    }

    fn initialized_flag(&self) -> &AtomicBool {
        &self.initialized
    }
}
