//! Transmit settings singleton (`transmit ...` status lines).
//!
//! Besides plain coercion this parser owns the range rules shared with the
//! command builders: percentage fields clamp to 0-100, CW pitch to
//! 100-6000 Hz, CW speed to 5-100 WPM, delays to 0-2000 ms, and the TX
//! filter edges to 0-10000 Hz with `low <= high` maintained by moving the
//! opposite edge.

use flexlib_core::{Guarded, ObjectKind};

use crate::keyvalue::coerce;
use crate::objects::{StaticObject, assign, note, unknown_key};
use crate::tokens::TransmitToken;

pub const CW_PITCH_MIN: i32 = 100;
pub const CW_PITCH_MAX: i32 = 6000;
pub const CW_SPEED_MIN: i32 = 5;
pub const CW_SPEED_MAX: i32 = 100;
pub const DELAY_MAX_MS: i32 = 2000;
pub const TX_FILTER_MAX_HZ: i32 = 10_000;

pub fn clamp_percent(value: i32) -> i32 {
    value.clamp(0, 100)
}

pub fn clamp_cw_pitch(hz: i32) -> i32 {
    hz.clamp(CW_PITCH_MIN, CW_PITCH_MAX)
}

pub fn clamp_cw_speed(wpm: i32) -> i32 {
    wpm.clamp(CW_SPEED_MIN, CW_SPEED_MAX)
}

pub fn clamp_delay(ms: i32) -> i32 {
    ms.clamp(0, DELAY_MAX_MS)
}

/// Set a new low edge against the current high edge. A low edge above the
/// high edge raises the high edge to match.
pub fn couple_filter_low(low: i32, high: i32) -> (i32, i32) {
    let low = low.clamp(0, TX_FILTER_MAX_HZ);
    let high = high.clamp(0, TX_FILTER_MAX_HZ);
    (low, high.max(low))
}

/// Set a new high edge against the current low edge. A high edge below the
/// low edge lowers the low edge to match.
pub fn couple_filter_high(low: i32, high: i32) -> (i32, i32) {
    let high = high.clamp(0, TX_FILTER_MAX_HZ);
    let low = low.clamp(0, TX_FILTER_MAX_HZ);
    (low.min(high), high)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransmitState {
    pub frequency_hz: u64,
    pub rf_power: i32,
    pub tune_power: i32,
    pub tune: bool,
    pub am_carrier_level: i32,
    pub mic_selection: String,
    pub mic_level: i32,
    pub mic_boost: bool,
    pub mic_bias: bool,
    pub mic_acc: bool,
    pub compander_on: bool,
    pub compander_level: i32,
    pub speech_processor_on: bool,
    pub speech_processor_level: i32,
    pub vox_on: bool,
    pub vox_level: i32,
    pub vox_delay_ms: i32,
    pub filter_low_hz: i32,
    pub filter_high_hz: i32,
    pub cw_pitch_hz: i32,
    pub cw_speed_wpm: i32,
    pub cw_iambic: bool,
    /// 0 = mode A, 1 = mode B.
    pub cw_iambic_mode: u8,
    pub cw_swap_paddles: bool,
    pub cw_break_in: bool,
    pub cw_break_in_delay_ms: i32,
    pub cw_sidetone: bool,
    pub monitor_gain_cw: i32,
    pub monitor_gain_sb: i32,
    pub sb_monitor: bool,
    pub dax: bool,
    pub hw_alc_enabled: bool,
    pub inhibit: bool,
    pub max_power_level: i32,
    pub show_tx_in_waterfall: bool,
}

/// The transmitter settings aggregate.
#[derive(Debug, Default)]
pub struct Transmit {
    state: Guarded<TransmitState>,
}

impl Transmit {
    pub fn new() -> Self {
        Self::default()
    }

    /// A snapshot of every field.
    pub fn state(&self) -> TransmitState {
        self.state.get()
    }
}

impl StaticObject for Transmit {
    const KIND: ObjectKind = ObjectKind::Transmit;

    fn parse_properties(&self, properties: &[(String, String)]) -> Vec<&'static str> {
        self.state.write(|s| {
            let mut changed = Vec::new();
            for (key, value) in properties {
                let Some(token) = TransmitToken::from_wire(key) else {
                    unknown_key(Self::KIND, key);
                    continue;
                };
                let percent = || coerce::int(value).map(clamp_percent);
                let outcome = match token {
                    TransmitToken::Frequency => assign(&mut s.frequency_hz, coerce::mhz_to_hz(value)),
                    TransmitToken::RfPower => assign(&mut s.rf_power, percent()),
                    TransmitToken::TunePower => assign(&mut s.tune_power, percent()),
                    TransmitToken::Tune => assign(&mut s.tune, Some(coerce::bool(value))),
                    TransmitToken::AmCarrierLevel => assign(&mut s.am_carrier_level, percent()),
                    TransmitToken::MicSelection => {
                        assign(&mut s.mic_selection, Some(value.to_uppercase()))
                    }
                    TransmitToken::MicLevel => assign(&mut s.mic_level, percent()),
                    TransmitToken::MicBoost => assign(&mut s.mic_boost, Some(coerce::bool(value))),
                    TransmitToken::MicBias => assign(&mut s.mic_bias, Some(coerce::bool(value))),
                    TransmitToken::MicAcc => assign(&mut s.mic_acc, Some(coerce::bool(value))),
                    TransmitToken::CompanderOn => {
                        assign(&mut s.compander_on, Some(coerce::bool(value)))
                    }
                    TransmitToken::CompanderLevel => assign(&mut s.compander_level, percent()),
                    TransmitToken::SpeechProcessorOn => {
                        assign(&mut s.speech_processor_on, Some(coerce::bool(value)))
                    }
                    TransmitToken::SpeechProcessorLevel => {
                        assign(&mut s.speech_processor_level, percent())
                    }
                    TransmitToken::VoxOn => assign(&mut s.vox_on, Some(coerce::bool(value))),
                    TransmitToken::VoxLevel => assign(&mut s.vox_level, percent()),
                    TransmitToken::VoxDelay => {
                        assign(&mut s.vox_delay_ms, coerce::int(value).map(clamp_delay))
                    }
                    TransmitToken::FilterLow => match coerce::int(value) {
                        Some(low) => {
                            let (low, high) = couple_filter_low(low, s.filter_high_hz);
                            if assign(&mut s.filter_high_hz, Some(high)) == Some(true) {
                                changed.push(TransmitToken::FilterHigh.as_str());
                            }
                            assign(&mut s.filter_low_hz, Some(low))
                        }
                        None => None,
                    },
                    TransmitToken::FilterHigh => match coerce::int(value) {
                        Some(high) => {
                            let (low, high) = couple_filter_high(s.filter_low_hz, high);
                            if assign(&mut s.filter_low_hz, Some(low)) == Some(true) {
                                changed.push(TransmitToken::FilterLow.as_str());
                            }
                            assign(&mut s.filter_high_hz, Some(high))
                        }
                        None => None,
                    },
                    TransmitToken::CwPitch => {
                        assign(&mut s.cw_pitch_hz, coerce::int(value).map(clamp_cw_pitch))
                    }
                    TransmitToken::CwSpeed => {
                        assign(&mut s.cw_speed_wpm, coerce::int(value).map(clamp_cw_speed))
                    }
                    TransmitToken::CwIambic => assign(&mut s.cw_iambic, Some(coerce::bool(value))),
                    TransmitToken::CwIambicMode => {
                        assign(&mut s.cw_iambic_mode, coerce::int::<u8>(value).map(|m| m.min(1)))
                    }
                    TransmitToken::CwSwapPaddles => {
                        assign(&mut s.cw_swap_paddles, Some(coerce::bool(value)))
                    }
                    TransmitToken::CwBreakIn => {
                        assign(&mut s.cw_break_in, Some(coerce::bool(value)))
                    }
                    TransmitToken::CwBreakInDelay => assign(
                        &mut s.cw_break_in_delay_ms,
                        coerce::int(value).map(clamp_delay),
                    ),
                    TransmitToken::CwSidetone => {
                        assign(&mut s.cw_sidetone, Some(coerce::bool(value)))
                    }
                    TransmitToken::MonitorGainCw => assign(&mut s.monitor_gain_cw, percent()),
                    TransmitToken::MonitorGainSb => assign(&mut s.monitor_gain_sb, percent()),
                    TransmitToken::SbMonitor => assign(&mut s.sb_monitor, Some(coerce::bool(value))),
                    TransmitToken::Dax => assign(&mut s.dax, Some(coerce::bool(value))),
                    TransmitToken::HwAlcEnabled => {
                        assign(&mut s.hw_alc_enabled, Some(coerce::bool(value)))
                    }
                    TransmitToken::Inhibit => assign(&mut s.inhibit, Some(coerce::bool(value))),
                    TransmitToken::MaxPowerLevel => assign(&mut s.max_power_level, percent()),
                    TransmitToken::ShowTxInWaterfall => {
                        assign(&mut s.show_tx_in_waterfall, Some(coerce::bool(value)))
                    }
                };
                note(&mut changed, Self::KIND, token.as_str(), value, outcome);
            }
            changed
        })
    }

    fn reset(&self) {
        self.state.set(TransmitState::default());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyvalue::parse_key_values;

    fn parse(t: &Transmit, line: &str) -> Vec<&'static str> {
        t.parse_properties(&parse_key_values(line))
    }

    #[test]
    fn cw_pitch_clamps() {
        let t = Transmit::new();
        parse(&t, "pitch=50");
        assert_eq!(t.state().cw_pitch_hz, 100);
        parse(&t, "pitch=7000");
        assert_eq!(t.state().cw_pitch_hz, 6000);
        parse(&t, "pitch=600");
        assert_eq!(t.state().cw_pitch_hz, 600);
    }

    #[test]
    fn cw_speed_and_percentages_clamp() {
        let t = Transmit::new();
        parse(&t, "speed=1 rfpower=150 tunepower=-5 mic_level=42");
        let s = t.state();
        assert_eq!(s.cw_speed_wpm, 5);
        assert_eq!(s.rf_power, 100);
        assert_eq!(s.tune_power, 0);
        assert_eq!(s.mic_level, 42);
        parse(&t, "speed=250");
        assert_eq!(t.state().cw_speed_wpm, 100);
    }

    #[test]
    fn filter_low_above_high_raises_high() {
        let t = Transmit::new();
        parse(&t, "lo=100 hi=2900");
        assert_eq!((t.state().filter_low_hz, t.state().filter_high_hz), (100, 2900));

        let changed = parse(&t, "lo=3000");
        let s = t.state();
        assert_eq!((s.filter_low_hz, s.filter_high_hz), (3000, 3000));
        assert!(changed.contains(&"lo"));
        assert!(changed.contains(&"hi"));
    }

    #[test]
    fn filter_high_below_low_lowers_low() {
        let t = Transmit::new();
        parse(&t, "lo=200 hi=2800");
        parse(&t, "hi=150");
        let s = t.state();
        assert_eq!((s.filter_low_hz, s.filter_high_hz), (150, 150));
    }

    #[test]
    fn filter_edges_clamp_to_range() {
        let t = Transmit::new();
        parse(&t, "hi=20000 lo=-10");
        let s = t.state();
        assert_eq!((s.filter_low_hz, s.filter_high_hz), (0, 10_000));
        assert!(s.filter_low_hz <= s.filter_high_hz);
    }

    #[test]
    fn booleans_and_frequency() {
        let t = Transmit::new();
        parse(&t, "freq=14.100000 vox_enable=1 compander=yes iambic_mode=1");
        let s = t.state();
        assert_eq!(s.frequency_hz, 14_100_000);
        assert!(s.vox_on);
        assert!(!s.compander_on);
        assert_eq!(s.cw_iambic_mode, 1);
    }

    #[test]
    fn unknown_and_invalid_values_are_skipped() {
        let t = Transmit::new();
        let changed = parse(&t, "bogus=1 pitch=abc speed=20");
        assert_eq!(changed, vec!["speed"]);
        assert_eq!(t.state().cw_pitch_hz, 0);
        assert_eq!(t.state().cw_speed_wpm, 20);
    }

    #[test]
    fn unchanged_values_not_reported() {
        let t = Transmit::new();
        assert_eq!(parse(&t, "rfpower=50"), vec!["rfpower"]);
        assert!(parse(&t, "rfpower=50").is_empty());
    }

    #[test]
    fn reset_clears_state() {
        let t = Transmit::new();
        parse(&t, "rfpower=50");
        t.reset();
        assert_eq!(t.state(), TransmitState::default());
    }

    #[test]
    fn coupling_helpers() {
        assert_eq!(couple_filter_low(3000, 2900), (3000, 3000));
        assert_eq!(couple_filter_low(100, 2900), (100, 2900));
        assert_eq!(couple_filter_high(200, 150), (150, 150));
        assert_eq!(couple_filter_high(-5, 20000), (0, 10_000));
    }
}
