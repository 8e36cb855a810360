//! Slice receivers (`slice <n> ...`).

use std::sync::atomic::AtomicBool;

use flexlib_core::{Guarded, ObjectKind};

use crate::keyvalue::coerce;
use crate::objects::transmit::clamp_percent;
use crate::objects::{DynamicObject, assign, note, unknown_key};
use crate::tokens::SliceToken;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SliceState {
    pub in_use: bool,
    pub frequency_hz: u64,
    pub mode: String,
    /// Stream id of the panadapter this slice sits on.
    pub panadapter: u32,
    pub filter_low_hz: i32,
    pub filter_high_hz: i32,
    pub active: bool,
    pub transmit: bool,
    pub dax_channel: u32,
    pub index_letter: String,
    pub client_handle: u32,
    pub rx_antenna: String,
    pub tx_antenna: String,
    pub agc_mode: String,
    pub agc_threshold: i32,
    pub audio_level: i32,
    pub audio_pan: i32,
    pub audio_mute: bool,
    pub rit_on: bool,
    pub rit_frequency_hz: i32,
    pub xit_on: bool,
    pub xit_frequency_hz: i32,
    pub step_hz: u32,
    pub lock: bool,
    pub noise_blanker: bool,
    pub noise_blanker_level: i32,
    pub noise_reduction: bool,
    pub noise_reduction_level: i32,
    pub squelch: bool,
    pub squelch_level: i32,
    pub sample_rate: u32,
}

/// A receiver slice. Identified by a small decimal index.
#[derive(Debug)]
pub struct Slice {
    id: u32,
    state: Guarded<SliceState>,
    initialized: AtomicBool,
}

impl Slice {
    pub fn state(&self) -> SliceState {
        self.state.get()
    }

    pub fn frequency_hz(&self) -> u64 {
        self.state.read(|s| s.frequency_hz)
    }

    pub fn mode(&self) -> String {
        self.state.read(|s| s.mode.clone())
    }
}

impl DynamicObject for Slice {
    const KIND: ObjectKind = ObjectKind::Slice;

    fn create(id: u32) -> Self {
        Self {
            id,
            state: Guarded::default(),
            initialized: AtomicBool::new(false),
        }
    }

    fn id(&self) -> u32 {
        self.id
    }

    fn apply_properties(&self, properties: &[(String, String)]) -> Vec<&'static str> {
        self.state.write(|s| {
            let mut changed = Vec::new();
            for (key, value) in properties {
                let Some(token) = SliceToken::from_wire(key) else {
                    unknown_key(Self::KIND, key);
                    continue;
                };
                let flag = Some(coerce::bool(value));
                let percent = || coerce::int(value).map(clamp_percent);
                let outcome = match token {
                    SliceToken::InUse => assign(&mut s.in_use, flag),
                    SliceToken::Frequency => assign(&mut s.frequency_hz, coerce::mhz_to_hz(value)),
                    SliceToken::Mode => assign(&mut s.mode, Some(value.to_ascii_uppercase())),
                    SliceToken::Panadapter => assign(&mut s.panadapter, coerce::hex_u32(value)),
                    SliceToken::FilterLow => assign(&mut s.filter_low_hz, coerce::int(value)),
                    SliceToken::FilterHigh => assign(&mut s.filter_high_hz, coerce::int(value)),
                    SliceToken::Active => assign(&mut s.active, flag),
                    SliceToken::Transmit => assign(&mut s.transmit, flag),
                    SliceToken::DaxChannel => assign(&mut s.dax_channel, coerce::int(value)),
                    SliceToken::IndexLetter => assign(&mut s.index_letter, Some(value.clone())),
                    SliceToken::ClientHandle => assign(&mut s.client_handle, coerce::hex_u32(value)),
                    SliceToken::RxAntenna => assign(&mut s.rx_antenna, Some(value.clone())),
                    SliceToken::TxAntenna => assign(&mut s.tx_antenna, Some(value.clone())),
                    SliceToken::AgcMode => assign(&mut s.agc_mode, Some(value.clone())),
                    SliceToken::AgcThreshold => assign(&mut s.agc_threshold, percent()),
                    SliceToken::AudioLevel => assign(&mut s.audio_level, percent()),
                    SliceToken::AudioPan => assign(&mut s.audio_pan, percent()),
                    SliceToken::AudioMute => assign(&mut s.audio_mute, flag),
                    SliceToken::RitOn => assign(&mut s.rit_on, flag),
                    SliceToken::RitFrequency => assign(&mut s.rit_frequency_hz, coerce::int(value)),
                    SliceToken::XitOn => assign(&mut s.xit_on, flag),
                    SliceToken::XitFrequency => assign(&mut s.xit_frequency_hz, coerce::int(value)),
                    SliceToken::Step => assign(&mut s.step_hz, coerce::int(value)),
                    SliceToken::Lock => assign(&mut s.lock, flag),
                    SliceToken::NoiseBlanker => assign(&mut s.noise_blanker, flag),
                    SliceToken::NoiseBlankerLevel => assign(&mut s.noise_blanker_level, percent()),
                    SliceToken::NoiseReduction => assign(&mut s.noise_reduction, flag),
                    SliceToken::NoiseReductionLevel => {
                        assign(&mut s.noise_reduction_level, percent())
                    }
                    SliceToken::Squelch => assign(&mut s.squelch, flag),
                    SliceToken::SquelchLevel => assign(&mut s.squelch_level, percent()),
                    SliceToken::SampleRate => assign(&mut s.sample_rate, coerce::int(value)),
                };
                note(&mut changed, Self::KIND, token.as_str(), value, outcome);
            }
            changed
        })
    }

    /// In use, tuned, with a mode, on a panadapter.
    fn is_ready(&self) -> bool {
        self.state
            .read(|s| s.in_use && s.frequency_hz != 0 && !s.mode.is_empty() && s.panadapter != 0)
    }

    fn initialized_flag(&self) -> &AtomicBool {
        &self.initialized
    }
}
