//! Transverters (`xvtr <n> ...`).

use std::sync::atomic::AtomicBool;

use flexlib_core::{Guarded, ObjectKind};

use crate::keyvalue::coerce;
use crate::objects::{DynamicObject, assign, note, unknown_key};
use crate::tokens::TransverterToken;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransverterState {
    pub in_use: bool,
    pub name: String,
    pub rf_frequency_hz: u64,
    pub if_frequency_hz: u64,
    pub lo_error_hz: i64,
    pub max_power: f64,
    pub rx_gain: f64,
    pub rx_only: bool,
    pub order: u32,
    pub is_valid: bool,
    pub preferred: bool,
    pub two_meter_int: bool,
}

#[derive(Debug)]
pub struct Transverter {
    id: u32,
    state: Guarded<TransverterState>,
    initialized: AtomicBool,
}

impl Transverter {
    pub fn state(&self) -> TransverterState {
        self.state.get()
    }
}

impl DynamicObject for Transverter {
    const KIND: ObjectKind = ObjectKind::Transverter;

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
                let Some(token) = TransverterToken::from_wire(key) else {
                    unknown_key(Self::KIND, key);
                    continue;
                };
                let flag = Some(coerce::bool(value));
                let outcome = match token {
                    TransverterToken::InUse => assign(&mut s.in_use, flag),
                    TransverterToken::Name => assign(&mut s.name, Some(value.clone())),
                    TransverterToken::RfFrequency => {
                        assign(&mut s.rf_frequency_hz, coerce::mhz_to_hz(value))
                    }
                    TransverterToken::IfFrequency => {
                        assign(&mut s.if_frequency_hz, coerce::mhz_to_hz(value))
                    }
                    TransverterToken::LoError => assign(&mut s.lo_error_hz, coerce::int(value)),
                    TransverterToken::MaxPower => assign(&mut s.max_power, coerce::float(value)),
                    TransverterToken::RxGain => assign(&mut s.rx_gain, coerce::float(value)),
                    TransverterToken::RxOnly => assign(&mut s.rx_only, flag),
                    TransverterToken::Order => assign(&mut s.order, coerce::int(value)),
                    TransverterToken::IsValid => assign(&mut s.is_valid, flag),
                    TransverterToken::Preferred => assign(&mut s.preferred, flag),
                    TransverterToken::TwoMeterInt => assign(&mut s.two_meter_int, flag),
                };
                note(&mut changed, Self::KIND, token.as_str(), value, outcome);
            }
            changed
        })
    }

    fn is_ready(&self) -> bool {
        self.state.read(|s| s.in_use)
    }

    fn initialized_flag(&self) -> &AtomicBool {
        &self.initialized
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyvalue::parse_key_values;

    #[test]
    fn parses_frequencies() {
        let x = Transverter::create(0);
        let out = x.parse_properties(&parse_key_values(
            "in_use=1 name=2m rf_freq=144.000000 if_freq=28.000000 lo_error=-150 rx_only=0",
        ));
        assert!(out.became_ready);
        let s = x.state();
        assert_eq!(s.name, "2m");
        assert_eq!(s.rf_frequency_hz, 144_000_000);
        assert_eq!(s.if_frequency_hz, 28_000_000);
        assert_eq!(s.lo_error_hz, -150);
    }
}
