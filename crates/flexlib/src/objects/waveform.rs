//! Installed waveform list (`waveform installed_list=A^B^`).

use flexlib_core::{Guarded, ObjectKind};

use crate::keyvalue::parse_list;
use crate::objects::{StaticObject, assign, note, unknown_key};
use crate::tokens::WaveformToken;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WaveformState {
    pub installed: Vec<String>,
}

#[derive(Debug, Default)]
pub struct Waveform {
    state: Guarded<WaveformState>,
}

impl Waveform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn installed(&self) -> Vec<String> {
        self.state.read(|s| s.installed.clone())
    }
}

impl StaticObject for Waveform {
    const KIND: ObjectKind = ObjectKind::Waveform;

    fn parse_properties(&self, properties: &[(String, String)]) -> Vec<&'static str> {
        self.state.write(|s| {
            let mut changed = Vec::new();
            for (key, value) in properties {
                let Some(token) = WaveformToken::from_wire(key) else {
                    unknown_key(Self::KIND, key);
                    continue;
                };
                let outcome = match token {
                    WaveformToken::InstalledList => {
                        assign(&mut s.installed, Some(parse_list(value, '^')))
                    }
                };
                note(&mut changed, Self::KIND, token.as_str(), value, outcome);
            }
            changed
        })
    }

    fn reset(&self) {
        self.state.set(WaveformState::default());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyvalue::parse_key_values;

    #[test]
    fn installed_list_drops_trailing_entry() {
        let w = Waveform::new();
        w.parse_properties(&parse_key_values("installed_list=FreeDV^RADE^"));
        assert_eq!(w.installed(), vec!["FreeDV", "RADE"]);
    }
}
