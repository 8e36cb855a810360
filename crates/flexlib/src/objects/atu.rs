//! Antenna tuner singleton (`atu ...`).

use flexlib_core::{Guarded, ObjectKind};

use crate::keyvalue::coerce;
use crate::objects::{StaticObject, assign, note, unknown_key};
use crate::tokens::AtuToken;

/// Tune progress reported in `atu status=...`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AtuStatus {
    #[default]
    None,
    TuneNotStarted,
    TuneInProgress,
    TuneBypass,
    TuneSuccessful,
    TuneOk,
    TuneFailBypass,
    TuneFail,
    TuneAborted,
    TuneManualBypass,
}

impl AtuStatus {
    fn from_wire(value: &str) -> Self {
        match value {
            "TUNE_NOT_STARTED" => AtuStatus::TuneNotStarted,
            "TUNE_IN_PROGRESS" => AtuStatus::TuneInProgress,
            "TUNE_BYPASS" => AtuStatus::TuneBypass,
            "TUNE_SUCCESSFUL" => AtuStatus::TuneSuccessful,
            "TUNE_OK" => AtuStatus::TuneOk,
            "TUNE_FAIL_BYPASS" => AtuStatus::TuneFailBypass,
            "TUNE_FAIL" => AtuStatus::TuneFail,
            "TUNE_ABORTED" => AtuStatus::TuneAborted,
            "TUNE_MANUAL_BYPASS" => AtuStatus::TuneManualBypass,
            _ => AtuStatus::None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AtuState {
    pub status: AtuStatus,
    pub enabled: bool,
    pub memories_enabled: bool,
    pub using_memory: bool,
}

#[derive(Debug, Default)]
pub struct Atu {
    state: Guarded<AtuState>,
}

impl Atu {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> AtuState {
        self.state.get()
    }
}

impl StaticObject for Atu {
    const KIND: ObjectKind = ObjectKind::Atu;

    fn parse_properties(&self, properties: &[(String, String)]) -> Vec<&'static str> {
        self.state.write(|s| {
            let mut changed = Vec::new();
            for (key, value) in properties {
                let Some(token) = AtuToken::from_wire(key) else {
                    unknown_key(Self::KIND, key);
                    continue;
                };
                let outcome = match token {
                    AtuToken::Status => assign(&mut s.status, Some(AtuStatus::from_wire(value))),
                    AtuToken::Enabled => assign(&mut s.enabled, Some(coerce::bool(value))),
                    AtuToken::MemoriesEnabled => {
                        assign(&mut s.memories_enabled, Some(coerce::bool(value)))
                    }
                    AtuToken::UsingMemory => assign(&mut s.using_memory, Some(coerce::bool(value))),
                };
                note(&mut changed, Self::KIND, token.as_str(), value, outcome);
            }
            changed
        })
    }

    fn reset(&self) {
        self.state.set(AtuState::default());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyvalue::parse_key_values;

    #[test]
    fn parses_status() {
        let atu = Atu::new();
        atu.parse_properties(&parse_key_values(
            "status=TUNE_SUCCESSFUL atu_enabled=1 memories_enabled=0",
        ));
        let s = atu.state();
        assert_eq!(s.status, AtuStatus::TuneSuccessful);
        assert!(s.enabled);
        assert!(!s.memories_enabled);
    }
}
