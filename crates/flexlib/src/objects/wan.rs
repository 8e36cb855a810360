//! SmartLink server link status (`wan ...`).

use flexlib_core::{Guarded, ObjectKind};

use crate::keyvalue::coerce;
use crate::objects::{StaticObject, assign, note, unknown_key};
use crate::tokens::WanToken;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WanState {
    pub server_connected: bool,
    pub radio_authenticated: bool,
}

#[derive(Debug, Default)]
pub struct Wan {
    state: Guarded<WanState>,
}

impl Wan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> WanState {
        self.state.get()
    }
}

impl StaticObject for Wan {
    const KIND: ObjectKind = ObjectKind::Wan;

    fn parse_properties(&self, properties: &[(String, String)]) -> Vec<&'static str> {
        self.state.write(|s| {
            let mut changed = Vec::new();
            for (key, value) in properties {
                let Some(token) = WanToken::from_wire(key) else {
                    unknown_key(Self::KIND, key);
                    continue;
                };
                let outcome = match token {
                    WanToken::ServerConnected => {
                        assign(&mut s.server_connected, Some(coerce::bool(value)))
                    }
                    WanToken::RadioAuthenticated => {
                        assign(&mut s.radio_authenticated, Some(coerce::bool(value)))
                    }
                };
                note(&mut changed, Self::KIND, token.as_str(), value, outcome);
            }
            changed
        })
    }

    fn reset(&self) {
        self.state.set(WanState::default());
    }
}
