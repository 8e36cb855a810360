//! Profile sets.
//!
//! One `profile` discriminator carries six different messages, told apart
//! by a two-word token: the profile set (`global`, `mic`, `tx`) and the
//! item (`list`, `current`):
//!
//! ```text
//! profile global list=Default^Contest^DX^
//! profile tx current=Default
//! profile mic current=
//! ```
//!
//! A list is split on `^`, dropping the trailing empty entry. An empty
//! current value means nothing is selected.

use flexlib_core::{Guarded, ObjectKind};

use crate::keyvalue::parse_list;
use crate::objects::{StaticObject, assign, note};
use crate::tokens::{ProfileItemToken, ProfileSetToken};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileState {
    pub global_list: Vec<String>,
    pub mic_list: Vec<String>,
    pub tx_list: Vec<String>,
    pub global_current: Option<String>,
    pub mic_current: Option<String>,
    pub tx_current: Option<String>,
}

#[derive(Debug, Default)]
pub struct Profile {
    state: Guarded<ProfileState>,
}

impl Profile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ProfileState {
        self.state.get()
    }

    /// Apply one profile message.
    ///
    /// `set` and `item` are the two leading words; `value` is what follows
    /// `item=`. Returns the changed field name, e.g. `"global list"`.
    pub fn apply(&self, set: &str, item: &str, value: &str) -> Vec<&'static str> {
        let (Some(set_token), Some(item_token)) =
            (ProfileSetToken::from_wire(set), ProfileItemToken::from_wire(item))
        else {
            tracing::debug!(set = %set, item = %item, "Unknown profile message");
            return Vec::new();
        };

        let current = (!value.is_empty()).then(|| value.to_string());
        let list = || parse_list(value, '^');

        self.state.write(|s| {
            let (wire, outcome) = match (set_token, item_token) {
                (ProfileSetToken::Global, ProfileItemToken::List) => {
                    ("global list", assign(&mut s.global_list, Some(list())))
                }
                (ProfileSetToken::Mic, ProfileItemToken::List) => {
                    ("mic list", assign(&mut s.mic_list, Some(list())))
                }
                (ProfileSetToken::Transmit, ProfileItemToken::List) => {
                    ("tx list", assign(&mut s.tx_list, Some(list())))
                }
                (ProfileSetToken::Global, ProfileItemToken::Current) => {
                    ("global current", assign(&mut s.global_current, Some(current)))
                }
                (ProfileSetToken::Mic, ProfileItemToken::Current) => {
                    ("mic current", assign(&mut s.mic_current, Some(current)))
                }
                (ProfileSetToken::Transmit, ProfileItemToken::Current) => {
                    ("tx current", assign(&mut s.tx_current, Some(current)))
                }
            };
            let mut changed = Vec::new();
            note(&mut changed, Self::KIND, wire, value, outcome);
            changed
        })
    }
}

impl StaticObject for Profile {
    const KIND: ObjectKind = ObjectKind::Profile;

    /// Expects the pairs of a `profile` line: the set word first (as a bare
    /// key), then `item=value`.
    fn parse_properties(&self, properties: &[(String, String)]) -> Vec<&'static str> {
        match properties {
            [(set, set_value), (item, value), ..] if set_value.is_empty() => {
                self.apply(set, item, value)
            }
            _ => {
                tracing::debug!(pairs = properties.len(), "Malformed profile status");
                Vec::new()
            }
        }
    }

    fn reset(&self) {
        self.state.set(ProfileState::default());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyvalue::parse_key_values;

    #[test]
    fn list_and_current_are_distinct() {
        let p = Profile::new();
        let changed = p.parse_properties(&parse_key_values("global list=Default^Contest^DX^"));
        assert_eq!(changed, vec!["global list"]);
        let changed = p.parse_properties(&parse_key_values("global current=Contest"));
        assert_eq!(changed, vec!["global current"]);

        let s = p.state();
        assert_eq!(s.global_list, vec!["Default", "Contest", "DX"]);
        assert_eq!(s.global_current.as_deref(), Some("Contest"));
        assert!(s.tx_list.is_empty());
    }

    #[test]
    fn empty_current_is_no_selection() {
        let p = Profile::new();
        p.parse_properties(&parse_key_values("mic current=Voice"));
        p.parse_properties(&parse_key_values("mic current="));
        assert_eq!(p.state().mic_current, None);
    }

    #[test]
    fn repeated_value_reports_no_change() {
        let p = Profile::new();
        assert_eq!(p.apply("tx", "list", "A^B^"), vec!["tx list"]);
        assert!(p.apply("tx", "list", "A^B^").is_empty());
    }

    #[test]
    fn unknown_set_ignored() {
        let p = Profile::new();
        assert!(p.apply("amp", "list", "A^").is_empty());
        assert!(p.parse_properties(&parse_key_values("global")).is_empty());
    }
}
