//! Mirrored radio objects and their property parsers.
//!
//! Two lifecycle disciplines share the same "apply key/value pairs"
//! capability:
//!
//! - [`DynamicObject`]: identifier-keyed collection members (slices,
//!   streams, panadapters, transverters, meters). The
//!   [`Registry`](crate::registry::Registry) creates and destroys them.
//! - [`StaticObject`]: session singletons (transmit, interlock, GPS, ...).
//!   They are parsed in place and reset on disconnect.
//!
//! Every parser applies a whole status line under one guarded write and
//! reports the wire names of the fields whose values changed. Unknown keys
//! and values that fail to coerce are logged and skipped.

use std::sync::atomic::{AtomicBool, Ordering};

use flexlib_core::ObjectKind;

pub mod atu;
pub mod clients;
pub mod display;
pub mod gps;
pub mod interlock;
pub mod meter;
pub mod profile;
pub mod radio;
pub mod slice;
pub mod streams;
pub mod transmit;
pub mod transverter;
pub mod wan;
pub mod waveform;

pub use atu::{Atu, AtuState, AtuStatus};
pub use clients::{ClientChange, ClientTable, GuiClient};
pub use display::{Panadapter, PanadapterState, Waterfall, WaterfallState};
pub use gps::{Gps, GpsState};
pub use interlock::{Interlock, InterlockState, InterlockStatus};
pub use meter::{Meter, MeterState, MeterUnits, group_meter_entries};
pub use profile::{Profile, ProfileState};
pub use radio::{Radio, RadioInfo};
pub use slice::{Slice, SliceState};
pub use streams::{
    AudioStream, AudioStreamState, IqStream, IqStreamState, MicAudioStream, MicAudioStreamState,
    OpusStream, OpusStreamState, TxAudioStream, TxAudioStreamState,
};
pub use transmit::{Transmit, TransmitState};
pub use transverter::{Transverter, TransverterState};
pub use wan::{Wan, WanState};
pub use waveform::{Waveform, WaveformState};

/// Result of one property-parse pass over a collection object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseOutcome {
    /// Wire names of fields whose value changed.
    pub changed: Vec<&'static str>,
    /// This pass completed initialization. True at most once per object.
    pub became_ready: bool,
}

/// An identifier-keyed collection member.
pub trait DynamicObject: Send + Sync + 'static {
    const KIND: ObjectKind;

    /// Whether a first status must carry `in_use=1` before the object is
    /// created. Objects without an in-use field are created on first sight.
    const CREATED_BY_IN_USE: bool = true;

    fn create(id: u32) -> Self;

    fn id(&self) -> u32;

    /// Apply key/value pairs, returning the wire names that changed.
    fn apply_properties(&self, properties: &[(String, String)]) -> Vec<&'static str>;

    /// Whether the object's required fields are all present.
    fn is_ready(&self) -> bool;

    /// The flag recording that the "added" notification has fired.
    fn initialized_flag(&self) -> &AtomicBool;

    /// Apply pairs and flip the initialized flag the first time the object
    /// becomes ready.
    fn parse_properties(&self, properties: &[(String, String)]) -> ParseOutcome {
        let changed = self.apply_properties(properties);
        let became_ready = self.is_ready()
            && self
                .initialized_flag()
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok();
        ParseOutcome {
            changed,
            became_ready,
        }
    }

    fn is_initialized(&self) -> bool {
        self.initialized_flag().load(Ordering::Acquire)
    }
}

/// A session-wide singleton.
pub trait StaticObject: Send + Sync {
    const KIND: ObjectKind;

    /// Apply key/value pairs, returning the wire names that changed.
    fn parse_properties(&self, properties: &[(String, String)]) -> Vec<&'static str>;

    /// Return to the just-constructed state.
    fn reset(&self);
}

/// Write `value` into `field`. `None` means the wire value failed to
/// coerce; `Some(changed)` reports whether the field differs now.
pub(crate) fn assign<T: PartialEq>(field: &mut T, value: Option<T>) -> Option<bool> {
    let value = value?;
    if *field == value {
        return Some(false);
    }
    *field = value;
    Some(true)
}

/// Record the outcome of one [`assign`].
pub(crate) fn note(
    changed: &mut Vec<&'static str>,
    kind: ObjectKind,
    wire: &'static str,
    value: &str,
    outcome: Option<bool>,
) {
    match outcome {
        Some(true) => changed.push(wire),
        Some(false) => {}
        None => tracing::debug!(object = %kind, key = wire, value = %value, "Invalid value skipped"),
    }
}

pub(crate) fn unknown_key(kind: ObjectKind, key: &str) {
    tracing::trace!(object = %kind, key = %key, "Unknown status key");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assign_reports_change() {
        let mut field = 5;
        assert_eq!(assign(&mut field, Some(5)), Some(false));
        assert_eq!(assign(&mut field, Some(6)), Some(true));
        assert_eq!(field, 6);
        assert_eq!(assign(&mut field, None), None);
        assert_eq!(field, 6);
    }

    #[test]
    fn note_collects_changed_only() {
        let mut changed = Vec::new();
        note(&mut changed, ObjectKind::Gps, "lat", "1", Some(true));
        note(&mut changed, ObjectKind::Gps, "lon", "1", Some(false));
        note(&mut changed, ObjectKind::Gps, "grid", "?", None);
        assert_eq!(changed, vec!["lat"]);
    }
}
