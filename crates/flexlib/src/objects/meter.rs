//! Meters.
//!
//! The radio assigns meter ids at runtime and describes them in `meter`
//! status lines of `#`-separated `<id>.<key>=<value>` entries:
//!
//! ```text
//! meter 7.src=SLC#7.num=0#7.nam=LEVEL#7.unit=dBm#7.low=-150.0#7.hi=20.0#7.fps=10#
//! ```
//!
//! Readings arrive over UDP as raw `i16` values (class 0x8002) and are
//! scaled by the meter's units.

use std::sync::atomic::AtomicBool;

use flexlib_core::{Guarded, ObjectKind};

use crate::keyvalue::coerce;
use crate::objects::{DynamicObject, assign, note, unknown_key};
use crate::tokens::MeterToken;

/// Engineering units of a meter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MeterUnits {
    #[default]
    None,
    Dbm,
    Dbfs,
    Swr,
    Volts,
    Amps,
    DegreesC,
    DegreesF,
    Rpm,
    Watts,
    Percent,
}

impl MeterUnits {
    pub fn from_wire(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "dbm" => MeterUnits::Dbm,
            "dbfs" => MeterUnits::Dbfs,
            "swr" => MeterUnits::Swr,
            "volts" => MeterUnits::Volts,
            "amps" => MeterUnits::Amps,
            "degc" => MeterUnits::DegreesC,
            "degf" => MeterUnits::DegreesF,
            "rpm" => MeterUnits::Rpm,
            "watts" => MeterUnits::Watts,
            "percent" => MeterUnits::Percent,
            _ => MeterUnits::None,
        }
    }

    /// Convert a raw fixed-point reading.
    pub fn scale(self, raw: i16) -> f64 {
        let raw = raw as f64;
        match self {
            MeterUnits::Dbm | MeterUnits::Dbfs | MeterUnits::Swr => raw / 128.0,
            MeterUnits::Volts | MeterUnits::Amps => raw / 256.0,
            MeterUnits::DegreesC | MeterUnits::DegreesF => raw / 64.0,
            _ => raw,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeterState {
    /// Owning subsystem (`SLC`, `TX-`, `RAD`, `AMP`, ...).
    pub source: String,
    /// Index within the source, e.g. the slice number.
    pub source_index: u32,
    pub name: String,
    pub low: f64,
    pub high: f64,
    pub description: String,
    pub units: MeterUnits,
    pub fps: u32,
}

#[derive(Debug)]
pub struct Meter {
    id: u32,
    state: Guarded<MeterState>,
    initialized: AtomicBool,
    raw: Guarded<Option<i16>>,
}

impl Meter {
    pub fn state(&self) -> MeterState {
        self.state.get()
    }

    pub fn name(&self) -> String {
        self.state.read(|s| s.name.clone())
    }

    /// Latest raw reading.
    pub fn raw_value(&self) -> Option<i16> {
        self.raw.get()
    }

    /// Latest reading in the meter's units.
    pub fn value(&self) -> Option<f64> {
        let units = self.state.read(|s| s.units);
        self.raw.get().map(|raw| units.scale(raw))
    }

    pub(crate) fn update(&self, raw: i16) {
        self.raw.set(Some(raw));
    }
}

impl DynamicObject for Meter {
    const KIND: ObjectKind = ObjectKind::Meter;
    const CREATED_BY_IN_USE: bool = false;

    fn create(id: u32) -> Self {
        Self {
            id,
            state: Guarded::default(),
            initialized: AtomicBool::new(false),
            raw: Guarded::new(None),
        }
    }

    fn id(&self) -> u32 {
        self.id
    }

    fn apply_properties(&self, properties: &[(String, String)]) -> Vec<&'static str> {
        self.state.write(|s| {
            let mut changed = Vec::new();
            for (key, value) in properties {
                let Some(token) = MeterToken::from_wire(key) else {
                    unknown_key(Self::KIND, key);
                    continue;
                };
                let outcome = match token {
                    MeterToken::Source => assign(&mut s.source, Some(value.clone())),
                    MeterToken::SourceIndex => assign(&mut s.source_index, coerce::int(value)),
                    MeterToken::Name => assign(&mut s.name, Some(value.clone())),
                    MeterToken::Low => assign(&mut s.low, coerce::float(value)),
                    MeterToken::High => assign(&mut s.high, coerce::float(value)),
                    MeterToken::Description => assign(&mut s.description, Some(value.clone())),
                    MeterToken::Units => assign(&mut s.units, Some(MeterUnits::from_wire(value))),
                    MeterToken::Fps => assign(&mut s.fps, coerce::int(value)),
                };
                note(&mut changed, Self::KIND, token.as_str(), value, outcome);
            }
            changed
        })
    }

    fn is_ready(&self) -> bool {
        self.state.read(|s| !s.name.is_empty())
    }

    fn initialized_flag(&self) -> &AtomicBool {
        &self.initialized
    }
}

/// Split a `meter` status body into per-meter property lists.
///
/// Entries without a numeric `<id>.` prefix are dropped. Ids keep their
/// first-seen order.
pub fn group_meter_entries(pairs: &[(String, String)]) -> Vec<(u32, Vec<(String, String)>)> {
    let mut grouped: Vec<(u32, Vec<(String, String)>)> = Vec::new();
    for (key, value) in pairs {
        let Some((id, field)) = key.split_once('.') else {
            tracing::trace!(key = %key, "Meter entry without id");
            continue;
        };
        let Ok(id) = id.parse::<u32>() else {
            tracing::trace!(key = %key, "Meter entry with bad id");
            continue;
        };
        let entry = (field.to_string(), value.clone());
        match grouped.iter_mut().find(|(gid, _)| *gid == id) {
            Some((_, list)) => list.push(entry),
            None => grouped.push((id, vec![entry])),
        }
    }
    grouped
}
