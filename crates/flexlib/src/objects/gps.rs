//! GPS singleton. The radio sends `gps` fields `#`-delimited because
//! several values contain spaces.

use flexlib_core::{Guarded, ObjectKind};

use crate::keyvalue::coerce;
use crate::objects::{StaticObject, assign, note, unknown_key};
use crate::tokens::GpsToken;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GpsState {
    pub latitude: String,
    pub longitude: String,
    pub grid: String,
    pub altitude: String,
    pub satellites_tracked: u32,
    pub satellites_visible: u32,
    pub speed: String,
    pub frequency_error: String,
    pub status: String,
    pub time: String,
    pub track: f64,
}

#[derive(Debug, Default)]
pub struct Gps {
    state: Guarded<GpsState>,
}

impl Gps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> GpsState {
        self.state.get()
    }
}

impl StaticObject for Gps {
    const KIND: ObjectKind = ObjectKind::Gps;

    fn parse_properties(&self, properties: &[(String, String)]) -> Vec<&'static str> {
        self.state.write(|s| {
            let mut changed = Vec::new();
            for (key, value) in properties {
                let Some(token) = GpsToken::from_wire(key) else {
                    unknown_key(Self::KIND, key);
                    continue;
                };
                let text = Some(value.clone());
                let outcome = match token {
                    GpsToken::Latitude => assign(&mut s.latitude, text),
                    GpsToken::Longitude => assign(&mut s.longitude, text),
                    GpsToken::Grid => assign(&mut s.grid, text),
                    GpsToken::Altitude => assign(&mut s.altitude, text),
                    GpsToken::Tracked => assign(&mut s.satellites_tracked, coerce::int(value)),
                    GpsToken::Visible => assign(&mut s.satellites_visible, coerce::int(value)),
                    GpsToken::Speed => assign(&mut s.speed, text),
                    GpsToken::FrequencyError => assign(&mut s.frequency_error, text),
                    GpsToken::Status => assign(&mut s.status, text),
                    GpsToken::Time => assign(&mut s.time, text),
                    GpsToken::Track => assign(&mut s.track, coerce::float(value)),
                };
                note(&mut changed, Self::KIND, token.as_str(), value, outcome);
            }
            changed
        })
    }

    fn reset(&self) {
        self.state.set(GpsState::default());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyvalue::{KeyValueOptions, parse_key_values_with};

    #[test]
    fn hash_delimited_fields() {
        let gps = Gps::new();
        let kv = parse_key_values_with(
            "lat=41.7#lon=-72.7#grid=FN31pr#status=Fine Lock#tracked=9#visible=12#track=0.0#",
            &KeyValueOptions::delimited('#'),
        );
        gps.parse_properties(&kv);
        let s = gps.state();
        assert_eq!(s.grid, "FN31pr");
        assert_eq!(s.status, "Fine Lock");
        assert_eq!(s.satellites_tracked, 9);
        assert_eq!(s.satellites_visible, 12);
    }
}
