//! Radio-wide settings and identity.
//!
//! Fed by `radio ...` status lines and by the comma-separated reply to the
//! `info` command; both use the same key names.

use flexlib_core::{Guarded, ObjectKind};

use crate::keyvalue::coerce;
use crate::objects::transmit::clamp_percent;
use crate::objects::{StaticObject, assign, note, unknown_key};
use crate::tokens::RadioToken;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RadioInfo {
    pub model: String,
    pub chassis_serial: String,
    pub nickname: String,
    pub callsign: String,
    pub software_version: String,
    pub region: String,
    pub options: String,
    pub mac: String,
    pub ip: String,
    pub atu_present: bool,
    pub gps_present: bool,
    pub num_scu: u32,
    pub num_slice: u32,
    pub num_tx: u32,
    pub slices_available: u32,
    pub panadapters_available: u32,
    pub lineout_gain: i32,
    pub lineout_mute: bool,
    pub headphone_gain: i32,
    pub headphone_mute: bool,
    pub remote_on_enabled: bool,
    pub pll_done: bool,
    pub freq_error_ppb: i32,
    pub cal_freq_hz: u64,
    pub tnf_enabled: bool,
    pub binaural_rx: bool,
    pub full_duplex_enabled: bool,
    pub mute_local_audio_when_remote: bool,
    pub daxiq_capacity: u32,
    pub daxiq_available: u32,
}

#[derive(Debug, Default)]
pub struct Radio {
    state: Guarded<RadioInfo>,
}

impl Radio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn info(&self) -> RadioInfo {
        self.state.get()
    }
}

impl StaticObject for Radio {
    const KIND: ObjectKind = ObjectKind::Radio;

    fn parse_properties(&self, properties: &[(String, String)]) -> Vec<&'static str> {
        self.state.write(|s| {
            let mut changed = Vec::new();
            for (key, value) in properties {
                let Some(token) = RadioToken::from_wire(key) else {
                    unknown_key(Self::KIND, key);
                    continue;
                };
                let flag = Some(coerce::bool(value));
                let text = Some(value.clone());
                let outcome = match token {
                    RadioToken::Model => assign(&mut s.model, text),
                    RadioToken::ChassisSerial => assign(&mut s.chassis_serial, text),
                    RadioToken::Nickname => assign(&mut s.nickname, text),
                    RadioToken::Callsign => assign(&mut s.callsign, text),
                    RadioToken::SoftwareVersion => assign(&mut s.software_version, text),
                    RadioToken::Region => assign(&mut s.region, text),
                    RadioToken::Options => assign(&mut s.options, text),
                    RadioToken::Mac => assign(&mut s.mac, text),
                    RadioToken::Ip => assign(&mut s.ip, text),
                    RadioToken::AtuPresent => assign(&mut s.atu_present, flag),
                    RadioToken::GpsPresent => {
                        // `gps=Not Present` in info replies, `gps=1` elsewhere.
                        let present = coerce::bool(value) || value.eq_ignore_ascii_case("present");
                        assign(&mut s.gps_present, Some(present))
                    }
                    RadioToken::NumScu => assign(&mut s.num_scu, coerce::int(value)),
                    RadioToken::NumSlice => assign(&mut s.num_slice, coerce::int(value)),
                    RadioToken::NumTx => assign(&mut s.num_tx, coerce::int(value)),
                    RadioToken::Slices => assign(&mut s.slices_available, coerce::int(value)),
                    RadioToken::Panadapters => {
                        assign(&mut s.panadapters_available, coerce::int(value))
                    }
                    RadioToken::LineoutGain => {
                        assign(&mut s.lineout_gain, coerce::int(value).map(clamp_percent))
                    }
                    RadioToken::LineoutMute => assign(&mut s.lineout_mute, flag),
                    RadioToken::HeadphoneGain => {
                        assign(&mut s.headphone_gain, coerce::int(value).map(clamp_percent))
                    }
                    RadioToken::HeadphoneMute => assign(&mut s.headphone_mute, flag),
                    RadioToken::RemoteOnEnabled => assign(&mut s.remote_on_enabled, flag),
                    RadioToken::PllDone => assign(&mut s.pll_done, flag),
                    RadioToken::FrequencyErrorPpb => {
                        assign(&mut s.freq_error_ppb, coerce::int(value))
                    }
                    RadioToken::CalibrationFrequency => {
                        assign(&mut s.cal_freq_hz, coerce::mhz_to_hz(value))
                    }
                    RadioToken::TnfEnabled => assign(&mut s.tnf_enabled, flag),
                    RadioToken::BinauralRx => assign(&mut s.binaural_rx, flag),
                    RadioToken::FullDuplexEnabled => assign(&mut s.full_duplex_enabled, flag),
                    RadioToken::MuteLocalAudioWhenRemote => {
                        assign(&mut s.mute_local_audio_when_remote, flag)
                    }
                    RadioToken::DaxIqCapacity => assign(&mut s.daxiq_capacity, coerce::int(value)),
                    RadioToken::DaxIqAvailable => {
                        assign(&mut s.daxiq_available, coerce::int(value))
                    }
                };
                note(&mut changed, Self::KIND, token.as_str(), value, outcome);
            }
            changed
        })
    }

    fn reset(&self) {
        self.state.set(RadioInfo::default());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::parse_info_reply;
    use crate::keyvalue::parse_key_values;

    #[test]
    fn info_reply_populates_identity() {
        let radio = Radio::new();
        radio.parse_properties(&parse_info_reply(
            "model=\"FLEX-6600\",chassis_serial=\"1234-5678\",name=\"Shack\",callsign=\"N0CALL\",gps=\"Not Present\",atu_present=1,num_slice=4",
        ));
        let info = radio.info();
        assert_eq!(info.model, "FLEX-6600");
        assert_eq!(info.nickname, "Shack");
        assert_eq!(info.callsign, "N0CALL");
        assert!(!info.gps_present);
        assert!(info.atu_present);
        assert_eq!(info.num_slice, 4);
    }

    #[test]
    fn status_gains_clamped() {
        let radio = Radio::new();
        let changed = radio.parse_properties(&parse_key_values(
            "slices=3 panadapters=2 lineout_gain=120 headphone_mute=1",
        ));
        let info = radio.info();
        assert_eq!(info.lineout_gain, 100);
        assert_eq!(info.slices_available, 3);
        assert!(info.headphone_mute);
        assert_eq!(changed.len(), 4);
    }
}
