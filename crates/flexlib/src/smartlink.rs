//! SmartLink server message parser.
//!
//! The SmartLink relay speaks the same line-per-message text protocol as
//! the radio, over TLS. Only the decode step lives here; opening the TLS
//! session and authenticating are the caller's business.
//!
//! ```text
//! application registration_invalid
//! application user_settings callsign=N0CALL first_name=Pat last_name=Doe
//! application info public_ip=203.0.113.7
//! radio list serial=1234 model=FLEX-6600 public_ip=... public_tls_port=21000|serial=...
//! radio connect_ready handle=0x5F3C0012 serial=1234-5678
//! radio test_connection serial=1234 upnp_tcp_port_working=true ...
//! ```

use std::net::IpAddr;

use crate::keyvalue::{coerce, parse_key_values, parse_list};
use crate::session::WanConnectParams;
use crate::tokens::WanRadioToken;

/// One radio reachable through SmartLink.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WanRadio {
    pub serial: String,
    pub model: String,
    pub radio_name: String,
    pub callsign: String,
    pub status: String,
    pub last_seen: String,
    pub version: String,
    pub public_ip: Option<IpAddr>,
    pub public_tls_port: Option<u16>,
    pub public_udp_port: Option<u16>,
    pub upnp_tls_port: Option<u16>,
    pub upnp_udp_port: Option<u16>,
    pub upnp_supported: bool,
    pub requires_holepunch: bool,
    pub negotiated_holepunch_port: Option<u16>,
    pub max_licensed_version: String,
    pub radio_license_id: String,
    pub inuse_ip: String,
    pub inuse_host: String,
    pub gui_client_handles: Vec<String>,
    pub gui_client_programs: Vec<String>,
    pub gui_client_stations: Vec<String>,
}

impl WanRadio {
    /// TLS port to open the command channel on, preferring UPnP.
    pub fn tls_port(&self) -> Option<u16> {
        self.upnp_tls_port.or(self.public_tls_port)
    }

    /// UDP port the radio listens on, preferring UPnP.
    pub fn udp_port(&self) -> Option<u16> {
        self.upnp_udp_port.or(self.public_udp_port)
    }

    /// Session parameters once the server has sent `connect_ready`.
    pub fn connect_params(&self, wan_handle: &str) -> Option<WanConnectParams> {
        Some(WanConnectParams {
            wan_handle: wan_handle.to_string(),
            public_udp_port: self.udp_port()?,
            hole_punch_port: self
                .requires_holepunch
                .then_some(self.negotiated_holepunch_port)
                .flatten(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserSettings {
    pub callsign: String,
    pub first_name: String,
    pub last_name: String,
}

/// Reachability report from `radio test_connection`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestConnectionResults {
    pub serial: String,
    pub upnp_tcp_port_working: bool,
    pub upnp_udp_port_working: bool,
    pub forward_tcp_port_working: bool,
    pub forward_udp_port_working: bool,
    pub nat_supports_hole_punch: bool,
}

/// A decoded SmartLink server message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmartLinkMessage {
    /// The application's registration was rejected.
    RegistrationInvalid,
    UserSettings(UserSettings),
    /// Our public address as seen by the server.
    ApplicationInfo { public_ip: Option<IpAddr> },
    RadioList(Vec<WanRadio>),
    /// The radio is waiting for our TLS connection with `handle`.
    ConnectReady { handle: String, serial: String },
    TestConnection(TestConnectionResults),
    Unknown(String),
}

/// Decode one SmartLink line. Lines that do not match a known message come
/// back as [`SmartLinkMessage::Unknown`].
pub fn parse_smartlink_message(line: &str) -> SmartLinkMessage {
    let line = line.trim();
    let mut words = line.splitn(3, ' ');
    let (Some(category), Some(verb)) = (words.next(), words.next()) else {
        return SmartLinkMessage::Unknown(line.to_string());
    };
    let rest = words.next().unwrap_or_default();

    match (category, verb) {
        ("application", "registration_invalid") => SmartLinkMessage::RegistrationInvalid,
        ("application", "user_settings") => {
            let mut settings = UserSettings::default();
            for (key, value) in parse_key_values(rest) {
                match key.as_str() {
                    "callsign" => settings.callsign = value,
                    "first_name" => settings.first_name = value,
                    "last_name" => settings.last_name = value,
                    _ => tracing::trace!(key = %key, "Unknown user_settings key"),
                }
            }
            SmartLinkMessage::UserSettings(settings)
        }
        ("application", "info") => SmartLinkMessage::ApplicationInfo {
            public_ip: parse_key_values(rest)
                .into_iter()
                .find(|(k, _)| k == "public_ip")
                .and_then(|(_, v)| v.parse().ok()),
        },
        ("radio", "list") => SmartLinkMessage::RadioList(
            rest.split('|')
                .filter(|entry| !entry.trim().is_empty())
                .map(parse_wan_radio)
                .filter(|radio| !radio.serial.is_empty())
                .collect(),
        ),
        ("radio", "connect_ready") => {
            let mut handle = String::new();
            let mut serial = String::new();
            for (key, value) in parse_key_values(rest) {
                match key.as_str() {
                    "handle" => handle = value,
                    "serial" => serial = value,
                    _ => {}
                }
            }
            SmartLinkMessage::ConnectReady { handle, serial }
        }
        ("radio", "test_connection") => {
            let mut results = TestConnectionResults::default();
            for (key, value) in parse_key_values(rest) {
                let flag = value.eq_ignore_ascii_case("true") || value == "1";
                match key.as_str() {
                    "serial" => results.serial = value,
                    "upnp_tcp_port_working" => results.upnp_tcp_port_working = flag,
                    "upnp_udp_port_working" => results.upnp_udp_port_working = flag,
                    "forward_tcp_port_working" => results.forward_tcp_port_working = flag,
                    "forward_udp_port_working" => results.forward_udp_port_working = flag,
                    "nat_supports_hole_punch" => results.nat_supports_hole_punch = flag,
                    _ => tracing::trace!(key = %key, "Unknown test_connection key"),
                }
            }
            SmartLinkMessage::TestConnection(results)
        }
        _ => {
            tracing::debug!(line = %line, "Unknown SmartLink message");
            SmartLinkMessage::Unknown(line.to_string())
        }
    }
}

fn parse_wan_radio(entry: &str) -> WanRadio {
    let mut radio = WanRadio::default();
    for (key, value) in parse_key_values(entry) {
        let Some(token) = WanRadioToken::from_wire(&key) else {
            tracing::trace!(key = %key, "Unknown SmartLink radio key");
            continue;
        };
        match token {
            WanRadioToken::Serial => radio.serial = value,
            WanRadioToken::Model => radio.model = value,
            WanRadioToken::RadioName => radio.radio_name = value,
            WanRadioToken::Callsign => radio.callsign = value,
            WanRadioToken::Status => radio.status = value,
            WanRadioToken::LastSeen => radio.last_seen = value,
            WanRadioToken::Version => radio.version = value,
            WanRadioToken::PublicIp => radio.public_ip = value.parse().ok(),
            WanRadioToken::PublicTlsPort => radio.public_tls_port = port(&value),
            WanRadioToken::PublicUdpPort => radio.public_udp_port = port(&value),
            WanRadioToken::UpnpTlsPort => radio.upnp_tls_port = port(&value),
            WanRadioToken::UpnpUdpPort => radio.upnp_udp_port = port(&value),
            WanRadioToken::UpnpSupported => radio.upnp_supported = coerce::bool(&value),
            WanRadioToken::RequiresHolepunch => radio.requires_holepunch = coerce::bool(&value),
            WanRadioToken::NegotiatedHolepunchPort => {
                radio.negotiated_holepunch_port = port(&value)
            }
            WanRadioToken::MaxLicensedVersion => radio.max_licensed_version = value,
            WanRadioToken::RadioLicenseId => radio.radio_license_id = value,
            WanRadioToken::InUseIp => radio.inuse_ip = value,
            WanRadioToken::InUseHost => radio.inuse_host = value,
            WanRadioToken::GuiClientHandles => radio.gui_client_handles = parse_list(&value, ','),
            WanRadioToken::GuiClientPrograms => {
                radio.gui_client_programs = parse_list(&value, ',')
            }
            WanRadioToken::GuiClientStations => {
                radio.gui_client_stations = parse_list(&value.replace('\u{7f}', " "), ',')
            }
        }
    }
    radio
}

/// Ports of 0 or -1 mean "not available".
fn port(value: &str) -> Option<u16> {
    coerce::int::<u16>(value).filter(|p| *p != 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn radio_list_entries() {
        let msg = parse_smartlink_message(
            "radio list serial=1234-5678 model=FLEX-6600 radio_name=Home callsign=N0CALL \
             public_ip=203.0.113.7 public_tls_port=21000 public_udp_port=22000 \
             public_upnp_tls_port=-1 public_upnp_udp_port=-1 requires_holepunch=1 \
             negotiated_holepunch_port=4995 status=Available|\
             serial=9999 model=FLEX-6400 public_tls_port=4994 public_udp_port=4993 \
             public_upnp_tls_port=30000 public_upnp_udp_port=30001|",
        );
        let SmartLinkMessage::RadioList(radios) = msg else {
            panic!("expected a radio list, got {msg:?}");
        };
        assert_eq!(radios.len(), 2);

        let home = &radios[0];
        assert_eq!(home.radio_name, "Home");
        assert_eq!(home.public_ip, Some("203.0.113.7".parse().unwrap()));
        assert_eq!(home.tls_port(), Some(21000));
        let params = home.connect_params("0x5F3C0012").unwrap();
        assert_eq!(params.public_udp_port, 22000);
        assert_eq!(params.hole_punch_port, Some(4995));

        let upnp = &radios[1];
        assert_eq!(upnp.tls_port(), Some(30000));
        assert_eq!(upnp.udp_port(), Some(30001));
        assert_eq!(upnp.connect_params("h").unwrap().hole_punch_port, None);
    }

    #[test]
    fn application_messages() {
        assert_eq!(
            parse_smartlink_message("application registration_invalid"),
            SmartLinkMessage::RegistrationInvalid
        );
        assert_eq!(
            parse_smartlink_message("application info public_ip=198.51.100.2"),
            SmartLinkMessage::ApplicationInfo {
                public_ip: Some("198.51.100.2".parse().unwrap())
            }
        );
        let SmartLinkMessage::UserSettings(settings) = parse_smartlink_message(
            "application user_settings callsign=N0CALL first_name=Pat last_name=Doe",
        ) else {
            panic!("expected user settings");
        };
        assert_eq!(settings.callsign, "N0CALL");
        assert_eq!(settings.last_name, "Doe");
    }

    #[test]
    fn radio_messages() {
        assert_eq!(
            parse_smartlink_message("radio connect_ready handle=0x5F3C0012 serial=1234-5678"),
            SmartLinkMessage::ConnectReady {
                handle: "0x5F3C0012".into(),
                serial: "1234-5678".into(),
            }
        );
        let SmartLinkMessage::TestConnection(results) = parse_smartlink_message(
            "radio test_connection serial=1234 upnp_tcp_port_working=true \
             upnp_udp_port_working=false forward_tcp_port_working=true \
             forward_udp_port_working=true nat_supports_hole_punch=false",
        ) else {
            panic!("expected test results");
        };
        assert!(results.upnp_tcp_port_working);
        assert!(!results.upnp_udp_port_working);
        assert!(results.forward_udp_port_working);
        assert!(!results.nat_supports_hole_punch);
    }

    #[test]
    fn unknown_lines() {
        assert!(matches!(parse_smartlink_message("radio"), SmartLinkMessage::Unknown(_)));
        assert!(matches!(
            parse_smartlink_message("server shutdown now"),
            SmartLinkMessage::Unknown(_)
        ));
    }
}
