//! SmartSDR TCP line encoding and decoding.
//!
//! The SmartSDR text protocol uses newline-terminated ASCII lines over TCP
//! port 4992. Commands flow from client to radio; replies, status lines,
//! messages, and the two handshake lines flow from radio to client.
//!
//! # Line formats
//!
//! ```text
//! Command:   C<seq>|<command_text>\n
//! Reply:     R<seq>|<hex_result_code>|<reply_data>\n
//! Status:    S<hex_handle>|<object> <key>=<value> ...\n
//! Message:   M<hex_number>|<text>\n
//! Version:   V<major>.<minor>.<patch>.<build>\n
//! Handle:    H<hex_handle>\n
//! ```
//!
//! Everything here is pure parsing and formatting; no I/O is performed.

use flexlib_core::{Error, FirmwareVersion, MessageSeverity, Result};

use crate::keyvalue::{self, KeyValueOptions};
use crate::objects::transmit;

// ---------------------------------------------------------------------------
// Command encoding
// ---------------------------------------------------------------------------

/// Encode a command with its sequence number: `C<seq>|<command>\n`.
pub fn encode_command(seq: u32, command: &str) -> Vec<u8> {
    format!("C{seq}|{command}\n").into_bytes()
}

// ---------------------------------------------------------------------------
// Command builders
//
// Each builder returns the command text WITHOUT the `C<seq>|` prefix. The
// session adds the prefix when it assigns a sequence number.
// ---------------------------------------------------------------------------

/// `client program <name>`
pub fn cmd_client_program(name: &str) -> String {
    format!("client program {name}")
}

/// `client gui <client_id>`: claim the GUI role under a persistent id.
pub fn cmd_client_gui(client_id: &str) -> String {
    format!("client gui {client_id}")
}

/// `client station <name>`; spaces are not allowed on the wire.
pub fn cmd_client_station(station: &str) -> String {
    format!("client station {}", station.replace(' ', "\u{7f}"))
}

/// `client bind client_id=<id>`: attach a non-GUI client to a GUI client.
pub fn cmd_client_bind(client_id: &str) -> String {
    format!("client bind client_id={client_id}")
}

/// `client ip`: the radio replies with the address it sees us at.
pub fn cmd_client_ip() -> String {
    "client ip".to_string()
}

/// `client udpport <port>`
pub fn cmd_client_udpport(port: u16) -> String {
    format!("client udpport {port}")
}

/// `client udp_register handle=0x<handle>`, sent as a UDP datagram on WAN
/// connections.
pub fn cmd_client_udp_register(handle: u32) -> String {
    format!("client udp_register handle=0x{handle:08X}")
}

/// `client set enforce_network_mtu=1 network_mtu=<mtu>`
pub fn cmd_client_set_mtu(mtu: u16) -> String {
    format!("client set enforce_network_mtu=1 network_mtu={mtu}")
}

/// `client set send_reduced_bw_dax=1`
pub fn cmd_client_set_reduced_bw_dax() -> String {
    "client set send_reduced_bw_dax=1".to_string()
}

/// `keepalive enable`
pub fn cmd_keepalive_enable() -> String {
    "keepalive enable".to_string()
}

/// `ping`
pub fn cmd_ping() -> String {
    "ping".to_string()
}

/// Build a subscribe command.
///
/// Example output: `"sub slice all"`
pub fn cmd_subscribe(object: &str) -> String {
    format!("sub {object}")
}

/// `wan validate handle=<wan_handle>`
pub fn cmd_wan_validate(wan_handle: &str) -> String {
    format!("wan validate handle={wan_handle}")
}

/// `info`
pub fn cmd_info() -> String {
    "info".to_string()
}

/// `version`
pub fn cmd_version() -> String {
    "version".to_string()
}

/// `ant list`
pub fn cmd_antenna_list() -> String {
    "ant list".to_string()
}

/// `mic list`
pub fn cmd_mic_list() -> String {
    "mic list".to_string()
}

/// `profile <set> info`, e.g. `profile global info`.
pub fn cmd_profile_info(set: &str) -> String {
    format!("profile {set} info")
}

/// `stream create type=dax_rx dax_channel=<n>`
pub fn cmd_stream_create_dax_rx(dax_channel: u8) -> String {
    format!("stream create type=dax_rx dax_channel={dax_channel}")
}

/// `stream create type=dax_iq daxiq_channel=<n>`
pub fn cmd_stream_create_dax_iq(daxiq_channel: u8) -> String {
    format!("stream create type=dax_iq daxiq_channel={daxiq_channel}")
}

/// `stream remove 0x<id>` with a zero-padded uppercase id.
pub fn cmd_stream_remove(stream_id: u32) -> String {
    format!("stream remove 0x{stream_id:08X}")
}

/// `dax iq <channel> rate=<rate>`
pub fn cmd_dax_iq_rate(daxiq_channel: u8, rate: u32) -> String {
    format!("dax iq {daxiq_channel} rate={rate}")
}

/// `cw pitch <hz>`, clamped to the radio's accepted range.
pub fn cmd_cw_pitch(hz: i32) -> String {
    format!("cw pitch {}", transmit::clamp_cw_pitch(hz))
}

/// `cw wpm <speed>`, clamped to the radio's accepted range.
pub fn cmd_cw_speed(wpm: i32) -> String {
    format!("cw wpm {}", transmit::clamp_cw_speed(wpm))
}

/// `transmit set rfpower=<percent>`, clamped to 0-100.
pub fn cmd_transmit_rf_power(percent: i32) -> String {
    format!("transmit set rfpower={}", transmit::clamp_percent(percent))
}

/// `transmit set filter_low=<lo> filter_high=<hi>` with both edges
/// clamped and `lo <= hi` enforced by raising the high edge.
pub fn cmd_transmit_filter(low_hz: i32, high_hz: i32) -> String {
    let (low, high) = transmit::couple_filter_low(low_hz, high_hz);
    format!("transmit set filter_low={low} filter_high={high}")
}

// ---------------------------------------------------------------------------
// Reply / status / message types
// ---------------------------------------------------------------------------

/// A decoded reply to a previously sent command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmartSdrResponse {
    /// Sequence number of the command this answers.
    pub sequence: u32,
    /// `0` on success; otherwise a SmartSDR result code.
    pub error_code: u32,
    /// Reply data (may be empty).
    pub message: String,
}

/// An unsolicited status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmartSdrStatus {
    /// The handle of the client whose action produced the status.
    pub handle: u32,
    /// Everything after the pipe: the object discriminator and its fields.
    pub payload: String,
}

/// A radio-generated message line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmartSdrNotice {
    pub number: u32,
    pub severity: MessageSeverity,
    pub text: String,
}

/// Types of lines received from the SmartSDR TCP stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmartSdrMessage {
    /// Handshake version line: `V1.4.0.0`
    Version(FirmwareVersion),
    /// Handshake client handle: `H12345678`
    Handle(u32),
    /// Reply to a command: `R<seq>|<code>|<data>`
    Response(SmartSdrResponse),
    /// Status update: `S<handle>|<object> <kv>...`
    Status(SmartSdrStatus),
    /// Message: `M<number>|<text>`
    Message(SmartSdrNotice),
    /// A line with an unrecognised leading character.
    Unknown(String),
}

// ---------------------------------------------------------------------------
// Line parsing
// ---------------------------------------------------------------------------

/// Parse one line received from the SmartSDR TCP stream.
///
/// The line should not include its trailing newline. Surrounding
/// whitespace is stripped.
pub fn parse_message(line: &str) -> Result<SmartSdrMessage> {
    let line = line.trim();
    let Some(first) = line.chars().next() else {
        return Err(Error::Protocol("empty line".into()));
    };
    let body = &line[first.len_utf8()..];

    match first {
        'V' => Ok(SmartSdrMessage::Version(body.parse()?)),
        'H' => parse_hex(body, "handle").map(SmartSdrMessage::Handle),
        'R' => parse_response(body),
        'S' => parse_status(body),
        'M' => parse_notice(body),
        _ => Ok(SmartSdrMessage::Unknown(line.to_string())),
    }
}

fn parse_hex(s: &str, what: &str) -> Result<u32> {
    keyvalue::coerce::hex_u32(s).ok_or_else(|| Error::Protocol(format!("invalid hex {what}: {s}")))
}

fn parse_response(body: &str) -> Result<SmartSdrMessage> {
    let mut parts = body.splitn(3, '|');
    let (Some(seq), Some(code)) = (parts.next(), parts.next()) else {
        return Err(Error::Protocol(format!(
            "malformed reply (need at least seq|code): R{body}"
        )));
    };

    let sequence = seq
        .parse::<u32>()
        .map_err(|_| Error::Protocol(format!("invalid reply sequence number: {seq}")))?;
    let error_code = parse_hex(code, "result code")?;
    let message = parts.next().unwrap_or_default().to_string();

    Ok(SmartSdrMessage::Response(SmartSdrResponse {
        sequence,
        error_code,
        message,
    }))
}

fn parse_status(body: &str) -> Result<SmartSdrMessage> {
    let (handle, payload) = body
        .split_once('|')
        .ok_or_else(|| Error::Protocol(format!("malformed status (no pipe): S{body}")))?;

    Ok(SmartSdrMessage::Status(SmartSdrStatus {
        handle: parse_hex(handle, "status handle")?,
        payload: payload.to_string(),
    }))
}

fn parse_notice(body: &str) -> Result<SmartSdrMessage> {
    let (number, text) = body
        .split_once('|')
        .ok_or_else(|| Error::Protocol(format!("malformed message (no pipe): M{body}")))?;
    let number = parse_hex(number, "message number")?;

    Ok(SmartSdrMessage::Message(SmartSdrNotice {
        number,
        severity: MessageSeverity::from_message_number(number),
        text: text.to_string(),
    }))
}

// ---------------------------------------------------------------------------
// Reply payloads
// ---------------------------------------------------------------------------

/// Split the `version` reply (`SmartSDR-MB=3.5.1.12#PSoC-MBTRX=...`).
pub fn parse_version_reply(data: &str) -> Vec<(String, String)> {
    keyvalue::parse_key_values_with(data, &KeyValueOptions::delimited('#'))
}

/// The `SmartSDR-MB` entry of a `version` reply, if it parses.
pub fn firmware_from_version_reply(data: &str) -> Option<FirmwareVersion> {
    parse_version_reply(data)
        .into_iter()
        .find(|(k, _)| k == "smartsdr-mb")
        .and_then(|(_, v)| v.parse().ok())
}

/// Split the `info` reply (`model="FLEX-6600",chassis_serial="..."`),
/// stripping quotes from values.
pub fn parse_info_reply(data: &str) -> Vec<(String, String)> {
    keyvalue::parse_key_values_with(data, &KeyValueOptions::delimited(','))
        .into_iter()
        .map(|(k, v)| (k, v.trim_matches('"').to_string()))
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // -- Command encoding ---------------------------------------------------

    #[test]
    fn encode_command_seq1() {
        assert_eq!(encode_command(1, "client ip"), b"C1|client ip\n");
    }

    #[test]
    fn encode_command_large_seq() {
        assert_eq!(encode_command(99999, "info"), b"C99999|info\n");
    }

    // -- Command builders ---------------------------------------------------

    #[test]
    fn client_builders() {
        assert_eq!(cmd_client_program("flexlib"), "client program flexlib");
        assert_eq!(
            cmd_client_gui("0A1B2C3D-0000-0000-0000-000000000000"),
            "client gui 0A1B2C3D-0000-0000-0000-000000000000"
        );
        assert_eq!(cmd_client_station("Shack PC"), "client station Shack\u{7f}PC");
        assert_eq!(cmd_client_udpport(4991), "client udpport 4991");
        assert_eq!(
            cmd_client_udp_register(0x1A2B),
            "client udp_register handle=0x00001A2B"
        );
        assert_eq!(
            cmd_client_set_mtu(1450),
            "client set enforce_network_mtu=1 network_mtu=1450"
        );
        assert_eq!(cmd_client_bind("abc"), "client bind client_id=abc");
    }

    #[test]
    fn subscribe_and_misc_builders() {
        assert_eq!(cmd_subscribe("slice all"), "sub slice all");
        assert_eq!(cmd_wan_validate("xyz"), "wan validate handle=xyz");
        assert_eq!(cmd_profile_info("global"), "profile global info");
        assert_eq!(cmd_dax_iq_rate(2, 48000), "dax iq 2 rate=48000");
    }

    #[test]
    fn stream_builders() {
        assert_eq!(
            cmd_stream_create_dax_rx(1),
            "stream create type=dax_rx dax_channel=1"
        );
        assert_eq!(
            cmd_stream_create_dax_iq(3),
            "stream create type=dax_iq daxiq_channel=3"
        );
        assert_eq!(cmd_stream_remove(0x20000001), "stream remove 0x20000001");
        assert_eq!(cmd_stream_remove(0xAB), "stream remove 0x000000AB");
    }

    #[test]
    fn setters_clamp() {
        assert_eq!(cmd_cw_pitch(50), "cw pitch 100");
        assert_eq!(cmd_cw_pitch(7000), "cw pitch 6000");
        assert_eq!(cmd_cw_speed(1), "cw wpm 5");
        assert_eq!(cmd_transmit_rf_power(150), "transmit set rfpower=100");
        assert_eq!(
            cmd_transmit_filter(3000, 2900),
            "transmit set filter_low=3000 filter_high=3000"
        );
        assert_eq!(
            cmd_transmit_filter(-50, 20000),
            "transmit set filter_low=0 filter_high=10000"
        );
    }

    // -- Line parsing -------------------------------------------------------

    #[test]
    fn parse_version_line() {
        let msg = parse_message("V1.4.0.0").unwrap();
        assert_eq!(
            msg,
            SmartSdrMessage::Version(FirmwareVersion::new(1, 4, 0, 0))
        );
    }

    #[test]
    fn parse_version_invalid() {
        assert!(parse_message("Vabc").is_err());
    }

    #[test]
    fn parse_handle_line() {
        assert_eq!(
            parse_message("H12345678").unwrap(),
            SmartSdrMessage::Handle(0x1234_5678)
        );
        assert!(parse_message("HXYZ").is_err());
    }

    #[test]
    fn parse_reply_success_with_data() {
        let msg = parse_message("R5|0|10.0.0.5").unwrap();
        assert_eq!(
            msg,
            SmartSdrMessage::Response(SmartSdrResponse {
                sequence: 5,
                error_code: 0,
                message: "10.0.0.5".into(),
            })
        );
    }

    #[test]
    fn parse_reply_error_code_and_missing_data() {
        match parse_message("R12|50000015").unwrap() {
            SmartSdrMessage::Response(r) => {
                assert_eq!(r.sequence, 12);
                assert_eq!(r.error_code, 0x5000_0015);
                assert!(r.message.is_empty());
            }
            other => panic!("expected reply, got {other:?}"),
        }
    }

    #[test]
    fn parse_reply_data_keeps_pipes() {
        match parse_message("R3|0|a|b").unwrap() {
            SmartSdrMessage::Response(r) => assert_eq!(r.message, "a|b"),
            other => panic!("expected reply, got {other:?}"),
        }
    }

    #[test]
    fn parse_reply_malformed() {
        assert!(parse_message("R5").is_err());
        assert!(parse_message("Rx|0|").is_err());
        assert!(parse_message("R5|zz|").is_err());
    }

    #[test]
    fn parse_status_keeps_payload() {
        let msg = parse_message("S0x40000001|slice 0 in_use=1 RF_frequency=14.100000").unwrap();
        assert_eq!(
            msg,
            SmartSdrMessage::Status(SmartSdrStatus {
                handle: 0x4000_0001,
                payload: "slice 0 in_use=1 RF_frequency=14.100000".into(),
            })
        );
    }

    #[test]
    fn parse_status_without_prefix_and_malformed() {
        match parse_message("S1A2B|interlock state=READY").unwrap() {
            SmartSdrMessage::Status(s) => assert_eq!(s.handle, 0x1A2B),
            other => panic!("expected status, got {other:?}"),
        }
        assert!(parse_message("S1234 no pipe").is_err());
        assert!(parse_message("SQQ|radio").is_err());
    }

    #[test]
    fn parse_message_line_severity() {
        match parse_message("M10000001|Client connected").unwrap() {
            SmartSdrMessage::Message(m) => {
                assert_eq!(m.number, 0x1000_0001);
                assert_eq!(m.severity, MessageSeverity::Info);
                assert_eq!(m.text, "Client connected");
            }
            other => panic!("expected message, got {other:?}"),
        }
        match parse_message("M32000000|Fatal fault").unwrap() {
            SmartSdrMessage::Message(m) => assert_eq!(m.severity, MessageSeverity::Error),
            other => panic!("expected message, got {other:?}"),
        }
    }

    #[test]
    fn parse_unknown_and_empty() {
        assert_eq!(
            parse_message("Xsomething").unwrap(),
            SmartSdrMessage::Unknown("Xsomething".into())
        );
        assert!(parse_message("").is_err());
        assert!(parse_message("  \r").is_err());
    }

    // -- Reply payloads -----------------------------------------------------

    #[test]
    fn version_reply_yields_firmware() {
        let data = "SmartSDR-MB=3.5.1.12#PSoC-MBTRX=3.0.22#FPGA-MB=0.0.37.49#";
        assert_eq!(
            firmware_from_version_reply(data),
            Some(FirmwareVersion::new(3, 5, 1, 12))
        );
        assert_eq!(parse_version_reply(data).len(), 3);
        assert_eq!(firmware_from_version_reply("FPGA-MB=1.0"), None);
    }

    #[test]
    fn info_reply_strips_quotes() {
        let kv = parse_info_reply(r#"model="FLEX-6600",chassis_serial="1234-5678",num_slice=4"#);
        assert_eq!(
            kv,
            vec![
                ("model".to_string(), "FLEX-6600".to_string()),
                ("chassis_serial".to_string(), "1234-5678".to_string()),
                ("num_slice".to_string(), "4".to_string()),
            ]
        );
    }
}
