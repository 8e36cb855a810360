//! Transmit interlock singleton (`interlock ...`).

use std::str::FromStr;

use flexlib_core::{Guarded, ObjectKind};

use crate::keyvalue::coerce;
use crate::objects::{StaticObject, assign, note, unknown_key};
use crate::tokens::InterlockToken;

/// Interlock state machine position reported by the radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterlockStatus {
    #[default]
    Unknown,
    Receive,
    Ready,
    NotReady,
    PttRequested,
    Transmitting,
    TxFault,
    Timeout,
    StuckInput,
    UnkeyRequested,
}

impl FromStr for InterlockStatus {
    type Err = std::convert::Infallible;

    /// Unrecognised states map to [`InterlockStatus::Unknown`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_uppercase().as_str() {
            "RECEIVE" => InterlockStatus::Receive,
            "READY" => InterlockStatus::Ready,
            "NOT_READY" => InterlockStatus::NotReady,
            "PTT_REQUESTED" => InterlockStatus::PttRequested,
            "TRANSMITTING" => InterlockStatus::Transmitting,
            "TX_FAULT" => InterlockStatus::TxFault,
            "TIMEOUT" => InterlockStatus::Timeout,
            "STUCK_INPUT" => InterlockStatus::StuckInput,
            "UNKEY_REQUESTED" => InterlockStatus::UnkeyRequested,
            _ => InterlockStatus::Unknown,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InterlockState {
    pub status: InterlockStatus,
    pub reason: String,
    pub source: String,
    pub tx_client_handle: u32,
    pub tx_allowed: bool,
    pub timeout_ms: u32,
    pub acc_txreq_enable: bool,
    pub rca_txreq_enable: bool,
    pub acc_tx_enabled: bool,
    pub tx1_enabled: bool,
    pub tx2_enabled: bool,
    pub tx3_enabled: bool,
    pub tx_delay_ms: u32,
    pub amplifier: String,
}

#[derive(Debug, Default)]
pub struct Interlock {
    state: Guarded<InterlockState>,
}

impl Interlock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> InterlockState {
        self.state.get()
    }

    pub fn status(&self) -> InterlockStatus {
        self.state.read(|s| s.status)
    }
}

impl StaticObject for Interlock {
    const KIND: ObjectKind = ObjectKind::Interlock;

    fn parse_properties(&self, properties: &[(String, String)]) -> Vec<&'static str> {
        self.state.write(|s| {
            let mut changed = Vec::new();
            for (key, value) in properties {
                let Some(token) = InterlockToken::from_wire(key) else {
                    unknown_key(Self::KIND, key);
                    continue;
                };
                let flag = Some(coerce::bool(value));
                let outcome = match token {
                    InterlockToken::State => assign(&mut s.status, value.parse().ok()),
                    InterlockToken::Reason => assign(&mut s.reason, Some(value.clone())),
                    InterlockToken::Source => assign(&mut s.source, Some(value.clone())),
                    InterlockToken::TxClientHandle => {
                        assign(&mut s.tx_client_handle, coerce::hex_u32(value))
                    }
                    InterlockToken::TxAllowed => assign(&mut s.tx_allowed, flag),
                    InterlockToken::Timeout => assign(&mut s.timeout_ms, coerce::int(value)),
                    InterlockToken::AccTxReqEnable => assign(&mut s.acc_txreq_enable, flag),
                    InterlockToken::RcaTxReqEnable => assign(&mut s.rca_txreq_enable, flag),
                    InterlockToken::AccTxEnabled => assign(&mut s.acc_tx_enabled, flag),
                    InterlockToken::Tx1Enabled => assign(&mut s.tx1_enabled, flag),
                    InterlockToken::Tx2Enabled => assign(&mut s.tx2_enabled, flag),
                    InterlockToken::Tx3Enabled => assign(&mut s.tx3_enabled, flag),
                    InterlockToken::TxDelay => assign(&mut s.tx_delay_ms, coerce::int(value)),
                    InterlockToken::Amplifier => assign(&mut s.amplifier, Some(value.clone())),
                };
                note(&mut changed, Self::KIND, token.as_str(), value, outcome);
            }
            changed
        })
    }

    fn reset(&self) {
        self.state.set(InterlockState::default());
    }
}
