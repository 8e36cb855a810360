//! DAX, mic and remote-audio stream channels.
//!
//! These arrive either under their legacy discriminators (`daxiq 0x..`,
//! `audio_stream 0x..`, `mic_audio_stream 0x..`, `tx_audio_stream 0x..`,
//! `opus_stream 0x..`) or as `stream 0x.. type=...`. A stream is ready
//! once the radio reports where it sends data (`ip`) or which client owns
//! it (`client_handle`).

use std::sync::atomic::AtomicBool;

use flexlib_core::{Guarded, ObjectKind};

use crate::keyvalue::coerce;
use crate::objects::{DynamicObject, assign, note, unknown_key};
use crate::streams::{
    FrameSink, OpusAccumulator, OpusFrame, SampleAccumulator, SampleEncoding, SampleFrame,
};
use crate::tokens::{
    AudioStreamToken, IqStreamToken, MicAudioStreamToken, OpusStreamToken, TxAudioStreamToken,
};

// ---------------------------------------------------------------------------
// DAX I/Q
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IqStreamState {
    pub in_use: bool,
    pub daxiq_channel: u32,
    pub available: u32,
    pub capacity: u32,
    pub ip: String,
    pub port: u16,
    pub panadapter: u32,
    pub rate: u32,
    pub streaming: bool,
    pub client_handle: u32,
    pub stream_type: String,
}

#[derive(Debug)]
pub struct IqStream {
    id: u32,
    state: Guarded<IqStreamState>,
    initialized: AtomicBool,
    accumulator: Guarded<SampleAccumulator>,
    sink: FrameSink<SampleFrame>,
}

impl IqStream {
    pub fn state(&self) -> IqStreamState {
        self.state.get()
    }

    pub fn frames(&self) -> &FrameSink<SampleFrame> {
        &self.sink
    }

    pub fn lost_packets(&self) -> u64 {
        self.accumulator.read(|a| a.lost_packets())
    }

    /// Feed one VITA payload. The class code's rate wins over the status
    /// rate when both are known.
    pub(crate) fn process_payload(&self, packet_count: u8, payload: &[u8], class_rate: Option<u32>) {
        let rate = class_rate.or_else(|| {
            let r = self.state.read(|s| s.rate);
            (r != 0).then_some(r)
        });
        let frame = self
            .accumulator
            .write(|a| a.accept(packet_count, payload, SampleEncoding::Float32Pairs, rate));
        if let Some(frame) = frame {
            self.sink.deliver(frame);
        }
    }
}

impl DynamicObject for IqStream {
    const KIND: ObjectKind = ObjectKind::IqStream;

    fn create(id: u32) -> Self {
        Self {
            id,
            state: Guarded::default(),
            initialized: AtomicBool::new(false),
            accumulator: Guarded::new(SampleAccumulator::new(id)),
            sink: FrameSink::new(),
        }
    }

    fn id(&self) -> u32 {
        self.id
    }

    fn apply_properties(&self, properties: &[(String, String)]) -> Vec<&'static str> {
        self.state.write(|s| {
            let mut changed = Vec::new();
            for (key, value) in properties {
                let Some(token) = IqStreamToken::from_wire(key) else {
                    unknown_key(Self::KIND, key);
                    continue;
                };
                let outcome = match token {
                    IqStreamToken::InUse => assign(&mut s.in_use, Some(coerce::bool(value))),
                    IqStreamToken::Channel => assign(&mut s.daxiq_channel, coerce::int(value)),
                    IqStreamToken::Available => assign(&mut s.available, coerce::int(value)),
                    IqStreamToken::Capacity => assign(&mut s.capacity, coerce::int(value)),
                    IqStreamToken::Ip => assign(&mut s.ip, Some(value.clone())),
                    IqStreamToken::Port => assign(&mut s.port, coerce::int(value)),
                    IqStreamToken::Panadapter => assign(&mut s.panadapter, coerce::hex_u32(value)),
                    IqStreamToken::Rate => assign(&mut s.rate, coerce::int(value)),
                    IqStreamToken::Streaming => {
                        assign(&mut s.streaming, Some(coerce::bool(value)))
                    }
                    IqStreamToken::ClientHandle => {
                        assign(&mut s.client_handle, coerce::hex_u32(value))
                    }
                    IqStreamToken::Type => assign(&mut s.stream_type, Some(value.clone())),
                };
                note(&mut changed, Self::KIND, token.as_str(), value, outcome);
            }
            changed
        })
    }

    fn is_ready(&self) -> bool {
        self.state.read(|s| !s.ip.is_empty() || s.client_handle != 0)
    }

    fn initialized_flag(&self) -> &AtomicBool {
        &self.initialized
    }
}

// ---------------------------------------------------------------------------
// DAX receive audio
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AudioStreamState {
    pub in_use: bool,
    pub dax_channel: u32,
    /// Index of the slice feeding this channel.
    pub slice: Option<u32>,
    pub ip: String,
    pub port: u16,
    pub dax_clients: u32,
    pub client_handle: u32,
    pub stream_type: String,
}

#[derive(Debug)]
pub struct AudioStream {
    id: u32,
    state: Guarded<AudioStreamState>,
    initialized: AtomicBool,
    accumulator: Guarded<SampleAccumulator>,
    sink: FrameSink<SampleFrame>,
}

impl AudioStream {
    pub fn state(&self) -> AudioStreamState {
        self.state.get()
    }

    pub fn frames(&self) -> &FrameSink<SampleFrame> {
        &self.sink
    }

    pub fn lost_packets(&self) -> u64 {
        self.accumulator.read(|a| a.lost_packets())
    }

    pub(crate) fn process_payload(&self, packet_count: u8, payload: &[u8], encoding: SampleEncoding) {
        if let Some(frame) = self
            .accumulator
            .write(|a| a.accept(packet_count, payload, encoding, None))
        {
            self.sink.deliver(frame);
        }
    }
}

impl DynamicObject for AudioStream {
    const KIND: ObjectKind = ObjectKind::AudioStream;

    fn create(id: u32) -> Self {
        Self {
            id,
            state: Guarded::default(),
            initialized: AtomicBool::new(false),
            accumulator: Guarded::new(SampleAccumulator::new(id)),
            sink: FrameSink::new(),
        }
    }

    fn id(&self) -> u32 {
        self.id
    }

    fn apply_properties(&self, properties: &[(String, String)]) -> Vec<&'static str> {
        self.state.write(|s| {
            let mut changed = Vec::new();
            for (key, value) in properties {
                let Some(token) = AudioStreamToken::from_wire(key) else {
                    unknown_key(Self::KIND, key);
                    continue;
                };
                let outcome = match token {
                    AudioStreamToken::InUse => assign(&mut s.in_use, Some(coerce::bool(value))),
                    AudioStreamToken::Channel => assign(&mut s.dax_channel, coerce::int(value)),
                    // The radio reports a detached channel as an empty or
                    // non-numeric slice.
                    AudioStreamToken::Slice => assign(&mut s.slice, Some(coerce::int(value))),
                    AudioStreamToken::Ip => assign(&mut s.ip, Some(value.clone())),
                    AudioStreamToken::Port => assign(&mut s.port, coerce::int(value)),
                    AudioStreamToken::DaxClients => assign(&mut s.dax_clients, coerce::int(value)),
                    AudioStreamToken::ClientHandle => {
                        assign(&mut s.client_handle, coerce::hex_u32(value))
                    }
                    AudioStreamToken::Type => assign(&mut s.stream_type, Some(value.clone())),
                };
                note(&mut changed, Self::KIND, token.as_str(), value, outcome);
            }
            changed
        })
    }

    fn is_ready(&self) -> bool {
        self.state.read(|s| !s.ip.is_empty() || s.client_handle != 0)
    }

    fn initialized_flag(&self) -> &AtomicBool {
        &self.initialized
    }
}

// ---------------------------------------------------------------------------
// Mic audio
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MicAudioStreamState {
    pub in_use: bool,
    pub ip: String,
    pub port: u16,
    pub client_handle: u32,
    pub stream_type: String,
}

#[derive(Debug)]
pub struct MicAudioStream {
    id: u32,
    state: Guarded<MicAudioStreamState>,
    initialized: AtomicBool,
    accumulator: Guarded<SampleAccumulator>,
    sink: FrameSink<SampleFrame>,
}

impl MicAudioStream {
    pub fn state(&self) -> MicAudioStreamState {
        self.state.get()
    }

    pub fn frames(&self) -> &FrameSink<SampleFrame> {
        &self.sink
    }

    pub fn lost_packets(&self) -> u64 {
        self.accumulator.read(|a| a.lost_packets())
    }

    pub(crate) fn process_payload(&self, packet_count: u8, payload: &[u8]) {
        if let Some(frame) = self
            .accumulator
            .write(|a| a.accept(packet_count, payload, SampleEncoding::Float32Pairs, None))
        {
            self.sink.deliver(frame);
        }
    }
}

impl DynamicObject for MicAudioStream {
    const KIND: ObjectKind = ObjectKind::MicAudioStream;

    fn create(id: u32) -> Self {
        Self {
            id,
            state: Guarded::default(),
            initialized: AtomicBool::new(false),
            accumulator: Guarded::new(SampleAccumulator::new(id)),
            sink: FrameSink::new(),
        }
    }

    fn id(&self) -> u32 {
        self.id
    }

    fn apply_properties(&self, properties: &[(String, String)]) -> Vec<&'static str> {
        self.state.write(|s| {
            let mut changed = Vec::new();
            for (key, value) in properties {
                let Some(token) = MicAudioStreamToken::from_wire(key) else {
                    unknown_key(Self::KIND, key);
                    continue;
                };
                let outcome = match token {
                    MicAudioStreamToken::InUse => assign(&mut s.in_use, Some(coerce::bool(value))),
                    MicAudioStreamToken::Ip => assign(&mut s.ip, Some(value.clone())),
                    MicAudioStreamToken::Port => assign(&mut s.port, coerce::int(value)),
                    MicAudioStreamToken::ClientHandle => {
                        assign(&mut s.client_handle, coerce::hex_u32(value))
                    }
                    MicAudioStreamToken::Type => assign(&mut s.stream_type, Some(value.clone())),
                };
                note(&mut changed, Self::KIND, token.as_str(), value, outcome);
            }
            changed
        })
    }

    fn is_ready(&self) -> bool {
        self.state.read(|s| !s.ip.is_empty() || s.client_handle != 0)
    }

    fn initialized_flag(&self) -> &AtomicBool {
        &self.initialized
    }
}

// ---------------------------------------------------------------------------
// DAX transmit audio (outbound only)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxAudioStreamState {
    pub in_use: bool,
    pub ip: String,
    pub port: u16,
    pub dax_tx: bool,
    pub client_handle: u32,
    pub stream_type: String,
}

#[derive(Debug)]
pub struct TxAudioStream {
    id: u32,
    state: Guarded<TxAudioStreamState>,
    initialized: AtomicBool,
}

impl TxAudioStream {
    pub fn state(&self) -> TxAudioStreamState {
        self.state.get()
    }
}

impl DynamicObject for TxAudioStream {
    const KIND: ObjectKind = ObjectKind::TxAudioStream;

    fn create(id: u32) -> Self {
        Self {
            id,
            state: Guarded::default(),
            initialized: AtomicBool::new(false),
        }
    }

    fn id(&self) -> u32 {
        self.id
    }

    fn apply_properties(&self, properties: &[(String, String)]) -> Vec<&'static str> {
        self.state.write(|s| {
            let mut changed = Vec::new();
            for (key, value) in properties {
                let Some(token) = TxAudioStreamToken::from_wire(key) else {
                    unknown_key(Self::KIND, key);
                    continue;
                };
                let outcome = match token {
                    TxAudioStreamToken::InUse => assign(&mut s.in_use, Some(coerce::bool(value))),
                    TxAudioStreamToken::Ip => assign(&mut s.ip, Some(value.clone())),
                    TxAudioStreamToken::Port => assign(&mut s.port, coerce::int(value)),
                    TxAudioStreamToken::DaxTx => assign(&mut s.dax_tx, Some(coerce::bool(value))),
                    TxAudioStreamToken::ClientHandle => {
                        assign(&mut s.client_handle, coerce::hex_u32(value))
                    }
                    TxAudioStreamToken::Type => assign(&mut s.stream_type, Some(value.clone())),
                };
                note(&mut changed, Self::KIND, token.as_str(), value, outcome);
            }
            changed
        })
    }

    fn is_ready(&self) -> bool {
        self.state.read(|s| !s.ip.is_empty() || s.client_handle != 0)
    }

    fn initialized_flag(&self) -> &AtomicBool {
        &self.initialized
    }
}

// ---------------------------------------------------------------------------
// Opus remote audio
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpusStreamState {
    pub in_use: bool,
    pub ip: String,
    pub port: u16,
    pub rx_on: bool,
    pub tx_on: bool,
    pub rx_stopped: bool,
    pub compression: String,
    pub client_handle: u32,
    pub stream_type: String,
}

#[derive(Debug)]
pub struct OpusStream {
    id: u32,
    state: Guarded<OpusStreamState>,
    initialized: AtomicBool,
    accumulator: Guarded<OpusAccumulator>,
    sink: FrameSink<OpusFrame>,
}

impl OpusStream {
    pub fn state(&self) -> OpusStreamState {
        self.state.get()
    }

    pub fn frames(&self) -> &FrameSink<OpusFrame> {
        &self.sink
    }

    pub fn lost_packets(&self) -> u64 {
        self.accumulator.read(|a| a.lost_packets())
    }

    pub(crate) fn process_payload(&self, packet_count: u8, payload: &[u8]) {
        if let Some(frame) = self.accumulator.write(|a| a.accept(packet_count, payload)) {
            self.sink.deliver(frame);
        }
    }
}

impl DynamicObject for OpusStream {
    const KIND: ObjectKind = ObjectKind::OpusStream;

    fn create(id: u32) -> Self {
        Self {
            id,
            state: Guarded::default(),
            initialized: AtomicBool::new(false),
            accumulator: Guarded::new(OpusAccumulator::new(id)),
            sink: FrameSink::new(),
        }
    }

    fn id(&self) -> u32 {
        self.id
    }

    fn apply_properties(&self, properties: &[(String, String)]) -> Vec<&'static str> {
        self.state.write(|s| {
            let mut changed = Vec::new();
            for (key, value) in properties {
                let Some(token) = OpusStreamToken::from_wire(key) else {
                    unknown_key(Self::KIND, key);
                    continue;
                };
                let flag = Some(coerce::bool(value));
                let outcome = match token {
                    OpusStreamToken::InUse => assign(&mut s.in_use, flag),
                    OpusStreamToken::Ip => assign(&mut s.ip, Some(value.clone())),
                    OpusStreamToken::Port => assign(&mut s.port, coerce::int(value)),
                    OpusStreamToken::RxOn => assign(&mut s.rx_on, flag),
                    OpusStreamToken::TxOn => assign(&mut s.tx_on, flag),
                    OpusStreamToken::RxStopped => assign(&mut s.rx_stopped, flag),
                    OpusStreamToken::Compression => {
                        assign(&mut s.compression, Some(value.clone()))
                    }
                    OpusStreamToken::ClientHandle => {
                        assign(&mut s.client_handle, coerce::hex_u32(value))
                    }
                    OpusStreamToken::Type => assign(&mut s.stream_type, Some(value.clone())),
                };
                note(&mut changed, Self::KIND, token.as_str(), value, outcome);
            }
            changed
        })
    }

    fn is_ready(&self) -> bool {
        self.state.read(|s| !s.ip.is_empty() || s.client_handle != 0)
    }

    fn initialized_flag(&self) -> &AtomicBool {
        &self.initialized
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyvalue::parse_key_values;
    use flexlib_test_harness::vita::float_pairs_payload;

    #[test]
    fn iq_stream_ready_when_ip_arrives() {
        let iq = IqStream::create(0x0000_0001);
        let out = iq.parse_properties(&parse_key_values(
            "daxiq=2 pan=0x40000000 rate=48000 ip=192.168.1.50 port=4992",
        ));
        assert!(out.became_ready);
        let s = iq.state();
        assert_eq!(s.daxiq_channel, 2);
        assert_eq!(s.panadapter, 0x4000_0000);
        assert_eq!(s.rate, 48_000);
        assert_eq!(s.ip, "192.168.1.50");
        assert_eq!(s.port, 4992);

        let again = iq.parse_properties(&parse_key_values("ip=192.168.1.51"));
        assert!(!again.became_ready);
        assert_eq!(again.changed, vec!["ip"]);
    }

    #[test]
    fn audio_stream_detached_slice() {
        let audio = AudioStream::create(0x0400_0001);
        audio.parse_properties(&parse_key_values("dax=1 slice=0 client_handle=0x1234"));
        assert_eq!(audio.state().slice, Some(0));
        assert!(audio.is_initialized());
        audio.parse_properties(&parse_key_values("slice="));
        assert_eq!(audio.state().slice, None);
    }

    #[tokio::test]
    async fn iq_frames_use_class_rate() {
        let iq = IqStream::create(7);
        iq.parse_properties(&parse_key_values("rate=24000"));
        let mut rx = iq.frames().subscribe(2);

        let payload = float_pairs_payload(&[(16384.0, 0.0)]);
        iq.process_payload(0, &payload, Some(96_000));
        iq.process_payload(1, &payload, None);

        assert_eq!(rx.recv().await.unwrap().sample_rate, Some(96_000));
        let second = rx.recv().await.unwrap();
        assert_eq!(second.sample_rate, Some(24_000));
        assert_eq!(second.left, vec![0.5]);
    }
}
