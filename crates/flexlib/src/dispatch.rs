//! The mirrored object model and the status/packet dispatcher.
//!
//! [`ObjectModel`] owns every registry and session singleton. The session's
//! TCP task feeds it status payloads in arrival order through
//! [`apply_status`](ObjectModel::apply_status); its UDP task feeds raw
//! datagrams through [`process_packet`](ObjectModel::process_packet).
//!
//! Routing is table driven: the first word of a status payload is looked up
//! in [`StatusObject`]. Collection objects go through the registry lifecycle
//! (create on first sight, parse, remove on `in_use=0` or `removed`);
//! singletons are parsed in place. Anything unrecognised is logged and
//! dropped.

use flexlib_core::{Guarded, ObjectKind, RadioEvent};
use tokio::sync::broadcast;

use crate::keyvalue::{KeyValueOptions, coerce, parse_key_values, parse_key_values_with};
use crate::objects::{
    Atu, AudioStream, ClientChange, ClientTable, DynamicObject, Gps, Interlock, IqStream, Meter,
    MicAudioStream, OpusStream, Panadapter, Profile, Radio, Slice, StaticObject, Transmit,
    Transverter, TxAudioStream, Wan, Waterfall, Waveform, group_meter_entries,
};
use crate::registry::Registry;
use crate::streams::{PayloadLayout, SampleEncoding};
use crate::tokens::{DisplayKind, StatusObject, StreamType};
use crate::vita49::{self, StreamClass};

type Pairs = Vec<(String, String)>;

/// Every object mirrored from one radio.
#[derive(Debug)]
pub struct ObjectModel {
    slices: Registry<Slice>,
    panadapters: Registry<Panadapter>,
    waterfalls: Registry<Waterfall>,
    iq_streams: Registry<IqStream>,
    audio_streams: Registry<AudioStream>,
    mic_audio_streams: Registry<MicAudioStream>,
    tx_audio_streams: Registry<TxAudioStream>,
    opus_streams: Registry<OpusStream>,
    transverters: Registry<Transverter>,
    meters: Registry<Meter>,

    transmit: Transmit,
    interlock: Interlock,
    gps: Gps,
    atu: Atu,
    wan: Wan,
    waveform: Waveform,
    profile: Profile,
    radio: Radio,
    clients: ClientTable,

    client_handle: Guarded<u32>,
    layout: Guarded<PayloadLayout>,
    event_tx: broadcast::Sender<RadioEvent>,
}

impl ObjectModel {
    pub fn new(event_tx: broadcast::Sender<RadioEvent>) -> Self {
        Self {
            slices: Registry::new(),
            panadapters: Registry::new(),
            waterfalls: Registry::new(),
            iq_streams: Registry::new(),
            audio_streams: Registry::new(),
            mic_audio_streams: Registry::new(),
            tx_audio_streams: Registry::new(),
            opus_streams: Registry::new(),
            transverters: Registry::new(),
            meters: Registry::new(),
            transmit: Transmit::new(),
            interlock: Interlock::new(),
            gps: Gps::new(),
            atu: Atu::new(),
            wan: Wan::new(),
            waveform: Waveform::new(),
            profile: Profile::new(),
            radio: Radio::new(),
            clients: ClientTable::new(),
            client_handle: Guarded::new(0),
            layout: Guarded::new(PayloadLayout::default()),
            event_tx,
        }
    }

    // -----------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------

    pub fn slices(&self) -> &Registry<Slice> {
        &self.slices
    }

    pub fn panadapters(&self) -> &Registry<Panadapter> {
        &self.panadapters
    }

    pub fn waterfalls(&self) -> &Registry<Waterfall> {
        &self.waterfalls
    }

    pub fn iq_streams(&self) -> &Registry<IqStream> {
        &self.iq_streams
    }

    pub fn audio_streams(&self) -> &Registry<AudioStream> {
        &self.audio_streams
    }

    pub fn mic_audio_streams(&self) -> &Registry<MicAudioStream> {
        &self.mic_audio_streams
    }

    pub fn tx_audio_streams(&self) -> &Registry<TxAudioStream> {
        &self.tx_audio_streams
    }

    pub fn opus_streams(&self) -> &Registry<OpusStream> {
        &self.opus_streams
    }

    pub fn transverters(&self) -> &Registry<Transverter> {
        &self.transverters
    }

    pub fn meters(&self) -> &Registry<Meter> {
        &self.meters
    }

    pub fn transmit(&self) -> &Transmit {
        &self.transmit
    }

    pub fn interlock(&self) -> &Interlock {
        &self.interlock
    }

    pub fn gps(&self) -> &Gps {
        &self.gps
    }

    pub fn atu(&self) -> &Atu {
        &self.atu
    }

    pub fn wan(&self) -> &Wan {
        &self.wan
    }

    pub fn waveform(&self) -> &Waveform {
        &self.waveform
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn radio(&self) -> &Radio {
        &self.radio
    }

    pub fn clients(&self) -> &ClientTable {
        &self.clients
    }

    /// Our own client handle, `0` before the handshake.
    pub fn client_handle(&self) -> u32 {
        self.client_handle.get()
    }

    pub(crate) fn set_client_handle(&self, handle: u32) {
        self.client_handle.set(handle);
    }

    pub fn payload_layout(&self) -> PayloadLayout {
        self.layout.get()
    }

    pub(crate) fn set_payload_layout(&self, layout: PayloadLayout) {
        self.layout.set(layout);
    }

    fn emit(&self, event: RadioEvent) {
        let _ = self.event_tx.send(event);
    }

    // -----------------------------------------------------------------
    // Status lines
    // -----------------------------------------------------------------

    /// Route one status payload (the text after `S<handle>|`).
    pub fn apply_status(&self, payload: &str) {
        let payload = payload.trim();
        let (word, rest) = payload.split_once(' ').unwrap_or((payload, ""));
        let Some(object) = StatusObject::from_wire(&word.to_lowercase()) else {
            tracing::debug!(object = %word, "Unhandled status object");
            return;
        };

        match object {
            StatusObject::Slice => self.decimal_status(&self.slices, rest),
            StatusObject::Transverter => self.decimal_status(&self.transverters, rest),
            StatusObject::Display => self.display_status(rest),
            StatusObject::DaxIq => self.hex_status(&self.iq_streams, rest),
            StatusObject::AudioStream => self.hex_status(&self.audio_streams, rest),
            StatusObject::MicAudioStream => self.hex_status(&self.mic_audio_streams, rest),
            StatusObject::TxAudioStream => self.hex_status(&self.tx_audio_streams, rest),
            StatusObject::OpusStream => self.hex_status(&self.opus_streams, rest),
            StatusObject::Stream => self.stream_status(rest),
            StatusObject::Meter => self.meter_status(rest),
            StatusObject::Transmit => self.apply_static(&self.transmit, &parse_key_values(rest)),
            StatusObject::Interlock => self.apply_static(&self.interlock, &parse_key_values(rest)),
            StatusObject::Gps => self.apply_static(
                &self.gps,
                &parse_key_values_with(rest, &KeyValueOptions::delimited('#')),
            ),
            StatusObject::Atu => self.apply_static(&self.atu, &parse_key_values(rest)),
            StatusObject::Wan => self.apply_static(&self.wan, &parse_key_values(rest)),
            StatusObject::Waveform => self.apply_static(&self.waveform, &parse_key_values(rest)),
            StatusObject::Radio => self.apply_static(&self.radio, &parse_key_values(rest)),
            StatusObject::Profile => self.profile_status(rest),
            StatusObject::Client => self.client_status(rest),
        }
    }

    /// Apply the reply to `info`.
    pub fn apply_info(&self, pairs: &[(String, String)]) {
        self.apply_static(&self.radio, pairs);
    }

    fn apply_static<T: StaticObject>(&self, object: &T, pairs: &[(String, String)]) {
        let changed = object.parse_properties(pairs);
        if !changed.is_empty() {
            self.emit(RadioEvent::PropertiesChanged {
                kind: T::KIND,
                id: None,
                properties: changed,
            });
        }
    }

    fn decimal_status<T: DynamicObject>(&self, registry: &Registry<T>, rest: &str) {
        let mut pairs = parse_key_values(rest);
        if pairs.is_empty() {
            return;
        }
        let (id, _) = pairs.remove(0);
        let Ok(id) = id.parse::<u32>() else {
            tracing::debug!(object = %T::KIND, id = %id, "Status with bad id");
            return;
        };
        self.apply_dynamic(registry, id, &pairs, T::CREATED_BY_IN_USE);
    }

    fn hex_status<T: DynamicObject>(&self, registry: &Registry<T>, rest: &str) {
        if let Some((id, pairs)) = split_hex_id(T::KIND, rest) {
            self.apply_dynamic(registry, id, &pairs, T::CREATED_BY_IN_USE);
        }
    }

    fn display_status(&self, rest: &str) {
        let (word, rest) = rest.split_once(' ').unwrap_or((rest, ""));
        match DisplayKind::from_wire(&word.to_lowercase()) {
            Some(DisplayKind::Panadapter) => self.hex_status(&self.panadapters, rest),
            Some(DisplayKind::Waterfall) => self.hex_status(&self.waterfalls, rest),
            None => tracing::debug!(display = %word, "Unhandled display object"),
        }
    }

    /// `stream 0x.. type=... ...`; the `type` key picks the collection.
    /// Later updates may omit it, so a known id keeps its collection.
    fn stream_status(&self, rest: &str) {
        let Some((id, pairs)) = split_hex_id(ObjectKind::IqStream, rest) else {
            return;
        };

        if is_removal(&pairs) {
            self.remove_stream(id);
            return;
        }

        let stream_type = pairs
            .iter()
            .find(|(k, _)| k == "type")
            .and_then(|(_, v)| StreamType::from_wire(&v.to_lowercase()))
            .or_else(|| self.known_stream_type(id));
        match stream_type {
            Some(StreamType::DaxIq) => self.apply_dynamic(&self.iq_streams, id, &pairs, false),
            Some(StreamType::DaxRx) => self.apply_dynamic(&self.audio_streams, id, &pairs, false),
            Some(StreamType::DaxMic) => {
                self.apply_dynamic(&self.mic_audio_streams, id, &pairs, false)
            }
            Some(StreamType::DaxTx) => {
                self.apply_dynamic(&self.tx_audio_streams, id, &pairs, false)
            }
            Some(StreamType::RemoteAudioRx) => {
                self.apply_dynamic(&self.opus_streams, id, &pairs, false)
            }
            None => tracing::debug!(stream_id = format!("0x{id:08X}"), "Stream of unknown type"),
        }
    }

    fn known_stream_type(&self, id: u32) -> Option<StreamType> {
        if self.iq_streams.contains(id) {
            Some(StreamType::DaxIq)
        } else if self.audio_streams.contains(id) {
            Some(StreamType::DaxRx)
        } else if self.mic_audio_streams.contains(id) {
            Some(StreamType::DaxMic)
        } else if self.tx_audio_streams.contains(id) {
            Some(StreamType::DaxTx)
        } else if self.opus_streams.contains(id) {
            Some(StreamType::RemoteAudioRx)
        } else {
            None
        }
    }

    /// Remove a stream from whichever collection holds it.
    pub(crate) fn remove_stream(&self, id: u32) {
        self.remove_from(&self.iq_streams, id);
        self.remove_from(&self.audio_streams, id);
        self.remove_from(&self.mic_audio_streams, id);
        self.remove_from(&self.tx_audio_streams, id);
        self.remove_from(&self.opus_streams, id);
    }

    /// `meter 1.src=SLC#1.num=0#1.nam=LEVEL#...` or `meter 5 removed`.
    fn meter_status(&self, rest: &str) {
        if !rest.contains('=') {
            let pairs = parse_key_values(rest);
            let Some((id, _)) = pairs.first() else {
                return;
            };
            if is_removal(&pairs) {
                match id.parse::<u32>() {
                    Ok(id) => self.remove_from(&self.meters, id),
                    Err(_) => tracing::debug!(id = %id, "Meter removal with bad id"),
                }
            }
            return;
        }

        let pairs = parse_key_values_with(rest, &KeyValueOptions::delimited('#'));
        for (id, entries) in group_meter_entries(&pairs) {
            self.apply_dynamic(&self.meters, id, &entries, false);
        }
    }

    /// `profile <set> <item>=<value>`. Profile names may contain spaces,
    /// so the value is everything after the first `=`.
    fn profile_status(&self, rest: &str) {
        let Some((set, tail)) = rest.split_once(' ') else {
            tracing::debug!(status = %rest, "Malformed profile status");
            return;
        };
        let (item, value) = tail.split_once('=').unwrap_or((tail, ""));
        let changed = self
            .profile
            .apply(&set.to_lowercase(), &item.trim().to_lowercase(), value);
        if !changed.is_empty() {
            self.emit(RadioEvent::PropertiesChanged {
                kind: ObjectKind::Profile,
                id: None,
                properties: changed,
            });
        }
    }

    fn client_status(&self, rest: &str) {
        match self.clients.apply(&parse_key_values(rest)) {
            Some(ClientChange::Added(client)) => {
                tracing::debug!(
                    handle = format!("0x{:08X}", client.handle),
                    program = %client.program,
                    "GUI client added"
                );
                self.emit(RadioEvent::ClientAdded {
                    handle: client.handle,
                    program: client.program,
                    station: client.station,
                });
            }
            Some(ClientChange::Removed(handle)) => {
                tracing::debug!(handle = format!("0x{handle:08X}"), "GUI client removed");
                self.emit(RadioEvent::ClientRemoved { handle });
            }
            Some(ClientChange::Updated(_)) | None => {}
        }
    }

    /// Lifecycle shared by every collection object.
    fn apply_dynamic<T: DynamicObject>(
        &self,
        registry: &Registry<T>,
        id: u32,
        pairs: &[(String, String)],
        by_in_use: bool,
    ) {
        if is_removal(pairs) {
            self.remove_from(registry, id);
            return;
        }

        let object = match registry.get(id) {
            Some(object) => object,
            None => {
                if by_in_use && !in_use(pairs) {
                    tracing::trace!(object = %T::KIND, id, "Status for an unused object ignored");
                    return;
                }
                if !self.is_ours(pairs) {
                    tracing::trace!(object = %T::KIND, id, "Status for another client ignored");
                    return;
                }
                registry.get_or_create(id).0
            }
        };

        let outcome = object.parse_properties(pairs);
        if outcome.became_ready {
            tracing::debug!(object = %T::KIND, id = format!("0x{id:08X}"), "Object added");
            self.emit(RadioEvent::ObjectAdded { kind: T::KIND, id });
        } else if object.is_initialized() && !outcome.changed.is_empty() {
            self.emit(RadioEvent::PropertiesChanged {
                kind: T::KIND,
                id: Some(id),
                properties: outcome.changed,
            });
        }
    }

    fn remove_from<T: DynamicObject>(&self, registry: &Registry<T>, id: u32) {
        if registry.remove(id).is_some() {
            tracing::debug!(object = %T::KIND, id = format!("0x{id:08X}"), "Object removed");
            self.emit(RadioEvent::ObjectRemoved { kind: T::KIND, id });
        }
    }

    /// Creation gate: a status naming a `client_handle` must be ours or
    /// belong to a client we know about.
    fn is_ours(&self, pairs: &[(String, String)]) -> bool {
        let Some((_, value)) = pairs.iter().find(|(k, _)| k == "client_handle") else {
            return true;
        };
        match coerce::hex_u32(value) {
            Some(0) => true,
            Some(handle) => handle == self.client_handle() || self.clients.contains(handle),
            None => false,
        }
    }

    // -----------------------------------------------------------------
    // VITA-49 packets
    // -----------------------------------------------------------------

    /// Route one datagram from the session's UDP socket.
    pub fn process_packet(&self, data: &[u8]) {
        let packet = match vita49::parse_packet(data) {
            Ok(packet) => packet,
            Err(e) => {
                tracing::trace!(error = %e, len = data.len(), "Dropped UDP datagram");
                return;
            }
        };
        let class = packet.header.stream_class();
        if class == StreamClass::Meter {
            self.process_meters(packet.payload);
            return;
        }
        let Some(stream_id) = packet.header.stream_id else {
            tracing::trace!(?class, "Packet without stream id");
            return;
        };
        let count = packet.header.packet_count;
        let payload = packet.payload;

        let lost = match class {
            StreamClass::Panadapter => self.panadapters.get(stream_id).map(|pan| {
                track_loss(|| pan.lost_frames(), || {
                    pan.process_payload(payload, self.payload_layout())
                })
            }),
            StreamClass::Waterfall => self.waterfalls.get(stream_id).map(|wf| {
                track_loss(|| wf.lost_frames(), || {
                    wf.process_payload(payload, self.payload_layout())
                })
            }),
            StreamClass::DaxIq24
            | StreamClass::DaxIq48
            | StreamClass::DaxIq96
            | StreamClass::DaxIq192 => self.iq_streams.get(stream_id).map(|iq| {
                track_loss(|| iq.lost_packets(), || {
                    iq.process_payload(count, payload, class.iq_sample_rate())
                })
            }),
            StreamClass::DaxAudio | StreamClass::DaxReducedBandwidth => {
                self.process_audio(stream_id, class, count, payload)
            }
            StreamClass::Opus => self.opus_streams.get(stream_id).map(|opus| {
                track_loss(|| opus.lost_packets(), || opus.process_payload(count, payload))
            }),
            StreamClass::Discovery => None,
            StreamClass::Meter | StreamClass::Unknown(_) => {
                tracing::trace!(?class, stream_id = format!("0x{stream_id:08X}"), "Unhandled packet class");
                None
            }
        };

        if let Some(lost) = lost.filter(|n| *n > 0) {
            self.emit(RadioEvent::PacketsLost {
                stream_id,
                lost: u32::try_from(lost).unwrap_or(u32::MAX),
            });
        }
    }

    /// DAX audio belongs to either a receive channel or the mic channel.
    fn process_audio(&self, stream_id: u32, class: StreamClass, count: u8, payload: &[u8]) -> Option<u64> {
        let encoding = if class == StreamClass::DaxReducedBandwidth {
            SampleEncoding::Int16Mono
        } else {
            SampleEncoding::Float32Pairs
        };
        if let Some(audio) = self.audio_streams.get(stream_id) {
            return Some(track_loss(|| audio.lost_packets(), || {
                audio.process_payload(count, payload, encoding)
            }));
        }
        self.mic_audio_streams.get(stream_id).map(|mic| {
            track_loss(|| mic.lost_packets(), || mic.process_payload(count, payload))
        })
    }

    fn process_meters(&self, payload: &[u8]) {
        let readings = match vita49::parse_meter_payload(payload) {
            Ok(readings) => readings,
            Err(e) => {
                tracing::debug!(error = %e, "Bad meter packet");
                return;
            }
        };
        for reading in readings {
            if let Some(meter) = self.meters.get(u32::from(reading.meter_id)) {
                meter.update(reading.value);
            }
        }
    }

    // -----------------------------------------------------------------
    // Teardown
    // -----------------------------------------------------------------

    /// Drop every collection object, forget every client and reset the
    /// singletons. Removal events fire for each object dropped.
    pub fn clear(&self) {
        self.clear_registry(&self.slices);
        self.clear_registry(&self.panadapters);
        self.clear_registry(&self.waterfalls);
        self.clear_registry(&self.iq_streams);
        self.clear_registry(&self.audio_streams);
        self.clear_registry(&self.mic_audio_streams);
        self.clear_registry(&self.tx_audio_streams);
        self.clear_registry(&self.opus_streams);
        self.clear_registry(&self.transverters);
        self.clear_registry(&self.meters);

        for handle in self.clients.clear() {
            self.emit(RadioEvent::ClientRemoved { handle });
        }

        self.transmit.reset();
        self.interlock.reset();
        self.gps.reset();
        self.atu.reset();
        self.wan.reset();
        self.waveform.reset();
        self.profile.reset();
        self.radio.reset();
        self.client_handle.set(0);
    }

    fn clear_registry<T: DynamicObject>(&self, registry: &Registry<T>) {
        for object in registry.clear() {
            self.emit(RadioEvent::ObjectRemoved {
                kind: T::KIND,
                id: object.id(),
            });
        }
    }
}

/// Run `process` and report how far `lost` moved.
fn track_loss(lost: impl Fn() -> u64, process: impl FnOnce()) -> u64 {
    let before = lost();
    process();
    lost().saturating_sub(before)
}

/// Split `0x<id> key=value ...` into the id and the remaining pairs.
fn split_hex_id(kind: ObjectKind, rest: &str) -> Option<(u32, Pairs)> {
    let mut pairs = parse_key_values(rest);
    if pairs.is_empty() {
        tracing::debug!(object = %kind, "Status without id");
        return None;
    }
    let (id, _) = pairs.remove(0);
    match coerce::hex_u32(&id) {
        Some(id) => Some((id, pairs)),
        None => {
            tracing::debug!(object = %kind, id = %id, "Status with bad id");
            None
        }
    }
}

fn in_use(pairs: &[(String, String)]) -> bool {
    pairs
        .iter()
        .any(|(k, v)| k == "in_use" && coerce::bool(v))
}

/// `in_use=0` or a bare `removed` token.
fn is_removal(pairs: &[(String, String)]) -> bool {
    pairs.iter().any(|(k, v)| {
        (k == "in_use" && !coerce::bool(v)) || (k == "removed" && v.is_empty())
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
