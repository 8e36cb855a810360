//! FlexRadio LAN discovery via VITA-49 UDP broadcasts.
//!
//! Radios announce themselves about once a second with a VITA-49 packet of
//! class `0xFFFF` carrying space-separated `key=value` text. This module
//! decodes those announcements into [`DiscoveredRadio`] records and keeps
//! a [`DiscoveryList`] keyed by serial number: a repeat announcement
//! replaces the stored record, and a radio that stops announcing is
//! evicted once its last announcement is older than the staleness
//! threshold.
//!
//! # Usage
//!
//! ```no_run
//! use flexlib::discovery;
//! use std::time::Duration;
//!
//! # async fn example() -> flexlib_core::Result<()> {
//! let radios = discovery::discover(Duration::from_secs(3)).await?;
//! for radio in &radios {
//!     println!("{} ({}) at {}:{}", radio.model, radio.serial, radio.ip, radio.port);
//! }
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use flexlib_core::error::{Error, Result};
use flexlib_core::Guarded;
use flexlib_transport::UdpTransport;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::keyvalue::{coerce, parse_key_values, parse_list};
use crate::tokens::DiscoveryToken;
use crate::vita49::{self, StreamClass};

/// Default FlexRadio discovery broadcast port.
pub const DISCOVERY_PORT: u16 = 4992;

/// Default interval between expiry scans.
pub const DEFAULT_EXPIRY_INTERVAL: Duration = Duration::from_secs(1);

/// Default age after which a silent radio is dropped.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(3);

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// A GUI client listed in a discovery announcement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveredClient {
    pub handle: u32,
    pub program: String,
    pub station: String,
    pub host: String,
    pub ip: String,
}

/// A FlexRadio discovered on the local network.
///
/// Two records are equal when their serial numbers are equal, whatever
/// else differs.
#[derive(Debug, Clone)]
pub struct DiscoveredRadio {
    pub serial: String,
    /// Radio model name (e.g. "FLEX-6600").
    pub model: String,
    /// User-assigned nickname.
    pub nickname: String,
    pub callsign: String,
    /// Announced address, or the datagram's source address when absent.
    pub ip: IpAddr,
    /// TCP command port (typically 4992).
    pub port: u16,
    /// Firmware version string.
    pub firmware_version: String,
    /// `Available`, `In_Use`, `Update`, ...
    pub status: String,
    pub inuse_ip: String,
    pub inuse_host: String,
    pub max_licensed_version: String,
    pub licensed_clients: u32,
    pub available_clients: u32,
    pub available_slices: u32,
    pub available_panadapters: u32,
    pub max_slices: u32,
    pub max_panadapters: u32,
    pub radio_license_id: String,
    pub requires_additional_license: bool,
    pub wan_connected: bool,
    pub fpc_mac: String,
    pub discovery_protocol_version: String,
    pub turf_region: String,
    pub external_port_link: bool,
    pub min_software_version: String,
    pub clients: Vec<DiscoveredClient>,
    /// When the last announcement for this radio arrived.
    pub last_seen: Instant,
}

impl PartialEq for DiscoveredRadio {
    fn eq(&self, other: &Self) -> bool {
        self.serial == other.serial
    }
}

impl Eq for DiscoveredRadio {}

impl DiscoveredRadio {
    fn empty(ip: IpAddr, last_seen: Instant) -> Self {
        Self {
            serial: String::new(),
            model: String::new(),
            nickname: String::new(),
            callsign: String::new(),
            ip,
            port: crate::session::DEFAULT_TCP_PORT,
            firmware_version: String::new(),
            status: String::new(),
            inuse_ip: String::new(),
            inuse_host: String::new(),
            max_licensed_version: String::new(),
            licensed_clients: 0,
            available_clients: 0,
            available_slices: 0,
            available_panadapters: 0,
            max_slices: 0,
            max_panadapters: 0,
            radio_license_id: String::new(),
            requires_additional_license: false,
            wan_connected: false,
            fpc_mac: String::new(),
            discovery_protocol_version: String::new(),
            turf_region: String::new(),
            external_port_link: false,
            min_software_version: String::new(),
            clients: Vec::new(),
            last_seen,
        }
    }

    /// Whether `other` differs in a field a listener shows: the status or
    /// anything about the connected clients.
    pub fn observable_differs(&self, other: &DiscoveredRadio) -> bool {
        self.status != other.status
            || self.inuse_ip != other.inuse_ip
            || self.inuse_host != other.inuse_host
            || self.clients != other.clients
    }
}

/// Decode a discovery announcement. `source` is the datagram's sender.
pub fn parse_discovery_packet(data: &[u8], source: IpAddr) -> Result<DiscoveredRadio> {
    parse_discovery_packet_at(data, source, Instant::now())
}

fn parse_discovery_packet_at(data: &[u8], source: IpAddr, now: Instant) -> Result<DiscoveredRadio> {
    let packet = vita49::parse_packet(data)?;
    if packet.header.stream_class() != StreamClass::Discovery {
        return Err(Error::Protocol("not a discovery packet".into()));
    }

    let text = std::str::from_utf8(packet.payload)
        .map_err(|_| Error::Protocol("discovery payload is not valid UTF-8".into()))?
        .trim_end_matches('\0');

    let radio = parse_discovery_text(text, source, now);
    if radio.serial.is_empty() {
        return Err(Error::Protocol("discovery packet without serial".into()));
    }
    Ok(radio)
}

fn parse_discovery_text(text: &str, source: IpAddr, now: Instant) -> DiscoveredRadio {
    let mut radio = DiscoveredRadio::empty(source, now);
    let mut handles = Vec::new();
    let mut programs = Vec::new();
    let mut stations = Vec::new();
    let mut hosts = Vec::new();
    let mut ips = Vec::new();

    for (key, value) in parse_key_values(text) {
        let Some(token) = DiscoveryToken::from_wire(&key) else {
            tracing::trace!(key = %key, "Unknown discovery key");
            continue;
        };
        match token {
            DiscoveryToken::Serial => radio.serial = value,
            DiscoveryToken::Model => radio.model = value,
            DiscoveryToken::Nickname => radio.nickname = value,
            DiscoveryToken::Callsign => radio.callsign = value,
            DiscoveryToken::Ip => {
                if let Ok(ip) = value.parse() {
                    radio.ip = ip;
                }
            }
            DiscoveryToken::Port => {
                if let Some(port) = coerce::int(&value) {
                    radio.port = port;
                }
            }
            DiscoveryToken::Version => radio.firmware_version = value,
            DiscoveryToken::Status => radio.status = value,
            DiscoveryToken::InUseIp => radio.inuse_ip = value,
            DiscoveryToken::InUseHost => radio.inuse_host = value,
            DiscoveryToken::MaxLicensedVersion => radio.max_licensed_version = value,
            DiscoveryToken::LicensedClients => {
                radio.licensed_clients = coerce::int(&value).unwrap_or(0)
            }
            DiscoveryToken::AvailableClients => {
                radio.available_clients = coerce::int(&value).unwrap_or(0)
            }
            DiscoveryToken::AvailableSlices => {
                radio.available_slices = coerce::int(&value).unwrap_or(0)
            }
            DiscoveryToken::AvailablePanadapters => {
                radio.available_panadapters = coerce::int(&value).unwrap_or(0)
            }
            DiscoveryToken::MaxSlices => radio.max_slices = coerce::int(&value).unwrap_or(0),
            DiscoveryToken::MaxPanadapters => {
                radio.max_panadapters = coerce::int(&value).unwrap_or(0)
            }
            DiscoveryToken::RadioLicenseId => radio.radio_license_id = value,
            DiscoveryToken::RequiresAdditionalLicense => {
                radio.requires_additional_license = coerce::bool(&value)
            }
            DiscoveryToken::WanConnected => radio.wan_connected = coerce::bool(&value),
            DiscoveryToken::FpcMac => radio.fpc_mac = value,
            DiscoveryToken::DiscoveryProtocolVersion => radio.discovery_protocol_version = value,
            DiscoveryToken::TurfRegion => radio.turf_region = value,
            DiscoveryToken::ExternalPortLink => radio.external_port_link = coerce::bool(&value),
            DiscoveryToken::MinSoftwareVersion => radio.min_software_version = value,
            DiscoveryToken::GuiClientHandles => handles = parse_list(&value, ','),
            DiscoveryToken::GuiClientPrograms => programs = parse_list(&value, ','),
            DiscoveryToken::GuiClientStations => stations = parse_list(&value, ','),
            DiscoveryToken::GuiClientHosts => hosts = parse_list(&value, ','),
            DiscoveryToken::GuiClientIps => ips = parse_list(&value, ','),
        }
    }

    let count = handles.len().max(programs.len()).max(stations.len());
    let entry = |list: &[String], i: usize| list.get(i).cloned().unwrap_or_default();
    radio.clients = (0..count)
        .map(|i| DiscoveredClient {
            handle: handles.get(i).and_then(|h| coerce::hex_u32(h)).unwrap_or(0),
            program: entry(&programs, i),
            station: entry(&stations, i).replace('\u{7f}', " "),
            host: entry(&hosts, i),
            ip: entry(&ips, i),
        })
        .collect();
    radio
}

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

/// What [`DiscoveryList::process`] did with an announcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListUpdate {
    Added,
    /// Known radio with a changed status or client list.
    Changed,
    /// Known radio, only `last_seen` and non-observable fields refreshed.
    Refreshed,
}

/// Radios currently announcing, in first-seen order.
#[derive(Debug, Default)]
pub struct DiscoveryList {
    radios: Vec<DiscoveredRadio>,
}

impl DiscoveryList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an announcement.
    pub fn process(&mut self, radio: DiscoveredRadio) -> ListUpdate {
        match self.radios.iter_mut().find(|r| **r == radio) {
            None => {
                tracing::debug!(serial = %radio.serial, model = %radio.model, ip = %radio.ip, "Radio discovered");
                self.radios.push(radio);
                ListUpdate::Added
            }
            Some(existing) => {
                let changed = existing.observable_differs(&radio);
                *existing = radio;
                if changed {
                    tracing::debug!(serial = %existing.serial, status = %existing.status, "Radio announcement changed");
                    ListUpdate::Changed
                } else {
                    ListUpdate::Refreshed
                }
            }
        }
    }

    /// Drop radios last seen more than `stale_after` before `now`,
    /// returning them.
    pub fn expire(&mut self, now: Instant, stale_after: Duration) -> Vec<DiscoveredRadio> {
        let (stale, fresh): (Vec<_>, Vec<_>) = std::mem::take(&mut self.radios)
            .into_iter()
            .partition(|r| now.saturating_duration_since(r.last_seen) > stale_after);
        self.radios = fresh;
        for radio in &stale {
            tracing::debug!(serial = %radio.serial, "Radio expired");
        }
        stale
    }

    pub fn radios(&self) -> &[DiscoveredRadio] {
        &self.radios
    }

    pub fn get(&self, serial: &str) -> Option<&DiscoveredRadio> {
        self.radios.iter().find(|r| r.serial == serial)
    }

    pub fn len(&self) -> usize {
        self.radios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.radios.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Listener
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    pub port: u16,
    pub expiry_interval: Duration,
    pub stale_after: Duration,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            port: DISCOVERY_PORT,
            expiry_interval: DEFAULT_EXPIRY_INTERVAL,
            stale_after: DEFAULT_STALE_AFTER,
        }
    }
}

/// Published whenever the list of radios changes.
#[derive(Debug, Clone)]
pub enum DiscoveryEvent {
    /// Snapshot of the list after the change.
    ListChanged(Vec<DiscoveredRadio>),
}

/// Long-running discovery: listens until stopped or dropped.
#[derive(Debug)]
pub struct DiscoveryListener {
    list: Arc<Guarded<DiscoveryList>>,
    event_tx: broadcast::Sender<DiscoveryEvent>,
    local_addr: SocketAddr,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl DiscoveryListener {
    /// Bind the discovery port and start listening.
    pub async fn start(options: DiscoveryOptions) -> Result<Self> {
        let socket = UdpTransport::bind(
            &SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), options.port).to_string(),
        )
        .await
        .map_err(|e| {
            Error::Transport(format!(
                "failed to bind discovery socket on port {}: {e}",
                options.port
            ))
        })?;
        let local_addr = socket.local_addr();
        tracing::debug!(port = local_addr.port(), "Listening for FlexRadio discovery broadcasts");

        let list = Arc::new(Guarded::new(DiscoveryList::new()));
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(listen(
            socket,
            options,
            Arc::clone(&list),
            event_tx.clone(),
            cancel.clone(),
        ));

        Ok(Self {
            list,
            event_tx,
            local_addr,
            cancel,
            task,
        })
    }

    /// Current radios, in first-seen order.
    pub fn radios(&self) -> Vec<DiscoveredRadio> {
        self.list.read(|l| l.radios().to_vec())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DiscoveryEvent> {
        self.event_tx.subscribe()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub async fn stop(mut self) {
        self.cancel.cancel();
        let _ = (&mut self.task).await;
    }
}

impl Drop for DiscoveryListener {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn listen(
    socket: UdpTransport,
    options: DiscoveryOptions,
    list: Arc<Guarded<DiscoveryList>>,
    event_tx: broadcast::Sender<DiscoveryEvent>,
    cancel: CancellationToken,
) {
    let mut buf = [0u8; 4096];
    let mut expiry = tokio::time::interval(options.expiry_interval);
    expiry.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        let changed = tokio::select! {
            _ = cancel.cancelled() => break,
            _ = expiry.tick() => {
                let expired = list.write(|l| l.expire(Instant::now(), options.stale_after));
                !expired.is_empty()
            }
            received = socket.recv_from(&mut buf) => match received {
                Ok((n, source)) => match parse_discovery_packet(&buf[..n], source.ip()) {
                    Ok(radio) => list.write(|l| l.process(radio)) != ListUpdate::Refreshed,
                    Err(e) => {
                        tracing::trace!(error = %e, source = %source, "Ignoring non-discovery datagram");
                        false
                    }
                },
                Err(e) => {
                    tracing::trace!(error = %e, "Discovery recv error");
                    false
                }
            },
        };
        if changed {
            let snapshot = list.read(|l| l.radios().to_vec());
            let _ = event_tx.send(DiscoveryEvent::ListChanged(snapshot));
        }
    }
    tracing::debug!("Discovery listener stopped");
}

/// Listen for discovery broadcasts on the default port (4992) for
/// `timeout`, returning every radio heard, deduplicated by serial.
pub async fn discover(timeout: Duration) -> Result<Vec<DiscoveredRadio>> {
    discover_on_port(DISCOVERY_PORT, timeout).await
}

/// [`discover`] on a specific port, e.g. a loopback port in tests.
pub async fn discover_on_port(port: u16, timeout: Duration) -> Result<Vec<DiscoveredRadio>> {
    let socket = UdpTransport::bind(
        &SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port).to_string(),
    )
    .await
    .map_err(|e| Error::Transport(format!("failed to bind discovery socket on port {port}: {e}")))?;

    tracing::debug!(port = port, "Listening for FlexRadio discovery broadcasts");

    let mut radios: HashMap<String, DiscoveredRadio> = HashMap::new();
    let mut order: Vec<String> = Vec::new();
    let mut buf = [0u8; 4096];
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            break;
        }

        match socket.recv_from_timeout(&mut buf, remaining).await {
            Ok((n, source)) => {
                if let Ok(radio) = parse_discovery_packet(&buf[..n], source.ip()) {
                    if !radios.contains_key(&radio.serial) {
                        order.push(radio.serial.clone());
                    }
                    radios.insert(radio.serial.clone(), radio);
                }
            }
            Err(Error::Timeout) => break,
            Err(e) => tracing::trace!(error = %e, "Discovery recv error"),
        }
    }

    let result: Vec<DiscoveredRadio> = order
        .into_iter()
        .filter_map(|serial| radios.remove(&serial))
        .collect();
    tracing::debug!(count = result.len(), "Discovery complete");
    Ok(result)
}
