//! Radio session: connection state machine and command channel.
//!
//! A [`RadioSession`] owns one radio connection at a time and walks it
//! through
//!
//! ```text
//! Disconnected -> TcpConnected -> UdpBound -> ClientConnected
//! ```
//!
//! Any state can fall back to `Disconnected`, either through
//! [`disconnect`](RadioSession::disconnect) or because setup or the TCP
//! connection failed. Falling back closes both sockets, drops pending
//! commands, clears every registry and resets the singletons. The session
//! never reconnects on its own.
//!
//! The current state lives in one `watch` channel; nothing else in the
//! library keeps a copy. Every transition is also published as
//! [`RadioEvent::ConnectionStateChanged`].

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use flexlib_core::{
    ConnectionState, DisconnectReason, Error, FirmwareVersion, Guarded, MessageSeverity,
    RadioEvent, Result,
};
use flexlib_transport::{UdpTransport, connect_with_timeout};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{Mutex, broadcast, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::builder::FlexTransports;
use crate::codec::{self, SmartSdrMessage, SmartSdrResponse};
use crate::commands::{CommandTable, ReplyHandler};
use crate::dispatch::ObjectModel;
use crate::keyvalue::coerce;
use crate::streams::PayloadLayout;

/// Default SmartSDR TCP command port.
pub const DEFAULT_TCP_PORT: u16 = 4992;

/// Default first port tried for the VITA-49 receive socket.
pub const DEFAULT_UDP_PORT: u16 = 4991;

/// Default command reply timeout (2 seconds).
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(2);

/// Default wait for the `client ip` reply (5 seconds).
pub const DEFAULT_CLIENT_IP_TIMEOUT: Duration = Duration::from_secs(5);

/// Default keep-alive ping interval (1 second).
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(1);

/// Default network MTU requested from firmware that supports it.
pub const DEFAULT_MTU: u16 = 1450;

/// Ports tried when binding the receive socket.
pub const MAX_BIND_ATTEMPTS: u32 = 20;

/// Oldest handshake version this library talks to.
pub const MIN_SUPPORTED_VERSION: FirmwareVersion = FirmwareVersion::new(1, 4, 0, 0);

/// Newest major version this library understands.
pub const NEWEST_SUPPORTED_VERSION: FirmwareVersion = FirmwareVersion::new(3, 0, 0, 0);

/// Interval between WAN `udp_register` datagrams.
const WAN_REGISTER_INTERVAL: Duration = Duration::from_millis(50);

/// Broadcast channel capacity for event subscribers.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Largest datagram the receive loop accepts.
const MAX_DATAGRAM: usize = 65_536;

const SUBSCRIPTIONS: &[&str] = &[
    "client all",
    "radio all",
    "tx all",
    "atu all",
    "meter all",
    "pan all",
    "slice all",
    "gps all",
    "audio_stream all",
    "daxiq all",
    "dax all",
    "xvtr all",
    "cwx all",
];

type BoxedReader = BufReader<Box<dyn AsyncRead + Unpin + Send + 'static>>;
type BoxedWriter = Box<dyn AsyncWrite + Unpin + Send + 'static>;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Sent as `client program <name>`.
    pub program: String,
    /// Sent as `client station <name>` by GUI clients.
    pub station: String,
    /// Claim the GUI role (`client gui <id>`).
    pub is_gui: bool,
    /// Persistent GUI client id. Generated when absent.
    pub client_id: Option<String>,
    /// GUI client a non-GUI session binds to (`client bind client_id=..`).
    pub bind_client_id: Option<String>,
    /// First port tried for the VITA-49 socket. `0` lets the OS choose.
    pub udp_port: u16,
    pub command_timeout: Duration,
    pub connect_timeout: Duration,
    /// How long to wait for the `client ip` reply before falling back to
    /// the TCP socket's local address.
    pub client_ip_timeout: Duration,
    pub ping_interval: Duration,
    /// Requested network MTU; only sent to firmware 2.3 and later.
    pub mtu: u16,
    /// Ask for reduced-bandwidth (mono int16) DAX audio.
    pub reduced_bandwidth_dax: bool,
    pub max_bind_attempts: u32,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            program: "flexlib".to_string(),
            station: "flexlib".to_string(),
            is_gui: false,
            client_id: None,
            bind_client_id: None,
            udp_port: DEFAULT_UDP_PORT,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            connect_timeout: flexlib_transport::DEFAULT_CONNECT_TIMEOUT,
            client_ip_timeout: DEFAULT_CLIENT_IP_TIMEOUT,
            ping_interval: DEFAULT_PING_INTERVAL,
            mtu: DEFAULT_MTU,
            reduced_bandwidth_dax: false,
            max_bind_attempts: MAX_BIND_ATTEMPTS,
        }
    }
}

/// Extra parameters for a SmartLink (WAN) connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WanConnectParams {
    /// Handle from the SmartLink `connect_ready` message.
    pub wan_handle: String,
    /// The radio's public UDP port, target of the registration datagrams.
    pub public_udp_port: u16,
    /// Negotiated hole-punch port; the receive socket starts there.
    pub hole_punch_port: Option<u16>,
}

/// A random version-4 UUID, formatted the way the radio prints client ids.
pub fn generate_client_id() -> String {
    let mut b: [u8; 16] = rand::random();
    b[6] = (b[6] & 0x0F) | 0x40;
    b[8] = (b[8] & 0x3F) | 0x80;
    let hex: String = b.iter().map(|byte| format!("{byte:02X}")).collect();
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

// ---------------------------------------------------------------------------
// Version policy and bootstrap
// ---------------------------------------------------------------------------

/// Outcome of comparing the radio's version with what the library supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionCheck {
    Supported,
    /// Older than [`MIN_SUPPORTED_VERSION`].
    TooOld,
    /// A major version newer than [`NEWEST_SUPPORTED_VERSION`].
    TooNew,
}

pub fn check_version(version: &FirmwareVersion) -> VersionCheck {
    if version.major > NEWEST_SUPPORTED_VERSION.major {
        VersionCheck::TooNew
    } else if !version.at_least(MIN_SUPPORTED_VERSION.major, MIN_SUPPORTED_VERSION.minor) {
        VersionCheck::TooOld
    } else {
        VersionCheck::Supported
    }
}

/// The commands sent once the handshake is done, in three ordered phases.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapPlan {
    /// Identity and one-shot queries.
    pub primary: Vec<String>,
    pub subscriptions: Vec<String>,
    /// Role- and firmware-dependent settings.
    pub secondary: Vec<String>,
}

impl BootstrapPlan {
    /// All commands in send order.
    pub fn commands(&self) -> impl Iterator<Item = &str> {
        self.primary
            .iter()
            .chain(&self.subscriptions)
            .chain(&self.secondary)
            .map(String::as_str)
    }
}

/// Build the bootstrap command list for a role and firmware version.
pub fn bootstrap_commands(options: &SessionOptions, firmware: &FirmwareVersion) -> BootstrapPlan {
    let mut primary = Vec::new();
    if options.is_gui {
        if let Some(id) = &options.client_id {
            primary.push(codec::cmd_client_gui(id));
        }
        primary.push(codec::cmd_client_program(&options.program));
        primary.push(codec::cmd_client_station(&options.station));
    } else {
        primary.push(codec::cmd_client_program(&options.program));
        if let Some(id) = &options.bind_client_id {
            primary.push(codec::cmd_client_bind(id));
        }
    }
    primary.push(codec::cmd_info());
    primary.push(codec::cmd_antenna_list());
    primary.push(codec::cmd_mic_list());
    primary.push(codec::cmd_keepalive_enable());

    let subscriptions = SUBSCRIPTIONS.iter().map(|s| codec::cmd_subscribe(s)).collect();

    let mut secondary = Vec::new();
    if options.is_gui {
        for set in ["global", "tx", "mic"] {
            secondary.push(codec::cmd_profile_info(set));
        }
    }
    if firmware.at_least(2, 3) {
        secondary.push(codec::cmd_client_set_mtu(options.mtu));
    }
    if options.reduced_bandwidth_dax {
        secondary.push(codec::cmd_client_set_reduced_bw_dax());
    }

    BootstrapPlan {
        primary,
        subscriptions,
        secondary,
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Addresses learned from the TCP connection, when there is one.
#[derive(Debug, Clone, Copy, Default)]
struct Endpoints {
    local_ip: Option<IpAddr>,
    remote_ip: Option<IpAddr>,
}

struct SessionInner {
    options: SessionOptions,
    model: ObjectModel,
    commands: CommandTable,
    event_tx: broadcast::Sender<RadioEvent>,
    state_tx: watch::Sender<ConnectionState>,
    /// Set from the start of `connect` until teardown.
    active: AtomicBool,
    writer: Mutex<Option<BoxedWriter>>,
    cancel: Guarded<CancellationToken>,
    tasks: Guarded<Vec<JoinHandle<()>>>,
    firmware: Guarded<Option<FirmwareVersion>>,
    client_ip: Guarded<Option<IpAddr>>,
    udp: Guarded<Option<Arc<UdpTransport>>>,
}

/// One connection to one radio.
///
/// Create it with [`RadioSession::new`] or through
/// [`SessionBuilder`](crate::builder::SessionBuilder). Dropping a connected
/// session stops its background tasks without posting events.
#[derive(Debug)]
pub struct RadioSession {
    inner: Arc<SessionInner>,
}

impl RadioSession {
    pub fn new(mut options: SessionOptions) -> Self {
        if options.is_gui && options.client_id.is_none() {
            options.client_id = Some(generate_client_id());
        }
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let inner = SessionInner {
            options,
            model: ObjectModel::new(event_tx.clone()),
            commands: CommandTable::new(),
            event_tx,
            state_tx,
            active: AtomicBool::new(false),
            writer: Mutex::new(None),
            cancel: Guarded::new(CancellationToken::new()),
            tasks: Guarded::default(),
            firmware: Guarded::new(None),
            client_ip: Guarded::new(None),
            udp: Guarded::new(None),
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    // -----------------------------------------------------------------
    // Connect / disconnect
    // -----------------------------------------------------------------

    /// Connect to a radio on the LAN.
    pub async fn connect(&self, host: &str, tcp_port: u16) -> Result<()> {
        self.connect_to(host, tcp_port, None).await
    }

    /// Connect to a radio through SmartLink. The TCP leg goes to the
    /// radio's public address.
    pub async fn connect_wan(&self, host: &str, tcp_port: u16, wan: WanConnectParams) -> Result<()> {
        self.connect_to(host, tcp_port, Some(wan)).await
    }

    /// Run the session over pre-connected streams, e.g. a TLS stream for
    /// SmartLink or an in-memory pipe in tests.
    pub async fn connect_with_transport(
        &self,
        transports: FlexTransports,
        wan: Option<WanConnectParams>,
    ) -> Result<()> {
        self.begin()?;
        let endpoints = Endpoints {
            local_ip: transports.local_ip,
            remote_ip: transports.remote_ip,
        };
        self.establish(transports.tcp_read, transports.tcp_write, endpoints, wan)
            .await
    }

    async fn connect_to(&self, host: &str, tcp_port: u16, wan: Option<WanConnectParams>) -> Result<()> {
        self.begin()?;
        let addr = format!("{host}:{tcp_port}");
        let stream = match connect_with_timeout(&addr, self.inner.options.connect_timeout).await {
            Ok(stream) => stream,
            Err(e) => {
                self.inner.active.store(false, Ordering::Release);
                return Err(e);
            }
        };
        let endpoints = Endpoints {
            local_ip: stream.local_addr().ok().map(|a| a.ip()),
            remote_ip: stream.peer_addr().ok().map(|a| a.ip()),
        };
        let (read_half, write_half) = tokio::io::split(stream);
        self.establish(Box::new(read_half), Box::new(write_half), endpoints, wan)
            .await
    }

    /// Claim the session for a new connection.
    fn begin(&self) -> Result<()> {
        if self
            .inner
            .active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::AlreadyConnected);
        }
        for handle in self.inner.tasks.write(std::mem::take) {
            handle.abort();
        }
        self.inner.cancel.set(CancellationToken::new());
        Ok(())
    }

    async fn establish(
        &self,
        reader: Box<dyn AsyncRead + Unpin + Send + 'static>,
        writer: BoxedWriter,
        endpoints: Endpoints,
        wan: Option<WanConnectParams>,
    ) -> Result<()> {
        match self.setup(reader, writer, endpoints, wan).await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::error!(error = %e, "Session setup failed");
                let reason = match &e {
                    Error::BindFailed { attempts, message } => DisconnectReason::BindFailed {
                        attempts: *attempts,
                        message: message.clone(),
                    },
                    other => DisconnectReason::Error(other.to_string()),
                };
                self.inner.teardown(reason).await;
                Err(e)
            }
        }
    }

    async fn setup(
        &self,
        reader: Box<dyn AsyncRead + Unpin + Send + 'static>,
        writer: BoxedWriter,
        endpoints: Endpoints,
        wan: Option<WanConnectParams>,
    ) -> Result<()> {
        let inner = &self.inner;
        let options = &inner.options;
        let cancel = inner.cancel.get();
        let mut reader: BoxedReader = BufReader::new(reader);

        // -- Handshake: version and handle lines --
        let version = match codec::parse_message(
            &read_handshake_line(&mut reader, options.connect_timeout).await?,
        )? {
            SmartSdrMessage::Version(v) => v,
            other => {
                return Err(Error::Protocol(format!(
                    "expected version line, got: {other:?}"
                )));
            }
        };
        let handle = match codec::parse_message(
            &read_handshake_line(&mut reader, options.connect_timeout).await?,
        )? {
            SmartSdrMessage::Handle(h) => h,
            other => {
                return Err(Error::Protocol(format!(
                    "expected handle line, got: {other:?}"
                )));
            }
        };
        tracing::debug!(
            version = %version,
            handle = format!("0x{handle:08X}"),
            "SmartSDR handshake complete"
        );

        match check_version(&version) {
            VersionCheck::Supported => {}
            VersionCheck::TooOld => {
                tracing::warn!(version = %version, minimum = %MIN_SUPPORTED_VERSION, "Radio version older than supported");
            }
            VersionCheck::TooNew => {
                tracing::warn!(version = %version, supported = %NEWEST_SUPPORTED_VERSION, "Radio version newer than supported");
                inner.emit(RadioEvent::DowngradeRequired {
                    radio: version,
                    supported: NEWEST_SUPPORTED_VERSION,
                });
            }
        }

        inner.model.set_client_handle(handle);
        inner.set_firmware(version);
        *inner.writer.lock().await = Some(writer);
        inner.spawn(tcp_read_loop(Arc::clone(inner), reader, cancel.clone()));
        inner.set_state(ConnectionState::TcpConnected);

        // -- WAN handle validation --
        if let Some(wan) = &wan {
            let reply = inner
                .request(&codec::cmd_wan_validate(&wan.wan_handle), options.command_timeout)
                .await?;
            if reply.error_code != 0 {
                return Err(Error::CommandFailed {
                    code: reply.error_code,
                    message: reply.message,
                });
            }
        }

        // -- Firmware version, which decides the conditional commands --
        match inner.request(&codec::cmd_version(), options.command_timeout).await {
            Ok(reply) if reply.error_code == 0 => {
                match codec::firmware_from_version_reply(&reply.message) {
                    Some(firmware) => inner.set_firmware(firmware),
                    None => tracing::debug!(reply = %reply.message, "No firmware version in reply"),
                }
            }
            Ok(reply) => tracing::warn!(
                code = format!("0x{:08X}", reply.error_code),
                "Version query failed"
            ),
            Err(Error::Timeout) => tracing::warn!("Version query timed out"),
            Err(e) => return Err(e),
        }

        // -- Bootstrap --
        let firmware = inner.firmware.get().unwrap_or(version);
        let plan = bootstrap_commands(options, &firmware);
        for command in plan.commands() {
            let handler = (command == "info").then(|| {
                let model_owner = Arc::clone(inner);
                ReplyHandler::Callback(Box::new(move |reply: &SmartSdrResponse| {
                    if reply.error_code == 0 {
                        model_owner
                            .model
                            .apply_info(&codec::parse_info_reply(&reply.message));
                    }
                }))
            });
            inner.write_command(command, handler).await?;
        }

        // -- Client IP rendezvous --
        let reported_ip = match inner.request(&codec::cmd_client_ip(), options.client_ip_timeout).await {
            Ok(reply) if reply.error_code == 0 => reply.message.trim().parse::<IpAddr>().ok(),
            Ok(_) => None,
            Err(Error::Timeout) => {
                tracing::warn!(
                    timeout_ms = options.client_ip_timeout.as_millis(),
                    "No reply to client ip, using the TCP local address"
                );
                None
            }
            Err(e) => return Err(e),
        };
        let client_ip = reported_ip.or(endpoints.local_ip);
        inner.client_ip.set(client_ip);
        tracing::debug!(client_ip = ?client_ip, "Client address resolved");
        ensure_live(&cancel)?;

        // -- UDP --
        let start_port = wan
            .as_ref()
            .and_then(|w| w.hole_punch_port)
            .unwrap_or(options.udp_port);
        let udp = Arc::new(
            UdpTransport::bind_scan(
                IpAddr::V4(Ipv4Addr::UNSPECIFIED),
                start_port,
                options.max_bind_attempts,
            )
            .await?,
        );
        // Teardown may have run while the bind was in flight.
        ensure_live(&cancel)?;
        let port = udp.local_addr().port();
        inner.udp.set(Some(Arc::clone(&udp)));
        if let Err(e) = ensure_live(&cancel) {
            inner.udp.set(None);
            return Err(e);
        }
        inner.set_state(ConnectionState::UdpBound { port });

        match &wan {
            None => {
                inner
                    .write_command(&codec::cmd_client_udpport(port), None)
                    .await?;
            }
            Some(wan) => {
                let radio_ip = endpoints.remote_ip.ok_or_else(|| {
                    Error::Protocol("WAN connection without a radio address".into())
                })?;
                let target = SocketAddr::new(radio_ip, wan.public_udp_port);
                register_wan_udp(inner, &udp, target, handle, &cancel).await?;
            }
        }

        inner.spawn(udp_read_loop(Arc::clone(inner), udp, cancel.clone()));
        inner.spawn(ping_loop(Arc::clone(inner), cancel.clone()));
        ensure_live(&cancel)?;
        inner.set_state(ConnectionState::ClientConnected);

        tracing::info!(
            handle = format!("0x{handle:08X}"),
            udp_port = port,
            "Radio session connected"
        );
        Ok(())
    }

    /// Close the session. Safe to call at any time; a second call is a
    /// no-op.
    pub async fn disconnect(&self) -> Result<()> {
        if !self.inner.active.load(Ordering::Acquire) {
            return Ok(());
        }
        tracing::debug!("Disconnecting radio session");
        self.inner.teardown(DisconnectReason::Normal).await;
        for handle in self.inner.tasks.write(std::mem::take) {
            handle.abort();
        }
        Ok(())
    }

    // -----------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------

    /// Send a command without waiting for its reply. Returns the sequence
    /// number it went out under.
    pub async fn send(&self, command: &str) -> Result<u32> {
        self.inner.write_command(command, None).await
    }

    /// Send a command and run `callback` with its reply.
    pub async fn send_with_callback<F>(&self, command: &str, callback: F) -> Result<u32>
    where
        F: FnOnce(&SmartSdrResponse) + Send + 'static,
    {
        self.inner
            .write_command(command, Some(ReplyHandler::Callback(Box::new(callback))))
            .await
    }

    /// Send a command and wait for its reply data.
    ///
    /// A non-zero result code becomes [`Error::CommandFailed`].
    pub async fn send_and_wait(&self, command: &str) -> Result<String> {
        let reply = self
            .inner
            .request(command, self.inner.options.command_timeout)
            .await?;
        if reply.error_code != 0 {
            return Err(Error::CommandFailed {
                code: reply.error_code,
                message: reply.message,
            });
        }
        Ok(reply.message)
    }

    /// Create a DAX I/Q stream on `channel`, returning its stream id.
    pub async fn create_dax_iq_stream(&self, channel: u8) -> Result<u32> {
        let reply = self
            .send_and_wait(&codec::cmd_stream_create_dax_iq(channel))
            .await?;
        parse_stream_id(&reply)
    }

    /// Create a DAX receive-audio stream on `channel`, returning its id.
    pub async fn create_dax_rx_stream(&self, channel: u8) -> Result<u32> {
        let reply = self
            .send_and_wait(&codec::cmd_stream_create_dax_rx(channel))
            .await?;
        parse_stream_id(&reply)
    }

    /// Ask the radio to remove a stream. The object goes away when the
    /// radio's removal status arrives.
    pub async fn remove_stream(&self, stream_id: u32) -> Result<()> {
        self.send_and_wait(&codec::cmd_stream_remove(stream_id))
            .await
            .map(|_| ())
    }

    pub async fn set_dax_iq_rate(&self, channel: u8, rate: u32) -> Result<()> {
        self.send_and_wait(&codec::cmd_dax_iq_rate(channel, rate))
            .await
            .map(|_| ())
    }

    // -----------------------------------------------------------------
    // State
    // -----------------------------------------------------------------

    pub fn model(&self) -> &ObjectModel {
        &self.inner.model
    }

    /// Event stream. Each receiver gets every event published after it
    /// subscribed.
    pub fn subscribe(&self) -> broadcast::Receiver<RadioEvent> {
        self.inner.event_tx.subscribe()
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.inner.state_tx.borrow()
    }

    /// Watch connection state changes.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state() == ConnectionState::ClientConnected
    }

    /// Negotiated firmware version: the `version` reply when available,
    /// otherwise the handshake version.
    pub fn firmware_version(&self) -> Option<FirmwareVersion> {
        self.inner.firmware.get()
    }

    pub fn client_handle(&self) -> Option<u32> {
        Some(self.inner.model.client_handle()).filter(|h| *h != 0)
    }

    /// The address the radio sends our streams to.
    pub fn client_ip(&self) -> Option<IpAddr> {
        self.inner.client_ip.get()
    }

    pub fn udp_port(&self) -> Option<u16> {
        self.inner
            .udp
            .read(|u| u.as_ref().map(|t| t.local_addr().port()))
    }

    /// GUI client id this session registered with, if any.
    pub fn client_id(&self) -> Option<&str> {
        self.inner.options.client_id.as_deref()
    }

    pub fn pending_commands(&self) -> usize {
        self.inner.commands.len()
    }
}

impl Drop for RadioSession {
    fn drop(&mut self) {
        self.inner.cancel.read(|token| token.cancel());
    }
}

impl std::fmt::Debug for SessionInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionInner")
            .field("state", &*self.state_tx.borrow())
            .field("client_handle", &self.model.client_handle())
            .field("firmware", &self.firmware.get())
            .field("pending_commands", &self.commands.len())
            .finish_non_exhaustive()
    }
}

impl SessionInner {
    fn emit(&self, event: RadioEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Publish `state`. Once teardown has begun only `Disconnected` is
    /// accepted.
    fn set_state(&self, state: ConnectionState) {
        if state != ConnectionState::Disconnected && !self.active.load(Ordering::Acquire) {
            tracing::trace!(?state, "State change after teardown ignored");
            return;
        }
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            tracing::debug!(?previous, ?state, "Connection state changed");
            self.emit(RadioEvent::ConnectionStateChanged(state));
        }
    }

    fn set_firmware(&self, firmware: FirmwareVersion) {
        self.firmware.set(Some(firmware));
        self.model
            .set_payload_layout(PayloadLayout::for_firmware(&firmware));
    }

    fn spawn<F>(&self, task: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(task);
        self.tasks.write(|t| t.push(handle));
    }

    /// Write one command, registering `handler` before it goes out. The
    /// sequence number is taken under the writer lock so numbers hit the
    /// wire in order.
    async fn write_command(&self, command: &str, handler: Option<ReplyHandler>) -> Result<u32> {
        let mut writer = self.writer.lock().await;
        let w = writer.as_mut().ok_or(Error::NotConnected)?;

        let seq = self.commands.next_sequence();
        let tracked = handler.is_some();
        if let Some(handler) = handler {
            self.commands.register(seq, command, handler);
        }
        tracing::trace!(seq, command = %command, "Sending command");

        let encoded = codec::encode_command(seq, command);
        let written = match w.write_all(&encoded).await {
            Ok(()) => w.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            if tracked {
                self.commands.cancel(seq);
            }
            return Err(Error::Transport(format!("failed to send command: {e}")));
        }
        Ok(seq)
    }

    /// Send and wait up to `timeout` for the reply.
    async fn request(&self, command: &str, timeout: Duration) -> Result<SmartSdrResponse> {
        let (tx, rx) = oneshot::channel();
        let seq = self
            .write_command(command, Some(ReplyHandler::Waiter(tx)))
            .await?;
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(Error::ConnectionLost),
            Err(_) => {
                self.commands.cancel(seq);
                Err(Error::Timeout)
            }
        }
    }

    fn handle_line(&self, line: &str) {
        if line.is_empty() {
            return;
        }
        match codec::parse_message(line) {
            Ok(SmartSdrMessage::Response(reply)) => {
                self.commands.complete(reply);
            }
            Ok(SmartSdrMessage::Status(status)) => {
                tracing::trace!(handle = format!("0x{:08X}", status.handle), status = %status.payload, "Status");
                self.model.apply_status(&status.payload);
            }
            Ok(SmartSdrMessage::Message(notice)) => {
                match notice.severity {
                    MessageSeverity::Info => tracing::info!(text = %notice.text, "Radio message"),
                    MessageSeverity::Warning => tracing::warn!(text = %notice.text, "Radio message"),
                    MessageSeverity::Error | MessageSeverity::Fatal => {
                        tracing::error!(text = %notice.text, "Radio message")
                    }
                }
                self.emit(RadioEvent::Message {
                    severity: notice.severity,
                    text: notice.text,
                });
            }
            Ok(SmartSdrMessage::Version(v)) => {
                tracing::warn!(version = %v, "Unexpected version line after handshake");
            }
            Ok(SmartSdrMessage::Handle(h)) => {
                tracing::warn!(handle = format!("0x{h:08X}"), "Unexpected handle line after handshake");
            }
            Ok(SmartSdrMessage::Unknown(line)) => {
                tracing::trace!(line = %line, "Unknown line from radio");
            }
            Err(e) => {
                tracing::trace!(error = %e, line = %line, "Failed to parse line");
            }
        }
    }

    /// Fall back to `Disconnected`. Only the first caller does anything.
    async fn teardown(&self, reason: DisconnectReason) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        self.cancel.read(|token| token.cancel());

        let writer = self.writer.lock().await.take();
        if let Some(mut w) = writer {
            let _ = w.shutdown().await;
        }
        self.udp.set(None);

        let dropped = self.commands.clear();
        if dropped > 0 {
            tracing::debug!(dropped, "Pending commands dropped");
        }
        self.model.clear();
        self.firmware.set(None);
        self.client_ip.set(None);

        self.set_state(ConnectionState::Disconnected);
        tracing::info!(reason = ?reason, "Radio session disconnected");
        self.emit(RadioEvent::Disconnected { reason });
    }
}

fn ensure_live(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(Error::ConnectionLost)
    } else {
        Ok(())
    }
}

fn parse_stream_id(reply: &str) -> Result<u32> {
    coerce::hex_u32(reply.trim())
        .ok_or_else(|| Error::Protocol(format!("invalid stream id in reply: {reply}")))
}

// ---------------------------------------------------------------------------
// Handshake and background tasks
// ---------------------------------------------------------------------------

/// Read one line during the handshake.
async fn read_handshake_line(reader: &mut BoxedReader, timeout: Duration) -> Result<String> {
    let mut line = String::new();
    match tokio::time::timeout(timeout, reader.read_line(&mut line)).await {
        Ok(Ok(0)) => Err(Error::ConnectionLost),
        Ok(Ok(_)) => Ok(line.trim_end_matches(['\r', '\n']).to_string()),
        Ok(Err(e)) => Err(Error::Transport(format!("handshake read error: {e}"))),
        Err(_) => Err(Error::Timeout),
    }
}

/// Send `client udp_register` datagrams until the radio answers with any
/// datagram or the attempts run out.
async fn register_wan_udp(
    inner: &Arc<SessionInner>,
    udp: &UdpTransport,
    target: SocketAddr,
    handle: u32,
    cancel: &CancellationToken,
) -> Result<()> {
    let datagram = codec::cmd_client_udp_register(handle);
    let mut buf = vec![0u8; MAX_DATAGRAM];
    for attempt in 1..=inner.options.max_bind_attempts {
        ensure_live(cancel)?;
        udp.send_to(datagram.as_bytes(), target).await?;
        match udp.recv_from_timeout(&mut buf, WAN_REGISTER_INTERVAL).await {
            Ok((n, _)) => {
                tracing::debug!(attempt, target = %target, "WAN UDP registration answered");
                inner.model.process_packet(&buf[..n]);
                return Ok(());
            }
            Err(Error::Timeout) => continue,
            Err(e) => return Err(e),
        }
    }
    tracing::warn!(
        attempts = inner.options.max_bind_attempts,
        target = %target,
        "No UDP traffic after WAN registration"
    );
    Ok(())
}

async fn tcp_read_loop(inner: Arc<SessionInner>, mut reader: BoxedReader, cancel: CancellationToken) {
    let mut line = String::new();
    let reason = loop {
        line.clear();
        tokio::select! {
            _ = cancel.cancelled() => return,
            read = reader.read_line(&mut line) => match read {
                Ok(0) => {
                    tracing::debug!("TCP connection closed by radio");
                    break DisconnectReason::Normal;
                }
                Ok(_) => inner.handle_line(line.trim_end_matches(['\r', '\n'])),
                Err(e) => {
                    tracing::debug!(error = %e, "TCP read error");
                    break DisconnectReason::Error(format!("TCP read error: {e}"));
                }
            },
        }
    };
    inner.teardown(reason).await;
}

async fn udp_read_loop(inner: Arc<SessionInner>, udp: Arc<UdpTransport>, cancel: CancellationToken) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            received = udp.recv_from(&mut buf) => match received {
                Ok((n, _)) => inner.model.process_packet(&buf[..n]),
                Err(e) => tracing::debug!(error = %e, "UDP receive error"),
            },
        }
    }
    tracing::debug!("UDP receive loop stopped");
}

async fn ping_loop(inner: Arc<SessionInner>, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(inner.options.ping_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick fires immediately.
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(e) = inner.write_command(&codec::cmd_ping(), None).await {
                    tracing::debug!(error = %e, "Ping failed");
                    break;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn gui_options() -> SessionOptions {
        SessionOptions {
            is_gui: true,
            client_id: Some("0A1B2C3D-0000-4000-8000-000000000001".into()),
            program: "Logger".into(),
            station: "Shack PC".into(),
            ..SessionOptions::default()
        }
    }

    #[test]
    fn version_policy() {
        assert_eq!(check_version(&FirmwareVersion::new(1, 4, 0, 0)), VersionCheck::Supported);
        assert_eq!(check_version(&FirmwareVersion::new(3, 9, 1, 0)), VersionCheck::Supported);
        assert_eq!(check_version(&FirmwareVersion::new(1, 3, 9, 0)), VersionCheck::TooOld);
        assert_eq!(check_version(&FirmwareVersion::new(4, 0, 0, 0)), VersionCheck::TooNew);
    }

    #[test]
    fn gui_bootstrap_order() {
        let plan = bootstrap_commands(&gui_options(), &FirmwareVersion::new(3, 5, 0, 0));
        assert_eq!(
            &plan.primary[..3],
            &[
                "client gui 0A1B2C3D-0000-4000-8000-000000000001".to_string(),
                "client program Logger".to_string(),
                "client station Shack\u{7f}PC".to_string(),
            ]
        );
        assert!(plan.subscriptions.iter().all(|c| c.starts_with("sub ")));
        assert!(plan.secondary.contains(&"profile global info".to_string()));
        assert!(plan
            .secondary
            .contains(&"client set enforce_network_mtu=1 network_mtu=1450".to_string()));

        let all: Vec<&str> = plan.commands().collect();
        let info = all.iter().position(|c| *c == "info").expect("info sent");
        let first_sub = all.iter().position(|c| c.starts_with("sub ")).expect("subs sent");
        assert!(info < first_sub);
    }

    #[test]
    fn conditional_commands() {
        let options = SessionOptions {
            bind_client_id: Some("ABC".into()),
            reduced_bandwidth_dax: true,
            ..SessionOptions::default()
        };
        let plan = bootstrap_commands(&options, &FirmwareVersion::new(2, 2, 9, 0));
        assert!(plan.primary.contains(&"client bind client_id=ABC".to_string()));
        assert!(!plan.primary.iter().any(|c| c.starts_with("client gui")));
        assert!(!plan.secondary.iter().any(|c| c.contains("network_mtu")));
        assert!(!plan.secondary.iter().any(|c| c.starts_with("profile")));
        assert!(plan
            .secondary
            .contains(&"client set send_reduced_bw_dax=1".to_string()));
    }

    #[test]
    fn generated_client_id_shape() {
        let id = generate_client_id();
        assert_eq!(id.len(), 36);
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.iter().map(|p| p.len()).collect::<Vec<_>>(), vec![8, 4, 4, 4, 12]);
        assert!(parts[2].starts_with('4'));
        assert_ne!(id, generate_client_id());
    }

    #[test]
    fn gui_session_gets_client_id() {
        let session = RadioSession::new(SessionOptions {
            is_gui: true,
            ..SessionOptions::default()
        });
        assert!(session.client_id().is_some());
        assert!(RadioSession::new(SessionOptions::default()).client_id().is_none());
    }

    #[test]
    fn stream_id_reply() {
        assert_eq!(parse_stream_id("0x20000000").ok(), Some(0x2000_0000));
        assert_eq!(parse_stream_id("04000008").ok(), Some(0x0400_0008));
        assert!(parse_stream_id("nope").is_err());
    }

    #[tokio::test]
    async fn misuse_reported() {
        let session = RadioSession::new(SessionOptions::default());
        assert!(matches!(session.send("info").await, Err(Error::NotConnected)));
        assert!(matches!(session.send_and_wait("info").await, Err(Error::NotConnected)));
        assert_eq!(session.connection_state(), ConnectionState::Disconnected);
        // Disconnecting an idle session is a no-op.
        session.disconnect().await.expect("idle disconnect");
        session.disconnect().await.expect("second disconnect");
    }

    #[tokio::test]
    async fn state_frozen_once_inactive() {
        let session = RadioSession::new(SessionOptions::default());
        let mut events = session.subscribe();

        // Setup finishing after teardown must not revive the state.
        session.inner.set_state(ConnectionState::UdpBound { port: 4991 });
        session.inner.set_state(ConnectionState::ClientConnected);
        assert_eq!(session.connection_state(), ConnectionState::Disconnected);
        assert!(events.try_recv().is_err());

        session.inner.active.store(true, Ordering::Release);
        session.inner.set_state(ConnectionState::TcpConnected);
        assert_eq!(session.connection_state(), ConnectionState::TcpConnected);
        session.inner.teardown(DisconnectReason::Normal).await;
        session.inner.set_state(ConnectionState::UdpBound { port: 4991 });
        assert_eq!(session.connection_state(), ConnectionState::Disconnected);
    }
}
