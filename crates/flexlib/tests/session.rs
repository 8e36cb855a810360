//! End-to-end session tests against the mock radio over loopback.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use flexlib::{FlexTransports, RadioSession, SessionBuilder, WanConnectParams};
use flexlib_core::{
    ConnectionState, DisconnectReason, Error, FirmwareVersion, MessageSeverity, ObjectKind,
    RadioEvent,
};
use flexlib_test_harness::vita::meter_payload;
use flexlib_test_harness::{MockRadio, MockRadioConfig, VitaPacketBuilder};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{broadcast, mpsc};

const WAIT: Duration = Duration::from_secs(2);

fn builder(radio: &MockRadio) -> SessionBuilder {
    SessionBuilder::new()
        .host(&radio.host())
        .tcp_port(radio.port())
        .udp_port(0)
        .ping_interval(Duration::from_secs(60))
        .command_timeout(Duration::from_millis(500))
        .client_ip_timeout(Duration::from_millis(500))
}

async fn connect(radio: &MockRadio) -> RadioSession {
    builder(radio).connect().await.expect("session connects")
}

/// Wait for the first event matching `pred`.
async fn expect_event(
    rx: &mut broadcast::Receiver<RadioEvent>,
    mut pred: impl FnMut(&RadioEvent) -> bool,
) -> RadioEvent {
    tokio::time::timeout(WAIT, async {
        loop {
            match rx.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("event arrives in time")
}

async fn wait_for_state(session: &RadioSession, wanted: ConnectionState) {
    let mut watch = session.watch_state();
    tokio::time::timeout(WAIT, async {
        while *watch.borrow_and_update() != wanted {
            if watch.changed().await.is_err() {
                break;
            }
        }
    })
    .await
    .expect("state reached in time");
}

#[tokio::test]
async fn connect_runs_bootstrap() {
    let radio = MockRadio::start(MockRadioConfig::new()).await.unwrap();
    let session = connect(&radio).await;

    assert_eq!(session.connection_state(), ConnectionState::ClientConnected);
    assert_eq!(session.client_handle(), Some(0x1234_5678));
    assert_eq!(session.firmware_version(), Some(FirmwareVersion::new(3, 5, 1, 0)));
    assert_eq!(session.client_ip(), Some("127.0.0.1".parse::<IpAddr>().unwrap()));

    let port = session.udp_port().expect("udp bound");
    let udpport = radio
        .wait_for_command("client udpport", WAIT)
        .await
        .expect("udp port announced");
    assert_eq!(udpport, format!("client udpport {port}"));

    let commands = radio.commands();
    let position = |cmd: &str| commands.iter().position(|c| c == cmd);
    let version = position("version").expect("version sent");
    let program = position("client program flexlib").expect("program sent");
    let sub = position("sub slice all").expect("subscription sent");
    let mtu = position("client set enforce_network_mtu=1 network_mtu=1450").expect("mtu sent");
    let client_ip = position("client ip").expect("client ip sent");
    assert!(version < program);
    assert!(program < sub);
    assert!(sub < mtu);
    assert!(mtu < client_ip);

    session.disconnect().await.unwrap();
}

#[tokio::test]
async fn status_lines_reach_the_model() {
    let radio = MockRadio::start(MockRadioConfig::new()).await.unwrap();
    let session = connect(&radio).await;
    let mut events = session.subscribe();

    radio.push_status("xvtr 0 in_use=1 name=2m rf_freq=144.000000");
    let event = expect_event(&mut events, |e| matches!(e, RadioEvent::ObjectAdded { .. })).await;
    assert!(matches!(
        event,
        RadioEvent::ObjectAdded { kind: ObjectKind::Transverter, id: 0 }
    ));
    assert_eq!(session.model().transverters().ids(), vec![0]);

    radio.push_status("xvtr 0 in_use=0");
    expect_event(&mut events, |e| {
        matches!(e, RadioEvent::ObjectRemoved { kind: ObjectKind::Transverter, id: 0 })
    })
    .await;
    assert!(session.model().transverters().is_empty());
}

#[tokio::test]
async fn radio_messages_become_events() {
    let radio = MockRadio::start(MockRadioConfig::new()).await.unwrap();
    let session = connect(&radio).await;
    let mut events = session.subscribe();

    radio.push_message(0x0100_0001, "Transmit inhibited");
    let event = expect_event(&mut events, |e| matches!(e, RadioEvent::Message { .. })).await;
    let RadioEvent::Message { severity, text } = event else {
        unreachable!();
    };
    assert_eq!(severity, MessageSeverity::Warning);
    assert_eq!(text, "Transmit inhibited");
}

#[tokio::test]
async fn meter_datagrams_update_values() {
    let radio = MockRadio::start(MockRadioConfig::new()).await.unwrap();
    let session = connect(&radio).await;
    let mut events = session.subscribe();

    radio.push_status("meter 7.src=RAD#7.nam=PATEMP#7.unit=degC#");
    expect_event(&mut events, |e| {
        matches!(e, RadioEvent::ObjectAdded { kind: ObjectKind::Meter, id: 7 })
    })
    .await;

    let port = session.udp_port().expect("udp bound");
    let packet = VitaPacketBuilder::new(0x8002)
        .stream_id(0x0000_0700)
        .payload(&meter_payload(&[(7, 64 * 30)]))
        .build();
    let sender = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
    sender.send_to(&packet, ("127.0.0.1", port)).await.unwrap();

    let meter = session.model().meters().get(7).expect("meter exists");
    tokio::time::timeout(WAIT, async {
        while meter.value().is_none() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("meter value arrives");
    assert_eq!(meter.value(), Some(30.0));
}

#[tokio::test]
async fn command_replies() {
    let radio = MockRadio::start(
        MockRadioConfig::new()
            .reply("stream create type=dax_iq", "0x20000001")
            .fail("stream create type=dax_rx", 0x5000_002C, "no free channel")
            .silent("slice tune"),
    )
    .await
    .unwrap();
    let session = connect(&radio).await;

    assert_eq!(session.create_dax_iq_stream(1).await.unwrap(), 0x2000_0001);

    match session.create_dax_rx_stream(1).await {
        Err(Error::CommandFailed { code, message }) => {
            assert_eq!(code, 0x5000_002C);
            assert_eq!(message, "no free channel");
        }
        other => panic!("expected CommandFailed, got {other:?}"),
    }

    let before = session.pending_commands();
    assert!(matches!(
        session.send_and_wait("slice tune 0 14.074").await,
        Err(Error::Timeout)
    ));
    assert!(session.pending_commands() <= before);
}

#[tokio::test]
async fn unanswered_pings_are_not_tracked() {
    let radio = MockRadio::start(MockRadioConfig::new().silent("ping")).await.unwrap();
    let session = builder(&radio)
        .ping_interval(Duration::from_millis(10))
        .connect()
        .await
        .unwrap();

    tokio::time::timeout(WAIT, async {
        while radio.commands().iter().filter(|c| *c == "ping").count() < 5 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("pings sent");
    assert_eq!(session.pending_commands(), 0);
    session.disconnect().await.unwrap();
}

#[tokio::test]
async fn callback_receives_reply() {
    let radio = MockRadio::start(MockRadioConfig::new().reply("info", "model=\"FLEX-6600\"")).await.unwrap();
    let session = connect(&radio).await;

    let (tx, rx) = tokio::sync::oneshot::channel();
    session
        .send_with_callback("info", move |reply| {
            let _ = tx.send(reply.message.clone());
        })
        .await
        .unwrap();
    let message = tokio::time::timeout(WAIT, rx).await.unwrap().unwrap();
    assert_eq!(message, "model=\"FLEX-6600\"");
}

#[tokio::test]
async fn client_ip_timeout_falls_back_to_local_address() {
    let radio = MockRadio::start(MockRadioConfig::new().silent("client ip")).await.unwrap();
    let session = builder(&radio)
        .client_ip_timeout(Duration::from_millis(100))
        .connect()
        .await
        .expect("session connects without a client ip reply");

    assert_eq!(session.connection_state(), ConnectionState::ClientConnected);
    assert_eq!(session.client_ip(), Some("127.0.0.1".parse::<IpAddr>().unwrap()));
}

#[tokio::test]
async fn newer_firmware_requests_downgrade() {
    let radio = MockRadio::start(MockRadioConfig::new().version("4.1.0.0")).await.unwrap();
    let session = builder(&radio).build();
    let mut events = session.subscribe();

    session.connect(&radio.host(), radio.port()).await.unwrap();
    let event = expect_event(&mut events, |e| matches!(e, RadioEvent::DowngradeRequired { .. })).await;
    let RadioEvent::DowngradeRequired { radio: version, .. } = event else {
        unreachable!();
    };
    assert_eq!(version, FirmwareVersion::new(4, 1, 0, 0));
    assert!(session.is_connected());
}

#[tokio::test]
async fn radio_drop_tears_down() {
    let radio = MockRadio::start(MockRadioConfig::new()).await.unwrap();
    let session = connect(&radio).await;
    let mut events = session.subscribe();

    radio.push_status("xvtr 1 in_use=1 name=70cm");
    expect_event(&mut events, |e| matches!(e, RadioEvent::ObjectAdded { .. })).await;

    radio.close();
    let event = expect_event(&mut events, |e| matches!(e, RadioEvent::Disconnected { .. })).await;
    assert!(matches!(
        event,
        RadioEvent::Disconnected { reason: DisconnectReason::Normal }
    ));
    wait_for_state(&session, ConnectionState::Disconnected).await;

    assert!(session.model().transverters().is_empty());
    assert_eq!(session.client_handle(), None);
    assert_eq!(session.udp_port(), None);
    assert!(matches!(session.send("info").await, Err(Error::NotConnected)));
}

#[tokio::test]
async fn disconnect_is_idempotent() {
    let radio = MockRadio::start(MockRadioConfig::new()).await.unwrap();
    let session = connect(&radio).await;
    let mut events = session.subscribe();

    session.disconnect().await.unwrap();
    session.disconnect().await.unwrap();
    assert_eq!(session.connection_state(), ConnectionState::Disconnected);

    let mut disconnects = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, RadioEvent::Disconnected { .. }) {
            disconnects += 1;
        }
    }
    assert_eq!(disconnects, 1);
}

#[tokio::test]
async fn second_connect_rejected() {
    let radio = MockRadio::start(MockRadioConfig::new()).await.unwrap();
    let session = connect(&radio).await;
    assert!(matches!(
        session.connect(&radio.host(), radio.port()).await,
        Err(Error::AlreadyConnected)
    ));
    assert!(session.is_connected());
}

#[tokio::test]
async fn bind_failure_disconnects() {
    let taken = std::net::UdpSocket::bind("0.0.0.0:0").unwrap();
    let port = taken.local_addr().unwrap().port();

    let radio = MockRadio::start(MockRadioConfig::new()).await.unwrap();
    let session = builder(&radio).udp_port(port).max_bind_attempts(1).build();
    let mut events = session.subscribe();

    let result = session.connect(&radio.host(), radio.port()).await;
    assert!(matches!(result, Err(Error::BindFailed { attempts: 1, .. })));
    assert_eq!(session.connection_state(), ConnectionState::Disconnected);

    let event = expect_event(&mut events, |e| matches!(e, RadioEvent::Disconnected { .. })).await;
    match event {
        RadioEvent::Disconnected {
            reason: DisconnectReason::BindFailed { attempts, message },
        } => {
            assert_eq!(attempts, 1);
            assert!(!message.is_empty());
        }
        other => panic!("expected a bind failure, got {other:?}"),
    }
}

#[tokio::test]
async fn connect_over_in_memory_transport() {
    let (client, server) = tokio::io::duplex(16 * 1024);
    let (client_read, client_write) = tokio::io::split(client);

    // Minimal radio: handshake, then an empty success reply to everything
    // except `client ip`.
    tokio::spawn(async move {
        let (server_read, mut server_write) = tokio::io::split(server);
        if server_write.write_all(b"V1.4.0.0\nH0000ABCD\n").await.is_err() {
            return;
        }
        let mut lines = BufReader::new(server_read).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let Some((seq, command)) = line.strip_prefix('C').and_then(|r| r.split_once('|')) else {
                continue;
            };
            let data = if command == "client ip" { "10.1.2.3" } else { "" };
            let reply = format!("R{seq}|0|{data}\n");
            if server_write.write_all(reply.as_bytes()).await.is_err() {
                break;
            }
        }
    });

    let session = SessionBuilder::new()
        .udp_port(0)
        .ping_interval(Duration::from_secs(60))
        .command_timeout(Duration::from_millis(500))
        .connect_with_transport(FlexTransports::new(client_read, client_write))
        .await
        .expect("in-memory session connects");

    assert_eq!(session.client_handle(), Some(0xABCD));
    assert_eq!(session.firmware_version(), Some(FirmwareVersion::new(1, 4, 0, 0)));
    assert_eq!(session.client_ip(), Some("10.1.2.3".parse::<IpAddr>().unwrap()));
    session.disconnect().await.unwrap();
}

// ---------------------------------------------------------------------------
// SmartLink (WAN) sessions
// ---------------------------------------------------------------------------

/// Stands in for the radio's public UDP port. Every datagram is forwarded
/// as text; with `answer` set each one is also echoed back to its sender.
async fn wan_udp_peer(answer: bool) -> (u16, mpsc::UnboundedReceiver<(String, SocketAddr)>) {
    let socket = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let port = socket.local_addr().unwrap().port();
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut buf = [0u8; 1500];
        while let Ok((n, from)) = socket.recv_from(&mut buf).await {
            if answer {
                let _ = socket.send_to(&buf[..n], from).await;
            }
            if tx.send((String::from_utf8_lossy(&buf[..n]).into_owned(), from)).is_err() {
                break;
            }
        }
    });
    (port, rx)
}

fn wan_params(public_udp_port: u16, hole_punch_port: Option<u16>) -> WanConnectParams {
    WanConnectParams {
        wan_handle: "0x5F3C0012".into(),
        public_udp_port,
        hole_punch_port,
    }
}

fn free_udp_port() -> u16 {
    std::net::UdpSocket::bind("0.0.0.0:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

#[tokio::test]
async fn wan_session_registers_udp() {
    let radio = MockRadio::start(MockRadioConfig::new()).await.unwrap();
    let (public_port, mut datagrams) = wan_udp_peer(true).await;
    let hole_punch = free_udp_port();
    let session = builder(&radio).build();

    session
        .connect_wan(&radio.host(), radio.port(), wan_params(public_port, Some(hole_punch)))
        .await
        .expect("WAN session connects");

    assert_eq!(session.connection_state(), ConnectionState::ClientConnected);
    assert_eq!(session.udp_port(), Some(hole_punch));

    let (register, from) = datagrams.recv().await.expect("registration datagram");
    assert_eq!(register, "client udp_register handle=0x12345678");
    assert_eq!(from.port(), hole_punch);
    assert!(datagrams.try_recv().is_err(), "registration stops once answered");

    let commands = radio.commands();
    assert_eq!(commands.first().map(String::as_str), Some("wan validate handle=0x5F3C0012"));
    assert!(!commands.iter().any(|c| c.starts_with("client udpport")));
    session.disconnect().await.unwrap();
}

#[tokio::test]
async fn wan_validation_failure_aborts() {
    let config = MockRadioConfig::new().fail("wan validate", 0x5000_0010, "bad handle");
    let radio = MockRadio::start(config).await.unwrap();
    let session = builder(&radio).build();
    let mut events = session.subscribe();

    let result = session
        .connect_wan(&radio.host(), radio.port(), wan_params(4993, None))
        .await;
    assert!(matches!(result, Err(Error::CommandFailed { code: 0x5000_0010, .. })));
    assert_eq!(session.connection_state(), ConnectionState::Disconnected);
    expect_event(&mut events, |e| {
        matches!(e, RadioEvent::Disconnected { reason: DisconnectReason::Error(_) })
    })
    .await;
    assert!(!radio.commands().iter().any(|c| c == "version"));
}

#[tokio::test]
async fn unanswered_registration_gives_up_and_connects() {
    let radio = MockRadio::start(MockRadioConfig::new()).await.unwrap();
    let (public_port, mut datagrams) = wan_udp_peer(false).await;
    let session = builder(&radio).max_bind_attempts(3).build();

    session
        .connect_wan(&radio.host(), radio.port(), wan_params(public_port, None))
        .await
        .expect("session connects without a UDP answer");
    assert_eq!(session.connection_state(), ConnectionState::ClientConnected);

    let mut registrations = 0;
    while let Ok(Some(_)) = tokio::time::timeout(Duration::from_millis(200), datagrams.recv()).await {
        registrations += 1;
    }
    assert_eq!(registrations, 3);
    session.disconnect().await.unwrap();
}

#[tokio::test]
async fn disconnect_during_registration() {
    let radio = MockRadio::start(MockRadioConfig::new()).await.unwrap();
    let (public_port, mut datagrams) = wan_udp_peer(false).await;
    let session = Arc::new(builder(&radio).max_bind_attempts(1000).build());
    let (host, port) = (radio.host(), radio.port());

    let connecting = tokio::spawn({
        let session = Arc::clone(&session);
        async move {
            session
                .connect_wan(&host, port, wan_params(public_port, None))
                .await
        }
    });

    tokio::time::timeout(WAIT, datagrams.recv())
        .await
        .expect("registration started")
        .expect("datagram");
    session.disconnect().await.unwrap();

    let result = tokio::time::timeout(WAIT, connecting)
        .await
        .expect("connect returns")
        .unwrap();
    assert!(matches!(result, Err(Error::ConnectionLost)));
    assert_eq!(session.connection_state(), ConnectionState::Disconnected);
    assert_eq!(session.udp_port(), None);
}

#[tokio::test]
async fn wan_transport_needs_radio_address() {
    let (client, server) = tokio::io::duplex(16 * 1024);
    let (client_read, client_write) = tokio::io::split(client);
    tokio::spawn(async move {
        let (server_read, mut server_write) = tokio::io::split(server);
        if server_write.write_all(b"V3.5.1.0\nH00000042\n").await.is_err() {
            return;
        }
        let mut lines = BufReader::new(server_read).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let Some((seq, _)) = line.strip_prefix('C').and_then(|r| r.split_once('|')) else {
                continue;
            };
            if server_write.write_all(format!("R{seq}|0|\n").as_bytes()).await.is_err() {
                break;
            }
        }
    });

    let session = SessionBuilder::new()
        .udp_port(0)
        .ping_interval(Duration::from_secs(60))
        .command_timeout(Duration::from_millis(500))
        .client_ip_timeout(Duration::from_millis(500))
        .build();
    let result = session
        .connect_with_transport(
            FlexTransports::new(client_read, client_write),
            Some(wan_params(4993, None)),
        )
        .await;
    assert!(matches!(result, Err(Error::Protocol(_))));
    assert_eq!(session.connection_state(), ConnectionState::Disconnected);
    assert_eq!(session.udp_port(), None);
}
