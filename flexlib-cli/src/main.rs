// flexlib command-line monitor -- discovers FlexRadio radios, follows a
// session's events, and sends one-off commands.
//
// Usage:
//   flexlib-cli discover
//   flexlib-cli discover --watch
//   flexlib-cli monitor --host 192.168.1.100
//   flexlib-cli monitor --discover --gui --station "Shack PC"
//   flexlib-cli send --host 192.168.1.100 info
//   flexlib-cli -v send --host 192.168.1.100 slice list

use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

use flexlib::discovery::{self, DiscoveryEvent, DiscoveryListener, DiscoveryOptions};
use flexlib::session::DEFAULT_TCP_PORT;
use flexlib::{DiscoveredRadio, RadioSession, SessionBuilder};
use flexlib_core::RadioEvent;

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// flexlib command-line monitor.
#[derive(Parser)]
#[command(name = "flexlib-cli", version, about)]
struct Cli {
    /// Log at debug level (RUST_LOG overrides).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

/// Where to find the radio.
#[derive(clap::Args)]
struct Target {
    /// Radio IP address or hostname.
    #[arg(long)]
    host: Option<String>,

    /// SmartSDR TCP port.
    #[arg(long, default_value_t = DEFAULT_TCP_PORT)]
    port: u16,

    /// Connect to the first radio heard on the LAN instead of --host.
    #[arg(long)]
    discover: bool,

    /// Client program name sent to the radio.
    #[arg(long, default_value = "flexlib-cli")]
    program: String,

    /// Command reply timeout in milliseconds.
    #[arg(long, default_value_t = 2000)]
    timeout_ms: u64,
}

#[derive(Subcommand)]
enum Command {
    /// Listen for discovery broadcasts.
    Discover {
        /// How long to listen, in seconds.
        #[arg(long, default_value_t = 3)]
        seconds: u64,

        /// Keep listening and print every change to the radio list.
        #[arg(long)]
        watch: bool,
    },

    /// Connect and print session events until Ctrl-C.
    Monitor {
        #[command(flatten)]
        target: Target,

        /// Register as a GUI client.
        #[arg(long)]
        gui: bool,

        /// Station name (GUI clients only).
        #[arg(long, default_value = "flexlib")]
        station: String,
    },

    /// Connect, send one command, print the reply, and disconnect.
    Send {
        #[command(flatten)]
        target: Target,

        /// The command text, e.g. `info` or `slice list`.
        #[arg(required = true, num_args = 1..)]
        command: Vec<String>,
    },
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

async fn cmd_discover(seconds: u64, watch: bool) -> Result<()> {
    if watch {
        let listener = DiscoveryListener::start(DiscoveryOptions::default())
            .await
            .context("failed to start discovery listener")?;
        let mut events = listener.subscribe();
        println!("Listening for FlexRadio announcements (Ctrl-C to stop)...");
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                event = events.recv() => match event {
                    Ok(DiscoveryEvent::ListChanged(radios)) => {
                        println!();
                        print_radios(&radios);
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
        listener.stop().await;
        return Ok(());
    }

    println!("Discovering FlexRadio radios on the LAN ({seconds} seconds)...");
    println!();
    let radios = discovery::discover(Duration::from_secs(seconds))
        .await
        .context("FlexRadio discovery failed")?;
    if radios.is_empty() {
        println!("No FlexRadio radios found.");
        return Ok(());
    }
    print_radios(&radios);
    Ok(())
}

fn print_radios(radios: &[DiscoveredRadio]) {
    if radios.is_empty() {
        println!("(no radios)");
    }
    for radio in radios {
        println!(
            "{:<12} {:<20} {:<16} {}:{}  fw {}  {}",
            radio.model,
            radio.serial,
            radio.nickname,
            radio.ip,
            radio.port,
            radio.firmware_version,
            radio.status
        );
        for client in &radio.clients {
            println!(
                "    client 0x{:08X} {} @ {} ({})",
                client.handle, client.program, client.station, client.ip
            );
        }
    }
}

async fn connect(target: &Target, configure: impl FnOnce(SessionBuilder) -> SessionBuilder) -> Result<RadioSession> {
    let mut builder = SessionBuilder::new()
        .program(&target.program)
        .command_timeout(Duration::from_millis(target.timeout_ms));

    builder = match (&target.host, target.discover) {
        (Some(host), false) => builder.host(host).tcp_port(target.port),
        (None, true) => {
            let radios = discovery::discover(Duration::from_secs(3))
                .await
                .context("FlexRadio discovery failed")?;
            let radio = radios.first().context("no FlexRadio found on the LAN")?;
            println!("Found {} ({}) at {}", radio.model, radio.serial, radio.ip);
            builder.radio(radio)
        }
        (Some(_), true) => bail!("--host and --discover are mutually exclusive"),
        (None, false) => bail!("either --host or --discover is required"),
    };

    configure(builder)
        .connect()
        .await
        .context("failed to connect to radio")
}

async fn cmd_monitor(target: Target, gui: bool, station: String) -> Result<()> {
    let session = connect(&target, |b| b.gui(gui).station(&station)).await?;
    let mut events = session.subscribe();

    if let Some(version) = session.firmware_version() {
        println!("Connected: firmware {version}, handle 0x{:08X}", session.client_handle().unwrap_or(0));
    }
    let info = session.model().radio().info();
    println!("Radio: {} {} \"{}\"", info.model, info.chassis_serial, info.nickname);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(RadioEvent::Disconnected { reason }) => {
                    println!("Disconnected: {reason:?}");
                    return Ok(());
                }
                Ok(event) => print_event(&event),
                Err(broadcast::error::RecvError::Lagged(n)) => println!("({n} events dropped)"),
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    session.disconnect().await?;
    Ok(())
}

fn print_event(event: &RadioEvent) {
    match event {
        RadioEvent::ConnectionStateChanged(state) => println!("state    {state:?}"),
        RadioEvent::ObjectAdded { kind, id } => println!("added    {kind} 0x{id:08X}"),
        RadioEvent::ObjectRemoved { kind, id } => println!("removed  {kind} 0x{id:08X}"),
        RadioEvent::PropertiesChanged { kind, id, properties } => match id {
            Some(id) => println!("changed  {kind} 0x{id:08X} {}", properties.join(",")),
            None => println!("changed  {kind} {}", properties.join(",")),
        },
        RadioEvent::ClientAdded { handle, program, station } => {
            println!("client+  0x{handle:08X} {program} @ {station}")
        }
        RadioEvent::ClientRemoved { handle } => println!("client-  0x{handle:08X}"),
        RadioEvent::Message { severity, text } => println!("message  {severity:?}: {text}"),
        RadioEvent::PacketsLost { stream_id, lost } => {
            println!("lost     0x{stream_id:08X} {lost} packets")
        }
        RadioEvent::DowngradeRequired { radio, supported } => {
            println!("version  radio {radio} is newer than supported {supported}")
        }
        RadioEvent::Disconnected { reason } => println!("disconnected {reason:?}"),
    }
}

async fn cmd_send(target: Target, command: Vec<String>) -> Result<()> {
    let session = connect(&target, |b| b).await?;
    let text = command.join(" ");
    let result = session.send_and_wait(&text).await;
    session.disconnect().await?;

    let reply = result.with_context(|| format!("command failed: {text}"))?;
    if reply.is_empty() {
        println!("OK");
    } else {
        println!("{reply}");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Command::Discover { seconds, watch } => cmd_discover(seconds, watch).await,
        Command::Monitor {
            target,
            gui,
            station,
        } => cmd_monitor(target, gui, station).await,
        Command::Send { target, command } => cmd_send(target, command).await,
    }
}
