//! Mock SmartSDR radio for session-level testing.
//!
//! [`MockRadio`] listens on a random localhost port, accepts one client,
//! sends the version and handle lines, then answers every `C<seq>|cmd` line
//! with a scripted `R<seq>|code|data` reply. Tests can push status or
//! message lines at any time and drop the connection to simulate the radio
//! going away.
//!
//! # Example
//!
//! ```no_run
//! use flexlib_test_harness::{MockRadio, MockRadioConfig};
//!
//! # async fn example() -> flexlib_core::Result<()> {
//! let radio = MockRadio::start(
//!     MockRadioConfig::new().reply("client ip", "127.0.0.1"),
//! )
//! .await?;
//! radio.push_status("slice 0 in_use=1 RF_frequency=14.074000");
//! # Ok(())
//! # }
//! ```

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use flexlib_core::error::{Error, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;

/// Scripted reply for commands starting with `prefix`.
#[derive(Debug, Clone)]
struct ScriptedReply {
    prefix: String,
    /// `None` means the command is swallowed without a reply.
    reply: Option<(u32, String)>,
}

/// How the mock radio greets clients and answers commands.
#[derive(Debug, Clone)]
pub struct MockRadioConfig {
    version: String,
    handle: u32,
    replies: Vec<ScriptedReply>,
}

impl Default for MockRadioConfig {
    fn default() -> Self {
        Self {
            version: "1.4.0.0".to_string(),
            handle: 0x1234_5678,
            replies: vec![
                ScriptedReply {
                    prefix: "version".to_string(),
                    reply: Some((0, "SmartSDR-MB=3.5.1.0#PSoC-MBTRX=3.5.0.0".to_string())),
                },
                ScriptedReply {
                    prefix: "client ip".to_string(),
                    reply: Some((0, "127.0.0.1".to_string())),
                },
            ],
        }
    }
}

impl MockRadioConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Version sent in the `V` handshake line.
    pub fn version(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self
    }

    /// Client handle sent in the `H` handshake line.
    pub fn handle(mut self, handle: u32) -> Self {
        self.handle = handle;
        self
    }

    /// Answer commands starting with `prefix` with code 0 and `data`.
    /// Later scripts for the same prefix take precedence.
    pub fn reply(self, prefix: &str, data: &str) -> Self {
        self.script(prefix, Some((0, data.to_string())))
    }

    /// Answer commands starting with `prefix` with a non-zero code.
    pub fn fail(self, prefix: &str, code: u32, data: &str) -> Self {
        self.script(prefix, Some((code, data.to_string())))
    }

    /// Never answer commands starting with `prefix`.
    pub fn silent(self, prefix: &str) -> Self {
        self.script(prefix, None)
    }

    fn script(mut self, prefix: &str, reply: Option<(u32, String)>) -> Self {
        self.replies.insert(
            0,
            ScriptedReply {
                prefix: prefix.to_string(),
                reply,
            },
        );
        self
    }

    fn reply_for(&self, command: &str) -> Option<(u32, String)> {
        match self.replies.iter().find(|s| command.starts_with(&s.prefix)) {
            Some(script) => script.reply.clone(),
            None => Some((0, String::new())),
        }
    }
}

#[derive(Debug)]
enum Control {
    Line(String),
    Close,
}

/// A running mock radio.
pub struct MockRadio {
    addr: SocketAddr,
    handle: u32,
    commands: Arc<Mutex<Vec<String>>>,
    received: Arc<Notify>,
    control: mpsc::UnboundedSender<Control>,
    task: JoinHandle<()>,
}

impl MockRadio {
    /// Bind to `127.0.0.1:0` and start serving one client.
    pub async fn start(config: MockRadioConfig) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| Error::Transport(format!("failed to bind mock radio: {e}")))?;
        let addr = listener.local_addr().map_err(Error::Io)?;

        let commands = Arc::new(Mutex::new(Vec::new()));
        let received = Arc::new(Notify::new());
        let (control, control_rx) = mpsc::unbounded_channel();
        let handle = config.handle;

        let task = tokio::spawn(serve(
            listener,
            config,
            Arc::clone(&commands),
            Arc::clone(&received),
            control_rx,
        ));

        Ok(Self {
            addr,
            handle,
            commands,
            received,
            control,
            task,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Commands received so far, without their `C<seq>|` prefix.
    pub fn commands(&self) -> Vec<String> {
        self.commands
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    /// Wait until a command starting with `prefix` has been received.
    pub async fn wait_for_command(&self, prefix: &str, timeout: Duration) -> Option<String> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.received.notified();
            if let Some(found) = self.commands().into_iter().find(|c| c.starts_with(prefix)) {
                return Some(found);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return None;
            }
        }
    }

    /// Send `S<handle>|<payload>` to the client.
    pub fn push_status(&self, payload: &str) {
        self.push_line(&format!("S{:08X}|{payload}", self.handle));
    }

    /// Send `M<number>|<text>` to the client.
    pub fn push_message(&self, number: u32, text: &str) {
        self.push_line(&format!("M{number:08X}|{text}"));
    }

    /// Send a raw line (a newline is appended).
    pub fn push_line(&self, line: &str) {
        let _ = self.control.send(Control::Line(line.to_string()));
    }

    /// Drop the client connection.
    pub fn close(&self) {
        let _ = self.control.send(Control::Close);
    }
}

impl Drop for MockRadio {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(
    listener: TcpListener,
    config: MockRadioConfig,
    commands: Arc<Mutex<Vec<String>>>,
    received: Arc<Notify>,
    mut control: mpsc::UnboundedReceiver<Control>,
) {
    let Ok((stream, peer)) = listener.accept().await else {
        return;
    };
    tracing::debug!(peer = %peer, "Mock radio accepted client");

    let (read_half, mut write_half) = stream.into_split();
    let greeting = format!("V{}\nH{:08X}\n", config.version, config.handle);
    if write_half.write_all(greeting.as_bytes()).await.is_err() {
        return;
    }

    let mut reader = BufReader::new(read_half);
    let mut line = String::new();
    loop {
        line.clear();
        tokio::select! {
            read = reader.read_line(&mut line) => {
                match read {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {}
                }
                let Some((seq, command)) = split_command(line.trim_end()) else {
                    continue;
                };
                if let Ok(mut list) = commands.lock() {
                    list.push(command.to_string());
                }
                received.notify_waiters();

                if let Some((code, data)) = config.reply_for(command) {
                    let reply = format!("R{seq}|{code:08X}|{data}\n");
                    if write_half.write_all(reply.as_bytes()).await.is_err() {
                        break;
                    }
                }
            }
            msg = control.recv() => match msg {
                Some(Control::Line(text)) => {
                    if write_half.write_all(format!("{text}\n").as_bytes()).await.is_err() {
                        break;
                    }
                }
                Some(Control::Close) | None => break,
            },
        }
    }
    let _ = write_half.shutdown().await;
    tracing::debug!("Mock radio closed connection");
}

/// Split `C<seq>|command` into its parts.
fn split_command(line: &str) -> Option<(u32, &str)> {
    let rest = line.strip_prefix('C')?;
    let (seq, command) = rest.split_once('|')?;
    Some((seq.parse().ok()?, command))
}
