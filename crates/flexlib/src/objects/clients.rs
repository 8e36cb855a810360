//! GUI clients connected to the radio.
//!
//! ```text
//! client 0x1A2B3C4D connected client_id=6E8E... program=SmartSDR-Win station=Shack\x7fPC local_ptt=1
//! client 0x1A2B3C4D disconnected forced=0
//! ```
//!
//! The table decides which client-owned objects this session mirrors: a
//! status naming a `client_handle` is only acted on when that handle is
//! ours or belongs to a known client.

use std::collections::HashMap;

use flexlib_core::Guarded;

use crate::keyvalue::coerce;
use crate::tokens::ClientToken;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GuiClient {
    pub handle: u32,
    pub client_id: String,
    pub program: String,
    pub station: String,
    pub local_ptt: bool,
}

/// What one `client` status did to the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientChange {
    Added(GuiClient),
    Updated(GuiClient),
    Removed(u32),
}

#[derive(Debug, Default)]
pub struct ClientTable {
    clients: Guarded<HashMap<u32, GuiClient>>,
}

impl ClientTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, handle: u32) -> Option<GuiClient> {
        self.clients.read(|c| c.get(&handle).cloned())
    }

    pub fn contains(&self, handle: u32) -> bool {
        self.clients.read(|c| c.contains_key(&handle))
    }

    /// All known clients, ordered by handle.
    pub fn all(&self) -> Vec<GuiClient> {
        let mut list: Vec<GuiClient> = self.clients.read(|c| c.values().cloned().collect());
        list.sort_by_key(|c| c.handle);
        list
    }

    /// Handle of the client with this persistent id.
    pub fn handle_for_client_id(&self, client_id: &str) -> Option<u32> {
        self.clients.read(|c| {
            c.values()
                .find(|gui| gui.client_id.eq_ignore_ascii_case(client_id))
                .map(|gui| gui.handle)
        })
    }

    /// Apply the pairs that follow the `client` discriminator.
    pub fn apply(&self, properties: &[(String, String)]) -> Option<ClientChange> {
        let [(handle, _), (verb, _), rest @ ..] = properties else {
            tracing::debug!(pairs = properties.len(), "Malformed client status");
            return None;
        };
        let Some(handle) = coerce::hex_u32(handle) else {
            tracing::debug!(handle = %handle, "Client status with bad handle");
            return None;
        };

        match verb.as_str() {
            "connected" => Some(self.connected(handle, rest)),
            "disconnected" => self
                .clients
                .write(|c| c.remove(&handle))
                .map(|_| ClientChange::Removed(handle)),
            other => {
                tracing::debug!(verb = %other, "Unknown client status");
                None
            }
        }
    }

    fn connected(&self, handle: u32, properties: &[(String, String)]) -> ClientChange {
        self.clients.write(|c| {
            let existed = c.contains_key(&handle);
            let entry = c.entry(handle).or_insert_with(|| GuiClient {
                handle,
                ..GuiClient::default()
            });
            for (key, value) in properties {
                match ClientToken::from_wire(key) {
                    Some(ClientToken::ClientId) => entry.client_id = value.clone(),
                    Some(ClientToken::Program) => entry.program = value.trim().to_string(),
                    Some(ClientToken::Station) => {
                        entry.station = value.replace('\u{7f}', " ").trim().to_string()
                    }
                    Some(ClientToken::LocalPtt) => entry.local_ptt = coerce::bool(value),
                    None => tracing::trace!(key = %key, "Unknown client key"),
                }
            }
            if existed {
                ClientChange::Updated(entry.clone())
            } else {
                ClientChange::Added(entry.clone())
            }
        })
    }

    /// Forget every client, returning their handles.
    pub fn clear(&self) -> Vec<u32> {
        self.clients.write(|c| c.drain().map(|(h, _)| h).collect())
    }
}
