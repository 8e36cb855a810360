//! Outbound command bookkeeping.
//!
//! Every command gets the next sequence number. The [`CommandTable`]
//! remembers the command text and how its reply should be handled until the
//! matching `R<seq>|...` line arrives; the entry is consumed on delivery.
//! Commands sent without a handler are not tracked, so a radio that never
//! answers them cannot grow the table. Unanswered commands are never
//! retried.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};

use tokio::sync::oneshot;

use crate::codec::SmartSdrResponse;

/// Callback run once with a command's reply.
pub type ReplyCallback = Box<dyn FnOnce(&SmartSdrResponse) + Send + 'static>;

/// What to do with a reply.
pub enum ReplyHandler {
    /// Run a callback on the session's TCP task.
    Callback(ReplyCallback),
    /// Hand the reply to a waiting caller.
    Waiter(oneshot::Sender<SmartSdrResponse>),
}

impl std::fmt::Debug for ReplyHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReplyHandler::Callback(_) => f.write_str("Callback"),
            ReplyHandler::Waiter(_) => f.write_str("Waiter"),
        }
    }
}

#[derive(Debug)]
struct PendingCommand {
    command: String,
    handler: ReplyHandler,
}

/// Pending commands by sequence number.
///
/// Handlers are `Send` but not `Sync`, so the table sits behind a `Mutex`
/// rather than a read/write lock.
#[derive(Debug)]
pub struct CommandTable {
    next_seq: AtomicU32,
    pending: Mutex<HashMap<u32, PendingCommand>>,
}

impl Default for CommandTable {
    fn default() -> Self {
        Self {
            next_seq: AtomicU32::new(1),
            pending: Mutex::new(HashMap::new()),
        }
    }
}

impl CommandTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<u32, PendingCommand>> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Allocate the next sequence number. Numbers start at 1 and skip 0
    /// on wraparound.
    pub fn next_sequence(&self) -> u32 {
        loop {
            let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
            if seq != 0 {
                return seq;
            }
        }
    }

    /// Record a command sent under `seq` whose reply goes to `handler`.
    pub fn register(&self, seq: u32, command: &str, handler: ReplyHandler) {
        self.pending().insert(
            seq,
            PendingCommand {
                command: command.to_string(),
                handler,
            },
        );
    }

    /// Forget `seq` without delivering anything (e.g. the send failed or
    /// the caller gave up waiting).
    pub fn cancel(&self, seq: u32) -> bool {
        self.pending().remove(&seq).is_some()
    }

    /// Deliver a reply to whoever registered its sequence number. Returns
    /// `false` for replies nobody is waiting for.
    pub fn complete(&self, response: SmartSdrResponse) -> bool {
        let removed = self.pending().remove(&response.sequence);
        let Some(entry) = removed else {
            if response.error_code != 0 {
                tracing::debug!(
                    seq = response.sequence,
                    code = format!("0x{:08X}", response.error_code),
                    message = %response.message,
                    "Untracked command failed"
                );
            } else {
                tracing::trace!(seq = response.sequence, "Reply for untracked sequence");
            }
            return false;
        };

        if response.error_code != 0 {
            tracing::debug!(
                seq = response.sequence,
                command = %entry.command,
                code = format!("0x{:08X}", response.error_code),
                message = %response.message,
                "Command failed"
            );
        }

        // The table lock is released before the handler runs.
        match entry.handler {
            ReplyHandler::Callback(callback) => callback(&response),
            ReplyHandler::Waiter(tx) => {
                let _ = tx.send(response);
            }
        }
        true
    }

    /// The text of a command still awaiting its reply.
    pub fn command(&self, seq: u32) -> Option<String> {
        self.pending().get(&seq).map(|c| c.command.clone())
    }

    /// Drop every pending entry. Waiters see their channel close.
    pub fn clear(&self) -> usize {
        let drained: Vec<PendingCommand> = self.pending().drain().map(|(_, c)| c).collect();
        drained.len()
    }

    pub fn len(&self) -> usize {
        self.pending().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    fn reply(seq: u32, code: u32, message: &str) -> SmartSdrResponse {
        SmartSdrResponse {
            sequence: seq,
            error_code: code,
            message: message.to_string(),
        }
    }

    #[test]
    fn sequences_start_at_one() {
        let table = CommandTable::new();
        assert_eq!(table.next_sequence(), 1);
        assert_eq!(table.next_sequence(), 2);
    }

    #[test]
    fn sequence_skips_zero_on_wrap() {
        let table = CommandTable::new();
        table.next_seq.store(u32::MAX, Ordering::Relaxed);
        assert_eq!(table.next_sequence(), u32::MAX);
        assert_eq!(table.next_sequence(), 1);
    }

    #[test]
    fn callback_runs_once() {
        let table = CommandTable::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        table.register(
            7,
            "client ip",
            ReplyHandler::Callback(Box::new(move |r| {
                assert_eq!(r.message, "10.0.0.5");
                seen.fetch_add(1, Ordering::SeqCst);
            })),
        );
        assert_eq!(table.command(7).as_deref(), Some("client ip"));

        assert!(table.complete(reply(7, 0, "10.0.0.5")));
        assert!(!table.complete(reply(7, 0, "10.0.0.5")));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn waiter_receives_reply() {
        let table = CommandTable::new();
        let (tx, rx) = oneshot::channel();
        table.register(3, "info", ReplyHandler::Waiter(tx));
        table.complete(reply(3, 0x5000_0015, "Invalid"));
        let r = rx.await.expect("reply delivered");
        assert_eq!(r.error_code, 0x5000_0015);
    }

    #[tokio::test]
    async fn clear_closes_waiters() {
        let table = CommandTable::new();
        let (tx1, rx1) = oneshot::channel();
        let (tx2, rx2) = oneshot::channel();
        table.register(1, "client ip", ReplyHandler::Waiter(tx1));
        table.register(2, "version", ReplyHandler::Waiter(tx2));
        assert_eq!(table.clear(), 2);
        assert!(rx1.await.is_err());
        assert!(rx2.await.is_err());
    }

    #[test]
    fn untracked_replies_ignored() {
        let table = CommandTable::new();
        assert!(!table.complete(reply(9, 0, "")));
        assert!(!table.complete(reply(10, 0x5000_0015, "Invalid")));
        assert!(table.is_empty());
        assert!(!table.cancel(9));
    }
}
