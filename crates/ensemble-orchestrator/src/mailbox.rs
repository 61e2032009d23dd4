use ensemble_core::PeerMessage;
use std::collections::BTreeMap;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::warn;

/// Messages buffered per agent before the oldest are refused.
pub const MAILBOX_CAPACITY: usize = 256;

struct Mailbox {
    tx: mpsc::Sender<PeerMessage>,
    rx: mpsc::Receiver<PeerMessage>,
}

/// Per-flow peer messaging. Each agent gets its own channel; broadcasts go
/// to everyone but the sender. Messages never leave the flow that owns
/// the mailboxes.
pub struct Mailboxes {
    boxes: BTreeMap<String, Mailbox>,
    capacity: usize,
}

impl Mailboxes {
    /// Mailboxes holding up to [`MAILBOX_CAPACITY`] messages each.
    pub fn new() -> Self {
        Self::with_capacity(MAILBOX_CAPACITY)
    }

    /// Mailboxes with a custom per-agent bound.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            boxes: BTreeMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Open a mailbox for `agent_id`. Registering twice keeps the first.
    pub fn register(&mut self, agent_id: &str) {
        let capacity = self.capacity;
        self.boxes.entry(agent_id.to_string()).or_insert_with(|| {
            let (tx, rx) = mpsc::channel(capacity);
            Mailbox { tx, rx }
        });
    }

    /// Deliver `message` to every agent except its sender. Returns how many
    /// mailboxes accepted it.
    pub fn broadcast(&self, message: &PeerMessage) -> usize {
        let mut delivered = 0;
        for (agent_id, mailbox) in &self.boxes {
            if *agent_id == message.sender {
                continue;
            }
            match mailbox.tx.try_send(message.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(agent_id = %agent_id, sender = %message.sender, "Mailbox full, message dropped");
                }
                Err(TrySendError::Closed(_)) => {
                    warn!(agent_id = %agent_id, "Mailbox closed");
                }
            }
        }
        delivered
    }

    /// Take everything waiting for `agent_id`, oldest first.
    pub fn drain(&mut self, agent_id: &str) -> Vec<PeerMessage> {
        let mut out = Vec::new();
        if let Some(mailbox) = self.boxes.get_mut(agent_id) {
            while let Ok(message) = mailbox.rx.try_recv() {
                out.push(message);
            }
        }
        out
    }

    /// Registered agents.
    pub fn agent_count(&self) -> usize {
        self.boxes.len()
    }
}

impl Default for Mailboxes {
    fn default() -> Self {
        Self::new()
    }
}
