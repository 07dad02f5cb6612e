use std::collections::HashMap;

use tokio::sync::oneshot;

use crate::protocol::Packet;
use crate::utils::error::ClientError;

type PendingResponse = oneshot::Sender<Result<Packet, ClientError>>;

/// Matches correlated responses to their callers.
///
/// Every request that expects a server acknowledgement is assigned the next
/// unused id; the response carrying that id fulfils the pending operation
/// exactly once. Responses for unknown ids are ignored.
#[derive(Default)]
pub struct Correlator {
    next_id: u64,
    pending: HashMap<u64, PendingResponse>,
}

impl Correlator {
    /// Issues a fresh request id and registers a pending operation for it.
    pub fn add(&mut self) -> (u64, oneshot::Receiver<Result<Packet, ClientError>>) {
        let id = self.next_id;
        self.next_id += 1;
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);
        (id, rx)
    }

    pub fn resolve(&mut self, id: u64, packet: Packet) {
        if let Some(pending) = self.pending.remove(&id) {
            let _ = pending.send(Ok(packet));
        }
    }

    pub fn reject(&mut self, id: u64, error: ClientError) {
        if let Some(pending) = self.pending.remove(&id) {
            let _ = pending.send(Err(error));
        }
    }

    /// Drops a pending operation whose request never made it onto the wire.
    pub fn forget(&mut self, id: u64) {
        self.pending.remove(&id);
    }

    /// Rejects everything still pending. Called on connection teardown so
    /// no caller is left waiting for a response that cannot arrive.
    pub fn reject_all(&mut self) {
        for (_, pending) in self.pending.drain() {
            let _ = pending.send(Err(ClientError::Disconnected));
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}
