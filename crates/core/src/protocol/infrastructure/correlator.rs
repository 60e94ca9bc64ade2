use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use crate::protocol::domain::envelope::{RequestId, Response};
use crate::proxy::proxy_error::ProxyError;

/// Matches responses to the requests that caused them.
///
/// Each registered request owns a one-shot slot keyed by its id. A response
/// fires the slot exactly once and removes it; responses for ids that are
/// not outstanding are reported to the caller and otherwise ignored.
pub struct Correlator {
    next_id: AtomicU64,
    pending: Mutex<HashMap<RequestId, Sender<Response>>>,
}

impl Correlator {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Allocates a fresh id and the slot its response will be delivered to.
    pub fn register(&self) -> PendingResponse {
        let id = RequestId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = crossbeam_channel::bounded(1);
        self.pending().insert(id, tx);
        PendingResponse { id, rx }
    }

    /// Delivers a response to its waiter. Returns `false` when no request
    /// with that id is outstanding.
    pub fn resolve(&self, response: Response) -> bool {
        let slot = self.pending().remove(&response.id);
        match slot {
            Some(tx) => {
                // The waiter may have given up; that is not an error here.
                let _ = tx.send(response);
                true
            }
            None => false,
        }
    }

    /// Forgets a request that never made it across the boundary.
    pub fn abandon(&self, id: RequestId) {
        self.pending().remove(&id);
    }

    /// Drops every outstanding slot so waiters observe a disconnect.
    /// Returns how many requests were still outstanding.
    pub fn fail_all(&self) -> usize {
        let mut pending = self.pending();
        let count = pending.len();
        pending.clear();
        count
    }

    pub fn outstanding(&self) -> usize {
        self.pending().len()
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<RequestId, Sender<Response>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle on a response that has not arrived yet.
#[derive(Debug)]
pub struct PendingResponse {
    id: RequestId,
    rx: Receiver<Response>,
}

impl PendingResponse {
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Blocks until the response arrives or the worker goes away.
    pub fn wait(self) -> Result<Response, ProxyError> {
        self.rx.recv().map_err(|_| ProxyError::Disconnected)
    }

    pub fn wait_timeout(self, timeout: Duration) -> Result<Response, ProxyError> {
        self.rx.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => ProxyError::Timeout(timeout),
            RecvTimeoutError::Disconnected => ProxyError::Disconnected,
        })
    }
}
