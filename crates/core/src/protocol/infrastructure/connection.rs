use std::sync::Arc;
use std::thread::{self, ThreadId};

use crossbeam_channel::{Receiver, Sender};

use crate::protocol::domain::envelope::{Payload, Request, RequestKind, WorkerMessage};
use crate::protocol::infrastructure::correlator::{Correlator, PendingResponse};
use crate::protocol::infrastructure::event_router::EventRouter;
use crate::proxy::proxy_error::ProxyError;
use crate::shared::constants::DEMUX_THREAD_NAME;

/// Control-side end of one control/worker pairing.
///
/// Owns the request channel, the correlator and the event router. A
/// demultiplexer thread drains the worker's outgoing channel: events go to
/// the router, responses to the correlator. When the worker hangs up, every
/// outstanding request resolves to [`ProxyError::Disconnected`].
///
/// Event handlers run on the demultiplexer thread, which is also the only
/// thread that can deliver responses. A blocking [`call`](Self::call) made
/// from a handler is refused with [`ProxyError::CalledFromEventHandler`].
pub struct WorkerConnection {
    requests: Sender<Request>,
    correlator: Arc<Correlator>,
    events: Arc<EventRouter>,
    demux: ThreadId,
}

impl WorkerConnection {
    pub fn spawn(
        requests: Sender<Request>,
        messages: Receiver<WorkerMessage>,
    ) -> std::io::Result<Self> {
        let correlator = Arc::new(Correlator::new());
        let events = Arc::new(EventRouter::new());

        let demux_correlator = correlator.clone();
        let demux_events = events.clone();
        let demux = thread::Builder::new()
            .name(DEMUX_THREAD_NAME.into())
            .spawn(move || run_demux(messages, &demux_correlator, &demux_events))?;

        Ok(Self {
            requests,
            correlator,
            events,
            demux: demux.thread().id(),
        })
    }

    /// Stamps `kind` with a fresh id and hands it to the worker.
    pub fn send(&self, kind: RequestKind) -> Result<PendingResponse, ProxyError> {
        let pending = self.correlator.register();
        let id = pending.id();
        let name = kind.name();
        let moved = kind.transferable_bytes();
        if moved > 0 {
            log::trace!("request {id} ({name}) moves {moved} bytes");
        } else {
            log::trace!("request {id} ({name})");
        }

        if self.requests.send(Request { id, kind }).is_err() {
            self.correlator.abandon(id);
            return Err(ProxyError::Disconnected);
        }
        Ok(pending)
    }

    /// Sends `kind` and blocks until its response arrives.
    pub fn call(&self, kind: RequestKind) -> Result<Payload, ProxyError> {
        if thread::current().id() == self.demux {
            log::warn!("refusing blocking {} from an event handler", kind.name());
            return Err(ProxyError::CalledFromEventHandler);
        }
        let response = self.send(kind)?.wait()?;
        response.outcome.map_err(ProxyError::from)
    }

    pub fn events(&self) -> &EventRouter {
        &self.events
    }

    pub fn outstanding(&self) -> usize {
        self.correlator.outstanding()
    }
}

fn run_demux(messages: Receiver<WorkerMessage>, correlator: &Correlator, events: &EventRouter) {
    for message in messages {
        match message {
            WorkerMessage::Event(event) => {
                let name = event.name();
                if !events.dispatch(event) {
                    log::debug!("no handler for worker event {name}");
                }
            }
            WorkerMessage::Response(response) => {
                let id = response.id;
                if !correlator.resolve(response) {
                    log::warn!("dropping response {id}: no matching outstanding request");
                }
            }
        }
    }

    let abandoned = correlator.fail_all();
    if abandoned > 0 {
        log::warn!("worker disconnected with {abandoned} request(s) outstanding");
    } else {
        log::debug!("worker disconnected");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::domain::envelope::Response;
    use crate::protocol::domain::error::RemoteError;
    use crate::protocol::domain::event::WorkerEvent;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Echo worker answering every request with `Unit`, optionally posting an
    /// event before each response.
    fn spawn_echo(event_first: bool) -> WorkerConnection {
        let (req_tx, req_rx) = crossbeam_channel::unbounded::<Request>();
        let (msg_tx, msg_rx) = crossbeam_channel::unbounded::<WorkerMessage>();
        thread::spawn(move || {
            for request in req_rx {
                if event_first {
                    let _ = msg_tx.send(WorkerMessage::Event(WorkerEvent::ClearTimeout));
                }
                let outcome = match request.kind {
                    RequestKind::DeleteRunner => Err(RemoteError::runner_missing()),
                    _ => Ok(Payload::Unit),
                };
                let _ = msg_tx.send(WorkerMessage::Response(Response {
                    id: request.id,
                    outcome,
                }));
            }
        });
        WorkerConnection::spawn(req_tx, msg_rx).unwrap()
    }

    #[test]
    fn test_call_returns_payload() {
        let conn = spawn_echo(false);
        let payload = conn.call(RequestKind::SetDetectionOnly(true)).unwrap();
        assert_eq!(payload, Payload::Unit);
        assert_eq!(conn.outstanding(), 0);
    }

    #[test]
    fn test_failure_outcome_becomes_remote_error() {
        let conn = spawn_echo(false);
        let err = conn.call(RequestKind::DeleteRunner).unwrap_err();
        assert_eq!(err, ProxyError::Remote(RemoteError::runner_missing()));
    }

    #[test]
    fn test_events_bypass_correlation() {
        let conn = spawn_echo(true);
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        conn.events().set_clear_timeout(Some(Arc::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        })));

        conn.call(RequestKind::SetDetectionOnly(false)).unwrap();
        conn.call(RequestKind::SetDetectionOnly(true)).unwrap();

        // Events precede their responses on the same channel.
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_blocking_call_from_event_handler_is_refused() {
        let conn = Arc::new(spawn_echo(true));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let handler_conn = Arc::downgrade(&conn);
        let handler_seen = seen.clone();
        conn.events().set_clear_timeout(Some(Arc::new(move || {
            if let Some(conn) = handler_conn.upgrade() {
                let outcome = conn.call(RequestKind::ResetRecognizers { hard_reset: true });
                handler_seen.lock().unwrap().push(outcome);
            }
        })));

        conn.call(RequestKind::SetDetectionOnly(true)).unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![Err(ProxyError::CalledFromEventHandler)]
        );
        assert_eq!(conn.outstanding(), 0);
    }

    #[test]
    fn test_responses_match_request_ids() {
        let conn = spawn_echo(false);
        let pending: Vec<_> = (0..10)
            .map(|_| conn.send(RequestKind::ResetRecognizers { hard_reset: false }).unwrap())
            .collect();
        for p in pending {
            let id = p.id();
            assert_eq!(p.wait().unwrap().id, id);
        }
    }

    #[test]
    fn test_worker_hangup_disconnects_outstanding_calls() {
        let (req_tx, req_rx) = crossbeam_channel::unbounded::<Request>();
        let (msg_tx, msg_rx) = crossbeam_channel::unbounded::<WorkerMessage>();
        let conn = WorkerConnection::spawn(req_tx, msg_rx).unwrap();

        let pending = conn.send(RequestKind::DeleteRunner).unwrap();
        // Worker receives the request and dies without answering.
        let _ = req_rx.recv_timeout(Duration::from_secs(1)).unwrap();
        drop(msg_tx);

        assert!(matches!(pending.wait(), Err(ProxyError::Disconnected)));
    }

    #[test]
    fn test_send_after_worker_exit_fails_fast() {
        let (req_tx, req_rx) = crossbeam_channel::unbounded::<Request>();
        let (_msg_tx, msg_rx) = crossbeam_channel::unbounded::<WorkerMessage>();
        let conn = WorkerConnection::spawn(req_tx, msg_rx).unwrap();
        drop(req_rx);

        let err = conn.send(RequestKind::DeleteRunner).unwrap_err();
        assert_eq!(err, ProxyError::Disconnected);
        assert_eq!(conn.outstanding(), 0);
    }
}
