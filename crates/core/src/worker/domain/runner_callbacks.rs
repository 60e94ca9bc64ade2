use crossbeam_channel::Sender;

use crate::protocol::domain::envelope::WorkerMessage;
use crate::protocol::domain::event::{CallbackFlags, WorkerEvent};

/// Posts fire-and-forget events onto the worker's outgoing channel.
#[derive(Clone)]
pub struct EventEmitter {
    tx: Sender<WorkerMessage>,
}

impl EventEmitter {
    pub fn new(tx: Sender<WorkerMessage>) -> Self {
        Self { tx }
    }

    pub fn post(&self, event: WorkerEvent) {
        // Nobody is listening once the control side is gone; nothing to do.
        let _ = self.tx.send(WorkerMessage::Event(event));
    }
}

/// Event handlers installed on the engine runner.
///
/// The engine reports everything it observes through [`RunnerCallbacks::emit`];
/// only kinds the control context subscribed to leave the worker.
#[derive(Clone)]
pub struct RunnerCallbacks {
    emitter: Option<EventEmitter>,
    flags: CallbackFlags,
    clear_timeout: bool,
}

impl RunnerCallbacks {
    pub fn new(emitter: EventEmitter, flags: CallbackFlags, clear_timeout: bool) -> Self {
        Self {
            emitter: Some(emitter),
            flags,
            clear_timeout,
        }
    }

    /// Callbacks that swallow every event.
    pub fn none() -> Self {
        Self {
            emitter: None,
            flags: CallbackFlags::default(),
            clear_timeout: false,
        }
    }

    pub fn flags(&self) -> CallbackFlags {
        self.flags
    }

    pub fn has_clear_timeout(&self) -> bool {
        self.clear_timeout
    }

    pub fn wants(&self, event: &WorkerEvent) -> bool {
        if self.emitter.is_none() {
            return false;
        }
        match event {
            WorkerEvent::ClearTimeout => self.clear_timeout,
            other => self.flags.allows(other),
        }
    }

    /// Returns whether the event was posted.
    pub fn emit(&self, event: WorkerEvent) -> bool {
        if !self.wants(&event) {
            return false;
        }
        match &self.emitter {
            Some(emitter) => {
                emitter.post(event);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn callbacks(flags: CallbackFlags, clear_timeout: bool) -> (RunnerCallbacks, crossbeam_channel::Receiver<WorkerMessage>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (RunnerCallbacks::new(EventEmitter::new(tx), flags, clear_timeout), rx)
    }

    #[test]
    fn test_unsubscribed_events_stay_in_worker() {
        let (cb, rx) = callbacks(CallbackFlags::default(), false);
        assert!(!cb.emit(WorkerEvent::DetectionFailed));
        assert!(!cb.emit(WorkerEvent::ClearTimeout));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_subscribed_events_are_posted_as_events() {
        let flags = CallbackFlags {
            detection_failed: true,
            ..Default::default()
        };
        let (cb, rx) = callbacks(flags, true);
        assert!(cb.emit(WorkerEvent::DetectionFailed));
        assert!(cb.emit(WorkerEvent::ClearTimeout));

        assert!(matches!(
            rx.try_recv(),
            Ok(WorkerMessage::Event(WorkerEvent::DetectionFailed))
        ));
        assert!(matches!(
            rx.try_recv(),
            Ok(WorkerMessage::Event(WorkerEvent::ClearTimeout))
        ));
    }

    #[test]
    fn test_none_swallows_everything() {
        let cb = RunnerCallbacks::none();
        assert!(!cb.emit(WorkerEvent::GlareDetected(true)));
        assert!(!cb.has_clear_timeout());
    }

    #[test]
    fn test_emit_after_control_side_hangs_up_is_harmless() {
        let (cb, rx) = callbacks(CallbackFlags::all(), false);
        drop(rx);
        assert!(cb.emit(WorkerEvent::FirstSideResult));
    }
}
