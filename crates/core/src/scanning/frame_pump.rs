use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::capture::domain::frame_source::FrameSource;
use crate::protocol::domain::result_state::ResultState;
use crate::scanning::clock::Clock;
use crate::scanning::recognition_runner::RecognitionRunner;
use crate::scanning::scan_logger::ScanLogger;
use crate::scanning::scan_state::{RecognitionMode, ScanError, ScanState};
use crate::scanning::throttle::Throttle;
use crate::scanning::timeout_clock::TimeoutClock;

/// Longest the pump blocks on the frame-ready gate before re-checking flags.
pub const FRAME_READY_MAX_WAIT: Duration = Duration::from_millis(100);

#[derive(Debug)]
struct PumpFlags {
    state: ScanState,
    paused: bool,
    cancel: bool,
    clear_timeout: bool,
    mode: RecognitionMode,
    timeout_ms: u64,
}

/// Settings captured at the top of one tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TickSettings {
    pub mode: RecognitionMode,
    pub timeout_ms: u64,
    /// A clear-timeout notification arrived since the previous tick.
    pub clear_timeout: bool,
}

/// Flags shared between the pump thread and its controllers.
///
/// Every change notifies the condvar, so both a parked pump and callers of
/// [`PumpControl::wait_for_state`] wake up.
#[derive(Debug)]
pub struct PumpControl {
    flags: Mutex<PumpFlags>,
    changed: Condvar,
}

impl PumpControl {
    pub fn new(mode: RecognitionMode, timeout_ms: u64) -> Self {
        Self {
            flags: Mutex::new(PumpFlags {
                state: ScanState::Idle,
                paused: false,
                cancel: false,
                clear_timeout: false,
                mode,
                timeout_ms,
            }),
            changed: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PumpFlags> {
        self.flags.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update<R>(&self, f: impl FnOnce(&mut PumpFlags) -> R) -> R {
        let result = f(&mut self.lock());
        self.changed.notify_all();
        result
    }

    pub fn state(&self) -> ScanState {
        self.lock().state
    }

    /// Marks a scan as started. Fails unless the pump is idle.
    pub fn begin(&self) -> bool {
        self.update(|flags| {
            if flags.state != ScanState::Idle {
                return false;
            }
            flags.state = ScanState::Running;
            flags.paused = false;
            flags.cancel = false;
            flags.clear_timeout = false;
            true
        })
    }

    pub fn finish(&self) {
        self.update(|flags| {
            flags.state = ScanState::Idle;
            flags.paused = false;
            flags.cancel = false;
            flags.clear_timeout = false;
        });
    }

    /// Asks the pump to stop at its next safe point. Returns whether a scan
    /// was active.
    pub fn request_cancel(&self) -> bool {
        self.update(|flags| {
            if flags.state == ScanState::Idle {
                return false;
            }
            flags.cancel = true;
            flags.state = ScanState::Cancelling;
            true
        })
    }

    pub fn cancel_requested(&self) -> bool {
        self.lock().cancel
    }

    /// Sets the pause flag. The pump reports `Paused` once it parks at the
    /// top of its next tick.
    pub fn pause(&self) -> bool {
        self.update(|flags| {
            if flags.cancel || flags.state == ScanState::Idle {
                return false;
            }
            flags.paused = true;
            true
        })
    }

    pub fn is_paused(&self) -> bool {
        self.lock().paused
    }

    /// Clears the pause flag. Returns whether it was set.
    pub fn resume(&self) -> bool {
        self.update(|flags| {
            if !flags.paused {
                return false;
            }
            flags.paused = false;
            if flags.state == ScanState::Paused {
                flags.state = ScanState::Running;
            }
            true
        })
    }

    pub fn request_clear_timeout(&self) {
        self.update(|flags| flags.clear_timeout = true);
    }

    pub fn mode(&self) -> RecognitionMode {
        self.lock().mode
    }

    pub fn set_mode(&self, mode: RecognitionMode) {
        self.update(|flags| flags.mode = mode);
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.lock().timeout_ms)
    }

    pub fn set_timeout(&self, timeout: Duration) {
        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self.update(|flags| flags.timeout_ms = timeout_ms);
    }

    /// Blocks until the pump reaches `state` or `max_wait` elapses.
    pub fn wait_for_state(&self, state: ScanState, max_wait: Duration) -> bool {
        let guard = self.lock();
        let (guard, _) = self
            .changed
            .wait_timeout_while(guard, max_wait, |flags| flags.state != state)
            .unwrap_or_else(PoisonError::into_inner);
        guard.state == state
    }

    /// Top-of-tick gate: parks while paused, returns `None` once a
    /// cancellation is pending.
    pub fn wait_runnable(&self) -> Option<TickSettings> {
        let mut flags = self.lock();
        loop {
            if flags.cancel {
                return None;
            }
            if !flags.paused {
                break;
            }
            if flags.state != ScanState::Paused {
                flags.state = ScanState::Paused;
                self.changed.notify_all();
            }
            flags = self
                .changed
                .wait(flags)
                .unwrap_or_else(PoisonError::into_inner);
        }
        flags.state = ScanState::Running;
        let clear_timeout = std::mem::take(&mut flags.clear_timeout);
        Some(TickSettings {
            mode: flags.mode,
            timeout_ms: flags.timeout_ms,
            clear_timeout,
        })
    }
}

/// How a pump run ended.
#[derive(Debug)]
pub enum PumpExit {
    /// The scan finished; the done callback receives this outcome.
    Completed(Result<ResultState, ScanError>),
    /// The scan was cancelled; the done callback must not run.
    Cancelled,
}

/// Everything one pump run borrows.
pub struct PumpContext<'a> {
    pub source: &'a mut dyn FrameSource,
    pub runner: &'a dyn RecognitionRunner,
    pub control: &'a PumpControl,
    pub clock: &'a dyn Clock,
    pub throttle: Throttle,
    pub logger: &'a mut dyn ScanLogger,
}

/// Runs the capture, submit and interpret loop until the scan completes or
/// is cancelled.
///
/// Exactly one frame is in flight at a time: `process_image` returns before
/// the next capture starts, and the throttle spaces consecutive captures.
pub fn run_pump(ctx: PumpContext<'_>) -> PumpExit {
    let PumpContext {
        source,
        runner,
        control,
        clock,
        mut throttle,
        logger,
    } = ctx;
    let mut timeout = TimeoutClock::default();
    let mut tick: u64 = 0;

    loop {
        let Some(settings) = control.wait_runnable() else {
            timeout.stop();
            if let Err(e) = runner.reset(true) {
                log::warn!("Hard reset after cancellation failed: {e}");
            }
            log::debug!("Frame pump cancelled after {tick} ticks");
            return PumpExit::Cancelled;
        };
        if settings.clear_timeout {
            timeout.stop();
        }

        throttle.wait(clock);
        if control.cancel_requested() {
            continue;
        }
        if !source.wait_frame_ready(FRAME_READY_MAX_WAIT) {
            continue;
        }

        let started = Instant::now();
        let frame = match source.acquire() {
            Ok(frame) => frame,
            Err(_) if control.cancel_requested() => continue,
            Err(e) => {
                log::error!("Frame capture failed: {e}");
                return PumpExit::Completed(Err(e.into()));
            }
        };
        logger.timing("acquire", elapsed_ms(started));
        logger.metric("frame_bytes", frame.byte_len() as f64);

        tick += 1;
        let started = Instant::now();
        let state = match runner.process_image(frame) {
            Ok(state) => state,
            Err(_) if control.cancel_requested() => continue,
            Err(e) => {
                log::error!("Frame submission failed: {e}");
                return PumpExit::Completed(Err(e.into()));
            }
        };
        logger.timing("process_image", elapsed_ms(started));
        logger.tick(tick, state);

        // A result that lands after cancellation is discarded.
        if control.cancel_requested() {
            continue;
        }

        if settings.mode.is_test() {
            if let Err(e) = runner.reset(true) {
                return PumpExit::Completed(Err(e.into()));
            }
            continue;
        }

        match state {
            ResultState::Valid => {
                timeout.stop();
                return PumpExit::Completed(Ok(ResultState::Valid));
            }
            ResultState::Uncertain => {
                let now = clock.now_ms();
                timeout.start_if_idle(now);
                if timeout.elapsed(now) >= settings.timeout_ms {
                    timeout.stop();
                    log::info!("Recognition timed out after {} ms", settings.timeout_ms);
                    return PumpExit::Completed(Ok(ResultState::Uncertain));
                }
            }
            ResultState::StageValid | ResultState::Empty => timeout.stop(),
        }
    }
}

fn elapsed_ms(since: Instant) -> f64 {
    since.elapsed().as_secs_f64() * 1000.0
}
