use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::capture::domain::frame_source::FrameSource;
use crate::protocol::domain::result_state::ResultState;
use crate::proxy::proxy_error::ProxyError;
use crate::scanning::clock::{Clock, SystemClock};
use crate::scanning::frame_pump::{run_pump, PumpContext, PumpControl, PumpExit};
use crate::scanning::recognition_runner::RecognitionRunner;
use crate::scanning::scan_logger::{NullScanLogger, ScanLogger};
use crate::scanning::scan_state::{RecognitionMode, ScanConfig, ScanError, ScanState};
use crate::scanning::throttle::Throttle;
use crate::shared::constants::PUMP_THREAD_NAME;

/// Collaborators the pump thread owns while a scan runs and hands back when
/// it exits.
struct PumpParts {
    source: Box<dyn FrameSource>,
    logger: Box<dyn ScanLogger>,
}

/// Drives recognition of a live frame source against one runner.
///
/// Each scan runs on its own pump thread. The outcome is delivered to the
/// done callback given to [`VideoRecognizer::start_recognition`]; a
/// cancelled scan never invokes it.
pub struct VideoRecognizer {
    runner: Arc<dyn RecognitionRunner>,
    control: Arc<PumpControl>,
    clock: Arc<dyn Clock>,
    target_fps: f64,
    parts: Option<PumpParts>,
    pump: Option<JoinHandle<PumpParts>>,
}

impl VideoRecognizer {
    pub fn new(
        source: Box<dyn FrameSource>,
        runner: Arc<dyn RecognitionRunner>,
        config: ScanConfig,
    ) -> Result<Self, ScanError> {
        runner.set_camera_preview_mirrored(source.is_mirrored())?;
        if config.mode == RecognitionMode::DetectionTest {
            runner.set_detection_only(true)?;
        }
        Ok(Self {
            runner,
            control: Arc::new(PumpControl::new(config.mode, config.timeout_ms)),
            clock: Arc::new(SystemClock::new()),
            target_fps: config.target_fps,
            parts: Some(PumpParts {
                source,
                logger: Box::new(NullScanLogger),
            }),
            pump: None,
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_logger(mut self, logger: Box<dyn ScanLogger>) -> Self {
        if let Some(parts) = self.parts.as_mut() {
            parts.logger = logger;
        }
        self
    }

    pub fn state(&self) -> ScanState {
        self.control.state()
    }

    pub fn controller(&self) -> ScanController {
        ScanController {
            control: self.control.clone(),
            runner: self.runner.clone(),
        }
    }

    /// Starts a scan on a new pump thread.
    ///
    /// `done` receives `Ok(Valid)`, `Ok(Uncertain)` on timeout, or the error
    /// that ended the scan. The recognizer is back in `Idle` before `done`
    /// runs.
    pub fn start_recognition<F>(&mut self, done: F) -> Result<(), ScanError>
    where
        F: FnOnce(Result<ResultState, ScanError>) + Send + 'static,
    {
        if self.control.state() != ScanState::Idle {
            return Err(ScanError::AlreadyRunning);
        }
        self.reclaim();
        let mut parts = self.parts.take().ok_or(ScanError::Released)?;
        if !self.control.begin() {
            self.parts = Some(parts);
            return Err(ScanError::AlreadyRunning);
        }

        let runner = self.runner.clone();
        let control = self.control.clone();
        let clock = self.clock.clone();
        let throttle = Throttle::from_fps(self.target_fps);
        log::info!(
            "Starting recognition ({:?}, {} ms interval)",
            control.mode(),
            throttle.interval().as_millis()
        );

        let spawned = thread::Builder::new()
            .name(PUMP_THREAD_NAME.to_string())
            .spawn(move || {
                let exit = run_pump(PumpContext {
                    source: parts.source.as_mut(),
                    runner: runner.as_ref(),
                    control: control.as_ref(),
                    clock: clock.as_ref(),
                    throttle,
                    logger: parts.logger.as_mut(),
                });
                control.finish();
                match exit {
                    PumpExit::Completed(result) => {
                        log::debug!("Recognition finished: {result:?}");
                        done(result);
                    }
                    PumpExit::Cancelled => log::info!("Recognition cancelled"),
                }
                parts
            });

        match spawned {
            Ok(handle) => {
                self.pump = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.control.finish();
                Err(ScanError::Thread(e))
            }
        }
    }

    /// Blocks until the current scan, if any, has ended.
    pub fn wait_for_completion(&mut self) {
        self.reclaim();
    }

    /// Cancels the current scan and waits for the pump to stop. The done
    /// callback of the cancelled scan is dropped without being called.
    pub fn cancel_recognition(&mut self) {
        if self.control.request_cancel() {
            log::debug!("Cancellation requested");
        }
        self.reclaim();
    }

    /// Stops any scan, closes the frame source and logs the scan summary.
    pub fn release(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.cancel_recognition();
        if let Some(mut parts) = self.parts.take() {
            parts.source.close();
            parts.logger.summary();
        }
    }

    fn reclaim(&mut self) {
        if let Some(handle) = self.pump.take() {
            match handle.join() {
                Ok(parts) => self.parts = Some(parts),
                Err(_) => {
                    log::error!("Frame pump thread panicked; frame source lost");
                    self.control.finish();
                }
            }
        }
    }
}

impl Drop for VideoRecognizer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Cloneable handle steering a running scan from other threads.
#[derive(Clone)]
pub struct ScanController {
    control: Arc<PumpControl>,
    runner: Arc<dyn RecognitionRunner>,
}

impl ScanController {
    /// Pauses at the top of the next tick; a submission in flight completes.
    pub fn pause(&self) -> bool {
        self.control.pause()
    }

    /// Resumes a paused scan, hard-resetting the runner first when asked.
    /// If the reset fails the scan stays paused.
    pub fn resume(&self, reset_recognizers: bool) -> Result<(), ProxyError> {
        if !self.control.is_paused() {
            return Ok(());
        }
        if reset_recognizers {
            self.runner.reset(true)?;
        }
        self.control.resume();
        Ok(())
    }

    pub fn request_cancel(&self) -> bool {
        self.control.request_cancel()
    }

    /// Restarts the timeout accrual at the next tick. Wired to the runner's
    /// clear-timeout callback.
    pub fn clear_timeout(&self) {
        self.control.request_clear_timeout();
    }

    /// Switches mode; entering or leaving `DetectionTest` toggles the
    /// runner's detection-only flag.
    pub fn set_mode(&self, mode: RecognitionMode) -> Result<(), ProxyError> {
        let was_detection = self.control.mode() == RecognitionMode::DetectionTest;
        let is_detection = mode == RecognitionMode::DetectionTest;
        if was_detection != is_detection {
            self.runner.set_detection_only(is_detection)?;
        }
        self.control.set_mode(mode);
        Ok(())
    }

    pub fn mode(&self) -> RecognitionMode {
        self.control.mode()
    }

    pub fn set_timeout(&self, timeout: Duration) {
        self.control.set_timeout(timeout);
    }

    pub fn timeout(&self) -> Duration {
        self.control.timeout()
    }

    pub fn state(&self) -> ScanState {
        self.control.state()
    }

    pub fn wait_for_state(&self, state: ScanState, max_wait: Duration) -> bool {
        self.control.wait_for_state(state, max_wait)
    }
}
