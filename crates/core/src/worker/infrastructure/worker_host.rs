use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};

use crate::protocol::domain::envelope::{
    InitSettings, Payload, Request, RequestKind, Response, WorkerMessage,
};
use crate::protocol::domain::error::{ErrorCode, RemoteError};
use crate::protocol::domain::event::{CallbackFlags, WorkerEvent};
use crate::protocol::infrastructure::connection::WorkerConnection;
use crate::shared::constants::WORKER_THREAD_NAME;
use crate::shared::value::ObjectHandle;
use crate::worker::domain::engine::{EngineError, EngineRunner, RecognitionEngine};
use crate::worker::domain::handle_table::HandleTable;
use crate::worker::domain::module_loader::{LicenseChecker, ModuleLoader};
use crate::worker::domain::runner_callbacks::{EventEmitter, RunnerCallbacks};

/// Spawns a worker thread hosting a fresh engine context and returns the
/// control-side connection to it.
///
/// The worker exits once every clone of the connection's request sender is
/// dropped; joining the returned handle then waits for engine teardown.
pub fn spawn_worker(
    loader: Box<dyn ModuleLoader>,
    license: Box<dyn LicenseChecker>,
) -> std::io::Result<(WorkerConnection, JoinHandle<()>)> {
    let (request_tx, request_rx) = crossbeam_channel::unbounded::<Request>();
    let (message_tx, message_rx) = crossbeam_channel::unbounded::<WorkerMessage>();

    let host = WorkerHost::new(loader, license, message_tx);
    let worker = thread::Builder::new()
        .name(WORKER_THREAD_NAME.into())
        .spawn(move || host.run(request_rx))?;

    let connection = WorkerConnection::spawn(request_tx, message_rx)?;
    Ok((connection, worker))
}

/// Worker-side state of one pairing: the loaded engine, its objects and the
/// runner singleton.
///
/// Requests are handled strictly one at a time, so the singleton rule is a
/// presence check on `runner`.
pub struct WorkerHost {
    loader: Box<dyn ModuleLoader>,
    license: Box<dyn LicenseChecker>,
    messages: Sender<WorkerMessage>,
    engine: Option<Box<dyn RecognitionEngine>>,
    objects: HandleTable,
    runner: Option<Box<dyn EngineRunner>>,
    flags: CallbackFlags,
    clear_timeout: bool,
}

impl WorkerHost {
    pub fn new(
        loader: Box<dyn ModuleLoader>,
        license: Box<dyn LicenseChecker>,
        messages: Sender<WorkerMessage>,
    ) -> Self {
        Self {
            loader,
            license,
            messages,
            engine: None,
            objects: HandleTable::new(),
            runner: None,
            flags: CallbackFlags::default(),
            clear_timeout: false,
        }
    }

    /// Serves requests until the control side hangs up.
    pub fn run(mut self, requests: Receiver<Request>) {
        log::debug!("worker started");
        for Request { id, kind } in requests {
            let name = kind.name();
            let outcome = self.handle_guarded(kind);
            match &outcome {
                Ok(payload) => {
                    let moved = payload.transferable_bytes();
                    if moved > 0 {
                        let buffers = match payload {
                            Payload::Value(v) => v.transferable_count(),
                            _ => 0,
                        };
                        log::debug!("request {id} ({name}) moves {buffers} buffer(s), {moved} bytes back");
                    }
                }
                Err(e) => log::debug!("request {id} ({name}) failed: {e}"),
            }
            let response = WorkerMessage::Response(Response { id, outcome });
            if self.messages.send(response).is_err() {
                break;
            }
        }
        self.shutdown();
        log::debug!("worker stopped");
    }

    /// [`WorkerHost::handle`] with engine panics turned into failure outcomes.
    pub fn handle_guarded(&mut self, kind: RequestKind) -> Result<Payload, RemoteError> {
        let name = kind.name();
        match panic::catch_unwind(AssertUnwindSafe(|| self.handle(kind))) {
            Ok(outcome) => outcome,
            Err(payload) => {
                let reason = panic_message(payload.as_ref());
                log::error!("engine panicked during {name}: {reason}");
                Err(RemoteError::new(
                    ErrorCode::EngineFailure,
                    format!("engine panicked during {name}: {reason}"),
                ))
            }
        }
    }

    pub fn handle(&mut self, kind: RequestKind) -> Result<Payload, RemoteError> {
        match kind {
            RequestKind::Init(settings) => self.init(settings),
            RequestKind::InvokeFunction { function, args } => {
                let engine = self
                    .engine
                    .as_mut()
                    .ok_or_else(RemoteError::module_not_initialized)?;
                let args = self.objects.resolve_args(args)?;
                let value = engine
                    .invoke_function(&function, args)
                    .map_err(engine_failure)?;
                Ok(Payload::Value(value))
            }
            RequestKind::CreateNewObject { class_name, args } => {
                let engine = self
                    .engine
                    .as_mut()
                    .ok_or_else(RemoteError::module_not_initialized)?;
                let args = self.objects.resolve_args(args)?;
                let object = engine
                    .create_object(&class_name, args)
                    .map_err(engine_failure)?;
                let handle = self.objects.insert(object);
                log::debug!("created {class_name} as {handle}");
                Ok(Payload::Handle(handle))
            }
            RequestKind::InvokeObjectMethod {
                handle,
                method,
                args,
            } => self
                .objects
                .invoke(handle, &method, args)
                .map(Payload::Value),
            RequestKind::DeleteObject { handle } => {
                self.objects.remove(handle)?;
                log::debug!("deleted object {handle}");
                Ok(Payload::Unit)
            }
            RequestKind::CreateRunner {
                handles,
                allow_multiple_results,
                callbacks,
            } => self.create_runner(&handles, allow_multiple_results, callbacks),
            RequestKind::ReconfigureRunner {
                handles,
                allow_multiple_results,
            } => {
                if self.engine.is_none() {
                    return Err(RemoteError::module_not_initialized());
                }
                let recognizers = self.objects.get_all(&handles)?;
                self.runner()?
                    .reconfigure(recognizers, allow_multiple_results)
                    .map_err(engine_failure)?;
                Ok(Payload::Unit)
            }
            RequestKind::DeleteRunner => {
                let mut runner = self.runner.take().ok_or_else(RemoteError::runner_missing)?;
                runner.delete();
                log::debug!("runner deleted");
                Ok(Payload::Unit)
            }
            RequestKind::ProcessImage { frame } => {
                let state = self.runner()?.process_image(frame).map_err(engine_failure)?;
                Ok(Payload::ResultState(state))
            }
            RequestKind::ResetRecognizers { hard_reset } => {
                self.runner()?.reset(hard_reset).map_err(engine_failure)?;
                Ok(Payload::Unit)
            }
            RequestKind::SetDetectionOnly(enabled) => {
                self.runner()?.set_detection_only(enabled);
                Ok(Payload::Unit)
            }
            RequestKind::SetCameraPreviewMirrored(mirrored) => {
                self.runner()?.set_camera_preview_mirrored(mirrored);
                Ok(Payload::Unit)
            }
            RequestKind::RegisterMetadataCallbacks(flags) => {
                self.runner()?;
                self.flags = flags;
                self.install_callbacks()?;
                Ok(Payload::Unit)
            }
            RequestKind::SetClearTimeoutCallback(present) => {
                self.runner()?;
                self.clear_timeout = present;
                self.install_callbacks()?;
                Ok(Payload::Unit)
            }
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.engine.is_some()
    }

    pub fn has_runner(&self) -> bool {
        self.runner.is_some()
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    fn init(&mut self, settings: InitSettings) -> Result<Payload, RemoteError> {
        if self.engine.is_some() {
            return Err(RemoteError::new(
                ErrorCode::ModuleAlreadyInitialized,
                "module already initialized",
            ));
        }

        let emitter = EventEmitter::new(self.messages.clone());
        let want_progress = settings.want_load_progress;
        let mut last_reported = None;
        let mut progress = |pct: u8| {
            let pct = pct.min(100);
            if want_progress && last_reported != Some(pct) {
                last_reported = Some(pct);
                emitter.post(WorkerEvent::LoadProgress(pct));
            }
        };

        let engine = self.loader.load(&settings.engine_location, &mut progress)?;
        let lease = self
            .license
            .check(&settings.license_key, settings.user_id.as_deref())?;
        self.engine = Some(engine);
        log::info!(
            "engine loaded from {} for {}",
            settings.engine_location,
            lease.licensee
        );
        Ok(Payload::Lease(lease))
    }

    fn create_runner(
        &mut self,
        handles: &[ObjectHandle],
        allow_multiple_results: bool,
        flags: CallbackFlags,
    ) -> Result<Payload, RemoteError> {
        if self.runner.is_some() {
            return Err(RemoteError::runner_already_exists());
        }
        let engine = self
            .engine
            .as_mut()
            .ok_or_else(RemoteError::module_not_initialized)?;
        let recognizers = self.objects.get_all(handles)?;
        let mut runner = engine
            .create_runner(recognizers, allow_multiple_results)
            .map_err(engine_failure)?;

        self.flags = flags;
        runner.set_callbacks(self.callbacks());
        self.runner = Some(runner);
        log::debug!(
            "runner created over {} recognizer(s), multiple results: {allow_multiple_results}",
            handles.len()
        );
        Ok(Payload::Unit)
    }

    fn runner(&mut self) -> Result<&mut Box<dyn EngineRunner>, RemoteError> {
        self.runner.as_mut().ok_or_else(RemoteError::runner_missing)
    }

    fn callbacks(&self) -> RunnerCallbacks {
        RunnerCallbacks::new(
            EventEmitter::new(self.messages.clone()),
            self.flags,
            self.clear_timeout,
        )
    }

    fn install_callbacks(&mut self) -> Result<(), RemoteError> {
        let callbacks = self.callbacks();
        self.runner()?.set_callbacks(callbacks);
        Ok(())
    }

    fn shutdown(&mut self) {
        if let Some(mut runner) = self.runner.take() {
            runner.delete();
        }
        let leaked = self.objects.len();
        if leaked > 0 {
            log::debug!("dropping {leaked} undeleted engine object(s) on shutdown");
        }
        self.engine = None;
    }
}

fn engine_failure(err: EngineError) -> RemoteError {
    RemoteError::new(ErrorCode::EngineFailure, err.to_string())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
