use std::sync::Arc;

use crate::protocol::domain::envelope::{InitSettings, LicenseLease, RequestKind};
use crate::protocol::infrastructure::connection::WorkerConnection;
use crate::protocol::infrastructure::event_router::{MetadataCallbacks, ProgressFn};
use crate::proxy::payload::{into_handle, into_lease, into_unit, into_value};
use crate::proxy::proxy_error::ProxyError;
use crate::proxy::recognizer_proxy::RecognizerProxy;
use crate::proxy::runner_proxy::RunnerProxy;
use crate::shared::value::Value;

/// Entry point to a worker-hosted engine: initialization, free functions
/// and construction of recognizer and runner proxies.
#[derive(Clone)]
pub struct EngineProxy {
    connection: Arc<WorkerConnection>,
}

impl EngineProxy {
    pub fn new(connection: WorkerConnection) -> Self {
        Self {
            connection: Arc::new(connection),
        }
    }

    pub fn connection(&self) -> &WorkerConnection {
        &self.connection
    }

    /// Loads the engine module and checks the license.
    ///
    /// Load progress is reported only when `on_progress` is given. Failures
    /// are fatal for the session: callers should not submit frames after one.
    pub fn initialize(
        &self,
        settings: InitSettings,
        on_progress: Option<ProgressFn>,
    ) -> Result<LicenseLease, ProxyError> {
        let settings = InitSettings {
            want_load_progress: on_progress.is_some(),
            ..settings
        };
        let location = settings.engine_location.clone();
        let events = self.connection.events();
        events.set_load_progress(on_progress);
        // Progress events precede the response, so the handler has seen all
        // of them by the time the call returns.
        let result = self
            .connection
            .call(RequestKind::Init(settings))
            .and_then(into_lease);
        events.set_load_progress(None);

        match &result {
            Ok(lease) => log::info!("engine {location} initialized for {}", lease.licensee),
            Err(e) => log::error!("engine initialization failed: {e}"),
        }
        result
    }

    pub fn invoke_function(&self, function: &str, args: Vec<Value>) -> Result<Value, ProxyError> {
        into_value(self.connection.call(RequestKind::InvokeFunction {
            function: function.to_string(),
            args,
        })?)
    }

    pub fn create_recognizer(
        &self,
        class_name: &str,
        args: Vec<Value>,
    ) -> Result<RecognizerProxy, ProxyError> {
        let handle = into_handle(self.connection.call(RequestKind::CreateNewObject {
            class_name: class_name.to_string(),
            args,
        })?)?;
        log::debug!("created {class_name} {handle}");
        Ok(RecognizerProxy::new(
            self.connection.clone(),
            handle,
            class_name.to_string(),
        ))
    }

    /// Creates the worker's runner over `recognizers`.
    ///
    /// Fails with `runner_already_exists` while another runner is live.
    pub fn create_runner(
        &self,
        recognizers: &[&RecognizerProxy],
        allow_multiple_results: bool,
        callbacks: MetadataCallbacks,
    ) -> Result<RunnerProxy, ProxyError> {
        let handles = recognizers
            .iter()
            .map(|r| r.handle())
            .collect::<Result<Vec<_>, _>>()?;
        into_unit(self.connection.call(RequestKind::CreateRunner {
            handles,
            allow_multiple_results,
            callbacks: callbacks.flags(),
        })?)?;
        // Installed only on success so a rejected second runner cannot steal
        // the live runner's handlers.
        self.connection.events().set_metadata_callbacks(callbacks);
        Ok(RunnerProxy::new(self.connection.clone()))
    }
}
