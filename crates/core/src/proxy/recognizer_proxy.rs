use std::sync::Arc;

use crate::protocol::domain::envelope::RequestKind;
use crate::protocol::infrastructure::connection::WorkerConnection;
use crate::proxy::payload::{into_unit, into_value};
use crate::proxy::proxy_error::ProxyError;
use crate::shared::value::{ObjectHandle, Value};

/// Control-side mirror of one engine recognizer object.
///
/// The remote object lives until [`RecognizerProxy::delete`] is called;
/// dropping the proxy does not release it. After deletion the handle is
/// cleared and every call fails locally without a round trip.
pub struct RecognizerProxy {
    connection: Arc<WorkerConnection>,
    handle: Option<ObjectHandle>,
    class_name: String,
}

impl RecognizerProxy {
    pub(crate) fn new(
        connection: Arc<WorkerConnection>,
        handle: ObjectHandle,
        class_name: String,
    ) -> Self {
        Self {
            connection,
            handle: Some(handle),
            class_name,
        }
    }

    pub fn handle(&self) -> Result<ObjectHandle, ProxyError> {
        self.handle.ok_or_else(|| ProxyError::Deleted {
            class_name: self.class_name.clone(),
        })
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn is_deleted(&self) -> bool {
        self.handle.is_none()
    }

    /// Wraps this recognizer for passing to another remote call.
    pub fn as_argument(&self) -> Result<Value, ProxyError> {
        self.handle().map(Value::Remote)
    }

    /// Calls a method on the remote object.
    pub fn invoke(&self, method: &str, args: Vec<Value>) -> Result<Value, ProxyError> {
        let handle = self.handle()?;
        let payload = self.connection.call(RequestKind::InvokeObjectMethod {
            handle,
            method: method.to_string(),
            args,
        })?;
        into_value(payload)
    }

    /// Current recognition result. Image buffers in it were moved, not copied.
    pub fn get_result(&self) -> Result<Value, ProxyError> {
        self.invoke("getResult", vec![])
    }

    pub fn current_settings(&self) -> Result<Value, ProxyError> {
        self.invoke("currentSettings", vec![])
    }

    pub fn update_settings(&self, settings: Value) -> Result<(), ProxyError> {
        self.invoke("updateSettings", vec![settings]).map(|_| ())
    }

    /// Destroys the remote object. The local handle is invalidated even if
    /// the worker reports a failure.
    pub fn delete(&mut self) -> Result<(), ProxyError> {
        let handle = self.handle()?;
        self.handle = None;
        log::debug!("deleting {} {handle}", self.class_name);
        into_unit(self.connection.call(RequestKind::DeleteObject { handle })?)
    }
}

impl std::fmt::Debug for RecognizerProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecognizerProxy")
            .field("class_name", &self.class_name)
            .field("handle", &self.handle)
            .finish()
    }
}
