use std::collections::HashMap;

use crate::protocol::domain::error::{ErrorCode, RemoteError};
use crate::shared::value::{ObjectHandle, Value};
use crate::worker::domain::engine::{lock_object, share, Argument, EngineObject, SharedObject};

/// Worker-side registry of engine objects created on behalf of the control
/// context.
///
/// Handles come from a monotonic counter and are never reused, so a stale
/// handle always fails instead of aliasing a newer object.
#[derive(Default)]
pub struct HandleTable {
    next: u32,
    objects: HashMap<ObjectHandle, SharedObject>,
}

impl HandleTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, object: Box<dyn EngineObject>) -> ObjectHandle {
        let handle = ObjectHandle(self.next);
        self.next += 1;
        self.objects.insert(handle, share(object));
        handle
    }

    pub fn get(&self, handle: ObjectHandle) -> Result<SharedObject, RemoteError> {
        self.objects
            .get(&handle)
            .cloned()
            .ok_or_else(|| RemoteError::unknown_handle(handle))
    }

    pub fn get_all(&self, handles: &[ObjectHandle]) -> Result<Vec<SharedObject>, RemoteError> {
        handles.iter().map(|h| self.get(*h)).collect()
    }

    /// Removes and deletes the object. A runner still holding it keeps its
    /// reference alive, but the handle is gone for good.
    pub fn remove(&mut self, handle: ObjectHandle) -> Result<(), RemoteError> {
        let object = self
            .objects
            .remove(&handle)
            .ok_or_else(|| RemoteError::unknown_handle(handle))?;
        lock_object(&object).delete();
        Ok(())
    }

    /// Invokes `method` on the object, if its class exposes it.
    ///
    /// The object stays locked for the whole call, so it cannot be passed
    /// to itself as an argument.
    pub fn invoke(
        &self,
        handle: ObjectHandle,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Value, RemoteError> {
        let object = self.get(handle)?;
        if args.contains(&Value::Remote(handle)) {
            return Err(RemoteError::new(
                ErrorCode::InvalidArgument,
                format!("object {handle} cannot be passed to its own {method}"),
            ));
        }
        let args = self.resolve_args(args)?;
        let mut guard = lock_object(&object);
        if !guard.methods().contains(&method) {
            return Err(RemoteError::new(
                ErrorCode::UnknownMethod,
                format!("{} has no method {method}", guard.class_name()),
            ));
        }
        guard
            .invoke(method, args)
            .map_err(|e| RemoteError::new(ErrorCode::EngineFailure, e.to_string()))
    }

    /// Replaces top-level remote references with the objects they name.
    pub fn resolve_args(&self, args: Vec<Value>) -> Result<Vec<Argument>, RemoteError> {
        args.into_iter()
            .map(|arg| match arg {
                Value::Remote(handle) => self.get(handle).map(Argument::Object),
                plain => Ok(Argument::Plain(plain)),
            })
            .collect()
    }

    pub fn contains(&self, handle: ObjectHandle) -> bool {
        self.objects.contains_key(&handle)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}
