use crate::protocol::domain::envelope::{LicenseLease, Payload};
use crate::protocol::domain::result_state::ResultState;
use crate::proxy::proxy_error::ProxyError;
use crate::shared::value::{ObjectHandle, Value};

fn unexpected(expected: &'static str, actual: &Payload) -> ProxyError {
    ProxyError::UnexpectedPayload {
        expected,
        actual: actual.kind(),
    }
}

pub fn into_unit(payload: Payload) -> Result<(), ProxyError> {
    match payload {
        Payload::Unit => Ok(()),
        other => Err(unexpected("unit", &other)),
    }
}

/// Methods without a return value answer with `Null`; `Unit` is accepted too.
pub fn into_value(payload: Payload) -> Result<Value, ProxyError> {
    match payload {
        Payload::Value(v) => Ok(v),
        Payload::Unit => Ok(Value::Null),
        other => Err(unexpected("value", &other)),
    }
}

pub fn into_handle(payload: Payload) -> Result<ObjectHandle, ProxyError> {
    match payload {
        Payload::Handle(h) => Ok(h),
        other => Err(unexpected("handle", &other)),
    }
}

pub fn into_result_state(payload: Payload) -> Result<ResultState, ProxyError> {
    match payload {
        Payload::ResultState(s) => Ok(s),
        other => Err(unexpected("result state", &other)),
    }
}

pub fn into_lease(payload: Payload) -> Result<LicenseLease, ProxyError> {
    match payload {
        Payload::Lease(l) => Ok(l),
        other => Err(unexpected("license lease", &other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matching_payloads_unwrap() {
        assert_eq!(into_handle(Payload::Handle(ObjectHandle(2))), Ok(ObjectHandle(2)));
        assert_eq!(
            into_result_state(Payload::ResultState(ResultState::Valid)),
            Ok(ResultState::Valid)
        );
        assert_eq!(into_value(Payload::Unit), Ok(Value::Null));
        assert_eq!(into_unit(Payload::Unit), Ok(()));
    }

    #[test]
    fn test_mismatch_names_both_kinds() {
        let err = into_handle(Payload::Unit).unwrap_err();
        assert_eq!(
            err,
            ProxyError::UnexpectedPayload {
                expected: "handle",
                actual: "unit"
            }
        );
    }
}
