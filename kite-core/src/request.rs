use kite_dnode::{CallValue, Function, IntoCallValue, Partial};
use kite_protocol::{Authentication, Kite};
use serde::{Deserialize, Serialize};

use crate::error::RpcError;

/// An inbound method invocation, as seen by a handler.
///
/// `args` holds the caller's real arguments (`withArgs` when the options
/// envelope was used, the raw argument sequence otherwise), with any
/// callback stubs already queued for installation.
#[derive(Debug)]
pub struct Request {
    pub method: String,
    pub args: Partial,
    /// The caller's announced identity, when the envelope carried one.
    pub caller: Option<Kite>,
    /// Authentication material presented with the call.
    pub auth: Option<Authentication>,
}

/// The wire body of a response error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub message: String,
}

impl From<&RpcError> for ErrorBody {
    fn from(err: &RpcError) -> Self {
        ErrorBody {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

impl From<ErrorBody> for RpcError {
    fn from(body: ErrorBody) -> Self {
        RpcError::Remote {
            kind: body.kind,
            message: body.message,
        }
    }
}

/// Split an inbound argument sequence into a [`Request`] and the response
/// callback, recognizing the options envelope by its `withArgs` field.
pub(crate) fn parse_request(
    method: String,
    args: Partial,
) -> (Request, Option<Function>) {
    if let Ok(first) = args.one() {
        if let Ok(map) = first.map() {
            if map.contains_key("withArgs") {
                let caller = map.get("kite").and_then(|p| p.to::<Kite>().ok());
                let auth = map
                    .get("authentication")
                    .and_then(|p| p.to::<Authentication>().ok());
                let with_args = map
                    .get("withArgs")
                    .cloned()
                    .unwrap_or_else(|| Partial::from_raw("[]"));
                let response = map.get("responseCallback").and_then(|p| p.function().ok());
                return (
                    Request {
                        method,
                        args: with_args,
                        caller,
                        auth,
                    },
                    response,
                );
            }
        }
    }
    (
        Request {
            method,
            args,
            caller: None,
            auth: None,
        },
        None,
    )
}

/// Render a handler outcome as the response-callback argument:
/// `{error, result}`.
pub(crate) fn response_value(outcome: &Result<CallValue, RpcError>) -> CallValue {
    match outcome {
        Ok(result) => CallValue::object([
            ("error", CallValue::Null),
            ("result", result.clone()),
        ]),
        Err(err) => CallValue::object([
            (
                "error",
                CallValue::object([
                    ("type", err.kind().into_call_value()),
                    ("message", err.to_string().into_call_value()),
                ]),
            ),
            ("result", CallValue::Null),
        ]),
    }
}

/// Parse the `{error, result}` object a response callback was invoked
/// with, yielding the result fragment or the remote error.
pub(crate) fn parse_response(args: &Partial) -> Result<Partial, RpcError> {
    let body = args
        .one()
        .map_err(|e| RpcError::Codec(e.to_string()))?;
    let map = body.map().map_err(|e| RpcError::Codec(e.to_string()))?;

    if let Some(error) = map.get("error") {
        if error.raw().trim() != "null" {
            let body: ErrorBody = error
                .to()
                .map_err(|e| RpcError::Codec(e.to_string()))?;
            return Err(body.into());
        }
    }
    Ok(map
        .get("result")
        .cloned()
        .unwrap_or_else(|| Partial::from_raw("null")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_arguments_pass_through() {
        let (req, response) = parse_request("echo".into(), Partial::from_raw(r#"["x"]"#));
        assert_eq!(req.args.raw(), r#"["x"]"#);
        assert!(req.caller.is_none());
        assert!(response.is_none());
    }

    #[test]
    fn envelope_is_unwrapped() {
        let raw = r#"[{"kite": null, "withArgs": [42], "responseCallback": "[Function]"}]"#;
        let (req, response) = parse_request("add".into(), Partial::from_raw(raw));
        assert_eq!(req.args.must_one().must_float64(), 42.0);
        assert!(response.is_none(), "placeholder without a spec is not callable");
    }

    #[test]
    fn error_responses_map_to_remote_errors() {
        let args = Partial::from_raw(
            r#"[{"error": {"type": "genericError", "message": "boom"}, "result": null}]"#,
        );
        match parse_response(&args) {
            Err(RpcError::Remote { message, .. }) => assert_eq!(message, "boom"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn ok_responses_yield_the_result_fragment() {
        let args = Partial::from_raw(r#"[{"error": null, "result": "pong"}]"#);
        let result = parse_response(&args).unwrap();
        assert_eq!(result.must_string(), "pong");
    }
}
