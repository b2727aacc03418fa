/*
    wire.rs - Wire protocol types

    Request: {"method": string, "params": object}.
    Reply: method-specific success payload, or the error object
    {"error_code": N, "error_desc": "..."}. One request per
    connection, one reply, then close.
*/

use crate::api::codes::ApiErrorCode;
use serde::Deserialize;
use serde_json::{json, Value};

/// A decoded API request
#[derive(Debug, Deserialize)]
pub struct Request {
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl Request {
    pub fn decode(raw: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(raw)
    }
}

/// The error reply object; code 0 is the empty success reply
pub fn error_reply(code: ApiErrorCode) -> Value {
    json!({
        "error_code": code.code(),
        "error_desc": code.description(),
    })
}

/// Success reply for operations with no payload
pub fn ok_reply() -> Value {
    error_reply(ApiErrorCode::NoError)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_request() {
        let raw = br#"{"method": "user.create", "params": {"username": "alice"}}"#;
        let request = Request::decode(raw).unwrap();
        assert_eq!(request.method, "user.create");
        assert_eq!(request.params["username"], "alice");
    }

    #[test]
    fn test_decode_request_without_params() {
        let request = Request::decode(br#"{"method": "user.getmyinfo"}"#).unwrap();
        assert!(request.params.is_null());
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(Request::decode(b"not json").is_err());
    }

    #[test]
    fn test_error_reply_shape() {
        let reply = error_reply(ApiErrorCode::NoAccessToken);
        assert_eq!(reply["error_code"], 1);
        assert_eq!(reply["error_desc"], "No access token provided to API");
    }

    #[test]
    fn test_ok_reply_is_code_zero() {
        let reply = ok_reply();
        assert_eq!(reply["error_code"], 0);
        assert_eq!(reply["error_desc"], "");
    }
}
