//! REST reply decoding
//!
//! The REST service answers `{"result": ...}` or `{"error": "..."}` per
//! command. Results are mapped onto RESP values so the shared operation
//! decoders handle them exactly like socket replies. Requests ask for base64
//! encoded strings; a string that is not valid base64 is kept as is.

use crate::error::{Result, StoreError};
use crate::protocol::RespValue;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use serde_json::Value;

/// Decode one `{"result"}` / `{"error"}` entry
pub fn entry_to_resp(entry: Value) -> Result<RespValue> {
    let mut object = match entry {
        Value::Object(object) => object,
        other => {
            return Err(StoreError::Parse(format!(
                "expected a result object, got {}",
                other
            )))
        }
    };

    if let Some(error) = object.remove("error") {
        let message = match error {
            Value::String(s) => s,
            other => other.to_string(),
        };
        return Ok(RespValue::Error(message));
    }

    match object.remove("result") {
        Some(result) => json_to_resp(result),
        None => Err(StoreError::Parse(
            "reply has neither 'result' nor 'error'".to_string(),
        )),
    }
}

/// Decode a pipeline reply: an array of entries, one per command
///
/// A single `{"error"}` object means the service refused the whole pipeline.
pub fn pipeline_to_resp(reply: Value, expected: usize) -> Result<Vec<RespValue>> {
    let entries = match reply {
        Value::Array(entries) => entries,
        Value::Object(mut object) if object.contains_key("error") => {
            let message = match object.remove("error") {
                Some(Value::String(s)) => s,
                Some(other) => other.to_string(),
                None => String::new(),
            };
            return Err(StoreError::Command(message));
        }
        other => {
            return Err(StoreError::Parse(format!(
                "expected a pipeline array, got {}",
                other
            )))
        }
    };

    if entries.len() != expected {
        return Err(StoreError::Parse(format!(
            "pipeline returned {} replies for {} commands",
            entries.len(),
            expected
        )));
    }

    entries.into_iter().map(entry_to_resp).collect()
}

/// Map a JSON result onto a RESP value
pub fn json_to_resp(value: Value) -> Result<RespValue> {
    match value {
        Value::Null => Ok(RespValue::Null),
        Value::Bool(b) => Ok(RespValue::Integer(b as i64)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Ok(RespValue::Integer(i)),
            None => Ok(RespValue::BulkString(Bytes::from(n.to_string()))),
        },
        Value::String(s) => Ok(RespValue::BulkString(decode_string(s))),
        Value::Array(items) => items
            .into_iter()
            .map(json_to_resp)
            .collect::<Result<Vec<_>>>()
            .map(RespValue::Array),
        Value::Object(_) => Err(StoreError::Parse(
            "unexpected object inside a result".to_string(),
        )),
    }
}

fn decode_string(raw: String) -> Bytes {
    match STANDARD.decode(raw.as_bytes()) {
        Ok(decoded) => Bytes::from(decoded),
        Err(_) => Bytes::from(raw),
    }
}

/// Encode a string the way the service does for base64 replies
pub fn encode_string(raw: &str) -> String {
    STANDARD.encode(raw.as_bytes())
}
