//! Typed access to hash records
//!
//! Writing flattens a serializable struct into string fields: string values
//! are stored verbatim, everything else as its JSON text. Reading lets the
//! target type drive decoding, so a `String` field always receives the raw
//! stored text while numbers, booleans, options and nested values are parsed
//! back from JSON.
//!
//! The one ambiguity is a string that reads as JSON `null`, which would come
//! back as `None` in an `Option<String>`. Such strings are stored JSON-quoted
//! and unquoted on read.

use crate::error::{Result, StoreError};
use crate::ops::HashRecord;
use serde::de::value::{MapDeserializer, StrDeserializer};
use serde::de::{DeserializeOwned, Deserializer, IntoDeserializer, Visitor};
use serde::{forward_to_deserialize_any, Serialize};
use serde_json::Value;

/// Flatten a struct (or map) into hash fields
pub fn to_record<T: Serialize + ?Sized>(value: &T) -> Result<HashRecord> {
    let object = match serde_json::to_value(value)? {
        Value::Object(object) => object,
        other => {
            return Err(StoreError::Parse(format!(
                "a hash record needs a JSON object, got {}",
                json_kind(&other)
            )))
        }
    };

    Ok(object
        .into_iter()
        .map(|(field, value)| {
            let text = match value {
                Value::String(s) if needs_quoting(&s) => Value::String(s).to_string(),
                Value::String(s) => s,
                other => other.to_string(),
            };
            (field, text)
        })
        .collect())
}

/// Rebuild a typed value from hash fields
pub fn from_record<T: DeserializeOwned>(record: &HashRecord) -> Result<T> {
    let fields = record
        .iter()
        .map(|(field, text)| (field.as_str(), FieldDeserializer(text.as_str())));
    T::deserialize(MapDeserializer::<_, serde_json::Error>::new(fields))
        .map_err(|e| StoreError::Parse(format!("hash does not fit the requested type: {}", e)))
}

/// True for strings that would read back as JSON `null`, directly or once
/// unquoted
fn needs_quoting(text: &str) -> bool {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Null) => true,
        Ok(Value::String(inner)) => needs_quoting(&inner),
        _ => false,
    }
}

/// Original string of a value stored quoted by `to_record`
fn unquoted(text: &str) -> Option<String> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::String(inner)) if needs_quoting(&inner) => Some(inner),
        _ => None,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Deserializer over one stored field value
struct FieldDeserializer<'a>(&'a str);

impl<'a> FieldDeserializer<'a> {
    fn parsed(&self) -> Option<Value> {
        serde_json::from_str(self.0).ok()
    }
}

impl<'de, 'a> Deserializer<'de> for FieldDeserializer<'a> {
    type Error = serde_json::Error;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> std::result::Result<V::Value, Self::Error> {
        match self.parsed() {
            Some(value) => value.deserialize_any(visitor),
            None => visitor.visit_str(self.0),
        }
    }

    fn deserialize_str<V: Visitor<'de>>(self, visitor: V) -> std::result::Result<V::Value, Self::Error> {
        match unquoted(self.0) {
            Some(original) => visitor.visit_string(original),
            None => visitor.visit_str(self.0),
        }
    }

    fn deserialize_string<V: Visitor<'de>>(self, visitor: V) -> std::result::Result<V::Value, Self::Error> {
        self.deserialize_str(visitor)
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> std::result::Result<V::Value, Self::Error> {
        if self.0 == "null" {
            visitor.visit_none()
        } else {
            visitor.visit_some(self)
        }
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        name: &'static str,
        variants: &'static [&'static str],
        visitor: V,
    ) -> std::result::Result<V::Value, Self::Error> {
        match self.parsed() {
            Some(value @ Value::Object(_)) => value.deserialize_enum(name, variants, visitor),
            _ => {
                let unit: StrDeserializer<'_, serde_json::Error> = self.0.into_deserializer();
                visitor.visit_enum(unit)
            }
        }
    }

    forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char bytes byte_buf
        unit unit_struct newtype_struct seq tuple tuple_struct map struct
        identifier ignored_any
    }
}

impl<'de, 'a> IntoDeserializer<'de, serde_json::Error> for FieldDeserializer<'a> {
    type Deserializer = Self;

    fn into_deserializer(self) -> Self {
        self
    }
}
