//! Hash operations (HGETALL, HSET)

use super::{HashRecord, OpResult, Operation};
use crate::error::{Result, StoreError};
use crate::protocol::RespValue;
use crate::store::Keyspace;

/// Read every field of the hash stored at key
///
/// Wire: HGETALL key
#[derive(Debug, Clone, PartialEq)]
pub struct GetHash {
    pub key: String,
}

impl GetHash {
    pub fn new(key: impl Into<String>) -> Self {
        GetHash { key: key.into() }
    }
}

impl Operation for GetHash {
    fn name(&self) -> &'static str {
        "HGETALL"
    }

    fn to_command(&self) -> Option<Vec<String>> {
        Some(vec!["HGETALL".to_string(), self.key.clone()])
    }

    fn apply(&self, keyspace: &mut Keyspace) -> RespValue {
        match keyspace.hash(&self.key) {
            Some(record) => {
                let mut result = Vec::with_capacity(record.len() * 2);
                for (field, value) in record {
                    result.push(RespValue::bulk_string(field.clone()));
                    result.push(RespValue::bulk_string(value.clone()));
                }
                RespValue::array(result)
            }
            None => RespValue::array(vec![]),
        }
    }

    fn decode(&self, reply: RespValue) -> Result<OpResult> {
        let items = match reply {
            RespValue::Array(items) => items,
            RespValue::Null => return Ok(OpResult::Hash(None)),
            other => {
                return Err(StoreError::Parse(format!(
                    "unexpected reply {} for HGETALL",
                    other
                )))
            }
        };

        if items.is_empty() {
            return Ok(OpResult::Hash(None));
        }

        if items.len() % 2 != 0 {
            return Err(StoreError::Parse(format!(
                "hash '{}' decoded to an odd number of elements ({})",
                self.key,
                items.len()
            )));
        }

        let mut record = HashRecord::new();
        for pair in items.chunks(2) {
            record.insert(pair[0].to_text()?, pair[1].to_text()?);
        }
        Ok(OpResult::Hash(Some(record)))
    }
}

/// Merge fields into the hash stored at key
///
/// Wire: HSET key field value [field value ...]
///
/// An empty field set never reaches the backend (Redis rejects it) and is
/// acknowledged locally.
#[derive(Debug, Clone, PartialEq)]
pub struct SetHash {
    pub key: String,
    pub fields: HashRecord,
}

impl SetHash {
    pub fn new(key: impl Into<String>, fields: HashRecord) -> Self {
        SetHash {
            key: key.into(),
            fields,
        }
    }

    /// Build from any field values, coercing each value to a string
    pub fn from_fields<I, K, V>(key: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        let fields = fields
            .into_iter()
            .map(|(k, v)| (k.into(), v.to_string()))
            .collect();
        SetHash::new(key, fields)
    }
}

impl Operation for SetHash {
    fn name(&self) -> &'static str {
        "HSET"
    }

    fn to_command(&self) -> Option<Vec<String>> {
        if self.fields.is_empty() {
            return None;
        }
        let mut parts = Vec::with_capacity(2 + self.fields.len() * 2);
        parts.push("HSET".to_string());
        parts.push(self.key.clone());
        for (field, value) in &self.fields {
            parts.push(field.clone());
            parts.push(value.clone());
        }
        Some(parts)
    }

    fn apply(&self, keyspace: &mut Keyspace) -> RespValue {
        if self.fields.is_empty() {
            return self.local_reply();
        }
        let record = keyspace.hash_mut(&self.key);
        let mut added = 0;
        for (field, value) in &self.fields {
            if record.insert(field.clone(), value.clone()).is_none() {
                added += 1;
            }
        }
        RespValue::integer(added)
    }

    fn decode(&self, reply: RespValue) -> Result<OpResult> {
        // HSET answers with the number of new fields, HMSET and the local
        // acknowledgement with OK.
        match reply {
            RespValue::Integer(_) => Ok(OpResult::Ack),
            RespValue::SimpleString(ref s) if s == "OK" => Ok(OpResult::Ack),
            RespValue::BulkString(ref b) if b.as_ref() == b"OK" => Ok(OpResult::Ack),
            other => Err(StoreError::Parse(format!(
                "unexpected reply {} for HSET",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hset_then_hgetall() {
        let mut keyspace = Keyspace::new();
        let set = SetHash::from_fields("chat:1", [("title", "hello"), ("userId", "u1")]);
        assert_eq!(set.apply(&mut keyspace), RespValue::integer(2));

        let get = GetHash::new("chat:1");
        let reply = get.apply(&mut keyspace);
        let record = get.decode(reply).unwrap().into_hash().unwrap().unwrap();
        assert_eq!(record.get("title").unwrap(), "hello");
        assert_eq!(record.get("userId").unwrap(), "u1");
    }

    #[test]
    fn test_hset_merges_fields() {
        let mut keyspace = Keyspace::new();
        SetHash::from_fields("h", [("a", "1"), ("b", "2")]).apply(&mut keyspace);
        let reply = SetHash::from_fields("h", [("b", "3"), ("c", "4")]).apply(&mut keyspace);
        // only "c" is new
        assert_eq!(reply, RespValue::integer(1));

        let record = keyspace.hash("h").unwrap();
        assert_eq!(record.len(), 3);
        assert_eq!(record.get("b").unwrap(), "3");
    }

    #[test]
    fn test_values_are_coerced_to_strings() {
        let set = SetHash::from_fields("h", [("count", 42.5)]);
        assert_eq!(set.fields.get("count").unwrap(), "42.5");

        let set = SetHash::from_fields("h", vec![("shared".to_string(), true)]);
        assert_eq!(set.fields.get("shared").unwrap(), "true");
    }

    #[test]
    fn test_empty_set_is_local() {
        let set = SetHash::new("h", HashRecord::new());
        assert_eq!(set.to_command(), None);
        assert_eq!(set.decode(set.local_reply()).unwrap(), OpResult::Ack);
    }

    #[test]
    fn test_hgetall_missing_key_is_none() {
        let mut keyspace = Keyspace::new();
        let get = GetHash::new("missing");
        let reply = get.apply(&mut keyspace);
        assert_eq!(reply, RespValue::array(vec![]));
        assert_eq!(get.decode(reply).unwrap(), OpResult::Hash(None));
        assert_eq!(get.decode(RespValue::Null).unwrap(), OpResult::Hash(None));
    }

    #[test]
    fn test_hgetall_odd_reply_is_parse_error() {
        let get = GetHash::new("h");
        let reply = RespValue::array(vec![
            RespValue::bulk_string("a"),
            RespValue::bulk_string("1"),
            RespValue::bulk_string("b"),
        ]);
        assert!(matches!(get.decode(reply), Err(StoreError::Parse(_))));
    }

    #[test]
    fn test_hset_decodes_ok_and_integer() {
        let set = SetHash::from_fields("h", [("a", "1")]);
        assert_eq!(set.decode(RespValue::integer(0)).unwrap(), OpResult::Ack);
        assert_eq!(set.decode(RespValue::bulk_string("OK")).unwrap(), OpResult::Ack);
        assert!(set.decode(RespValue::Null).is_err());
    }
}
