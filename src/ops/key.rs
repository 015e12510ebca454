//! Key operations (DEL)

use super::{decode_flag, OpResult, Operation};
use crate::error::Result;
use crate::protocol::RespValue;
use crate::store::Keyspace;

/// Delete a key, whatever it holds
///
/// Wire: DEL key
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteKey {
    pub key: String,
}

impl DeleteKey {
    pub fn new(key: impl Into<String>) -> Self {
        DeleteKey { key: key.into() }
    }
}

impl Operation for DeleteKey {
    fn name(&self) -> &'static str {
        "DEL"
    }

    fn to_command(&self) -> Option<Vec<String>> {
        Some(vec!["DEL".to_string(), self.key.clone()])
    }

    fn apply(&self, keyspace: &mut Keyspace) -> RespValue {
        // the keyspace drops both the hash and the sorted set
        RespValue::integer(keyspace.remove(&self.key) as i64)
    }

    fn decode(&self, reply: RespValue) -> Result<OpResult> {
        decode_flag("DEL", reply).map(OpResult::Deleted)
    }
}
