//! Sorted set operations (ZADD, ZREM, ZRANGE)

use super::{decode_flag, decode_strings, OpResult, Operation};
use crate::error::Result;
use crate::protocol::RespValue;
use crate::store::Keyspace;

/// Add a member or update its score
///
/// Wire: ZADD key score member
#[derive(Debug, Clone, PartialEq)]
pub struct AddToSortedSet {
    pub key: String,
    pub score: f64,
    pub member: String,
}

impl AddToSortedSet {
    pub fn new(key: impl Into<String>, score: f64, member: impl Into<String>) -> Self {
        AddToSortedSet {
            key: key.into(),
            score,
            member: member.into(),
        }
    }
}

impl Operation for AddToSortedSet {
    fn name(&self) -> &'static str {
        "ZADD"
    }

    fn to_command(&self) -> Option<Vec<String>> {
        Some(vec![
            "ZADD".to_string(),
            self.key.clone(),
            self.score.to_string(),
            self.member.clone(),
        ])
    }

    fn apply(&self, keyspace: &mut Keyspace) -> RespValue {
        let inserted = keyspace
            .sorted_set_mut(&self.key)
            .insert(self.member.clone(), self.score);
        RespValue::integer(inserted as i64)
    }

    fn decode(&self, reply: RespValue) -> Result<OpResult> {
        decode_flag("ZADD", reply).map(OpResult::Inserted)
    }
}

/// Remove a member
///
/// Wire: ZREM key member
#[derive(Debug, Clone, PartialEq)]
pub struct RemoveFromSortedSet {
    pub key: String,
    pub member: String,
}

impl RemoveFromSortedSet {
    pub fn new(key: impl Into<String>, member: impl Into<String>) -> Self {
        RemoveFromSortedSet {
            key: key.into(),
            member: member.into(),
        }
    }
}

impl Operation for RemoveFromSortedSet {
    fn name(&self) -> &'static str {
        "ZREM"
    }

    fn to_command(&self) -> Option<Vec<String>> {
        Some(vec![
            "ZREM".to_string(),
            self.key.clone(),
            self.member.clone(),
        ])
    }

    fn apply(&self, keyspace: &mut Keyspace) -> RespValue {
        RespValue::integer(keyspace.remove_member(&self.key, &self.member) as i64)
    }

    fn decode(&self, reply: RespValue) -> Result<OpResult> {
        decode_flag("ZREM", reply).map(OpResult::Removed)
    }
}

/// Slice of members ordered by score
///
/// Wire: ZRANGE key start stop [REV]
///
/// `start` and `stop` are inclusive indexes; negative values count from the
/// end, so `stop = -1` reaches the last member.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeSortedSet {
    pub key: String,
    pub start: i64,
    pub stop: i64,
    pub reverse: bool,
}

impl RangeSortedSet {
    pub fn new(key: impl Into<String>, start: i64, stop: i64, reverse: bool) -> Self {
        RangeSortedSet {
            key: key.into(),
            start,
            stop,
            reverse,
        }
    }
}

impl Operation for RangeSortedSet {
    fn name(&self) -> &'static str {
        "ZRANGE"
    }

    fn to_command(&self) -> Option<Vec<String>> {
        let mut parts = vec![
            "ZRANGE".to_string(),
            self.key.clone(),
            self.start.to_string(),
            self.stop.to_string(),
        ];
        if self.reverse {
            parts.push("REV".to_string());
        }
        Some(parts)
    }

    fn apply(&self, keyspace: &mut Keyspace) -> RespValue {
        let members = keyspace
            .sorted_set(&self.key)
            .map(|set| set.range(self.start, self.stop, self.reverse))
            .unwrap_or_default();
        RespValue::array(members.into_iter().map(RespValue::bulk_string).collect())
    }

    fn decode(&self, reply: RespValue) -> Result<OpResult> {
        decode_strings("ZRANGE", reply).map(OpResult::Members)
    }
}
