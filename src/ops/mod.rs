//! Store operations
//!
//! Every operation the store contract exposes is described once here:
//! - the wire command sent to Redis-compatible backends,
//! - how the in-process keyspace executes it,
//! - how a reply is decoded into a typed [`OpResult`].
//!
//! All three backends go through the same decoders, so a caller sees the same
//! return encodings whichever backend is active. Each operation family lives
//! in its own file for high cohesion.

mod hash;
mod key;
mod sorted_set;

pub use hash::{GetHash, SetHash};
pub use key::DeleteKey;
pub use sorted_set::{AddToSortedSet, RangeSortedSet, RemoveFromSortedSet};

use crate::error::{Result, StoreError};
use crate::protocol::RespValue;
use crate::store::Keyspace;
use std::collections::BTreeMap;

/// Field name to string value
pub type HashRecord = BTreeMap<String, String>;

/// Behaviour shared by every store operation
pub trait Operation {
    /// Wire command name (for logging and error reports)
    fn name(&self) -> &'static str;

    /// Command to send to a Redis-compatible backend
    ///
    /// `None` means the operation is answered without contacting the
    /// backend, see [`Operation::local_reply`].
    fn to_command(&self) -> Option<Vec<String>>;

    /// Reply used when [`Operation::to_command`] returns `None`
    fn local_reply(&self) -> RespValue {
        RespValue::simple_string("OK")
    }

    /// Execute against the in-process keyspace, producing a Redis-shaped reply
    fn apply(&self, keyspace: &mut Keyspace) -> RespValue;

    /// Decode a backend reply into a typed result
    fn decode(&self, reply: RespValue) -> Result<OpResult>;
}

/// Typed result of one operation
#[derive(Debug, Clone, PartialEq)]
pub enum OpResult {
    /// Result of `get_hash`: `None` when the key holds no hash
    Hash(Option<HashRecord>),
    /// Result of `set_hash`
    Ack,
    /// Result of `add_to_sorted_set`: true on first insertion
    Inserted(bool),
    /// Result of `remove_from_sorted_set`
    Removed(bool),
    /// Result of `range_sorted_set`
    Members(Vec<String>),
    /// Result of `delete_key`: true if the key existed
    Deleted(bool),
}

impl OpResult {
    pub fn into_hash(self) -> Result<Option<HashRecord>> {
        match self {
            OpResult::Hash(record) => Ok(record),
            other => Err(unexpected_result("hash", other)),
        }
    }

    pub fn into_ack(self) -> Result<()> {
        match self {
            OpResult::Ack => Ok(()),
            other => Err(unexpected_result("ack", other)),
        }
    }

    pub fn into_inserted(self) -> Result<bool> {
        match self {
            OpResult::Inserted(flag) => Ok(flag),
            other => Err(unexpected_result("inserted flag", other)),
        }
    }

    pub fn into_removed(self) -> Result<bool> {
        match self {
            OpResult::Removed(flag) => Ok(flag),
            other => Err(unexpected_result("removed flag", other)),
        }
    }

    pub fn into_members(self) -> Result<Vec<String>> {
        match self {
            OpResult::Members(members) => Ok(members),
            other => Err(unexpected_result("member list", other)),
        }
    }

    pub fn into_deleted(self) -> Result<bool> {
        match self {
            OpResult::Deleted(flag) => Ok(flag),
            other => Err(unexpected_result("deleted flag", other)),
        }
    }
}

fn unexpected_result(expected: &str, got: OpResult) -> StoreError {
    StoreError::Parse(format!("expected {} result, got {:?}", expected, got))
}

/// One queued or direct store operation
///
/// A closed set: backends match on this enum instead of inspecting types at
/// call time.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    GetHash(GetHash),
    SetHash(SetHash),
    AddToSortedSet(AddToSortedSet),
    RemoveFromSortedSet(RemoveFromSortedSet),
    RangeSortedSet(RangeSortedSet),
    DeleteKey(DeleteKey),
}

impl Op {
    fn inner(&self) -> &dyn Operation {
        match self {
            Op::GetHash(op) => op,
            Op::SetHash(op) => op,
            Op::AddToSortedSet(op) => op,
            Op::RemoveFromSortedSet(op) => op,
            Op::RangeSortedSet(op) => op,
            Op::DeleteKey(op) => op,
        }
    }

    pub fn name(&self) -> &'static str {
        self.inner().name()
    }

    pub fn to_command(&self) -> Option<Vec<String>> {
        self.inner().to_command()
    }

    pub fn local_reply(&self) -> RespValue {
        self.inner().local_reply()
    }

    pub fn apply(&self, keyspace: &mut Keyspace) -> RespValue {
        self.inner().apply(keyspace)
    }

    pub fn decode(&self, reply: RespValue) -> Result<OpResult> {
        if let RespValue::Error(message) = reply {
            return Err(StoreError::Command(message));
        }
        self.inner().decode(reply)
    }

    /// Parse a textual command (`HSET key field value ...`) into an operation
    ///
    /// Accepts the commands the store itself emits: HGETALL, HSET/HMSET,
    /// ZADD, ZREM, ZRANGE (with optional REV) and DEL, each on a single key.
    /// Errors use the Redis error wording.
    pub fn parse(args: &[String]) -> Result<Op> {
        let name = match args.first() {
            Some(name) => name.to_uppercase(),
            None => return Err(StoreError::Command("ERR empty command".to_string())),
        };
        let rest = &args[1..];

        match name.as_str() {
            "HGETALL" => {
                expect_args(&name, rest, |n| n == 1)?;
                Ok(Op::GetHash(GetHash::new(&rest[0])))
            }
            "HSET" | "HMSET" => {
                expect_args(&name, rest, |n| n >= 3 && n % 2 == 1)?;
                let fields = rest[1..]
                    .chunks(2)
                    .map(|pair| (pair[0].clone(), pair[1].clone()))
                    .collect();
                Ok(Op::SetHash(SetHash::new(&rest[0], fields)))
            }
            "ZADD" => {
                expect_args(&name, rest, |n| n == 3)?;
                let score = parse_score(&rest[1])?;
                Ok(Op::AddToSortedSet(AddToSortedSet::new(&rest[0], score, &rest[2])))
            }
            "ZREM" => {
                expect_args(&name, rest, |n| n == 2)?;
                Ok(Op::RemoveFromSortedSet(RemoveFromSortedSet::new(&rest[0], &rest[1])))
            }
            "ZRANGE" => {
                expect_args(&name, rest, |n| n == 3 || n == 4)?;
                let start = parse_index(&rest[1])?;
                let stop = parse_index(&rest[2])?;
                let reverse = match rest.get(3) {
                    Some(flag) if flag.eq_ignore_ascii_case("REV") => true,
                    Some(_) => return Err(StoreError::Command("ERR syntax error".to_string())),
                    None => false,
                };
                Ok(Op::RangeSortedSet(RangeSortedSet::new(&rest[0], start, stop, reverse)))
            }
            "DEL" => {
                expect_args(&name, rest, |n| n == 1)?;
                Ok(Op::DeleteKey(DeleteKey::new(&rest[0])))
            }
            _ => Err(StoreError::Command(format!("ERR unknown command '{}'", args[0]))),
        }
    }
}

fn expect_args(name: &str, rest: &[String], valid: impl Fn(usize) -> bool) -> Result<()> {
    if valid(rest.len()) {
        Ok(())
    } else {
        Err(StoreError::Command(format!(
            "ERR wrong number of arguments for '{}' command",
            name.to_lowercase()
        )))
    }
}

/// Parse a score the way Redis does (`inf`, `-inf`, decimals); NaN is refused
pub(crate) fn parse_score(raw: &str) -> Result<f64> {
    match raw.parse::<f64>() {
        Ok(score) if !score.is_nan() => Ok(score),
        _ => Err(StoreError::Command("ERR value is not a valid float".to_string())),
    }
}

fn parse_index(raw: &str) -> Result<i64> {
    raw.parse::<i64>().map_err(|_| {
        StoreError::Command("ERR value is not an integer or out of range".to_string())
    })
}

/// Decode an integer reply used as a 0/1 flag
pub(crate) fn decode_flag(op: &'static str, reply: RespValue) -> Result<bool> {
    match reply {
        RespValue::Integer(n) => Ok(n > 0),
        other => Err(StoreError::Parse(format!(
            "unexpected reply {} for {}",
            other, op
        ))),
    }
}

/// Decode an array of strings; a null reply is an empty list
pub(crate) fn decode_strings(op: &'static str, reply: RespValue) -> Result<Vec<String>> {
    match reply {
        RespValue::Array(items) => items
            .iter()
            .map(|item| item.to_text().map_err(StoreError::from))
            .collect(),
        RespValue::Null => Ok(Vec::new()),
        other => Err(StoreError::Parse(format!(
            "unexpected reply {} for {}",
            other, op
        ))),
    }
}
