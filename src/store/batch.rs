//! Pipelined batches
//!
//! A batch is an ordered list of queued operations. Executing it consumes
//! the batch, so running the same batch twice does not compile. Results come
//! back in enqueue order.

use super::Store;
use crate::error::{Result, StoreError};
use crate::ops::{
    AddToSortedSet, DeleteKey, GetHash, Op, OpResult, RangeSortedSet, RemoveFromSortedSet,
    SetHash,
};
use crate::protocol::RespValue;
use tracing::debug;

/// Operations queued against one store
#[must_use = "a batch does nothing until `execute` is awaited"]
pub struct PipelineBatch<'a> {
    store: &'a Store,
    ops: Vec<Op>,
}

impl<'a> PipelineBatch<'a> {
    pub(crate) fn new(store: &'a Store) -> Self {
        PipelineBatch {
            store,
            ops: Vec::new(),
        }
    }

    pub fn get_hash(mut self, key: impl Into<String>) -> Self {
        self.ops.push(Op::GetHash(GetHash::new(key)));
        self
    }

    /// Queue a field merge; values are coerced to strings
    pub fn set_hash<I, K, V>(mut self, key: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        self.ops.push(Op::SetHash(SetHash::from_fields(key, fields)));
        self
    }

    pub fn add_to_sorted_set(
        mut self,
        key: impl Into<String>,
        score: f64,
        member: impl Into<String>,
    ) -> Self {
        self.ops
            .push(Op::AddToSortedSet(AddToSortedSet::new(key, score, member)));
        self
    }

    pub fn remove_from_sorted_set(
        mut self,
        key: impl Into<String>,
        member: impl Into<String>,
    ) -> Self {
        self.ops
            .push(Op::RemoveFromSortedSet(RemoveFromSortedSet::new(key, member)));
        self
    }

    pub fn range_sorted_set(
        mut self,
        key: impl Into<String>,
        start: i64,
        stop: i64,
        reverse: bool,
    ) -> Self {
        self.ops
            .push(Op::RangeSortedSet(RangeSortedSet::new(key, start, stop, reverse)));
        self
    }

    pub fn delete_key(mut self, key: impl Into<String>) -> Self {
        self.ops.push(Op::DeleteKey(DeleteKey::new(key)));
        self
    }

    /// Queue an already built operation
    pub fn push(mut self, op: Op) -> Self {
        self.ops.push(op);
        self
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Run every queued operation, returning results in enqueue order
    ///
    /// Transports send the whole batch in one round trip. This is not a
    /// transaction: if one operation fails, the ones before it stay applied
    /// and the error reports their results.
    pub async fn execute(self) -> Result<Vec<OpResult>> {
        if self.ops.is_empty() {
            return Ok(Vec::new());
        }

        // nothing is sent if a score is unusable
        for (index, op) in self.ops.iter().enumerate() {
            if let Op::AddToSortedSet(add) = op {
                if add.score.is_nan() {
                    return Err(StoreError::Batch {
                        index,
                        operation: op.name(),
                        source: Box::new(StoreError::InvalidScore(add.score)),
                        completed: Vec::new(),
                    });
                }
            }
        }

        debug!(
            "Executing batch of {} operation(s) on the {} backend",
            self.ops.len(),
            self.store.kind()
        );

        let replies = match self.store.replies_for(&self.ops).await {
            Ok(replies) => replies,
            Err(e) => {
                return Err(StoreError::Batch {
                    index: 0,
                    operation: self.ops[0].name(),
                    source: Box::new(e),
                    completed: Vec::new(),
                })
            }
        };

        decode_replies(&self.ops, replies)
    }
}

/// Decode replies position by position, stopping at the first failure
pub(crate) fn decode_replies(ops: &[Op], replies: Vec<RespValue>) -> Result<Vec<OpResult>> {
    let mut completed = Vec::with_capacity(ops.len());
    for (index, (op, reply)) in ops.iter().zip(replies).enumerate() {
        match op.decode(reply) {
            Ok(result) => completed.push(result),
            Err(e) => {
                return Err(StoreError::Batch {
                    index,
                    operation: op.name(),
                    source: Box::new(e),
                    completed,
                })
            }
        }
    }
    Ok(completed)
}

/// Wire commands of the operations that need the backend
pub(crate) fn wire_commands(ops: &[Op]) -> Vec<Vec<String>> {
    ops.iter().filter_map(Op::to_command).collect()
}

/// Put wire replies back in place, filling locally answered operations
pub(crate) fn merge_replies(ops: &[Op], wire: Vec<RespValue>) -> Result<Vec<RespValue>> {
    let mut wire = wire.into_iter();
    ops.iter()
        .map(|op| match op.to_command() {
            Some(_) => wire.next().ok_or_else(|| {
                StoreError::Parse(format!("missing reply for {}", op.name()))
            }),
            None => Ok(op.local_reply()),
        })
        .collect()
}
