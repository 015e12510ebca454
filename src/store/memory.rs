//! In-memory storage implementation
//!
//! The degraded-availability backend: nothing survives the process.

use super::sorted_set::SortedSet;
use crate::ops::{HashRecord, Op};
use crate::protocol::RespValue;
use parking_lot::Mutex;
use siphasher::sip::SipHasher13;
use std::collections::HashMap;
use std::hash::BuildHasherDefault;

/// Type alias for our hash maps with SipHasher
type KeyMap<V> = HashMap<String, V, BuildHasherDefault<SipHasher13>>;

/// The two process-local structures behind the memory backend
///
/// Hash records and sorted sets are kept apart, so one key may hold both.
pub struct Keyspace {
    /// key -> hash record
    hashes: KeyMap<HashRecord>,

    /// key -> (member -> score)
    sorted_sets: KeyMap<SortedSet>,
}

impl Keyspace {
    /// Create a keyspace with default capacity
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Keyspace {
            hashes: HashMap::with_capacity_and_hasher(
                capacity,
                BuildHasherDefault::<SipHasher13>::default(),
            ),
            sorted_sets: HashMap::with_capacity_and_hasher(
                capacity,
                BuildHasherDefault::<SipHasher13>::default(),
            ),
        }
    }

    pub fn hash(&self, key: &str) -> Option<&HashRecord> {
        self.hashes.get(key)
    }

    /// Hash at key, created empty if missing
    pub fn hash_mut(&mut self, key: &str) -> &mut HashRecord {
        self.hashes.entry(key.to_string()).or_default()
    }

    pub fn sorted_set(&self, key: &str) -> Option<&SortedSet> {
        self.sorted_sets.get(key)
    }

    /// Sorted set at key, created empty if missing
    pub fn sorted_set_mut(&mut self, key: &str) -> &mut SortedSet {
        self.sorted_sets.entry(key.to_string()).or_default()
    }

    /// Remove a member; an emptied set disappears like in Redis
    pub fn remove_member(&mut self, key: &str, member: &str) -> bool {
        let (removed, now_empty) = match self.sorted_sets.get_mut(key) {
            Some(set) => (set.remove(member), set.is_empty()),
            None => return false,
        };
        if now_empty {
            self.sorted_sets.remove(key);
        }
        removed
    }

    /// Delete the key from both structures, returns true if either held it
    pub fn remove(&mut self, key: &str) -> bool {
        let had_hash = self.hashes.remove(key).is_some();
        let had_set = self.sorted_sets.remove(key).is_some();
        had_hash || had_set
    }

    /// Number of distinct keys across both structures
    pub fn len(&self) -> usize {
        let shared = self
            .sorted_sets
            .keys()
            .filter(|key| self.hashes.contains_key(*key))
            .count();
        self.hashes.len() + self.sorted_sets.len() - shared
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty() && self.sorted_sets.is_empty()
    }

    pub fn stats(&self) -> KeyspaceStats {
        KeyspaceStats {
            keys: self.len(),
            hashes: self.hashes.len(),
            sorted_sets: self.sorted_sets.len(),
            members: self.sorted_sets.values().map(SortedSet::len).sum(),
        }
    }
}

impl Default for Keyspace {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics about the memory keyspace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyspaceStats {
    pub keys: usize,
    pub hashes: usize,
    pub sorted_sets: usize,
    pub members: usize,
}

/// In-process store
///
/// Every call completes without awaiting. The keyspace sits behind a mutex
/// so the store can be shared across threads; a batch holds the lock for
/// its whole run.
pub struct MemoryStore {
    keyspace: Mutex<Keyspace>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore {
            keyspace: Mutex::new(Keyspace::new()),
        }
    }

    /// Execute one operation and return the Redis-shaped reply
    pub fn apply(&self, op: &Op) -> RespValue {
        op.apply(&mut self.keyspace.lock())
    }

    /// Execute operations in order under a single lock
    pub fn apply_all(&self, ops: &[Op]) -> Vec<RespValue> {
        let mut keyspace = self.keyspace.lock();
        ops.iter().map(|op| op.apply(&mut keyspace)).collect()
    }

    pub fn stats(&self) -> KeyspaceStats {
        self.keyspace.lock().stats()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}
