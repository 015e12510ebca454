//! Store module
//!
//! [`Store`] is the one interface callers see. It is a closed set of backend
//! variants; every contract method builds an [`Op`] and dispatches on the
//! variant, so all backends share the same decoding and return encodings.

mod batch;
mod memory;
mod sorted_set;
mod typed;

pub use batch::PipelineBatch;
pub use memory::{Keyspace, KeyspaceStats, MemoryStore};
pub use sorted_set::SortedSet;
pub use typed::{from_record, to_record};

use crate::config::BackendKind;
use crate::error::{Result, StoreError};
use crate::local::LocalStore;
use crate::ops::{
    AddToSortedSet, DeleteKey, GetHash, HashRecord, Op, OpResult, RangeSortedSet,
    RemoveFromSortedSet, SetHash,
};
use crate::protocol::RespValue;
use crate::remote::RemoteStore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

/// A resolved store
pub enum Store {
    /// REST service
    Remote(RemoteStore),
    /// Redis-compatible server over TCP
    Local(LocalStore),
    /// In-process fallback
    Memory(MemoryStore),
}

impl Store {
    pub fn kind(&self) -> BackendKind {
        match self {
            Store::Remote(_) => BackendKind::Remote,
            Store::Local(_) => BackendKind::Local,
            Store::Memory(_) => BackendKind::Memory,
        }
    }

    /// Statistics of the in-process backend, `None` for transports
    pub fn memory_stats(&self) -> Option<KeyspaceStats> {
        match self {
            Store::Memory(memory) => Some(memory.stats()),
            _ => None,
        }
    }

    /// Run a single operation and decode its reply
    pub async fn execute(&self, op: &Op) -> Result<OpResult> {
        if let Op::AddToSortedSet(add) = op {
            if add.score.is_nan() {
                return Err(StoreError::InvalidScore(add.score));
            }
        }

        let reply = match self {
            Store::Memory(memory) => memory.apply(op),
            Store::Remote(remote) => match op.to_command() {
                Some(command) => remote.command(command).await?,
                None => op.local_reply(),
            },
            Store::Local(local) => match op.to_command() {
                Some(command) => local.command(command).await?,
                None => op.local_reply(),
            },
        };
        op.decode(reply)
    }

    /// Raw replies for a batch, one per operation, in order
    pub(crate) async fn replies_for(&self, ops: &[Op]) -> Result<Vec<RespValue>> {
        let wire = match self {
            Store::Memory(memory) => return Ok(memory.apply_all(ops)),
            Store::Remote(remote) => {
                let commands = batch::wire_commands(ops);
                if commands.is_empty() {
                    Vec::new()
                } else {
                    remote.pipeline(commands).await?
                }
            }
            Store::Local(local) => {
                let commands = batch::wire_commands(ops);
                if commands.is_empty() {
                    Vec::new()
                } else {
                    local.pipeline(commands).await?
                }
            }
        };
        batch::merge_replies(ops, wire)
    }

    /// All fields of the hash at `key`, `None` if it is absent or empty
    pub async fn get_hash(&self, key: &str) -> Result<Option<HashRecord>> {
        self.execute(&Op::GetHash(GetHash::new(key)))
            .await?
            .into_hash()
    }

    /// Merge `fields` into the hash at `key`
    ///
    /// Values are stored as their string rendering. An empty field set is
    /// acknowledged without contacting the backend.
    pub async fn set_hash<I, K, V>(&self, key: &str, fields: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        self.execute(&Op::SetHash(SetHash::from_fields(key, fields)))
            .await?
            .into_ack()
    }

    /// Add `member` with `score`; true if it was not already present
    pub async fn add_to_sorted_set(&self, key: &str, score: f64, member: &str) -> Result<bool> {
        self.execute(&Op::AddToSortedSet(AddToSortedSet::new(key, score, member)))
            .await?
            .into_inserted()
    }

    pub async fn remove_from_sorted_set(&self, key: &str, member: &str) -> Result<bool> {
        self.execute(&Op::RemoveFromSortedSet(RemoveFromSortedSet::new(key, member)))
            .await?
            .into_removed()
    }

    /// Members between `start` and `stop` inclusive, Redis index rules
    pub async fn range_sorted_set(
        &self,
        key: &str,
        start: i64,
        stop: i64,
        reverse: bool,
    ) -> Result<Vec<String>> {
        self.execute(&Op::RangeSortedSet(RangeSortedSet::new(key, start, stop, reverse)))
            .await?
            .into_members()
    }

    /// Remove the key whatever it holds; true if it existed
    pub async fn delete_key(&self, key: &str) -> Result<bool> {
        self.execute(&Op::DeleteKey(DeleteKey::new(key)))
            .await?
            .into_deleted()
    }

    pub fn create_batch(&self) -> PipelineBatch<'_> {
        PipelineBatch::new(self)
    }

    /// Store a serializable struct as a hash
    pub async fn set_hash_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let record = to_record(value)?;
        self.set_hash(key, record).await
    }

    /// Read a hash back into a struct
    pub async fn get_hash_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get_hash(key).await? {
            Some(record) => from_record(&record).map(Some),
            None => Ok(None),
        }
    }

    /// Release the backend's resources
    ///
    /// Idempotent. Only the local backend holds a connection.
    pub async fn close(&self) -> Result<()> {
        debug!("Closing {} backend", self.kind());
        match self {
            Store::Local(local) => local.close().await,
            Store::Remote(_) | Store::Memory(_) => Ok(()),
        }
    }
}

impl From<MemoryStore> for Store {
    fn from(memory: MemoryStore) -> Self {
        Store::Memory(memory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tokio_test::{assert_err, assert_ok};

    fn memory() -> Store {
        Store::from(MemoryStore::new())
    }

    #[tokio::test]
    async fn test_hash_roundtrip_coerces_values() {
        let store = memory();
        store
            .set_hash("chat:1", [("title", "Hello".to_string()), ("createdAt", 1700000000.to_string())])
            .await
            .unwrap();
        store.set_hash("chat:1", [("pinned", true)]).await.unwrap();

        let record = store.get_hash("chat:1").await.unwrap().unwrap();
        assert_eq!(record.get("title").unwrap(), "Hello");
        assert_eq!(record.get("createdAt").unwrap(), "1700000000");
        assert_eq!(record.get("pinned").unwrap(), "true");

        assert_eq!(store.get_hash("chat:missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_empty_set_hash_is_noop() {
        let store = memory();
        store
            .set_hash("chat:1", Vec::<(String, String)>::new())
            .await
            .unwrap();
        assert_eq!(store.get_hash("chat:1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_sorted_set_contract() {
        let store = memory();
        assert!(store.add_to_sorted_set("user:1:chats", 2.0, "b").await.unwrap());
        assert!(store.add_to_sorted_set("user:1:chats", 1.0, "a").await.unwrap());
        assert!(store.add_to_sorted_set("user:1:chats", 3.0, "c").await.unwrap());
        assert!(!store.add_to_sorted_set("user:1:chats", 0.5, "c").await.unwrap());

        assert_eq!(
            store.range_sorted_set("user:1:chats", 0, -1, false).await.unwrap(),
            vec!["c", "a", "b"]
        );
        assert_eq!(
            store.range_sorted_set("user:1:chats", 0, 1, true).await.unwrap(),
            vec!["b", "a"]
        );

        assert!(store.remove_from_sorted_set("user:1:chats", "a").await.unwrap());
        assert!(!store.remove_from_sorted_set("user:1:chats", "a").await.unwrap());
        assert!(store.delete_key("user:1:chats").await.unwrap());
        assert!(!store.delete_key("user:1:chats").await.unwrap());
        assert!(store
            .range_sorted_set("user:1:chats", 0, -1, false)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_nan_score_is_rejected() {
        let store = memory();
        let err = assert_err!(store.add_to_sorted_set("k", f64::NAN, "m").await);
        assert!(matches!(err, StoreError::InvalidScore(_)));
        assert!(store.range_sorted_set("k", 0, -1, false).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_batch_results_follow_enqueue_order() {
        let store = memory();
        let results = store
            .create_batch()
            .set_hash("k", [("a", "1")])
            .add_to_sorted_set("k", 1.0, "m")
            .get_hash("k")
            .execute()
            .await
            .unwrap();

        let mut expected = HashRecord::new();
        expected.insert("a".to_string(), "1".to_string());
        assert_eq!(
            results,
            vec![
                OpResult::Ack,
                OpResult::Inserted(true),
                OpResult::Hash(Some(expected)),
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let store = memory();
        let batch = store.create_batch();
        assert!(batch.is_empty());
        assert!(batch.execute().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_batch_with_nan_runs_nothing() {
        let store = memory();
        let result = store
            .create_batch()
            .set_hash("k", [("a", "1")])
            .add_to_sorted_set("k", f64::NAN, "m")
            .execute()
            .await;

        match result {
            Err(StoreError::Batch { index, operation, .. }) => {
                assert_eq!(index, 1);
                assert_eq!(operation, "ZADD");
            }
            other => panic!("expected a batch error, got {:?}", other),
        }
        assert_eq!(store.get_hash("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete_key_clears_both_structures() {
        let store = memory();
        let results = store
            .create_batch()
            .set_hash("k", [("a", "1")])
            .add_to_sorted_set("k", 1.0, "m")
            .delete_key("k")
            .get_hash("k")
            .range_sorted_set("k", 0, -1, false)
            .execute()
            .await
            .unwrap();

        assert_eq!(results[2], OpResult::Deleted(true));
        assert_eq!(results[3], OpResult::Hash(None));
        assert_eq!(results[4], OpResult::Members(Vec::new()));
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Chat {
        id: String,
        title: String,
        created_at: u64,
        shared: bool,
    }

    #[tokio::test]
    async fn test_json_helpers() {
        let store = memory();
        let chat = Chat {
            id: "1".to_string(),
            title: "42".to_string(),
            created_at: 1700000000,
            shared: false,
        };
        store.set_hash_json("chat:1", &chat).await.unwrap();

        let record = store.get_hash("chat:1").await.unwrap().unwrap();
        assert_eq!(record.get("created_at").unwrap(), "1700000000");

        let back: Chat = store.get_hash_json("chat:1").await.unwrap().unwrap();
        assert_eq!(back, chat);
        assert_eq!(store.get_hash_json::<Chat>("chat:2").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let store = memory();
        assert_ok!(store.close().await);
        assert_ok!(store.close().await);
        assert_eq!(store.kind(), BackendKind::Memory);
    }
}
