//! chatstore - persistence layer for chat history
//!
//! One store contract (hash records, sorted sets, pipelined batches) served
//! by three interchangeable backends:
//! - a REST-addressable key-value service,
//! - a Redis-compatible server over a TCP socket,
//! - an in-process fallback used whenever the others are unavailable.
//!
//! Each module has a single responsibility; backends share the operation
//! definitions in [`ops`] so callers observe the same results everywhere.

pub mod config;
pub mod context;
pub mod error;
pub mod local;
pub mod ops;
pub mod protocol;
pub mod remote;
pub mod store;

/// Re-export commonly used types
pub use config::{BackendKind, StoreConfig};
pub use context::{global, LifecycleState, StoreContext};
pub use error::{ConnectionCause, ConnectionError, Result, StoreError};
pub use ops::{HashRecord, Op, OpResult};
pub use protocol::{RespError, RespValue};
pub use store::{MemoryStore, PipelineBatch, Store};
