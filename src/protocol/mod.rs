//! RESP2 protocol implementation
//!
//! Encodes commands and parses replies for the socket backend.
//! It is completely independent from other modules (loose coupling).

mod types;
mod resp;

pub use types::{RespValue, RespError};
pub use resp::{Parsed, RespParser, RespEncoder, MAX_BULK_LEN};
