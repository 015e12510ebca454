//! Local socket backend
//!
//! Talks RESP2 over TCP to a Redis-compatible server. One connection is
//! established when the store is built and kept for its whole life; requests
//! are ordered by the connection task, not by a lock at this layer.

mod connection;

pub use connection::Connection;

use crate::config::{LocalAddress, StoreConfig};
use crate::error::{ConnectionError, Result, StoreError};
use crate::protocol::RespValue;
use connection::Request;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

/// Store backed by a local Redis-compatible server
pub struct LocalStore {
    /// Requests to the connection task
    requests: mpsc::UnboundedSender<Request>,

    /// Set once `close` has run
    closed: AtomicBool,

    /// `host:port`, for logs and errors
    peer: String,
}

impl LocalStore {
    /// Connect using the local URL and timeout of `config`
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let addr = LocalAddress::parse(&config.local_url)?;
        Self::connect_to(&addr, config).await.map_err(StoreError::from)
    }

    async fn connect_to(
        addr: &LocalAddress,
        config: &StoreConfig,
    ) -> std::result::Result<Self, ConnectionError> {
        let connection = Connection::open(addr, config.connect_timeout()).await?;
        Ok(LocalStore {
            requests: connection.spawn(),
            closed: AtomicBool::new(false),
            peer: addr.authority(),
        })
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Send one command and wait for its reply
    pub async fn command(&self, parts: Vec<String>) -> Result<RespValue> {
        let mut replies = self.pipeline(vec![parts]).await?;
        replies
            .pop()
            .ok_or_else(|| StoreError::Retrieval(format!("no reply from {}", self.peer)))
    }

    /// Send several commands in one write and collect their replies in order
    pub async fn pipeline(&self, commands: Vec<Vec<String>>) -> Result<Vec<RespValue>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }
        debug!("Pipelining {} command(s) to {}", commands.len(), self.peer);
        self.submit(commands.into_iter().map(RespValue::command).collect(), false)
            .await
    }

    async fn submit(&self, commands: Vec<RespValue>, last: bool) -> Result<Vec<RespValue>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.requests
            .send(Request {
                commands,
                reply_tx,
                last,
            })
            .map_err(|_| self.lost())?;
        reply_rx.await.map_err(|_| self.lost())?
    }

    fn lost(&self) -> StoreError {
        if self.closed.load(Ordering::Acquire) {
            StoreError::Closed
        } else {
            StoreError::Retrieval(format!("connection to {} is gone", self.peer))
        }
    }

    /// Send QUIT and stop the connection task
    ///
    /// Idempotent: only the first call talks to the server.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        match self.submit(vec![RespValue::command(["QUIT"])], true).await {
            Ok(_) => info!("Closed local backend connection to {}", self.peer),
            // the connection may already be gone, which is what close wants
            Err(e) => debug!("QUIT to {} not acknowledged: {}", self.peer, e),
        }
        Ok(())
    }
}
