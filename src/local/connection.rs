//! Connection handling
//!
//! Owns the TCP stream to the local server. Commands are written as one
//! pipelined buffer and exactly as many replies are read back. A background
//! task serializes requests so replies can never interleave.

use crate::config::LocalAddress;
use crate::error::{ConnectionCause, ConnectionError, Result, StoreError};
use crate::protocol::{Parsed, RespEncoder, RespParser, RespValue};
use bytes::BytesMut;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// A batch of commands sent to the connection task
pub(crate) struct Request {
    /// Commands written back to back
    pub commands: Vec<RespValue>,

    /// Channel to send the replies back, one per command
    pub reply_tx: oneshot::Sender<Result<Vec<RespValue>>>,

    /// Stop the task once this request is answered
    pub last: bool,
}

/// Connection to a Redis-compatible server
pub struct Connection {
    /// TCP stream
    stream: TcpStream,

    /// Read buffer
    read_buffer: BytesMut,

    /// Buffered length below which the pending reply cannot be complete
    wanted: usize,

    /// `host:port`, for logs
    peer: String,
}

impl Connection {
    /// Connect, authenticate, select the database and check liveness
    ///
    /// The whole sequence runs under `timeout`. Failures are classified so
    /// the caller can log the precise cause.
    pub async fn open(
        addr: &LocalAddress,
        timeout: Duration,
    ) -> std::result::Result<Connection, ConnectionError> {
        let peer = addr.authority();
        match tokio::time::timeout(timeout, Self::establish(addr)).await {
            Ok(result) => result,
            Err(_) => Err(ConnectionError::new(
                ConnectionCause::Timeout,
                peer,
                format!("no answer within {} ms", timeout.as_millis()),
            )),
        }
    }

    async fn establish(addr: &LocalAddress) -> std::result::Result<Connection, ConnectionError> {
        let peer = addr.authority();

        let candidates: Vec<_> = tokio::net::lookup_host((addr.host.as_str(), addr.port))
            .await
            .map_err(|e| ConnectionError::new(ConnectionCause::HostNotFound, &peer, e.to_string()))?
            .collect();
        if candidates.is_empty() {
            return Err(ConnectionError::new(
                ConnectionCause::HostNotFound,
                peer,
                "name resolved to no address",
            ));
        }

        let mut last_error = None;
        let mut stream = None;
        for candidate in candidates {
            match TcpStream::connect(candidate).await {
                Ok(s) => {
                    stream = Some(s);
                    break;
                }
                Err(e) => {
                    debug!("Connect to {} failed: {}", candidate, e);
                    last_error = Some(e);
                }
            }
        }

        let stream = match (stream, last_error) {
            (Some(stream), _) => stream,
            (None, Some(e)) => return Err(ConnectionError::from_io(peer, &e)),
            (None, None) => {
                return Err(ConnectionError::new(ConnectionCause::Other, peer, "no address tried"))
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Could not set TCP_NODELAY on {}: {}", peer, e);
        }

        let mut connection = Connection {
            stream,
            read_buffer: BytesMut::with_capacity(4096),
            wanted: 0,
            peer,
        };
        connection.handshake(addr).await?;
        Ok(connection)
    }

    async fn handshake(&mut self, addr: &LocalAddress) -> std::result::Result<(), ConnectionError> {
        let mut commands = Vec::new();
        match (&addr.username, &addr.password) {
            (Some(user), Some(password)) => {
                commands.push(RespValue::command(["AUTH", user.as_str(), password.as_str()]))
            }
            (None, Some(password)) => commands.push(RespValue::command(["AUTH", password.as_str()])),
            _ => {}
        }
        if let Some(db) = addr.db {
            commands.push(RespValue::command(["SELECT".to_string(), db.to_string()]));
        }
        commands.push(RespValue::command(["PING"]));

        let replies = self
            .round_trip(&commands)
            .await
            .map_err(|e| ConnectionError::new(ConnectionCause::Other, &self.peer, e.to_string()))?;

        for reply in replies {
            if let RespValue::Error(message) = reply {
                let upper = message.to_uppercase();
                let cause = if upper.contains("NOAUTH")
                    || upper.contains("WRONGPASS")
                    || upper.contains("INVALID PASSWORD")
                    || upper.contains("INVALID USERNAME")
                {
                    ConnectionCause::Unauthorized
                } else {
                    ConnectionCause::Other
                };
                return Err(ConnectionError::new(cause, &self.peer, message));
            }
        }

        info!("Connected to local backend at {}", self.peer);
        Ok(())
    }

    /// Write every command at once, then read one reply per command
    pub async fn round_trip(&mut self, commands: &[RespValue]) -> Result<Vec<RespValue>> {
        let buffer = RespEncoder::encode_pipeline(commands);
        self.stream
            .write_all(&buffer)
            .await
            .map_err(|e| StoreError::Retrieval(format!("write to {} failed: {}", self.peer, e)))?;
        self.stream
            .flush()
            .await
            .map_err(|e| StoreError::Retrieval(format!("flush to {} failed: {}", self.peer, e)))?;

        let mut replies = Vec::with_capacity(commands.len());
        while replies.len() < commands.len() {
            replies.push(self.read_reply().await?);
        }
        Ok(replies)
    }

    async fn read_reply(&mut self) -> Result<RespValue> {
        loop {
            if self.read_buffer.len() >= self.wanted {
                match RespParser::parse_partial(&mut self.read_buffer)? {
                    Parsed::Complete(value) => {
                        self.wanted = 0;
                        debug!("Reply from {}: {}", self.peer, value);
                        return Ok(value);
                    }
                    Parsed::Incomplete(needed) => {
                        self.wanted = needed;
                        self.read_buffer.reserve(needed - self.read_buffer.len());
                    }
                }
            }

            let n = self
                .stream
                .read_buf(&mut self.read_buffer)
                .await
                .map_err(|e| StoreError::Retrieval(format!("read from {} failed: {}", self.peer, e)))?;

            // Connection closed
            if n == 0 {
                return Err(StoreError::Retrieval(format!(
                    "connection closed by {}",
                    self.peer
                )));
            }

            debug!("Read {} bytes", n);
        }
    }

    /// Hand the connection to a background task and return its request channel
    pub(crate) fn spawn(self) -> mpsc::UnboundedSender<Request> {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        tokio::spawn(self.run(request_rx));
        request_tx
    }

    async fn run(mut self, mut request_rx: mpsc::UnboundedReceiver<Request>) {
        while let Some(request) = request_rx.recv().await {
            let result = self.round_trip(&request.commands).await;
            let broken = result.is_err();
            if let Err(ref e) = result {
                warn!("Local backend connection to {} failed: {}", self.peer, e);
            }

            if request.reply_tx.send(result).is_err() {
                debug!("Requester went away before its reply from {}", self.peer);
            }

            // the stream position is unknown after a failure
            if broken || request.last {
                break;
            }
        }
        info!("Connection closed: {}", self.peer);
    }
}
