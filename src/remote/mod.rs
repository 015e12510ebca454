//! Remote REST backend
//!
//! Every call is an independent HTTP request; nothing but the (cloneable,
//! internally pooled) HTTP client is kept between calls, so concurrent
//! callers never contend at this layer.

mod reply;

pub use reply::{encode_string, entry_to_resp, json_to_resp, pipeline_to_resp};

use crate::error::{ConnectionCause, ConnectionError, Result, StoreError};
use crate::protocol::RespValue;
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

/// Header asking the service to base64-encode result strings
const ENCODING_HEADER: &str = "Upstash-Encoding";

/// Store backed by a REST-addressable key-value service
#[derive(Clone)]
pub struct RemoteStore {
    http: reqwest::Client,

    /// Base URL without trailing slash
    url: String,

    token: String,
}

impl RemoteStore {
    /// Build a client for `url` authenticated by `token`
    ///
    /// No request is made here; see [`RemoteStore::ping`].
    pub fn new(url: &str, token: &str) -> Result<Self> {
        let url = url.trim().trim_end_matches('/');
        let token = token.trim();

        if url.is_empty() || token.is_empty() {
            return Err(StoreError::Configuration(
                "remote backend needs both a URL and a token".to_string(),
            ));
        }

        let parsed = reqwest::Url::parse(url)
            .map_err(|e| StoreError::Configuration(format!("invalid remote URL '{}': {}", url, e)))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(StoreError::Configuration(format!(
                "unsupported scheme '{}' in remote URL",
                parsed.scheme()
            )));
        }

        let http = reqwest::Client::builder()
            .user_agent(concat!("chatstore/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| StoreError::Configuration(format!("cannot build HTTP client: {}", e)))?;

        Ok(RemoteStore {
            http,
            url: url.to_string(),
            token: token.to_string(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Check that the service answers and accepts the token
    pub async fn ping(&self) -> std::result::Result<(), ConnectionError> {
        match self.command(vec!["PING".to_string()]).await {
            Ok(RespValue::BulkString(b)) if b.as_ref() == b"PONG" => Ok(()),
            Ok(RespValue::SimpleString(s)) if s == "PONG" => Ok(()),
            Ok(RespValue::Error(message)) => {
                Err(ConnectionError::new(ConnectionCause::Other, &self.url, message))
            }
            Ok(other) => Err(ConnectionError::new(
                ConnectionCause::Other,
                &self.url,
                format!("unexpected PING reply {}", other),
            )),
            Err(StoreError::Connection(e)) => Err(e),
            Err(e) => Err(ConnectionError::new(ConnectionCause::Other, &self.url, e.to_string())),
        }
    }

    /// Send one command: `POST {url}` with `["CMD", "arg", ...]`
    pub async fn command(&self, parts: Vec<String>) -> Result<RespValue> {
        debug!("Sending {} to {}", parts.first().map(String::as_str).unwrap_or(""), self.url);
        let reply = self.post("", &parts).await?;
        entry_to_resp(reply)
    }

    /// Send several commands in one request: `POST {url}/pipeline`
    ///
    /// The service runs them in order without a transaction.
    pub async fn pipeline(&self, commands: Vec<Vec<String>>) -> Result<Vec<RespValue>> {
        debug!("Pipelining {} command(s) to {}", commands.len(), self.url);
        let expected = commands.len();
        let reply = self.post("/pipeline", &commands).await?;
        pipeline_to_resp(reply, expected)
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Value> {
        let endpoint = format!("{}{}", self.url, path);
        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(&self.token)
            .header(ENCODING_HEADER, "base64")
            .json(body)
            .send()
            .await
            .map_err(|e| StoreError::Connection(classify(&endpoint, &e)))?;

        let status = response.status();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(StoreError::Connection(ConnectionError::new(
                    ConnectionCause::Unauthorized,
                    endpoint,
                    format!("HTTP {}", status),
                )))
            }
            StatusCode::NOT_FOUND => {
                return Err(StoreError::Connection(ConnectionError::new(
                    ConnectionCause::UrlNotFound,
                    endpoint,
                    format!("HTTP {}", status),
                )))
            }
            _ => {}
        }

        let text = response
            .text()
            .await
            .map_err(|e| StoreError::Retrieval(format!("reading reply from {}: {}", endpoint, e)))?;

        match serde_json::from_str::<Value>(&text) {
            // command errors come back as a 4xx with an error entry
            Ok(value) if status.is_success() || value.get("error").is_some() => Ok(value),
            Err(e) if status.is_success() => Err(StoreError::Parse(format!(
                "reply from {} is not JSON: {}",
                endpoint, e
            ))),
            _ => Err(StoreError::Retrieval(format!(
                "HTTP {} from {}: {}",
                status, endpoint, text
            ))),
        }
    }
}

/// Classify a transport failure of the HTTP client
fn classify(endpoint: &str, err: &reqwest::Error) -> ConnectionError {
    let cause = if err.is_timeout() {
        ConnectionCause::Timeout
    } else if err.is_connect() {
        connect_cause(err)
    } else {
        ConnectionCause::Other
    };
    ConnectionError::new(cause, endpoint, err.to_string())
}

fn connect_cause(err: &reqwest::Error) -> ConnectionCause {
    let mut source: Option<&(dyn std::error::Error + 'static)> = std::error::Error::source(err);
    while let Some(current) = source {
        if let Some(io) = current.downcast_ref::<std::io::Error>() {
            match io.kind() {
                std::io::ErrorKind::ConnectionRefused => return ConnectionCause::Refused,
                std::io::ErrorKind::TimedOut => return ConnectionCause::Timeout,
                _ => {}
            }
        }
        let text = current.to_string().to_lowercase();
        if text.contains("dns error") || text.contains("failed to lookup") || text.contains("name or service not known") {
            return ConnectionCause::HostNotFound;
        }
        if text.contains("connection refused") {
            return ConnectionCause::Refused;
        }
        source = current.source();
    }
    ConnectionCause::Other
}
