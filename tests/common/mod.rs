//! Fake servers shared by the integration tests

#![allow(dead_code)]

pub mod fake_redis;
pub mod fake_upstash;

/// A port nothing listens on
pub async fn free_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}
