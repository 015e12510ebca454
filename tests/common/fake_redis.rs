//! Minimal RESP server over an in-process keyspace
//!
//! Understands the commands the store emits plus PING, AUTH, SELECT and
//! QUIT. Commands touching `fail_key` get an error reply, which lets tests
//! exercise partial pipeline failures.

use bytes::BytesMut;
use chatstore::protocol::{RespEncoder, RespParser};
use chatstore::{MemoryStore, Op, RespValue};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

#[derive(Default, Clone)]
pub struct Options {
    pub password: Option<String>,
    pub fail_key: Option<String>,
}

struct State {
    options: Options,
    keyspace: MemoryStore,
    commands: AtomicUsize,
    quits: AtomicUsize,
}

pub struct FakeRedis {
    pub addr: SocketAddr,
    state: Arc<State>,
}

impl FakeRedis {
    pub async fn start(options: Options) -> FakeRedis {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(State {
            options,
            keyspace: MemoryStore::new(),
            commands: AtomicUsize::new(0),
            quits: AtomicUsize::new(0),
        });

        let shared = state.clone();
        tokio::spawn(async move {
            loop {
                let (socket, _) = match listener.accept().await {
                    Ok(accepted) => accepted,
                    Err(_) => return,
                };
                let state = shared.clone();
                tokio::spawn(async move {
                    let _ = serve(socket, state).await;
                });
            }
        });

        FakeRedis { addr, state }
    }

    pub fn url(&self) -> String {
        format!("redis://{}", self.addr)
    }

    /// Data commands received so far (handshake excluded)
    pub fn commands(&self) -> usize {
        self.state.commands.load(Ordering::SeqCst)
    }

    pub fn quits(&self) -> usize {
        self.state.quits.load(Ordering::SeqCst)
    }

    pub fn keyspace(&self) -> &MemoryStore {
        &self.state.keyspace
    }
}

async fn serve(mut socket: TcpStream, state: Arc<State>) -> anyhow::Result<()> {
    let mut buffer = BytesMut::with_capacity(4096);
    let mut authenticated = state.options.password.is_none();

    loop {
        while let Some(value) = RespParser::parse(&mut buffer)? {
            let args = match value {
                RespValue::Array(items) => items
                    .iter()
                    .map(|item| item.to_text())
                    .collect::<Result<Vec<_>, _>>()?,
                _ => anyhow::bail!("expected a command array"),
            };

            let (reply, quit) = respond(&state, &mut authenticated, &args);
            socket.write_all(&RespEncoder::encode(&reply)).await?;
            if quit {
                return Ok(());
            }
        }

        if socket.read_buf(&mut buffer).await? == 0 {
            return Ok(());
        }
    }
}

fn respond(state: &State, authenticated: &mut bool, args: &[String]) -> (RespValue, bool) {
    let name = args.first().map(|s| s.to_uppercase()).unwrap_or_default();
    match name.as_str() {
        "AUTH" => {
            let given = args.last().cloned();
            if given.is_some() && given == state.options.password {
                *authenticated = true;
                (RespValue::simple_string("OK"), false)
            } else {
                (
                    RespValue::error("WRONGPASS invalid username-password pair or user is disabled."),
                    false,
                )
            }
        }
        "QUIT" => {
            state.quits.fetch_add(1, Ordering::SeqCst);
            (RespValue::simple_string("OK"), true)
        }
        _ if !*authenticated => (RespValue::error("NOAUTH Authentication required."), false),
        "PING" => (RespValue::simple_string("PONG"), false),
        "SELECT" => (RespValue::simple_string("OK"), false),
        _ => {
            state.commands.fetch_add(1, Ordering::SeqCst);
            if args.get(1).is_some() && args.get(1) == state.options.fail_key.as_ref() {
                return (RespValue::error("ERR injected failure"), false);
            }
            match Op::parse(args) {
                Ok(op) => (state.keyspace.apply(&op), false),
                Err(e) => (RespValue::error(e.to_string()), false),
            }
        }
    }
}
