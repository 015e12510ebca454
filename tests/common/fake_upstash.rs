//! Minimal REST key-value service
//!
//! Mirrors the reply shapes of the hosted service: `{"result": ...}` or
//! `{"error": ...}` per command, every string base64 encoded, bearer token
//! checked on each request.

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use chatstore::remote::encode_string;
use chatstore::{MemoryStore, Op, RespValue};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct Service {
    token: String,
    keyspace: MemoryStore,
    fail_key: Option<String>,
    requests: AtomicUsize,
}

pub struct FakeUpstash {
    pub addr: SocketAddr,
    service: Arc<Service>,
}

impl FakeUpstash {
    pub async fn start(token: &str) -> FakeUpstash {
        Self::start_with(token, None).await
    }

    /// Commands whose key is `fail_key` get an error entry
    pub async fn start_with(token: &str, fail_key: Option<&str>) -> FakeUpstash {
        let service = Arc::new(Service {
            token: token.to_string(),
            keyspace: MemoryStore::new(),
            fail_key: fail_key.map(str::to_string),
            requests: AtomicUsize::new(0),
        });

        let app = Router::new()
            .route("/", post(single))
            .route("/pipeline", post(pipeline))
            .with_state(service.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        FakeUpstash { addr, service }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// HTTP requests accepted so far
    pub fn requests(&self) -> usize {
        self.service.requests.load(Ordering::SeqCst)
    }

    pub fn keyspace(&self) -> &MemoryStore {
        &self.service.keyspace
    }
}

fn authorized(service: &Service, headers: &HeaderMap) -> bool {
    let expected = format!("Bearer {}", service.token);
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v == expected)
        .unwrap_or(false)
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "error": "Unauthorized" })),
    )
        .into_response()
}

async fn single(
    State(service): State<Arc<Service>>,
    headers: HeaderMap,
    Json(args): Json<Vec<String>>,
) -> Response {
    if !authorized(&service, &headers) {
        return unauthorized();
    }
    service.requests.fetch_add(1, Ordering::SeqCst);

    let entry = run(&service, &args);
    let status = if entry.get("error").is_some() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::OK
    };
    (status, Json(entry)).into_response()
}

async fn pipeline(
    State(service): State<Arc<Service>>,
    headers: HeaderMap,
    Json(commands): Json<Vec<Vec<String>>>,
) -> Response {
    if !authorized(&service, &headers) {
        return unauthorized();
    }
    service.requests.fetch_add(1, Ordering::SeqCst);

    let entries: Vec<Value> = commands.iter().map(|args| run(&service, args)).collect();
    (StatusCode::OK, Json(Value::Array(entries))).into_response()
}

fn run(service: &Service, args: &[String]) -> Value {
    if args.first().map(|s| s.eq_ignore_ascii_case("PING")).unwrap_or(false) {
        return json!({ "result": encode_string("PONG") });
    }
    if args.get(1).is_some() && args.get(1) == service.fail_key.as_ref() {
        return json!({ "error": "ERR injected failure" });
    }
    match Op::parse(args) {
        Ok(op) => match service.keyspace.apply(&op) {
            RespValue::Error(message) => json!({ "error": message }),
            reply => json!({ "result": to_json(reply) }),
        },
        Err(e) => json!({ "error": e.to_string() }),
    }
}

fn to_json(value: RespValue) -> Value {
    match value {
        RespValue::SimpleString(s) => Value::String(encode_string(&s)),
        RespValue::BulkString(b) => Value::String(encode_string(&String::from_utf8_lossy(&b))),
        RespValue::Integer(i) => json!(i),
        RespValue::Null => Value::Null,
        RespValue::Array(items) => Value::Array(items.into_iter().map(to_json).collect()),
        RespValue::Error(message) => Value::String(message),
    }
}
