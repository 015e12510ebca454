mod common;

use chatstore::remote::RemoteStore;
use chatstore::{
    BackendKind, ConnectionCause, LifecycleState, OpResult, Store, StoreConfig, StoreContext,
    StoreError,
};
use common::fake_upstash::FakeUpstash;

fn remote(server: &FakeUpstash, token: &str) -> Store {
    Store::Remote(RemoteStore::new(&server.url(), token).unwrap())
}

#[tokio::test]
async fn test_contract_over_rest() {
    let server = FakeUpstash::start("token").await;
    let store = remote(&server, "token");

    store
        .set_hash("chat:1", [("title", "Hello"), ("path", "/chat/1")])
        .await
        .unwrap();
    let record = store.get_hash("chat:1").await.unwrap().unwrap();
    assert_eq!(record.get("title").unwrap(), "Hello");
    assert_eq!(record.get("path").unwrap(), "/chat/1");
    assert_eq!(store.get_hash("chat:2").await.unwrap(), None);

    assert!(store.add_to_sorted_set("user:u1:chats", 1.5, "chat:1").await.unwrap());
    assert!(store.add_to_sorted_set("user:u1:chats", 1.5, "chat:0").await.unwrap());
    assert_eq!(
        store.range_sorted_set("user:u1:chats", 0, -1, false).await.unwrap(),
        vec!["chat:0", "chat:1"]
    );
    assert_eq!(
        store.range_sorted_set("user:u1:chats", -1, -1, false).await.unwrap(),
        vec!["chat:1"]
    );

    assert!(store.remove_from_sorted_set("user:u1:chats", "chat:0").await.unwrap());
    assert!(store.delete_key("chat:1").await.unwrap());
    assert_eq!(server.keyspace().stats().hashes, 0);
}

#[tokio::test]
async fn test_batch_uses_one_request() {
    let server = FakeUpstash::start("token").await;
    let store = remote(&server, "token");

    let results = store
        .create_batch()
        .set_hash("k", [("a", "1")])
        .add_to_sorted_set("k:z", 1.0, "m")
        .range_sorted_set("k:z", 0, -1, false)
        .delete_key("k")
        .execute()
        .await
        .unwrap();

    assert_eq!(
        results,
        vec![
            OpResult::Ack,
            OpResult::Inserted(true),
            OpResult::Members(vec!["m".to_string()]),
            OpResult::Deleted(true),
        ]
    );
    assert_eq!(server.requests(), 1);
}

#[tokio::test]
async fn test_batch_failure_over_rest() {
    let server = FakeUpstash::start_with("token", Some("broken")).await;
    let store = remote(&server, "token");

    let result = store
        .create_batch()
        .set_hash("k", [("a", "1")])
        .get_hash("broken")
        .execute()
        .await;

    match result {
        Err(StoreError::Batch {
            index, completed, ..
        }) => {
            assert_eq!(index, 1);
            assert_eq!(completed, vec![OpResult::Ack]);
        }
        other => panic!("expected a batch error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_command_error_is_surfaced() {
    let server = FakeUpstash::start_with("token", Some("broken")).await;
    let store = remote(&server, "token");

    assert!(matches!(
        store.delete_key("broken").await,
        Err(StoreError::Command(_))
    ));
}

#[tokio::test]
async fn test_bad_token_is_unauthorized() {
    let server = FakeUpstash::start("token").await;
    let client = RemoteStore::new(&server.url(), "wrong").unwrap();

    let err = client.ping().await.unwrap_err();
    assert_eq!(err.cause, ConnectionCause::Unauthorized);

    match Store::Remote(client).get_hash("k").await {
        Err(StoreError::Connection(e)) => assert_eq!(e.cause, ConnectionCause::Unauthorized),
        other => panic!("expected an authorization failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_resolution_verifies_remote() {
    let server = FakeUpstash::start("token").await;

    let context = StoreContext::new(StoreConfig {
        remote_url: Some(server.url()),
        remote_token: Some("token".to_string()),
        ..StoreConfig::default()
    });
    assert_eq!(context.get().await.kind(), BackendKind::Remote);
    assert_eq!(context.state(), LifecycleState::Connected(BackendKind::Remote));

    let context = StoreContext::new(StoreConfig {
        remote_url: Some(server.url()),
        remote_token: Some("wrong".to_string()),
        ..StoreConfig::default()
    });
    let store = context.get().await;
    assert_eq!(store.kind(), BackendKind::Memory);
    assert_eq!(context.state(), LifecycleState::Degraded);
    store.set_hash("chat:1", [("title", "t")]).await.unwrap();
}
