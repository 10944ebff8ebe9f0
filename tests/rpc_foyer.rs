//! RPC and topic foyer end-to-end tests.

use serde_json::{json, Value};

mod common;

#[tokio::test]
async fn test_rpc_create_then_get() {
    let server = common::start_server(common::test_config()).await;
    let client = reqwest::Client::new();
    let base = server.rpc_url();

    let res = client
        .post(format!("{base}/acme.UserService/CreateUser"))
        .json(&json!({"name": "Grace", "email": "grace@example.com"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert!(res.headers().contains_key("x-trace-id"));
    let created: Value = res.json().await.unwrap();
    let id = created["result"]["id"].as_u64().unwrap();

    let fetched: Value = client
        .post(format!("{base}/UserService/GetUser"))
        .json(&json!({"id": id}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(fetched["result"]["name"], "Grace");

    server.stop().await;
}

#[tokio::test]
async fn test_rpc_errors() {
    let server = common::start_server(common::test_config()).await;
    let client = reqwest::Client::new();
    let base = server.rpc_url();

    let res = client
        .post(format!("{base}/User-Service/GetUser"))
        .body("{}")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 400);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"]["kind"], "malformed_input");

    let res = client
        .post(format!("{base}/BillingService/ChargeCard"))
        .body("{}")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 404);

    let res = client
        .get(format!("{base}/UserService/GetUser"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 405);

    server.stop().await;
}

#[tokio::test]
async fn test_topic_publish_reaches_same_handlers() {
    let server = common::start_server(common::test_config()).await;

    let ack = server
        .publisher
        .publish("user/create", br#"{"name": "Linus", "email": "linus@example.com"}"#.to_vec())
        .await
        .unwrap();
    assert_eq!(ack.status, 200);
    assert_eq!(ack.document["ack"], true);
    assert_eq!(ack.document["result"]["name"], "Linus");
    assert_eq!(server.store.len(), 1);

    let ack = server
        .publisher
        .publish("orders//created", Vec::new())
        .await
        .unwrap();
    assert_eq!(ack.status, 400);
    assert_eq!(ack.document["ack"], false);

    server.stop().await;
}
