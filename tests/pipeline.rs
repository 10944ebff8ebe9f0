//! One handler, every protocol: the pipeline behaves the same whatever the
//! foyer.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio_tungstenite::tungstenite::Message;

use horizon::model::{ExecutionContext, RawOutput, Scheme, SchemeSet};
use horizon::registry::{HandlerError, Invocation};
use horizon::sentinel::{
    InboundSentinel, OutboundSentinel, Rejection, SentinelError, SentinelRegistration,
};

mod common;

fn order_handler(inv: &Invocation) -> Result<Value, HandlerError> {
    let item = inv.require_str("item")?;
    Ok(json!({"item": item, "via": inv.scheme().to_string()}))
}

/// Records the status of every output it sees.
#[derive(Clone, Default)]
struct StatusRecorder {
    seen: Arc<Mutex<Vec<(String, u16)>>>,
}

impl OutboundSentinel for StatusRecorder {
    fn inspect_outbound(
        &self,
        ctx: &ExecutionContext,
        output: &mut dyn RawOutput,
    ) -> Result<(), SentinelError> {
        let mut seen = self.seen.lock().unwrap();
        seen.push((ctx.scheme().to_string(), output.status_code()));
        Ok(())
    }
}

/// Refuses everything it sees.
struct DenyAll {
    seen: Arc<AtomicUsize>,
}

impl InboundSentinel for DenyAll {
    fn inspect_inbound(&self, _ctx: &ExecutionContext) -> Result<(), Rejection> {
        self.seen.fetch_add(1, Ordering::SeqCst);
        Err(Rejection::denied("maintenance"))
    }
}

#[tokio::test]
async fn test_same_intent_over_every_protocol() {
    let recorder = StatusRecorder::default();
    let sentinel = recorder.clone();
    let server = common::start_server_with(common::test_config(), move |agg| {
        agg.register_handler("order.create", order_handler).unwrap();
        agg.register_sentinel(SentinelRegistration::outbound(sentinel)).unwrap();
    })
    .await;
    let client = reqwest::Client::new();

    let http: Value = client
        .post(format!("{}/orders", server.http_url()))
        .json(&json!({"item": "book"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(http, json!({"item": "book", "via": "http"}));

    let rpc: Value = client
        .post(format!("{}/shop.OrderService/CreateOrder", server.rpc_url()))
        .json(&json!({"item": "book"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(rpc["result"], json!({"item": "book", "via": "rpc"}));

    let (mut ws, _) = tokio_tungstenite::connect_async(server.ws_url()).await.unwrap();
    ws.send(Message::Text(
        json!({"intent": "order.create", "data": {"item": "book"}}).to_string().into(),
    ))
    .await
    .unwrap();
    let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let reply: Value = serde_json::from_str(frame.to_text().unwrap()).unwrap();
    assert_eq!(reply["data"]["result"], json!({"item": "book", "via": "websocket"}));
    ws.close(None).await.unwrap();

    let ack = server
        .publisher
        .publish("order/create", br#"{"item": "book"}"#.to_vec())
        .await
        .unwrap();
    assert_eq!(ack.document["result"], json!({"item": "book", "via": "topic"}));

    // A failure still runs the outbound chain.
    let res = client
        .post(format!("{}/orders", server.http_url()))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 422);

    let memory = server.stop().await;
    assert_eq!(memory.intent_count("order.create"), 5);

    let seen = recorder.seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 5);
    for scheme in ["http", "rpc", "websocket", "topic"] {
        assert!(seen.iter().any(|(s, status)| s == scheme && *status == 200));
    }
    assert!(seen.contains(&("http".to_string(), 422)));
}

#[tokio::test]
async fn test_inbound_sentinel_scoped_to_scheme() {
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();
    let server = common::start_server_with(common::test_config(), move |agg| {
        agg.register_handler("order.create", order_handler).unwrap();
        agg.register_sentinel(
            SentinelRegistration::inbound(DenyAll { seen: counter })
                .schemes(SchemeSet::only([Scheme::RPC])),
        )
        .unwrap();
    })
    .await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/OrderService/CreateOrder", server.rpc_url()))
        .json(&json!({"item": "pen"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 403);

    let res = client
        .post(format!("{}/orders", server.http_url()))
        .json(&json!({"item": "pen"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(seen.load(Ordering::SeqCst), 1);

    server.stop().await;
}

#[tokio::test]
async fn test_intents_catalog_reported() {
    let server = common::start_server(common::test_config()).await;

    let body: Value = reqwest::get(format!("{}/system/intents", server.http_url()))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let intents: Vec<&str> = body["intents"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(Value::as_str)
        .collect();
    assert!(intents.contains(&"user.create"));
    assert!(intents.contains(&"system.health"));
    assert_eq!(intents, server.aggregator.intents());

    server.stop().await;
}
