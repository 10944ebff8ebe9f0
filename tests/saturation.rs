//! Saturated stages slow requests down but never drop them.

use std::time::Duration;

use futures_util::future::join_all;
use serde_json::{json, Value};

use horizon::config::StageConfig;
use horizon::registry::{HandlerError, Invocation};

mod common;

const REQUESTS: usize = 24;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_saturated_conductor_answers_every_request() {
    let mut config = common::test_config();
    config.stages.conductor = StageConfig {
        core_threads: 1,
        max_threads: 2,
        queue_capacity: 2,
        keep_alive_ms: 100,
    };

    let server = common::start_server_with(config, |agg| {
        agg.register_handler("job.create", |inv: &Invocation| -> Result<Value, HandlerError> {
            std::thread::sleep(Duration::from_millis(50));
            Ok(json!({"n": inv.payload().get("n").cloned().unwrap_or(Value::Null)}))
        })
        .unwrap();
    })
    .await;

    let client = reqwest::Client::new();
    let url = format!("{}/jobs", server.http_url());
    let responses = join_all((0..REQUESTS).map(|n| {
        let client = client.clone();
        let url = url.clone();
        async move {
            let res = client.post(url).json(&json!({"n": n})).send().await.unwrap();
            assert_eq!(res.status(), 200);
            res.json::<Value>().await.unwrap()
        }
    }))
    .await;

    for (n, body) in responses.iter().enumerate() {
        assert_eq!(body["n"], n);
    }

    let stats = server.aggregator.stage_stats().unwrap();
    assert_eq!(stats.conductor.submitted, REQUESTS as u64);
    assert!(stats.conductor.workers <= 2);

    let memory = server.stop().await;
    assert_eq!(memory.intent_count("job.create"), REQUESTS as u64);
    assert_eq!(memory.outcome_count("success"), REQUESTS as u64);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_drains_in_flight_requests() {
    let (started_tx, started_rx) = std::sync::mpsc::channel::<()>();
    let started_tx = std::sync::Mutex::new(started_tx);
    let server = common::start_server_with(common::test_config(), move |agg| {
        agg.register_handler("job.create", move |_: &Invocation| -> Result<Value, HandlerError> {
            let _ = started_tx.lock().unwrap().send(());
            std::thread::sleep(Duration::from_millis(200));
            Ok(json!({"done": true}))
        })
        .unwrap();
    })
    .await;

    let url = format!("{}/jobs", server.http_url());
    let in_flight = tokio::spawn(async move { reqwest::Client::new().post(url).send().await });

    // Stop only once the handler is running.
    tokio::task::spawn_blocking(move || started_rx.recv_timeout(Duration::from_secs(5)))
        .await
        .unwrap()
        .expect("handler never started");
    let memory = server.stop().await;

    let res = in_flight.await.unwrap().unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(memory.intent_count("job.create"), 1);
}
