//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use horizon::config::{HorizonConfig, StageConfig};
use horizon::demo::{register_demo_handlers, UserStore};
use horizon::foyer::{HttpFoyer, RpcFoyer, TopicFoyer, TopicPublisher, WebSocketFoyer};
use horizon::model::Scheme;
use horizon::observability::InMemoryCollector;
use horizon::protocol::http::http_protocol;
use horizon::protocol::rpc::rpc_protocol;
use horizon::protocol::topic::topic_protocol;
use horizon::protocol::websocket::websocket_protocol;
use horizon::system::{register_system_handlers, SystemInfo};
use horizon::Aggregator;

/// A running aggregator with every foyer on an ephemeral port.
pub struct TestServer {
    pub aggregator: Aggregator,
    pub memory: Arc<InMemoryCollector>,
    pub store: Arc<UserStore>,
    pub publisher: TopicPublisher,
}

impl TestServer {
    pub fn http_url(&self) -> String {
        format!("http://{}", self.addr(Scheme::HTTP))
    }

    pub fn rpc_url(&self) -> String {
        format!("http://{}", self.addr(Scheme::RPC))
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr(Scheme::WEBSOCKET))
    }

    fn addr(&self, scheme: Scheme) -> std::net::SocketAddr {
        self.aggregator
            .local_addr(&scheme)
            .unwrap_or_else(|| panic!("{scheme} foyer is not open"))
    }

    /// Stop the aggregator; all request events are recorded afterwards.
    pub async fn stop(mut self) -> Arc<InMemoryCollector> {
        self.aggregator.stop().await.unwrap();
        self.memory
    }
}

/// Small pools and ephemeral ports.
pub fn test_config() -> HorizonConfig {
    let mut config = HorizonConfig::default();
    config.http.bind_address = "127.0.0.1:0".into();
    config.websocket.bind_address = "127.0.0.1:0".into();
    config.rpc.bind_address = "127.0.0.1:0".into();
    config.limits.max_body_bytes = 4096;

    let stage = StageConfig {
        core_threads: 2,
        max_threads: 4,
        queue_capacity: 32,
        keep_alive_ms: 1000,
    };
    config.stages.rendezvous = stage.clone();
    config.stages.conductor = stage.clone();
    config.stages.central = stage;
    config
}

pub async fn start_server(config: HorizonConfig) -> TestServer {
    start_server_with(config, |_| {}).await
}

/// Start with the system and demo handlers plus whatever `customize` registers.
pub async fn start_server_with<F>(config: HorizonConfig, customize: F) -> TestServer
where
    F: FnOnce(&mut Aggregator),
{
    let memory = Arc::new(InMemoryCollector::new());
    let store = Arc::new(UserStore::new());
    let mut aggregator = Aggregator::from_config(&config, memory.clone());

    let topic = TopicFoyer::new(Duration::from_secs(5));
    let publisher = topic.publisher().named("test");

    aggregator
        .register_protocol(http_protocol(), HttpFoyer::from_config(&config))
        .unwrap();
    aggregator
        .register_protocol(websocket_protocol(), WebSocketFoyer::from_config(&config))
        .unwrap();
    aggregator
        .register_protocol(rpc_protocol(), RpcFoyer::from_config(&config))
        .unwrap();
    aggregator.register_protocol(topic_protocol(), topic).unwrap();

    register_system_handlers(&mut aggregator, SystemInfo::new().with_collector(memory.clone()))
        .unwrap();
    register_demo_handlers(&mut aggregator, store.clone()).unwrap();
    customize(&mut aggregator);

    aggregator.start().await.unwrap();

    TestServer {
        aggregator,
        memory,
        store,
        publisher,
    }
}
