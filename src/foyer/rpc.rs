//! RPC foyer: `POST /{service}/{method}` with a JSON body.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{ConnectInfo, Path, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::HorizonConfig;
use crate::foyer::http::{body_cap, read_body};
use crate::foyer::listener::{self, Serving};
use crate::foyer::{Foyer, FoyerError};
use crate::lifecycle::Shutdown;
use crate::model::Scheme;
use crate::protocol::rpc::{RpcInput, RpcOutput};
use crate::rendezvous::Rendezvous;

#[derive(Clone)]
struct RpcState {
    rendezvous: Arc<Rendezvous<RpcInput, RpcOutput>>,
    body_cap: usize,
}

#[derive(Debug)]
pub struct RpcFoyer {
    bind_address: String,
    request_timeout: Duration,
    body_cap: usize,
    serving: Option<Serving>,
}

impl RpcFoyer {
    pub fn new(bind_address: impl Into<String>) -> Self {
        Self {
            bind_address: bind_address.into(),
            request_timeout: Duration::from_secs(30),
            body_cap: usize::MAX,
            serving: None,
        }
    }

    pub fn from_config(config: &HorizonConfig) -> Self {
        Self::new(config.rpc.bind_address.clone())
            .request_timeout(Duration::from_secs(config.timeouts.request_secs))
            .max_body_bytes(config.limits.max_body_bytes)
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn max_body_bytes(mut self, limit: usize) -> Self {
        self.body_cap = body_cap(limit);
        self
    }

    #[allow(deprecated)]
    fn build_router(&self, state: RpcState) -> Router {
        Router::new()
            .route("/{service}/{method}", post(call))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(TimeoutLayer::new(self.request_timeout)),
            )
    }
}

impl Foyer for RpcFoyer {
    type Input = RpcInput;
    type Output = RpcOutput;

    fn scheme(&self) -> Scheme {
        Scheme::RPC
    }

    fn open(&mut self, rendezvous: Arc<Rendezvous<RpcInput, RpcOutput>>) -> Result<(), FoyerError> {
        if self.serving.is_some() {
            return Err(FoyerError::AlreadyOpen);
        }
        let listener = listener::bind(&self.bind_address)?;
        let app = self.build_router(RpcState {
            rendezvous,
            body_cap: self.body_cap,
        });
        self.serving = Some(Serving::start(Scheme::RPC, listener, app, Shutdown::new())?);
        Ok(())
    }

    fn close(&mut self) -> BoxFuture<'_, Result<(), FoyerError>> {
        let serving = self.serving.take();
        async move {
            match serving {
                Some(serving) => serving.stop().await,
                None => Ok(()),
            }
        }
        .boxed()
    }

    fn is_open(&self) -> bool {
        self.serving.is_some()
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.serving.as_ref().map(Serving::local_addr)
    }
}

async fn call(
    State(state): State<RpcState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Path((service, method)): Path<(String, String)>,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let body = match read_body(body, state.body_cap).await {
        Ok(body) => body,
        Err(e) => {
            tracing::warn!(peer = %peer, error = %e, "Failed to read RPC body");
            return RpcOutput {
                status: 400,
                metadata: Default::default(),
                body: br#"{"error":{"kind":"malformed_input","message":"unreadable request body"}}"#
                    .to_vec(),
            }
            .into_response();
        }
    };

    let mut input = RpcInput::new(service, method, body);
    input.peer = peer.to_string();
    for (name, value) in &headers {
        if let Ok(value) = value.to_str() {
            input.metadata.insert(name.as_str().to_string(), value.to_string());
        }
    }

    let rendezvous = Arc::clone(&state.rendezvous);
    match tokio::spawn(async move { rendezvous.encounter(input).await }).await {
        Ok(output) => output.into_response(),
        Err(e) => {
            tracing::error!(peer = %peer, error = %e, "Pipeline task failed");
            RpcOutput::internal_error().into_response()
        }
    }
}
