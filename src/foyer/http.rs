//! HTTP foyer.
//!
//! # Responsibilities
//! - Accept every method and path through a single fallback handler
//! - Read the body (bounded) and build an `HttpInput`
//! - Run the rendezvous in a spawned task and write the `HttpOutput`
//! - Enforce the request timeout and emit tower-http request traces

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::Request;
use axum::response::{IntoResponse, Response};
use axum::Router;
use futures_util::future::BoxFuture;
use futures_util::{FutureExt, StreamExt};
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::HorizonConfig;
use crate::foyer::listener::{self, Serving};
use crate::foyer::{Foyer, FoyerError};
use crate::lifecycle::Shutdown;
use crate::model::Scheme;
use crate::protocol::http::{HttpInput, HttpOutput};
use crate::rendezvous::Rendezvous;

#[derive(Clone)]
struct HttpState {
    rendezvous: Arc<Rendezvous<HttpInput, HttpOutput>>,
    body_cap: usize,
}

/// Serves HTTP requests on a TCP listener.
#[derive(Debug)]
pub struct HttpFoyer {
    bind_address: String,
    request_timeout: Duration,
    body_cap: usize,
    serving: Option<Serving>,
}

impl HttpFoyer {
    pub fn new(bind_address: impl Into<String>) -> Self {
        Self {
            bind_address: bind_address.into(),
            request_timeout: Duration::from_secs(30),
            body_cap: usize::MAX,
            serving: None,
        }
    }

    pub fn from_config(config: &HorizonConfig) -> Self {
        Self::new(config.http.bind_address.clone())
            .request_timeout(Duration::from_secs(config.timeouts.request_secs))
            .max_body_bytes(config.limits.max_body_bytes)
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Bodies are read up to one byte past the limit so the protocol guard
    /// can reject them. `0` reads without limit.
    pub fn max_body_bytes(mut self, limit: usize) -> Self {
        self.body_cap = body_cap(limit);
        self
    }

    #[allow(deprecated)]
    fn build_router(&self, state: HttpState) -> Router {
        Router::new()
            .fallback(handle)
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(TimeoutLayer::new(self.request_timeout)),
            )
    }
}

impl Foyer for HttpFoyer {
    type Input = HttpInput;
    type Output = HttpOutput;

    fn scheme(&self) -> Scheme {
        Scheme::HTTP
    }

    fn open(&mut self, rendezvous: Arc<Rendezvous<HttpInput, HttpOutput>>) -> Result<(), FoyerError> {
        if self.serving.is_some() {
            return Err(FoyerError::AlreadyOpen);
        }
        let listener = listener::bind(&self.bind_address)?;
        let app = self.build_router(HttpState {
            rendezvous,
            body_cap: self.body_cap,
        });
        self.serving = Some(Serving::start(Scheme::HTTP, listener, app, Shutdown::new())?);
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

pub(crate) fn body_cap(limit: usize) -> usize {
    if limit == 0 {
        usize::MAX
    } else {
        limit.saturating_add(1)
    }
}

/// Collect at most `cap` bytes of `body`.
pub(crate) async fn read_body(body: Body, cap: usize) -> Result<Vec<u8>, axum::Error> {
    let mut stream = body.into_data_stream();
    let mut buf = Vec::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        let room = cap.saturating_sub(buf.len());
        buf.extend_from_slice(&chunk[..chunk.len().min(room)]);
        if buf.len() >= cap {
            break;
        }
    }
    Ok(buf)
}

async fn handle(
    State(state): State<HttpState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let (parts, body) = request.into_parts();
    let body = match read_body(body, state.body_cap).await {
        Ok(body) => body,
        Err(e) => {
            tracing::warn!(peer = %peer, error = %e, "Failed to read request body");
            return HttpOutput::json(
                400,
                br#"{"error":{"kind":"malformed_input","message":"unreadable request body"}}"#.to_vec(),
            )
            .into_response();
        }
    };

    let mut input = HttpInput::new(parts.method.as_str(), parts.uri.to_string())
        .body(body)
        .peer(peer.to_string());
    for (name, value) in &parts.headers {
        if let Ok(value) = value.to_str() {
            input = input.header(name.as_str(), value);
        }
    }

    let rendezvous = Arc::clone(&state.rendezvous);
    match tokio::spawn(async move { rendezvous.encounter(input).await }).await {
        Ok(output) => output.into_response(),
        Err(e) => {
            tracing::error!(peer = %peer, error = %e, "Pipeline task failed");
            HttpOutput::internal_error().into_response()
        }
    }
}
