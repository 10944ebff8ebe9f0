//! WebSocket foyer.
//!
//! # Responsibilities
//! - Upgrade requests on the configured path
//! - Run one rendezvous task per text frame; replies may interleave
//! - Close sessions idle longer than `idle_timeout`
//! - Bound every frame write by `write_timeout`; a failed write ends the session
//!
//! # Design Decisions
//! - A single writer task per session owns the sink
//! - Upgraded sessions outlive axum's graceful shutdown, so they watch the
//!   foyer's `Shutdown` themselves and `close()` waits on the tracker

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use futures_util::future::BoxFuture;
use futures_util::{FutureExt, SinkExt, StreamExt};
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;

use crate::config::HorizonConfig;
use crate::error::PipelineError;
use crate::foyer::listener::{self, Serving};
use crate::foyer::session::SessionTracker;
use crate::foyer::{Foyer, FoyerError};
use crate::lifecycle::Shutdown;
use crate::model::Scheme;
use crate::protocol::websocket::{WsInput, WsOutput};
use crate::rendezvous::Rendezvous;

/// Replies buffered per session before request tasks wait on the writer.
const OUTBOUND_BUFFER: usize = 64;

#[derive(Clone)]
struct WsState {
    rendezvous: Arc<Rendezvous<WsInput, WsOutput>>,
    tracker: SessionTracker,
    shutdown: Shutdown,
    idle_timeout: Duration,
    write_timeout: Duration,
}

#[derive(Debug)]
pub struct WebSocketFoyer {
    bind_address: String,
    path: String,
    idle_timeout: Duration,
    write_timeout: Duration,
    tracker: SessionTracker,
    serving: Option<Serving>,
}

impl WebSocketFoyer {
    pub fn new(bind_address: impl Into<String>) -> Self {
        Self {
            bind_address: bind_address.into(),
            path: "/ws".to_string(),
            idle_timeout: Duration::from_secs(300),
            write_timeout: Duration::from_secs(10),
            tracker: SessionTracker::new(),
            serving: None,
        }
    }

    pub fn from_config(config: &HorizonConfig) -> Self {
        Self::new(config.websocket.bind_address.clone())
            .path(config.websocket.path.clone())
            .idle_timeout(Duration::from_secs(config.timeouts.idle_secs))
            .write_timeout(Duration::from_secs(config.timeouts.write_secs))
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Number of sessions currently open.
    pub fn active_sessions(&self) -> u64 {
        self.tracker.active_count()
    }
}

impl Foyer for WebSocketFoyer {
    type Input = WsInput;
    type Output = WsOutput;

    fn scheme(&self) -> Scheme {
        Scheme::WEBSOCKET
    }

    fn open(&mut self, rendezvous: Arc<Rendezvous<WsInput, WsOutput>>) -> Result<(), FoyerError> {
        if self.serving.is_some() {
            return Err(FoyerError::AlreadyOpen);
        }
        let listener = listener::bind(&self.bind_address)?;
        let shutdown = Shutdown::new();
        let state = WsState {
            rendezvous,
            tracker: self.tracker.clone(),
            shutdown: shutdown.clone(),
            idle_timeout: self.idle_timeout,
            write_timeout: self.write_timeout,
        };
        let app = Router::new()
            .route(&self.path, get(upgrade))
            .with_state(state)
            .layer(TraceLayer::new_for_http());

        self.serving = Some(Serving::start(Scheme::WEBSOCKET, listener, app, shutdown)?);
        Ok(())
    }

    fn close(&mut self) -> BoxFuture<'_, Result<(), FoyerError>> {
        let serving = self.serving.take();
        let tracker = self.tracker.clone();
        let grace = self.write_timeout;
        async move {
            let Some(serving) = serving else {
                return Ok(());
            };
            let result = serving.stop().await;
            if !tracker.wait_idle(grace).await {
                tracing::warn!(
                    sessions = tracker.active_count(),
                    "WebSocket sessions still open after shutdown grace period"
                );
            }
            result
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

async fn upgrade(
    State(state): State<WsState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| session(socket, state, peer))
}

async fn session(socket: WebSocket, state: WsState, peer: SocketAddr) {
    let guard = state.tracker.track();
    let session_id = guard.id().to_string();
    tracing::info!(session = %session_id, peer = %peer, "WebSocket session opened");

    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<String>(OUTBOUND_BUFFER);

    let write_timeout = state.write_timeout;
    let writer_session = session_id.clone();
    let writer = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            let failure = match tokio::time::timeout(write_timeout, sink.send(Message::Text(text.into()))).await {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => PipelineError::TransportWrite(e.to_string()),
                Err(_) => PipelineError::TransportWrite(format!(
                    "write timed out after {} ms",
                    write_timeout.as_millis()
                )),
            };
            tracing::error!(session = %writer_session, error = %failure, "Closing session");
            break;
        }
        let _ = sink.close().await;
    });

    loop {
        let frame = tokio::select! {
            _ = state.shutdown.wait() => break,
            frame = tokio::time::timeout(state.idle_timeout, stream.next()) => frame,
        };

        let text = match frame {
            Err(_) => {
                tracing::debug!(session = %session_id, "Idle timeout");
                break;
            }
            Ok(None) | Ok(Some(Ok(Message::Close(_)))) => break,
            Ok(Some(Err(e))) => {
                tracing::debug!(session = %session_id, error = %e, "Receive failed");
                break;
            }
            Ok(Some(Ok(Message::Text(text)))) => text.as_str().to_owned(),
            Ok(Some(Ok(Message::Binary(bytes)))) => match String::from_utf8(bytes.to_vec()) {
                Ok(text) => text,
                Err(_) => {
                    tracing::debug!(session = %session_id, "Ignoring non-UTF-8 binary frame");
                    continue;
                }
            },
            Ok(Some(Ok(_))) => continue,
        };

        if tx.is_closed() {
            break;
        }

        let rendezvous = Arc::clone(&state.rendezvous);
        let replies = tx.clone();
        let input = WsInput::new(session_id.clone(), text);
        tokio::spawn(async move {
            let output = match tokio::spawn(async move { rendezvous.encounter(input).await }).await {
                Ok(output) => output,
                Err(e) => {
                    tracing::error!(error = %e, "Pipeline task failed");
                    WsOutput::internal_error()
                }
            };
            // The writer is gone once the session failed; the reply is dropped.
            let _ = replies.send(output.text).await;
        });
    }

    drop(tx);
    let _ = writer.await;
    tracing::info!(session = %session_id, "WebSocket session closed");
    drop(guard);
}
