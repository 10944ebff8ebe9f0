//! TCP binding and axum serving for network foyers.
//!
//! # Responsibilities
//! - Parse and bind the configured address synchronously
//! - Hand the socket to tokio and spawn `axum::serve`
//! - Stop serving through the shared `Shutdown` coordinator

use std::net::SocketAddr;

use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::foyer::FoyerError;
use crate::lifecycle::Shutdown;
use crate::model::Scheme;

/// Bind `address` without awaiting, so failures surface from `open`.
pub fn bind(address: &str) -> Result<TcpListener, FoyerError> {
    let addr: SocketAddr = address.parse().map_err(|e: std::net::AddrParseError| {
        FoyerError::InvalidAddress {
            address: address.to_string(),
            reason: e.to_string(),
        }
    })?;

    let bind_error = |source| FoyerError::Bind {
        address: address.to_string(),
        source,
    };
    let listener = std::net::TcpListener::bind(addr).map_err(bind_error)?;
    listener.set_nonblocking(true).map_err(bind_error)?;
    TcpListener::from_std(listener).map_err(bind_error)
}

/// A running axum server.
#[derive(Debug)]
pub struct Serving {
    scheme: Scheme,
    local_addr: SocketAddr,
    shutdown: Shutdown,
    task: JoinHandle<std::io::Result<()>>,
}

impl Serving {
    pub fn start(
        scheme: Scheme,
        listener: TcpListener,
        app: Router,
        shutdown: Shutdown,
    ) -> Result<Self, FoyerError> {
        let local_addr = listener.local_addr().map_err(|source| FoyerError::Bind {
            address: scheme.to_string(),
            source,
        })?;

        let signal = shutdown.clone();
        let task = tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move { signal.wait().await })
            .await
        });

        tracing::info!(scheme = %scheme, address = %local_addr, "Foyer listening");

        Ok(Self {
            scheme,
            local_addr,
            shutdown,
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Trigger shutdown and wait for the serve loop to drain.
    pub async fn stop(self) -> Result<(), FoyerError> {
        self.shutdown.trigger();
        let result = match self.task.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(FoyerError::Serve(e.to_string())),
            Err(e) => Err(FoyerError::Serve(e.to_string())),
        };
        tracing::info!(scheme = %self.scheme, address = %self.local_addr, "Foyer closed");
        result
    }
}
