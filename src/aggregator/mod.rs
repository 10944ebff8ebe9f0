//! Aggregator: wires protocols, foyers, handlers and sentinels into a running system.
//!
//! # Data Flow
//! ```text
//! Idle:
//!     register_protocol(Protocol, Foyer)
//!     register_handler(pattern, Handler)
//!     register_sentinel(SentinelRegistration)
//!
//! start():
//!     freeze registries → StageExecutors → Rendezvous per protocol → open foyers
//!
//! stop():
//!     close foyers → drain stage executors
//! ```
//!
//! # Design Decisions
//! - No global singletons: registries and the collector live here and are
//!   shared into every rendezvous through `Arc`
//! - Registries are read-only once started; later registration is an error
//! - A partial start is rolled back: foyers already opened are closed

mod binding;

use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use serde::Serialize;

use crate::config::{HorizonConfig, StagesConfig};
use crate::foyer::{Foyer, FoyerError};
use crate::model::Scheme;
use crate::observability::Collector;
use crate::protocol::Protocol;
use crate::registry::{AccessPolicy, Handler, HandlerRegistry, RegistryError};
use crate::sentinel::{
    ProtocolGuardSentinel, SentinelRegistration, SentinelRegistry, TraceHeaderSentinel,
};
use crate::stage::{ExecutorError, StageExecutors, StagesStats};

use binding::{Assembly, Binding, ProtocolBinding};

/// Error type for aggregator operations.
#[derive(Debug, thiserror::Error)]
pub enum AggregatorError {
    #[error("aggregator already started")]
    AlreadyStarted,

    #[error("aggregator is not running")]
    NotRunning,

    #[error("protocol '{0}' is already registered")]
    DuplicateProtocol(Scheme),

    #[error("protocol scheme '{protocol}' does not match foyer scheme '{foyer}'")]
    SchemeMismatch { protocol: Scheme, foyer: Scheme },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("failed to start stage executors: {0}")]
    Executor(#[from] ExecutorError),

    #[error("failed to open {scheme} foyer: {source}")]
    Foyer {
        scheme: Scheme,
        #[source]
        source: FoyerError,
    },
}

/// Lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregatorState {
    Idle,
    Running,
    Stopped,
}

#[derive(Debug, Clone, Default, Serialize)]
struct CatalogSnapshot {
    intents: Vec<String>,
    protocols: Vec<String>,
}

/// Read-only view of what was registered, filled in by `start()`.
///
/// Handed to handlers (e.g. `system.intents`) at registration time, before
/// the final set of intents is known.
#[derive(Debug, Clone, Default)]
pub struct IntentCatalog {
    inner: Arc<OnceLock<CatalogSnapshot>>,
}

impl IntentCatalog {
    /// Registered intent patterns, sorted. Empty before start.
    pub fn intents(&self) -> &[String] {
        self.inner.get().map(|c| c.intents.as_slice()).unwrap_or(&[])
    }

    /// Registered protocol schemes in registration order. Empty before start.
    pub fn protocols(&self) -> &[String] {
        self.inner.get().map(|c| c.protocols.as_slice()).unwrap_or(&[])
    }

    pub fn is_frozen(&self) -> bool {
        self.inner.get().is_some()
    }

    fn freeze(&self, snapshot: CatalogSnapshot) {
        // Only the first start sets it.
        let _ = self.inner.set(snapshot);
    }
}

/// Owns registries, collector and foyers for the process.
pub struct Aggregator {
    stages_config: StagesConfig,
    handlers: Arc<HandlerRegistry>,
    sentinels: SentinelRegistry,
    collector: Arc<dyn Collector>,
    bindings: Vec<Box<dyn Binding>>,
    catalog: IntentCatalog,
    stages: Option<Arc<StageExecutors>>,
    state: AggregatorState,
}

impl Aggregator {
    pub fn new(stages_config: StagesConfig, collector: Arc<dyn Collector>) -> Self {
        Self {
            stages_config,
            handlers: Arc::new(HandlerRegistry::new()),
            sentinels: SentinelRegistry::new(),
            collector,
            bindings: Vec::new(),
            catalog: IntentCatalog::default(),
            stages: None,
            state: AggregatorState::Idle,
        }
    }

    /// Aggregator with the built-in sentinels configured from `config`.
    pub fn from_config(config: &HorizonConfig, collector: Arc<dyn Collector>) -> Self {
        let mut aggregator = Self::new(config.stages.clone(), collector);
        aggregator
            .sentinels
            .register(SentinelRegistration::outbound(TraceHeaderSentinel).order(i32::MAX));
        if config.limits.max_body_bytes > 0 {
            aggregator.sentinels.register(
                SentinelRegistration::inbound(ProtocolGuardSentinel::new(
                    config.limits.max_body_bytes,
                ))
                .order(i32::MIN),
            );
        }
        aggregator
    }

    fn ensure_idle(&self) -> Result<(), AggregatorError> {
        match self.state {
            AggregatorState::Idle => Ok(()),
            _ => Err(AggregatorError::AlreadyStarted),
        }
    }

    fn handlers_mut(&mut self) -> Result<&mut HandlerRegistry, AggregatorError> {
        self.ensure_idle()?;
        Arc::get_mut(&mut self.handlers).ok_or(AggregatorError::AlreadyStarted)
    }

    /// Attach a foyer serving `protocol`. One foyer per scheme.
    pub fn register_protocol<F: Foyer>(
        &mut self,
        protocol: Protocol<F::Input, F::Output>,
        foyer: F,
    ) -> Result<(), AggregatorError> {
        self.ensure_idle()?;

        let scheme = protocol.scheme().clone();
        if foyer.scheme() != scheme {
            return Err(AggregatorError::SchemeMismatch {
                protocol: scheme,
                foyer: foyer.scheme(),
            });
        }
        if self.bindings.iter().any(|b| b.scheme() == scheme) {
            return Err(AggregatorError::DuplicateProtocol(scheme));
        }

        tracing::debug!(scheme = %scheme, "Protocol registered");
        self.bindings
            .push(Box::new(ProtocolBinding::new(protocol, foyer)));
        Ok(())
    }

    pub fn register_handler<H: Handler>(
        &mut self,
        pattern: &str,
        handler: H,
    ) -> Result<(), AggregatorError> {
        self.handlers_mut()?.register(pattern, handler)?;
        Ok(())
    }

    pub fn register_handler_with_access<H: Handler>(
        &mut self,
        pattern: &str,
        handler: H,
        access: AccessPolicy,
    ) -> Result<(), AggregatorError> {
        self.handlers_mut()?
            .register_with_access(pattern, handler, access)?;
        Ok(())
    }

    /// Register one handler instance under several patterns.
    pub fn register_shared_handler(
        &mut self,
        pattern: &str,
        handler: Arc<dyn Handler>,
        access: Option<AccessPolicy>,
    ) -> Result<(), AggregatorError> {
        self.handlers_mut()?
            .register_shared(pattern, handler, access)?;
        Ok(())
    }

    pub fn register_sentinel(
        &mut self,
        registration: SentinelRegistration,
    ) -> Result<(), AggregatorError> {
        self.ensure_idle()?;
        self.sentinels.register(registration);
        Ok(())
    }

    /// Freeze registries, build the stage executors and open every foyer.
    ///
    /// Must be called inside a tokio runtime. On failure the foyers already
    /// opened are closed and the aggregator ends up `Stopped`.
    pub async fn start(&mut self) -> Result<(), AggregatorError> {
        self.ensure_idle()?;

        let stages = Arc::new(StageExecutors::new(&self.stages_config)?);
        self.catalog.freeze(CatalogSnapshot {
            intents: self.handlers.keys(),
            protocols: self.bindings.iter().map(|b| b.scheme().to_string()).collect(),
        });

        let assembly = Assembly {
            handlers: Arc::clone(&self.handlers),
            sentinels: &self.sentinels,
            stages: Arc::clone(&stages),
            collector: Arc::clone(&self.collector),
            preprocess_on_pool: self.stages_config.preprocess_on_pool,
            deadline: self.stages_config.handler_deadline_ms.map(Duration::from_millis),
        };

        let mut failure = None;
        for binding in self.bindings.iter_mut() {
            if let Err(source) = binding.open(&assembly) {
                failure = Some(AggregatorError::Foyer {
                    scheme: binding.scheme(),
                    source,
                });
                break;
            }
        }
        drop(assembly);

        if let Some(err) = failure {
            tracing::error!(error = %err, "Start failed, closing opened foyers");
            self.close_foyers().await;
            drain(stages).await;
            self.state = AggregatorState::Stopped;
            return Err(err);
        }

        tracing::info!(
            protocols = self.bindings.len(),
            intents = self.handlers.len(),
            sentinels = self.sentinels.len(),
            "Aggregator started"
        );
        self.stages = Some(stages);
        self.state = AggregatorState::Running;
        Ok(())
    }

    /// Close every foyer, then drain the stage executors.
    pub async fn stop(&mut self) -> Result<(), AggregatorError> {
        if self.state != AggregatorState::Running {
            return Err(AggregatorError::NotRunning);
        }

        tracing::info!("Aggregator stopping");
        self.close_foyers().await;
        if let Some(stages) = self.stages.take() {
            drain(stages).await;
        }
        self.state = AggregatorState::Stopped;
        tracing::info!("Aggregator stopped");
        Ok(())
    }

    async fn close_foyers(&mut self) {
        for binding in self.bindings.iter_mut().filter(|b| b.is_open()) {
            let scheme = binding.scheme();
            if let Err(e) = binding.close().await {
                tracing::warn!(scheme = %scheme, error = %e, "Failed to close foyer");
            }
        }
    }

    pub fn state(&self) -> AggregatorState {
        self.state
    }

    /// Address the foyer for `scheme` is bound to, once running.
    pub fn local_addr(&self, scheme: &Scheme) -> Option<SocketAddr> {
        self.bindings
            .iter()
            .find(|b| b.scheme() == *scheme)
            .and_then(|b| b.local_addr())
    }

    /// Registered intent patterns, sorted.
    pub fn intents(&self) -> Vec<String> {
        self.handlers.keys()
    }

    pub fn catalog(&self) -> IntentCatalog {
        self.catalog.clone()
    }

    /// Per-stage counters while running.
    pub fn stage_stats(&self) -> Option<StagesStats> {
        self.stages.as_ref().map(|s| s.stats())
    }
}

impl std::fmt::Debug for Aggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Aggregator")
            .field("state", &self.state)
            .field("protocols", &self.bindings.len())
            .field("intents", &self.handlers.len())
            .field("sentinels", &self.sentinels.len())
            .finish()
    }
}

/// Join stage workers without blocking a runtime thread.
async fn drain(stages: Arc<StageExecutors>) {
    if let Err(e) = tokio::task::spawn_blocking(move || stages.shutdown_and_join()).await {
        tracing::warn!(error = %e, "Stage drain task failed");
    }
}
