//! Type-erased protocol + foyer pairs.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;

use crate::foyer::{Foyer, FoyerError};
use crate::model::Scheme;
use crate::observability::Collector;
use crate::protocol::Protocol;
use crate::registry::HandlerRegistry;
use crate::rendezvous::Rendezvous;
use crate::sentinel::SentinelRegistry;
use crate::stage::StageExecutors;

/// Shared pieces every rendezvous is built from at start.
pub(crate) struct Assembly<'a> {
    pub handlers: Arc<HandlerRegistry>,
    pub sentinels: &'a SentinelRegistry,
    pub stages: Arc<StageExecutors>,
    pub collector: Arc<dyn Collector>,
    pub preprocess_on_pool: bool,
    pub deadline: Option<Duration>,
}

pub(crate) trait Binding: Send {
    fn scheme(&self) -> Scheme;
    fn open(&mut self, assembly: &Assembly<'_>) -> Result<(), FoyerError>;
    fn close(&mut self) -> BoxFuture<'_, Result<(), FoyerError>>;
    fn is_open(&self) -> bool;
    fn local_addr(&self) -> Option<SocketAddr>;
}

pub(crate) struct ProtocolBinding<F: Foyer> {
    protocol: Protocol<F::Input, F::Output>,
    foyer: F,
}

impl<F: Foyer> ProtocolBinding<F> {
    pub(crate) fn new(protocol: Protocol<F::Input, F::Output>, foyer: F) -> Self {
        Self { protocol, foyer }
    }
}

impl<F: Foyer> Binding for ProtocolBinding<F> {
    fn scheme(&self) -> Scheme {
        self.protocol.scheme().clone()
    }

    fn open(&mut self, assembly: &Assembly<'_>) -> Result<(), FoyerError> {
        let rendezvous = Rendezvous::new(
            self.protocol.clone(),
            Arc::clone(&assembly.handlers),
            assembly.sentinels.chain_for(self.protocol.scheme()),
            Arc::clone(&assembly.stages),
            Arc::clone(&assembly.collector),
        )
        .preprocess_on_pool(assembly.preprocess_on_pool)
        .deadline(assembly.deadline);

        self.foyer.open(Arc::new(rendezvous))
    }

    fn close(&mut self) -> BoxFuture<'_, Result<(), FoyerError>> {
        self.foyer.close()
    }

    fn is_open(&self) -> bool {
        self.foyer.is_open()
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.foyer.local_addr()
    }
}
