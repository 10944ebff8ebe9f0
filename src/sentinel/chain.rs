//! Sentinel registry and per-scheme chains.
//!
//! # Responsibilities
//! - Keep registrations in registration order
//! - Build the inbound/outbound chain for one scheme
//! - Run a chain against a context: inbound short-circuits, outbound swallows
//! - Contain sentinel panics: inbound renders a 500, outbound moves on

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::error::{panic_message, PipelineError};
use crate::model::{ExecutionContext, RawOutput, Scheme};
use crate::sentinel::{
    DuplexSentinel, InboundSentinel, OutboundSentinel, SentinelRegistration, SentinelRole,
};

/// All sentinel registrations of an aggregator.
#[derive(Debug, Default, Clone)]
pub struct SentinelRegistry {
    registrations: Vec<SentinelRegistration>,
}

impl SentinelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, registration: SentinelRegistration) {
        tracing::debug!(sentinel = ?registration, "Sentinel registered");
        self.registrations.push(registration);
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// The chain that applies to `scheme`, each direction stable-sorted by order.
    pub fn chain_for(&self, scheme: &Scheme) -> SentinelChain {
        let mut inbound: Vec<(i32, Arc<dyn InboundSentinel>)> = Vec::new();
        let mut outbound: Vec<(i32, Arc<dyn OutboundSentinel>)> = Vec::new();

        for registration in self
            .registrations
            .iter()
            .filter(|r| r.scheme_set().contains(scheme))
        {
            let order = registration.order_value();
            match registration.role() {
                SentinelRole::Inbound(s) => inbound.push((order, Arc::clone(s))),
                SentinelRole::Outbound(s) => outbound.push((order, Arc::clone(s))),
                SentinelRole::Both(s) => {
                    inbound.push((order, DuplexSentinel::into_inbound(Arc::clone(s))));
                    outbound.push((order, DuplexSentinel::into_outbound(Arc::clone(s))));
                }
            }
        }

        // `sort_by_key` is stable: equal orders keep registration order.
        inbound.sort_by_key(|(order, _)| *order);
        outbound.sort_by_key(|(order, _)| *order);

        SentinelChain {
            inbound: inbound.into_iter().map(|(_, s)| s).collect(),
            outbound: outbound.into_iter().map(|(_, s)| s).collect(),
        }
    }
}

/// The resolved, ordered sentinels for one scheme.
#[derive(Clone, Default)]
pub struct SentinelChain {
    inbound: Vec<Arc<dyn InboundSentinel>>,
    outbound: Vec<Arc<dyn OutboundSentinel>>,
}

impl SentinelChain {
    pub fn inbound(&self) -> &[Arc<dyn InboundSentinel>] {
        &self.inbound
    }

    pub fn outbound(&self) -> &[Arc<dyn OutboundSentinel>] {
        &self.outbound
    }

    /// Run inbound sentinels in order; the first rejection stops the chain.
    pub fn run_inbound(&self, ctx: &ExecutionContext) -> Result<(), PipelineError> {
        for sentinel in &self.inbound {
            match panic::catch_unwind(AssertUnwindSafe(|| sentinel.inspect_inbound(ctx))) {
                Ok(Ok(())) => {}
                Ok(Err(rejection)) => {
                    tracing::debug!(
                        trace_id = %ctx.trace_id(),
                        sentinel = sentinel.name(),
                        rejection = ?rejection,
                        "Inbound sentinel rejected request"
                    );
                    return Err(rejection.into());
                }
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    tracing::error!(
                        trace_id = %ctx.trace_id(),
                        sentinel = sentinel.name(),
                        panic = %message,
                        "Inbound sentinel panicked"
                    );
                    return Err(PipelineError::HandlerExecution(format!(
                        "sentinel {} panicked: {message}",
                        sentinel.name()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Run every outbound sentinel; failures are logged and the rest still run.
    pub fn run_outbound(&self, ctx: &ExecutionContext, output: &mut dyn RawOutput) {
        for sentinel in &self.outbound {
            let inspected =
                panic::catch_unwind(AssertUnwindSafe(|| sentinel.inspect_outbound(ctx, &mut *output)));
            match inspected {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(
                    trace_id = %ctx.trace_id(),
                    sentinel = sentinel.name(),
                    error = %e,
                    "Outbound sentinel failed"
                ),
                Err(panic) => tracing::warn!(
                    trace_id = %ctx.trace_id(),
                    sentinel = sentinel.name(),
                    panic = %panic_message(panic.as_ref()),
                    "Outbound sentinel panicked"
                ),
            }
        }
    }
}

impl std::fmt::Debug for SentinelChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SentinelChain")
            .field("inbound", &self.inbound.iter().map(|s| s.name()).collect::<Vec<_>>())
            .field("outbound", &self.outbound.iter().map(|s| s.name()).collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RawInput, SchemeSet};
    use crate::sentinel::{Rejection, SentinelError};
    use std::any::Any;
    use std::sync::Mutex;

    struct Input;

    impl RawInput for Input {
        fn scheme(&self) -> Scheme {
            Scheme::HTTP
        }
        fn native_reference(&self) -> &dyn Any {
            self
        }
        fn body(&self) -> &[u8] {
            b""
        }
        fn source(&self) -> &str {
            "test"
        }
    }

    struct Output(u16);

    impl RawOutput for Output {
        fn content(&self) -> &[u8] {
            b""
        }
        fn status_code(&self) -> u16 {
            self.0
        }
    }

    type Log = Arc<Mutex<Vec<String>>>;

    struct Recorder {
        label: &'static str,
        log: Log,
        reject: bool,
        fail: bool,
        panics: bool,
    }

    impl Recorder {
        fn new(label: &'static str, log: &Log) -> Self {
            Self {
                label,
                log: log.clone(),
                reject: false,
                fail: false,
                panics: false,
            }
        }
    }

    impl InboundSentinel for Recorder {
        fn inspect_inbound(&self, _ctx: &ExecutionContext) -> Result<(), Rejection> {
            self.log.lock().unwrap().push(format!("in:{}", self.label));
            if self.panics {
                panic!("{} blew up", self.label);
            }
            if self.reject {
                return Err(Rejection::denied(self.label));
            }
            Ok(())
        }
    }

    impl OutboundSentinel for Recorder {
        fn inspect_outbound(
            &self,
            _ctx: &ExecutionContext,
            _output: &mut dyn RawOutput,
        ) -> Result<(), SentinelError> {
            self.log.lock().unwrap().push(format!("out:{}", self.label));
            if self.panics {
                panic!("{} blew up", self.label);
            }
            if self.fail {
                return Err(SentinelError(self.label.to_string()));
            }
            Ok(())
        }
    }

    fn ctx() -> ExecutionContext {
        ExecutionContext::new(Arc::new(Input))
    }

    #[test]
    fn test_ordering_with_both() {
        let log = Log::default();
        let mut registry = SentinelRegistry::new();
        registry.register(SentinelRegistration::inbound(Recorder::new("a", &log)).order(5));
        registry.register(SentinelRegistration::both(Recorder::new("b", &log)).order(1));
        registry.register(SentinelRegistration::outbound(Recorder::new("c", &log)).order(-3));
        registry.register(SentinelRegistration::inbound(Recorder::new("d", &log)).order(5));

        let chain = registry.chain_for(&Scheme::HTTP);
        assert_eq!(chain.inbound().len(), 3);
        assert_eq!(chain.outbound().len(), 2);

        let ctx = ctx();
        chain.run_inbound(&ctx).unwrap();
        chain.run_outbound(&ctx, &mut Output(200));

        assert_eq!(
            *log.lock().unwrap(),
            vec!["in:b", "in:a", "in:d", "out:c", "out:b"]
        );
    }

    #[test]
    fn test_scheme_filter() {
        let log = Log::default();
        let mut registry = SentinelRegistry::new();
        registry.register(
            SentinelRegistration::inbound(Recorder::new("ws", &log))
                .schemes(SchemeSet::only([Scheme::WEBSOCKET])),
        );
        registry.register(SentinelRegistration::inbound(Recorder::new("all", &log)));

        assert_eq!(registry.chain_for(&Scheme::HTTP).inbound().len(), 1);
        assert_eq!(registry.chain_for(&Scheme::WEBSOCKET).inbound().len(), 2);
    }

    #[test]
    fn test_first_rejection_short_circuits() {
        let log = Log::default();
        let mut registry = SentinelRegistry::new();
        let mut blocker = Recorder::new("block", &log);
        blocker.reject = true;
        registry.register(SentinelRegistration::inbound(blocker).order(1));
        registry.register(SentinelRegistration::inbound(Recorder::new("late", &log)).order(2));

        let err = registry.chain_for(&Scheme::HTTP).run_inbound(&ctx()).unwrap_err();
        assert_eq!(err, PipelineError::AccessDenied("block".into()));
        assert_eq!(*log.lock().unwrap(), vec!["in:block"]);
    }

    #[test]
    fn test_outbound_failure_swallowed() {
        let log = Log::default();
        let mut registry = SentinelRegistry::new();
        let mut broken = Recorder::new("broken", &log);
        broken.fail = true;
        registry.register(SentinelRegistration::outbound(broken).order(1));
        registry.register(SentinelRegistration::outbound(Recorder::new("next", &log)).order(2));

        registry
            .chain_for(&Scheme::HTTP)
            .run_outbound(&ctx(), &mut Output(500));
        assert_eq!(*log.lock().unwrap(), vec!["out:broken", "out:next"]);
    }

    #[test]
    fn test_outbound_panic_contained() {
        let log = Log::default();
        let mut registry = SentinelRegistry::new();
        let mut broken = Recorder::new("panicky", &log);
        broken.panics = true;
        registry.register(SentinelRegistration::outbound(broken).order(1));
        registry.register(SentinelRegistration::outbound(Recorder::new("next", &log)).order(2));

        let mut output = Output(200);
        registry.chain_for(&Scheme::HTTP).run_outbound(&ctx(), &mut output);
        assert_eq!(output.status_code(), 200);
        assert_eq!(*log.lock().unwrap(), vec!["out:panicky", "out:next"]);
    }

    #[test]
    fn test_inbound_panic_becomes_failure() {
        let log = Log::default();
        let mut registry = SentinelRegistry::new();
        let mut broken = Recorder::new("panicky", &log);
        broken.panics = true;
        registry.register(SentinelRegistration::inbound(broken).order(1));
        registry.register(SentinelRegistration::inbound(Recorder::new("late", &log)).order(2));

        let err = registry.chain_for(&Scheme::HTTP).run_inbound(&ctx()).unwrap_err();
        assert!(matches!(err, PipelineError::HandlerExecution(ref m) if m.contains("panicky blew up")));
        assert_eq!(err.status_code(), 500);
        assert_eq!(*log.lock().unwrap(), vec!["in:panicky"]);
    }
}
