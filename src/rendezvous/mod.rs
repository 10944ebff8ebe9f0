//! Rendezvous: the per-protocol request pipeline.
//!
//! # Data Flow
//! ```text
//! encounter(I)
//!     → ExecutionContext (trace id) + span
//!     → inbound sentinels            (inline)
//!     → normalize + resolve intent   (inline, or rendezvous pool)
//!     → registry lookup + access     (inline)
//!     → handler                      (conductor pool, awaited)
//!     → OutputBuilder / shallow      (inline)
//!     → outbound sentinels           (inline)
//!     → RequestEvent                 (central pool, fire-and-forget)
//!     → O
//! ```
//!
//! # Design Decisions
//! - `encounter` always yields an output; every failure is rendered
//! - The conductor hand-off is the only mandatory scheduling boundary
//! - A dropped `encounter` future does not cancel a submitted handler

mod shallow;

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::Instrument;

use crate::error::{panic_message, PipelineError};
use crate::model::{
    ExecutionContext, Intent, IntentKey, NormalizedRequest, Payload, RawInput, RawOutput,
};
use crate::observability::{Collector, RequestEvent, SUCCESS};
use crate::protocol::{Outcome, Protocol};
use crate::registry::{HandlerRegistry, Invocation};
use crate::sentinel::SentinelChain;
use crate::stage::{ExecutorError, StageExecutors};

/// Orchestrates one protocol's requests through the pipeline.
pub struct Rendezvous<I, O> {
    protocol: Protocol<I, O>,
    handlers: Arc<HandlerRegistry>,
    sentinels: SentinelChain,
    stages: Arc<StageExecutors>,
    collector: Arc<dyn Collector>,
    preprocess_on_pool: bool,
    deadline: Option<Duration>,
}

impl<I: RawInput, O: RawOutput> Rendezvous<I, O> {
    pub fn new(
        protocol: Protocol<I, O>,
        handlers: Arc<HandlerRegistry>,
        sentinels: SentinelChain,
        stages: Arc<StageExecutors>,
        collector: Arc<dyn Collector>,
    ) -> Self {
        Self {
            protocol,
            handlers,
            sentinels,
            stages,
            collector,
            preprocess_on_pool: false,
            deadline: None,
        }
    }

    /// Run normalize + resolve on the rendezvous pool.
    pub fn preprocess_on_pool(mut self, enabled: bool) -> Self {
        self.preprocess_on_pool = enabled;
        self
    }

    /// Stop waiting for handlers after `deadline`.
    pub fn deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn protocol(&self) -> &Protocol<I, O> {
        &self.protocol
    }

    /// Process one input and produce the protocol output for it.
    pub async fn encounter(&self, input: I) -> O {
        let input = Arc::new(input);
        let origin: Arc<dyn RawInput> = input.clone();
        let ctx = ExecutionContext::new(origin);

        let span = tracing::info_span!(
            "encounter",
            trace_id = %ctx.trace_id(),
            scheme = %ctx.scheme(),
            intent = tracing::field::Empty,
        );
        self.run(input, ctx).instrument(span).await
    }

    async fn run(&self, input: Arc<I>, mut ctx: ExecutionContext) -> O {
        let builder = self.protocol.output();
        let mut output = match self.process(&input, &mut ctx).await {
            Ok(result) => {
                ctx.set_result(result.clone());
                builder.build(&ctx, Outcome::Success(result))
            }
            Err(err) => {
                ctx.set_failure(err.clone());
                shallow::render(builder.as_ref(), &ctx, err)
            }
        };

        ctx.set_output_status(output.status_code());
        self.sentinels.run_outbound(&ctx, &mut output);

        tracing::debug!(
            status = output.status_code(),
            elapsed_ms = ctx.elapsed().as_millis() as u64,
            "Request complete"
        );
        self.emit(&ctx);
        output
    }

    async fn process(
        &self,
        input: &Arc<I>,
        ctx: &mut ExecutionContext,
    ) -> Result<Value, PipelineError> {
        self.sentinels.run_inbound(ctx)?;

        let (request, intent) = self.interpret(input).await?;
        let (key, payload) = intent.into_parts();
        tracing::Span::current().record("intent", key.as_str());
        ctx.set_request(request);
        ctx.set_intent(key.clone(), payload.clone());

        self.dispatch(ctx, key, payload).await
    }

    async fn interpret(&self, input: &Arc<I>) -> Result<(NormalizedRequest, Intent), PipelineError> {
        if !self.preprocess_on_pool {
            return interpret(&self.protocol, input);
        }

        let protocol = self.protocol.clone();
        let input = Arc::clone(input);
        let task = self
            .stages
            .rendezvous
            .submit(move || interpret(&protocol, &input))
            .map_err(|e| stage_error("rendezvous", e))?;
        task.await.map_err(|e| stage_error("rendezvous", e))?
    }

    async fn dispatch(
        &self,
        ctx: &ExecutionContext,
        key: IntentKey,
        payload: Payload,
    ) -> Result<Value, PipelineError> {
        let registration = self
            .handlers
            .resolve(key.as_str())
            .ok_or_else(|| PipelineError::UnresolvedIntent(key.to_string()))?;

        if !registration.allows(ctx.scheme()) {
            return Err(PipelineError::AccessDenied(format!(
                "intent '{key}' is not available over {}",
                ctx.scheme()
            )));
        }

        let handler = Arc::clone(registration.handler());
        let invocation = Invocation::new(
            ctx.trace_id(),
            ctx.scheme().clone(),
            key,
            payload,
            self.deadline.map(|d| Instant::now() + d),
        );

        let task = self
            .stages
            .conductor
            .submit(move || panic::catch_unwind(AssertUnwindSafe(|| handler.handle(&invocation))))
            .map_err(|e| stage_error("conductor", e))?;

        let joined = match self.deadline {
            Some(limit) => tokio::time::timeout(limit, task)
                .await
                .map_err(|_| PipelineError::DeadlineExceeded(limit.as_millis() as u64))?,
            None => task.await,
        };

        match joined.map_err(|e| stage_error("conductor", e))? {
            Ok(result) => result.map_err(PipelineError::from),
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(panic = %message, "Handler panicked");
                Err(PipelineError::HandlerExecution(message))
            }
        }
    }

    fn emit(&self, ctx: &ExecutionContext) {
        let event = RequestEvent {
            trace_id: ctx.trace_id(),
            scheme: ctx.scheme().clone(),
            intent: ctx.intent().map(ToString::to_string),
            outcome: ctx.failure().map_or(SUCCESS, |e| e.kind().as_str()),
            status: ctx.output_status().unwrap_or(500),
            duration: ctx.elapsed(),
        };

        let sink = Arc::clone(&self.collector);
        let queued = event.clone();
        if self.stages.central.spawn(move || sink.record(&queued)).is_err() {
            // Central stage already stopped; record on the caller.
            self.collector.record(&event);
        }
    }
}

impl<I, O> fmt::Debug for Rendezvous<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rendezvous")
            .field("protocol", &self.protocol)
            .field("preprocess_on_pool", &self.preprocess_on_pool)
            .field("deadline", &self.deadline)
            .finish()
    }
}

fn interpret<I: RawInput, O: RawOutput>(
    protocol: &Protocol<I, O>,
    input: &Arc<I>,
) -> Result<(NormalizedRequest, Intent), PipelineError> {
    let request = protocol.normalizer().normalize(input)?;
    let intent = protocol.resolver().resolve(&request)?;
    Ok((request, intent))
}

fn stage_error(stage: &str, err: ExecutorError) -> PipelineError {
    match err {
        ExecutorError::Abandoned => {
            PipelineError::HandlerExecution(format!("{stage} job abandoned"))
        }
        other => PipelineError::Unavailable(format!("{stage} stage: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{StageConfig, StagesConfig};
    use crate::model::Scheme;
    use crate::observability::InMemoryCollector;
    use crate::protocol::http::{http_protocol, HttpInput, HttpOutput};
    use crate::registry::{AccessPolicy, HandlerError};
    use crate::sentinel::{
        InboundSentinel, OutboundSentinel, Rejection, SentinelError, SentinelRegistration,
        SentinelRegistry, TraceHeaderSentinel, TRACE_HEADER,
    };
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn small_stages() -> Arc<StageExecutors> {
        let stage = StageConfig {
            core_threads: 1,
            max_threads: 2,
            queue_capacity: 8,
            keep_alive_ms: 1000,
        };
        let config = StagesConfig {
            rendezvous: stage.clone(),
            conductor: stage.clone(),
            central: stage,
            preprocess_on_pool: false,
            handler_deadline_ms: None,
        };
        Arc::new(StageExecutors::new(&config).unwrap())
    }

    struct Fixture {
        handlers: HandlerRegistry,
        sentinels: SentinelRegistry,
        collector: Arc<InMemoryCollector>,
        stages: Arc<StageExecutors>,
    }

    impl Fixture {
        fn new() -> Self {
            let mut sentinels = SentinelRegistry::new();
            sentinels.register(SentinelRegistration::outbound(TraceHeaderSentinel));
            Self {
                handlers: HandlerRegistry::new(),
                sentinels,
                collector: Arc::new(InMemoryCollector::new()),
                stages: small_stages(),
            }
        }

        fn build(self) -> (Rendezvous<HttpInput, HttpOutput>, Arc<InMemoryCollector>, Arc<StageExecutors>) {
            let rendezvous = Rendezvous::new(
                http_protocol(),
                Arc::new(self.handlers),
                self.sentinels.chain_for(&Scheme::HTTP),
                Arc::clone(&self.stages),
                self.collector.clone(),
            );
            (rendezvous, self.collector, self.stages)
        }
    }

    fn body(out: &HttpOutput) -> Value {
        serde_json::from_slice(&out.body).unwrap()
    }

    async fn drain(stages: Arc<StageExecutors>) {
        tokio::task::spawn_blocking(move || stages.shutdown_and_join())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_success_renders_handler_result() {
        let mut fx = Fixture::new();
        fx.handlers
            .register("user.get", |inv: &Invocation| -> Result<Value, HandlerError> {
                Ok(json!({"id": inv.require_str("id")?}))
            })
            .unwrap();
        let (rendezvous, collector, stages) = fx.build();

        let out = rendezvous.encounter(HttpInput::new("GET", "/users/42")).await;
        assert_eq!(out.status, 200);
        assert_eq!(body(&out), json!({"id": "42"}));
        assert!(out.header(TRACE_HEADER).is_some());

        drain(stages).await;
        assert_eq!(collector.outcome_count(SUCCESS), 1);
        assert_eq!(collector.intent_count("user.get"), 1);
    }

    #[tokio::test]
    async fn test_unregistered_intent_is_404() {
        let (rendezvous, collector, stages) = Fixture::new().build();

        let out = rendezvous.encounter(HttpInput::new("GET", "/widgets")).await;
        assert_eq!(out.status, 404);
        assert_eq!(body(&out)["error"]["kind"], "unresolved_intent");

        drain(stages).await;
        assert_eq!(collector.outcome_count("unresolved_intent"), 1);
    }

    #[tokio::test]
    async fn test_access_policy_blocks_scheme() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut fx = Fixture::new();
        fx.handlers
            .register_with_access(
                "user.delete",
                move |_: &Invocation| -> Result<Value, HandlerError> {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(Value::Null)
                },
                AccessPolicy::only([Scheme::RPC]),
            )
            .unwrap();
        let (rendezvous, _, _) = fx.build();

        let out = rendezvous.encounter(HttpInput::new("DELETE", "/users/1")).await;
        assert_eq!(out.status, 403);
        assert_eq!(body(&out)["error"]["kind"], "access_denied");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    struct DenyAll;

    impl InboundSentinel for DenyAll {
        fn inspect_inbound(&self, _ctx: &ExecutionContext) -> Result<(), Rejection> {
            Err(Rejection::denied("blocked"))
        }
    }

    #[tokio::test]
    async fn test_inbound_rejection_skips_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut fx = Fixture::new();
        fx.handlers
            .register("user.list", move |_: &Invocation| -> Result<Value, HandlerError> {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(json!([]))
            })
            .unwrap();
        fx.sentinels.register(SentinelRegistration::inbound(DenyAll));
        let (rendezvous, _, _) = fx.build();

        let out = rendezvous.encounter(HttpInput::new("GET", "/users")).await;
        assert_eq!(out.status, 403);
        assert_eq!(body(&out)["error"]["kind"], "access_denied");
        assert!(out.header(TRACE_HEADER).is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_handler_failure_still_runs_outbound() {
        let mut fx = Fixture::new();
        fx.handlers
            .register("user.list", |_: &Invocation| -> Result<Value, HandlerError> {
                Err(HandlerError::failed("database offline"))
            })
            .unwrap();
        let (rendezvous, _, _) = fx.build();

        let out = rendezvous.encounter(HttpInput::new("GET", "/users")).await;
        let doc = body(&out);
        assert_eq!(out.status, 500);
        assert_eq!(doc["error"]["kind"], "handler_execution");
        assert_eq!(doc["error"]["message"], "Internal handler error");
        assert_eq!(out.header(TRACE_HEADER), doc["trace_id"].as_str());
    }

    #[tokio::test]
    async fn test_handler_panic_is_rendered() {
        let mut fx = Fixture::new();
        fx.handlers
            .register("user.list", |_: &Invocation| -> Result<Value, HandlerError> {
                panic!("boom")
            })
            .unwrap();
        let (rendezvous, _, _) = fx.build();

        let out = rendezvous.encounter(HttpInput::new("GET", "/users")).await;
        assert_eq!(out.status, 500);
        assert_eq!(body(&out)["error"]["kind"], "handler_execution");
    }

    #[tokio::test]
    async fn test_handler_validation_error() {
        let mut fx = Fixture::new();
        fx.handlers
            .register("user.create", |inv: &Invocation| -> Result<Value, HandlerError> {
                inv.require_str("name")?;
                Ok(Value::Null)
            })
            .unwrap();
        let (rendezvous, _, _) = fx.build();

        let out = rendezvous
            .encounter(HttpInput::new("POST", "/users").body(b"{}".to_vec()))
            .await;
        assert_eq!(out.status, 422);
        assert!(body(&out)["error"]["fields"]["name"].is_string());
    }

    #[tokio::test]
    async fn test_deadline_exceeded() {
        let mut fx = Fixture::new();
        fx.handlers
            .register("user.list", |_: &Invocation| -> Result<Value, HandlerError> {
                std::thread::sleep(Duration::from_millis(300));
                Ok(json!([]))
            })
            .unwrap();
        let (rendezvous, _, _) = fx.build();
        let rendezvous = rendezvous.deadline(Some(Duration::from_millis(20)));

        let out = rendezvous.encounter(HttpInput::new("GET", "/users")).await;
        assert_eq!(out.status, 504);
        assert_eq!(body(&out)["error"]["kind"], "deadline_exceeded");
    }

    #[tokio::test]
    async fn test_preprocess_on_pool_matches_inline() {
        let mut fx = Fixture::new();
        fx.handlers
            .register("order.get", |inv: &Invocation| -> Result<Value, HandlerError> {
                Ok(inv.payload().clone())
            })
            .unwrap();
        let (rendezvous, _, _) = fx.build();
        let rendezvous = rendezvous.preprocess_on_pool(true);

        let out = rendezvous.encounter(HttpInput::new("GET", "/orders/9?x=1")).await;
        assert_eq!(out.status, 200);
        assert_eq!(body(&out), json!({"x": "1", "id": "9"}));
    }

    #[tokio::test]
    async fn test_malformed_input_is_400() {
        let (rendezvous, _, _) = Fixture::new().build();
        let out = rendezvous.encounter(HttpInput::new("GET", "/bad uri")).await;
        assert_eq!(out.status, 400);
        assert_eq!(body(&out)["error"]["kind"], "malformed_input");
    }

    #[tokio::test]
    async fn test_shutdown_conductor_is_unavailable() {
        let mut fx = Fixture::new();
        fx.handlers
            .register("user.list", |_: &Invocation| -> Result<Value, HandlerError> {
                Ok(json!([]))
            })
            .unwrap();
        let (rendezvous, collector, stages) = fx.build();
        drain(stages).await;

        let out = rendezvous.encounter(HttpInput::new("GET", "/users")).await;
        assert_eq!(out.status, 503);
        // Recorded inline since the central stage is gone.
        assert_eq!(collector.outcome_count("unavailable"), 1);
    }

    struct TraceWitness(Arc<Mutex<Option<(String, bool)>>>);

    impl InboundSentinel for TraceWitness {
        fn inspect_inbound(&self, ctx: &ExecutionContext) -> Result<(), Rejection> {
            *self.0.lock().unwrap() = Some((ctx.trace_id().to_string(), ctx.request().is_none()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_trace_id_exists_before_normalize() {
        let seen = Arc::new(Mutex::new(None));
        let mut fx = Fixture::new();
        fx.sentinels
            .register(SentinelRegistration::inbound(TraceWitness(seen.clone())));
        let (rendezvous, _, _) = fx.build();

        let out = rendezvous.encounter(HttpInput::new("GET", "/bad uri")).await;
        let (trace_id, before_normalize) = seen.lock().unwrap().clone().unwrap();
        assert!(before_normalize);
        assert_eq!(out.header(TRACE_HEADER), Some(trace_id.as_str()));
    }

    struct Explodes;

    impl OutboundSentinel for Explodes {
        fn inspect_outbound(
            &self,
            _ctx: &ExecutionContext,
            _output: &mut dyn RawOutput,
        ) -> Result<(), SentinelError> {
            panic!("outbound exploded");
        }
    }

    impl InboundSentinel for Explodes {
        fn inspect_inbound(&self, _ctx: &ExecutionContext) -> Result<(), Rejection> {
            panic!("inbound exploded");
        }
    }

    #[tokio::test]
    async fn test_outbound_panic_keeps_response() {
        let mut fx = Fixture::new();
        fx.handlers
            .register("user.list", |_: &Invocation| -> Result<Value, HandlerError> {
                Ok(json!([]))
            })
            .unwrap();
        fx.sentinels
            .register(SentinelRegistration::outbound(Explodes).order(-1));
        let (rendezvous, collector, stages) = fx.build();

        let out = rendezvous.encounter(HttpInput::new("GET", "/users")).await;
        assert_eq!(out.status, 200);
        assert_eq!(body(&out), json!([]));
        assert!(out.header(TRACE_HEADER).is_some());

        drain(stages).await;
        assert_eq!(collector.outcome_count(SUCCESS), 1);
    }

    #[tokio::test]
    async fn test_inbound_panic_renders_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut fx = Fixture::new();
        fx.handlers
            .register("user.list", move |_: &Invocation| -> Result<Value, HandlerError> {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(json!([]))
            })
            .unwrap();
        fx.sentinels.register(SentinelRegistration::inbound(Explodes));
        let (rendezvous, collector, stages) = fx.build();

        let out = rendezvous.encounter(HttpInput::new("GET", "/users")).await;
        assert_eq!(out.status, 500);
        assert_eq!(body(&out)["error"]["kind"], "handler_execution");
        assert!(out.header(TRACE_HEADER).is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        drain(stages).await;
        assert_eq!(collector.outcome_count("handler_execution"), 1);
    }
}
