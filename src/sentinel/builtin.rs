//! Built-in sentinels.

use crate::model::{ExecutionContext, RawOutput};
use crate::sentinel::{InboundSentinel, OutboundSentinel, Rejection, SentinelError};

/// Header carrying the request's trace id on every output.
pub const TRACE_HEADER: &str = "x-trace-id";

/// Stamps `x-trace-id` on outputs so clients can correlate logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct TraceHeaderSentinel;

impl OutboundSentinel for TraceHeaderSentinel {
    fn name(&self) -> &str {
        "trace_header"
    }

    fn inspect_outbound(
        &self,
        ctx: &ExecutionContext,
        output: &mut dyn RawOutput,
    ) -> Result<(), SentinelError> {
        output.set_header(TRACE_HEADER, &ctx.trace_id().to_string());
        Ok(())
    }
}

/// Rejects inputs whose body exceeds `max_body_bytes`.
#[derive(Debug, Clone, Copy)]
pub struct ProtocolGuardSentinel {
    max_body_bytes: usize,
}

impl ProtocolGuardSentinel {
    pub fn new(max_body_bytes: usize) -> Self {
        Self { max_body_bytes }
    }
}

impl InboundSentinel for ProtocolGuardSentinel {
    fn name(&self) -> &str {
        "protocol_guard"
    }

    fn inspect_inbound(&self, ctx: &ExecutionContext) -> Result<(), Rejection> {
        let len = ctx.input().body().len();
        if self.max_body_bytes > 0 && len > self.max_body_bytes {
            return Err(Rejection::invalid(
                "body",
                format!("{len} bytes exceeds limit of {}", self.max_body_bytes),
            ));
        }
        Ok(())
    }
}
