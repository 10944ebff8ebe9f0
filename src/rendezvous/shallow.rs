//! Shallow stage: renders failures that never produced a handler result.
//!
//! Client-side failures (4xx) are logged at debug, server-side ones at warn.

use crate::error::PipelineError;
use crate::model::{ExecutionContext, RawOutput};
use crate::protocol::{Outcome, OutputBuilder};

pub(crate) fn render<O: RawOutput>(
    builder: &dyn OutputBuilder<O>,
    ctx: &ExecutionContext,
    err: PipelineError,
) -> O {
    let status = err.status_code();
    if status >= 500 {
        tracing::warn!(
            trace_id = %ctx.trace_id(),
            kind = %err.kind(),
            status,
            error = %err,
            "Request failed"
        );
    } else {
        tracing::debug!(
            trace_id = %ctx.trace_id(),
            kind = %err.kind(),
            status,
            error = %err,
            "Request rejected"
        );
    }
    builder.build(ctx, Outcome::Failure(err))
}
