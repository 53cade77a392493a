//! Operation and Stage Observation
//!
//! Cross-cutting timing/audit is modeled as an injected observer the
//! engine calls at well-defined entry and exit points, never as ambient
//! global state. [`TracingObserver`] forwards stage transitions to
//! `tracing`; [`NoopObserver`] discards them.

/// Receiver for operation/stage lifecycle events emitted by the query and
/// merge engines.
pub trait StageObserver: Send + Sync {
    /// A named stage of an operation began.
    fn on_stage_start(&self, operation: &str, stage: &str) {
        let _ = (operation, stage);
    }

    /// A named stage of an operation completed, with a short free-text
    /// detail (e.g. result counts).
    fn on_stage_end(&self, operation: &str, stage: &str, detail: &str) {
        let _ = (operation, stage, detail);
    }

    /// An operation failed; `error` is the rendered error message.
    fn on_operation_failed(&self, operation: &str, error: &str) {
        let _ = (operation, error);
    }
}

/// Observer that discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl StageObserver for NoopObserver {}

/// Observer that emits one `tracing` event per stage transition.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl StageObserver for TracingObserver {
    fn on_stage_start(&self, operation: &str, stage: &str) {
        tracing::debug!(operation, stage, "stage started");
    }

    fn on_stage_end(&self, operation: &str, stage: &str, detail: &str) {
        tracing::debug!(operation, stage, detail, "stage completed");
    }

    fn on_operation_failed(&self, operation: &str, error: &str) {
        tracing::warn!(operation, error, "operation failed");
    }
}
