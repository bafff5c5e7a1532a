//! Structured observability hooks for blueprint lifecycle events.
//!
//! Events are emitted with an `event` field so they can be filtered in
//! JSON output (see [`crate::init_tracing`]).

use tracing::{debug, info, warn};

use crate::process::Operation;
use crate::status::Status;

/// RAII guard entering a blueprint-scoped span.
///
/// ```ignore
/// let _span = BlueprintSpan::enter("model", Some(&run_id));
/// ```
pub struct BlueprintSpan {
    _span: tracing::span::EnteredSpan,
}

impl BlueprintSpan {
    pub fn enter(blueprint: &str, run_id: Option<&str>) -> Self {
        let span = tracing::info_span!(
            "athena.blueprint",
            blueprint = %blueprint,
            run_id = run_id.unwrap_or("-")
        );
        Self {
            _span: span.entered(),
        }
    }
}

/// Emit event: blueprint built and its links resolved.
pub fn emit_blueprint_loaded(
    blueprint: &str,
    processors: usize,
    resolved_links: usize,
    digest: &str,
) {
    info!(
        event = "blueprint.loaded",
        blueprint = %blueprint,
        processors = processors,
        resolved_links = resolved_links,
        digest = digest.get(..12).unwrap_or(digest),
    );
}

/// Emit event: one operation ran on a processor.
pub fn emit_process_invoked(
    processor: &str,
    operation: Operation,
    status: Option<&Status>,
    duration_ms: u64,
) {
    debug!(
        event = "process.invoked",
        processor = %processor,
        operation = %operation,
        status = status.map(Status::name).unwrap_or("-"),
        duration_ms = duration_ms,
    );
}

/// Emit event: a linked invocation failed and was not propagated.
pub fn emit_link_failed(
    source: &str,
    target: &str,
    operation: Operation,
    error: &dyn std::fmt::Display,
) {
    warn!(
        event = "link.failed",
        source = %source,
        target = %target,
        operation = %operation,
        error = %error,
    );
}

/// Emit event: batch run finished.
pub fn emit_batch_finished(
    blueprint: &str,
    run_id: &str,
    duration_ms: u64,
    failed: usize,
    exceptions: usize,
    passed: bool,
) {
    info!(
        event = "batch.finished",
        blueprint = %blueprint,
        run_id = %run_id,
        duration_ms = duration_ms,
        failed = failed,
        exceptions = exceptions,
        passed = passed,
    );
}
