//! Unattended blueprint runs.
//!
//! The batch caller owns run policy: which processors to run, whether to fix
//! and re-check, when to stop. Invocation errors and panics are caught per
//! processor and reported with the `Exception` status.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::blueprint::{Blueprint, BlueprintSettings, Outcome, Processor};
use crate::error::{AthenaError, Result};
use crate::obs::{self, BlueprintSpan};
use crate::process::Operation;
use crate::status::Status;
use crate::tag::ExecutionMode;
use crate::thread::{CheckReport, ThreadFeedback};

/// Caller options for [`run_batch`].
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchOptions {
    /// Fix processors whose check failed.
    pub fix: bool,
    /// Stop after the first blocking failure or exception.
    pub fail_fast: bool,
}

/// Cooperative stop request, checked between processors only.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How one processor ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryState {
    Passed,
    Failed,
    /// Check failed, fix ran, and the re-check (if any) passed.
    Fixed,
    Exception,
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchEntry {
    pub id: String,
    pub name: String,
    pub category: String,
    pub state: EntryState,
    pub status: Status,
    pub non_blocking: bool,
    pub feedbacks: Vec<ThreadFeedback>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
    pub duration_ms: u64,
}

impl BatchEntry {
    fn new(processor: &Processor, state: EntryState, status: Status) -> Self {
        Self {
            id: processor.id().to_string(),
            name: processor.name(),
            category: processor.category().to_string(),
            state,
            status,
            non_blocking: processor.capabilities().non_blocking,
            feedbacks: Vec::new(),
            error: None,
            skip_reason: None,
            duration_ms: 0,
        }
    }

    fn skipped(processor: &Processor, reason: &str) -> Self {
        let mut entry = Self::new(processor, EntryState::Skipped, Status::DEFAULT);
        entry.skip_reason = Some(reason.to_string());
        entry
    }

    fn exception(processor: &Processor, error: String) -> Self {
        let mut entry = Self::new(processor, EntryState::Exception, Status::EXCEPTION);
        entry.error = Some(error);
        entry
    }

    /// A failure that should fail the run.
    pub fn is_blocking(&self) -> bool {
        match self.state {
            EntryState::Exception => true,
            EntryState::Failed => !self.non_blocking,
            _ => false,
        }
    }
}

/// Counts per entry state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub fixed: usize,
    pub exceptions: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub run_id: Uuid,
    pub blueprint: String,
    pub digest: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub entries: Vec<BatchEntry>,
    pub cancelled: bool,
}

impl BatchReport {
    /// No exception and no blocking failure. Non-blocking failures pass.
    pub fn passed(&self) -> bool {
        !self.cancelled && !self.entries.iter().any(BatchEntry::is_blocking)
    }

    pub fn summary(&self) -> BatchSummary {
        let mut summary = BatchSummary {
            total: self.entries.len(),
            ..BatchSummary::default()
        };
        for entry in &self.entries {
            match entry.state {
                EntryState::Passed => summary.passed += 1,
                EntryState::Failed => summary.failed += 1,
                EntryState::Fixed => summary.fixed += 1,
                EntryState::Exception => summary.exceptions += 1,
                EntryState::Skipped => summary.skipped += 1,
            }
        }
        summary
    }

    pub fn entry(&self, id: &str) -> Option<&BatchEntry> {
        self.entries.iter().find(|e| e.id == id)
    }
}

/// Run every batch-eligible processor of `blueprint` in header order.
///
/// The blueprint must be resolved for batch mode, otherwise links could reach
/// processors excluded from batch runs.
pub fn run_batch(
    blueprint: &Blueprint,
    options: &BatchOptions,
    cancel: &CancelFlag,
) -> Result<BatchReport> {
    if blueprint.mode() != ExecutionMode::Batch {
        return Err(AthenaError::ModeMismatch {
            blueprint: blueprint.name().to_string(),
            expected: ExecutionMode::Batch,
            actual: blueprint.mode(),
        });
    }

    let run_id = Uuid::new_v4();
    let _span = BlueprintSpan::enter(blueprint.name(), Some(&run_id.to_string()));
    let settings = blueprint.settings();
    let started_at = Utc::now();
    let started = Instant::now();

    let mut entries = Vec::with_capacity(blueprint.len());
    let mut cancelled = false;

    for (index, processor) in blueprint.processors().iter().enumerate() {
        if settings.allow_request_stop && cancel.is_cancelled() {
            tracing::info!(blueprint = %blueprint.name(), "stop requested, run cancelled");
            cancelled = true;
            break;
        }

        let entry = run_processor(blueprint, index, processor, options, settings);
        let stop = options.fail_fast && entry.is_blocking();
        entries.push(entry);
        if stop {
            tracing::info!(
                processor = %processor.id(),
                "fail fast: stopping after blocking failure"
            );
            break;
        }
    }

    let report = BatchReport {
        run_id,
        blueprint: blueprint.name().to_string(),
        digest: blueprint.digest().to_string(),
        started_at,
        finished_at: Utc::now(),
        entries,
        cancelled,
    };
    let summary = report.summary();
    obs::emit_batch_finished(
        &report.blueprint,
        &run_id.to_string(),
        started.elapsed().as_millis() as u64,
        summary.failed,
        summary.exceptions,
        report.passed(),
    );
    Ok(report)
}

fn run_processor(
    blueprint: &Blueprint,
    index: usize,
    processor: &Processor,
    options: &BatchOptions,
    settings: &BlueprintSettings,
) -> BatchEntry {
    let capabilities = processor.capabilities();
    if !capabilities.enabled {
        return BatchEntry::skipped(processor, "disabled");
    }
    if !capabilities.available_in(ExecutionMode::Batch) {
        return BatchEntry::skipped(processor, "excluded from batch");
    }
    if !capabilities.check {
        return BatchEntry::skipped(processor, "not checkable");
    }

    let started = Instant::now();
    let mut entry = match guarded_report(blueprint, index, Operation::Check) {
        Ok(report) => {
            if report.is_failed() && options.fix && capabilities.fix {
                fix_and_recheck(blueprint, index, processor, settings)
            } else {
                let state = if report.is_failed() {
                    EntryState::Failed
                } else {
                    EntryState::Passed
                };
                with_report(processor, state, report, settings)
            }
        }
        Err(error) => BatchEntry::exception(processor, error),
    };
    entry.duration_ms = started.elapsed().as_millis() as u64;
    entry
}

fn fix_and_recheck(
    blueprint: &Blueprint,
    index: usize,
    processor: &Processor,
    settings: &BlueprintSettings,
) -> BatchEntry {
    let fixed = match guarded_report(blueprint, index, Operation::Fix) {
        Ok(report) => report,
        Err(error) => return BatchEntry::exception(processor, error),
    };
    if !settings.recheck {
        return with_report(processor, EntryState::Fixed, fixed, settings);
    }

    match guarded_report(blueprint, index, Operation::Check) {
        Ok(report) => {
            let state = if report.is_failed() {
                EntryState::Failed
            } else {
                EntryState::Fixed
            };
            with_report(processor, state, report, settings)
        }
        Err(error) => BatchEntry::exception(processor, error),
    }
}

fn with_report(
    processor: &Processor,
    state: EntryState,
    report: CheckReport,
    settings: &BlueprintSettings,
) -> BatchEntry {
    let mut entry = BatchEntry::new(processor, state, report.status);
    let mut feedbacks = report.feedbacks;
    if settings.order_feedbacks_by_priority {
        let key = |f: &ThreadFeedback| {
            if f.status.is_fail() {
                f.status.priority()
            } else {
                f32::MIN
            }
        };
        feedbacks.sort_by(|a, b| key(b).total_cmp(&key(a)));
    }
    if settings.feedback_display_warning {
        for feedback in &feedbacks {
            if feedback.feedback.len() > settings.feedback_display_warning_limit {
                tracing::warn!(
                    processor = %entry.id,
                    thread = %feedback.thread,
                    items = feedback.feedback.len(),
                    limit = settings.feedback_display_warning_limit,
                    "large feedback"
                );
            }
        }
    }
    entry.feedbacks = feedbacks;
    entry
}

/// Invoke with links, turning errors and panics into a message.
fn guarded_report(
    blueprint: &Blueprint,
    index: usize,
    operation: Operation,
) -> std::result::Result<CheckReport, String> {
    let result = panic::catch_unwind(AssertUnwindSafe(|| blueprint.invoke(index, operation, true)));
    match result {
        Ok(Ok(Outcome::Report(report))) => Ok(report),
        Ok(Ok(_)) => Ok(CheckReport {
            feedbacks: Vec::new(),
            status: Status::DEFAULT,
        }),
        Ok(Err(err)) => {
            tracing::warn!(operation = %operation, error = %err, "invocation raised");
            Err(err.to_string())
        }
        Err(_) => Err(format!("{operation} panicked")),
    }
}

/// Human readable summary of a report.
pub fn render_summary(report: &BatchReport) -> String {
    let mut out = String::new();
    out.push_str(&format!("Blueprint {} (run {})\n", report.blueprint, report.run_id));
    for entry in &report.entries {
        let marker = match entry.state {
            EntryState::Passed => "ok",
            EntryState::Fixed => "fixed",
            EntryState::Failed if entry.non_blocking => "warn",
            EntryState::Failed => "FAIL",
            EntryState::Exception => "ERROR",
            EntryState::Skipped => "skip",
        };
        out.push_str(&format!("  [{marker:>5}] {} ({})", entry.name, entry.status));
        if let Some(reason) = &entry.skip_reason {
            out.push_str(&format!(" - {reason}"));
        }
        if let Some(error) = &entry.error {
            out.push_str(&format!(" - {error}"));
        }
        out.push('\n');
        for feedback in &entry.feedbacks {
            out.push_str(&format!("      {} [{}]\n", feedback.title, feedback.status));
            for item in feedback.feedback.to_display() {
                out.push_str(&format!("        - {item}\n"));
            }
        }
    }

    let summary = report.summary();
    out.push_str(&format!(
        "{} processors: {} passed, {} fixed, {} failed, {} exceptions, {} skipped{}\n",
        summary.total,
        summary.passed,
        summary.fixed,
        summary.failed,
        summary.exceptions,
        summary.skipped,
        if report.cancelled { " (cancelled)" } else { "" },
    ));
    out.push_str(if report.passed() { "PASSED\n" } else { "FAILED\n" });
    out
}
