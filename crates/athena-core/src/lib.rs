//! Athena Core Library
//!
//! Rule orchestration for pipeline sanity checks: processes report problems
//! through threads, blueprints order them and wire links between them, and
//! callers run them interactively or in batch.

pub mod batch;
pub mod blueprint;
pub mod error;
pub mod feedback;
pub mod obs;
pub mod process;
pub mod register;
pub mod status;
pub mod tag;
pub mod telemetry;
pub mod thread;

pub use batch::{
    render_summary, run_batch, BatchEntry, BatchOptions, BatchReport, BatchSummary, CancelFlag,
    EntryState,
};
pub use blueprint::{
    ArgumentSlot, Blueprint, BlueprintDeclaration, BlueprintSettings, Link, LinkDeclaration,
    Outcome, ProcessDescription, Processor, ResolvedLink, StatusOverride,
};
pub use error::{AthenaError, Result};
pub use feedback::Feedback;
pub use obs::{
    emit_batch_finished, emit_blueprint_loaded, emit_link_failed, emit_process_invoked,
    BlueprintSpan,
};
pub use process::{
    Arguments, Context, Operation, Process, ProcessFactory, ProcessRegistry, ProcessType,
    ProgressFn, Settings, ToolHandle,
};
pub use register::{BlueprintSource, Register};
pub use status::{worst_fail, Color, Status, StatusFamily, StatusRegistry};
pub use tag::{Capabilities, ExecutionMode, Operations, Tag};
pub use telemetry::{init_tracing, LogFormat};
pub use thread::{CheckReport, Thread, ThreadFeedback, ThreadState, Threads};

/// Athena version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
