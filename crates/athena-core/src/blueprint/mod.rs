//! Blueprints: ordered processors plus the resolved link graph between them.

pub mod declaration;
pub mod link;
pub mod processor;

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use crate::error::{AthenaError, Result};
use crate::obs;
use crate::process::{Operation, ProcessRegistry, ProgressFn, ToolHandle};
use crate::status::StatusRegistry;
use crate::tag::ExecutionMode;
use crate::thread::CheckReport;

pub use declaration::{
    ArgumentSlot, BlueprintDeclaration, BlueprintSettings, LinkDeclaration, ProcessDescription,
    StatusOverride,
};
pub use link::{Link, ResolvedLink};
pub use processor::Processor;

/// Result of one invocation.
#[derive(Debug)]
pub enum Outcome {
    /// The operation is not effective on the processor.
    Skipped,
    /// Feedback and worst fail status after a check or fix.
    Report(CheckReport),
    /// Whatever the tool returned.
    Tool(Option<ToolHandle>),
}

impl Outcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self, Outcome::Skipped)
    }

    pub fn report(&self) -> Option<&CheckReport> {
        match self {
            Outcome::Report(report) => Some(report),
            _ => None,
        }
    }

    pub fn into_report(self) -> Option<CheckReport> {
        match self {
            Outcome::Report(report) => Some(report),
            _ => None,
        }
    }
}

/// A built blueprint.
pub struct Blueprint {
    name: String,
    declaration: BlueprintDeclaration,
    digest: String,
    mode: ExecutionMode,
    processors: Vec<Processor>,
    progress: Option<Box<ProgressFn>>,
}

impl Blueprint {
    /// Build every processor and resolve links for `mode`.
    pub fn build(
        declaration: BlueprintDeclaration,
        processes: &ProcessRegistry,
        statuses: &StatusRegistry,
        mode: ExecutionMode,
    ) -> Result<Self> {
        declaration.validate()?;

        let mut processors = {
            let header: HashMap<&str, usize> = declaration
                .header
                .iter()
                .enumerate()
                .map(|(i, id)| (id.as_str(), i))
                .collect();

            declaration
                .header
                .iter()
                .enumerate()
                .map(|(index, id)| {
                    let description = declaration
                        .description(id)
                        .ok_or_else(|| AthenaError::UnknownProcessId(id.clone()))?;
                    Processor::build(id, index, description, &header, processes, statuses)
                })
                .collect::<Result<Vec<_>>>()?
        };
        link::resolve_links(&mut processors, mode)?;

        let blueprint = Self {
            name: declaration.display_name().to_string(),
            digest: declaration.digest()?,
            declaration,
            mode,
            processors,
            progress: None,
        };
        obs::emit_blueprint_loaded(
            &blueprint.name,
            blueprint.processors.len(),
            blueprint.resolved_link_count(),
            &blueprint.digest,
        );
        Ok(blueprint)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// SHA-256 of the declaration this blueprint was built from.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn declaration(&self) -> &BlueprintDeclaration {
        &self.declaration
    }

    /// Caller policy flags.
    pub fn settings(&self) -> &BlueprintSettings {
        &self.declaration.settings
    }

    /// Processors in header order.
    pub fn processors(&self) -> &[Processor] {
        &self.processors
    }

    pub fn processor(&self, id: &str) -> Option<&Processor> {
        self.processors.iter().find(|p| p.id() == id)
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.processors.iter().position(|p| p.id() == id)
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    pub fn resolved_link_count(&self) -> usize {
        self.processors.iter().map(Processor::resolved_link_count).sum()
    }

    /// Re-resolve links for `mode`. On failure the previous resolution stays.
    pub fn set_mode(&mut self, mode: ExecutionMode) -> Result<()> {
        if mode == self.mode {
            return Ok(());
        }
        if let Err(err) = link::resolve_links(&mut self.processors, mode) {
            link::resolve_links(&mut self.processors, self.mode)?;
            return Err(err);
        }
        tracing::debug!(
            blueprint = %self.name,
            mode = %mode,
            links = self.resolved_link_count(),
            "links re-resolved"
        );
        self.mode = mode;
        Ok(())
    }

    /// Install the sink that receives progress reports from running processes,
    /// replacing any previous one.
    pub fn set_progress(&mut self, sink: impl Fn(&str, f32, Option<&str>) + 'static) {
        self.progress = Some(Box::new(sink));
    }

    pub fn clear_progress(&mut self) {
        self.progress = None;
    }

    /// Move the progress sink of `previous` onto this blueprint.
    pub(crate) fn adopt_progress(&mut self, previous: &mut Blueprint) {
        self.progress = previous.progress.take();
    }

    /// Invoke `operation` on the processor at `index`.
    ///
    /// Returns [`Outcome::Skipped`] when the operation is not effective.
    /// Otherwise the process runs, then, if `run_links`, every link leaving
    /// this operation fires whether the call returned, failed or panicked.
    /// An error from the call itself is returned after the links ran and a
    /// panic is resumed. Errors from links are logged and only returned when
    /// the call itself succeeded.
    pub fn invoke(&self, index: usize, operation: Operation, run_links: bool) -> Result<Outcome> {
        let processor = self
            .processors
            .get(index)
            .ok_or_else(|| AthenaError::UnknownProcessId(format!("#{index}")))?;

        if !processor.capabilities().allows(operation) {
            tracing::debug!(
                processor = %processor.id(),
                operation = %operation,
                "operation not effective, skipped"
            );
            return Ok(Outcome::Skipped);
        }

        let started = Instant::now();
        let progress = self.progress.as_deref();
        let result = panic::catch_unwind(AssertUnwindSafe(|| processor.run(operation, progress)));
        let duration_ms = started.elapsed().as_millis() as u64;

        let link_error = if run_links {
            self.run_links(processor, operation)
        } else {
            None
        };

        match result {
            Err(payload) => panic::resume_unwind(payload),
            Ok(Err(err)) => {
                tracing::warn!(
                    processor = %processor.id(),
                    operation = %operation,
                    error = %err,
                    "invocation failed"
                );
                Err(err)
            }
            Ok(Ok(outcome)) => {
                obs::emit_process_invoked(
                    processor.id(),
                    operation,
                    outcome.report().map(|r| &r.status),
                    duration_ms,
                );
                match link_error {
                    Some(err) => Err(err),
                    None => Ok(outcome),
                }
            }
        }
    }

    /// [`Blueprint::invoke`] by processor id.
    pub fn invoke_id(&self, id: &str, operation: Operation, run_links: bool) -> Result<Outcome> {
        let index = self
            .index_of(id)
            .ok_or_else(|| AthenaError::UnknownProcessId(id.to_string()))?;
        self.invoke(index, operation, run_links)
    }

    /// Fire every link leaving `operation` on `processor`; return the first failure.
    fn run_links(&self, processor: &Processor, operation: Operation) -> Option<AthenaError> {
        let mut first_error = None;
        for link in processor.resolved_links(operation) {
            let Some(target) = self.processors.get(link.target) else {
                continue;
            };
            tracing::debug!(
                source = %processor.id(),
                target = %target.id(),
                operation = %link.operation,
                "running link"
            );

            let result = panic::catch_unwind(AssertUnwindSafe(|| {
                self.invoke(link.target, link.operation, true)
            }));
            let error = match result {
                Ok(Ok(_)) => None,
                Ok(Err(err)) => Some(err),
                Err(payload) => Some(AthenaError::Invocation {
                    process: target.id().to_string(),
                    operation: link.operation,
                    source: anyhow::anyhow!("panicked: {}", panic_message(payload.as_ref())),
                }),
            };
            if let Some(err) = error {
                obs::emit_link_failed(processor.id(), target.id(), link.operation, &err);
                first_error.get_or_insert(err);
            }
        }
        first_error
    }
}

impl fmt::Debug for Blueprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blueprint")
            .field("name", &self.name)
            .field("digest", &self.digest)
            .field("mode", &self.mode)
            .field("processors", &self.processors)
            .field("progress", &self.progress.is_some())
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
