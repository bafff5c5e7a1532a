//! Processor: one executable blueprint entry.
//!
//! A processor binds a process type to its arguments, tags, status overrides
//! and links. The process itself is only constructed on first use.

use std::cell::{RefCell, RefMut};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use regex::Regex;

use crate::blueprint::declaration::{ArgumentSlot, ProcessDescription};
use crate::blueprint::link::{Link, ResolvedLink};
use crate::blueprint::Outcome;
use crate::error::{AthenaError, Result};
use crate::process::{
    Context, Operation, Process, ProcessFactory, ProcessRegistry, ProgressFn, Settings,
};
use crate::status::{Status, StatusFamily, StatusRegistry};
use crate::tag::{Capabilities, ExecutionMode, Tag};
use crate::thread::{ThreadFeedback, Threads};

const NO_DOCUMENTATION: &str = "No documentation available for this process.";

/// A validated status override for one thread.
#[derive(Debug, Clone)]
struct ThreadOverride {
    thread: String,
    fail: Option<Status>,
    success: Option<Status>,
}

/// Runtime state of a constructed process.
struct ProcessInstance {
    process: Box<dyn Process>,
    threads: Threads,
    checked: bool,
}

pub struct Processor {
    id: String,
    index: usize,
    factory: Arc<ProcessFactory>,
    description: ProcessDescription,
    capabilities: Capabilities,
    overrides: Vec<ThreadOverride>,
    links: Vec<Link>,
    pub(crate) resolved: HashMap<Operation, Vec<ResolvedLink>>,
    instance: RefCell<Option<ProcessInstance>>,
}

impl Processor {
    /// Build the processor for header entry `index`.
    ///
    /// Fails on an unknown process path, or on a status override naming an
    /// undeclared thread, an unregistered status, or a status of the wrong family.
    pub(crate) fn build(
        id: &str,
        index: usize,
        description: &ProcessDescription,
        header: &HashMap<&str, usize>,
        processes: &ProcessRegistry,
        statuses: &StatusRegistry,
    ) -> Result<Self> {
        let factory = processes.resolve(&description.process)?;

        let mut overrides = Vec::with_capacity(description.status_overrides.len());
        for (thread, status_override) in &description.status_overrides {
            if !factory.declares_thread(thread) {
                return Err(AthenaError::UnknownThread {
                    process: description.process.clone(),
                    thread: thread.clone(),
                });
            }
            overrides.push(ThreadOverride {
                thread: thread.clone(),
                fail: resolve_override(
                    statuses,
                    status_override.fail.as_deref(),
                    StatusFamily::Fail,
                )?,
                success: resolve_override(
                    statuses,
                    status_override.success.as_deref(),
                    StatusFamily::Success,
                )?,
            });
        }

        let links = description
            .links
            .iter()
            .map(|declared| Link::from_declaration(declared, header))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            id: id.to_string(),
            index,
            capabilities: Capabilities::resolve(factory.operations(), description.tags),
            factory,
            description: description.clone(),
            overrides,
            links,
            resolved: HashMap::new(),
            instance: RefCell::new(None),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Position in the blueprint header.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Type name split on camel case, e.g. `NoNGons` -> `No N Gons`.
    pub fn name(&self) -> String {
        camel_case_split(self.factory.type_name())
    }

    pub fn process_path(&self) -> &str {
        self.factory.path()
    }

    pub fn category(&self) -> &str {
        &self.description.category
    }

    pub fn tags(&self) -> Tag {
        self.description.tags
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn is_available(&self, mode: ExecutionMode) -> bool {
        self.capabilities.available_in(mode)
    }

    pub fn settings(&self) -> &Settings {
        &self.description.settings
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// Links that fire after `operation`, as resolved for the current mode.
    pub fn resolved_links(&self, operation: Operation) -> &[ResolvedLink] {
        self.resolved.get(&operation).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn resolved_link_count(&self) -> usize {
        self.resolved.values().map(Vec::len).sum()
    }

    /// Whether the last check completed without a fix since.
    pub fn is_checked(&self) -> bool {
        self.instance
            .borrow()
            .as_ref()
            .is_some_and(|instance| instance.checked)
    }

    pub fn is_constructed(&self) -> bool {
        self.instance.borrow().is_some()
    }

    /// Documentation of the process type followed by its path, with `{key}`
    /// placeholders filled from the instance's `doc_format`. Unknown keys
    /// become empty.
    pub fn documentation(&self) -> Result<String> {
        let instance = self.instance_mut()?;
        let values = instance.process.doc_format();
        let raw = format!(
            "{}\n{}",
            self.factory.documentation().unwrap_or(NO_DOCUMENTATION).trim_end(),
            self.factory.path()
        );
        Ok(placeholder_pattern()
            .replace_all(&raw, |caps: &regex::Captures<'_>| {
                values.get(&caps[1]).cloned().unwrap_or_default()
            })
            .into_owned())
    }

    /// Snapshot of the current thread states.
    pub fn threads(&self) -> Result<Vec<ThreadFeedback>> {
        let instance = self.instance_mut()?;
        Ok(instance.threads.iter().map(ThreadFeedback::from).collect())
    }

    /// Run `operation` on the process without capability checks or links.
    ///
    /// Threads are reset before a check. The checked flag is raised after a
    /// successful check and lowered once a fix returns successfully. A fix
    /// that errors leaves the flag as it was.
    pub(crate) fn run(
        &self,
        operation: Operation,
        progress: Option<&ProgressFn>,
    ) -> Result<Outcome> {
        let mut guard = self.instance_mut()?;
        let instance = &mut *guard;
        let arguments = self.description.arguments_for(ArgumentSlot::from(operation));
        let name = self.factory.type_name();
        let settings = &self.description.settings;

        let invocation = |source| AthenaError::Invocation {
            process: self.id.clone(),
            operation,
            source,
        };

        if operation == Operation::Check {
            instance.threads.reset_all();
        }
        let mut ctx = Context::new(name, &mut instance.threads, &arguments, settings);
        if let Some(sink) = progress {
            ctx = ctx.with_progress(&self.id, sink);
        }

        match operation {
            Operation::Check => {
                instance.process.check(&mut ctx).map_err(invocation)?;
                instance.checked = true;
                Ok(Outcome::Report(instance.threads.aggregate()))
            }
            Operation::Fix => {
                instance.process.fix(&mut ctx).map_err(invocation)?;
                instance.checked = false;
                Ok(Outcome::Report(instance.threads.aggregate()))
            }
            Operation::Tool => {
                let handle = instance.process.tool(&mut ctx).map_err(invocation)?;
                Ok(Outcome::Tool(handle))
            }
        }
    }

    /// The process instance, constructed on first access.
    fn instance_mut(&self) -> Result<RefMut<'_, ProcessInstance>> {
        let mut slot = self.instance.borrow_mut();
        if slot.is_none() {
            *slot = Some(self.instantiate()?);
            tracing::debug!(
                processor = %self.id,
                process = self.factory.path(),
                "process constructed"
            );
        }
        RefMut::filter_map(slot, Option::as_mut).map_err(|_| AthenaError::Construction {
            path: self.factory.path().to_string(),
            source: anyhow::anyhow!("process instance missing after construction"),
        })
    }

    fn instantiate(&self) -> Result<ProcessInstance> {
        let (process, mut threads) = self
            .factory
            .instantiate(&self.description.arguments_for(ArgumentSlot::Init))?;

        for entry in &self.overrides {
            let thread = threads.get_mut(&entry.thread).ok_or_else(|| AthenaError::UnknownThread {
                process: self.factory.path().to_string(),
                thread: entry.thread.clone(),
            })?;
            if let Some(status) = &entry.fail {
                thread.set_fail_status(status.clone())?;
            }
            if let Some(status) = &entry.success {
                thread.set_success_status(status.clone())?;
            }
        }
        threads.reset_all();

        Ok(ProcessInstance {
            process,
            threads,
            checked: false,
        })
    }
}

impl fmt::Debug for Processor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Processor")
            .field("id", &self.id)
            .field("index", &self.index)
            .field("process", &self.factory.path())
            .field("capabilities", &self.capabilities)
            .field("links", &self.links)
            .finish_non_exhaustive()
    }
}

fn resolve_override(
    statuses: &StatusRegistry,
    name: Option<&str>,
    family: StatusFamily,
) -> Result<Option<Status>> {
    let Some(name) = name else {
        return Ok(None);
    };
    let status = statuses.resolve(name)?;
    status.expect_family(family)?;
    Ok(Some(status.clone()))
}

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{(\w+)\}").expect("placeholder pattern is valid"))
}

/// Insert spaces at camel-case boundaries: before an upper-case letter that
/// follows a lower-case one, and before the last capital of an acronym.
pub(crate) fn camel_case_split(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if i > 0 {
            let prev = chars[i - 1];
            let next = chars.get(i + 1).copied();
            let lower_to_upper = prev.is_lowercase() && c.is_uppercase();
            let acronym_end =
                prev.is_uppercase() && c.is_uppercase() && next.is_some_and(char::is_lowercase);
            if lower_to_upper || acronym_end {
                out.push(' ');
            }
        }
        out.push(c);
    }
    out
}
