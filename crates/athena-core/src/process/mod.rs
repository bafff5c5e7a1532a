//! Processes: the unit of work run by a blueprint.
//!
//! A process implements any subset of three operations:
//! - `check` drives its threads to `Fail` with feedback, or leaves them clean,
//! - `fix` remediates what `check` found,
//! - `tool` returns an opaque handle to an interactive aid.
//!
//! The static side of a process type (name, threads, implemented operations,
//! constructor) is declared through [`ProcessType`] and registered in a
//! [`ProcessRegistry`] under the path blueprints refer to.

pub mod registry;

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{AthenaError, Result};
use crate::feedback::Feedback;
use crate::tag::Operations;
use crate::thread::{Thread, Threads};

pub use registry::{ProcessFactory, ProcessRegistry};

/// Opaque value returned by `tool`; the engine only forwards it.
pub type ToolHandle = Box<dyn Any>;

/// Free-form per-processor settings from the blueprint declaration.
pub type Settings = Map<String, Value>;

/// Progress sink installed by a caller: processor id, value in `0..=100`,
/// optional text to display instead of the default label.
pub type ProgressFn = dyn Fn(&str, f32, Option<&str>);

/// The three operations a process may implement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Check,
    Fix,
    Tool,
}

impl Operation {
    pub const ALL: [Operation; 3] = [Operation::Check, Operation::Fix, Operation::Tool];

    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Check => "check",
            Operation::Fix => "fix",
            Operation::Tool => "tool",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = AthenaError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "check" => Ok(Operation::Check),
            "fix" => Ok(Operation::Fix),
            "tool" => Ok(Operation::Tool),
            other => Err(AthenaError::UnknownOperation(other.to_string())),
        }
    }
}

/// Positional and keyword arguments configured for one operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "ArgumentsRepr")]
pub struct Arguments {
    pub args: Vec<Value>,
    pub kwargs: Map<String, Value>,
}

impl Arguments {
    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.args.get(index)
    }

    pub fn kwarg(&self, name: &str) -> Option<&Value> {
        self.kwargs.get(name)
    }

    /// Deserialize keyword argument `name`, `Ok(None)` when absent.
    pub fn kwarg_as<T: DeserializeOwned>(&self, name: &str) -> anyhow::Result<Option<T>> {
        match self.kwargs.get(name) {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty() && self.kwargs.is_empty()
    }
}

/// Arguments are written either as `[args, kwargs]` or `{args, kwargs}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum ArgumentsRepr {
    Pair(Vec<Value>, Map<String, Value>),
    Named {
        #[serde(default)]
        args: Vec<Value>,
        #[serde(default)]
        kwargs: Map<String, Value>,
    },
}

impl From<ArgumentsRepr> for Arguments {
    fn from(repr: ArgumentsRepr) -> Self {
        match repr {
            ArgumentsRepr::Pair(args, kwargs) | ArgumentsRepr::Named { args, kwargs } => {
                Self { args, kwargs }
            }
        }
    }
}

/// What a process body sees while one of its operations runs.
pub struct Context<'a> {
    process: &'a str,
    threads: &'a mut Threads,
    arguments: &'a Arguments,
    settings: &'a Settings,
    progress: Option<(&'a str, &'a dyn Fn(&str, f32, Option<&str>))>,
}

impl<'a> Context<'a> {
    pub fn new(
        process: &'a str,
        threads: &'a mut Threads,
        arguments: &'a Arguments,
        settings: &'a Settings,
    ) -> Self {
        Self {
            process,
            threads,
            arguments,
            settings,
            progress: None,
        }
    }

    /// Forward [`Context::progress`] reports to `sink` on behalf of `processor`.
    pub fn with_progress(
        mut self,
        processor: &'a str,
        sink: &'a dyn Fn(&str, f32, Option<&str>),
    ) -> Self {
        self.progress = Some((processor, sink));
        self
    }

    /// Report how far the running operation got. A no-op unless the caller
    /// installed a progress sink.
    pub fn progress(&self, value: f32, text: Option<&str>) {
        if let Some((processor, sink)) = self.progress {
            sink(processor, value.clamp(0.0, 100.0), text);
        }
    }

    /// Mutable access to a declared thread.
    pub fn thread(&mut self, name: &str) -> Result<&mut Thread> {
        let process = self.process;
        self.threads
            .get_mut(name)
            .ok_or_else(|| AthenaError::UnknownThread {
                process: process.to_string(),
                thread: name.to_string(),
            })
    }

    /// Mark `thread` failed with `feedback` and its configured fail status.
    pub fn fail(&mut self, thread: &str, feedback: Feedback) -> Result<()> {
        self.thread(thread)?.set_fail(feedback, None);
        Ok(())
    }

    /// Mark `thread` successful with no feedback.
    pub fn succeed(&mut self, thread: &str) -> Result<()> {
        self.thread(thread)?.set_success(Feedback::default(), None);
        Ok(())
    }

    pub fn threads(&self) -> &Threads {
        self.threads
    }

    pub fn arguments(&self) -> &Arguments {
        self.arguments
    }

    pub fn settings(&self) -> &Settings {
        self.settings
    }

    pub fn process_name(&self) -> &str {
        self.process
    }
}

/// Behaviour of a process instance.
///
/// Operations a type does not list in [`ProcessType::operations`] are never
/// called by the engine; their default bodies only report the omission.
pub trait Process {
    fn check(&mut self, _ctx: &mut Context<'_>) -> anyhow::Result<()> {
        Err(not_implemented(Operation::Check))
    }

    fn fix(&mut self, _ctx: &mut Context<'_>) -> anyhow::Result<()> {
        Err(not_implemented(Operation::Fix))
    }

    fn tool(&mut self, _ctx: &mut Context<'_>) -> anyhow::Result<Option<ToolHandle>> {
        Err(not_implemented(Operation::Tool))
    }

    /// Values for `{key}` placeholders in the type documentation.
    fn doc_format(&self) -> BTreeMap<String, String> {
        BTreeMap::new()
    }
}

fn not_implemented(operation: Operation) -> anyhow::Error {
    anyhow::anyhow!("{operation} is not implemented by this process")
}

/// Static declaration of a process type.
pub trait ProcessType: Process + Sized + 'static {
    /// Type name, split on camel case for display.
    const NAME: &'static str;

    /// Operations this type implements.
    fn operations() -> Operations;

    /// Threads in declaration order. Every instance gets its own copy.
    fn threads() -> Result<Vec<Thread>>;

    fn documentation() -> Option<&'static str> {
        None
    }

    fn construct(arguments: &Arguments) -> anyhow::Result<Self>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_operation_parse_and_display() {
        for op in Operation::ALL {
            assert_eq!(op.to_string().parse::<Operation>().unwrap(), op);
        }
        assert!("inspect".parse::<Operation>().is_err());
    }

    #[test]
    fn test_arguments_accept_pair_and_named_forms() {
        let pair: Arguments = serde_json::from_value(json!([[1, "a"], {"depth": 2}])).unwrap();
        let named: Arguments =
            serde_json::from_value(json!({"args": [1, "a"], "kwargs": {"depth": 2}})).unwrap();
        assert_eq!(pair, named);
        assert_eq!(pair.kwarg_as::<u32>("depth").unwrap(), Some(2));
        assert_eq!(pair.kwarg_as::<u32>("missing").unwrap(), None);

        let empty: Arguments = serde_json::from_value(json!({})).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_context_reports_unknown_thread() {
        let mut threads = Threads::from(vec![Thread::new("KNOWN", "known")]);
        let arguments = Arguments::default();
        let settings = Settings::new();
        let mut ctx = Context::new("NoNGons", &mut threads, &arguments, &settings);

        ctx.fail("KNOWN", Feedback::new(["pCube1"])).unwrap();
        assert!(ctx.threads().get("KNOWN").unwrap().is_failed());

        let err = ctx.fail("MISSING", Feedback::default()).unwrap_err();
        assert!(err.to_string().contains("NoNGons"));
        assert!(err.to_string().contains("MISSING"));
    }

    #[test]
    fn test_context_progress_forwards_to_sink() {
        use std::cell::RefCell;

        let mut threads = Threads::from(vec![Thread::new("KNOWN", "known")]);
        let arguments = Arguments::default();
        let settings = Settings::new();
        let seen = RefCell::new(Vec::new());
        let sink = |id: &str, value: f32, text: Option<&str>| {
            seen.borrow_mut().push((id.to_string(), value, text.map(str::to_string)));
        };

        let ctx = Context::new("NoNGons", &mut threads, &arguments, &settings);
        ctx.progress(10.0, None);
        assert!(seen.borrow().is_empty());

        let ctx = Context::new("NoNGons", &mut threads, &arguments, &settings)
            .with_progress("ngons", &sink);
        ctx.progress(40.0, Some("faces"));
        ctx.progress(250.0, None);
        assert_eq!(
            *seen.borrow(),
            vec![
                ("ngons".to_string(), 40.0, Some("faces".to_string())),
                ("ngons".to_string(), 100.0, None),
            ]
        );
    }
}
