//! Registry of process types, keyed by the path blueprints use to refer to them.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::error::{AthenaError, Result};
use crate::process::{Arguments, Process, ProcessType};
use crate::tag::Operations;
use crate::thread::{Thread, Threads};

type Constructor = dyn Fn(&Arguments) -> anyhow::Result<Box<dyn Process>> + Send + Sync;

/// Static declaration plus constructor of one registered process type.
pub struct ProcessFactory {
    path: String,
    type_name: &'static str,
    operations: Operations,
    threads: Vec<Thread>,
    documentation: Option<&'static str>,
    constructor: Box<Constructor>,
}

impl ProcessFactory {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn operations(&self) -> Operations {
        self.operations
    }

    /// Declared threads; instances receive clones.
    pub fn threads(&self) -> &[Thread] {
        &self.threads
    }

    pub fn declares_thread(&self, name: &str) -> bool {
        self.threads.iter().any(|t| t.name() == name)
    }

    pub fn documentation(&self) -> Option<&'static str> {
        self.documentation
    }

    /// Construct a process instance with a fresh copy of the declared threads.
    pub(crate) fn instantiate(&self, arguments: &Arguments) -> Result<(Box<dyn Process>, Threads)> {
        let process = (self.constructor)(arguments).map_err(|source| AthenaError::Construction {
            path: self.path.clone(),
            source,
        })?;
        Ok((process, Threads::from(self.threads.clone())))
    }
}

impl fmt::Debug for ProcessFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessFactory")
            .field("path", &self.path)
            .field("type_name", &self.type_name)
            .field("operations", &self.operations)
            .field("threads", &self.threads.len())
            .finish_non_exhaustive()
    }
}

/// Maps process paths to factories.
#[derive(Debug, Default)]
pub struct ProcessRegistry {
    factories: BTreeMap<String, Arc<ProcessFactory>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T` under `path`, constructed with [`ProcessType::construct`].
    pub fn register<T: ProcessType>(&mut self, path: impl Into<String>) -> Result<()> {
        self.register_with::<T, _>(path, T::construct)
    }

    /// Register `T` under `path` with a custom constructor.
    pub fn register_with<T, F>(&mut self, path: impl Into<String>, constructor: F) -> Result<()>
    where
        T: ProcessType,
        F: Fn(&Arguments) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        let path = path.into();
        if self.factories.contains_key(&path) {
            return Err(AthenaError::DuplicateProcess { path });
        }

        let operations = T::operations();
        if operations.is_empty() {
            return Err(AthenaError::NoOperations { path });
        }

        let threads = T::threads()?;
        let mut seen = HashSet::new();
        for thread in &threads {
            if !seen.insert(thread.name()) {
                return Err(AthenaError::InvalidDeclaration(format!(
                    "process {path} declares thread {} twice",
                    thread.name()
                )));
            }
        }

        tracing::debug!(
            path = %path,
            process = T::NAME,
            threads = threads.len(),
            "process type registered"
        );

        let factory = ProcessFactory {
            path: path.clone(),
            type_name: T::NAME,
            operations,
            threads,
            documentation: T::documentation(),
            constructor: Box::new(move |arguments: &Arguments| {
                let process = constructor(arguments)?;
                Ok(Box::new(process) as Box<dyn Process>)
            }),
        };
        self.factories.insert(path, Arc::new(factory));
        Ok(())
    }

    pub fn get(&self, path: &str) -> Option<Arc<ProcessFactory>> {
        self.factories.get(path).cloned()
    }

    /// Look up a factory, failing on unknown paths.
    pub fn resolve(&self, path: &str) -> Result<Arc<ProcessFactory>> {
        self.get(path).ok_or_else(|| AthenaError::UnknownProcess {
            path: path.to_string(),
        })
    }

    pub fn contains(&self, path: &str) -> bool {
        self.factories.contains_key(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::Context;

    struct Nothing;

    impl Process for Nothing {}

    impl ProcessType for Nothing {
        const NAME: &'static str = "Nothing";

        fn operations() -> Operations {
            Operations::NONE
        }

        fn threads() -> Result<Vec<Thread>> {
            Ok(vec![])
        }

        fn construct(_: &Arguments) -> anyhow::Result<Self> {
            Ok(Nothing)
        }
    }

    struct Twice;

    impl Process for Twice {
        fn check(&mut self, _ctx: &mut Context<'_>) -> anyhow::Result<()> {
            Ok(())
        }
    }

    impl ProcessType for Twice {
        const NAME: &'static str = "Twice";

        fn operations() -> Operations {
            Operations::NONE.with_check()
        }

        fn threads() -> Result<Vec<Thread>> {
            Ok(vec![Thread::new("same", "one"), Thread::new("same", "two")])
        }

        fn construct(_: &Arguments) -> anyhow::Result<Self> {
            Ok(Twice)
        }
    }

    struct Picky {
        limit: u64,
    }

    impl Process for Picky {
        fn check(&mut self, ctx: &mut Context<'_>) -> anyhow::Result<()> {
            if self.limit == 0 {
                ctx.fail("limit", crate::feedback::Feedback::new(["zero"]))?;
            }
            Ok(())
        }
    }

    impl ProcessType for Picky {
        const NAME: &'static str = "Picky";

        fn operations() -> Operations {
            Operations::NONE.with_check()
        }

        fn threads() -> Result<Vec<Thread>> {
            Ok(vec![Thread::new("limit", "Limit")])
        }

        fn construct(arguments: &Arguments) -> anyhow::Result<Self> {
            let limit = arguments
                .kwarg_as::<u64>("limit")?
                .ok_or_else(|| anyhow::anyhow!("missing limit"))?;
            Ok(Picky { limit })
        }
    }

    #[test]
    fn test_process_without_operations_rejected() {
        let mut registry = ProcessRegistry::new();
        let err = registry.register::<Nothing>("demo.Nothing").unwrap_err();
        assert!(matches!(err, AthenaError::NoOperations { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_duplicate_path_and_threads_rejected() {
        let mut registry = ProcessRegistry::new();
        registry.register::<Picky>("demo.Picky").unwrap();
        assert!(matches!(
            registry.register::<Picky>("demo.Picky").unwrap_err(),
            AthenaError::DuplicateProcess { .. }
        ));
        assert!(matches!(
            registry.register::<Twice>("demo.Twice").unwrap_err(),
            AthenaError::InvalidDeclaration(_)
        ));
    }

    #[test]
    fn test_instantiate_propagates_constructor_errors() {
        let mut registry = ProcessRegistry::new();
        registry.register::<Picky>("demo.Picky").unwrap();
        let factory = registry.resolve("demo.Picky").unwrap();
        assert!(factory.declares_thread("limit"));

        let err = factory.instantiate(&Arguments::default()).err().unwrap();
        assert!(matches!(err, AthenaError::Construction { .. }));

        let mut args = Arguments::default();
        args.kwargs.insert("limit".into(), serde_json::json!(3));
        let (_, threads) = factory.instantiate(&args).unwrap();
        assert_eq!(threads.len(), 1);
    }

    #[test]
    fn test_register_with_closure_constructor() {
        let mut registry = ProcessRegistry::new();
        registry
            .register_with::<Picky, _>("demo.Zero", |_| Ok(Picky { limit: 0 }))
            .unwrap();
        assert!(registry.resolve("demo.Zero").unwrap().instantiate(&Arguments::default()).is_ok());
        assert!(matches!(
            registry.resolve("demo.Missing").unwrap_err(),
            AthenaError::UnknownProcess { .. }
        ));
    }
}
