//! Scripted processes shared by the integration tests.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use athena_core::{
    Arguments, Context, Feedback, Operations, Process, ProcessRegistry, ProcessType, Result,
    Status, Thread, ToolHandle,
};

/// Shared switches and call counters for one registered process path.
#[derive(Debug, Default)]
pub struct Script {
    pub broken: AtomicBool,
    pub check_errors: AtomicBool,
    pub check_panics: AtomicBool,
    pub fix_errors: AtomicBool,
    checks: AtomicUsize,
    fixes: AtomicUsize,
    tools: AtomicUsize,
}

impl Script {
    pub fn broken() -> Arc<Self> {
        let script = Self::default();
        script.broken.store(true, Ordering::SeqCst);
        Arc::new(script)
    }

    pub fn clean() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set(flag: &AtomicBool, value: bool) {
        flag.store(value, Ordering::SeqCst);
    }

    pub fn checks(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }

    pub fn fixes(&self) -> usize {
        self.fixes.load(Ordering::SeqCst)
    }

    pub fn tools(&self) -> usize {
        self.tools.load(Ordering::SeqCst)
    }
}

/// Check, fix and tool. Fails `NGONS` while broken; `TRIS` when the check
/// arguments carry `tris = true`.
pub struct Geometry {
    script: Arc<Script>,
    sides: u32,
}

impl Process for Geometry {
    fn check(&mut self, ctx: &mut Context<'_>) -> anyhow::Result<()> {
        self.script.checks.fetch_add(1, Ordering::SeqCst);
        ctx.progress(50.0, Some("scanning faces"));
        if self.script.broken.load(Ordering::SeqCst) {
            ctx.fail("NGONS", Feedback::new(["pCube1.f[3]", "pCube1.f[7]"]))?;
        }
        if ctx.arguments().kwarg_as::<bool>("tris")?.unwrap_or(false) {
            ctx.fail("TRIS", Feedback::new(["pSphere1.f[0]"]))?;
        }
        Ok(())
    }

    fn fix(&mut self, ctx: &mut Context<'_>) -> anyhow::Result<()> {
        self.script.fixes.fetch_add(1, Ordering::SeqCst);
        if self.script.fix_errors.load(Ordering::SeqCst) {
            anyhow::bail!("fix exploded");
        }
        self.script.broken.store(false, Ordering::SeqCst);
        ctx.succeed("NGONS")?;
        ctx.progress(100.0, None);
        Ok(())
    }

    fn tool(&mut self, _ctx: &mut Context<'_>) -> anyhow::Result<Option<ToolHandle>> {
        self.script.tools.fetch_add(1, Ordering::SeqCst);
        Ok(Some(Box::new(format!("select {} sided faces", self.sides))))
    }

    fn doc_format(&self) -> BTreeMap<String, String> {
        BTreeMap::from([("sides".to_string(), self.sides.to_string())])
    }
}

impl ProcessType for Geometry {
    const NAME: &'static str = "NoNGons";

    fn operations() -> Operations {
        Operations::NONE.with_check().with_fix().with_tool()
    }

    fn threads() -> Result<Vec<Thread>> {
        Ok(vec![
            Thread::new("NGONS", "Faces with more than 4 sides"),
            Thread::new("TRIS", "Triangles").with_fail_status(Status::WARNING)?,
        ])
    }

    fn documentation() -> Option<&'static str> {
        Some("Find faces with more than {sides} sides. {missing}")
    }

    fn construct(arguments: &Arguments) -> anyhow::Result<Self> {
        Ok(Self {
            script: Script::clean(),
            sides: arguments.kwarg_as("sides")?.unwrap_or(4),
        })
    }
}

/// Check only. Fails `FOUND` while broken.
pub struct Inspector {
    script: Arc<Script>,
}

impl Process for Inspector {
    fn check(&mut self, ctx: &mut Context<'_>) -> anyhow::Result<()> {
        self.script.checks.fetch_add(1, Ordering::SeqCst);
        if self.script.check_panics.load(Ordering::SeqCst) {
            panic!("inspector blew up");
        }
        if self.script.check_errors.load(Ordering::SeqCst) {
            anyhow::bail!("scene is not reachable");
        }
        if self.script.broken.load(Ordering::SeqCst) {
            ctx.fail("FOUND", Feedback::new(["|group1|node"]))?;
        }
        Ok(())
    }
}

impl ProcessType for Inspector {
    const NAME: &'static str = "NoConstructionHistory";

    fn operations() -> Operations {
        Operations::NONE.with_check()
    }

    fn threads() -> Result<Vec<Thread>> {
        Ok(vec![Thread::new("FOUND", "Nodes with history")])
    }

    fn construct(_: &Arguments) -> anyhow::Result<Self> {
        Ok(Self {
            script: Script::clean(),
        })
    }
}

/// Register a [`Geometry`] at `path` driven by `script`.
pub fn geometry(registry: &mut ProcessRegistry, path: &str, script: &Arc<Script>) {
    let script = Arc::clone(script);
    registry
        .register_with::<Geometry, _>(path, move |arguments| {
            Ok(Geometry {
                script: Arc::clone(&script),
                sides: arguments.kwarg_as("sides")?.unwrap_or(4),
            })
        })
        .unwrap();
}

/// Register an [`Inspector`] at `path` driven by `script`.
pub fn inspector(registry: &mut ProcessRegistry, path: &str, script: &Arc<Script>) {
    let script = Arc::clone(script);
    registry
        .register_with::<Inspector, _>(path, move |_| {
            Ok(Inspector {
                script: Arc::clone(&script),
            })
        })
        .unwrap();
}
