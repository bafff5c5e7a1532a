//! Register: the set of blueprints loaded for a session.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::blueprint::{Blueprint, BlueprintDeclaration};
use crate::error::{AthenaError, Result};
use crate::process::ProcessRegistry;
use crate::status::StatusRegistry;
use crate::tag::ExecutionMode;

/// Where a loaded blueprint came from. File sources are re-read on reload.
#[derive(Debug, Clone)]
pub enum BlueprintSource {
    Declaration(BlueprintDeclaration),
    Path(PathBuf),
}

impl BlueprintSource {
    fn read(&self) -> Result<BlueprintDeclaration> {
        match self {
            BlueprintSource::Declaration(declaration) => Ok(declaration.clone()),
            BlueprintSource::Path(path) => {
                if !path.is_file() {
                    return Err(AthenaError::BlueprintNotFound(path.display().to_string()));
                }
                BlueprintDeclaration::from_path(path)
            }
        }
    }
}

impl From<BlueprintDeclaration> for BlueprintSource {
    fn from(declaration: BlueprintDeclaration) -> Self {
        BlueprintSource::Declaration(declaration)
    }
}

impl From<PathBuf> for BlueprintSource {
    fn from(path: PathBuf) -> Self {
        BlueprintSource::Path(path)
    }
}

impl From<&Path> for BlueprintSource {
    fn from(path: &Path) -> Self {
        BlueprintSource::Path(path.to_path_buf())
    }
}

impl fmt::Display for BlueprintSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlueprintSource::Declaration(declaration) => {
                write!(f, "<{}>", declaration.display_name())
            }
            BlueprintSource::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

#[derive(Debug)]
struct Loaded {
    source: BlueprintSource,
    blueprint: Blueprint,
}

/// Owns the loaded blueprints, in load order.
#[derive(Debug)]
pub struct Register {
    processes: Arc<ProcessRegistry>,
    statuses: StatusRegistry,
    mode: ExecutionMode,
    loaded: Vec<Loaded>,
}

impl Register {
    pub fn new(processes: Arc<ProcessRegistry>, mode: ExecutionMode) -> Self {
        Self {
            processes,
            statuses: StatusRegistry::new(),
            mode,
            loaded: Vec::new(),
        }
    }

    pub fn with_statuses(mut self, statuses: StatusRegistry) -> Self {
        self.statuses = statuses;
        self
    }

    pub fn processes(&self) -> &ProcessRegistry {
        &self.processes
    }

    pub fn statuses(&self) -> &StatusRegistry {
        &self.statuses
    }

    /// Custom statuses registered here are visible to later loads and reloads.
    pub fn statuses_mut(&mut self) -> &mut StatusRegistry {
        &mut self.statuses
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Build a blueprint and add it. A loaded blueprint with the same name is replaced.
    pub fn load(&mut self, source: impl Into<BlueprintSource>) -> Result<&Blueprint> {
        let source = source.into();
        let blueprint = self.build(&source)?;
        let name = blueprint.name().to_string();
        tracing::info!(blueprint = %name, source = %source, mode = %self.mode, "blueprint loaded");

        let entry = Loaded { source, blueprint };
        let position = match self.position(&name) {
            Some(position) => {
                tracing::debug!(blueprint = %name, "replacing previously loaded blueprint");
                self.loaded[position] = entry;
                position
            }
            None => {
                self.loaded.push(entry);
                self.loaded.len() - 1
            }
        };
        Ok(&self.loaded[position].blueprint)
    }

    pub fn get(&self, name: &str) -> Option<&Blueprint> {
        self.loaded
            .iter()
            .find(|l| l.blueprint.name() == name)
            .map(|l| &l.blueprint)
    }

    /// Mutable access, e.g. to install a progress sink.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Blueprint> {
        self.loaded
            .iter_mut()
            .find(|l| l.blueprint.name() == name)
            .map(|l| &mut l.blueprint)
    }

    pub fn names(&self) -> Vec<&str> {
        self.loaded.iter().map(|l| l.blueprint.name()).collect()
    }

    pub fn blueprints(&self) -> impl Iterator<Item = &Blueprint> {
        self.loaded.iter().map(|l| &l.blueprint)
    }

    pub fn len(&self) -> usize {
        self.loaded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loaded.is_empty()
    }

    pub fn unload(&mut self, name: &str) -> Result<Blueprint> {
        let position = self
            .position(name)
            .ok_or_else(|| AthenaError::BlueprintNotFound(name.to_string()))?;
        tracing::info!(blueprint = %name, "blueprint unloaded");
        Ok(self.loaded.remove(position).blueprint)
    }

    /// Switch every blueprint to `mode`, re-resolving links. Either every
    /// blueprint switches or none does.
    pub fn set_mode(&mut self, mode: ExecutionMode) -> Result<()> {
        let previous = self.mode;
        for i in 0..self.loaded.len() {
            if let Err(err) = self.loaded[i].blueprint.set_mode(mode) {
                for loaded in &mut self.loaded[..i] {
                    loaded.blueprint.set_mode(previous)?;
                }
                return Err(err);
            }
        }
        self.mode = mode;
        Ok(())
    }

    /// Tear down and rebuild every blueprint from its source. File sources
    /// are re-read. Nothing changes unless every blueprint rebuilds and the
    /// rebuilt names are still unique. Progress sinks carry over.
    pub fn reload(&mut self) -> Result<()> {
        let mut rebuilt = Vec::with_capacity(self.loaded.len());
        let mut names = HashSet::with_capacity(self.loaded.len());
        for loaded in &self.loaded {
            let blueprint = self.build(&loaded.source)?;
            if !names.insert(blueprint.name().to_string()) {
                return Err(AthenaError::InvalidDeclaration(format!(
                    "blueprint {} would be loaded twice after reloading {}",
                    blueprint.name(),
                    loaded.source
                )));
            }
            rebuilt.push(blueprint);
        }
        for (loaded, mut blueprint) in self.loaded.iter_mut().zip(rebuilt) {
            blueprint.adopt_progress(&mut loaded.blueprint);
            loaded.blueprint = blueprint;
        }
        tracing::info!(blueprints = self.loaded.len(), "register reloaded");
        Ok(())
    }

    fn build(&self, source: &BlueprintSource) -> Result<Blueprint> {
        Blueprint::build(source.read()?, &self.processes, &self.statuses, self.mode)
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.loaded.iter().position(|l| l.blueprint.name() == name)
    }
}
