//! Link resolution between processors of one blueprint.
//!
//! Links are declared by id and resolved once per execution mode. A link
//! whose target is unavailable in the mode is dropped at resolution time, so
//! firing the source operation later is a no-op for it.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::blueprint::declaration::LinkDeclaration;
use crate::blueprint::processor::Processor;
use crate::error::{AthenaError, Result};
use crate::process::Operation;
use crate::tag::ExecutionMode;

/// A declared link with its target as a header index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Link {
    pub target: usize,
    /// Operation on the owning processor that triggers the link.
    pub source: Operation,
    /// Operation invoked on the target.
    pub operation: Operation,
}

impl Link {
    pub(crate) fn from_declaration(
        declared: &LinkDeclaration,
        header: &HashMap<&str, usize>,
    ) -> Result<Self> {
        let target = header
            .get(declared.target())
            .copied()
            .ok_or_else(|| AthenaError::UnknownProcessId(declared.target().to_string()))?;
        Ok(Self {
            target,
            source: declared.source(),
            operation: declared.operation(),
        })
    }
}

/// A link bound to an available target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResolvedLink {
    pub target: usize,
    pub operation: Operation,
}

/// Header-aligned availability snapshot: entry `i` is `Some(i)` when
/// processor `i` can run in `mode`, `None` otherwise.
pub fn availability(processors: &[Processor], mode: ExecutionMode) -> Vec<Option<usize>> {
    processors
        .iter()
        .enumerate()
        .map(|(i, p)| p.is_available(mode).then_some(i))
        .collect()
}

/// Resolve every declared link for `mode`, replacing previous resolutions.
///
/// Fails with [`AthenaError::LinkCycle`] when the links that can actually
/// fire form a cycle.
pub fn resolve_links(processors: &mut [Processor], mode: ExecutionMode) -> Result<()> {
    let snapshot = availability(processors, mode);

    for processor in processors.iter_mut() {
        let mut resolved: HashMap<Operation, Vec<ResolvedLink>> = HashMap::new();
        for link in processor.links() {
            match snapshot.get(link.target).copied().flatten() {
                Some(target) => resolved.entry(link.source).or_default().push(ResolvedLink {
                    target,
                    operation: link.operation,
                }),
                None => tracing::debug!(
                    processor = %processor.id(),
                    target = link.target,
                    mode = %mode,
                    "link target unavailable, dropped"
                ),
            }
        }
        processor.resolved = resolved;
    }

    if let Some(path) = find_cycle(processors) {
        return Err(AthenaError::LinkCycle { path });
    }
    Ok(())
}

type Node = (usize, Operation);

/// Search the graph of `(processor, operation)` nodes for a cycle.
///
/// An edge leaves a node only when the operation is effective on its
/// processor, since a skipped invocation fires no links.
fn find_cycle(processors: &[Processor]) -> Option<Vec<String>> {
    let mut visited = HashSet::new();
    for index in 0..processors.len() {
        for operation in Operation::ALL {
            let mut path = Vec::new();
            if dfs_cycle(processors, (index, operation), &mut visited, &mut path) {
                return Some(
                    path.into_iter()
                        .map(|(i, op)| format!("{}.{op}", processors[i].id()))
                        .collect(),
                );
            }
        }
    }
    None
}

fn dfs_cycle(
    processors: &[Processor],
    node: Node,
    visited: &mut HashSet<Node>,
    path: &mut Vec<Node>,
) -> bool {
    if let Some(start) = path.iter().position(|n| *n == node) {
        path.drain(..start);
        path.push(node);
        return true;
    }
    if !visited.insert(node) {
        return false;
    }
    path.push(node);

    let (index, operation) = node;
    let processor = &processors[index];
    if processor.capabilities().allows(operation) {
        for link in processor.resolved_links(operation) {
            if dfs_cycle(processors, (link.target, link.operation), visited, path) {
                return true;
            }
        }
    }

    path.pop();
    false
}
