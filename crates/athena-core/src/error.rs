//! Error taxonomy for the Athena engine.
//!
//! Three kinds of failure exist:
//! - construction defects (bad declarations, unknown processes, invalid
//!   status overrides) which fail loudly when a blueprint is built,
//! - link cycles, detected once links are resolved,
//! - invocation faults raised from inside a process body, which the engine
//!   propagates to the caller after outbound links have run.

use crate::process::Operation;
use crate::status::StatusFamily;
use crate::tag::ExecutionMode;

/// Athena engine errors.
#[derive(Debug, thiserror::Error)]
pub enum AthenaError {
    #[error("unknown process type: {path}")]
    UnknownProcess { path: String },

    #[error("process type {path} is already registered")]
    DuplicateProcess { path: String },

    #[error("process type {path} implements none of check, fix or tool")]
    NoOperations { path: String },

    #[error("process {process} does not declare a thread named {thread}")]
    UnknownThread { process: String, thread: String },

    #[error("status {status} is not a {expected:?} status")]
    StatusFamilyMismatch {
        status: String,
        expected: StatusFamily,
    },

    #[error("status {name} is not registered")]
    UnknownStatus { name: String },

    #[error("status {name} is already registered")]
    DuplicateStatus { name: String },

    #[error("{family:?} status {existing} already uses priority {priority}")]
    DuplicatePriority {
        family: StatusFamily,
        existing: String,
        priority: f32,
    },

    #[error("invalid status {name}: {reason}")]
    InvalidStatus { name: String, reason: String },

    #[error("feedback lists differ in length: {display} to display, {select} to select")]
    FeedbackLengthMismatch { display: usize, select: usize },

    #[error("unknown tag bits: {0:#b}")]
    UnknownTagBits(u8),

    #[error("unknown tag name: {0}")]
    UnknownTagName(String),

    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    #[error("invalid blueprint declaration: {0}")]
    InvalidDeclaration(String),

    #[error("unknown process id: {0}")]
    UnknownProcessId(String),

    #[error("link cycle detected: {}", path.join(" -> "))]
    LinkCycle { path: Vec<String> },

    #[error("failed to construct process {path}: {source}")]
    Construction {
        path: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("{operation} failed on process {process}: {source}")]
    Invocation {
        process: String,
        operation: Operation,
        #[source]
        source: anyhow::Error,
    },

    #[error("blueprint {blueprint} is resolved for {actual} mode, {expected} required")]
    ModeMismatch {
        blueprint: String,
        expected: ExecutionMode,
        actual: ExecutionMode,
    },

    #[error("blueprint not found: {0}")]
    BlueprintNotFound(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for Athena engine operations.
pub type Result<T> = std::result::Result<T, AthenaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_cycle_displays_path() {
        let err = AthenaError::LinkCycle {
            path: vec![
                "NoNGons.check".to_string(),
                "NoTris.check".to_string(),
                "NoNGons.check".to_string(),
            ],
        };
        assert_eq!(
            err.to_string(),
            "link cycle detected: NoNGons.check -> NoTris.check -> NoNGons.check"
        );
    }

    #[test]
    fn test_invocation_error_names_process_and_operation() {
        let err = AthenaError::Invocation {
            process: "CleanCompoundConnections".to_string(),
            operation: Operation::Fix,
            source: anyhow::anyhow!("node is locked"),
        };
        let msg = err.to_string();
        assert!(msg.contains("fix"));
        assert!(msg.contains("CleanCompoundConnections"));
        assert!(msg.contains("node is locked"));
    }

    #[test]
    fn test_family_mismatch_error() {
        let err = AthenaError::StatusFamilyMismatch {
            status: "Correct".to_string(),
            expected: StatusFamily::Fail,
        };
        assert!(err.to_string().contains("Correct"));
        assert!(err.to_string().contains("Fail"));
    }
}
