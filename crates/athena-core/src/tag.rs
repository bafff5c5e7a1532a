//! Tags: the capability mask attached to a blueprint entry.
//!
//! Tag bits only ever remove capability. A process that does not implement
//! `fix` cannot be made fixable by clearing [`Tag::NO_FIX`].

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{AthenaError, Result};
use crate::process::Operation;

/// Bitmask modifying how a processor may be run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "TagRepr", into = "u8")]
pub struct Tag(u8);

impl Tag {
    pub const NONE: Tag = Tag(0);
    /// Not selected by default.
    pub const DISABLED: Tag = Tag(1);
    pub const NO_CHECK: Tag = Tag(1 << 1);
    pub const NO_FIX: Tag = Tag(1 << 2);
    pub const NO_TOOL: Tag = Tag(1 << 3);
    /// Failures are reported but never block the run.
    pub const NON_BLOCKING: Tag = Tag(1 << 4);
    /// Excluded from unattended runs.
    pub const NO_BATCH: Tag = Tag(1 << 5);
    /// Excluded from interactive runs.
    pub const NO_UI: Tag = Tag(1 << 6);

    const ALL_BITS: u8 = 0x7f;

    const NAMED: [(&'static str, Tag); 7] = [
        ("disabled", Tag::DISABLED),
        ("no_check", Tag::NO_CHECK),
        ("no_fix", Tag::NO_FIX),
        ("no_tool", Tag::NO_TOOL),
        ("non_blocking", Tag::NON_BLOCKING),
        ("no_batch", Tag::NO_BATCH),
        ("no_ui", Tag::NO_UI),
    ];

    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Build a tag from raw bits, rejecting bits outside the known set.
    pub fn from_bits(bits: u8) -> Result<Self> {
        if bits & !Self::ALL_BITS != 0 {
            return Err(AthenaError::UnknownTagBits(bits & !Self::ALL_BITS));
        }
        Ok(Tag(bits))
    }

    pub const fn contains(self, other: Tag) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Names of the set bits, lowest bit first.
    pub fn names(self) -> Vec<&'static str> {
        Self::NAMED
            .iter()
            .filter(|(_, tag)| self.contains(*tag))
            .map(|(name, _)| *name)
            .collect()
    }
}

impl BitOr for Tag {
    type Output = Tag;

    fn bitor(self, rhs: Tag) -> Tag {
        Tag(self.0 | rhs.0)
    }
}

impl BitOrAssign for Tag {
    fn bitor_assign(&mut self, rhs: Tag) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for Tag {
    type Output = Tag;

    fn bitand(self, rhs: Tag) -> Tag {
        Tag(self.0 & rhs.0)
    }
}

impl FromStr for Tag {
    type Err = AthenaError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::NAMED
            .iter()
            .find(|(name, _)| *name == wanted)
            .map(|(_, tag)| *tag)
            .ok_or_else(|| AthenaError::UnknownTagName(s.to_string()))
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        f.write_str(&self.names().join(" | "))
    }
}

impl From<Tag> for u8 {
    fn from(tag: Tag) -> u8 {
        tag.0
    }
}

/// Declarations carry either the integer mask or a list of tag names.
#[derive(Deserialize)]
#[serde(untagged)]
enum TagRepr {
    Bits(u8),
    Names(Vec<String>),
}

impl TryFrom<TagRepr> for Tag {
    type Error = AthenaError;

    fn try_from(repr: TagRepr) -> Result<Self> {
        match repr {
            TagRepr::Bits(bits) => Tag::from_bits(bits),
            TagRepr::Names(names) => {
                let mut tag = Tag::NONE;
                for name in &names {
                    tag |= name.parse::<Tag>()?;
                }
                Ok(tag)
            }
        }
    }
}

/// Which operations a process type implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Operations {
    pub check: bool,
    pub fix: bool,
    pub tool: bool,
}

impl Operations {
    pub const NONE: Operations = Operations {
        check: false,
        fix: false,
        tool: false,
    };

    pub const fn with_check(mut self) -> Self {
        self.check = true;
        self
    }

    pub const fn with_fix(mut self) -> Self {
        self.fix = true;
        self
    }

    pub const fn with_tool(mut self) -> Self {
        self.tool = true;
        self
    }

    pub fn contains(self, operation: Operation) -> bool {
        match operation {
            Operation::Check => self.check,
            Operation::Fix => self.fix,
            Operation::Tool => self.tool,
        }
    }

    pub fn is_empty(self) -> bool {
        !(self.check || self.fix || self.tool)
    }
}

/// Execution context a blueprint is resolved for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    #[default]
    Interactive,
    Batch,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Interactive => write!(f, "interactive"),
            ExecutionMode::Batch => write!(f, "batch"),
        }
    }
}

impl FromStr for ExecutionMode {
    type Err = AthenaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "interactive" | "ui" => Ok(ExecutionMode::Interactive),
            "batch" => Ok(ExecutionMode::Batch),
            other => Err(AthenaError::InvalidDeclaration(format!(
                "unknown execution mode: {other}"
            ))),
        }
    }
}

/// Effective capabilities of a processor: inherent operations minus tag restrictions.
///
/// Computed once when the processor is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub check: bool,
    pub fix: bool,
    pub tool: bool,
    pub enabled: bool,
    pub batch: bool,
    pub interactive: bool,
    pub non_blocking: bool,
}

impl Capabilities {
    pub fn resolve(inherent: Operations, tag: Tag) -> Self {
        Self {
            check: inherent.check && !tag.contains(Tag::NO_CHECK),
            fix: inherent.fix && !tag.contains(Tag::NO_FIX),
            tool: inherent.tool && !tag.contains(Tag::NO_TOOL),
            enabled: !tag.contains(Tag::DISABLED),
            batch: !tag.contains(Tag::NO_BATCH),
            interactive: !tag.contains(Tag::NO_UI),
            non_blocking: tag.contains(Tag::NON_BLOCKING),
        }
    }

    pub fn allows(&self, operation: Operation) -> bool {
        match operation {
            Operation::Check => self.check,
            Operation::Fix => self.fix,
            Operation::Tool => self.tool,
        }
    }

    pub fn available_in(&self, mode: ExecutionMode) -> bool {
        match mode {
            ExecutionMode::Batch => self.batch,
            ExecutionMode::Interactive => self.interactive,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EVERYTHING: Operations = Operations::NONE.with_check().with_fix().with_tool();

    #[test]
    fn test_no_fix_disables_fix_regardless_of_implementation() {
        let caps = Capabilities::resolve(EVERYTHING, Tag::NO_FIX);
        assert!(!caps.fix);
        assert!(caps.check);

        let check_only = Operations::NONE.with_check();
        assert!(!Capabilities::resolve(check_only, Tag::NO_FIX).fix);
        // Clearing the bit cannot grant an operation that does not exist.
        assert!(!Capabilities::resolve(check_only, Tag::NONE).fix);
    }

    #[test]
    fn test_every_mask_only_removes_capability() {
        for bits in 0..=Tag::ALL_BITS {
            let tag = Tag::from_bits(bits).unwrap();
            let check_only = Operations::NONE.with_check();
            let fix_only = Operations::NONE.with_fix();
            for inherent in [check_only, fix_only, EVERYTHING] {
                let caps = Capabilities::resolve(inherent, tag);
                for op in Operation::ALL {
                    assert!(!caps.allows(op) || inherent.contains(op));
                }
            }
        }
    }

    #[test]
    fn test_mode_availability() {
        let caps = Capabilities::resolve(EVERYTHING, Tag::NO_BATCH | Tag::NON_BLOCKING);
        assert!(!caps.available_in(ExecutionMode::Batch));
        assert!(caps.available_in(ExecutionMode::Interactive));
        assert!(caps.non_blocking);
        assert!(caps.enabled);

        let caps = Capabilities::resolve(EVERYTHING, Tag::NO_UI | Tag::DISABLED);
        assert!(caps.available_in(ExecutionMode::Batch));
        assert!(!caps.available_in(ExecutionMode::Interactive));
        assert!(!caps.enabled);
    }

    #[test]
    fn test_from_bits_rejects_unknown() {
        assert!(Tag::from_bits(0x80).is_err());
        assert_eq!(Tag::from_bits(0x30).unwrap(), Tag::NON_BLOCKING | Tag::NO_BATCH);
    }

    #[test]
    fn test_deserialize_integer_and_names() {
        let from_int: Tag = serde_json::from_str("48").unwrap();
        let from_names: Tag = serde_json::from_str(r#"["non_blocking", "NO_BATCH"]"#).unwrap();
        assert_eq!(from_int, from_names);
        assert_eq!(serde_json::to_string(&from_int).unwrap(), "48");

        assert!(serde_json::from_str::<Tag>(r#"["optional"]"#).is_err());
    }

    #[test]
    fn test_display_lists_names() {
        assert_eq!(Tag::NONE.to_string(), "none");
        assert_eq!((Tag::NO_FIX | Tag::NO_UI).to_string(), "no_fix | no_ui");
    }
}
