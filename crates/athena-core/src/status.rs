//! Status lattice: ordered severity levels for process threads.
//!
//! Statuses belong to one of three families. `Fail` and `Success` statuses are
//! ordered by priority within their family; statuses of different families are
//! never compared. The two `BuiltIn` statuses (`Default`, `Exception`) sit
//! outside both families.

use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{AthenaError, Result};

/// Family a status belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusFamily {
    Fail,
    Success,
    BuiltIn,
}

impl fmt::Display for StatusFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusFamily::Fail => write!(f, "fail"),
            StatusFamily::Success => write!(f, "success"),
            StatusFamily::BuiltIn => write!(f, "built_in"),
        }
    }
}

/// Display color of a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// A named severity level.
///
/// Equality is by name: names are unique inside a [`StatusRegistry`].
#[derive(Debug, Clone, Serialize)]
pub struct Status {
    name: Cow<'static, str>,
    priority: f32,
    color: Color,
    family: StatusFamily,
}

impl Status {
    /// Assigned to every processor before its first invocation.
    pub const DEFAULT: Status = Status::builtin("Default", -1.0, Color::rgb(60, 60, 60));
    /// Assigned by callers when an invocation raised.
    pub const EXCEPTION: Status = Status::builtin("Exception", 100.0, Color::rgb(120, 120, 120));

    pub const CORRECT: Status = Status::passing("Correct", 0.0, Color::rgb(22, 194, 15));
    pub const SUCCESS: Status = Status::passing("Success", 0.1, Color::rgb(0, 128, 0));

    pub const WARNING: Status = Status::failing("Warning", 1.0, Color::rgb(196, 98, 16));
    pub const ERROR: Status = Status::failing("Error", 1.1, Color::rgb(102, 4, 4));
    pub const CRITICAL: Status = Status::failing("Critical", 1.2, Color::rgb(204, 0, 0));

    const fn builtin(name: &'static str, priority: f32, color: Color) -> Self {
        Self::new_const(name, priority, color, StatusFamily::BuiltIn)
    }

    const fn passing(name: &'static str, priority: f32, color: Color) -> Self {
        Self::new_const(name, priority, color, StatusFamily::Success)
    }

    const fn failing(name: &'static str, priority: f32, color: Color) -> Self {
        Self::new_const(name, priority, color, StatusFamily::Fail)
    }

    const fn new_const(
        name: &'static str,
        priority: f32,
        color: Color,
        family: StatusFamily,
    ) -> Self {
        Self {
            name: Cow::Borrowed(name),
            priority,
            color,
            family,
        }
    }

    /// Create a new fail status. It still has to be registered before use in
    /// declarations.
    pub fn fail(name: impl Into<Cow<'static, str>>, priority: f32, color: Color) -> Self {
        Self {
            name: name.into(),
            priority,
            color,
            family: StatusFamily::Fail,
        }
    }

    /// Create a new success status.
    pub fn success(name: impl Into<Cow<'static, str>>, priority: f32, color: Color) -> Self {
        Self {
            name: name.into(),
            priority,
            color,
            family: StatusFamily::Success,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> f32 {
        self.priority
    }

    pub fn color(&self) -> Color {
        self.color
    }

    pub fn family(&self) -> StatusFamily {
        self.family
    }

    pub fn is_fail(&self) -> bool {
        self.family == StatusFamily::Fail
    }

    pub fn is_success(&self) -> bool {
        self.family == StatusFamily::Success
    }

    /// Compare priorities of two statuses of the same family.
    ///
    /// Returns `None` across families: those are never ordered.
    pub fn cmp_priority(&self, other: &Status) -> Option<Ordering> {
        if self.family != other.family {
            return None;
        }
        self.priority.partial_cmp(&other.priority)
    }

    /// Fail `Err` unless this status belongs to `family`.
    pub fn expect_family(&self, family: StatusFamily) -> Result<()> {
        if self.family == family {
            Ok(())
        } else {
            Err(AthenaError::StatusFamilyMismatch {
                status: self.name.to_string(),
                expected: family,
            })
        }
    }
}

impl PartialEq for Status {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Status {}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Worst (highest-priority) fail status in `statuses`, or [`Status::DEFAULT`]
/// when none of them failed. Success statuses are ignored.
pub fn worst_fail<'a, I>(statuses: I) -> Status
where
    I: IntoIterator<Item = &'a Status>,
{
    let mut worst: Option<&Status> = None;
    for status in statuses.into_iter().filter(|s| s.is_fail()) {
        match worst {
            Some(current) if current.priority >= status.priority => {}
            _ => worst = Some(status),
        }
    }
    worst.cloned().unwrap_or(Status::DEFAULT)
}

/// Registry of every status known to a session.
///
/// Built-in statuses are always present. Registration is append-only.
#[derive(Debug, Clone)]
pub struct StatusRegistry {
    statuses: Vec<Status>,
}

impl Default for StatusRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusRegistry {
    /// Registry holding the built-in statuses.
    pub fn new() -> Self {
        Self {
            statuses: vec![
                Status::DEFAULT,
                Status::EXCEPTION,
                Status::CORRECT,
                Status::SUCCESS,
                Status::WARNING,
                Status::ERROR,
                Status::CRITICAL,
            ],
        }
    }

    /// Register a new fail or success status.
    pub fn register(&mut self, status: Status) -> Result<()> {
        if self.get(status.name()).is_some() {
            return Err(AthenaError::DuplicateStatus {
                name: status.name().to_string(),
            });
        }
        if status.family == StatusFamily::BuiltIn {
            return Err(AthenaError::InvalidStatus {
                name: status.name().to_string(),
                reason: "built-in statuses cannot be registered".to_string(),
            });
        }
        if !status.priority.is_finite() {
            return Err(AthenaError::InvalidStatus {
                name: status.name().to_string(),
                reason: format!("priority {} is not finite", status.priority),
            });
        }
        if let Some(existing) = self
            .statuses
            .iter()
            .find(|s| s.family == status.family && s.priority == status.priority)
        {
            return Err(AthenaError::DuplicatePriority {
                family: status.family,
                existing: existing.name().to_string(),
                priority: status.priority,
            });
        }

        tracing::debug!(
            status = %status,
            family = %status.family,
            priority = status.priority,
            "status registered"
        );
        self.statuses.push(status);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Status> {
        self.statuses.iter().find(|s| s.name() == name)
    }

    /// Look up a status by name, failing on unregistered names.
    pub fn resolve(&self, name: &str) -> Result<&Status> {
        self.get(name).ok_or_else(|| AthenaError::UnknownStatus {
            name: name.to_string(),
        })
    }

    /// Whether this exact status (name and definition) is registered.
    pub fn contains(&self, status: &Status) -> bool {
        self.get(status.name()).is_some_and(|s| {
            s.family == status.family && s.priority == status.priority && s.color == status.color
        })
    }

    /// All statuses of `family`, ordered by ascending priority.
    pub fn family(&self, family: StatusFamily) -> Vec<&Status> {
        let mut statuses: Vec<&Status> =
            self.statuses.iter().filter(|s| s.family == family).collect();
        statuses.sort_by(|a, b| a.priority.partial_cmp(&b.priority).unwrap_or(Ordering::Equal));
        statuses
    }

    pub fn lowest(&self, family: StatusFamily) -> Option<&Status> {
        self.family(family).into_iter().next()
    }

    pub fn highest(&self, family: StatusFamily) -> Option<&Status> {
        self.family(family).into_iter().last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Status> {
        self.statuses.iter()
    }
}
