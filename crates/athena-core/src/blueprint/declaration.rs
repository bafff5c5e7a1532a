//! Declarative blueprint model, as read from JSON or TOML files.
//!
//! ```toml
//! name = "model"
//! header = ["NoNGons", "NoTris"]
//!
//! [descriptions.NoNGons]
//! process = "maya.model.NoNGons"
//! category = "Model Sanity"
//! links = [["NoTris", "check", "check"]]
//!
//! [descriptions.NoTris]
//! process = "maya.model.NoTris"
//! tags = ["non_blocking"]
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{AthenaError, Result};
use crate::process::{Arguments, Operation, Settings};
use crate::tag::Tag;

/// Which call an argument bundle is passed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgumentSlot {
    /// Process construction.
    #[serde(alias = "__init__")]
    Init,
    Check,
    Fix,
    Tool,
}

impl From<Operation> for ArgumentSlot {
    fn from(operation: Operation) -> Self {
        match operation {
            Operation::Check => ArgumentSlot::Check,
            Operation::Fix => ArgumentSlot::Fix,
            Operation::Tool => ArgumentSlot::Tool,
        }
    }
}

/// `(target id, source operation, target operation)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkDeclaration(pub String, pub Operation, pub Operation);

impl LinkDeclaration {
    pub fn new(target: impl Into<String>, source: Operation, operation: Operation) -> Self {
        Self(target.into(), source, operation)
    }

    pub fn target(&self) -> &str {
        &self.0
    }

    pub fn source(&self) -> Operation {
        self.1
    }

    pub fn operation(&self) -> Operation {
        self.2
    }
}

/// Status names replacing a thread's configured statuses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatusOverride {
    #[serde(default, alias = "Fail", skip_serializing_if = "Option::is_none")]
    pub fail: Option<String>,
    #[serde(default, alias = "Success", skip_serializing_if = "Option::is_none")]
    pub success: Option<String>,
}

fn default_category() -> String {
    "Other".to_string()
}

/// One blueprint entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProcessDescription {
    /// Registry path of the process type.
    pub process: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub arguments: BTreeMap<ArgumentSlot, Arguments>,
    #[serde(default)]
    pub tags: Tag,
    #[serde(default)]
    pub links: Vec<LinkDeclaration>,
    #[serde(default, alias = "statusOverrides")]
    pub status_overrides: BTreeMap<String, StatusOverride>,
    #[serde(default)]
    pub settings: Settings,
}

impl ProcessDescription {
    pub fn new(process: impl Into<String>) -> Self {
        Self {
            process: process.into(),
            category: default_category(),
            arguments: BTreeMap::new(),
            tags: Tag::NONE,
            links: Vec::new(),
            status_overrides: BTreeMap::new(),
            settings: Settings::new(),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_tags(mut self, tags: Tag) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_link(
        mut self,
        target: impl Into<String>,
        source: Operation,
        operation: Operation,
    ) -> Self {
        self.links.push(LinkDeclaration::new(target, source, operation));
        self
    }

    pub fn with_arguments(mut self, slot: ArgumentSlot, arguments: Arguments) -> Self {
        self.arguments.insert(slot, arguments);
        self
    }

    pub fn with_override(
        mut self,
        thread: impl Into<String>,
        status_override: StatusOverride,
    ) -> Self {
        self.status_overrides.insert(thread.into(), status_override);
        self
    }

    /// Arguments for `slot`, empty when not configured.
    pub fn arguments_for(&self, slot: ArgumentSlot) -> Arguments {
        self.arguments.get(&slot).cloned().unwrap_or_default()
    }
}

/// Blueprint-wide policy flags. The engine forwards these to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlueprintSettings {
    /// Re-run check after a fix.
    pub recheck: bool,
    #[serde(alias = "allowRequestStop")]
    pub allow_request_stop: bool,
    #[serde(alias = "orderFeedbacksByPriority")]
    pub order_feedbacks_by_priority: bool,
    #[serde(alias = "feedbackDisplayWarning")]
    pub feedback_display_warning: bool,
    #[serde(alias = "feedbackDisplayWarningLimit")]
    pub feedback_display_warning_limit: usize,
}

impl Default for BlueprintSettings {
    fn default() -> Self {
        Self {
            recheck: true,
            allow_request_stop: true,
            order_feedbacks_by_priority: false,
            feedback_display_warning: true,
            feedback_display_warning_limit: 100,
        }
    }
}

/// A parsed blueprint: ordered ids plus one description per id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BlueprintDeclaration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub header: Vec<String>,
    #[serde(default)]
    pub descriptions: BTreeMap<String, ProcessDescription>,
    #[serde(default)]
    pub settings: BlueprintSettings,
}

impl BlueprintDeclaration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            header: Vec::new(),
            descriptions: BTreeMap::new(),
            settings: BlueprintSettings::default(),
        }
    }

    /// Append `id` to the header with its description.
    pub fn with_process(mut self, id: impl Into<String>, description: ProcessDescription) -> Self {
        let id = id.into();
        self.header.push(id.clone());
        self.descriptions.insert(id, description);
        self
    }

    pub fn with_settings(mut self, settings: BlueprintSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn from_json_str(input: &str) -> Result<Self> {
        let declaration: Self = serde_json::from_str(input)?;
        declaration.validate()?;
        Ok(declaration)
    }

    pub fn from_toml_str(input: &str) -> Result<Self> {
        let declaration: Self = toml::from_str(input)?;
        declaration.validate()?;
        Ok(declaration)
    }

    /// Read a `.json` or `.toml` declaration. The file stem names an
    /// otherwise unnamed blueprint.
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut declaration = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&content)?,
            Some("toml") => Self::from_toml_str(&content)?,
            _ => {
                return Err(AthenaError::InvalidDeclaration(format!(
                    "unsupported blueprint file: {}",
                    path.display()
                )))
            }
        };
        if declaration.name.is_none() {
            declaration.name = path
                .file_stem()
                .and_then(|s| s.to_str())
                .map(str::to_string);
        }
        Ok(declaration)
    }

    /// Name, or `"unnamed"`.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("unnamed")
    }

    pub fn description(&self, id: &str) -> Option<&ProcessDescription> {
        self.descriptions.get(id)
    }

    /// Structural checks that need no registry: header ids are unique and
    /// described, every description is listed, and links target known ids.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for id in &self.header {
            if !seen.insert(id.as_str()) {
                return Err(AthenaError::InvalidDeclaration(format!(
                    "id {id} appears twice in the header"
                )));
            }
            if !self.descriptions.contains_key(id) {
                return Err(AthenaError::InvalidDeclaration(format!(
                    "id {id} has no description"
                )));
            }
        }

        for (id, description) in &self.descriptions {
            if !seen.contains(id.as_str()) {
                return Err(AthenaError::InvalidDeclaration(format!(
                    "description {id} is not listed in the header"
                )));
            }
            if description.process.trim().is_empty() {
                return Err(AthenaError::InvalidDeclaration(format!(
                    "description {id} has an empty process path"
                )));
            }
            for link in &description.links {
                if !seen.contains(link.target()) {
                    return Err(AthenaError::UnknownProcessId(format!(
                        "{} (linked from {id})",
                        link.target()
                    )));
                }
            }
        }
        Ok(())
    }

    /// SHA-256 of the canonical JSON form.
    pub fn digest(&self) -> Result<String> {
        let bytes = serde_json::to_vec(self)?;
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Ok(hex::encode(hasher.finalize()))
    }
}
