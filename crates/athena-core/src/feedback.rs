//! Feedback: what a thread shows the user and what it lets them act on.

use serde::Serialize;
use serde_json::Value;

use crate::error::{AthenaError, Result};

/// Paired display/selection items produced by a thread.
///
/// `to_display` and `to_select` always have the same length: item `i` of
/// `to_select` is the host object behind display item `i`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Feedback {
    to_display: Vec<String>,
    to_select: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    help: Option<String>,
}

impl Feedback {
    /// Feedback whose selection mirrors what is displayed.
    pub fn new<I, S>(to_display: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let to_display: Vec<String> = to_display.into_iter().map(Into::into).collect();
        let to_select = to_display.iter().cloned().map(Value::String).collect();
        Self {
            to_display,
            to_select,
            help: None,
        }
    }

    /// Feedback with an explicit selection list, which must match the
    /// display list in length.
    pub fn with_selection<I, S>(to_display: I, to_select: Vec<Value>) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let to_display: Vec<String> = to_display.into_iter().map(Into::into).collect();
        if to_display.len() != to_select.len() {
            return Err(AthenaError::FeedbackLengthMismatch {
                display: to_display.len(),
                select: to_select.len(),
            });
        }
        Ok(Self {
            to_display,
            to_select,
            help: None,
        })
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// Append one display item and the object it selects.
    pub fn push(&mut self, display: impl Into<String>, select: Value) {
        self.to_display.push(display.into());
        self.to_select.push(select);
    }

    /// Append every item of `other`. Help text of `self` wins when both have one.
    pub fn extend(&mut self, other: Feedback) {
        self.to_display.extend(other.to_display);
        self.to_select.extend(other.to_select);
        if self.help.is_none() {
            self.help = other.help;
        }
    }

    pub fn clear(&mut self) {
        self.to_display.clear();
        self.to_select.clear();
        self.help = None;
    }

    pub fn to_display(&self) -> &[String] {
        &self.to_display
    }

    pub fn to_select(&self) -> &[Value] {
        &self.to_select
    }

    pub fn help(&self) -> Option<&str> {
        self.help.as_deref()
    }

    pub fn len(&self) -> usize {
        self.to_display.len()
    }

    pub fn is_empty(&self) -> bool {
        self.to_display.is_empty()
    }

    /// Display items paired with the objects they select.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.to_display
            .iter()
            .map(String::as_str)
            .zip(self.to_select.iter())
    }
}
