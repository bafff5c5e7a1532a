//! Threads: named sub-checks of a process, each with its own status and feedback.
//!
//! A process type declares its threads once; every process instance works on
//! its own copy so status overrides and state never leak between instances.

use serde::Serialize;
use serde_json::Value;

use crate::error::Result;
use crate::feedback::Feedback;
use crate::status::{worst_fail, Status, StatusFamily};

/// Current state of a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadState {
    Success,
    Fail,
}

/// A diagnostic thread.
#[derive(Debug, Clone)]
pub struct Thread {
    name: String,
    title: String,
    documentation: Option<String>,
    fail_status: Status,
    success_status: Status,
    state: ThreadState,
    status: Status,
    feedback: Feedback,
}

impl Thread {
    /// New thread failing with `Error` and succeeding with `Success`.
    pub fn new(name: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            title: title.into(),
            documentation: None,
            fail_status: Status::ERROR,
            success_status: Status::SUCCESS,
            state: ThreadState::Success,
            status: Status::SUCCESS,
            feedback: Feedback::default(),
        }
    }

    /// Configure the fail status. Must be of the fail family.
    pub fn with_fail_status(mut self, status: Status) -> Result<Self> {
        self.set_fail_status(status)?;
        Ok(self)
    }

    /// Configure the success status. Must be of the success family.
    pub fn with_success_status(mut self, status: Status) -> Result<Self> {
        self.set_success_status(status)?;
        Ok(self)
    }

    pub fn with_documentation(mut self, documentation: impl Into<String>) -> Self {
        self.documentation = Some(documentation.into());
        self
    }

    pub(crate) fn set_fail_status(&mut self, status: Status) -> Result<()> {
        status.expect_family(StatusFamily::Fail)?;
        if self.state == ThreadState::Fail {
            self.status = status.clone();
        }
        self.fail_status = status;
        Ok(())
    }

    pub(crate) fn set_success_status(&mut self, status: Status) -> Result<()> {
        status.expect_family(StatusFamily::Success)?;
        if self.state == ThreadState::Success {
            self.status = status.clone();
        }
        self.success_status = status;
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn documentation(&self) -> Option<&str> {
        self.documentation.as_deref()
    }

    pub fn fail_status(&self) -> &Status {
        &self.fail_status
    }

    pub fn success_status(&self) -> &Status {
        &self.success_status
    }

    pub fn state(&self) -> ThreadState {
        self.state
    }

    /// Current status: the configured (or overriding) status of the current state.
    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn feedback(&self) -> &Feedback {
        &self.feedback
    }

    pub fn is_failed(&self) -> bool {
        self.state == ThreadState::Fail
    }

    /// Mark the thread failed with `feedback`.
    ///
    /// `status` replaces the configured fail status for this call only when it
    /// belongs to the fail family; otherwise the configured status is used.
    pub fn set_fail(&mut self, feedback: Feedback, status: Option<Status>) {
        self.state = ThreadState::Fail;
        self.status = status
            .filter(Status::is_fail)
            .unwrap_or_else(|| self.fail_status.clone());
        self.feedback = feedback;
    }

    /// Mark the thread successful with `feedback` (usually empty).
    pub fn set_success(&mut self, feedback: Feedback, status: Option<Status>) {
        self.state = ThreadState::Success;
        self.status = status
            .filter(Status::is_success)
            .unwrap_or_else(|| self.success_status.clone());
        self.feedback = feedback;
    }

    /// Append one item to the current feedback without touching the state.
    pub fn add_feedback(&mut self, display: impl Into<String>, select: Value) {
        self.feedback.push(display, select);
    }

    /// Append `feedback` to the current feedback without touching the state.
    pub fn extend_feedback(&mut self, feedback: Feedback) {
        self.feedback.extend(feedback);
    }

    /// Back to `Success` with the configured success status and no feedback.
    pub fn reset(&mut self) {
        self.state = ThreadState::Success;
        self.status = self.success_status.clone();
        self.feedback.clear();
    }
}

/// Feedback produced by one thread, as returned to callers.
#[derive(Debug, Clone, Serialize)]
pub struct ThreadFeedback {
    pub thread: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,
    pub state: ThreadState,
    pub status: Status,
    pub feedback: Feedback,
}

impl From<&Thread> for ThreadFeedback {
    fn from(thread: &Thread) -> Self {
        Self {
            thread: thread.name.clone(),
            title: thread.title.clone(),
            documentation: thread.documentation.clone(),
            state: thread.state,
            status: thread.status.clone(),
            feedback: thread.feedback.clone(),
        }
    }
}

/// Aggregated result of a check or fix.
#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    /// Threads with non-empty feedback, in declaration order.
    pub feedbacks: Vec<ThreadFeedback>,
    /// Worst fail status among those threads, or `Default`.
    pub status: Status,
}

impl CheckReport {
    pub fn is_failed(&self) -> bool {
        self.status.is_fail()
    }
}

/// The runtime threads of one process instance, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct Threads {
    threads: Vec<Thread>,
}

impl From<Vec<Thread>> for Threads {
    fn from(threads: Vec<Thread>) -> Self {
        Self { threads }
    }
}

impl Threads {
    pub fn get(&self, name: &str) -> Option<&Thread> {
        self.threads.iter().find(|t| t.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Thread> {
        self.threads.iter_mut().find(|t| t.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Thread> {
        self.threads.iter()
    }

    pub fn len(&self) -> usize {
        self.threads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    pub fn reset_all(&mut self) {
        for thread in &mut self.threads {
            thread.reset();
        }
    }

    /// Collect threads with feedback and the worst fail status among them.
    ///
    /// A thread with empty feedback counts as clean whatever its state.
    pub fn aggregate(&self) -> CheckReport {
        let reporting: Vec<&Thread> = self
            .threads
            .iter()
            .filter(|t| !t.feedback.is_empty())
            .collect();

        let status = worst_fail(
            reporting
                .iter()
                .filter(|t| t.state == ThreadState::Fail)
                .map(|t| &t.status),
        );

        CheckReport {
            feedbacks: reporting.into_iter().map(ThreadFeedback::from).collect(),
            status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::Color;
    use serde_json::json;

    fn thread(name: &str) -> Thread {
        Thread::new(name, format!("{name} title"))
    }

    #[test]
    fn test_family_enforced_at_construction() {
        assert!(thread("a").with_fail_status(Status::CORRECT).is_err());
        assert!(thread("a").with_success_status(Status::ERROR).is_err());
        assert!(thread("a").with_fail_status(Status::DEFAULT).is_err());

        let t = thread("a").with_fail_status(Status::WARNING).unwrap();
        assert_eq!(t.fail_status(), &Status::WARNING);
    }

    #[test]
    fn test_reset_is_idempotent() {
        let mut t = thread("a")
            .with_success_status(Status::CORRECT)
            .unwrap();
        t.set_fail(Feedback::new(["x"]), None);
        assert!(t.is_failed());

        for _ in 0..3 {
            t.reset();
            assert_eq!(t.state(), ThreadState::Success);
            assert_eq!(t.status(), &Status::CORRECT);
            assert!(t.feedback().is_empty());
        }
    }

    #[test]
    fn test_set_fail_override_respects_family() {
        let mut t = thread("a");
        t.set_fail(Feedback::new(["x"]), Some(Status::CRITICAL));
        assert_eq!(t.status(), &Status::CRITICAL);

        t.set_fail(Feedback::new(["x"]), Some(Status::SUCCESS));
        assert_eq!(t.status(), &Status::ERROR);

        t.set_success(Feedback::default(), Some(Status::CORRECT));
        assert_eq!(t.state(), ThreadState::Success);
        assert_eq!(t.status(), &Status::CORRECT);
    }

    #[test]
    fn test_add_feedback_keeps_state() {
        let mut t = thread("a");
        t.add_feedback("pCube1", json!("pCube1"));
        assert_eq!(t.state(), ThreadState::Success);
        assert_eq!(t.feedback().len(), 1);
    }

    #[test]
    fn test_aggregate_returns_worst_fail() {
        let error_11 = Status::ERROR;
        let custom_12 = Status::fail("Blocking", 1.2, Color::rgb(0, 0, 0));

        let mut a = thread("a");
        a.set_fail(Feedback::new(["a1"]), Some(error_11));
        let mut b = thread("b");
        b.set_fail(Feedback::new(["b1", "b2"]), Some(custom_12.clone()));
        let mut c = thread("c");
        c.set_success(Feedback::new(["c1"]), None);
        let d = thread("d");

        let threads = Threads::from(vec![a, b, c, d]);
        let report = threads.aggregate();

        assert_eq!(report.status, custom_12);
        let names: Vec<&str> = report.feedbacks.iter().map(|f| f.thread.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_failed_thread_without_feedback_is_clean() {
        let mut a = thread("a");
        a.set_fail(Feedback::default(), None);
        let report = Threads::from(vec![a]).aggregate();
        assert!(report.feedbacks.is_empty());
        assert_eq!(report.status, Status::DEFAULT);
        assert!(!report.is_failed());
    }
}
