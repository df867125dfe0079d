//! Folds role and permission outcomes into one [`Verdict`].
//!
//! The aggregator starts in the allowing state and moves to a terminal
//! deny on the first failing step. Once terminal, later inputs are ignored
//! so the first cause is the one reported.

use indexmap::IndexSet;
use portcullis_core::{DenyReason, Subject, Verdict};

use crate::error::AuthzError;
use crate::resolver::{CheckOutcome, PermissionCheck};

/// What the caller should do after feeding the aggregator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Keep going.
    Continue,
    /// Stop; the verdict is final.
    Done(Verdict),
}

impl Step {
    /// Returns true for [`Step::Done`].
    pub const fn is_done(&self) -> bool {
        matches!(self, Self::Done(_))
    }
}

/// Decision state for one request.
#[derive(Debug, Default)]
pub struct DecisionAggregator {
    denial: Option<Verdict>,
    granted: usize,
}

impl DecisionAggregator {
    /// Starts a new decision.
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies the role gate.
    ///
    /// Passes when `required` is empty or the subject holds any of them.
    pub fn check_roles(&mut self, required: &IndexSet<String>, subject: &Subject) -> Step {
        if self.denial.is_some() || subject.has_any_role(required) {
            return self.step();
        }
        let detail = format!(
            "requires one of [{}]",
            required.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
        );
        self.deny(Verdict::deny(DenyReason::MissingRole, detail))
    }

    /// Records the outcome of one permission check.
    pub fn record(&mut self, check: &PermissionCheck, outcome: CheckOutcome) -> Step {
        if self.denial.is_some() {
            return self.step();
        }
        match outcome {
            CheckOutcome::Granted => {
                self.granted += 1;
                Step::Continue
            }
            CheckOutcome::Denied(_) => self.deny(Verdict::deny(
                DenyReason::PermissionDenied,
                format!(
                    "missing {} on {} {}",
                    check.permission, check.resource_type, check.resource_id
                ),
            )),
            CheckOutcome::Failed(e) => self.fail(e),
        }
    }

    /// Records an error that ends the decision.
    pub fn fail(&mut self, error: AuthzError) -> Step {
        if self.denial.is_some() {
            return self.step();
        }
        let reason = error.deny_reason();
        let detail = match reason {
            DenyReason::BodyDecode => error.to_string(),
            _ => "authorization service unavailable".to_string(),
        };
        self.deny(Verdict::deny(reason, detail))
    }

    /// Number of checks granted so far.
    pub const fn granted(&self) -> usize {
        self.granted
    }

    /// The final verdict.
    pub fn decide(self) -> Verdict {
        self.denial.unwrap_or(Verdict::Allow)
    }

    fn deny(&mut self, verdict: Verdict) -> Step {
        self.denial = Some(verdict);
        self.step()
    }

    fn step(&self) -> Step {
        self.denial
            .as_ref()
            .map_or(Step::Continue, |v| Step::Done(v.clone()))
    }
}
