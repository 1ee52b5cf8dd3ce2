//! Per-step outcome reporting: the substrate the driver aggregates sub-test
//! results into.

use derive_more::Display;

use crate::feature::Timing;

/// Terminal status of a single [`Step`] sub-test.
///
/// [`Step`]: crate::feature::Step
#[derive(Clone, Debug, Display, Eq, PartialEq)]
pub enum StepStatus {
    /// Step ran to completion without error.
    #[display(fmt = "passed")]
    Passed,

    /// Step ran and failed.
    #[display(fmt = "failed: {}", _0)]
    Failed(String),

    /// Step did not run; not a failure.
    ///
    /// Carries the human-readable reason: either a level/state filter
    /// mismatch, or an upstream-phase failure propagated as a skip.
    #[display(fmt = "skipped: {}", _0)]
    Skipped(String),
}

impl StepStatus {
    /// Indicates whether this status is [`StepStatus::Failed`].
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Indicates whether this status is [`StepStatus::Skipped`].
    #[must_use]
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped(_))
    }

    /// Indicates whether this status is [`StepStatus::Passed`].
    #[must_use]
    pub fn is_passed(&self) -> bool {
        matches!(self, Self::Passed)
    }
}

/// Outcome of one [`Step`] sub-test.
///
/// [`Step`]: crate::feature::Step
#[derive(Clone, Debug, Display, Eq, PartialEq)]
#[display(fmt = "[{}] {}: {}", timing, name, status)]
pub struct StepReport {
    /// Step name.
    pub name: String,

    /// Phase the step belonged to.
    pub timing: Timing,

    /// Terminal status of the step.
    pub status: StepStatus,
}

/// Aggregated outcome of a single [`Feature`] run: one [`StepReport`] per
/// declared step, in phase execution order.
///
/// The feature's pass/fail state is the logical OR of its step failures.
///
/// [`Feature`]: crate::Feature
#[derive(Clone, Debug)]
pub struct ExecutionReport {
    /// Name of the executed [`Feature`].
    ///
    /// [`Feature`]: crate::Feature
    pub feature: String,

    steps: Vec<StepReport>,
}

impl ExecutionReport {
    /// Creates an empty report for the named feature.
    #[must_use]
    pub fn new(feature: impl Into<String>) -> Self {
        Self {
            feature: feature.into(),
            steps: Vec::new(),
        }
    }

    pub(crate) fn push(
        &mut self,
        name: impl Into<String>,
        timing: Timing,
        status: StepStatus,
    ) {
        self.steps.push(StepReport {
            name: name.into(),
            timing,
            status,
        });
    }

    /// Step outcomes in phase execution order.
    #[must_use]
    pub fn steps(&self) -> &[StepReport] {
        &self.steps
    }

    /// Outcome of the step with the given name, if present.
    #[must_use]
    pub fn step(&self, name: &str) -> Option<&StepReport> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// Indicates whether any step failed.
    #[must_use]
    pub fn failed(&self) -> bool {
        self.steps.iter().any(|s| s.status.is_failed())
    }

    /// Indicates whether every step passed or was skipped.
    #[must_use]
    pub fn passed(&self) -> bool {
        !self.failed()
    }

    /// Names of executed (non-skipped) steps, in execution order.
    #[must_use]
    pub fn executed(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter(|s| !s.status.is_skipped())
            .map(|s| s.name.as_str())
            .collect()
    }

    /// All failed step outcomes.
    pub fn failures(&self) -> impl Iterator<Item = &StepReport> {
        self.steps.iter().filter(|s| s.status.is_failed())
    }

    /// All skipped step outcomes.
    pub fn skipped(&self) -> impl Iterator<Item = &StepReport> {
        self.steps.iter().filter(|s| s.status.is_skipped())
    }
}
