//! Fire-and-forget lifecycle notifications for external observability.
//!
//! The driver reports test and step boundaries to a [`MilestoneEmitter`];
//! emitters must never block or fail phase progression, so every callback
//! is synchronous, infallible and best-effort.

use std::sync::{Mutex, PoisonError};

use crate::{
    feature::Timing,
    report::{ExecutionReport, StepStatus},
};

/// Receiver of test lifecycle events.
///
/// All callbacks have no-op defaults, so an emitter implements only what it
/// observes.
pub trait MilestoneEmitter: Send + Sync {
    /// A feature run is starting.
    fn test_started(&self, feature: &str) {
        _ = feature;
    }

    /// A step sub-test is starting.
    fn step_started(&self, feature: &str, step: &str, timing: Timing) {
        _ = (feature, step, timing);
    }

    /// A step sub-test finished or was skipped.
    fn step_finished(
        &self,
        feature: &str,
        step: &str,
        timing: Timing,
        status: &StepStatus,
    ) {
        _ = (feature, step, timing, status);
    }

    /// A feature run finished.
    fn test_finished(&self, feature: &str, report: &ExecutionReport) {
        _ = (feature, report);
    }

    /// The environment was torn down.
    fn environment_finished(&self, namespace: &str) {
        _ = namespace;
    }
}

/// [`MilestoneEmitter`] discarding every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullEmitter;

impl MilestoneEmitter for NullEmitter {}

/// [`MilestoneEmitter`] logging every event through [`tracing`].
#[derive(Clone, Copy, Debug, Default)]
pub struct LogEmitter;

impl MilestoneEmitter for LogEmitter {
    fn test_started(&self, feature: &str) {
        tracing::info!(feature, "feature started");
    }

    fn step_started(&self, feature: &str, step: &str, timing: Timing) {
        tracing::debug!(feature, step, phase = %timing, "step started");
    }

    fn step_finished(
        &self,
        feature: &str,
        step: &str,
        timing: Timing,
        status: &StepStatus,
    ) {
        match status {
            StepStatus::Failed(_) => tracing::warn!(
                feature, step, phase = %timing, %status, "step finished",
            ),
            _ => tracing::debug!(
                feature, step, phase = %timing, %status, "step finished",
            ),
        }
    }

    fn test_finished(&self, feature: &str, report: &ExecutionReport) {
        tracing::info!(
            feature,
            failed = report.failed(),
            steps = report.steps().len(),
            "feature finished",
        );
    }

    fn environment_finished(&self, namespace: &str) {
        tracing::info!(namespace, "environment finished");
    }
}

/// [`MilestoneEmitter`] recording one line per event, for engine tests.
#[derive(Debug, Default)]
pub struct RecordingEmitter {
    events: Mutex<Vec<String>>,
}

impl RecordingEmitter {
    /// Creates an empty [`RecordingEmitter`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every recorded event line, in emission order.
    #[must_use]
    pub fn events(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, line: String) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line);
    }
}

impl MilestoneEmitter for RecordingEmitter {
    fn test_started(&self, feature: &str) {
        self.record(format!("test started: {feature}"));
    }

    fn step_started(&self, feature: &str, step: &str, timing: Timing) {
        self.record(format!("step started: {feature}/{timing}/{step}"));
    }

    fn step_finished(
        &self,
        feature: &str,
        step: &str,
        timing: Timing,
        status: &StepStatus,
    ) {
        self.record(format!(
            "step finished: {feature}/{timing}/{step}: {status}",
        ));
    }

    fn test_finished(&self, feature: &str, report: &ExecutionReport) {
        self.record(format!(
            "test finished: {feature} (failed: {})",
            report.failed(),
        ));
    }

    fn environment_finished(&self, namespace: &str) {
        self.record(format!("environment finished: {namespace}"));
    }
}
