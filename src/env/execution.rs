//! The phase state machine driving a [`Feature`] through
//! Setup → Requirement → Assert → Teardown.
//!
//! Setup, Requirement and Teardown steps run sequentially, each as an
//! isolated named sub-test the driver waits on before starting the next.
//! Assert steps fan out concurrently and are isolated per step: one failing
//! assertion never prevents its siblings from running. Failures in Setup or
//! Requirement convert into skip signals for downstream phases; Teardown
//! always runs.

use std::{panic::AssertUnwindSafe, sync::Arc};

use futures::{future, FutureExt as _};

use super::{Environment, StepContext};
use crate::{
    feature::{Feature, FeatureSet, SetReport, Step, StepError, Timing},
    report::{ExecutionReport, StepStatus},
    state::KVStore,
};

/// Why a downstream phase will not run.
#[derive(Clone)]
struct SkipSignal {
    reason: String,
}

impl Environment {
    /// Executes `feature` through the full phase sequence and returns one
    /// [`StepReport`] per declared step.
    ///
    /// If the feature carries no state store yet, a fresh [`KVStore`] is
    /// created and bound into the step context before any step runs. The
    /// context handed to step functions holds a run-scoped cancellation
    /// token that is cancelled when this call returns, so anything a step
    /// leaked keeps observing a closed lifetime afterwards.
    ///
    /// [`StepReport`]: crate::report::StepReport
    pub async fn test(&self, feature: &mut Feature) -> ExecutionReport {
        let report = self.run_feature(feature).await;
        if self.managed {
            self.finish_managed().await;
        }
        report
    }

    /// Executes every feature of `set` as a concurrent sub-test, waiting for
    /// all to finish.
    ///
    /// Each feature gets its own run with independent phase semantics: a
    /// failure in one feature neither blocks nor skips the others. On a
    /// managed environment, teardown happens once, after every member has
    /// finished.
    pub async fn test_set(&self, set: &mut FeatureSet) -> SetReport {
        tracing::debug!(set = %set.name, features = set.features.len(), "feature set started");

        let features = future::join_all(
            set.features.iter_mut().map(|f| self.run_feature(f)),
        )
        .await;
        if self.managed {
            self.finish_managed().await;
        }

        let report = SetReport {
            name: set.name.clone(),
            features,
        };
        tracing::debug!(set = %report.name, failed = report.failed(), "feature set finished");
        report
    }

    async fn run_feature(&self, feature: &mut Feature) -> ExecutionReport {
        let state = Arc::clone(
            feature
                .state
                .get_or_insert_with(|| Arc::new(KVStore::new())),
        );
        let run = self.cancellation.child_token();
        let ctx = self.step_context(state, run.clone());

        self.emitter.test_started(&feature.name);
        tracing::debug!(feature = %feature.name, namespace = %self.namespace(), "feature started");

        let report = self.run_phases(feature, &ctx).await;

        run.cancel();
        self.emitter.test_finished(&feature.name, &report);
        tracing::debug!(
            feature = %feature.name,
            failed = report.failed(),
            "feature finished",
        );

        report
    }

    async fn finish_managed(&self) {
        if let Err(e) = self.finish().await {
            tracing::warn!(
                namespace = %self.namespace(),
                error = %e,
                "managed environment teardown failed",
            );
        }
    }

    async fn run_phases(
        &self,
        feature: &Feature,
        ctx: &StepContext,
    ) -> ExecutionReport {
        let mut report = ExecutionReport::new(&feature.name);
        let mut skip_requirements: Option<SkipSignal> = None;
        let mut skip_assertions: Option<SkipSignal> = None;

        // Setup: sequential, with a barrier between steps. A failure here
        // bypasses Requirement and Assert entirely; Teardown still runs.
        let mut failed_setup = false;
        for step in phase(feature, Timing::Setup) {
            if failed_setup {
                self.record_skip(
                    &mut report,
                    &feature.name,
                    step,
                    "an earlier setup step failed".to_owned(),
                );
                continue;
            }
            let status = self.run_gated(&feature.name, step, ctx).await;
            if status.is_failed() {
                failed_setup = true;
                let signal = SkipSignal {
                    reason: format!("setup {:?} failed", step.name),
                };
                skip_requirements = Some(signal.clone());
                skip_assertions = Some(signal);
            }
            report.push(&step.name, step.timing, status);
        }

        // Requirements: sequential and fail-fast, since later requirements
        // may presuppose earlier ones succeeded.
        for step in phase(feature, Timing::Requirement) {
            if let Some(signal) = &skip_requirements {
                self.record_skip(
                    &mut report,
                    &feature.name,
                    step,
                    signal.reason.clone(),
                );
                continue;
            }
            let status = self.run_gated(&feature.name, step, ctx).await;
            if status.is_failed() {
                let signal = SkipSignal {
                    reason: format!("requirement {:?} failed", step.name),
                };
                skip_requirements = Some(signal.clone());
                skip_assertions = Some(signal);
            }
            report.push(&step.name, step.timing, status);
        }

        // Asserts: per-step fan-out, isolated pass/fail, all awaited before
        // Teardown begins. join_all polls every step concurrently and yields
        // outcomes in declaration order.
        let asserts: Vec<_> = phase(feature, Timing::Assert).collect();
        let outcomes: Vec<StepStatus> =
            if let Some(signal) = &skip_assertions {
                asserts
                    .iter()
                    .map(|step| {
                        let status =
                            StepStatus::Skipped(signal.reason.clone());
                        self.emitter.step_finished(
                            &feature.name,
                            &step.name,
                            step.timing,
                            &status,
                        );
                        status
                    })
                    .collect()
            } else {
                future::join_all(
                    asserts
                        .iter()
                        .map(|step| self.run_gated(&feature.name, step, ctx)),
                )
                .await
            };
        for (step, status) in asserts.iter().zip(outcomes) {
            report.push(&step.name, step.timing, status);
        }

        // Teardown: unconditional, sequential. Its failures are reported but
        // never retroactively fail or skip earlier phases.
        for step in phase(feature, Timing::Teardown) {
            let status = self.run_gated(&feature.name, step, ctx).await;
            report.push(&step.name, step.timing, status);
        }

        report
    }

    /// Runs one step unless the active level/state filters exclude it.
    async fn run_gated(
        &self,
        feature: &str,
        step: &Step,
        ctx: &StepContext,
    ) -> StepStatus {
        if let Some(reason) = self.filter_reason(step) {
            tracing::debug!(feature, step = %step.name, %reason, "step skipped");
            self.emitter.step_finished(
                feature,
                &step.name,
                step.timing,
                &StepStatus::Skipped(reason.clone()),
            );
            return StepStatus::Skipped(reason);
        }

        self.emitter.step_started(feature, &step.name, step.timing);
        let status = match AssertUnwindSafe(step.invoke(ctx))
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => StepStatus::Passed,
            Ok(Err(e)) => StepStatus::Failed(e.to_string()),
            Err(payload) => StepStatus::Failed(
                StepError::Panicked {
                    payload: panic_message(payload.as_ref()),
                }
                .to_string(),
            ),
        };
        if let StepStatus::Failed(reason) = &status {
            tracing::warn!(feature, step = %step.name, %reason, "step failed");
        }
        self.emitter
            .step_finished(feature, &step.name, step.timing, &status);
        status
    }

    fn filter_reason(&self, step: &Step) -> Option<String> {
        if !step.levels.is_empty() && !step.levels.intersects(self.levels) {
            return Some(format!(
                "requirement level {} not enabled (active: {})",
                step.levels, self.levels,
            ));
        }
        if !step.states.is_empty() && !step.states.intersects(self.states) {
            return Some(format!(
                "feature state {} not enabled (active: {})",
                step.states, self.states,
            ));
        }
        None
    }

    fn record_skip(
        &self,
        report: &mut ExecutionReport,
        feature: &str,
        step: &Step,
        reason: String,
    ) {
        self.emitter.step_finished(
            feature,
            &step.name,
            step.timing,
            &StepStatus::Skipped(reason.clone()),
        );
        report.push(&step.name, step.timing, StepStatus::Skipped(reason));
    }
}

/// Steps of `feature` belonging to `timing`, in declaration order.
fn phase(feature: &Feature, timing: Timing) -> impl Iterator<Item = &Step> {
    feature.steps.iter().filter(move |s| s.timing == timing)
}

/// Renders a trapped panic payload for reporting.
fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload.downcast_ref::<String>().cloned().unwrap_or_else(|| {
        payload
            .downcast_ref::<&str>()
            .map_or_else(|| "opaque panic payload".to_owned(), |s| (*s).to_owned())
    })
}
