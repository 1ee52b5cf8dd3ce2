//! Pure transforms producing an ordered execution plan from a declared step
//! list: phase-order grouping ([`reorder`]) and per-timing merging
//! ([`collapse`]).

use std::sync::Arc;

use futures::FutureExt as _;
use itertools::Itertools as _;

use super::step::{Levels, States, Step, Timing};

/// Groups `steps` by [`Timing`] into the fixed phase sequence
/// Setup → Requirement → Assert → Teardown, preserving relative declaration
/// order within each group.
///
/// Stable, pure and total: never fails, never drops a step.
#[must_use]
pub fn reorder(mut steps: Vec<Step>) -> Vec<Step> {
    // Vec::sort_by_key is stable, which is what preserves declaration order
    // within a phase.
    steps.sort_by_key(|s| s.timing);
    steps
}

/// Like [`reorder`], but additionally merges all steps of each
/// single-execution timing (Setup, Requirement, Teardown) into one composite
/// step per timing.
///
/// The composite's name is the comma-joined list of its sub-step names and
/// its function invokes the sub-functions sequentially, so a failure partway
/// aborts the remaining sub-functions of that composite. Assert steps remain
/// individually wrapped, since that phase runs with intra-phase parallelism
/// and per-step pass/fail isolation.
///
/// A timing with zero steps yields no composite step at all.
#[must_use]
pub fn collapse(steps: Vec<Step>) -> Vec<Step> {
    let mut setup = Vec::new();
    let mut requirement = Vec::new();
    let mut assert = Vec::new();
    let mut teardown = Vec::new();
    for s in steps {
        match s.timing {
            Timing::Setup => setup.push(s),
            Timing::Requirement => requirement.push(s),
            Timing::Assert => assert.push(s),
            Timing::Teardown => teardown.push(s),
        }
    }

    let mut out = Vec::new();
    out.extend(merge(Timing::Setup, setup));
    out.extend(merge(Timing::Requirement, requirement));
    out.extend(assert);
    out.extend(merge(Timing::Teardown, teardown));
    out
}

/// Merges `steps` into a single sequential composite of the given `timing`.
fn merge(timing: Timing, steps: Vec<Step>) -> Option<Step> {
    if steps.is_empty() {
        return None;
    }

    let name = steps.iter().map(|s| s.name.as_str()).join(", ");
    let levels = steps
        .iter()
        .fold(Levels::NONE, |acc, s| acc | s.levels);
    let states = steps
        .iter()
        .fold(States::NONE, |acc, s| acc | s.states);

    let steps = Arc::new(steps);
    Some(Step::new(name, timing, levels, states, move |ctx| {
        let steps = Arc::clone(&steps);
        async move {
            for s in steps.iter() {
                s.invoke(ctx).await?;
            }
            Ok(())
        }
        .boxed_local()
    }))
}

#[cfg(test)]
mod tests {
    use futures::future::LocalBoxFuture;

    use super::*;
    use crate::{env::StepContext, feature::step::StepResult};

    fn nop(_: &StepContext) -> LocalBoxFuture<'_, StepResult> {
        futures::FutureExt::boxed_local(async { Ok(()) })
    }

    fn step(name: &str, timing: Timing) -> Step {
        Step::new(name, timing, Levels::NONE, States::NONE, nop)
    }

    #[test]
    fn reorder_groups_by_phase_and_keeps_declaration_order() {
        let out = reorder(vec![
            step("t1", Timing::Teardown),
            step("a1", Timing::Assert),
            step("s1", Timing::Setup),
            step("r1", Timing::Requirement),
            step("s2", Timing::Setup),
            step("a2", Timing::Assert),
        ]);

        let names: Vec<_> = out.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["s1", "s2", "r1", "a1", "a2", "t1"]);
    }

    #[test]
    fn reorder_of_empty_input_is_empty() {
        assert!(reorder(Vec::new()).is_empty());
    }

    #[test]
    fn collapse_merges_single_execution_timings() {
        // 2 Setup + 1 Requirement + 0 Assert + 2 Teardown.
        let out = collapse(vec![
            step("deploy sender", Timing::Setup),
            step("undeploy sender", Timing::Teardown),
            step("deploy receiver", Timing::Setup),
            step("sender is ready", Timing::Requirement),
            step("undeploy receiver", Timing::Teardown),
        ]);

        assert_eq!(out.len(), 3);
        assert_eq!(out[0].timing, Timing::Setup);
        assert_eq!(out[0].name, "deploy sender, deploy receiver");
        assert_eq!(out[1].timing, Timing::Requirement);
        assert_eq!(out[1].name, "sender is ready");
        assert_eq!(out[2].timing, Timing::Teardown);
        assert_eq!(out[2].name, "undeploy sender, undeploy receiver");
    }

    #[test]
    fn collapse_keeps_assert_steps_individual() {
        let out = collapse(vec![
            step("a1", Timing::Assert),
            step("s1", Timing::Setup),
            step("a2", Timing::Assert),
            step("a3", Timing::Assert),
        ]);

        let names: Vec<_> = out.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["s1", "a1", "a2", "a3"]);
        assert!(out[1..].iter().all(|s| s.timing == Timing::Assert));
    }

    #[test]
    fn collapse_composite_unions_level_and_state_masks() {
        let mut a = step("a", Timing::Teardown);
        a.levels = Levels::MUST;
        a.states = States::ALPHA;
        let mut b = step("b", Timing::Teardown);
        b.levels = Levels::SHOULD;
        b.states = States::STABLE;

        let out = collapse(vec![a, b]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].levels, Levels::MUST | Levels::SHOULD);
        assert_eq!(out[0].states, States::ALPHA | States::STABLE);
    }
}
