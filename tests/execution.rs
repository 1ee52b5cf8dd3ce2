//! Black-box tests of the phase state machine: ordering, skip propagation,
//! assert isolation, filtering and context lifecycle.

use std::sync::{Arc, Mutex};

use futures::FutureExt as _;
use tokio_util::sync::CancellationToken;

use crucible::{
    env::{opts, GlobalEnvironment, ImageRegistry},
    resources::{FakeProvisioner, ResourceProvisioner},
    Feature, Levels, States, Step, StepError, Timing,
};

type Log = Arc<Mutex<Vec<String>>>;

fn global() -> (GlobalEnvironment, Arc<FakeProvisioner>) {
    let provisioner = Arc::new(FakeProvisioner::new());
    let global = GlobalEnvironment::new(
        ImageRegistry::new().with("eventshub", "registry.test/hub:v1"),
        Arc::clone(&provisioner) as Arc<dyn ResourceProvisioner>,
    );
    (global, provisioner)
}

fn ok_step(name: &str, timing: Timing, log: &Log) -> Step {
    let log = Arc::clone(log);
    let step_name = name.to_owned();
    Step::new(name, timing, Levels::NONE, States::NONE, move |_ctx| {
        let log = Arc::clone(&log);
        let step_name = step_name.clone();
        async move {
            log.lock().unwrap().push(step_name);
            Ok(())
        }
        .boxed_local()
    })
}

fn failing_step(name: &str, timing: Timing, log: &Log) -> Step {
    let log = Arc::clone(log);
    let step_name = name.to_owned();
    Step::new(name, timing, Levels::NONE, States::NONE, move |_ctx| {
        let log = Arc::clone(&log);
        let step_name = step_name.clone();
        async move {
            log.lock().unwrap().push(step_name.clone());
            Err(StepError::failed(format!("{step_name} exploded")))
        }
        .boxed_local()
    })
}

fn executed(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

#[tokio::test]
async fn all_steps_run_in_phase_order_without_failures() {
    let (global, _) = global();
    let env = global.environment(Vec::new()).await.unwrap();
    let log = Log::default();

    // Declared deliberately out of phase order.
    let mut feature = Feature::new("happy path");
    feature
        .step(ok_step("teardown-1", Timing::Teardown, &log))
        .step(ok_step("assert-1", Timing::Assert, &log))
        .step(ok_step("setup-1", Timing::Setup, &log))
        .step(ok_step("requirement-1", Timing::Requirement, &log))
        .step(ok_step("setup-2", Timing::Setup, &log))
        .step(ok_step("requirement-2", Timing::Requirement, &log))
        .step(ok_step("assert-2", Timing::Assert, &log))
        .step(ok_step("teardown-2", Timing::Teardown, &log));

    let report = env.test(&mut feature).await;

    assert!(report.passed());
    assert_eq!(report.steps().len(), 8);

    let order = executed(&log);
    assert_eq!(order.len(), 8);
    assert_eq!(&order[..2], ["setup-1", "setup-2"]);
    assert_eq!(&order[2..4], ["requirement-1", "requirement-2"]);
    // Asserts fan out, so only their window is fixed, not their order.
    let mut asserts = order[4..6].to_vec();
    asserts.sort();
    assert_eq!(asserts, ["assert-1", "assert-2"]);
    assert_eq!(&order[6..], ["teardown-1", "teardown-2"]);
}

#[tokio::test]
async fn setup_failure_skips_requirements_and_asserts_but_not_teardown() {
    let (global, _) = global();
    let env = global.environment(Vec::new()).await.unwrap();
    let log = Log::default();

    let mut feature = Feature::new("failing setup");
    for name in ["setup-1", "setup-2"] {
        feature.step(ok_step(name, Timing::Setup, &log));
    }
    feature.step(failing_step("setup-3", Timing::Setup, &log));
    for name in ["req-1", "req-2", "req-3"] {
        feature.step(ok_step(name, Timing::Requirement, &log));
    }
    for name in ["assert-1", "assert-2", "assert-3"] {
        feature.step(ok_step(name, Timing::Assert, &log));
    }
    for name in ["teardown-1", "teardown-2", "teardown-3"] {
        feature.step(ok_step(name, Timing::Teardown, &log));
    }

    let report = env.test(&mut feature).await;

    assert!(report.failed());
    assert_eq!(
        executed(&log),
        ["setup-1", "setup-2", "setup-3", "teardown-1", "teardown-2",
         "teardown-3"],
    );

    for name in ["req-1", "req-2", "req-3", "assert-1", "assert-2", "assert-3"]
    {
        let step = report.step(name).unwrap();
        assert!(step.status.is_skipped(), "{name} should be skipped");
        assert!(
            step.status.to_string().contains("setup \"setup-3\" failed"),
            "skip reason names the failed setup: {}",
            step.status,
        );
    }
    for name in ["teardown-1", "teardown-2", "teardown-3"] {
        assert!(report.step(name).unwrap().status.is_passed());
    }
}

#[tokio::test]
async fn requirement_failure_aborts_later_requirements_and_all_asserts() {
    let (global, _) = global();
    let env = global.environment(Vec::new()).await.unwrap();
    let log = Log::default();

    let mut feature = Feature::new("failing requirement");
    feature.step(ok_step("setup-1", Timing::Setup, &log));
    feature.step(ok_step("req-1", Timing::Requirement, &log));
    feature.step(failing_step("req-2", Timing::Requirement, &log));
    feature.step(ok_step("req-3", Timing::Requirement, &log));
    for name in ["assert-1", "assert-2"] {
        feature.step(ok_step(name, Timing::Assert, &log));
    }
    feature.step(ok_step("teardown-1", Timing::Teardown, &log));

    let report = env.test(&mut feature).await;

    assert!(report.failed());
    assert_eq!(
        executed(&log),
        ["setup-1", "req-1", "req-2", "teardown-1"],
    );

    for name in ["req-3", "assert-1", "assert-2"] {
        let step = report.step(name).unwrap();
        assert!(step.status.is_skipped());
        assert!(
            step.status.to_string().contains("requirement \"req-2\" failed"),
        );
    }
}

#[tokio::test]
async fn assert_failures_are_isolated_from_sibling_asserts() {
    let (global, _) = global();
    let env = global.environment(Vec::new()).await.unwrap();
    let log = Log::default();

    let mut feature = Feature::new("isolated asserts");
    feature.step(failing_step("assert-1", Timing::Assert, &log));
    feature.step(ok_step("assert-2", Timing::Assert, &log));
    feature.step(ok_step("assert-3", Timing::Assert, &log));
    feature.step(ok_step("teardown-1", Timing::Teardown, &log));

    let report = env.test(&mut feature).await;

    assert!(report.failed());
    assert!(report.step("assert-1").unwrap().status.is_failed());
    assert!(report.step("assert-2").unwrap().status.is_passed());
    assert!(report.step("assert-3").unwrap().status.is_passed());
    assert!(report.step("teardown-1").unwrap().status.is_passed());

    let mut order = executed(&log);
    order.sort();
    assert_eq!(order, ["assert-1", "assert-2", "assert-3", "teardown-1"]);
}

#[tokio::test]
async fn panicking_step_fails_only_its_own_sub_test() {
    let (global, _) = global();
    let env = global.environment(Vec::new()).await.unwrap();
    let log = Log::default();

    let mut feature = Feature::new("panics are trapped");
    feature.assert_step(
        "panicking assert",
        Levels::NONE,
        States::NONE,
        |_ctx| {
            async { panic!("boom in step") }.boxed_local()
        },
    );
    feature.step(ok_step("assert-2", Timing::Assert, &log));
    feature.step(ok_step("teardown-1", Timing::Teardown, &log));

    let report = env.test(&mut feature).await;

    let panicked = report.step("panicking assert").unwrap();
    assert!(panicked.status.is_failed());
    assert!(panicked.status.to_string().contains("boom in step"));
    assert!(report.step("assert-2").unwrap().status.is_passed());
    assert!(report.step("teardown-1").unwrap().status.is_passed());
}

#[tokio::test]
async fn level_filter_skips_without_failing() {
    let (global, _) = global();
    let log = Log::default();

    // No overlap between the step's Must and the active Should.
    let env = global
        .environment(vec![opts::at_level(Levels::SHOULD)])
        .await
        .unwrap();
    let mut feature = Feature::new("level gated");
    feature.step(Step::new(
        "must assert",
        Timing::Assert,
        Levels::MUST,
        States::NONE,
        {
            let log = Arc::clone(&log);
            move |_ctx| {
                let log = Arc::clone(&log);
                async move {
                    log.lock().unwrap().push("must assert".into());
                    Ok(())
                }
                .boxed_local()
            }
        },
    ));

    let report = env.test(&mut feature).await;
    assert!(report.passed(), "a filter skip is not a failure");
    let status = &report.step("must assert").unwrap().status;
    assert!(status.is_skipped());
    assert!(status.to_string().contains("requirement level Must"));
    assert!(executed(&log).is_empty());

    // At least one overlapping bit means the step runs.
    let env = global
        .environment(vec![opts::at_level(Levels::MUST | Levels::MAY)])
        .await
        .unwrap();
    let mut feature = Feature::new("level gated");
    feature.assert_step("must assert", Levels::MUST, States::NONE, |_ctx| {
        async { Ok(()) }.boxed_local()
    });
    let report = env.test(&mut feature).await;
    assert!(report.step("must assert").unwrap().status.is_passed());
}

#[tokio::test]
async fn state_filter_skips_alpha_asserts_in_stable_runs() {
    let (global, _) = global();
    let env = global
        .environment(vec![opts::in_state(States::STABLE)])
        .await
        .unwrap();

    let mut feature = Feature::new("maturity gated");
    feature.alpha().must("alpha-only behavior", |_ctx| {
        async { Ok(()) }.boxed_local()
    });
    feature.stable().must("stable behavior", |_ctx| {
        async { Ok(()) }.boxed_local()
    });

    let report = env.test(&mut feature).await;
    assert!(report.passed());
    assert!(report.step("alpha-only behavior").unwrap().status.is_skipped());
    assert!(report.step("stable behavior").unwrap().status.is_passed());
}

#[tokio::test]
async fn run_context_is_cancelled_after_test_returns() {
    let (global, _) = global();
    let env = global.environment(Vec::new()).await.unwrap();

    let seen: Arc<Mutex<Option<CancellationToken>>> = Arc::default();
    let mut feature = Feature::new("context lifecycle");
    feature.setup("capture context", {
        let seen = Arc::clone(&seen);
        move |ctx| {
            let seen = Arc::clone(&seen);
            let token = ctx.cancellation().clone();
            async move {
                assert!(!token.is_cancelled(), "live during the run");
                *seen.lock().unwrap() = Some(token);
                Ok(())
            }
            .boxed_local()
        }
    });

    let report = env.test(&mut feature).await;
    assert!(report.passed());

    let during = seen.lock().unwrap().take().unwrap();
    assert!(during.is_cancelled(), "closed once the run finished");
    assert!(
        !env.cancellation().is_cancelled(),
        "the environment outlives the run until finish()",
    );
}

#[tokio::test]
async fn state_store_is_created_lazily_and_shared_across_steps() {
    let (global, _) = global();
    let env = global.environment(Vec::new()).await.unwrap();

    let mut feature = Feature::new("shared state");
    assert!(feature.state().is_none());

    feature.setup("publish sink url", |ctx| {
        async move {
            ctx.state().set("sink", "http://sink.test")?;
            Ok(())
        }
        .boxed_local()
    });
    for name in ["reader-1", "reader-2", "reader-3"] {
        feature.assert_step(name, Levels::NONE, States::NONE, |ctx| {
            async move {
                let sink: String = ctx.state().get("sink")?;
                if sink == "http://sink.test" {
                    Ok(())
                } else {
                    Err(StepError::failed(format!("unexpected sink {sink}")))
                }
            }
            .boxed_local()
        });
    }

    let report = env.test(&mut feature).await;
    assert!(report.passed());
    assert!(feature.state().is_some(), "driver bound a store");
}

#[tokio::test]
async fn managed_environment_finishes_itself_after_the_test() {
    let (global, provisioner) = global();
    let env = global
        .environment(vec![opts::managed()])
        .await
        .unwrap();
    let namespace = env.namespace().to_owned();

    let mut feature = Feature::new("managed lifecycle");
    feature.setup("noop", |_ctx| async { Ok(()) }.boxed_local());

    let report = env.test(&mut feature).await;
    assert!(report.passed());

    assert!(env.cancellation().is_cancelled());
    let deleted = provisioner.deleted();
    assert_eq!(deleted.len(), 1);
    assert!(deleted[0].contains(&namespace));
}

#[tokio::test]
async fn teardown_failures_are_reported_but_change_nothing_upstream() {
    let (global, _) = global();
    let env = global.environment(Vec::new()).await.unwrap();
    let log = Log::default();

    let mut feature = Feature::new("failing teardown");
    feature.step(ok_step("setup-1", Timing::Setup, &log));
    feature.step(ok_step("assert-1", Timing::Assert, &log));
    feature.step(failing_step("teardown-1", Timing::Teardown, &log));
    feature.step(ok_step("teardown-2", Timing::Teardown, &log));

    let report = env.test(&mut feature).await;

    assert!(report.failed());
    assert!(report.step("setup-1").unwrap().status.is_passed());
    assert!(report.step("assert-1").unwrap().status.is_passed());
    assert!(report.step("teardown-1").unwrap().status.is_failed());
    assert!(report.step("teardown-2").unwrap().status.is_passed());
    assert_eq!(
        executed(&log),
        ["setup-1", "assert-1", "teardown-1", "teardown-2"],
    );
}
