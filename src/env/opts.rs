//! Functional options applied at [`Environment`] construction.
//!
//! [`Environment`]: super::Environment

use crate::{
    feature::{Levels, States},
    store::Timings,
};

/// Configuration an [`EnvOpt`] mutates before the environment is built.
///
/// [`EnvOpt`]: super::EnvOpt
#[derive(Debug, Default)]
pub struct EnvConfig {
    pub(crate) namespace: Option<String>,
    pub(crate) levels: Option<Levels>,
    pub(crate) states: Option<States>,
    pub(crate) timings: Option<Timings>,
    pub(crate) managed: bool,
}

/// Pins the environment namespace instead of generating a random one.
#[must_use]
pub fn with_namespace(
    namespace: impl Into<String>,
) -> super::EnvOpt {
    let namespace = namespace.into();
    Box::new(move |cfg: &mut EnvConfig| {
        cfg.namespace = Some(namespace);
    })
}

/// Sets the active requirement-level filter.
///
/// Assert steps whose [`Levels`] mask does not intersect the active mask are
/// skipped, not failed.
#[must_use]
pub fn at_level(levels: Levels) -> super::EnvOpt {
    Box::new(move |cfg: &mut EnvConfig| {
        cfg.levels = Some(levels);
    })
}

/// Sets the active feature-state filter.
///
/// Assert steps whose [`States`] mask does not intersect the active mask are
/// skipped, not failed.
#[must_use]
pub fn in_state(states: States) -> super::EnvOpt {
    Box::new(move |cfg: &mut EnvConfig| {
        cfg.states = Some(states);
    })
}

/// Overrides the default polling [`Timings`] steps inherit through their
/// [`StepContext`].
///
/// [`StepContext`]: super::StepContext
#[must_use]
pub fn with_timings(timings: Timings) -> super::EnvOpt {
    Box::new(move |cfg: &mut EnvConfig| {
        cfg.timings = Some(timings);
    })
}

/// Marks the environment managed: [`Environment::test`] finishes the
/// environment (namespace teardown, cancellation) when it returns, so the
/// caller never invokes [`Environment::finish`] explicitly.
///
/// [`Environment::test`]: super::Environment::test
/// [`Environment::finish`]: super::Environment::finish
#[must_use]
pub fn managed() -> super::EnvOpt {
    Box::new(|cfg: &mut EnvConfig| {
        cfg.managed = true;
    })
}
