//! Declarative test unit: a named [`Feature`] composed of timed [`Step`]s.
//!
//! A feature author appends steps through the builder methods ([`setup`],
//! [`requirement`], [`must`], …) in whatever order reads best; execution
//! order is determined by each step's [`Timing`] phase, not by declaration
//! order.
//!
//! [`setup`]: Feature::setup
//! [`requirement`]: Feature::requirement
//! [`must`]: Feature::must

pub mod collapse;
pub mod set;
pub mod step;

use std::{fmt, mem, sync::Arc};

use futures::future::LocalBoxFuture;

use crate::{env::StepContext, state::KVStore};

pub use self::{
    collapse::{collapse, reorder},
    set::{FeatureSet, SetReport},
    step::{Levels, States, Step, StepError, StepFn, StepResult, Timing},
};

/// A named, declarative test unit composed of timed [`Step`]s.
///
/// The attached [`KVStore`] is created lazily by the driver on first use and
/// is exclusively owned by the single test invocation that uses it.
pub struct Feature {
    /// Feature name, used as the report and milestone grouping key.
    pub name: String,

    pub(crate) steps: Vec<Step>,
    pub(crate) state: Option<Arc<KVStore>>,
}

impl Feature {
    /// Creates an empty [`Feature`] with the given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
            state: None,
        }
    }

    /// Creates a [`Feature`] from an already-built step list.
    #[must_use]
    pub fn with_steps(name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            steps,
            state: None,
        }
    }

    /// Steps in declaration order.
    #[must_use]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Shared state store, if one has been created or attached already.
    #[must_use]
    pub fn state(&self) -> Option<&Arc<KVStore>> {
        self.state.as_ref()
    }

    /// Appends an arbitrary [`Step`].
    pub fn step(&mut self, step: Step) -> &mut Self {
        self.steps.push(step);
        self
    }

    /// Appends a [`Setup`] step.
    ///
    /// [`Setup`]: Timing::Setup
    pub fn setup<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: for<'a> Fn(
                &'a StepContext,
            ) -> LocalBoxFuture<'a, StepResult>
            + 'static,
    {
        self.step(Step::new(name, Timing::Setup, Levels::NONE, States::NONE, f))
    }

    /// Appends a [`Requirement`] step.
    ///
    /// [`Requirement`]: Timing::Requirement
    pub fn requirement<F>(
        &mut self,
        name: impl Into<String>,
        f: F,
    ) -> &mut Self
    where
        F: for<'a> Fn(
                &'a StepContext,
            ) -> LocalBoxFuture<'a, StepResult>
            + 'static,
    {
        self.step(Step::new(
            name,
            Timing::Requirement,
            Levels::NONE,
            States::NONE,
            f,
        ))
    }

    /// Appends a [`Teardown`] step.
    ///
    /// [`Teardown`]: Timing::Teardown
    pub fn teardown<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: for<'a> Fn(
                &'a StepContext,
            ) -> LocalBoxFuture<'a, StepResult>
            + 'static,
    {
        self.step(Step::new(
            name,
            Timing::Teardown,
            Levels::NONE,
            States::NONE,
            f,
        ))
    }

    /// Appends an [`Assert`] step gated by the given [`Levels`] and
    /// [`States`].
    ///
    /// [`Assert`]: Timing::Assert
    pub fn assert_step<F>(
        &mut self,
        name: impl Into<String>,
        levels: Levels,
        states: States,
        f: F,
    ) -> &mut Self
    where
        F: for<'a> Fn(
                &'a StepContext,
            ) -> LocalBoxFuture<'a, StepResult>
            + 'static,
    {
        self.step(Step::new(name, Timing::Assert, levels, states, f))
    }

    /// Appends a [`Levels::MUST`] assertion at [`States::STABLE`] maturity.
    pub fn must<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: for<'a> Fn(
                &'a StepContext,
            ) -> LocalBoxFuture<'a, StepResult>
            + 'static,
    {
        self.assert_step(name, Levels::MUST, States::STABLE, f)
    }

    /// Appends a [`Levels::MUST_NOT`] assertion at [`States::STABLE`]
    /// maturity.
    pub fn must_not<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: for<'a> Fn(
                &'a StepContext,
            ) -> LocalBoxFuture<'a, StepResult>
            + 'static,
    {
        self.assert_step(name, Levels::MUST_NOT, States::STABLE, f)
    }

    /// Appends a [`Levels::SHOULD`] assertion at [`States::STABLE`] maturity.
    pub fn should<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: for<'a> Fn(
                &'a StepContext,
            ) -> LocalBoxFuture<'a, StepResult>
            + 'static,
    {
        self.assert_step(name, Levels::SHOULD, States::STABLE, f)
    }

    /// Appends a [`Levels::SHOULD_NOT`] assertion at [`States::STABLE`]
    /// maturity.
    pub fn should_not<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: for<'a> Fn(
                &'a StepContext,
            ) -> LocalBoxFuture<'a, StepResult>
            + 'static,
    {
        self.assert_step(name, Levels::SHOULD_NOT, States::STABLE, f)
    }

    /// Appends a [`Levels::MAY`] assertion at [`States::STABLE`] maturity.
    pub fn may<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: for<'a> Fn(
                &'a StepContext,
            ) -> LocalBoxFuture<'a, StepResult>
            + 'static,
    {
        self.assert_step(name, Levels::MAY, States::STABLE, f)
    }

    /// Scopes subsequent assertions to [`States::ALPHA`] maturity.
    pub fn alpha(&mut self) -> Maturity<'_> {
        Maturity {
            feature: self,
            states: States::ALPHA,
        }
    }

    /// Scopes subsequent assertions to [`States::BETA`] maturity.
    pub fn beta(&mut self) -> Maturity<'_> {
        Maturity {
            feature: self,
            states: States::BETA,
        }
    }

    /// Scopes subsequent assertions to [`States::STABLE`] maturity.
    pub fn stable(&mut self) -> Maturity<'_> {
        Maturity {
            feature: self,
            states: States::STABLE,
        }
    }

    /// Replaces this feature's step list with its [`collapse`]d form:
    /// Setup/Requirement/Teardown steps merged into one composite step per
    /// timing, Assert steps kept individual, all in phase order.
    pub fn collapse_steps(&mut self) -> &mut Self {
        self.steps = collapse(mem::take(&mut self.steps));
        self
    }
}

impl fmt::Debug for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Feature")
            .field("name", &self.name)
            .field("steps", &self.steps)
            .finish_non_exhaustive()
    }
}

/// Assertion sub-builder scoping steps to a fixed maturity [`States`] mask.
///
/// Returned by [`Feature::alpha`], [`Feature::beta`] and [`Feature::stable`].
pub struct Maturity<'f> {
    feature: &'f mut Feature,
    states: States,
}

impl Maturity<'_> {
    /// Appends a [`Levels::MUST`] assertion at this maturity.
    pub fn must<F>(self, name: impl Into<String>, f: F) -> Self
    where
        F: for<'a> Fn(
                &'a StepContext,
            ) -> LocalBoxFuture<'a, StepResult>
            + 'static,
    {
        self.assert_at(name, Levels::MUST, f)
    }

    /// Appends a [`Levels::MUST_NOT`] assertion at this maturity.
    pub fn must_not<F>(self, name: impl Into<String>, f: F) -> Self
    where
        F: for<'a> Fn(
                &'a StepContext,
            ) -> LocalBoxFuture<'a, StepResult>
            + 'static,
    {
        self.assert_at(name, Levels::MUST_NOT, f)
    }

    /// Appends a [`Levels::SHOULD`] assertion at this maturity.
    pub fn should<F>(self, name: impl Into<String>, f: F) -> Self
    where
        F: for<'a> Fn(
                &'a StepContext,
            ) -> LocalBoxFuture<'a, StepResult>
            + 'static,
    {
        self.assert_at(name, Levels::SHOULD, f)
    }

    /// Appends a [`Levels::SHOULD_NOT`] assertion at this maturity.
    pub fn should_not<F>(self, name: impl Into<String>, f: F) -> Self
    where
        F: for<'a> Fn(
                &'a StepContext,
            ) -> LocalBoxFuture<'a, StepResult>
            + 'static,
    {
        self.assert_at(name, Levels::SHOULD_NOT, f)
    }

    /// Appends a [`Levels::MAY`] assertion at this maturity.
    pub fn may<F>(self, name: impl Into<String>, f: F) -> Self
    where
        F: for<'a> Fn(
                &'a StepContext,
            ) -> LocalBoxFuture<'a, StepResult>
            + 'static,
    {
        self.assert_at(name, Levels::MAY, f)
    }

    fn assert_at<F>(self, name: impl Into<String>, levels: Levels, f: F) -> Self
    where
        F: for<'a> Fn(
                &'a StepContext,
            ) -> LocalBoxFuture<'a, StepResult>
            + 'static,
    {
        self.feature.assert_step(name, levels, self.states, f);
        self
    }
}

#[cfg(test)]
mod tests {
    use futures::FutureExt as _;

    use super::*;

    fn nop(
        _: &StepContext,
    ) -> LocalBoxFuture<'_, StepResult> {
        async { Ok(()) }.boxed_local()
    }

    #[test]
    fn builder_appends_in_declaration_order() {
        let mut f = Feature::new("ordering");
        f.teardown("undeploy", nop)
            .setup("deploy", nop)
            .must("delivers", nop);

        let names: Vec<_> = f.steps().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["undeploy", "deploy", "delivers"]);
        assert_eq!(f.steps()[0].timing, Timing::Teardown);
        assert_eq!(f.steps()[2].levels, Levels::MUST);
        assert_eq!(f.steps()[2].states, States::STABLE);
    }

    #[test]
    fn maturity_scoping_tags_states() {
        let mut f = Feature::new("maturity");
        f.alpha().must("new behavior", nop);
        f.beta().should("settling behavior", nop).may("extra", nop);
        f.stable().must_not("regression", nop);

        let states: Vec<_> = f.steps().iter().map(|s| s.states).collect();
        assert_eq!(
            states,
            [States::ALPHA, States::BETA, States::BETA, States::STABLE],
        );
        assert!(f.steps().iter().all(|s| s.timing == Timing::Assert));
    }

    #[test]
    fn state_store_is_absent_until_first_run() {
        let f = Feature::new("lazy state");
        assert!(f.state().is_none());
    }
}
