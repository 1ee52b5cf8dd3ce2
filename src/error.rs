//! Crate-wide error aggregation.

use derive_more::{Display, Error, From};

use crate::{
    env::{EnvironmentError, ImageError},
    feature::StepError,
    resources::{ProvisionError, TemplateError},
    state::StateError,
};

/// Any error this crate can surface.
#[derive(Debug, Display, Error, From)]
pub enum Error {
    /// Environment construction or teardown failed.
    #[display(fmt = "{}", _0)]
    Environment(EnvironmentError),

    /// A step function failed.
    #[display(fmt = "{}", _0)]
    Step(StepError),

    /// A resource provisioning call failed.
    #[display(fmt = "{}", _0)]
    Provision(ProvisionError),

    /// Manifest template rendering failed.
    #[display(fmt = "{}", _0)]
    Template(TemplateError),

    /// A state store access failed.
    #[display(fmt = "{}", _0)]
    State(StateError),

    /// A logical image name could not be resolved.
    #[display(fmt = "{}", _0)]
    Image(ImageError),
}

/// Alias of [`Result`](std::result::Result) with this crate's [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
