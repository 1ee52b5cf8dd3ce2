//! Atomic unit of feature execution: a named, leveled, stated async function
//! bound to one of the four timing phases.

use std::{fmt, ops, time::Duration};

use derive_more::{Display, Error};
use futures::future::LocalBoxFuture;

use crate::{env::StepContext, resources::ProvisionError, state::StateError};

/// Execution phase of a [`Step`].
///
/// Phases always run in the declared order below, regardless of the order
/// steps were appended to a [`Feature`].
///
/// [`Feature`]: crate::Feature
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Timing {
    /// Provisions everything the feature under test needs.
    Setup,

    /// Verifies preconditions the assertions rely on.
    Requirement,

    /// Observes and verifies behavior. Runs with intra-phase parallelism.
    Assert,

    /// Cleans up. Always runs, even after upstream failures.
    Teardown,
}

impl Timing {
    /// All [`Timing`]s in phase execution order.
    pub const ALL: [Self; 4] =
        [Self::Setup, Self::Requirement, Self::Assert, Self::Teardown];

    /// Phase name as it appears in reports and milestones.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Setup => "Setup",
            Self::Requirement => "Requirement",
            Self::Assert => "Assert",
            Self::Teardown => "Teardown",
        }
    }
}

impl fmt::Display for Timing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Requirement-level bitmask classifying an [`Assert`] [`Step`], in the
/// RFC 2119 sense.
///
/// An empty mask means the step is unfiltered and runs at any active level.
///
/// [`Assert`]: Timing::Assert
#[derive(Clone, Copy, Default, Eq, Hash, PartialEq)]
pub struct Levels(u8);

impl Levels {
    /// Empty mask, matching any active level.
    pub const NONE: Self = Self(0);

    /// Absolute requirement.
    pub const MUST: Self = Self(1);

    /// Absolute prohibition.
    pub const MUST_NOT: Self = Self(1 << 1);

    /// Recommendation.
    pub const SHOULD: Self = Self(1 << 2);

    /// Discouragement.
    pub const SHOULD_NOT: Self = Self(1 << 3);

    /// Truly optional behavior.
    pub const MAY: Self = Self(1 << 4);

    /// Every defined level.
    pub const ALL: Self = Self(0b1_1111);

    /// Constructs a [`Levels`] from raw bits, returning [`None`] if any bit
    /// outside the defined range is set.
    #[must_use]
    pub const fn from_bits(bits: u8) -> Option<Self> {
        if bits & !Self::ALL.0 == 0 {
            Some(Self(bits))
        } else {
            None
        }
    }

    /// Raw bit representation.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Indicates whether no level bit is set (unfiltered).
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Indicates whether `self` and `other` share at least one bit.
    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Indicates whether every bit of `other` is set in `self`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl ops::BitOr for Levels {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl ops::BitOrAssign for Levels {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for Levels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("Any");
        }
        let names = [
            (Self::MUST, "Must"),
            (Self::MUST_NOT, "MustNot"),
            (Self::SHOULD, "Should"),
            (Self::SHOULD_NOT, "ShouldNot"),
            (Self::MAY, "May"),
        ];
        let mut first = true;
        for (bit, name) in names {
            if self.intersects(bit) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Levels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Levels({self})")
    }
}

/// Maturity-state bitmask classifying an [`Assert`] [`Step`].
///
/// Orthogonal to [`Levels`]. An empty mask means the step is unfiltered and
/// runs at any active state.
///
/// [`Assert`]: Timing::Assert
#[derive(Clone, Copy, Default, Eq, Hash, PartialEq)]
pub struct States(u8);

impl States {
    /// Empty mask, matching any active state.
    pub const NONE: Self = Self(0);

    /// Experimental behavior, subject to removal.
    pub const ALPHA: Self = Self(1);

    /// Pre-release behavior, subject to change.
    pub const BETA: Self = Self(1 << 1);

    /// Released, stable behavior.
    pub const STABLE: Self = Self(1 << 2);

    /// Every defined state.
    pub const ALL: Self = Self(0b111);

    /// Constructs a [`States`] from raw bits, returning [`None`] if any bit
    /// outside the defined range is set.
    #[must_use]
    pub const fn from_bits(bits: u8) -> Option<Self> {
        if bits & !Self::ALL.0 == 0 {
            Some(Self(bits))
        } else {
            None
        }
    }

    /// Raw bit representation.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Indicates whether no state bit is set (unfiltered).
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Indicates whether `self` and `other` share at least one bit.
    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Indicates whether every bit of `other` is set in `self`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl ops::BitOr for States {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl ops::BitOrAssign for States {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for States {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("Any");
        }
        let names = [
            (Self::ALPHA, "Alpha"),
            (Self::BETA, "Beta"),
            (Self::STABLE, "Stable"),
        ];
        let mut first = true;
        for (bit, name) in names {
            if self.intersects(bit) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for States {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "States({self})")
    }
}

/// Error of executing a [`Step`] function.
#[derive(Debug, Display, Error)]
pub enum StepError {
    /// Step reported a failure.
    #[display(fmt = "{}", reason)]
    Failed {
        /// Human-readable failure reason.
        reason: String,
    },

    /// Step function panicked.
    ///
    /// Panics are trapped by the driver, so a panicking step fails its own
    /// sub-test without tearing down siblings.
    #[display(fmt = "step panicked: {}", payload)]
    Panicked {
        /// Stringified panic payload.
        payload: String,
    },

    /// Poll-based assertion did not settle within its timeout.
    #[display(
        fmt = "timed out after {}: {}",
        "humantime::format_duration(*waited)",
        diagnostic
    )]
    Timeout {
        /// Total time waited before giving up.
        waited: Duration,

        /// Last-observed state, expected vs. observed.
        diagnostic: String,
    },

    /// The environment was cancelled while the step was in flight.
    #[display(fmt = "environment cancelled")]
    Cancelled,

    /// A resource provisioning call failed.
    #[display(fmt = "provisioning: {}", _0)]
    Provision(ProvisionError),

    /// A state store access failed.
    #[display(fmt = "state store: {}", _0)]
    State(StateError),
}

impl StepError {
    /// Shorthand for a [`StepError::Failed`] with the given reason.
    #[must_use]
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }
}

impl From<ProvisionError> for StepError {
    fn from(e: ProvisionError) -> Self {
        Self::Provision(e)
    }
}

impl From<StateError> for StepError {
    fn from(e: StateError) -> Self {
        Self::State(e)
    }
}

/// Result of a single [`Step`] function invocation.
pub type StepResult = Result<(), StepError>;

/// Alias for a boxed [`Step`] function.
pub type StepFn =
    Box<dyn for<'a> Fn(&'a StepContext) -> LocalBoxFuture<'a, StepResult>>;

/// A single named action of a [`Feature`], bound to a [`Timing`] phase and
/// optionally gated by [`Levels`]/[`States`] filters.
///
/// Immutable once appended to a [`Feature`]'s step list.
///
/// [`Feature`]: crate::Feature
pub struct Step {
    /// Human-readable step name, used as the sub-test name in reports.
    pub name: String,

    /// Phase this step executes in.
    pub timing: Timing,

    /// Requirement-level gate. Empty means ungated.
    pub levels: Levels,

    /// Maturity-state gate. Empty means ungated.
    pub states: States,

    /// The step function itself.
    pub(crate) run: StepFn,
}

impl Step {
    /// Creates a new [`Step`].
    #[must_use]
    pub fn new<F>(
        name: impl Into<String>,
        timing: Timing,
        levels: Levels,
        states: States,
        run: F,
    ) -> Self
    where
        F: for<'a> Fn(&'a StepContext) -> LocalBoxFuture<'a, StepResult>
            + 'static,
    {
        Self {
            name: name.into(),
            timing,
            levels,
            states,
            run: Box::new(run),
        }
    }

    /// Invokes this step's function.
    pub(crate) fn invoke<'a>(
        &'a self,
        ctx: &'a StepContext,
    ) -> LocalBoxFuture<'a, StepResult> {
        (self.run)(ctx)
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("timing", &self.timing)
            .field("levels", &self.levels)
            .field("states", &self.states)
            .finish_non_exhaustive()
    }
}
