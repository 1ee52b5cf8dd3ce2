//! Poll-based assertions over the [`EventStore`].
//!
//! Observed events trail the actions that caused them, so each assertion
//! suspends the calling worker in a sleep/retry loop bounded by
//! [`Timings::interval`] and [`Timings::timeout`], observing the
//! environment's cancellation token so an abandoned run returns
//! [`StepError::Cancelled`] instead of hanging.

use std::time::Duration;

use itertools::Itertools as _;
use smart_default::SmartDefault;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::{EventStore, Matcher};
use crate::feature::step::{StepError, StepResult};

/// How many last-observed records a timeout diagnostic lists.
const DIAGNOSTIC_RECORDS: usize = 5;

/// Polling bounds of a blocking assertion.
#[derive(Clone, Copy, Debug, Eq, PartialEq, SmartDefault)]
pub struct Timings {
    /// Pause between store polls.
    #[default(Duration::from_secs(3))]
    pub interval: Duration,

    /// Total time to wait before giving up.
    #[default(Duration::from_secs(120))]
    pub timeout: Duration,
}

impl Timings {
    /// Creates [`Timings`] with the given polling interval and total timeout.
    #[must_use]
    pub const fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

/// Count condition a polling assertion waits for.
#[derive(Clone, Copy, Debug)]
struct Bounds {
    min: usize,
    max: Option<usize>,
}

impl Bounds {
    fn describe(self) -> String {
        match (self.min, self.max) {
            (min, Some(max)) if min == max => format!("exactly {min}"),
            (min, Some(max)) => format!("between {min} and {max}"),
            (min, None) => format!("at least {min}"),
        }
    }
}

impl EventStore {
    /// Blocks until at least `min` records match, or the timeout elapses.
    ///
    /// # Errors
    ///
    /// [`StepError::Timeout`] if the count condition does not hold within
    /// the timeout; [`StepError::Cancelled`] if `cancellation` fires first.
    pub async fn assert_at_least(
        &self,
        min: usize,
        matcher: &Matcher,
        timings: Timings,
        cancellation: &CancellationToken,
    ) -> StepResult {
        self.assert_bounds(
            Bounds { min, max: None },
            matcher,
            timings,
            cancellation,
        )
        .await
    }

    /// Blocks until exactly `n` records match, or the timeout elapses.
    ///
    /// Succeeds as soon as the matched count reaches `n`; a count exceeding
    /// `n` fails immediately with a count-mismatch diagnostic.
    ///
    /// # Errors
    ///
    /// Same conditions as [`EventStore::assert_at_least`], plus an immediate
    /// [`StepError::Failed`] when the count overshoots `n`.
    pub async fn assert_exact(
        &self,
        n: usize,
        matcher: &Matcher,
        timings: Timings,
        cancellation: &CancellationToken,
    ) -> StepResult {
        self.assert_bounds(
            Bounds {
                min: n,
                max: Some(n),
            },
            matcher,
            timings,
            cancellation,
        )
        .await
    }

    /// Blocks until between `min` and `max` records match, or the timeout
    /// elapses.
    ///
    /// # Errors
    ///
    /// Same conditions as [`EventStore::assert_exact`].
    pub async fn assert_in_range(
        &self,
        min: usize,
        max: usize,
        matcher: &Matcher,
        timings: Timings,
        cancellation: &CancellationToken,
    ) -> StepResult {
        self.assert_bounds(
            Bounds {
                min,
                max: Some(max),
            },
            matcher,
            timings,
            cancellation,
        )
        .await
    }

    /// Holds the full timeout window asserting that no record matches.
    ///
    /// Fails immediately when a matching record appears.
    ///
    /// # Errors
    ///
    /// [`StepError::Failed`] on the first match;
    /// [`StepError::Cancelled`] if `cancellation` fires first.
    pub async fn assert_not(
        &self,
        matcher: &Matcher,
        timings: Timings,
        cancellation: &CancellationToken,
    ) -> StepResult {
        let deadline = Instant::now() + timings.timeout;
        loop {
            let matched = self.query(matcher);
            if !matched.is_empty() {
                return Err(StepError::failed(format!(
                    "expected no events matching [{}], observed {} of {} \
                     total: {}",
                    matcher.description(),
                    matched.len(),
                    self.len(),
                    summarize(&matched),
                )));
            }
            if Instant::now() >= deadline {
                return Ok(());
            }

            tokio::select! {
                () = cancellation.cancelled() => {
                    return Err(StepError::Cancelled);
                }
                () = tokio::time::sleep(timings.interval) => {}
            }
        }
    }

    async fn assert_bounds(
        &self,
        bounds: Bounds,
        matcher: &Matcher,
        timings: Timings,
        cancellation: &CancellationToken,
    ) -> StepResult {
        let start = Instant::now();
        let deadline = start + timings.timeout;
        loop {
            let matched = self.query(matcher);
            if let Some(max) = bounds.max {
                if matched.len() > max {
                    return Err(StepError::failed(format!(
                        "expected {} events matching [{}], observed {} of {} \
                         total: {}",
                        bounds.describe(),
                        matcher.description(),
                        matched.len(),
                        self.len(),
                        summarize(&matched),
                    )));
                }
            }
            if matched.len() >= bounds.min {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(StepError::Timeout {
                    waited: timings.timeout,
                    diagnostic: format!(
                        "expected {} events matching [{}], observed {} of {} \
                         total: {}",
                        bounds.describe(),
                        matcher.description(),
                        matched.len(),
                        self.len(),
                        summarize(&matched),
                    ),
                });
            }

            tokio::select! {
                () = cancellation.cancelled() => {
                    return Err(StepError::Cancelled);
                }
                () = tokio::time::sleep(timings.interval) => {}
            }
        }
    }
}

/// Summarizes the last few matched records for a diagnostic.
fn summarize(records: &[super::EventRecord]) -> String {
    if records.is_empty() {
        return "<none>".to_owned();
    }
    let shown = records
        .iter()
        .rev()
        .take(DIAGNOSTIC_RECORDS)
        .rev()
        .map(super::EventRecord::summary)
        .join("; ");
    if records.len() > DIAGNOSTIC_RECORDS {
        format!("… {shown}")
    } else {
        shown
    }
}
