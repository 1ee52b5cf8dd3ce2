//! Grouping of related [`Feature`]s executed concurrently within one
//! environment.

use std::fmt;

use super::Feature;
use crate::report::ExecutionReport;

/// A named group of related [`Feature`]s.
///
/// Executed via [`Environment::test_set`], every member runs concurrently
/// with its own independent phase semantics: a failure in one feature never
/// blocks or skips the others.
///
/// [`Environment::test_set`]: crate::env::Environment::test_set
pub struct FeatureSet {
    /// Group name, prefixed onto member feature names in reports.
    pub name: String,

    pub(crate) features: Vec<Feature>,
}

impl FeatureSet {
    /// Creates an empty [`FeatureSet`] with the given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            features: Vec::new(),
        }
    }

    /// Appends a [`Feature`] to this set.
    pub fn feature(&mut self, feature: Feature) -> &mut Self {
        self.features.push(feature);
        self
    }

    /// Member features, in insertion order.
    #[must_use]
    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    /// Number of member features.
    #[must_use]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Indicates whether this set has no member features.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

impl fmt::Debug for FeatureSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureSet")
            .field("name", &self.name)
            .field("features", &self.features)
            .finish()
    }
}

/// Aggregated pass/fail outcome of a [`FeatureSet`] run, one
/// [`ExecutionReport`] per member feature.
#[derive(Debug)]
pub struct SetReport {
    /// Name of the executed [`FeatureSet`].
    pub name: String,

    /// Per-feature reports, in the set's insertion order.
    pub features: Vec<ExecutionReport>,
}

impl SetReport {
    /// Indicates whether any member feature failed.
    #[must_use]
    pub fn failed(&self) -> bool {
        self.features.iter().any(ExecutionReport::failed)
    }

    /// Report of the member feature with the given name, if present.
    #[must_use]
    pub fn feature(&self, name: &str) -> Option<&ExecutionReport> {
        self.features.iter().find(|r| r.feature == name)
    }
}
