//! Explicit registry mapping logical package names to resolved image
//! references.
//!
//! Populated before environment construction and read-only during a test;
//! an explicit object injected into [`GlobalEnvironment`] rather than a
//! package-level mutable map, so parallel test processes cannot couple
//! through hidden state.
//!
//! [`GlobalEnvironment`]: super::GlobalEnvironment

use std::collections::BTreeMap;

use derive_more::{Display, Error};

/// Error of resolving a logical image name.
#[derive(Debug, Display, Error)]
#[display(fmt = "no image registered for package {:?}", package)]
pub struct ImageError {
    /// The unresolved logical package name.
    pub package: String,
}

/// Immutable mapping from logical package name to resolved image reference.
#[derive(Clone, Debug, Default)]
pub struct ImageRegistry {
    images: BTreeMap<String, String>,
}

impl ImageRegistry {
    /// Creates an empty [`ImageRegistry`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an image reference for a logical package name.
    #[must_use]
    pub fn with(
        mut self,
        package: impl Into<String>,
        reference: impl Into<String>,
    ) -> Self {
        self.images.insert(package.into(), reference.into());
        self
    }

    /// Resolves a logical package name to its image reference.
    ///
    /// # Errors
    ///
    /// If no image is registered for `package`.
    pub fn resolve(&self, package: &str) -> Result<&str, ImageError> {
        self.images
            .get(package)
            .map(String::as_str)
            .ok_or_else(|| ImageError {
                package: package.to_owned(),
            })
    }

    /// All registered mappings.
    #[must_use]
    pub fn all(&self) -> &BTreeMap<String, String> {
        &self.images
    }
}

impl FromIterator<(String, String)> for ImageRegistry {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            images: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_registered_packages() {
        let registry = ImageRegistry::new()
            .with("eventshub", "registry.test/eventshub:v1")
            .with("recorder", "registry.test/recorder:v1");

        assert_eq!(
            registry.resolve("eventshub").unwrap(),
            "registry.test/eventshub:v1",
        );
        assert_eq!(registry.all().len(), 2);
    }

    #[test]
    fn unknown_package_is_an_error() {
        let registry = ImageRegistry::new();
        let err = registry.resolve("echo").unwrap_err();
        assert_eq!(err.package, "echo");
        assert_eq!(
            err.to_string(),
            "no image registered for package \"echo\"",
        );
    }
}
