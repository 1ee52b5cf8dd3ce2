//! Opaque infrastructure collaborators the engine calls into: resource
//! provisioning and manifest templating.
//!
//! Nothing here touches a real cluster; the engine only relies on the
//! contracts below (create fails loudly on conflict, delete is idempotent)
//! and ships an in-memory [`FakeProvisioner`] for simulated runs and tests.

use std::{
    collections::BTreeMap,
    sync::{Mutex, PoisonError},
};

use async_trait::async_trait;
use derive_more::{Display, Error};
use serde::Serialize;

/// Error of a [`ResourceProvisioner`] call.
#[derive(Debug, Display, Error)]
pub enum ProvisionError {
    /// A resource with the same identity already exists.
    #[display(fmt = "resource already exists: {}", resource)]
    Conflict {
        /// Identity of the conflicting resource.
        resource: String,
    },

    /// The manifest could not be applied.
    #[display(fmt = "provisioning failed: {}", reason)]
    Failed {
        /// Provisioner-reported reason.
        reason: String,
    },

    /// The manifest is not something the provisioner understands.
    #[display(fmt = "invalid manifest: {}", reason)]
    Invalid {
        /// What was wrong with the manifest.
        reason: String,
    },
}

/// Applies and removes rendered YAML resource specs.
///
/// Contract: [`create_from_yaml`] fails loudly on conflict;
/// [`delete_from_yaml`] is idempotent and succeeds when the resource is
/// already gone.
///
/// [`create_from_yaml`]: ResourceProvisioner::create_from_yaml
/// [`delete_from_yaml`]: ResourceProvisioner::delete_from_yaml
#[async_trait]
pub trait ResourceProvisioner: Send + Sync {
    /// Creates the resources described by `manifest`.
    async fn create_from_yaml(
        &self,
        manifest: &str,
    ) -> Result<(), ProvisionError>;

    /// Deletes the resources described by `manifest`, succeeding if they do
    /// not exist.
    async fn delete_from_yaml(
        &self,
        manifest: &str,
    ) -> Result<(), ProvisionError>;
}

/// In-memory [`ResourceProvisioner`] recording every call, for simulated
/// runs and engine tests.
#[derive(Debug, Default)]
pub struct FakeProvisioner {
    live: Mutex<Vec<String>>,
    created: Mutex<Vec<String>>,
    deleted: Mutex<Vec<String>>,
}

impl FakeProvisioner {
    /// Creates an empty [`FakeProvisioner`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every manifest passed to [`ResourceProvisioner::create_from_yaml`],
    /// in call order.
    #[must_use]
    pub fn created(&self) -> Vec<String> {
        self.created
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Every manifest passed to [`ResourceProvisioner::delete_from_yaml`],
    /// in call order.
    #[must_use]
    pub fn deleted(&self) -> Vec<String> {
        self.deleted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Manifests currently applied and not yet deleted.
    #[must_use]
    pub fn live(&self) -> Vec<String> {
        self.live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ResourceProvisioner for FakeProvisioner {
    async fn create_from_yaml(
        &self,
        manifest: &str,
    ) -> Result<(), ProvisionError> {
        let mut live = self.live.lock().unwrap_or_else(PoisonError::into_inner);
        if live.iter().any(|m| m == manifest) {
            return Err(ProvisionError::Conflict {
                resource: manifest.lines().take(4).collect::<Vec<_>>().join(" "),
            });
        }
        live.push(manifest.to_owned());
        drop(live);
        self.created
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(manifest.to_owned());
        Ok(())
    }

    async fn delete_from_yaml(
        &self,
        manifest: &str,
    ) -> Result<(), ProvisionError> {
        self.live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|m| m != manifest);
        self.deleted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(manifest.to_owned());
        Ok(())
    }
}

/// Error of rendering a manifest template.
#[derive(Debug, Display, Error)]
pub enum TemplateError {
    /// No template set is registered under the requested name.
    #[display(fmt = "unknown template set: {:?}", name)]
    Unknown {
        /// The requested template set name.
        name: String,
    },

    /// The template referenced a value the config does not provide.
    #[display(fmt = "template {:?} references unset value {:?}", name, value)]
    UnsetValue {
        /// The rendered template set name.
        name: String,

        /// The missing value key.
        value: String,
    },
}

/// Renders a named YAML template set into applyable resource specs.
///
/// Template rendering itself is out of scope for the engine; this trait is
/// the seam a real templater plugs into.
pub trait ManifestTemplater: Send + Sync {
    /// Renders the template set registered under `name` with `config`.
    fn render(
        &self,
        name: &str,
        config: &TemplateConfig,
    ) -> Result<String, TemplateError>;
}

/// Strongly typed configuration handed to a [`ManifestTemplater`].
///
/// The well-known fields (namespace, image map) are typed so shape errors
/// surface at compile time; only the [`TemplateConfig::to_map`] boundary
/// degrades to a string-keyed map, since that is what an external templater
/// consumes.
#[derive(Clone, Debug)]
pub struct TemplateConfig {
    namespace: String,
    images: BTreeMap<String, String>,
    values: BTreeMap<String, serde_json::Value>,
}

impl TemplateConfig {
    /// Starts building a config for the given namespace.
    #[must_use]
    pub fn builder(namespace: impl Into<String>) -> TemplateConfigBuilder {
        TemplateConfigBuilder {
            config: Self {
                namespace: namespace.into(),
                images: BTreeMap::new(),
                values: BTreeMap::new(),
            },
        }
    }

    /// Target namespace.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Logical-name to resolved-reference image mapping.
    #[must_use]
    pub fn images(&self) -> &BTreeMap<String, String> {
        &self.images
    }

    /// Additional template values.
    #[must_use]
    pub fn value(&self, key: &str) -> Option<&serde_json::Value> {
        self.values.get(key)
    }

    /// Flattens this config into the string-keyed map an external templater
    /// consumes.
    #[must_use]
    pub fn to_map(&self) -> BTreeMap<String, serde_json::Value> {
        let mut map = self.values.clone();
        map.insert("namespace".to_owned(), self.namespace.clone().into());
        map.insert(
            "images".to_owned(),
            serde_json::Value::Object(
                self.images
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone().into()))
                    .collect(),
            ),
        );
        map
    }
}

/// Builder of a [`TemplateConfig`].
#[derive(Debug)]
pub struct TemplateConfigBuilder {
    config: TemplateConfig,
}

impl TemplateConfigBuilder {
    /// Adds a logical-name to resolved-reference image mapping.
    #[must_use]
    pub fn image(
        mut self,
        name: impl Into<String>,
        reference: impl Into<String>,
    ) -> Self {
        self.config.images.insert(name.into(), reference.into());
        self
    }

    /// Adds an additional template value.
    ///
    /// Values that do not serialize to JSON are dropped; templating configs
    /// are built from plain data, so this does not happen in practice.
    #[must_use]
    pub fn value(
        mut self,
        key: impl Into<String>,
        value: impl Serialize,
    ) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.config.values.insert(key.into(), v);
        }
        self
    }

    /// Finalizes the [`TemplateConfig`].
    #[must_use]
    pub fn build(self) -> TemplateConfig {
        self.config
    }
}
