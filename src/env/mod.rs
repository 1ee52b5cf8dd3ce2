//! Per-test execution environments: isolated namespace, image map,
//! cancellable lifetime, and the [`test`]/[`test_set`] drivers.
//!
//! A [`GlobalEnvironment`] holds the collaborators shared by every test in a
//! process (image registry, provisioner, milestone emitter) and mints one
//! [`Environment`] per test via [`GlobalEnvironment::environment`]. Each
//! environment owns a unique namespace and a cancellation token scoped to
//! the test that created it; [`Environment::finish`] is the deterministic
//! destruction point.
//!
//! [`test`]: Environment::test
//! [`test_set`]: Environment::test_set

mod execution;
mod images;
pub mod opts;

use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, PoisonError,
    },
};

use derive_more::{Display, Error, From};
use rand::Rng as _;
use tokio_util::sync::CancellationToken;

use crate::{
    feature::{Levels, States},
    milestone::{LogEmitter, MilestoneEmitter},
    resources::{ProvisionError, ResourceProvisioner},
    state::KVStore,
    store::{EventStore, Timings},
};

pub use self::{
    images::{ImageError, ImageRegistry},
    opts::EnvConfig,
};

/// Length of the random namespace suffix.
const NAMESPACE_SUFFIX_LEN: usize = 8;

/// A functional option applied at [`Environment`] construction.
///
/// Constructed via the free functions in [`opts`].
pub type EnvOpt = Box<dyn FnOnce(&mut EnvConfig)>;

/// Error of constructing or finishing an [`Environment`].
#[derive(Debug, Display, Error, From)]
pub enum EnvironmentError {
    /// The requested namespace is not a valid resource name.
    #[display(
        fmt = "invalid namespace {:?}: lowercase alphanumerics and '-' only",
        namespace
    )]
    #[from(ignore)]
    InvalidNamespace {
        /// The rejected namespace.
        namespace: String,
    },

    /// Namespace provisioning failed.
    #[display(fmt = "{}", _0)]
    Provision(ProvisionError),
}

/// Identifier of a resource created during a test, tracked on the
/// environment for teardown reporting.
#[derive(Clone, Debug, Display, Eq, PartialEq)]
#[display(fmt = "{}/{} {}", api_version, kind, name)]
pub struct ResourceRef {
    /// Resource API version.
    pub api_version: String,

    /// Resource kind.
    pub kind: String,

    /// Resource name.
    pub name: String,
}

/// Process-wide test environment factory: explicit registry of the
/// collaborators every per-test [`Environment`] shares.
pub struct GlobalEnvironment {
    images: Arc<ImageRegistry>,
    provisioner: Arc<dyn ResourceProvisioner>,
    emitter: Arc<dyn MilestoneEmitter>,
    timings: Timings,
    cancellation: CancellationToken,
}

impl GlobalEnvironment {
    /// Creates a [`GlobalEnvironment`] with the given image registry and
    /// provisioner, a [`LogEmitter`] and default [`Timings`].
    #[must_use]
    pub fn new(
        images: ImageRegistry,
        provisioner: Arc<dyn ResourceProvisioner>,
    ) -> Self {
        Self {
            images: Arc::new(images),
            provisioner,
            emitter: Arc::new(LogEmitter),
            timings: Timings::default(),
            cancellation: CancellationToken::new(),
        }
    }

    /// Replaces the milestone emitter.
    #[must_use]
    pub fn with_emitter(mut self, emitter: Arc<dyn MilestoneEmitter>) -> Self {
        self.emitter = emitter;
        self
    }

    /// Replaces the default polling [`Timings`].
    #[must_use]
    pub fn with_timings(mut self, timings: Timings) -> Self {
        self.timings = timings;
        self
    }

    /// Mints a new per-test [`Environment`]: applies `opts`, generates a
    /// unique namespace unless one was pinned, and provisions it.
    ///
    /// # Errors
    ///
    /// If the namespace is invalid or its provisioning fails.
    pub async fn environment(
        &self,
        opts: impl IntoIterator<Item = EnvOpt>,
    ) -> Result<Environment, EnvironmentError> {
        let mut cfg = EnvConfig::default();
        for opt in opts {
            opt(&mut cfg);
        }

        let namespace = match cfg.namespace {
            Some(ns) => {
                validate_namespace(&ns)?;
                ns
            }
            None => random_namespace(),
        };

        self.provisioner
            .create_from_yaml(&namespace_manifest(&namespace))
            .await?;

        Ok(Environment {
            namespace,
            images: Arc::clone(&self.images),
            provisioner: Arc::clone(&self.provisioner),
            emitter: Arc::clone(&self.emitter),
            levels: cfg.levels.unwrap_or(Levels::ALL),
            states: cfg.states.unwrap_or(States::ALL),
            timings: cfg.timings.unwrap_or(self.timings),
            store: Arc::new(EventStore::new()),
            references: Mutex::new(Vec::new()),
            cancellation: self.cancellation.child_token(),
            managed: cfg.managed,
            finished: AtomicBool::new(false),
        })
    }

    /// Cancels every environment minted from this factory.
    pub fn shutdown(&self) {
        self.cancellation.cancel();
    }

    /// The shared image registry.
    #[must_use]
    pub fn images(&self) -> &ImageRegistry {
        &self.images
    }
}

impl fmt::Debug for GlobalEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlobalEnvironment")
            .field("images", &self.images)
            .field("timings", &self.timings)
            .finish_non_exhaustive()
    }
}

/// The per-test execution context: isolated namespace, image map,
/// cancellable lifetime, and the event store shared across the namespace's
/// whole life.
pub struct Environment {
    namespace: String,
    images: Arc<ImageRegistry>,
    provisioner: Arc<dyn ResourceProvisioner>,
    pub(crate) emitter: Arc<dyn MilestoneEmitter>,
    pub(crate) levels: Levels,
    pub(crate) states: States,
    timings: Timings,
    store: Arc<EventStore>,
    references: Mutex<Vec<ResourceRef>>,
    pub(crate) cancellation: CancellationToken,
    pub(crate) managed: bool,
    finished: AtomicBool,
}

impl Environment {
    /// The unique per-test namespace.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The event store shared across this environment's lifetime.
    #[must_use]
    pub fn store(&self) -> &Arc<EventStore> {
        &self.store
    }

    /// Active requirement-level filter.
    #[must_use]
    pub fn levels(&self) -> Levels {
        self.levels
    }

    /// Active feature-state filter.
    #[must_use]
    pub fn states(&self) -> States {
        self.states
    }

    /// Polling bounds steps inherit by default.
    #[must_use]
    pub fn timings(&self) -> Timings {
        self.timings
    }

    /// This environment's cancellation token, cancelled at
    /// [`Environment::finish`].
    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Records a created resource for teardown reporting.
    pub fn reference(&self, reference: ResourceRef) {
        self.references
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(reference);
    }

    /// Created-resource identifiers recorded so far, in creation order.
    #[must_use]
    pub fn references(&self) -> Vec<ResourceRef> {
        self.references
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Tears the namespace down and cancels this environment's token.
    ///
    /// The deterministic destruction point. Idempotent: the second and later
    /// calls are no-ops.
    ///
    /// # Errors
    ///
    /// If namespace deletion fails. The token is cancelled regardless.
    pub async fn finish(&self) -> Result<(), EnvironmentError> {
        if self.finished.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        for r in self.references() {
            tracing::debug!(namespace = %self.namespace, resource = %r, "leaving resource to namespace teardown");
        }

        let deleted = self
            .provisioner
            .delete_from_yaml(&namespace_manifest(&self.namespace))
            .await;
        self.cancellation.cancel();
        self.emitter.environment_finished(&self.namespace);
        deleted.map_err(Into::into)
    }

    /// Builds the explicit dependency handle passed to step functions.
    pub(crate) fn step_context(
        &self,
        state: Arc<KVStore>,
        run: CancellationToken,
    ) -> StepContext {
        StepContext {
            namespace: self.namespace.clone(),
            images: Arc::clone(&self.images),
            state,
            store: Arc::clone(&self.store),
            timings: self.timings,
            cancellation: run,
        }
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("namespace", &self.namespace)
            .field("levels", &self.levels)
            .field("states", &self.states)
            .field("timings", &self.timings)
            .finish_non_exhaustive()
    }
}

/// Explicit dependency handle passed to every step function.
///
/// Replaces ambient context-value lookups: everything a step may touch is a
/// visible field with a typed accessor. The carried cancellation token is
/// scoped to the single [`Environment::test`] run and is cancelled when that
/// run returns, so in-flight polls unwind instead of hanging.
#[derive(Clone)]
pub struct StepContext {
    namespace: String,
    images: Arc<ImageRegistry>,
    state: Arc<KVStore>,
    store: Arc<EventStore>,
    timings: Timings,
    cancellation: CancellationToken,
}

impl StepContext {
    /// The environment's namespace.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The shared image registry.
    #[must_use]
    pub fn images(&self) -> &ImageRegistry {
        &self.images
    }

    /// The feature's shared state store.
    #[must_use]
    pub fn state(&self) -> &KVStore {
        &self.state
    }

    /// The environment's event store.
    #[must_use]
    pub fn store(&self) -> &EventStore {
        &self.store
    }

    /// Default polling bounds for blocking assertions.
    #[must_use]
    pub fn timings(&self) -> Timings {
        self.timings
    }

    /// Cancellation token of the current test run.
    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }
}

impl fmt::Debug for StepContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepContext")
            .field("namespace", &self.namespace)
            .field("timings", &self.timings)
            .finish_non_exhaustive()
    }
}

/// Renders the minimal namespace manifest handed to the provisioner.
fn namespace_manifest(namespace: &str) -> String {
    format!("apiVersion: v1\nkind: Namespace\nmetadata:\n  name: {namespace}\n")
}

/// Generates a `test-` namespace with a random lowercase suffix.
fn random_namespace() -> String {
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    let suffix: String = (0..NAMESPACE_SUFFIX_LEN)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect();
    format!("test-{suffix}")
}

/// Validates a pinned namespace name.
fn validate_namespace(namespace: &str) -> Result<(), EnvironmentError> {
    let valid = !namespace.is_empty()
        && namespace
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !namespace.starts_with('-')
        && !namespace.ends_with('-');
    if valid {
        Ok(())
    } else {
        Err(EnvironmentError::InvalidNamespace {
            namespace: namespace.to_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::FakeProvisioner;

    fn global() -> (GlobalEnvironment, Arc<FakeProvisioner>) {
        let provisioner = Arc::new(FakeProvisioner::new());
        let global = GlobalEnvironment::new(
            ImageRegistry::new().with("eventshub", "registry.test/hub:v1"),
            Arc::clone(&provisioner) as Arc<dyn ResourceProvisioner>,
        );
        (global, provisioner)
    }

    #[tokio::test]
    async fn environment_gets_a_unique_random_namespace() {
        let (global, provisioner) = global();
        let a = global.environment(Vec::new()).await.unwrap();
        let b = global.environment(Vec::new()).await.unwrap();

        assert_ne!(a.namespace(), b.namespace());
        assert!(a.namespace().starts_with("test-"));
        assert_eq!(a.namespace().len(), "test-".len() + NAMESPACE_SUFFIX_LEN);
        assert_eq!(provisioner.created().len(), 2);
    }

    #[tokio::test]
    async fn pinned_namespace_is_validated() {
        let (global, _) = global();

        let env = global
            .environment(vec![opts::with_namespace("conformance-suite")])
            .await
            .unwrap();
        assert_eq!(env.namespace(), "conformance-suite");

        let err = global
            .environment(vec![opts::with_namespace("Not-Valid!")])
            .await
            .unwrap_err();
        assert!(matches!(err, EnvironmentError::InvalidNamespace { .. }));
    }

    #[tokio::test]
    async fn finish_deletes_the_namespace_once() {
        let (global, provisioner) = global();
        let env = global.environment(Vec::new()).await.unwrap();

        env.finish().await.unwrap();
        env.finish().await.unwrap();

        assert_eq!(provisioner.deleted().len(), 1);
        assert!(env.cancellation().is_cancelled());
    }

    #[tokio::test]
    async fn filters_default_to_everything_enabled() {
        let (global, _) = global();
        let env = global.environment(Vec::new()).await.unwrap();

        assert_eq!(env.levels(), Levels::ALL);
        assert_eq!(env.states(), States::ALL);
    }

    #[tokio::test]
    async fn references_accumulate_in_order() {
        let (global, _) = global();
        let env = global.environment(Vec::new()).await.unwrap();

        env.reference(ResourceRef {
            api_version: "v1".into(),
            kind: "Service".into(),
            name: "sink".into(),
        });
        env.reference(ResourceRef {
            api_version: "eventing.test/v1".into(),
            kind: "Broker".into(),
            name: "default".into(),
        });

        let refs = env.references();
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].to_string(), "v1/Service sink");
    }

    #[test]
    fn namespace_validation_rejects_edge_dashes() {
        assert!(validate_namespace("ok-name-1").is_ok());
        assert!(validate_namespace("-leading").is_err());
        assert!(validate_namespace("trailing-").is_err());
        assert!(validate_namespace("").is_err());
        assert!(validate_namespace("Upper").is_err());
    }
}
