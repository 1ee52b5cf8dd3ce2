//! Phase-ordered feature testing framework for eventually-consistent
//! platforms, with async support.
//!
//! A [`Feature`] is a named, declarative test unit composed of timed
//! [`Step`]s: Setup, Requirement, Assert and Teardown functions tagged with
//! requirement [`Levels`] and maturity [`States`]. An [`Environment`] —
//! isolated namespace, image map, cancellable lifetime — drives a feature
//! through the fixed phase sequence: Setup and Requirement run sequentially
//! with cascading skip on failure, Asserts fan out concurrently with
//! per-step isolation, and Teardown always runs.
//!
//! Because the platforms under test converge eventually rather than
//! synchronously, observations land in a concurrent append-only
//! [`EventStore`] and assertions poll it with bounded [`Timings`] instead of
//! checking once.
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use futures::FutureExt as _;
//! use crucible::{
//!     env::{opts, GlobalEnvironment, ImageRegistry},
//!     resources::FakeProvisioner,
//!     Feature,
//! };
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let global = GlobalEnvironment::new(
//!     ImageRegistry::new().with("eventshub", "registry.test/hub:v1"),
//!     Arc::new(FakeProvisioner::new()),
//! );
//! let env = global.environment(vec![opts::managed()]).await.unwrap();
//!
//! let mut feature = Feature::new("event delivery");
//! feature
//!     .setup("deploy sink", |ctx| {
//!         let ns = ctx.namespace().to_owned();
//!         async move {
//!             assert!(ns.starts_with("test-"));
//!             Ok(())
//!         }
//!         .boxed_local()
//!     })
//!     .must("deliver the event", |ctx| {
//!         async move {
//!             ctx.state().set("delivered", &true)?;
//!             Ok(())
//!         }
//!         .boxed_local()
//!     });
//!
//! let report = env.test(&mut feature).await;
//! assert!(report.passed());
//! # }
//! ```

pub mod env;
pub mod error;
pub mod feature;
pub mod milestone;
pub mod report;
pub mod resources;
pub mod state;
pub mod store;

pub use self::{
    env::{Environment, GlobalEnvironment, StepContext},
    error::{Error, Result},
    feature::{
        collapse, reorder, Feature, FeatureSet, Levels, SetReport, States,
        Step, StepError, StepResult, Timing,
    },
    report::{ExecutionReport, StepReport, StepStatus},
    state::KVStore,
    store::{EventKind, EventPayload, EventRecord, EventStore, Timings},
};
