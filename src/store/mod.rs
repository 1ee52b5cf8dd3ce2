//! Concurrent, append-only store of observed events, queryable by matcher
//! and supporting blocking-until-satisfied polling assertions.
//!
//! Events arrive asynchronously from out-of-process senders and receivers,
//! so assertions cannot be made synchronously after an action: the store
//! supports eventually-consistent polling assertions ([`assert`]) rather
//! than one-shot checks.

pub mod assert;
pub mod matchers;

use std::{
    collections::BTreeMap,
    fmt,
    sync::{PoisonError, RwLock},
    time::SystemTime,
};

use serde::{Deserialize, Serialize};

pub use self::{
    assert::Timings,
    matchers::Matcher,
};

/// Kind of an observed [`EventRecord`].
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum EventKind {
    /// An event leaving a sender.
    Sent,

    /// An event accepted by a receiver.
    Received,

    /// An event refused by a receiver.
    Rejected,

    /// A response observed by a sender.
    Response,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sent => "Sent",
            Self::Received => "Received",
            Self::Rejected => "Rejected",
            Self::Response => "Response",
        })
    }
}

/// Minimal event payload carried by an [`EventRecord`]: enough identity to
/// assert on without modeling a full eventing envelope.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct EventPayload {
    /// Event identifier.
    pub id: String,

    /// Event source URI.
    pub source: String,

    /// Event type.
    pub ty: String,

    /// Structured event body, if any.
    pub data: Option<serde_json::Value>,
}

impl EventPayload {
    /// Creates a payload with the given identity and no body.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        source: impl Into<String>,
        ty: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            ty: ty.into(),
            data: None,
        }
    }

    /// Attaches a structured body.
    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// A single observation appended to the [`EventStore`].
///
/// Append-only and owned exclusively by the store: once appended, a record
/// is immutable and is never removed during a test's lifetime.
#[derive(Clone, Debug)]
pub struct EventRecord {
    /// What was observed.
    pub kind: EventKind,

    /// Identifier of the observer that recorded this event.
    pub observer: String,

    /// The observed event payload, if one was parsed.
    pub event: Option<EventPayload>,

    /// Transport headers observed alongside the event.
    pub headers: BTreeMap<String, String>,

    /// HTTP status code, for [`EventKind::Response`]/[`EventKind::Rejected`]
    /// observations.
    pub status_code: Option<u16>,

    /// Observation error, if the observer failed to process the event.
    pub error: Option<String>,

    /// Store-assigned ordering key. Zero until appended.
    pub sequence: u64,

    /// Store-assigned append time.
    pub time: SystemTime,
}

impl EventRecord {
    /// Creates a record of the given kind from the named observer.
    #[must_use]
    pub fn new(kind: EventKind, observer: impl Into<String>) -> Self {
        Self {
            kind,
            observer: observer.into(),
            event: None,
            headers: BTreeMap::new(),
            status_code: None,
            error: None,
            sequence: 0,
            time: SystemTime::UNIX_EPOCH,
        }
    }

    /// Attaches an event payload.
    #[must_use]
    pub fn with_event(mut self, event: EventPayload) -> Self {
        self.event = Some(event);
        self
    }

    /// Attaches a transport header.
    #[must_use]
    pub fn with_header(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Attaches an HTTP status code.
    #[must_use]
    pub fn with_status_code(mut self, code: u16) -> Self {
        self.status_code = Some(code);
        self
    }

    /// Attaches an observation error.
    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// One-line summary used in assertion diagnostics.
    #[must_use]
    pub fn summary(&self) -> String {
        let identity = self.event.as_ref().map_or_else(
            || "<no event>".to_owned(),
            |e| format!("id={} source={} type={}", e.id, e.source, e.ty),
        );
        format!("#{} {} by {:?}: {}", self.sequence, self.kind, self.observer, identity)
    }
}

/// Thread-safe, append-only log of [`EventRecord`]s, shared across the whole
/// namespace/environment lifetime.
///
/// [`append`] is O(1) amortized and safe under concurrent writers; [`query`]
/// returns a snapshot consistent at call time and never observes a partially
/// appended record.
///
/// [`append`]: EventStore::append
/// [`query`]: EventStore::query
#[derive(Debug, Default)]
pub struct EventStore {
    records: RwLock<Vec<EventRecord>>,
}

impl EventStore {
    /// Creates an empty [`EventStore`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record, assigning its sequence number and append time, and
    /// returns the assigned sequence number.
    ///
    /// The sequence is assigned under the write lock, so sequence order and
    /// append order always agree.
    pub fn append(&self, mut record: EventRecord) -> u64 {
        let mut records = self
            .records
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let sequence = records.len() as u64 + 1;
        record.sequence = sequence;
        record.time = SystemTime::now();
        records.push(record);
        sequence
    }

    /// Returns a snapshot of the records accepted by `matcher`, in append
    /// order.
    #[must_use]
    pub fn query(&self, matcher: &Matcher) -> Vec<EventRecord> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|r| matcher.matches(r).is_ok())
            .cloned()
            .collect()
    }

    /// Returns a snapshot of every appended record, in append order.
    #[must_use]
    pub fn all(&self) -> Vec<EventRecord> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of appended records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Indicates whether no record has been appended yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
