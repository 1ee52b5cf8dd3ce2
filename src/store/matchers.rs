//! Composable boolean predicates over [`EventRecord`] fields.
//!
//! A [`Matcher`] either accepts a record or explains why it does not; the
//! explanations end up in assertion diagnostics. Composition supports AND
//! ([`all_of`]) and OR ([`any_of`], short-circuiting on first success).

use std::sync::Arc;

use itertools::Itertools as _;

use super::{EventKind, EventRecord};

/// A described predicate over [`EventRecord`]s.
#[derive(Clone)]
pub struct Matcher {
    description: String,
    predicate: Arc<dyn Fn(&EventRecord) -> Result<(), String> + Send + Sync>,
}

impl Matcher {
    /// Creates a matcher from a description and a predicate returning the
    /// mismatch reason on rejection.
    #[must_use]
    pub fn new<F>(description: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&EventRecord) -> Result<(), String> + Send + Sync + 'static,
    {
        Self {
            description: description.into(),
            predicate: Arc::new(predicate),
        }
    }

    /// Applies this matcher to `record`, returning the mismatch reason on
    /// rejection.
    ///
    /// # Errors
    ///
    /// If `record` does not satisfy this matcher.
    pub fn matches(&self, record: &EventRecord) -> Result<(), String> {
        (self.predicate)(record)
    }

    /// Human-readable description, used in diagnostics.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }
}

impl std::fmt::Debug for Matcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Matcher")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// Matches every record.
#[must_use]
pub fn any() -> Matcher {
    Matcher::new("any record", |_| Ok(()))
}

/// Matches records of the given [`EventKind`].
#[must_use]
pub fn has_kind(kind: EventKind) -> Matcher {
    Matcher::new(format!("kind is {kind}"), move |r| {
        if r.kind == kind {
            Ok(())
        } else {
            Err(format!("kind is {}, expected {kind}", r.kind))
        }
    })
}

/// Matches records recorded by the named observer.
#[must_use]
pub fn has_observer(observer: impl Into<String>) -> Matcher {
    let observer = observer.into();
    Matcher::new(format!("observer is {observer:?}"), move |r| {
        if r.observer == observer {
            Ok(())
        } else {
            Err(format!("observer is {:?}, expected {observer:?}", r.observer))
        }
    })
}

/// Matches records carrying the given transport header.
#[must_use]
pub fn has_header(
    name: impl Into<String>,
    value: impl Into<String>,
) -> Matcher {
    let name = name.into();
    let value = value.into();
    Matcher::new(format!("header {name:?} is {value:?}"), move |r| {
        match r.headers.get(&name) {
            Some(v) if *v == value => Ok(()),
            Some(v) => {
                Err(format!("header {name:?} is {v:?}, expected {value:?}"))
            }
            None => Err(format!("header {name:?} is absent")),
        }
    })
}

/// Matches records carrying the given HTTP status code.
#[must_use]
pub fn has_status_code(code: u16) -> Matcher {
    Matcher::new(format!("status code is {code}"), move |r| {
        match r.status_code {
            Some(c) if c == code => Ok(()),
            Some(c) => Err(format!("status code is {c}, expected {code}")),
            None => Err("no status code recorded".to_owned()),
        }
    })
}

/// Matches records whose event payload has the given identifier.
#[must_use]
pub fn has_event_id(id: impl Into<String>) -> Matcher {
    let id = id.into();
    Matcher::new(format!("event id is {id:?}"), move |r| {
        match &r.event {
            Some(e) if e.id == id => Ok(()),
            Some(e) => Err(format!("event id is {:?}, expected {id:?}", e.id)),
            None => Err("no event payload recorded".to_owned()),
        }
    })
}

/// Matches records whose event payload has the given source.
#[must_use]
pub fn has_event_source(source: impl Into<String>) -> Matcher {
    let source = source.into();
    Matcher::new(format!("event source is {source:?}"), move |r| {
        match &r.event {
            Some(e) if e.source == source => Ok(()),
            Some(e) => Err(format!(
                "event source is {:?}, expected {source:?}",
                e.source,
            )),
            None => Err("no event payload recorded".to_owned()),
        }
    })
}

/// Matches records whose event payload has the given type.
#[must_use]
pub fn has_event_type(ty: impl Into<String>) -> Matcher {
    let ty = ty.into();
    Matcher::new(format!("event type is {ty:?}"), move |r| {
        match &r.event {
            Some(e) if e.ty == ty => Ok(()),
            Some(e) => {
                Err(format!("event type is {:?}, expected {ty:?}", e.ty))
            }
            None => Err("no event payload recorded".to_owned()),
        }
    })
}

/// Matches records that recorded an observation error.
#[must_use]
pub fn has_error() -> Matcher {
    Matcher::new("an error was recorded", |r| {
        if r.error.is_some() {
            Ok(())
        } else {
            Err("no error recorded".to_owned())
        }
    })
}

/// Matches records that recorded no observation error.
#[must_use]
pub fn no_error() -> Matcher {
    Matcher::new("no error was recorded", |r| match &r.error {
        None => Ok(()),
        Some(e) => Err(format!("error recorded: {e}")),
    })
}

/// AND composition: matches records accepted by every given matcher,
/// reporting the first mismatch.
#[must_use]
pub fn all_of(matchers: impl IntoIterator<Item = Matcher>) -> Matcher {
    let matchers: Vec<_> = matchers.into_iter().collect();
    let description = matchers
        .iter()
        .map(Matcher::description)
        .join(" and ");
    Matcher::new(description, move |r| {
        matchers.iter().try_for_each(|m| m.matches(r))
    })
}

/// OR composition: matches records accepted by at least one given matcher,
/// short-circuiting on the first success.
#[must_use]
pub fn any_of(matchers: impl IntoIterator<Item = Matcher>) -> Matcher {
    let matchers: Vec<_> = matchers.into_iter().collect();
    let description = matchers
        .iter()
        .map(Matcher::description)
        .join(" or ");
    Matcher::new(description, move |r| {
        let mut reasons = Vec::with_capacity(matchers.len());
        for m in &matchers {
            match m.matches(r) {
                Ok(()) => return Ok(()),
                Err(reason) => reasons.push(reason),
            }
        }
        Err(reasons.join("; "))
    })
}

#[cfg(test)]
mod tests {
    use super::{super::EventPayload, *};

    fn received() -> EventRecord {
        EventRecord::new(EventKind::Received, "recorder")
            .with_event(EventPayload::new("id-1", "//src", "example.ping"))
            .with_header("ce-id", "id-1")
            .with_status_code(202)
    }

    #[test]
    fn field_matchers_accept_and_explain() {
        let r = received();

        assert!(has_kind(EventKind::Received).matches(&r).is_ok());
        assert!(has_observer("recorder").matches(&r).is_ok());
        assert!(has_header("ce-id", "id-1").matches(&r).is_ok());
        assert!(has_status_code(202).matches(&r).is_ok());
        assert!(has_event_id("id-1").matches(&r).is_ok());
        assert!(has_event_source("//src").matches(&r).is_ok());
        assert!(has_event_type("example.ping").matches(&r).is_ok());
        assert!(no_error().matches(&r).is_ok());

        let reason = has_kind(EventKind::Sent).matches(&r).unwrap_err();
        assert_eq!(reason, "kind is Received, expected Sent");
        let reason = has_header("ce-id", "other").matches(&r).unwrap_err();
        assert_eq!(reason, "header \"ce-id\" is \"id-1\", expected \"other\"");
    }

    #[test]
    fn matchers_on_payloadless_records_explain_absence() {
        let r = EventRecord::new(EventKind::Sent, "sender");
        assert_eq!(
            has_event_id("x").matches(&r).unwrap_err(),
            "no event payload recorded",
        );
        assert!(has_error().matches(&r).is_err());
    }

    #[test]
    fn all_of_requires_every_matcher() {
        let r = received();
        let both = all_of([
            has_kind(EventKind::Received),
            has_event_type("example.ping"),
        ]);
        assert!(both.matches(&r).is_ok());
        assert_eq!(
            both.description(),
            "kind is Received and event type is \"example.ping\"",
        );

        let mixed =
            all_of([has_kind(EventKind::Received), has_status_code(500)]);
        assert!(mixed.matches(&r).is_err());
    }

    #[test]
    fn any_of_short_circuits_on_first_success() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let r = received();
        let consulted = Arc::new(AtomicUsize::new(0));
        let counting = {
            let consulted = Arc::clone(&consulted);
            Matcher::new("counting", move |_| {
                consulted.fetch_add(1, Ordering::SeqCst);
                Err("rejects everything".to_owned())
            })
        };

        let either = any_of([has_kind(EventKind::Received), counting]);
        assert!(either.matches(&r).is_ok());
        assert_eq!(consulted.load(Ordering::SeqCst), 0);

        let neither =
            any_of([has_kind(EventKind::Sent), has_status_code(500)]);
        let reason = neither.matches(&r).unwrap_err();
        assert!(reason.contains("kind is Received, expected Sent"));
        assert!(reason.contains("status code is 202, expected 500"));
    }
}
