//! Shared per-feature state store: a thread-safe map of JSON-serialized
//! values, safe for concurrent use across fan-out Assert steps.

use std::{
    collections::HashMap,
    sync::{PoisonError, RwLock},
};

use derive_more::{Display, Error};
use serde::{de::DeserializeOwned, Serialize};

/// Error of a [`KVStore`] access.
#[derive(Debug, Display, Error)]
pub enum StateError {
    /// No value is stored under the requested key.
    #[display(fmt = "no state stored under key {:?}", key)]
    Missing {
        /// The requested key.
        key: String,
    },

    /// The value could not be serialized to JSON.
    #[display(fmt = "failed to encode state under key {:?}: {}", key, source)]
    Encode {
        /// The written key.
        key: String,

        /// Underlying JSON error.
        source: serde_json::Error,
    },

    /// The stored value could not be deserialized into the requested type.
    #[display(fmt = "failed to decode state under key {:?}: {}", key, source)]
    Decode {
        /// The requested key.
        key: String,

        /// Underlying JSON error.
        source: serde_json::Error,
    },
}

/// Thread-safe key-value store of JSON-serialized values, shared by all
/// steps of a single [`Feature`] run.
///
/// This is the only mutable object shared across concurrently-running Assert
/// steps within one feature, so every access goes through an internal lock.
/// [`KVStore::get`] returns a [`StateError`] when the key is absent or
/// undecodable, never panicking.
///
/// [`Feature`]: crate::Feature
#[derive(Debug, Default)]
pub struct KVStore {
    entries: RwLock<HashMap<String, serde_json::Value>>,
}

impl KVStore {
    /// Creates an empty [`KVStore`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serializes `value` and stores it under `key`, replacing any previous
    /// value.
    ///
    /// # Errors
    ///
    /// If `value` cannot be represented as JSON.
    pub fn set<T>(
        &self,
        key: impl Into<String>,
        value: &T,
    ) -> Result<(), StateError>
    where
        T: Serialize + ?Sized,
    {
        let key = key.into();
        let value = serde_json::to_value(value).map_err(|source| {
            StateError::Encode {
                key: key.clone(),
                source,
            }
        })?;
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, value);
        Ok(())
    }

    /// Retrieves and deserializes the value stored under `key`.
    ///
    /// # Errors
    ///
    /// If the key is absent, or the stored value does not decode into `T`.
    pub fn get<T>(&self, key: &str) -> Result<T, StateError>
    where
        T: DeserializeOwned,
    {
        let value = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
            .ok_or_else(|| StateError::Missing {
                key: key.to_owned(),
            })?;
        serde_json::from_value(value).map_err(|source| StateError::Decode {
            key: key.to_owned(),
            source,
        })
    }

    /// Indicates whether a value is stored under `key`.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    /// All stored keys, in unspecified order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }
}
