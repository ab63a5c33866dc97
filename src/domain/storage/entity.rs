//! Keys and entities understood by storage backends

use std::fmt::Debug;

use serde::{de::DeserializeOwned, Serialize};

/// A validated identifier usable as a storage key
pub trait StorageKey: Clone + Debug + Send + Sync + Eq + std::hash::Hash {
    /// String form used by backends that index by text
    fn as_str(&self) -> &str;
}

/// A serialisable entity addressed by its key
pub trait StorageEntity: Clone + Debug + Send + Sync + Serialize + DeserializeOwned {
    type Key: StorageKey;

    fn key(&self) -> &Self::Key;
}
