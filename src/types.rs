/*!
Core value types shared across the engine.

An [`Entry`] is the unit that flows through every layer: the write-ahead log,
the skip list, the flush path, and the table files. Its key is a *versioned*
key (see [`crate::key`]) carrying the commit timestamp that also lives in the
`version` field; the duplication lets block codecs and the transaction layer
each use the form that is natural to them.
*/

use serde::{Deserialize, Serialize};

/// A single versioned record.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Entry {
    /// The versioned key, i.e. `user_key + "@" + decimal(version)`.
    pub key: Vec<u8>,

    /// The user value. Semantically empty when `tombstone` is set.
    pub value: Vec<u8>,

    /// True if this entry marks a deletion.
    pub tombstone: bool,

    /// The commit timestamp assigned by the oracle.
    pub version: u64,
}

impl Entry {
    /// Create a new [`Entry`].
    pub fn new(key: Vec<u8>, value: Vec<u8>, tombstone: bool, version: u64) -> Self {
        Self {
            key,
            value,
            tombstone,
            version,
        }
    }
}

/// A plain key-value pair as returned by scans. Keys are user keys.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct KV {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}
