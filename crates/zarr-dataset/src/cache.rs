//! Process-wide cache of opened dataset handles.
//!
//! Opening a dataset reads its consolidated metadata over the network, so
//! handles are cached for the life of the process and shared across
//! queries. Failed opens are never cached; a transient store error must
//! not poison later requests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::backend::BackendKind;
use crate::error::Result;

/// Identity of a dataset for cache lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DatasetKey {
    pub backend: BackendKind,
    pub locator: String,
    pub bucket: String,
    pub subpath: String,
}

/// A cache of opened dataset handles, keyed by [`DatasetKey`].
///
/// Generic over the handle type so tests can count open invocations
/// without touching real storage.
pub struct DatasetCache<H> {
    handles: Mutex<HashMap<DatasetKey, Arc<H>>>,
}

impl<H> DatasetCache<H> {
    pub fn new() -> Self {
        Self {
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached handle for `key`, or open one with `open` and
    /// cache it.
    ///
    /// The lock is not held across the open call, so concurrent misses
    /// for the same key may both open; the loser's handle is dropped and
    /// the winner's is returned to everyone.
    pub fn get_or_open<F>(&self, key: &DatasetKey, open: F) -> Result<Arc<H>>
    where
        F: FnOnce() -> Result<H>,
    {
        if let Some(handle) = self.handles.lock().unwrap().get(key) {
            return Ok(handle.clone());
        }

        let handle = Arc::new(open()?);
        let mut handles = self.handles.lock().unwrap();
        let entry = handles.entry(key.clone()).or_insert_with(|| handle);
        Ok(entry.clone())
    }

    /// Number of cached handles.
    pub fn len(&self) -> usize {
        self.handles.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<H> Default for DatasetCache<H> {
    fn default() -> Self {
        Self::new()
    }
}
