//! Transient local handles for cached images and PDFs.
//!
//! A [`MediaHandle`] owns one registry entry and removes it when dropped, so
//! a handle's lifetime is exactly the lifetime of the value holding it.

use bytes::Bytes;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::trace;
use uuid::Uuid;

pub const HANDLE_SCHEME: &str = "blob:offline/";

#[derive(Debug, Clone)]
pub struct HandleEntry {
    pub content_type: String,
    pub bytes: Bytes,
}

type Entries = Arc<Mutex<HashMap<String, HandleEntry>>>;

/// Registry of live handles, shared by the resolver and whatever layer
/// serves `blob:offline/…` URIs.
#[derive(Clone, Default)]
pub struct HandleRegistry {
    entries: Entries,
}

fn lock(entries: &Entries) -> MutexGuard<'_, HashMap<String, HandleEntry>> {
    entries.lock().unwrap_or_else(|e| e.into_inner())
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register bytes and return the handle that owns them
    pub fn acquire(&self, content_type: impl Into<String>, bytes: impl Into<Bytes>) -> MediaHandle {
        let uri = format!("{}{}", HANDLE_SCHEME, Uuid::new_v4());
        lock(&self.entries).insert(
            uri.clone(),
            HandleEntry {
                content_type: content_type.into(),
                bytes: bytes.into(),
            },
        );
        trace!(uri = %uri, "Media handle acquired");

        MediaHandle {
            uri,
            entries: Arc::clone(&self.entries),
        }
    }

    /// Look up a live handle by URI
    pub fn get(&self, uri: &str) -> Option<HandleEntry> {
        lock(&self.entries).get(uri).cloned()
    }

    pub fn live_count(&self) -> usize {
        lock(&self.entries).len()
    }
}

impl fmt::Debug for HandleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleRegistry")
            .field("live_count", &self.live_count())
            .finish()
    }
}

/// Owner of one registered blob; dropping it releases the entry
pub struct MediaHandle {
    uri: String,
    entries: Entries,
}

impl MediaHandle {
    pub fn uri(&self) -> &str {
        &self.uri
    }
}

impl Drop for MediaHandle {
    fn drop(&mut self) {
        lock(&self.entries).remove(&self.uri);
        trace!(uri = %self.uri, "Media handle released");
    }
}

impl fmt::Debug for MediaHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MediaHandle").field(&self.uri).finish()
    }
}

impl PartialEq for MediaHandle {
    fn eq(&self, other: &Self) -> bool {
        self.uri == other.uri
    }
}

impl Eq for MediaHandle {}
