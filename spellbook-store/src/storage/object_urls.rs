//! Transient display URLs for stored icons
//!
//! A stored icon is handed to the display layer as an opaque
//! `blob:spellbook/<uuid>` URL that resolves to the icon bytes until it is
//! revoked. URLs live only in memory and are minted fresh every session.
//! Releasing them is the caller's job.

use crate::config::OBJECT_URL_PREFIX;
use crate::database::IconBlob;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

/// Registry of live display URLs
#[derive(Clone, Default)]
pub struct ObjectUrlRegistry {
    entries: Arc<Mutex<HashMap<String, IconBlob>>>,
}

impl ObjectUrlRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a new URL for `blob`
    pub fn create(&self, blob: &IconBlob) -> String {
        let url = format!("{}{}", OBJECT_URL_PREFIX, Uuid::new_v4());
        self.lock().insert(url.clone(), blob.clone());

        tracing::debug!("Created object URL {} ({} bytes)", url, blob.bytes.len());
        url
    }

    /// Bytes behind a live URL
    pub fn resolve(&self, url: &str) -> Option<IconBlob> {
        self.lock().get(url).cloned()
    }

    /// Release a URL. Returns whether it was live.
    pub fn revoke(&self, url: &str) -> bool {
        let removed = self.lock().remove(url).is_some();
        if removed {
            tracing::debug!("Revoked object URL {}", url);
        }
        removed
    }

    /// Release every URL, returning how many were live
    pub fn revoke_all(&self) -> usize {
        let mut entries = self.lock();
        let count = entries.len();
        entries.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, IconBlob>> {
        // Entries stay consistent even if a holder panicked.
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
