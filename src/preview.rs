//! Displayable references for decoded images.
//!
//! A [`PreviewUrl`] is a transient handle the UI can render; the bytes stay in
//! the registry until the handle is revoked. Each handle must be revoked
//! exactly once, which the image cache does when it is cleared.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::lock;

const SCHEME: &str = "preview:";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PreviewUrl(String);

impl PreviewUrl {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PreviewUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Default)]
pub struct PreviewRegistry {
    next: AtomicU64,
    live: Mutex<HashMap<PreviewUrl, (String, Arc<[u8]>)>>,
}

impl PreviewRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Mints a fresh reference backed by `bytes`.
    pub fn mint(&self, mime_type: &str, bytes: Arc<[u8]>) -> PreviewUrl {
        let id = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        let url = PreviewUrl(format!("{SCHEME}{id}"));
        lock(&self.live).insert(url.clone(), (mime_type.to_string(), bytes));
        url
    }

    /// Resolves a live reference to its MIME type and bytes.
    pub fn resolve(&self, url: &PreviewUrl) -> Option<(String, Arc<[u8]>)> {
        lock(&self.live).get(url).cloned()
    }

    /// Releases a reference. Returns `false` (and logs) on a double release.
    pub fn revoke(&self, url: &PreviewUrl) -> bool {
        let removed = lock(&self.live).remove(url).is_some();
        if !removed {
            warn!(%url, "preview reference released twice or never minted");
        }
        removed
    }

    pub fn live_count(&self) -> usize {
        lock(&self.live).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mint_resolve_revoke() {
        let registry = PreviewRegistry::new();
        let a = registry.mint("image/png", Arc::from(vec![1u8, 2, 3]));
        let b = registry.mint("image/png", Arc::from(vec![4u8]));
        assert_ne!(a, b);
        assert_eq!(registry.live_count(), 2);
        assert_eq!(registry.resolve(&a).unwrap().1.as_ref(), &[1, 2, 3]);

        assert!(registry.revoke(&a));
        assert!(!registry.revoke(&a));
        assert!(registry.resolve(&a).is_none());
        assert_eq!(registry.live_count(), 1);
    }
}
