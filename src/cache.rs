//! Content-addressed bundle store and the derived per-object image cache.
//!
//! Bundles are keyed by the blake3 hash of their raw bytes, so the same
//! content loaded under two file names is parsed once. Images are keyed by
//! [`AssetKey`] and stored as [`TrackedResult`]s that are published before the
//! decode starts: at most one decode per key is ever in flight.
//!
//! A decode failure settles the entry as `None` and stays cached for the rest
//! of the session. Clearing the cache is the only way to retry. An object that
//! turns out to have no bitmap is not a failure: its entry is dropped from the
//! index again, so it keeps projecting as not loaded.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::common::{AssetData, AssetInfo, AssetKey, BitmapSource, Bundle, BundleId};
use crate::error::{AssetError, Result};
use crate::lock;
use crate::parser::{BundleParser, ParseOptions};
use crate::preview::{PreviewRegistry, PreviewUrl};
use crate::tracked::TrackedResult;
use crate::workers::ConversionPool;

pub const PNG_MIME: &str = "image/png";

/// An encoded image plus the displayable reference minted for it.
#[derive(Debug)]
pub struct ImageResult {
    pub bytes: Arc<[u8]>,
    pub preview: PreviewUrl,
}

/// `None` once settled means no image could be produced.
pub type ImageEntry = TrackedResult<Option<Arc<ImageResult>>>;

enum Decoded {
    Image(Arc<ImageResult>),
    NoBitmap,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub bundles: usize,
    pub images: usize,
    pub settled_images: usize,
}

pub struct BundleCache {
    parser: Arc<dyn BundleParser>,
    pool: Arc<ConversionPool>,
    previews: Arc<PreviewRegistry>,
    bundles: Mutex<HashMap<BundleId, Arc<Bundle>>>,
    images: Mutex<HashMap<AssetKey, ImageEntry>>,
}

impl BundleCache {
    pub fn new(parser: Arc<dyn BundleParser>, pool: Arc<ConversionPool>, previews: Arc<PreviewRegistry>) -> Self {
        Self {
            parser,
            pool,
            previews,
            bundles: Mutex::new(HashMap::new()),
            images: Mutex::new(HashMap::new()),
        }
    }

    pub fn pool(&self) -> &Arc<ConversionPool> {
        &self.pool
    }

    pub fn previews(&self) -> &Arc<PreviewRegistry> {
        &self.previews
    }

    /// Returns the bundle for `bytes`, parsing only if this content was never seen.
    pub fn load_bundle(&self, bytes: &[u8], options: &ParseOptions) -> Result<(BundleId, Arc<Bundle>)> {
        let id = BundleId::of(bytes);
        if let Some(bundle) = lock(&self.bundles).get(&id) {
            debug!(bundle = %id, "bundle already cached");
            return Ok((id, Arc::clone(bundle)));
        }

        let parsed = self.parser.parse(bytes, options).map_err(|e| match e {
            AssetError::Parse(_) => e,
            other => AssetError::Parse(other.to_string()),
        })?;

        let mut bundles = lock(&self.bundles);
        // A concurrent load of identical bytes may have won the race.
        let bundle = bundles.entry(id.clone()).or_insert_with(|| Arc::new(parsed));
        Ok((id, Arc::clone(bundle)))
    }

    pub fn bundle(&self, id: &BundleId) -> Option<Arc<Bundle>> {
        lock(&self.bundles).get(id).cloned()
    }

    /// Builds one [`AssetInfo`] per displayable object. Objects are processed in
    /// parallel; the returned order matches the bundle's object order.
    pub fn project_objects(&self, id: &BundleId, bundle: &Bundle, file_name: &str) -> Vec<AssetInfo> {
        bundle
            .objects
            .par_iter()
            .filter(|obj| obj.asset_type().is_displayable())
            .map(|obj| {
                let key = AssetKey::new(id.clone(), obj.path_id);
                let container = bundle.container(obj.path_id).to_string();
                let data = match obj.text() {
                    Some(text) => AssetData::Loaded(text),
                    None => self.cached_data(&key),
                };
                AssetInfo {
                    search: AssetInfo::search_key(&obj.name, &container),
                    file_id: id.clone(),
                    file_name: file_name.to_string(),
                    name: obj.name.clone(),
                    container,
                    asset_type: obj.asset_type(),
                    path_id: obj.path_id,
                    size: obj.size,
                    dump: obj.dump().map(str::to_string),
                    data,
                    key,
                }
            })
            .collect()
    }

    fn cached_data(&self, key: &AssetKey) -> AssetData {
        match lock(&self.images).get(key) {
            Some(entry) if entry.is_settled() => match entry.peek().flatten() {
                Some(image) => AssetData::Loaded(image.preview.to_string()),
                None => AssetData::Failed,
            },
            _ => AssetData::Absent,
        }
    }

    /// The image entry for `key` if one was already published.
    pub fn cached_image(&self, key: &AssetKey) -> Option<ImageEntry> {
        lock(&self.images).get(key).cloned()
    }

    /// Returns the shared entry for `key`, starting a decode if none exists.
    ///
    /// `None` when the key does not name an image-bearing object. Must be
    /// called inside a tokio runtime; the decode runs to completion even if
    /// every caller stops waiting.
    pub fn image_entry(self: &Arc<Self>, key: &AssetKey) -> Option<ImageEntry> {
        let mut images = lock(&self.images);
        if let Some(existing) = images.get(key) {
            return Some(existing.clone());
        }

        let bundle = self.bundle(&key.bundle)?;
        let source = Arc::clone(bundle.object(key.path_id)?.kind.bitmap_source()?);

        let (entry, settler) = ImageEntry::pending();
        images.insert(key.clone(), entry.clone());
        drop(images);

        let cache = Arc::clone(self);
        let key = key.clone();
        let published = entry.clone();
        tokio::spawn(async move {
            match cache.decode_image(key.clone(), source).await {
                Decoded::Image(image) => settler.settle(Some(image)),
                Decoded::Failed => settler.settle(None),
                Decoded::NoBitmap => {
                    // Unpublish before settling so no projection reports it as failed.
                    let mut images = lock(&cache.images);
                    if images.get(&key).is_some_and(|e| e.same_as(&published)) {
                        images.remove(&key);
                    }
                    drop(images);
                    settler.settle(None);
                }
            }
        });
        Some(entry)
    }

    /// Resolves the image for `key`; `None` if it is not an image or failed to decode.
    pub async fn get_image(self: &Arc<Self>, key: &AssetKey) -> Option<Arc<ImageResult>> {
        self.image_entry(key)?.wait().await.flatten()
    }

    async fn decode_image(&self, key: AssetKey, source: Arc<dyn BitmapSource>) -> Decoded {
        let bitmap = match tokio::task::spawn_blocking(move || source.decode()).await {
            Ok(Ok(Some(bitmap))) => bitmap,
            Ok(Ok(None)) => {
                debug!(%key, "object has no bitmap");
                return Decoded::NoBitmap;
            }
            Ok(Err(e)) => {
                warn!(%key, error = %e, "bitmap decode failed");
                return Decoded::Failed;
            }
            Err(e) => {
                warn!(%key, error = %e, "bitmap decode task panicked");
                return Decoded::Failed;
            }
        };

        match self.pool.convert(key.clone(), bitmap).await {
            Ok(png) => {
                let bytes: Arc<[u8]> = png.into();
                let preview = self.previews.mint(PNG_MIME, Arc::clone(&bytes));
                Decoded::Image(Arc::new(ImageResult { bytes, preview }))
            }
            Err(e) => {
                warn!(%key, error = %e, "image conversion failed");
                Decoded::Failed
            }
        }
    }

    /// Drops every bundle and image entry, releasing each minted preview once.
    /// Pending entries are awaited before their preview is released.
    pub async fn clear(&self) {
        let entries: Vec<ImageEntry> = lock(&self.images).drain().map(|(_, entry)| entry).collect();
        lock(&self.bundles).clear();
        debug!(images = entries.len(), "clearing cache");

        for entry in entries {
            if let Some(image) = entry.wait().await.flatten() {
                self.previews.revoke(&image.preview);
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        let images = lock(&self.images);
        CacheStats {
            bundles: lock(&self.bundles).len(),
            images: images.len(),
            settled_images: images.values().filter(|e| e.is_settled()).count(),
        }
    }
}
