//! Single-object export and the multi-phase archive export.
//!
//! `export_many` runs in three phases:
//!
//! 1. **Preparing**: split the selection into images that already have a cache
//!    entry, images that still need converting, and text. Bitmaps for the
//!    second group are decoded here. Progress is throttled, with one closing
//!    event at 100 % if the last item was throttled away.
//! 2. **Converting**: cached images are copied straight into the archive while
//!    the rest go through the conversion pool as one batch. Both paths share
//!    one counter; text counts as a single final step on it.
//! 3. **Archiving**: the archive is finalized with per-entry progress.
//!
//! Images converted during an export are not added to the image cache, and
//! they bypass its per-key dedup: an export racing a `get_image` for the same
//! object may decode that bitmap twice.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::archive::ArchiveWriter;
use crate::cache::{BundleCache, ImageEntry, PNG_MIME};
use crate::common::{AssetKey, AssetKind, AssetType, BundleId};
use crate::error::Result;
use crate::lock;
use crate::progress::{ExportPhase, ExportProgress, ExportProgressCallback, StepCounter, Throttle};
use crate::workers::ConversionTask;

pub const TEXT_MIME: &str = "text/plain";

/// How entries are laid out inside the export archive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GroupingPolicy {
    /// Flat: `<name>.<ext>`.
    #[default]
    None,
    /// `<Type>/<name>.<ext>`.
    ByTypeName,
    /// `<originFileName>/<name>.<ext>`.
    BySourceFile,
    /// The container path verbatim; flat naming when it is empty.
    ByContainerPath,
}

/// One object picked for a multi-object export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    pub file_id: BundleId,
    pub path_id: i64,
    pub origin_file_name: String,
    pub container_path: String,
}

/// A single exported object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedFile {
    pub name: String,
    pub mime_type: &'static str,
    pub bytes: Vec<u8>,
}

fn extension(asset_type: AssetType) -> &'static str {
    match asset_type {
        AssetType::TextAsset => "txt",
        _ => "png",
    }
}

/// Path of an object inside the export archive.
pub fn archive_path(
    grouping: GroupingPolicy,
    asset_type: AssetType,
    name: &str,
    origin_file_name: &str,
    container_path: &str,
) -> String {
    let file = format!("{name}.{}", extension(asset_type));
    match grouping {
        GroupingPolicy::None => file,
        GroupingPolicy::ByTypeName => format!("{asset_type}/{file}"),
        GroupingPolicy::BySourceFile => format!("{origin_file_name}/{file}"),
        GroupingPolicy::ByContainerPath if !container_path.is_empty() => container_path.to_string(),
        GroupingPolicy::ByContainerPath => file,
    }
}

pub struct ExportPipeline {
    cache: Arc<BundleCache>,
    emit_interval: Duration,
}

impl ExportPipeline {
    pub fn new(cache: Arc<BundleCache>, emit_interval: Duration) -> Self {
        Self { cache, emit_interval }
    }

    /// Exports one object. `None` if it is missing or not an exportable type.
    pub async fn export_one(&self, key: &AssetKey) -> Option<ExportedFile> {
        let bundle = self.cache.bundle(&key.bundle)?;
        let object = bundle.object(key.path_id)?;
        let name = object.name.clone();

        match &object.kind {
            AssetKind::TextAsset { script } => Some(ExportedFile {
                name: format!("{name}.txt"),
                mime_type: TEXT_MIME,
                bytes: String::from_utf8_lossy(script).into_owned().into_bytes(),
            }),
            AssetKind::Sprite(_) | AssetKind::Texture2D(_) => {
                let image = self.cache.get_image(key).await?;
                Some(ExportedFile {
                    name: format!("{name}.png"),
                    mime_type: PNG_MIME,
                    bytes: image.bytes.to_vec(),
                })
            }
            AssetKind::SpriteAtlas(_) | AssetKind::Other { .. } => None,
        }
    }

    /// Exports `selections` into a zip archive and returns its bytes.
    ///
    /// Objects that are missing, not exportable or fail to convert are skipped;
    /// only a fault in the archive writer is returned as an error.
    pub async fn export_many(
        &self,
        selections: &[Selection],
        grouping: GroupingPolicy,
        on_progress: &ExportProgressCallback,
    ) -> Result<Vec<u8>> {
        info!(selected = selections.len(), ?grouping, "export started");

        // --- Preparing ---
        let throttle = Throttle::new(self.emit_interval);
        let mut cached: Vec<(String, ImageEntry)> = Vec::new();
        let mut to_convert: Vec<ConversionTask> = Vec::new();
        let mut convert_paths: HashMap<AssetKey, Vec<String>> = HashMap::new();
        let mut texts: Vec<(String, String)> = Vec::new();

        let mut reported = 0;
        for (idx, selection) in selections.iter().enumerate() {
            self.prepare(selection, grouping, &mut cached, &mut to_convert, &mut convert_paths, &mut texts)
                .await;
            if throttle.ready() {
                reported = idx + 1;
                on_progress(ExportProgress::new(ExportPhase::Preparing, reported, selections.len()));
            }
        }
        if reported < selections.len() {
            on_progress(ExportProgress::new(ExportPhase::Preparing, selections.len(), selections.len()));
        }

        // --- Converting ---
        let steps = StepCounter::new(cached.len() + to_convert.len() + usize::from(!texts.is_empty()));
        let archive = Mutex::new(ArchiveWriter::new());
        on_progress(ExportProgress::new(ExportPhase::Converting, 0, steps.total()));
        debug!(
            cached = cached.len(),
            converting = to_convert.len(),
            texts = texts.len(),
            "export prepared"
        );

        let fast_path = async {
            let mut pending = JoinSet::new();
            for (path, entry) in cached {
                pending.spawn(async move { (path, entry.wait().await.flatten()) });
            }
            while let Some(joined) = pending.join_next().await {
                match joined {
                    Ok((path, Some(image))) => lock(&archive).add(path, image.bytes.to_vec()),
                    Ok((path, None)) => warn!(%path, "cached image unavailable, skipped"),
                    Err(e) => warn!(error = %e, "cached image task failed"),
                }
                on_progress(steps.step(ExportPhase::Converting));
            }
        };

        let slow_path = self.cache.pool().add_tasks(to_convert, |key, result| {
            let paths = convert_paths.remove(&key).unwrap_or_default();
            match result {
                Ok(png) => {
                    let mut archive = lock(&archive);
                    for path in paths {
                        archive.add(path, png.clone());
                    }
                }
                Err(e) => warn!(%key, error = %e, "conversion failed, skipped"),
            }
            on_progress(steps.step(ExportPhase::Converting));
        });

        tokio::join!(fast_path, slow_path);

        // --- Archiving ---
        let mut archive = archive.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner());
        if !texts.is_empty() {
            for (path, text) in texts {
                archive.add(path, text.into_bytes());
            }
            on_progress(steps.step(ExportPhase::Converting));
        }

        let entries = archive.len();
        let bytes = archive.finish(|done, total| {
            on_progress(ExportProgress::new(ExportPhase::Archiving, done, total));
        })?;
        if entries == 0 {
            on_progress(ExportProgress::new(ExportPhase::Archiving, 0, 0));
        }

        info!(entries, bytes = bytes.len(), "export finished");
        Ok(bytes)
    }

    async fn prepare(
        &self,
        selection: &Selection,
        grouping: GroupingPolicy,
        cached: &mut Vec<(String, ImageEntry)>,
        to_convert: &mut Vec<ConversionTask>,
        convert_paths: &mut HashMap<AssetKey, Vec<String>>,
        texts: &mut Vec<(String, String)>,
    ) {
        let key = AssetKey::new(selection.file_id.clone(), selection.path_id);
        let Some(bundle) = self.cache.bundle(&key.bundle) else {
            warn!(%key, "selected bundle is not loaded");
            return;
        };
        let Some(object) = bundle.object(key.path_id) else {
            warn!(%key, "selected object does not exist");
            return;
        };
        let asset_type = object.asset_type();
        if !asset_type.is_exportable() {
            debug!(%key, %asset_type, "not exportable, skipped");
            return;
        }

        let path = archive_path(
            grouping,
            asset_type,
            &object.name,
            &selection.origin_file_name,
            &selection.container_path,
        );

        if let Some(text) = object.text() {
            texts.push((path, text));
            return;
        }
        if let Some(entry) = self.cache.cached_image(&key) {
            cached.push((path, entry));
            return;
        }
        if let Some(paths) = convert_paths.get_mut(&key) {
            paths.push(path);
            return;
        }
        let Some(source) = object.kind.bitmap_source().cloned() else {
            return;
        };

        match tokio::task::spawn_blocking(move || source.decode()).await {
            Ok(Ok(Some(bitmap))) => {
                convert_paths.insert(key.clone(), vec![path]);
                to_convert.push(ConversionTask { key, bitmap });
            }
            Ok(Ok(None)) => debug!(%key, "object has no bitmap, skipped"),
            Ok(Err(e)) => warn!(%key, error = %e, "bitmap decode failed, skipped"),
            Err(e) => warn!(%key, error = %e, "bitmap decode task panicked"),
        }
    }
}
