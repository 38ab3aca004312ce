//! The public operation surface: load files, resolve images, export, clear.
//!
//! Files are processed strictly one after another (decrypt, parse, index) so
//! peak memory stays bounded and progress is truthful. A failure on one file
//! is recorded and the remaining files are still loaded.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::cache::BundleCache;
use crate::common::{AssetInfo, AssetKey, AssetType, BundleId, RawFile};
use crate::config::ManagerConfig;
use crate::crypto::{self, DecryptionKey};
use crate::error::{AssetError, Result};
use crate::export::{ExportPipeline, ExportedFile, GroupingPolicy, Selection};
use crate::parser::{BundleParser, ParseOptions};
use crate::preview::{PreviewRegistry, PreviewUrl};
use crate::progress::{ExportProgressCallback, LoadProgress, LoadProgressCallback, LoadStage};
use crate::workers::ConversionPool;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadOptions {
    pub parse: ParseOptions,
    /// When set, files without a plain bundle signature are decrypted first.
    pub decryption: Option<DecryptionKey>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadError {
    pub name: String,
    pub error: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadReport {
    pub errors: Vec<LoadError>,
    pub infos: Vec<AssetInfo>,
    pub success_count: usize,
}

pub struct AssetManager {
    cache: Arc<BundleCache>,
    pipeline: ExportPipeline,
    config: ManagerConfig,
}

impl AssetManager {
    /// Builds a manager with its own conversion pool sized from `config`.
    pub fn new(parser: Arc<dyn BundleParser>, config: ManagerConfig) -> Self {
        let pool = Arc::new(ConversionPool::new(config.workers));
        Self::with_pool(parser, pool, config)
    }

    /// Builds a manager around an existing pool.
    pub fn with_pool(parser: Arc<dyn BundleParser>, pool: Arc<ConversionPool>, config: ManagerConfig) -> Self {
        let cache = Arc::new(BundleCache::new(parser, pool, PreviewRegistry::new()));
        let pipeline = ExportPipeline::new(Arc::clone(&cache), config.progress_interval());
        Self { cache, pipeline, config }
    }

    pub fn cache(&self) -> &Arc<BundleCache> {
        &self.cache
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Loads `files` one at a time. Never fails as a whole; per-file errors
    /// are collected in the report.
    pub async fn load_files(
        &self,
        files: Vec<RawFile>,
        options: &LoadOptions,
        on_progress: Option<&LoadProgressCallback>,
    ) -> LoadReport {
        let file_count = files.len();
        let mut report = LoadReport::default();

        for (file_index, file) in files.into_iter().enumerate() {
            let name = file.name.clone();
            let total_before = report.infos.len();
            let emit = |stage: LoadStage, total_asset_num: usize| {
                if let Some(cb) = on_progress {
                    cb(LoadProgress {
                        file_index,
                        file_count,
                        name: name.clone(),
                        stage,
                        total_asset_num,
                    });
                }
            };

            match self.load_one(file, options, |stage| emit(stage, total_before)).await {
                Ok(infos) => {
                    info!(file = %name, assets = infos.len(), "file loaded");
                    report.infos.extend(infos);
                    report.success_count += 1;
                }
                Err(e) => {
                    warn!(file = %name, error = %e, "file failed to load");
                    report.errors.push(LoadError {
                        name: name.clone(),
                        error: e.to_string(),
                    });
                }
            }
            emit(LoadStage::Done, report.infos.len());
        }
        report
    }

    async fn load_one<F>(&self, file: RawFile, options: &LoadOptions, emit: F) -> Result<Vec<AssetInfo>>
    where
        F: Fn(LoadStage),
    {
        emit(LoadStage::Reading);
        let RawFile { name, mut bytes } = file;

        if let Some(key) = &options.decryption {
            if !crypto::is_plain_bundle(&bytes) {
                emit(LoadStage::Decrypting);
                let key = key.clone();
                let cipher = self.config.cipher;
                bytes = run_blocking(move || crypto::decrypt(&bytes, &key.password, &key.salt, cipher)).await?;
            }
        }

        emit(LoadStage::Parsing);
        let cache = Arc::clone(&self.cache);
        let parse = options.parse.clone();
        let (id, bundle) = run_blocking(move || cache.load_bundle(&bytes, &parse)).await?;

        emit(LoadStage::Indexing);
        let cache = Arc::clone(&self.cache);
        run_blocking(move || Ok(cache.project_objects(&id, &bundle, &name))).await
    }

    /// Displayable reference for an image object, decoding on first request.
    pub async fn get_image_url(&self, file_id: &BundleId, path_id: i64) -> Option<PreviewUrl> {
        let key = AssetKey::new(file_id.clone(), path_id);
        self.cache.get_image(&key).await.map(|image| image.preview.clone())
    }

    pub async fn export_one(&self, file_id: &BundleId, path_id: i64) -> Option<ExportedFile> {
        self.pipeline.export_one(&AssetKey::new(file_id.clone(), path_id)).await
    }

    pub async fn export_many(
        &self,
        selections: &[Selection],
        grouping: GroupingPolicy,
        on_progress: &ExportProgressCallback,
    ) -> Result<Vec<u8>> {
        self.pipeline.export_many(selections, grouping, on_progress).await
    }

    /// Drops all bundles and images; previews are released once each.
    pub async fn clear(&self) {
        self.cache.clear().await;
        info!("asset cache cleared");
    }

    pub fn list_exportable_types() -> Vec<AssetType> {
        AssetType::EXPORTABLE.to_vec()
    }
}

/// Runs CPU-bound work off the async executor.
async fn run_blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| AssetError::Other(Box::new(e)))?
}
