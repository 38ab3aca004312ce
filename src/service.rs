//! Async message boundary in front of an [`AssetManager`].
//!
//! The manager lives inside a background task; callers hold an
//! [`AssetClient`] and talk to it through a channel. Requests carry owned
//! payloads and a oneshot reply, so nothing on the caller side ever borrows
//! cache-owned memory. Each request is handled on its own task, so a slow
//! export does not hold up image lookups.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::common::{AssetType, BundleId, RawFile};
use crate::error::{AssetError, Result};
use crate::export::{ExportedFile, GroupingPolicy, Selection};
use crate::manager::{AssetManager, LoadOptions, LoadReport};
use crate::preview::PreviewUrl;
use crate::progress::{ExportProgressCallback, LoadProgressCallback};

const QUEUE_DEPTH: usize = 64;

/// Message type sent from clients to the service task.
pub enum Request {
    LoadFiles {
        files: Vec<RawFile>,
        options: LoadOptions,
        progress: Option<Arc<LoadProgressCallback>>,
        reply: oneshot::Sender<LoadReport>,
    },
    GetImageUrl {
        file_id: BundleId,
        path_id: i64,
        reply: oneshot::Sender<Option<PreviewUrl>>,
    },
    ResolvePreview {
        url: PreviewUrl,
        reply: oneshot::Sender<Option<(String, Arc<[u8]>)>>,
    },
    ExportOne {
        file_id: BundleId,
        path_id: i64,
        reply: oneshot::Sender<Option<ExportedFile>>,
    },
    ExportMany {
        selections: Vec<Selection>,
        grouping: GroupingPolicy,
        progress: Arc<ExportProgressCallback>,
        reply: oneshot::Sender<Result<Vec<u8>>>,
    },
    Clear {
        reply: oneshot::Sender<()>,
    },
}

/// Starts the service task. It stops once every client has been dropped.
pub fn spawn(manager: AssetManager) -> (AssetClient, JoinHandle<()>) {
    let (sender, mut requests) = mpsc::channel::<Request>(QUEUE_DEPTH);
    let manager = Arc::new(manager);

    let handle = tokio::spawn(async move {
        while let Some(request) = requests.recv().await {
            let manager = Arc::clone(&manager);
            tokio::spawn(handle_request(manager, request));
        }
        debug!("asset service stopped");
    });

    (AssetClient { sender }, handle)
}

// Reply send failures mean the caller stopped waiting; the work still ran.
async fn handle_request(manager: Arc<AssetManager>, request: Request) {
    match request {
        Request::LoadFiles {
            files,
            options,
            progress,
            reply,
        } => {
            let report = manager.load_files(files, &options, progress.as_deref()).await;
            let _ = reply.send(report);
        }
        Request::GetImageUrl { file_id, path_id, reply } => {
            let _ = reply.send(manager.get_image_url(&file_id, path_id).await);
        }
        Request::ResolvePreview { url, reply } => {
            let _ = reply.send(manager.cache().previews().resolve(&url));
        }
        Request::ExportOne { file_id, path_id, reply } => {
            let _ = reply.send(manager.export_one(&file_id, path_id).await);
        }
        Request::ExportMany {
            selections,
            grouping,
            progress,
            reply,
        } => {
            let result = manager.export_many(&selections, grouping, &*progress).await;
            let _ = reply.send(result);
        }
        Request::Clear { reply } => {
            manager.clear().await;
            let _ = reply.send(());
        }
    }
}

/// Cloneable handle to a running service.
#[derive(Clone)]
pub struct AssetClient {
    sender: mpsc::Sender<Request>,
}

impl AssetClient {
    async fn call<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Request) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(build(reply))
            .await
            .map_err(|_| AssetError::ServiceClosed)?;
        response.await.map_err(|_| AssetError::ServiceClosed)
    }

    pub async fn load_files(
        &self,
        files: Vec<RawFile>,
        options: LoadOptions,
        progress: Option<Arc<LoadProgressCallback>>,
    ) -> Result<LoadReport> {
        self.call(|reply| Request::LoadFiles {
            files,
            options,
            progress,
            reply,
        })
        .await
    }

    pub async fn get_image_url(&self, file_id: BundleId, path_id: i64) -> Result<Option<PreviewUrl>> {
        self.call(|reply| Request::GetImageUrl { file_id, path_id, reply }).await
    }

    /// MIME type and bytes behind a preview reference, while it is live.
    pub async fn resolve_preview(&self, url: PreviewUrl) -> Result<Option<(String, Arc<[u8]>)>> {
        self.call(|reply| Request::ResolvePreview { url, reply }).await
    }

    pub async fn export_one(&self, file_id: BundleId, path_id: i64) -> Result<Option<ExportedFile>> {
        self.call(|reply| Request::ExportOne { file_id, path_id, reply }).await
    }

    pub async fn export_many(
        &self,
        selections: Vec<Selection>,
        grouping: GroupingPolicy,
        progress: Arc<ExportProgressCallback>,
    ) -> Result<Vec<u8>> {
        self.call(|reply| Request::ExportMany {
            selections,
            grouping,
            progress,
            reply,
        })
        .await?
    }

    pub async fn clear(&self) -> Result<()> {
        self.call(|reply| Request::Clear { reply }).await
    }

    /// Static list; answered locally without a round trip.
    pub fn list_exportable_types(&self) -> Vec<AssetType> {
        AssetManager::list_exportable_types()
    }
}
