//! Fixed-size pool of conversion workers.
//!
//! Workers are plain OS threads pulling jobs from one shared crossbeam
//! channel, so dequeue is serialised by the channel itself. Each batch gets its
//! own completion channel; the caller drains it, invoking the per-task callback
//! in completion order, and the batch is finished once every job's sender
//! clone has been dropped.

use std::io::Cursor;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Sender};
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::common::{AssetKey, Bitmap};
use crate::error::{AssetError, Result};

/// One bitmap to encode.
pub struct ConversionTask {
    pub key: AssetKey,
    pub bitmap: Bitmap,
}

type Reply = mpsc::UnboundedSender<(AssetKey, Result<Vec<u8>>)>;

struct Job {
    key: AssetKey,
    bitmap: Bitmap,
    reply: Reply,
}

pub struct ConversionPool {
    sender: Option<Sender<Job>>,
    handles: Vec<JoinHandle<()>>,
}

impl ConversionPool {
    /// Spawns `workers` threads; `0` means one per logical CPU.
    pub fn new(workers: usize) -> Self {
        let num_workers = if workers == 0 { num_cpus::get() } else { workers }.max(1);
        let (sender, receiver) = unbounded::<Job>();

        let handles = (0..num_workers)
            .map(|id| {
                let receiver = receiver.clone();
                thread::Builder::new()
                    .name(format!("assetport-convert-{id}"))
                    .spawn(move || {
                        for job in receiver {
                            let result = panic::catch_unwind(AssertUnwindSafe(|| encode_png(&job.bitmap)))
                                .unwrap_or_else(|_| Err(AssetError::PoolTask("encoder panicked".into())));
                            if let Err(e) = &result {
                                warn!(key = %job.key, error = %e, "conversion task failed");
                            }
                            // The batch may have been abandoned by its caller.
                            let _ = job.reply.send((job.key, result));
                        }
                    })
            })
            .filter_map(|spawned| match spawned {
                Ok(handle) => Some(handle),
                Err(e) => {
                    warn!(error = %e, "failed to spawn conversion worker");
                    None
                }
            })
            .collect::<Vec<_>>();

        debug!(workers = handles.len(), "conversion pool started");
        Self {
            sender: Some(sender),
            handles,
        }
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Dispatches `tasks` and calls `on_each` once per task as results arrive.
    /// Resolves when every callback has run; returns the number of tasks handled.
    pub async fn add_tasks<F>(&self, tasks: Vec<ConversionTask>, mut on_each: F) -> usize
    where
        F: FnMut(AssetKey, Result<Vec<u8>>),
    {
        if tasks.is_empty() {
            return 0;
        }
        let (reply, mut results) = mpsc::unbounded_channel();
        let mut handled = 0;

        for ConversionTask { key, bitmap } in tasks {
            let job = Job {
                key,
                bitmap,
                reply: reply.clone(),
            };
            let rejected = match (&self.sender, self.handles.is_empty()) {
                (Some(sender), false) => sender.send(job).err().map(|e| e.into_inner()),
                _ => Some(job),
            };
            if let Some(job) = rejected {
                on_each(job.key, Err(AssetError::PoolTask("conversion pool is shut down".into())));
                handled += 1;
            }
        }
        drop(reply);

        while let Some((key, result)) = results.recv().await {
            on_each(key, result);
            handled += 1;
        }
        handled
    }

    /// Convenience wrapper for a single bitmap.
    pub async fn convert(&self, key: AssetKey, bitmap: Bitmap) -> Result<Vec<u8>> {
        let mut out = None;
        self.add_tasks(vec![ConversionTask { key, bitmap }], |_, result| out = Some(result))
            .await;
        out.unwrap_or_else(|| Err(AssetError::PoolTask("conversion produced no result".into())))
    }
}

impl Drop for ConversionPool {
    fn drop(&mut self) {
        // Closing the queue ends each worker's receive loop.
        self.sender.take();
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                warn!("conversion worker panicked during shutdown");
            }
        }
        debug!("conversion pool stopped");
    }
}

/// Encodes an RGBA8 bitmap as PNG.
pub fn encode_png(bitmap: &Bitmap) -> Result<Vec<u8>> {
    let expected = bitmap.width as usize * bitmap.height as usize * 4;
    if bitmap.width == 0 || bitmap.height == 0 || bitmap.rgba.len() != expected {
        return Err(AssetError::PoolTask(format!(
            "bitmap {}x{} has {} bytes, expected {}",
            bitmap.width,
            bitmap.height,
            bitmap.rgba.len(),
            expected
        )));
    }
    let mut buf = Cursor::new(Vec::with_capacity(expected / 2));
    PngEncoder::new(&mut buf).write_image(&bitmap.rgba, bitmap.width, bitmap.height, ExtendedColorType::Rgba8)?;
    Ok(buf.into_inner())
}
