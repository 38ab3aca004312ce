//! # assetport Core Library
//!
//! Loads serialized game-asset bundles, indexes the objects they contain and
//! exports a selection of them to a zip archive.
//!
//! ## Key Modules
//!
//! - [`crypto`]: Key derivation and counter-mode decryption for the encrypted bundle variant.
//! - [`cache`]: Content-addressed bundle store and the per-object image cache.
//! - [`workers`]: The conversion pool that turns bitmaps into PNG bytes.
//! - [`export`]: Single-object export and the multi-phase archive export pipeline.
//! - [`manager`]: The public façade composing all of the above.
//! - [`service`]: Runs a manager behind an async message channel.
//!
//! ## Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use assetport::common::Bundle;
//! use assetport::config::ManagerConfig;
//! use assetport::manager::{AssetManager, LoadOptions};
//! use assetport::parser::ParseOptions;
//!
//! # async fn run() -> assetport::Result<()> {
//! let parser = |_: &[u8], _: &ParseOptions| -> assetport::Result<Bundle> { Ok(Bundle::default()) };
//! let manager = AssetManager::new(Arc::new(parser), ManagerConfig::default());
//! let files = vec![assetport::common::RawFile::new("level0.bundle", std::fs::read("level0.bundle")?)];
//! let report = manager.load_files(files, &LoadOptions::default(), None).await;
//! println!("{} assets", report.infos.len());
//! # Ok(())
//! # }
//! ```

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod archive;
pub mod cache;
pub mod cli;
pub mod cli_runner;
pub mod common;
pub mod config;
pub mod crypto;
pub mod error;
pub mod export;
pub mod manager;
pub mod parser;
pub mod preview;
pub mod progress;
pub mod service;
pub mod tracked;
pub mod workers;

pub use error::{AssetError, Result};

/// Locks a std mutex, recovering the guard if a panicking thread poisoned it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
