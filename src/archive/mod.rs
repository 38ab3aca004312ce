//! # Export Archive
//!
//! Zip output for multi-object exports. Entries are staged as they arrive
//! from the export pipeline (in completion order) and written out when the
//! archive is finalized, which reports progress once per entry.
//!
//! Writing the same path twice replaces the earlier entry in place: last
//! write wins, the archive never holds duplicate names.

use std::collections::HashMap;
use std::io::{Cursor, Write};

use tracing::debug;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::Result;

/// Extensions whose payload is already compressed; stored without deflate.
const STORED_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// A writer responsible for assembling the export archive in memory.
#[derive(Default)]
pub struct ArchiveWriter {
    entries: Vec<(String, Vec<u8>)>,
    positions: HashMap<String, usize>,
}

impl ArchiveWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages `bytes` under `path`, replacing any earlier entry with the same path.
    pub fn add(&mut self, path: impl Into<String>, bytes: Vec<u8>) {
        let path = path.into();
        match self.positions.get(&path) {
            Some(&idx) => {
                debug!(%path, "archive entry overwritten");
                self.entries[idx].1 = bytes;
            }
            None => {
                self.positions.insert(path.clone(), self.entries.len());
                self.entries.push((path, bytes));
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Writes all staged entries and the central directory.
    ///
    /// `on_entry(done, total)` is called after each entry is written.
    pub fn finish<F>(self, mut on_entry: F) -> Result<Vec<u8>>
    where
        F: FnMut(usize, usize),
    {
        let total = self.entries.len();
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

        for (done, (path, bytes)) in self.entries.into_iter().enumerate() {
            zip.start_file(path.as_str(), options_for(&path))?;
            zip.write_all(&bytes)?;
            on_entry(done + 1, total);
        }

        let out = zip.finish()?.into_inner();
        debug!(entries = total, bytes = out.len(), "archive finalized");
        Ok(out)
    }
}

fn options_for(path: &str) -> FileOptions {
    let stored = path
        .rsplit_once('.')
        .map(|(_, ext)| STORED_EXTENSIONS.iter().any(|s| ext.eq_ignore_ascii_case(s)))
        .unwrap_or(false);
    let method = if stored {
        CompressionMethod::Stored
    } else {
        CompressionMethod::Deflated
    };
    FileOptions::default().compression_method(method)
}
