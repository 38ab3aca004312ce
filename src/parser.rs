//! Seam to the bundle format parser.
//!
//! The binary object format is handled by an external library. The cache only
//! needs "bytes in, bundle out"; anything the parser reports as an error is
//! recorded against the offending file.

use serde::{Deserialize, Serialize};

use crate::common::Bundle;
use crate::error::Result;

/// Options forwarded verbatim to the parser.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParseOptions {
    /// Environment selector for the parser's built-in decryption variants.
    pub environment: Option<String>,
    /// Key selector for the parser's built-in decryption variants.
    pub key: Option<String>,
}

pub trait BundleParser: Send + Sync {
    fn parse(&self, bytes: &[u8], options: &ParseOptions) -> Result<Bundle>;
}

impl<F> BundleParser for F
where
    F: Fn(&[u8], &ParseOptions) -> Result<Bundle> + Send + Sync,
{
    fn parse(&self, bytes: &[u8], options: &ParseOptions) -> Result<Bundle> {
        self(bytes, options)
    }
}
