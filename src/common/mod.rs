//! Common types shared by the cache, export pipeline and façade.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A file handed to [`load_files`](crate::manager::AssetManager::load_files).
/// Consumed once per load call.
#[derive(Debug, Clone)]
pub struct RawFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl RawFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

/// Content hash of a bundle's raw bytes (blake3, lowercase hex).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BundleId(String);

impl BundleId {
    pub fn of(bytes: &[u8]) -> Self {
        Self(blake3::hash(bytes).to_hex().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BundleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Universal cache/export key: one object inside one bundle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetKey {
    pub bundle: BundleId,
    pub path_id: i64,
}

impl AssetKey {
    pub fn new(bundle: BundleId, path_id: i64) -> Self {
        Self { bundle, path_id }
    }
}

impl fmt::Display for AssetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.bundle, self.path_id)
    }
}

/// Type tag of an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetType {
    TextAsset,
    Sprite,
    SpriteAtlas,
    Texture2D,
    Other,
}

impl AssetType {
    pub const DISPLAYABLE: [AssetType; 4] = [
        AssetType::TextAsset,
        AssetType::Sprite,
        AssetType::SpriteAtlas,
        AssetType::Texture2D,
    ];

    /// Sprite atlases are shown but cannot be exported.
    pub const EXPORTABLE: [AssetType; 3] = [AssetType::TextAsset, AssetType::Sprite, AssetType::Texture2D];

    pub fn is_displayable(self) -> bool {
        !matches!(self, AssetType::Other)
    }

    pub fn is_exportable(self) -> bool {
        matches!(self, AssetType::TextAsset | AssetType::Sprite | AssetType::Texture2D)
    }

    pub fn name(self) -> &'static str {
        match self {
            AssetType::TextAsset => "TextAsset",
            AssetType::Sprite => "Sprite",
            AssetType::SpriteAtlas => "SpriteAtlas",
            AssetType::Texture2D => "Texture2D",
            AssetType::Other => "Other",
        }
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A decoded RGBA8 bitmap, row-major, `width * height * 4` bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

/// Capability to produce a decoded bitmap; implemented by the bundle parser.
///
/// `Ok(None)` means the object has no pixel data.
pub trait BitmapSource: Send + Sync {
    fn decode(&self) -> Result<Option<Bitmap>>;
}

pub type Dumper = Box<dyn Fn() -> String + Send + Sync>;

/// Type-specific payload of an object.
#[derive(Clone)]
pub enum AssetKind {
    TextAsset { script: Vec<u8> },
    Sprite(Arc<dyn BitmapSource>),
    SpriteAtlas(Arc<dyn BitmapSource>),
    Texture2D(Arc<dyn BitmapSource>),
    Other { type_name: String },
}

impl AssetKind {
    pub fn asset_type(&self) -> AssetType {
        match self {
            AssetKind::TextAsset { .. } => AssetType::TextAsset,
            AssetKind::Sprite(_) => AssetType::Sprite,
            AssetKind::SpriteAtlas(_) => AssetType::SpriteAtlas,
            AssetKind::Texture2D(_) => AssetType::Texture2D,
            AssetKind::Other { .. } => AssetType::Other,
        }
    }

    /// The bitmap capability for image-bearing kinds.
    pub fn bitmap_source(&self) -> Option<&Arc<dyn BitmapSource>> {
        match self {
            AssetKind::Sprite(src) | AssetKind::SpriteAtlas(src) | AssetKind::Texture2D(src) => Some(src),
            AssetKind::TextAsset { .. } | AssetKind::Other { .. } => None,
        }
    }
}

/// One object inside a parsed bundle. Read-only once constructed.
pub struct AssetObject {
    pub name: String,
    pub path_id: i64,
    pub size: u64,
    pub kind: AssetKind,
    dumper: Option<Dumper>,
    dump: OnceLock<Option<String>>,
}

impl AssetObject {
    pub fn new(name: impl Into<String>, path_id: i64, size: u64, kind: AssetKind) -> Self {
        Self {
            name: name.into(),
            path_id,
            size,
            kind,
            dumper: None,
            dump: OnceLock::new(),
        }
    }

    /// Attach the function that renders the structured dump on first request.
    pub fn with_dumper(mut self, dumper: impl Fn() -> String + Send + Sync + 'static) -> Self {
        self.dumper = Some(Box::new(dumper));
        self
    }

    pub fn asset_type(&self) -> AssetType {
        self.kind.asset_type()
    }

    /// Structured dump, computed once.
    pub fn dump(&self) -> Option<&str> {
        self.dump
            .get_or_init(|| self.dumper.as_ref().map(|render| render()))
            .as_deref()
    }

    /// Script text of a `TextAsset`, decoded as UTF-8 (lossy).
    pub fn text(&self) -> Option<String> {
        match &self.kind {
            AssetKind::TextAsset { script } => Some(String::from_utf8_lossy(script).into_owned()),
            _ => None,
        }
    }
}

impl fmt::Debug for AssetObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssetObject")
            .field("name", &self.name)
            .field("path_id", &self.path_id)
            .field("size", &self.size)
            .field("type", &self.asset_type())
            .finish()
    }
}

/// A parsed bundle: ordered objects plus the container-path lookup.
#[derive(Debug, Default)]
pub struct Bundle {
    pub objects: Vec<AssetObject>,
    pub containers: HashMap<i64, String>,
}

impl Bundle {
    pub fn object(&self, path_id: i64) -> Option<&AssetObject> {
        self.objects.iter().find(|o| o.path_id == path_id)
    }

    pub fn container(&self, path_id: i64) -> &str {
        self.containers.get(&path_id).map(String::as_str).unwrap_or("")
    }
}

/// Tri-state decoded data of an [`AssetInfo`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "camelCase")]
pub enum AssetData {
    /// Not loaded yet.
    #[default]
    Absent,
    /// A load was attempted and failed.
    Failed,
    /// Text content or a displayable image reference.
    Loaded(String),
}

/// External-facing projection of one object.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetInfo {
    pub key: AssetKey,
    pub file_id: BundleId,
    pub file_name: String,
    pub name: String,
    pub container: String,
    #[serde(rename = "type")]
    pub asset_type: AssetType,
    pub path_id: i64,
    pub size: u64,
    pub dump: Option<String>,
    pub data: AssetData,
    pub search: String,
}

impl AssetInfo {
    pub fn search_key(name: &str, container: &str) -> String {
        if container.is_empty() {
            name.to_lowercase()
        } else {
            format!("{name}\n{container}").to_lowercase()
        }
    }
}
