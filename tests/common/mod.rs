//! Shared fixtures: a line-based stand-in for the bundle parser.
//!
//! A fixture bundle is UTF-8 text. The first line is the `UnityFS` signature,
//! every following line describes one object:
//!
//! ```text
//! <Type>|<name>|<path_id>|<container>|<payload>
//! ```
//!
//! Text payloads are the script itself. Image payloads are `WxH`, `empty`
//! (no bitmap), `broken` (decode error) or `short` (a 4x4 bitmap with too few
//! pixel bytes, which decodes but cannot be encoded).

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use assetport::common::{AssetKind, AssetObject, Bitmap, BitmapSource, Bundle};
use assetport::config::ManagerConfig;
use assetport::manager::AssetManager;
use assetport::parser::{BundleParser, ParseOptions};
use assetport::{AssetError, Result};

pub const DECODE_DELAY: Duration = Duration::from_millis(20);

struct FixtureBitmap {
    payload: String,
    decodes: Arc<AtomicUsize>,
}

impl BitmapSource for FixtureBitmap {
    fn decode(&self) -> Result<Option<Bitmap>> {
        self.decodes.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(DECODE_DELAY);
        match self.payload.as_str() {
            "broken" => Err(AssetError::Decode("corrupt texture".into())),
            "empty" => Ok(None),
            "short" => Ok(Some(Bitmap {
                width: 4,
                height: 4,
                rgba: vec![0; 3],
            })),
            dims => {
                let (w, h) = dims
                    .split_once('x')
                    .and_then(|(w, h)| Some((w.parse::<u32>().ok()?, h.parse::<u32>().ok()?)))
                    .ok_or_else(|| AssetError::Decode(format!("bad fixture dims {dims}")))?;
                Ok(Some(Bitmap {
                    width: w,
                    height: h,
                    rgba: vec![0x40; (w * h * 4) as usize],
                }))
            }
        }
    }
}

struct FixtureParser {
    parses: Arc<AtomicUsize>,
    decodes: Arc<AtomicUsize>,
}

impl BundleParser for FixtureParser {
    fn parse(&self, bytes: &[u8], _options: &ParseOptions) -> Result<Bundle> {
        self.parses.fetch_add(1, Ordering::SeqCst);
        let text = std::str::from_utf8(bytes).map_err(|e| AssetError::Parse(e.to_string()))?;
        let mut lines = text.lines();
        if lines.next() != Some("UnityFS") {
            return Err(AssetError::Parse("missing bundle signature".into()));
        }

        let mut bundle = Bundle::default();
        for line in lines.filter(|l| !l.trim().is_empty()) {
            let fields: Vec<&str> = line.splitn(5, '|').collect();
            let [ty, name, path_id, container, payload] = fields[..] else {
                return Err(AssetError::Parse(format!("bad object line: {line}")));
            };
            let path_id: i64 = path_id.parse().map_err(|_| AssetError::Parse(format!("bad path id: {path_id}")))?;
            let source = || -> Arc<dyn BitmapSource> {
                Arc::new(FixtureBitmap {
                    payload: payload.to_string(),
                    decodes: Arc::clone(&self.decodes),
                })
            };
            let kind = match ty {
                "TextAsset" => AssetKind::TextAsset {
                    script: payload.as_bytes().to_vec(),
                },
                "Sprite" => AssetKind::Sprite(source()),
                "SpriteAtlas" => AssetKind::SpriteAtlas(source()),
                "Texture2D" => AssetKind::Texture2D(source()),
                other => AssetKind::Other {
                    type_name: other.to_string(),
                },
            };
            let dump_name = name.to_string();
            bundle.objects.push(
                AssetObject::new(name, path_id, payload.len() as u64, kind)
                    .with_dumper(move || format!("{{ \"m_Name\": \"{dump_name}\" }}")),
            );
            if !container.is_empty() {
                bundle.containers.insert(path_id, container.to_string());
            }
        }
        Ok(bundle)
    }
}

pub struct Fixture {
    pub parses: Arc<AtomicUsize>,
    pub decodes: Arc<AtomicUsize>,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            parses: Arc::new(AtomicUsize::new(0)),
            decodes: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn parser(&self) -> Arc<dyn BundleParser> {
        Arc::new(FixtureParser {
            parses: Arc::clone(&self.parses),
            decodes: Arc::clone(&self.decodes),
        })
    }

    pub fn manager(&self) -> AssetManager {
        let config = ManagerConfig {
            workers: 2,
            ..ManagerConfig::default()
        };
        AssetManager::new(self.parser(), config)
    }

    pub fn parses(&self) -> usize {
        self.parses.load(Ordering::SeqCst)
    }

    pub fn decodes(&self) -> usize {
        self.decodes.load(Ordering::SeqCst)
    }
}

pub fn bundle_bytes(objects: &[&str]) -> Vec<u8> {
    let mut text = String::from("UnityFS\n");
    for line in objects {
        text.push_str(line);
        text.push('\n');
    }
    text.into_bytes()
}

/// The standard mixed bundle used by most tests.
pub fn sample_bundle() -> Vec<u8> {
    bundle_bytes(&[
        "TextAsset|readme|1|assets/docs/readme.txt|hello bundle",
        "Sprite|hero|2|assets/chars/hero.png|4x4",
        "Texture2D|sky|3||8x2",
        "SpriteAtlas|atlas|4|assets/ui/atlas.spriteatlas|2x2",
        "Mesh|body|5||",
        "Sprite|ghost|6||broken",
    ])
}
