// config.rs — camera/render defaults, asset base path and the scene file
//
// Scene file selection:
// - CLI: --scene <path>
// - Env: VR_TAGS_SCENE
// - Default: assets/scene.json, then the built-in demo scene
//
// Asset paths are prefixed with VR_TAGS_BASE_URL (empty when unset).

use crate::controls::ControlsParams;
use crate::document::Element;
use crate::error::ConfigError;
use crate::geometry::SphereParams;
use crate::scene::PerspectiveCamera;

use glam::Vec3;
use once_cell::sync::Lazy;
use serde::Deserialize;
use std::path::{Path, PathBuf};

static BASE_URL: Lazy<String> =
    Lazy::new(|| std::env::var("VR_TAGS_BASE_URL").unwrap_or_default());

pub const DEFAULT_FOV: f32 = 75.0;
pub const DEFAULT_NEAR: f32 = 0.1;
pub const DEFAULT_FAR: f32 = 1000.0;

/// Size of the host window's drawable area in physical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn aspect(&self) -> f32 {
        self.width.max(1) as f32 / self.height.max(1) as f32
    }
}

/// Prefix applied to every texture path, so relocated bundles keep working.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetBase {
    prefix: PathBuf,
}

impl AssetBase {
    pub fn new(prefix: impl Into<PathBuf>) -> Self {
        Self { prefix: prefix.into() }
    }

    pub fn from_env() -> Self {
        Self::new(BASE_URL.as_str())
    }

    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() || self.prefix.as_os_str().is_empty() {
            path.to_path_buf()
        } else {
            self.prefix.join(path)
        }
    }
}

fn positive(v: Option<f32>) -> Option<f32> {
    v.filter(|v| v.is_finite() && *v > 0.0)
}

/// Missing or zero fields fall back to the defaults.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct CameraConfig {
    pub fov: Option<f32>,
    pub aspect: Option<f32>,
    pub near: Option<f32>,
    pub far: Option<f32>,
}

impl CameraConfig {
    pub fn resolve(&self, viewport: Viewport) -> PerspectiveCamera {
        PerspectiveCamera::new(
            positive(self.fov).unwrap_or(DEFAULT_FOV),
            positive(self.aspect).unwrap_or_else(|| viewport.aspect()),
            positive(self.near).unwrap_or(DEFAULT_NEAR),
            positive(self.far).unwrap_or(DEFAULT_FAR),
        )
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RenderConfig {
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl RenderConfig {
    pub fn resolve(&self, viewport: Viewport) -> Viewport {
        Viewport {
            width: self.width.filter(|w| *w > 0).unwrap_or(viewport.width),
            height: self.height.filter(|h| *h > 0).unwrap_or(viewport.height),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PanoramaConfig {
    pub path: String,
    #[serde(default)]
    pub sphere: SphereParams,
}

fn unit_scale() -> Vec3 {
    Vec3::ONE
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TagConfig {
    Sprite {
        position: Vec3,
        #[serde(default = "unit_scale")]
        scale: Vec3,
        texture: String,
        #[serde(default)]
        rotation: f32,
    },
    Overlay3d {
        element: String,
        position: Vec3,
        #[serde(default = "unit_scale")]
        scale: Vec3,
    },
    Overlay2d {
        element: String,
        position: Vec3,
        #[serde(default = "unit_scale")]
        scale: Vec3,
    },
    SpriteWith2d {
        element: String,
        offset: Vec3,
        position: Vec3,
        #[serde(default = "unit_scale")]
        scale: Vec3,
        texture: String,
        #[serde(default)]
        rotation: f32,
    },
    Label {
        element: String,
        position: Vec3,
        #[serde(default = "unit_scale")]
        scale: Vec3,
        #[serde(default)]
        three_d: bool,
    },
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TagEntry {
    #[serde(default)]
    pub name: Option<String>,
    /// Attach position/scale/rotation editors to the debug panel.
    #[serde(default)]
    pub debug: bool,
    #[serde(flatten)]
    pub tag: TagConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SceneConfig {
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub render: RenderConfig,
    pub panorama: PanoramaConfig,
    #[serde(default)]
    pub controls: ControlsParams,
    #[serde(default)]
    pub elements: Vec<Element>,
    #[serde(default)]
    pub tags: Vec<TagEntry>,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig::default(),
            render: RenderConfig::default(),
            panorama: PanoramaConfig {
                path: "pano.jpg".to_string(),
                sphere: SphereParams::default(),
            },
            controls: ControlsParams::default(),
            elements: vec![
                Element::new("door", "Front door").with_size(160.0, 48.0),
                Element::new("window", "Window"),
            ],
            tags: vec![
                TagEntry {
                    name: Some("door".to_string()),
                    debug: false,
                    tag: TagConfig::Overlay3d {
                        element: "door".to_string(),
                        position: Vec3::new(-40.0, 0.0, -120.0),
                        scale: Vec3::splat(0.2),
                    },
                },
                TagEntry {
                    name: Some("window".to_string()),
                    debug: false,
                    tag: TagConfig::Label {
                        element: "window".to_string(),
                        position: Vec3::new(60.0, 10.0, -100.0),
                        scale: Vec3::ONE,
                        three_d: false,
                    },
                },
            ],
        }
    }
}

impl SceneConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Choose the scene file from CLI/env; `None` when nothing exists on disk.
pub fn resolve_scene_path() -> Option<PathBuf> {
    let mut it = std::env::args();
    while let Some(a) = it.next() {
        if a == "--scene" {
            if let Some(v) = it.next() {
                return Some(PathBuf::from(v));
            }
        }
    }

    if let Ok(v) = std::env::var("VR_TAGS_SCENE") {
        if !v.trim().is_empty() {
            return Some(PathBuf::from(v));
        }
    }

    let p = PathBuf::from("assets").join("scene.json");
    p.exists().then_some(p)
}

/// Loads the selected scene file, falling back to the built-in scene.
pub fn load_scene() -> SceneConfig {
    let Some(path) = resolve_scene_path() else {
        log::info!("no scene file found, using the built-in scene");
        return SceneConfig::default();
    };

    match SceneConfig::load(&path) {
        Ok(cfg) => {
            log::info!("loaded scene {:?} ({} tags)", path, cfg.tags.len());
            cfg
        }
        Err(e) => {
            log::warn!("{}; using the built-in scene", e);
            SceneConfig::default()
        }
    }
}
