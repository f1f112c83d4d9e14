// error.rs — error types shared across the crate

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum GeometryError {
    #[error("sphere radius must be positive and finite, got {0}")]
    InvalidRadius(f32),
    #[error("sphere needs at least 3 {axis} segments, got {count}")]
    TooFewSegments { axis: &'static str, count: u32 },
}

#[derive(Debug, Error)]
pub enum TextureError {
    #[error("failed to open texture {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode texture {path:?}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

impl TextureError {
    pub fn path(&self) -> &PathBuf {
        match self {
            TextureError::Open { path, .. } | TextureError::Decode { path, .. } => path,
        }
    }
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("surface error: {0:?}")]
    Surface(#[from] wgpu::SurfaceError),
    #[error("failed to create surface: {0}")]
    CreateSurface(#[from] wgpu::CreateSurfaceError),
    #[error("no compatible GPU adapter found")]
    NoAdapter,
    #[error("failed to open GPU device: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read scene file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse scene file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum VrError {
    #[error("the composer has been destroyed")]
    Destroyed,
    #[error("camera node is missing from the scene")]
    MissingCamera,
    #[error(transparent)]
    Geometry(#[from] GeometryError),
    #[error(transparent)]
    Render(#[from] RenderError),
}
