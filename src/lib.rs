// lib.rs — panoramic scene composer with sprite, 3D-overlay and 2D-overlay tags

pub mod config;
pub mod controls;
pub mod debug_panel;
pub mod dispose;
pub mod document;
pub mod error;
pub mod fonts;
pub mod geometry;
pub mod material;
pub mod overlay;
pub mod overlay_paint;
pub mod renderer;
pub mod scene;
pub mod surface;
pub mod tag;
pub mod texture;
pub mod vr;

pub use dispose::Disposable;
pub use error::VrError;
pub use surface::RenderPass;
pub use vr::{AnimationHandle, FrameContext, Vr};
