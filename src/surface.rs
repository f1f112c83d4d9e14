// surface.rs — the output surface every render pass draws into

use crate::dispose::Disposable;
use crate::error::RenderError;
use crate::scene::{CameraView, Scene};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerEvents {
    Auto,
    None,
}

/// Placement of a pass output inside the host window. All passes are absolutely
/// positioned at the same origin and size; `z_index` decides which one is on top.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceStyle {
    pub top: i32,
    pub left: i32,
    pub width: u32,
    pub height: u32,
    pub pointer_events: PointerEvents,
    pub z_index: i32,
    pub attached: bool,
}

impl SurfaceStyle {
    pub fn new(width: u32, height: u32, pointer_events: PointerEvents, z_index: i32) -> Self {
        Self {
            top: 0,
            left: 0,
            width,
            height,
            pointer_events,
            z_index,
            attached: true,
        }
    }

    pub fn accepts_pointer(&self) -> bool {
        self.attached && self.pointer_events == PointerEvents::Auto
    }

    pub fn covers_same_rect(&self, other: &SurfaceStyle) -> bool {
        (self.top, self.left, self.width, self.height)
            == (other.top, other.left, other.width, other.height)
    }
}

/// One way of drawing the shared scene from the shared camera.
pub trait RenderPass: Disposable {
    fn surface(&self) -> &SurfaceStyle;

    fn surface_mut(&mut self) -> &mut SurfaceStyle;

    fn set_size(&mut self, width: u32, height: u32) {
        let s = self.surface_mut();
        s.width = width;
        s.height = height;
    }

    fn render(&mut self, scene: &Scene, view: &CameraView) -> Result<(), RenderError>;
}
