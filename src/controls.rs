// controls.rs — orbit camera controls driven by pointer and touch input
//
// Mouse: left drag rotates, right drag pans, wheel dollies.
// Touch: one finger rotates, two fingers dolly (pinch) and pan together.

use crate::dispose::Disposable;
use crate::scene::Object3D;

use glam::{Vec2, Vec3};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::f32::consts::PI;

const EPS: f32 = 1e-6;

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ControlsParams {
    /// Keep drifting after release, slowing down every update.
    pub enable_damping: bool,
    pub enable_zoom: bool,
    pub enable_pan: bool,
}

impl Default for ControlsParams {
    fn default() -> Self {
        Self { enable_damping: true, enable_zoom: false, enable_pan: false }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchAction {
    Rotate,
    Pan,
    Dolly,
    DollyPan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TouchBindings {
    pub one: TouchAction,
    pub two: TouchAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PointerId {
    Mouse,
    Touch(u64),
}

/// Input events in surface pixels, y pointing down.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerInput {
    Down { pointer: PointerId, button: MouseButton, position: Vec2 },
    Move { pointer: PointerId, position: Vec2 },
    Up { pointer: PointerId },
    /// Positive values zoom in.
    Wheel { delta: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Gesture {
    None,
    Rotate,
    Pan,
    Dolly,
    DollyPan,
}

#[derive(Debug)]
pub struct OrbitControls {
    pub target: Vec3,
    pub enable_damping: bool,
    pub damping_factor: f32,
    pub enable_zoom: bool,
    pub zoom_speed: f32,
    pub enable_pan: bool,
    pub pan_speed: f32,
    pub enable_rotate: bool,
    pub rotate_speed: f32,
    pub min_distance: f32,
    pub max_distance: f32,
    pub touches: TouchBindings,

    viewport: Vec2,
    pointers: BTreeMap<PointerId, Vec2>,
    gesture: Gesture,
    last_pinch: Option<(f32, Vec2)>,
    delta_theta: f32,
    delta_phi: f32,
    scale: f32,
    pan_offset: Vec3,
    disposed: bool,
}

impl OrbitControls {
    pub fn new(params: ControlsParams, viewport: Vec2) -> Self {
        Self {
            target: Vec3::ZERO,
            enable_damping: params.enable_damping,
            damping_factor: 0.05,
            enable_zoom: params.enable_zoom,
            zoom_speed: 1.0,
            enable_pan: params.enable_pan,
            pan_speed: 1.0,
            enable_rotate: true,
            rotate_speed: 1.0,
            min_distance: 0.0,
            max_distance: f32::INFINITY,
            touches: TouchBindings { one: TouchAction::Rotate, two: TouchAction::DollyPan },
            viewport,
            pointers: BTreeMap::new(),
            gesture: Gesture::None,
            last_pinch: None,
            delta_theta: 0.0,
            delta_phi: 0.0,
            scale: 1.0,
            pan_offset: Vec3::ZERO,
            disposed: false,
        }
    }

    pub fn set_viewport(&mut self, viewport: Vec2) {
        self.viewport = viewport;
    }

    fn zoom_scale(&self) -> f32 {
        0.95f32.powf(self.zoom_speed)
    }

    pub fn rotate_left(&mut self, angle: f32) {
        self.delta_theta -= angle;
    }

    pub fn rotate_up(&mut self, angle: f32) {
        self.delta_phi -= angle;
    }

    pub fn dolly_in(&mut self, scale: f32) {
        self.scale *= scale;
    }

    pub fn dolly_out(&mut self, scale: f32) {
        self.scale /= scale;
    }

    /// Dragging down moves the camera away from the target.
    fn dolly_by_pixels(&mut self, dy: f32) {
        if dy > 0.0 {
            self.dolly_out(self.zoom_scale());
        } else if dy < 0.0 {
            self.dolly_in(self.zoom_scale());
        }
    }

    fn rotate_by_pixels(&mut self, delta: Vec2) {
        let h = self.viewport.y.max(1.0);
        self.rotate_left(2.0 * PI * delta.x / h * self.rotate_speed);
        self.rotate_up(2.0 * PI * delta.y / h * self.rotate_speed);
    }

    /// Moves the target in the camera plane, scaled so the content follows the pointer.
    fn pan_by_pixels(&mut self, delta: Vec2, camera: &Object3D) {
        let fov = camera.camera().map_or(75.0, |c| c.fov);
        let distance = (camera.position - self.target).length() * (fov.to_radians() / 2.0).tan();
        let h = self.viewport.y.max(1.0);
        let right = camera.rotation * Vec3::X;
        let up = camera.rotation * Vec3::Y;
        let pan = -right * (2.0 * delta.x * distance / h) + up * (2.0 * delta.y * distance / h);
        self.pan_offset += pan * self.pan_speed;
    }

    /// Feeds one input event. Returns true when the event was consumed.
    pub fn handle_input(&mut self, input: PointerInput, camera: &Object3D) -> bool {
        if self.disposed {
            return false;
        }
        match input {
            PointerInput::Down { pointer, button, position } => {
                self.pointers.insert(pointer, position);
                self.gesture = self.pick_gesture(button);
                self.last_pinch = self.pinch();
                true
            }
            PointerInput::Move { pointer, position } => {
                let Some(last) = self.pointers.insert(pointer, position) else {
                    return false;
                };
                match self.gesture {
                    Gesture::Rotate => self.rotate_by_pixels(position - last),
                    Gesture::Pan => self.pan_by_pixels(position - last, camera),
                    Gesture::Dolly | Gesture::DollyPan if self.pointers.len() >= 2 => {
                        self.handle_pinch(camera)
                    }
                    Gesture::Dolly => self.dolly_by_pixels(position.y - last.y),
                    Gesture::DollyPan | Gesture::None => return false,
                }
                true
            }
            PointerInput::Up { pointer } => {
                self.pointers.remove(&pointer);
                // lifting one of two fingers falls back to the one-finger gesture
                self.gesture = if self.pointers.len() == 1 {
                    self.touch_gesture(self.touches.one)
                } else {
                    Gesture::None
                };
                self.last_pinch = None;
                true
            }
            PointerInput::Wheel { delta } => {
                if !self.enable_zoom || delta == 0.0 {
                    return false;
                }
                if delta > 0.0 {
                    self.dolly_in(self.zoom_scale());
                } else {
                    self.dolly_out(self.zoom_scale());
                }
                true
            }
        }
    }

    fn pick_gesture(&self, button: MouseButton) -> Gesture {
        let touches = self.pointers.keys().filter(|p| matches!(p, PointerId::Touch(_))).count();
        match touches {
            0 => match button {
                MouseButton::Left => self.gated(Gesture::Rotate),
                MouseButton::Right => self.gated(Gesture::Pan),
                MouseButton::Middle => self.gated(Gesture::Dolly),
            },
            1 => self.touch_gesture(self.touches.one),
            _ => self.touch_gesture(self.touches.two),
        }
    }

    fn touch_gesture(&self, action: TouchAction) -> Gesture {
        self.gated(match action {
            TouchAction::Rotate => Gesture::Rotate,
            TouchAction::Pan => Gesture::Pan,
            TouchAction::Dolly => Gesture::Dolly,
            TouchAction::DollyPan => Gesture::DollyPan,
        })
    }

    fn gated(&self, g: Gesture) -> Gesture {
        let allowed = match g {
            Gesture::Rotate => self.enable_rotate,
            Gesture::Pan => self.enable_pan,
            Gesture::Dolly => self.enable_zoom,
            Gesture::DollyPan => self.enable_zoom || self.enable_pan,
            Gesture::None => true,
        };
        if allowed {
            g
        } else {
            Gesture::None
        }
    }

    /// Distance and midpoint of the first two pointers.
    fn pinch(&self) -> Option<(f32, Vec2)> {
        let mut it = self.pointers.values();
        let a = *it.next()?;
        let b = *it.next()?;
        Some((a.distance(b), (a + b) * 0.5))
    }

    fn handle_pinch(&mut self, camera: &Object3D) {
        let Some((distance, center)) = self.pinch() else {
            return;
        };
        if let Some((last_distance, last_center)) = self.last_pinch {
            if self.enable_zoom && last_distance > EPS && distance > EPS {
                // spreading the fingers shrinks the orbit radius
                let ratio = (distance / last_distance).powf(self.zoom_speed);
                self.dolly_out(ratio);
            }
            if self.enable_pan && self.gesture == Gesture::DollyPan {
                self.pan_by_pixels(center - last_center, camera);
            }
        }
        self.last_pinch = Some((distance, center));
    }

    /// Applies pending motion to the camera. Returns true when the camera moved.
    pub fn update(&mut self, camera: &mut Object3D) -> bool {
        if self.disposed {
            return false;
        }
        let offset = camera.position - self.target;
        let mut radius = offset.length();
        let (mut theta, mut phi) = if radius > EPS {
            (offset.x.atan2(offset.z), (offset.y / radius).clamp(-1.0, 1.0).acos())
        } else {
            (0.0, PI / 2.0)
        };

        let step = if self.enable_damping { self.damping_factor } else { 1.0 };
        theta += self.delta_theta * step;
        phi = (phi + self.delta_phi * step).clamp(EPS, PI - EPS);
        radius = (radius * self.scale).clamp(self.min_distance, self.max_distance);
        self.target += self.pan_offset * step;

        let new_offset = Vec3::new(
            radius * phi.sin() * theta.sin(),
            radius * phi.cos(),
            radius * phi.sin() * theta.cos(),
        );
        let old_position = camera.position;
        camera.position = self.target + new_offset;
        camera.look_at(self.target);

        if self.enable_damping {
            self.delta_theta *= 1.0 - self.damping_factor;
            self.delta_phi *= 1.0 - self.damping_factor;
            self.pan_offset *= 1.0 - self.damping_factor;
        } else {
            self.delta_theta = 0.0;
            self.delta_phi = 0.0;
            self.pan_offset = Vec3::ZERO;
        }
        self.scale = 1.0;

        camera.position.distance_squared(old_position) > EPS * EPS
    }
}

impl Disposable for OrbitControls {
    fn dispose(&mut self) {
        self.pointers.clear();
        self.gesture = Gesture::None;
        self.last_pinch = None;
        self.disposed = true;
    }

    fn is_disposed(&self) -> bool {
        self.disposed
    }
}
