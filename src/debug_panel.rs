// debug_panel.rs — live editors for label transforms
//
// The host creates a single DebugPanel for the whole session and hands it to
// every TagDebug that should contribute folders.

use crate::scene::{ObjectId, Scene};
use crate::tag::Label;

use glam::{EulerRot, Quat};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldTarget {
    Position(Axis),
    Scale(Axis),
    /// Sprite roll, or yaw for every other object.
    Rotation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DebugField {
    pub name: &'static str,
    pub object: ObjectId,
    pub target: FieldTarget,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DebugFolder {
    pub title: String,
    pub open: bool,
    pub fields: Vec<DebugField>,
}

#[derive(Debug)]
pub struct DebugPanel {
    title: String,
    folders: Vec<DebugFolder>,
}

impl Default for DebugPanel {
    fn default() -> Self {
        Self::new("Tags")
    }
}

impl DebugPanel {
    pub fn new(title: impl Into<String>) -> Self {
        Self { title: title.into(), folders: Vec::new() }
    }

    pub fn folders(&self) -> &[DebugFolder] {
        &self.folders
    }

    pub fn is_empty(&self) -> bool {
        self.folders.is_empty()
    }

    fn add_folder(&mut self, title: String, fields: Vec<DebugField>) {
        // folders start collapsed
        self.folders.push(DebugFolder { title, open: false, fields });
    }

    /// Current value of a bound field; `None` once the object left the scene.
    pub fn read(scene: &Scene, field: &DebugField) -> Option<f32> {
        let o = scene.get(field.object)?;
        Some(match field.target {
            FieldTarget::Position(a) => pick(o.position.to_array(), a),
            FieldTarget::Scale(a) => pick(o.scale.to_array(), a),
            FieldTarget::Rotation => match o.label() {
                Some(Label::Sprite(s)) => s.material.rotation,
                _ => o.rotation.to_euler(EulerRot::YXZ).0,
            },
        })
    }

    pub fn write(scene: &mut Scene, field: &DebugField, value: f32) -> bool {
        let Some(o) = scene.get_mut(field.object) else {
            return false;
        };
        match field.target {
            FieldTarget::Position(a) => *pick_mut(&mut o.position, a) = value,
            FieldTarget::Scale(a) => *pick_mut(&mut o.scale, a) = value,
            FieldTarget::Rotation => match o.label_mut() {
                Some(Label::Sprite(s)) => s.material.rotation = value,
                _ => {
                    let (_, pitch, roll) = o.rotation.to_euler(EulerRot::YXZ);
                    o.rotation = Quat::from_euler(EulerRot::YXZ, value, pitch, roll);
                }
            },
        }
        true
    }

    pub fn show(&mut self, ctx: &egui::Context, scene: &mut Scene) {
        if self.folders.is_empty() {
            return;
        }
        egui::Window::new(self.title.as_str())
            .default_open(true)
            .resizable(false)
            .show(ctx, |ui| {
                for folder in &mut self.folders {
                    let response = egui::CollapsingHeader::new(folder.title.as_str())
                        .open(Some(folder.open))
                        .show(ui, |ui| {
                            for field in &folder.fields {
                                let Some(mut value) = Self::read(scene, field) else {
                                    ui.label(format!("{}: (removed)", field.name));
                                    continue;
                                };
                                ui.horizontal(|ui| {
                                    ui.label(field.name);
                                    let changed =
                                        ui.add(egui::DragValue::new(&mut value).speed(0.1)).changed();
                                    if changed {
                                        Self::write(scene, field, value);
                                    }
                                });
                            }
                        });
                    if response.header_response.clicked() {
                        folder.open = !folder.open;
                    }
                }
            });
    }
}

fn pick(v: [f32; 3], axis: Axis) -> f32 {
    match axis {
        Axis::X => v[0],
        Axis::Y => v[1],
        Axis::Z => v[2],
    }
}

fn pick_mut(v: &mut glam::Vec3, axis: Axis) -> &mut f32 {
    match axis {
        Axis::X => &mut v.x,
        Axis::Y => &mut v.y,
        Axis::Z => &mut v.z,
    }
}

/// Named contributor of folders to the shared panel.
pub struct TagDebug<'p> {
    name: String,
    panel: &'p mut DebugPanel,
}

impl<'p> TagDebug<'p> {
    pub fn new(name: impl Into<String>, panel: &'p mut DebugPanel) -> Self {
        Self { name: name.into(), panel }
    }

    fn xyz(object: ObjectId, f: fn(Axis) -> FieldTarget) -> Vec<DebugField> {
        [("x", Axis::X), ("y", Axis::Y), ("z", Axis::Z)]
            .into_iter()
            .map(|(name, a)| DebugField { name, object, target: f(a) })
            .collect()
    }

    pub fn add_position(&mut self, object: ObjectId) {
        let title = format!("{} Debug: Tag Position", self.name);
        self.panel.add_folder(title, Self::xyz(object, FieldTarget::Position));
    }

    pub fn add_scale(&mut self, object: ObjectId) {
        let title = format!("{} Debug: Tag Scale", self.name);
        self.panel.add_folder(title, Self::xyz(object, FieldTarget::Scale));
    }

    pub fn add_rotation(&mut self, object: ObjectId) {
        let title = format!("{} Debug: Tag Rotation", self.name);
        let field = DebugField { name: "rotation", object, target: FieldTarget::Rotation };
        self.panel.add_folder(title, vec![field]);
    }
}
