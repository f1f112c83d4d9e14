// scene.rs — scene graph, perspective camera and per-frame camera view

use crate::dispose::Disposable;
use crate::geometry::Mesh;
use crate::tag::Label;

use glam::{Mat4, Quat, Vec3};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    fn next() -> Self {
        Self(NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PerspectiveCamera {
    /// Vertical field of view in degrees.
    pub fov: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    projection: Mat4,
}

impl PerspectiveCamera {
    pub fn new(fov: f32, aspect: f32, near: f32, far: f32) -> Self {
        let mut cam = Self { fov, aspect, near, far, projection: Mat4::IDENTITY };
        cam.update_projection_matrix();
        cam
    }

    /// Must be called after changing any of the public fields.
    pub fn update_projection_matrix(&mut self) {
        self.projection = Mat4::perspective_rh(self.fov.to_radians(), self.aspect, self.near, self.far);
    }

    pub fn projection_matrix(&self) -> Mat4 {
        self.projection
    }
}

#[derive(Debug)]
pub enum ObjectKind {
    Group,
    Camera(PerspectiveCamera),
    Mesh(Mesh),
    Label(Label),
}

impl ObjectKind {
    pub fn as_disposable_mut(&mut self) -> Option<&mut dyn Disposable> {
        match self {
            ObjectKind::Mesh(mesh) => Some(mesh),
            ObjectKind::Label(label) => label.as_disposable_mut(),
            ObjectKind::Group | ObjectKind::Camera(_) => None,
        }
    }
}

/// A node of the scene graph. Children are owned by their parent.
#[derive(Debug)]
pub struct Object3D {
    id: ObjectId,
    pub name: String,
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
    pub visible: bool,
    pub kind: ObjectKind,
    children: Vec<Object3D>,
}

impl Object3D {
    pub fn new(kind: ObjectKind) -> Self {
        Self {
            id: ObjectId::next(),
            name: String::new(),
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            visible: true,
            kind,
            children: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn children(&self) -> &[Object3D] {
        &self.children
    }

    pub fn children_mut(&mut self) -> &mut [Object3D] {
        &mut self.children
    }

    pub fn add(&mut self, child: Object3D) -> ObjectId {
        let id = child.id;
        self.children.push(child);
        id
    }

    pub fn label(&self) -> Option<&Label> {
        match &self.kind {
            ObjectKind::Label(l) => Some(l),
            _ => None,
        }
    }

    pub fn label_mut(&mut self) -> Option<&mut Label> {
        match &mut self.kind {
            ObjectKind::Label(l) => Some(l),
            _ => None,
        }
    }

    pub fn camera(&self) -> Option<&PerspectiveCamera> {
        match &self.kind {
            ObjectKind::Camera(c) => Some(c),
            _ => None,
        }
    }

    pub fn camera_mut(&mut self) -> Option<&mut PerspectiveCamera> {
        match &mut self.kind {
            ObjectKind::Camera(c) => Some(c),
            _ => None,
        }
    }

    pub fn mesh(&self) -> Option<&Mesh> {
        match &self.kind {
            ObjectKind::Mesh(m) => Some(m),
            _ => None,
        }
    }

    /// Local transform relative to the parent.
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }

    /// Orients the object so its -Z axis points at `target`.
    pub fn look_at(&mut self, target: Vec3) {
        let dir = target - self.position;
        if dir.length_squared() < 1e-12 {
            return;
        }
        let up = if dir.normalize().cross(Vec3::Y).length_squared() < 1e-8 {
            Vec3::Z
        } else {
            Vec3::Y
        };
        let view = Mat4::look_at_rh(self.position, target, up);
        let (_, rotation, _) = view.inverse().to_scale_rotation_translation();
        self.rotation = rotation;
    }

    pub fn find(&self, id: ObjectId) -> Option<&Object3D> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(id))
    }

    pub fn find_mut(&mut self, id: ObjectId) -> Option<&mut Object3D> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter_mut().find_map(|c| c.find_mut(id))
    }

    fn remove_descendant(&mut self, id: ObjectId) -> Option<Object3D> {
        if let Some(i) = self.children.iter().position(|c| c.id == id) {
            return Some(self.children.remove(i));
        }
        self.children.iter_mut().find_map(|c| c.remove_descendant(id))
    }

    /// Pre-order walk over this node and every descendant.
    pub fn traverse<'a>(&'a self, f: &mut impl FnMut(&'a Object3D)) {
        f(self);
        for c in &self.children {
            c.traverse(f);
        }
    }

    pub fn traverse_mut(&mut self, f: &mut impl FnMut(&mut Object3D)) {
        f(self);
        for c in &mut self.children {
            c.traverse_mut(f);
        }
    }

    fn traverse_world<'a>(&'a self, parent: Mat4, f: &mut impl FnMut(&'a Object3D, Mat4)) {
        let world = parent * self.matrix();
        f(self, world);
        for c in &self.children {
            c.traverse_world(world, f);
        }
    }

    fn world_of(&self, id: ObjectId, parent: Mat4) -> Option<Mat4> {
        let world = parent * self.matrix();
        if self.id == id {
            return Some(world);
        }
        self.children.iter().find_map(|c| c.world_of(id, world))
    }
}

impl Disposable for Object3D {
    fn dispose(&mut self) {
        if let Some(d) = self.kind.as_disposable_mut() {
            d.dispose();
        }
    }

    fn is_disposed(&self) -> bool {
        match &self.kind {
            ObjectKind::Mesh(m) => m.is_disposed(),
            ObjectKind::Label(l) => l.is_disposed(),
            ObjectKind::Group | ObjectKind::Camera(_) => true,
        }
    }
}

/// Root of the graph. It is not an [`Object3D`], so it can never be parented.
#[derive(Debug, Default)]
pub struct Scene {
    children: Vec<Object3D>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, object: Object3D) -> ObjectId {
        let id = object.id;
        self.children.push(object);
        id
    }

    /// Detaches the node (and its subtree) wherever it sits in the graph.
    pub fn remove(&mut self, id: ObjectId) -> Option<Object3D> {
        if let Some(i) = self.children.iter().position(|c| c.id == id) {
            return Some(self.children.remove(i));
        }
        self.children.iter_mut().find_map(|c| c.remove_descendant(id))
    }

    pub fn children(&self) -> &[Object3D] {
        &self.children
    }

    pub fn get(&self, id: ObjectId) -> Option<&Object3D> {
        self.children.iter().find_map(|c| c.find(id))
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut Object3D> {
        self.children.iter_mut().find_map(|c| c.find_mut(id))
    }

    pub fn traverse<'a>(&'a self, mut f: impl FnMut(&'a Object3D)) {
        for c in &self.children {
            c.traverse(&mut f);
        }
    }

    pub fn traverse_mut(&mut self, mut f: impl FnMut(&mut Object3D)) {
        for c in &mut self.children {
            c.traverse_mut(&mut f);
        }
    }

    /// Walks every node together with its world matrix.
    pub fn traverse_world<'a>(&'a self, mut f: impl FnMut(&'a Object3D, Mat4)) {
        for c in &self.children {
            c.traverse_world(Mat4::IDENTITY, &mut f);
        }
    }

    pub fn world_matrix(&self, id: ObjectId) -> Option<Mat4> {
        self.children.iter().find_map(|c| c.world_of(id, Mat4::IDENTITY))
    }

    pub fn node_count(&self) -> usize {
        let mut n = 0;
        self.traverse(|_| n += 1);
        n
    }

    pub fn mesh_count(&self) -> usize {
        let mut n = 0;
        self.traverse(|o| {
            if o.mesh().is_some() {
                n += 1;
            }
        });
        n
    }

    /// Snapshot of the camera node for one frame.
    pub fn camera_view(&self, camera: ObjectId, width: u32, height: u32) -> Option<CameraView> {
        let node = self.get(camera)?;
        let cam = node.camera()?;
        let world = self.world_matrix(camera)?;
        let view = world.inverse();
        let projection = cam.projection_matrix();
        Some(CameraView {
            view,
            projection,
            view_projection: projection * view,
            position: world.transform_point3(Vec3::ZERO),
            fov: cam.fov,
            width,
            height,
        })
    }
}

/// Camera matrices shared by every pass of one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraView {
    pub view: Mat4,
    pub projection: Mat4,
    pub view_projection: Mat4,
    pub position: Vec3,
    pub fov: f32,
    pub width: u32,
    pub height: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(name: &str) -> Object3D {
        Object3D::new(ObjectKind::Group).with_name(name)
    }

    #[test]
    fn traversal_reaches_nested_nodes() {
        let mut scene = Scene::new();
        let mut a = group("a");
        let mut b = group("b");
        let c = group("c");
        let c_id = b.add(c);
        a.add(b);
        scene.add(a);
        scene.add(group("d"));

        let mut names = Vec::new();
        scene.traverse(|o| names.push(o.name.clone()));
        assert_eq!(names, ["a", "b", "c", "d"]);
        assert_eq!(scene.node_count(), 4);
        assert_eq!(scene.get(c_id).map(|o| o.name.as_str()), Some("c"));
    }

    #[test]
    fn remove_detaches_subtree() {
        let mut scene = Scene::new();
        let mut a = group("a");
        let b_id = a.add(group("b"));
        scene.add(a);

        let b = scene.remove(b_id).unwrap();
        assert_eq!(b.name, "b");
        assert!(scene.get(b_id).is_none());
        assert_eq!(scene.node_count(), 1);
        assert!(scene.remove(b_id).is_none());
    }

    #[test]
    fn world_matrix_composes_parents() {
        let mut scene = Scene::new();
        let mut parent = group("p");
        parent.position = Vec3::new(10.0, 0.0, 0.0);
        parent.scale = Vec3::splat(2.0);
        let mut child = group("c");
        child.position = Vec3::new(1.0, 1.0, 0.0);
        let child_id = parent.add(child);
        scene.add(parent);

        let world = scene.world_matrix(child_id).unwrap();
        let p = world.transform_point3(Vec3::ZERO);
        assert!((p - Vec3::new(12.0, 2.0, 0.0)).length() < 1e-5);

        let mut seen = 0;
        scene.traverse_world(|o, m| {
            if o.id() == child_id {
                assert_eq!(m, world);
                seen += 1;
            }
        });
        assert_eq!(seen, 1);
    }

    #[test]
    fn look_at_points_negative_z_at_target() {
        let mut cam = Object3D::new(ObjectKind::Group);
        cam.position = Vec3::new(0.0, 0.0, 5.0);
        cam.look_at(Vec3::new(5.0, 0.0, 5.0));
        let forward = cam.rotation * Vec3::NEG_Z;
        assert!((forward - Vec3::X).length() < 1e-5);

        // straight up must not produce NaNs
        cam.look_at(Vec3::new(0.0, 10.0, 5.0));
        assert!(cam.rotation.is_finite());
    }

    #[test]
    fn camera_view_uses_camera_world_transform() {
        let mut scene = Scene::new();
        let mut cam = Object3D::new(ObjectKind::Camera(PerspectiveCamera::new(75.0, 2.0, 0.1, 1000.0)));
        cam.position = Vec3::new(0.0, 0.0, 0.1);
        let id = scene.add(cam);

        let view = scene.camera_view(id, 800, 400).unwrap();
        assert!((view.position - Vec3::new(0.0, 0.0, 0.1)).length() < 1e-6);
        let in_front = view.view.transform_point3(Vec3::new(0.0, 0.0, -10.0));
        assert!(in_front.z < 0.0);
        assert!(scene.camera_view(ObjectId(u64::MAX), 1, 1).is_none());
    }
}
