// overlay.rs — element overlay passes
//
// Both passes read the same scene and camera view as the raster pass and turn
// overlay labels into placements in surface pixels (origin top-left, y down).
// They draw nothing themselves; overlay_paint turns placements into egui shapes.

use crate::dispose::Disposable;
use crate::document::ElementHandle;
use crate::error::RenderError;
use crate::scene::{CameraView, ObjectId, Scene};
use crate::surface::{PointerEvents, RenderPass, SurfaceStyle};
use crate::tag::Label;

use glam::{Mat4, Vec2, Vec3, Vec3Swizzles, Vec4Swizzles};

/// NDC -> surface pixels.
fn to_surface(ndc: Vec2, width: u32, height: u32) -> Vec2 {
    Vec2::new(
        (ndc.x * 0.5 + 0.5) * width as f32,
        (-ndc.y * 0.5 + 0.5) * height as f32,
    )
}

#[derive(Debug, Clone)]
pub struct Overlay3DPlacement {
    pub object: ObjectId,
    pub element: ElementHandle,
    /// top-left, top-right, bottom-right, bottom-left
    pub corners: [Vec2; 4],
    /// Distance along the view direction, used for painter's ordering.
    pub depth: f32,
    pub back_facing: bool,
    pub visible: bool,
}

/// Places elements as planes in the scene: one element pixel is one world unit
/// before the object's scale, so labels shrink with distance and turn with the scene.
#[derive(Debug)]
pub struct Overlay3DRenderer {
    surface: SurfaceStyle,
    placements: Vec<Overlay3DPlacement>,
    frames: u64,
    disposed: bool,
}

impl Overlay3DRenderer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            surface: SurfaceStyle::new(width, height, PointerEvents::None, 1),
            placements: Vec::new(),
            frames: 0,
            disposed: false,
        }
    }

    /// Far to near.
    pub fn placements(&self) -> &[Overlay3DPlacement] {
        &self.placements
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames
    }

    fn place(
        &self,
        object: ObjectId,
        element: &ElementHandle,
        world: Mat4,
        visible: bool,
        view: &CameraView,
    ) -> Option<Overlay3DPlacement> {
        let el = element.get()?;
        let half = el.box_size() * 0.5;
        let local = [
            Vec3::new(-half.x, half.y, 0.0),
            Vec3::new(half.x, half.y, 0.0),
            Vec3::new(half.x, -half.y, 0.0),
            Vec3::new(-half.x, -half.y, 0.0),
        ];

        let mvp = view.view_projection * world;
        let mut corners = [Vec2::ZERO; 4];
        let mut in_front = true;
        for (dst, p) in corners.iter_mut().zip(local) {
            let clip = mvp * p.extend(1.0);
            if clip.w <= 1e-5 {
                in_front = false;
                break;
            }
            *dst = to_surface(clip.xy() / clip.w, self.surface.width, self.surface.height);
        }

        let centre = (view.view * world).transform_point3(Vec3::ZERO);
        let edge_x = corners[1] - corners[0];
        let edge_y = corners[3] - corners[0];
        Some(Overlay3DPlacement {
            object,
            element: element.clone(),
            corners,
            depth: -centre.z,
            back_facing: in_front && edge_x.perp_dot(edge_y) < 0.0,
            visible: visible && in_front,
        })
    }
}

impl Disposable for Overlay3DRenderer {
    fn dispose(&mut self) {
        self.placements.clear();
        self.surface.attached = false;
        self.disposed = true;
    }

    fn is_disposed(&self) -> bool {
        self.disposed
    }
}

impl RenderPass for Overlay3DRenderer {
    fn surface(&self) -> &SurfaceStyle {
        &self.surface
    }

    fn surface_mut(&mut self) -> &mut SurfaceStyle {
        &mut self.surface
    }

    fn render(&mut self, scene: &Scene, view: &CameraView) -> Result<(), RenderError> {
        if self.disposed {
            return Ok(());
        }
        let mut placements = Vec::new();
        scene.traverse_world(|o, world| {
            if let Some(Label::Overlay3D(label)) = o.label() {
                if let Some(p) = self.place(o.id(), &label.element, world, o.visible, view) {
                    placements.push(p);
                }
            }
        });
        placements.sort_by(|a, b| b.depth.total_cmp(&a.depth));
        self.placements = placements;
        self.frames += 1;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Overlay2DPlacement {
    pub object: ObjectId,
    pub element: ElementHandle,
    /// Centre of the element box.
    pub position: Vec2,
    pub distance: f32,
    /// Higher is nearer the camera and drawn on top.
    pub z_index: usize,
    pub visible: bool,
}

/// Anchors elements at projected points; they never rotate or scale.
#[derive(Debug)]
pub struct Overlay2DRenderer {
    surface: SurfaceStyle,
    placements: Vec<Overlay2DPlacement>,
    frames: u64,
    disposed: bool,
}

impl Overlay2DRenderer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            surface: SurfaceStyle::new(width, height, PointerEvents::None, 2),
            placements: Vec::new(),
            frames: 0,
            disposed: false,
        }
    }

    /// Ordered by ascending `z_index`.
    pub fn placements(&self) -> &[Overlay2DPlacement] {
        &self.placements
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames
    }
}

impl Disposable for Overlay2DRenderer {
    fn dispose(&mut self) {
        self.placements.clear();
        self.surface.attached = false;
        self.disposed = true;
    }

    fn is_disposed(&self) -> bool {
        self.disposed
    }
}

impl RenderPass for Overlay2DRenderer {
    fn surface(&self) -> &SurfaceStyle {
        &self.surface
    }

    fn surface_mut(&mut self) -> &mut SurfaceStyle {
        &mut self.surface
    }

    fn render(&mut self, scene: &Scene, view: &CameraView) -> Result<(), RenderError> {
        if self.disposed {
            return Ok(());
        }
        let (width, height) = (self.surface.width, self.surface.height);
        let mut placements = Vec::new();
        scene.traverse_world(|o, world| {
            let Some(Label::Overlay2D(label)) = o.label() else {
                return;
            };
            let alive = label.element.get().is_some();
            let anchor = world.transform_point3(Vec3::ZERO);
            let clip = view.view_projection * anchor.extend(1.0);
            let (position, on_screen) = if clip.w > 1e-5 {
                let ndc = clip.xyz() / clip.w;
                (to_surface(ndc.xy(), width, height), (0.0..=1.0).contains(&ndc.z))
            } else {
                (Vec2::ZERO, false)
            };
            placements.push(Overlay2DPlacement {
                object: o.id(),
                element: label.element.clone(),
                position,
                distance: view.position.distance(anchor),
                z_index: 0,
                visible: o.visible && alive && on_screen,
            });
        });

        // nearest label gets the highest z_index
        placements.sort_by(|a, b| b.distance.total_cmp(&a.distance));
        for (i, p) in placements.iter_mut().enumerate() {
            p.z_index = i + 1;
        }
        self.placements = placements;
        self.frames += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AssetBase;
    use crate::document::{Document, Element};
    use crate::scene::{Object3D, ObjectKind, PerspectiveCamera};
    use crate::tag::TagFactory;
    use crate::texture::texture_channel;
    use glam::Quat;

    struct Fixture {
        doc: Document,
        scene: Scene,
        camera: ObjectId,
    }

    fn fixture() -> Fixture {
        let doc = Document::from_elements([
            Element::new("a", "A").with_size(100.0, 50.0),
            Element::new("b", "B").with_size(100.0, 50.0),
        ]);
        let mut scene = Scene::new();
        let mut cam = Object3D::new(ObjectKind::Camera(PerspectiveCamera::new(90.0, 1.0, 0.1, 1000.0)));
        cam.position = Vec3::new(0.0, 0.0, 0.1);
        let camera = scene.add(cam);
        Fixture { doc, scene, camera }
    }

    fn view(f: &Fixture) -> CameraView {
        f.scene.camera_view(f.camera, 800, 800).unwrap()
    }

    #[test]
    fn label_straight_ahead_lands_in_the_centre() {
        let mut f = fixture();
        let (loader, _events) = texture_channel(AssetBase::default());
        let factory = TagFactory::new(&f.doc, &loader);
        let label = factory.create_overlay_2d("a", Vec3::new(0.0, 0.0, -50.0), Vec3::ONE).unwrap();
        f.scene.add(label);

        let mut pass = Overlay2DRenderer::new(800, 800);
        pass.render(&f.scene, &view(&f)).unwrap();
        let p = &pass.placements()[0];
        assert!(p.visible);
        assert!((p.position - Vec2::new(400.0, 400.0)).length() < 1e-2);
        assert_eq!(pass.frames_rendered(), 1);
    }

    #[test]
    fn label_behind_camera_is_hidden() {
        let mut f = fixture();
        let (loader, _events) = texture_channel(AssetBase::default());
        let factory = TagFactory::new(&f.doc, &loader);
        f.scene.add(factory.create_overlay_2d("a", Vec3::new(0.0, 0.0, 50.0), Vec3::ONE).unwrap());

        let mut pass = Overlay2DRenderer::new(800, 800);
        pass.render(&f.scene, &view(&f)).unwrap();
        assert!(!pass.placements()[0].visible);
    }

    #[test]
    fn nearer_labels_stack_on_top() {
        let mut f = fixture();
        let (loader, _events) = texture_channel(AssetBase::default());
        let factory = TagFactory::new(&f.doc, &loader);
        let far = f.scene.add(factory.create_overlay_2d("a", Vec3::new(0.0, 0.0, -90.0), Vec3::ONE).unwrap());
        let near = f.scene.add(factory.create_overlay_2d("b", Vec3::new(1.0, 0.0, -10.0), Vec3::ONE).unwrap());

        let mut pass = Overlay2DRenderer::new(800, 800);
        pass.render(&f.scene, &view(&f)).unwrap();
        let order: Vec<(ObjectId, usize)> =
            pass.placements().iter().map(|p| (p.object, p.z_index)).collect();
        assert_eq!(order, [(far, 1), (near, 2)]);
    }

    #[test]
    fn removed_element_hides_label() {
        let mut f = fixture();
        let (loader, _events) = texture_channel(AssetBase::default());
        let label = TagFactory::new(&f.doc, &loader)
            .create_overlay_2d("a", Vec3::new(0.0, 0.0, -5.0), Vec3::ONE)
            .unwrap();
        f.scene.add(label);
        f.doc.remove("a");

        let mut pass = Overlay2DRenderer::new(800, 800);
        pass.render(&f.scene, &view(&f)).unwrap();
        assert!(!pass.placements()[0].visible);

        let mut pass3 = Overlay3DRenderer::new(800, 800);
        pass3.render(&f.scene, &view(&f)).unwrap();
        assert!(pass3.placements().is_empty());
    }

    #[test]
    fn overlay_3d_in_front_faces_the_camera() {
        let mut f = fixture();
        let (loader, _events) = texture_channel(AssetBase::default());
        let factory = TagFactory::new(&f.doc, &loader);
        f.scene.add(factory.create_overlay_3d("a", Vec3::new(0.0, 0.0, -100.0), Vec3::ONE).unwrap());

        let mut pass = Overlay3DRenderer::new(800, 800);
        pass.render(&f.scene, &view(&f)).unwrap();
        let p = &pass.placements()[0];
        assert!(p.visible);
        assert!(!p.back_facing);
        // 100 px wide at distance ~100 with a 90° fov on an 800 px surface
        let width = p.corners[1].x - p.corners[0].x;
        assert!((width - 400.0).abs() < 2.0);
        assert!(p.corners[3].y > p.corners[0].y);
    }

    #[test]
    fn flipped_overlay_3d_behind_faces_the_turned_camera() {
        let mut f = fixture();
        let (loader, _events) = texture_channel(AssetBase::default());
        let factory = TagFactory::new(&f.doc, &loader);
        let behind = Vec3::new(0.0, 0.0, 100.0);
        f.scene.add(factory.create_overlay_3d("a", behind, Vec3::ONE).unwrap());

        // the same element without the correction shows its back
        let mut unflipped = factory.create_overlay_3d("b", Vec3::new(0.0, 0.0, -1.0), Vec3::ONE).unwrap();
        unflipped.position = Vec3::new(0.0, 0.0, 100.0);
        f.scene.add(unflipped);

        f.scene.get_mut(f.camera).unwrap().rotation = Quat::from_rotation_y(std::f32::consts::PI);

        let mut pass = Overlay3DRenderer::new(800, 800);
        pass.render(&f.scene, &view(&f)).unwrap();
        let by_id = |id: &str| pass.placements().iter().find(|p| p.element.id() == id).unwrap();
        assert!(by_id("a").visible && !by_id("a").back_facing);
        assert!(by_id("b").visible && by_id("b").back_facing);
    }

    #[test]
    fn scale_shrinks_3d_overlay() {
        let mut f = fixture();
        let (loader, _events) = texture_channel(AssetBase::default());
        let factory = TagFactory::new(&f.doc, &loader);
        f.scene.add(factory.create_overlay_3d("a", Vec3::new(0.0, 0.0, -100.0), Vec3::splat(0.5)).unwrap());

        let mut pass = Overlay3DRenderer::new(800, 800);
        pass.render(&f.scene, &view(&f)).unwrap();
        let p = &pass.placements()[0];
        assert!(((p.corners[1].x - p.corners[0].x) - 200.0).abs() < 2.0);
    }

    #[test]
    fn disposed_pass_detaches_and_stops() {
        let f = fixture();
        let mut pass = Overlay3DRenderer::new(10, 10);
        pass.dispose();
        pass.dispose();
        assert!(!pass.surface().attached);
        pass.render(&f.scene, &view(&f)).unwrap();
        assert_eq!(pass.frames_rendered(), 0);
    }
}
