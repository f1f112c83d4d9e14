// vr.rs — the scene composer
//
// Owns the scene, the camera node and the three render passes, and keeps them in
// step: every frame all passes read the same scene with the same camera view, and
// resize reaches all of them before the next frame.

use crate::config::{AssetBase, CameraConfig, RenderConfig, Viewport};
use crate::controls::{ControlsParams, OrbitControls, PointerInput};
use crate::dispose::Disposable;
use crate::error::{TextureError, VrError};
use crate::geometry::{build_panorama_surface, SphereParams};
use crate::overlay::{Overlay2DRenderer, Overlay3DRenderer};
use crate::scene::{Object3D, ObjectId, ObjectKind, PerspectiveCamera, Scene};
use crate::surface::{PointerEvents, RenderPass, SurfaceStyle};
use crate::texture::{texture_channel, TextureEvent, TextureEvents, TextureLoader};

use glam::{Vec2, Vec3};
use log::{debug, info, warn};
use std::cell::Cell;
use std::path::Path;
use std::rc::Rc;

/// Camera start point, slightly off the sphere centre so the orbit radius is never zero.
pub const CAMERA_START: Vec3 = Vec3::new(0.0, 0.0, 0.1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VrState {
    Constructed,
    Initialized,
    Running,
    Destroyed,
}

/// Stops the frame loop started by [`Vr::animate`]. Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct AnimationHandle {
    cancelled: Rc<Cell<bool>>,
}

impl AnimationHandle {
    pub fn cancel(&self) {
        self.cancelled.set(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.get()
    }
}

/// What the per-frame callback gets to see, after all passes have rendered.
pub struct FrameContext<'a, R> {
    pub scene: &'a mut Scene,
    pub camera: ObjectId,
    pub raster: &'a mut R,
    pub overlay_3d: &'a Overlay3DRenderer,
    pub overlay_2d: &'a Overlay2DRenderer,
    pub frame: u64,
}

pub type FrameCallback<R> = Box<dyn FnMut(&mut FrameContext<'_, R>)>;

struct Animation<R> {
    handle: AnimationHandle,
    on_frame: Option<FrameCallback<R>>,
}

pub struct Vr<R: RenderPass> {
    scene: Scene,
    camera: ObjectId,
    size: Viewport,
    raster: R,
    overlay_3d: Overlay3DRenderer,
    overlay_2d: Overlay2DRenderer,
    controls: Option<OrbitControls>,
    panorama: Option<ObjectId>,
    loader: TextureLoader,
    events: TextureEvents,
    failures: Vec<TextureError>,
    animation: Option<Animation<R>>,
    frame: u64,
    state: VrState,
}

impl<R: RenderPass> Vr<R> {
    /// `viewport` is the host window size; it fills in whatever the configs leave out.
    pub fn new(camera: &CameraConfig, render: &RenderConfig, viewport: Viewport, raster: R) -> Self {
        Self::with_asset_base(camera, render, viewport, raster, AssetBase::from_env())
    }

    pub fn with_asset_base(
        camera: &CameraConfig,
        render: &RenderConfig,
        viewport: Viewport,
        mut raster: R,
        base: AssetBase,
    ) -> Self {
        let size = render.resolve(viewport);

        let mut scene = Scene::new();
        let mut node = Object3D::new(ObjectKind::Camera(camera.resolve(viewport))).with_name("camera");
        node.position = CAMERA_START;
        let camera = scene.add(node);

        raster.set_size(size.width, size.height);
        *raster.surface_mut() = SurfaceStyle::new(size.width, size.height, PointerEvents::Auto, 0);
        let overlay_3d = Overlay3DRenderer::new(size.width, size.height);
        let overlay_2d = Overlay2DRenderer::new(size.width, size.height);

        let (loader, events) = texture_channel(base);
        info!("composer constructed at {}x{}", size.width, size.height);

        Self {
            scene,
            camera,
            size,
            raster,
            overlay_3d,
            overlay_2d,
            controls: None,
            panorama: None,
            loader,
            events,
            failures: Vec::new(),
            animation: None,
            frame: 0,
            state: VrState::Constructed,
        }
    }

    fn ensure_alive(&self, op: &str) -> Result<(), VrError> {
        if self.state == VrState::Destroyed {
            warn!("{} called on a destroyed composer", op);
            return Err(VrError::Destroyed);
        }
        Ok(())
    }

    pub fn state(&self) -> VrState {
        self.state
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    pub fn camera_id(&self) -> ObjectId {
        self.camera
    }

    pub fn camera(&self) -> Option<&PerspectiveCamera> {
        self.scene.get(self.camera).and_then(Object3D::camera)
    }

    pub fn size(&self) -> Viewport {
        self.size
    }

    pub fn raster(&self) -> &R {
        &self.raster
    }

    pub fn raster_mut(&mut self) -> &mut R {
        &mut self.raster
    }

    pub fn overlay_3d(&self) -> &Overlay3DRenderer {
        &self.overlay_3d
    }

    pub fn overlay_2d(&self) -> &Overlay2DRenderer {
        &self.overlay_2d
    }

    /// Raster, 3D overlay and 2D overlay surfaces, bottom to top.
    pub fn surfaces(&self) -> [SurfaceStyle; 3] {
        [*self.raster.surface(), *self.overlay_3d.surface(), *self.overlay_2d.surface()]
    }

    /// Loader whose failures are reported through [`Vr::take_texture_failures`].
    pub fn texture_loader(&self) -> &TextureLoader {
        &self.loader
    }

    pub fn panorama(&self) -> Option<ObjectId> {
        self.panorama
    }

    pub fn controls_mut(&mut self) -> Option<&mut OrbitControls> {
        self.controls.as_mut()
    }

    /// Texture failures seen since the last call.
    pub fn take_texture_failures(&mut self) -> Vec<TextureError> {
        std::mem::take(&mut self.failures)
    }

    /// Attaches a panorama sphere, replacing and disposing any previous one.
    pub fn init_panorama(
        &mut self,
        texture_path: impl AsRef<Path>,
        params: &SphereParams,
    ) -> Result<ObjectId, VrError> {
        self.ensure_alive("init_panorama")?;
        let mesh = build_panorama_surface(&self.loader, texture_path.as_ref(), params)?;

        if let Some(old) = self.panorama.take() {
            if let Some(mut node) = self.scene.remove(old) {
                node.traverse_mut(&mut |o: &mut Object3D| o.dispose());
                debug!("previous panorama released");
            }
        }
        let id = self.scene.add(Object3D::new(ObjectKind::Mesh(mesh)).with_name("panorama"));
        self.panorama = Some(id);
        if self.state == VrState::Constructed {
            self.state = VrState::Initialized;
        }
        info!("panorama {:?} attached", texture_path.as_ref());
        Ok(id)
    }

    pub fn init_controls(&mut self, params: ControlsParams) -> Result<&mut OrbitControls, VrError> {
        self.ensure_alive("init_controls")?;
        if let Some(mut old) = self.controls.take() {
            old.dispose();
        }
        let viewport = Vec2::new(self.size.width as f32, self.size.height as f32);
        info!("controls attached: {:?}", params);
        Ok(self.controls.insert(OrbitControls::new(params, viewport)))
    }

    /// Forwards input to the controls. Only the raster surface takes pointer input.
    pub fn handle_input(&mut self, input: PointerInput) -> Result<bool, VrError> {
        self.ensure_alive("handle_input")?;
        if !self.raster.surface().accepts_pointer() {
            return Ok(false);
        }
        let (Some(controls), Some(camera)) = (self.controls.as_mut(), self.scene.get(self.camera)) else {
            return Ok(false);
        };
        Ok(controls.handle_input(input, camera))
    }

    /// Arms the frame loop. The host drives it by calling [`Vr::tick`] once per redraw.
    pub fn animate(&mut self, on_frame: Option<FrameCallback<R>>) -> Result<AnimationHandle, VrError> {
        self.ensure_alive("animate")?;
        let handle = AnimationHandle::default();
        self.animation = Some(Animation { handle: handle.clone(), on_frame });
        self.state = VrState::Running;
        info!("animation started");
        Ok(handle)
    }

    fn drain_texture_events(&mut self) {
        for event in self.events.poll() {
            match event {
                TextureEvent::Loaded { id, width, height } => {
                    debug!("texture {:?} ready ({}x{})", id, width, height)
                }
                TextureEvent::Failed { error, .. } => {
                    warn!("{}", error);
                    self.failures.push(error);
                }
            }
        }
    }

    /// Runs one frame: controls, raster, 3D overlay, 2D overlay, then the callback.
    /// Returns false when no loop is armed or it was cancelled.
    pub fn tick(&mut self) -> Result<bool, VrError> {
        self.ensure_alive("tick")?;
        let cancelled = match &self.animation {
            None => return Ok(false),
            Some(a) => a.handle.is_cancelled(),
        };
        if cancelled {
            self.animation = None;
            info!("animation cancelled after {} frames", self.frame);
            return Ok(false);
        }

        self.drain_texture_events();

        if let Some(controls) = self.controls.as_mut() {
            let camera = self.scene.get_mut(self.camera).ok_or(VrError::MissingCamera)?;
            controls.update(camera);
        }

        let view = self
            .scene
            .camera_view(self.camera, self.size.width, self.size.height)
            .ok_or(VrError::MissingCamera)?;
        self.raster.render(&self.scene, &view)?;
        self.overlay_3d.render(&self.scene, &view)?;
        self.overlay_2d.render(&self.scene, &view)?;

        if let Some(on_frame) = self.animation.as_mut().and_then(|a| a.on_frame.as_mut()) {
            let mut ctx = FrameContext {
                scene: &mut self.scene,
                camera: self.camera,
                raster: &mut self.raster,
                overlay_3d: &self.overlay_3d,
                overlay_2d: &self.overlay_2d,
                frame: self.frame,
            };
            on_frame(&mut ctx);
        }
        self.frame += 1;
        Ok(true)
    }

    /// Resizes every pass and the camera together. Zero sizes (minimised window) are ignored.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), VrError> {
        self.ensure_alive("resize")?;
        if width == 0 || height == 0 {
            debug!("ignoring resize to {}x{}", width, height);
            return Ok(());
        }
        self.size = Viewport::new(width, height);
        self.raster.set_size(width, height);
        self.overlay_3d.set_size(width, height);
        self.overlay_2d.set_size(width, height);

        let camera = self
            .scene
            .get_mut(self.camera)
            .and_then(Object3D::camera_mut)
            .ok_or(VrError::MissingCamera)?;
        camera.aspect = self.size.aspect();
        camera.update_projection_matrix();

        if let Some(controls) = self.controls.as_mut() {
            controls.set_viewport(Vec2::new(width as f32, height as f32));
        }
        debug!("resized to {}x{}", width, height);
        Ok(())
    }

    /// Releases everything the scene and the passes hold. A second call does nothing.
    pub fn destroy(&mut self) -> Result<(), VrError> {
        if self.state == VrState::Destroyed {
            debug!("destroy called twice");
            return Ok(());
        }
        let mut released = 0;
        self.scene.traverse_mut(|o| {
            if !o.is_disposed() {
                o.dispose();
                released += 1;
            }
        });
        self.raster.dispose();
        if let Some(controls) = self.controls.as_mut() {
            controls.dispose();
        }
        self.overlay_3d.dispose();
        self.overlay_2d.dispose();
        self.animation = None;
        self.state = VrState::Destroyed;
        info!("composer destroyed, {} scene resources released", released);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DEFAULT_FAR, DEFAULT_FOV, DEFAULT_NEAR};
    use crate::document::{Document, Element};
    use crate::error::RenderError;
    use crate::scene::CameraView;
    use crate::tag::{Label, OverlayParams, SpriteParams, TagFactory};
    use std::cell::RefCell;
    use std::path::PathBuf;
    use std::time::{Duration, Instant};

    #[derive(Debug, Clone, PartialEq)]
    struct RenderRecord {
        width: u32,
        height: u32,
        camera: Vec3,
        meshes: usize,
    }

    /// Raster pass double that remembers what it was asked to draw.
    struct RecordingRaster {
        style: SurfaceStyle,
        renders: Vec<RenderRecord>,
        dispose_calls: usize,
        disposed: bool,
    }

    impl RecordingRaster {
        fn new() -> Self {
            Self {
                style: SurfaceStyle::new(1, 1, PointerEvents::None, 7),
                renders: Vec::new(),
                dispose_calls: 0,
                disposed: false,
            }
        }
    }

    impl Disposable for RecordingRaster {
        fn dispose(&mut self) {
            self.dispose_calls += 1;
            self.style.attached = false;
            self.disposed = true;
        }

        fn is_disposed(&self) -> bool {
            self.disposed
        }
    }

    impl RenderPass for RecordingRaster {
        fn surface(&self) -> &SurfaceStyle {
            &self.style
        }

        fn surface_mut(&mut self) -> &mut SurfaceStyle {
            &mut self.style
        }

        fn render(&mut self, scene: &Scene, view: &CameraView) -> Result<(), RenderError> {
            self.renders.push(RenderRecord {
                width: view.width,
                height: view.height,
                camera: view.position,
                meshes: scene.mesh_count(),
            });
            Ok(())
        }
    }

    fn composer() -> Vr<RecordingRaster> {
        Vr::with_asset_base(
            &CameraConfig::default(),
            &RenderConfig::default(),
            Viewport::new(800, 600),
            RecordingRaster::new(),
            AssetBase::new("/nonexistent/assets"),
        )
    }

    fn sphere() -> SphereParams {
        SphereParams { radius: 500.0, width_segments: 60, height_segments: 40 }
    }

    #[test]
    fn construct_stacks_surfaces_over_one_rect() {
        let vr = composer();
        let [raster, three, two] = vr.surfaces();
        assert!(raster.accepts_pointer());
        assert!(!three.accepts_pointer());
        assert!(!two.accepts_pointer());
        assert!(raster.z_index < three.z_index && three.z_index < two.z_index);
        assert!(raster.covers_same_rect(&three) && three.covers_same_rect(&two));
        assert_eq!((raster.width, raster.height), (800, 600));

        let cam = vr.camera().unwrap();
        assert_eq!((cam.fov, cam.near, cam.far), (DEFAULT_FOV, DEFAULT_NEAR, DEFAULT_FAR));
        assert!((cam.aspect - 800.0 / 600.0).abs() < 1e-6);
        assert_eq!(vr.scene().get(vr.camera_id()).unwrap().position, CAMERA_START);
        assert_eq!(vr.state(), VrState::Constructed);
    }

    #[test]
    fn render_config_overrides_viewport() {
        let vr = Vr::with_asset_base(
            &CameraConfig { fov: Some(60.0), ..Default::default() },
            &RenderConfig { width: Some(320), height: Some(240) },
            Viewport::new(800, 600),
            RecordingRaster::new(),
            AssetBase::default(),
        );
        assert_eq!(vr.size(), Viewport::new(320, 240));
        assert_eq!(vr.surfaces()[0].width, 320);
        assert_eq!(vr.camera().unwrap().fov, 60.0);
    }

    #[test]
    fn panorama_replacement_keeps_one_mesh() {
        let mut vr = composer();
        let first = vr.init_panorama("pano.jpg", &sphere()).unwrap();
        assert_eq!(vr.scene().mesh_count(), 1);
        assert_eq!(vr.state(), VrState::Initialized);

        let second = vr.init_panorama("other.jpg", &sphere()).unwrap();
        assert_ne!(first, second);
        assert_eq!(vr.scene().mesh_count(), 1);
        assert!(vr.scene().get(first).is_none());
        assert_eq!(vr.panorama(), Some(second));
    }

    #[test]
    fn invalid_sphere_keeps_previous_panorama() {
        let mut vr = composer();
        let id = vr.init_panorama("pano.jpg", &sphere()).unwrap();
        let bad = SphereParams { radius: -1.0, ..sphere() };
        assert!(matches!(vr.init_panorama("x.jpg", &bad), Err(VrError::Geometry(_))));
        assert_eq!(vr.panorama(), Some(id));
        assert_eq!(vr.scene().mesh_count(), 1);
    }

    #[test]
    fn resize_is_idempotent() {
        let mut vr = composer();
        vr.init_controls(ControlsParams::default()).unwrap();
        vr.resize(1024, 512).unwrap();
        let once = (vr.surfaces(), vr.camera().unwrap().clone());
        vr.resize(1024, 512).unwrap();
        let twice = (vr.surfaces(), vr.camera().unwrap().clone());
        assert_eq!(once, twice);
        assert!(twice.0.iter().all(|s| (s.width, s.height) == (1024, 512)));
        assert!((twice.1.aspect - 2.0).abs() < 1e-6);
    }

    #[test]
    fn zero_resize_is_ignored() {
        let mut vr = composer();
        vr.resize(0, 300).unwrap();
        assert_eq!(vr.size(), Viewport::new(800, 600));
    }

    #[test]
    fn resize_reaches_the_next_frame() {
        let mut vr = composer();
        vr.animate(None).unwrap();
        vr.tick().unwrap();
        vr.resize(640, 480).unwrap();
        vr.tick().unwrap();
        let renders = &vr.raster().renders;
        assert_eq!((renders[0].width, renders[0].height), (800, 600));
        assert_eq!((renders[1].width, renders[1].height), (640, 480));
        assert_eq!(vr.overlay_2d().surface().width, 640);
    }

    #[test]
    fn destroy_releases_every_node_and_is_idempotent() {
        let mut vr = composer();
        vr.init_panorama("pano.jpg", &sphere()).unwrap();
        vr.init_controls(ControlsParams::default()).unwrap();

        let doc = Document::from_elements([Element::new("tv", "TV")]);
        let loader = vr.texture_loader().clone();
        let factory = TagFactory::new(&doc, &loader);
        let composite = factory.create_sprite_with_overlay_2d(
            &OverlayParams { element_id: "tv".into(), offset: Vec3::Y },
            &SpriteParams {
                position: Vec3::new(0.0, 0.0, -30.0),
                scale: Vec3::ONE,
                texture_path: PathBuf::from("tag.png"),
                rotation: 0.0,
            },
        );
        vr.scene_mut().add(composite);

        vr.destroy().unwrap();
        vr.destroy().unwrap();

        assert_eq!(vr.state(), VrState::Destroyed);
        assert_eq!(vr.raster().dispose_calls, 1);
        assert!(vr.surfaces().iter().all(|s| !s.attached));
        let mut live = 0;
        vr.scene().traverse(|o| {
            if !o.is_disposed() {
                live += 1;
            }
            if let Some(mesh) = o.mesh() {
                assert!(mesh.geometry.positions.is_empty());
            }
            if let Some(Label::Sprite(s)) = o.label() {
                assert!(s.material.map.as_ref().is_some_and(|t| t.is_disposed()));
            }
        });
        assert_eq!(live, 0);
        // the element outlives the labels that pointed at it
        assert!(doc.get_element_by_id("tv").is_some());
    }

    #[test]
    fn operations_after_destroy_fail() {
        let mut vr = composer();
        vr.destroy().unwrap();
        assert!(matches!(vr.init_panorama("p.jpg", &sphere()), Err(VrError::Destroyed)));
        assert!(matches!(vr.init_controls(ControlsParams::default()), Err(VrError::Destroyed)));
        assert!(matches!(vr.resize(10, 10), Err(VrError::Destroyed)));
        assert!(matches!(vr.animate(None), Err(VrError::Destroyed)));
        assert!(matches!(vr.tick(), Err(VrError::Destroyed)));
        assert!(matches!(vr.handle_input(PointerInput::Wheel { delta: 1.0 }), Err(VrError::Destroyed)));
    }

    #[test]
    fn tick_needs_an_armed_loop() {
        let mut vr = composer();
        assert!(!vr.tick().unwrap());
        assert!(vr.raster().renders.is_empty());

        let handle = vr.animate(None).unwrap();
        assert_eq!(vr.state(), VrState::Running);
        assert!(vr.tick().unwrap());
        assert!(vr.tick().unwrap());
        handle.cancel();
        assert!(!vr.tick().unwrap());
        assert!(!vr.tick().unwrap());
        assert_eq!(vr.raster().renders.len(), 2);
    }

    #[test]
    fn callback_runs_after_all_passes() {
        let mut vr = composer();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = seen.clone();
        vr.animate(Some(Box::new(move |ctx: &mut FrameContext<'_, RecordingRaster>| {
            log.borrow_mut().push((
                ctx.frame,
                ctx.raster.renders.len() as u64,
                ctx.overlay_3d.frames_rendered(),
                ctx.overlay_2d.frames_rendered(),
            ));
        })))
        .unwrap();
        vr.tick().unwrap();
        vr.tick().unwrap();
        assert_eq!(*seen.borrow(), [(0, 1, 1, 1), (1, 2, 2, 2)]);
    }

    #[test]
    fn callback_can_cancel_its_own_loop() {
        let mut vr = composer();
        let slot: Rc<RefCell<Option<AnimationHandle>>> = Rc::default();
        let inner = slot.clone();
        let handle = vr
            .animate(Some(Box::new(move |_ctx: &mut FrameContext<'_, RecordingRaster>| {
                if let Some(h) = inner.borrow().as_ref() {
                    h.cancel();
                }
            })))
            .unwrap();
        *slot.borrow_mut() = Some(handle);
        assert!(vr.tick().unwrap());
        assert!(!vr.tick().unwrap());
    }

    #[test]
    fn controls_update_before_render() {
        let mut vr = composer();
        vr.init_controls(ControlsParams::default()).unwrap().rotate_left(0.5);
        vr.animate(None).unwrap();
        vr.tick().unwrap();

        let rendered = vr.raster().renders[0].camera;
        let now = vr.scene().get(vr.camera_id()).unwrap().position;
        assert!((rendered - now).length() < 1e-6);
        assert!((rendered - CAMERA_START).length() > 1e-4);
    }

    #[test]
    fn input_goes_to_controls_only_through_raster_surface() {
        let mut vr = composer();
        assert!(!vr.handle_input(PointerInput::Wheel { delta: 1.0 }).unwrap());

        vr.init_controls(ControlsParams { enable_zoom: true, ..Default::default() }).unwrap();
        assert!(vr.handle_input(PointerInput::Wheel { delta: 1.0 }).unwrap());

        vr.raster_mut().surface_mut().pointer_events = PointerEvents::None;
        assert!(!vr.handle_input(PointerInput::Wheel { delta: 1.0 }).unwrap());
    }

    #[test]
    fn texture_failures_surface_through_ticks() {
        let mut vr = composer();
        vr.init_panorama("missing.jpg", &sphere()).unwrap();
        vr.animate(None).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut failures = Vec::new();
        while failures.is_empty() && Instant::now() < deadline {
            vr.tick().unwrap();
            failures.extend(vr.take_texture_failures());
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(failures.len(), 1);
        assert!(failures[0].path().ends_with("missing.jpg"));
        assert!(vr.take_texture_failures().is_empty());
        assert!(vr.raster().renders.iter().all(|r| r.meshes == 1));
    }
}
