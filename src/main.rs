// main.rs — desktop host: window, event loop and input mapping for the composer

#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")] // no console window in release builds

use vr_tags::config::{load_scene, SceneConfig, Viewport};
use vr_tags::controls::{MouseButton as OrbitButton, PointerId, PointerInput};
use vr_tags::debug_panel::{DebugPanel, TagDebug};
use vr_tags::document::Document;
use vr_tags::error::RenderError;
use vr_tags::geometry::SphereParams;
use vr_tags::overlay_paint::paint_overlays;
use vr_tags::renderer::GpuRenderer;
use vr_tags::tag::TagFactory;
use vr_tags::{AnimationHandle, FrameContext, Vr, VrError};

use glam::Vec2;
use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;
use winit::{
    dpi::LogicalSize,
    event::*,
    event_loop::{ControlFlow, EventLoop},
    window::{Fullscreen, Window, WindowBuilder},
};

struct App {
    window: Arc<Window>,
    vr: Vr<GpuRenderer>,
    // labels only hold weak references to these elements
    _document: Document,
    animation: AnimationHandle,
    sphere: SphereParams,
    fullscreen: bool,
    mouse_down: bool,
    cursor: Vec2,
}

fn main() {
    env_logger::init();
    let scene = load_scene();

    let event_loop = EventLoop::new();
    let window = match WindowBuilder::new()
        .with_title("VR Tags")
        .with_inner_size(LogicalSize::new(1280, 720))
        .build(&event_loop)
    {
        Ok(w) => Arc::new(w),
        Err(e) => {
            log::error!("failed to create window: {}", e);
            return;
        }
    };

    let renderer = match pollster::block_on(GpuRenderer::new(window.clone())) {
        Ok(r) => r,
        Err(e) => {
            log::error!("{}", e);
            return;
        }
    };

    let mut app = match App::new(window, renderer, &scene) {
        Ok(app) => app,
        Err(e) => {
            log::error!("{}", e);
            return;
        }
    };

    event_loop.run(move |event, _, control_flow| {
        *control_flow = ControlFlow::Poll;

        match event {
            Event::WindowEvent { event, .. } => {
                // egui first
                let raster = app.vr.raster_mut();
                let response = raster.egui_state.on_event(&raster.egui_ctx, &event);
                if response.consumed {
                    return;
                }
                if app.handle_window_event(event) {
                    *control_flow = ControlFlow::Exit;
                }
            }

            Event::RedrawRequested(_) => match app.vr.tick() {
                Ok(_) => {}
                Err(VrError::Render(RenderError::Surface(wgpu::SurfaceError::Lost))) => {
                    let size = app.vr.size();
                    if let Err(e) = app.vr.resize(size.width, size.height) {
                        log::error!("{}", e);
                    }
                }
                Err(VrError::Render(RenderError::Surface(wgpu::SurfaceError::OutOfMemory)))
                | Err(VrError::Destroyed) => *control_flow = ControlFlow::Exit,
                Err(e) => log::error!("render error: {}", e),
            },

            Event::MainEventsCleared => {
                app.window.request_redraw();
            }

            _ => {}
        }
    });
}

impl App {
    fn new(window: Arc<Window>, renderer: GpuRenderer, scene: &SceneConfig) -> Result<Self, VrError> {
        let size = window.inner_size();
        let mut vr = Vr::new(&scene.camera, &scene.render, Viewport::new(size.width, size.height), renderer);
        vr.init_panorama(&scene.panorama.path, &scene.panorama.sphere)?;
        vr.init_controls(scene.controls)?;

        let document = Document::from_elements(scene.elements.iter().cloned());
        let panel = Rc::new(RefCell::new(DebugPanel::default()));
        add_tags(&mut vr, &document, scene, &mut panel.borrow_mut());

        let ui_window = window.clone();
        let animation = vr.animate(Some(Box::new(move |ctx: &mut FrameContext<'_, GpuRenderer>| {
            let FrameContext { scene, raster, overlay_3d, overlay_2d, .. } = ctx;
            raster.finish_frame(&ui_window, |egui_ctx| {
                paint_overlays(egui_ctx, overlay_3d, overlay_2d);
                panel.borrow_mut().show(egui_ctx, scene);
            });
        })))?;

        Ok(Self {
            window,
            vr,
            _document: document,
            animation,
            sphere: scene.panorama.sphere,
            fullscreen: false,
            mouse_down: false,
            cursor: Vec2::ZERO,
        })
    }

    fn replace_panorama(&mut self, path: PathBuf) {
        if let Err(e) = self.vr.init_panorama(&path, &self.sphere) {
            log::error!("cannot show {:?}: {}", path, e);
        }
    }

    fn input(&mut self, input: PointerInput) {
        if let Err(e) = self.vr.handle_input(input) {
            log::warn!("{}", e);
        }
    }

    /// Returns true when the app should exit.
    fn handle_window_event(&mut self, event: WindowEvent) -> bool {
        match event {
            WindowEvent::CloseRequested => {
                self.animation.cancel();
                if let Err(e) = self.vr.destroy() {
                    log::warn!("{}", e);
                }
                return true;
            }

            WindowEvent::Resized(size) => {
                if let Err(e) = self.vr.resize(size.width, size.height) {
                    log::warn!("{}", e);
                }
            }

            WindowEvent::ScaleFactorChanged { new_inner_size, .. } => {
                if let Err(e) = self.vr.resize(new_inner_size.width, new_inner_size.height) {
                    log::warn!("{}", e);
                }
            }

            WindowEvent::KeyboardInput { input, .. } if input.state == ElementState::Pressed => {
                match input.virtual_keycode {
                    Some(VirtualKeyCode::O) => {
                        if let Some(path) = rfd::FileDialog::new()
                            .add_filter("Images", &["jpg", "jpeg", "png", "bmp"])
                            .pick_file()
                        {
                            self.replace_panorama(path);
                        }
                    }
                    Some(VirtualKeyCode::F11) => {
                        self.fullscreen = !self.fullscreen;
                        self.window
                            .set_fullscreen(self.fullscreen.then_some(Fullscreen::Borderless(None)));
                    }
                    _ => {}
                }
            }

            WindowEvent::DroppedFile(path) => self.replace_panorama(path),

            WindowEvent::CursorMoved { position, .. } => {
                self.cursor = Vec2::new(position.x as f32, position.y as f32);
                if self.mouse_down {
                    self.input(PointerInput::Move { pointer: PointerId::Mouse, position: self.cursor });
                }
            }

            WindowEvent::MouseInput { state, button, .. } => {
                let button = match button {
                    MouseButton::Left => OrbitButton::Left,
                    MouseButton::Right => OrbitButton::Right,
                    MouseButton::Middle => OrbitButton::Middle,
                    MouseButton::Other(_) => return false,
                };
                match state {
                    ElementState::Pressed if !self.mouse_down => {
                        self.mouse_down = true;
                        self.input(PointerInput::Down {
                            pointer: PointerId::Mouse,
                            button,
                            position: self.cursor,
                        });
                    }
                    ElementState::Released if self.mouse_down => {
                        self.mouse_down = false;
                        self.input(PointerInput::Up { pointer: PointerId::Mouse });
                    }
                    _ => {}
                }
            }

            WindowEvent::MouseWheel { delta, .. } => {
                let delta = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(pos) => pos.y as f32 / 20.0,
                };
                self.input(PointerInput::Wheel { delta });
            }

            WindowEvent::Touch(touch) => {
                let pointer = PointerId::Touch(touch.id);
                let position = Vec2::new(touch.location.x as f32, touch.location.y as f32);
                let input = match touch.phase {
                    TouchPhase::Started => PointerInput::Down { pointer, button: OrbitButton::Left, position },
                    TouchPhase::Moved => PointerInput::Move { pointer, position },
                    TouchPhase::Ended | TouchPhase::Cancelled => PointerInput::Up { pointer },
                };
                self.input(input);
            }

            _ => {}
        }
        false
    }
}

fn add_tags(vr: &mut Vr<GpuRenderer>, document: &Document, scene: &SceneConfig, panel: &mut DebugPanel) {
    let loader = vr.texture_loader().clone();
    let factory = TagFactory::new(document, &loader);
    let mut added = 0;

    for (i, entry) in scene.tags.iter().enumerate() {
        let Some(object) = factory.from_config(&entry.tag) else {
            continue;
        };
        let id = vr.scene_mut().add(object);
        added += 1;

        if entry.debug {
            let name = entry.name.clone().unwrap_or_else(|| format!("tag {}", i));
            let mut debug = TagDebug::new(name, panel);
            debug.add_position(id);
            debug.add_scale(id);
            debug.add_rotation(id);
        }
    }
    log::info!("{} of {} tags added", added, scene.tags.len());
}
