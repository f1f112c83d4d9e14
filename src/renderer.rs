// renderer.rs — GPU raster pass (meshes + sprites) and the egui layer on top

use crate::dispose::Disposable;
use crate::error::RenderError;
use crate::geometry::{Geometry, GeometryGroup, GeometryId};
use crate::material::Side;
use crate::scene::{CameraView, Scene};
use crate::surface::{PointerEvents, RenderPass, SurfaceStyle};
use crate::tag::Label;
use crate::texture::{Texture, TextureId, TextureState};

use glam::{Mat4, Vec3};
use image::RgbaImage;
use std::collections::{HashMap, HashSet};
use std::ops::Range;
use std::sync::Arc;
use wgpu::util::DeviceExt;
use winit::window::Window;

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
/// Dynamic uniform offsets must be multiples of this.
const UNIFORM_STRIDE: u64 = 256;

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct DrawUniform {
    model_view: [[f32; 4]; 4],
    projection: [[f32; 4]; 4],
    sprite: [f32; 4],
    color: [f32; 4],
}

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct Vertex {
    position: [f32; 3],
    uv: [f32; 2],
}

impl Vertex {
    const ATTRIBS: [wgpu::VertexAttribute; 2] = wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x2];

    fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBS,
        }
    }
}

/// Largest size that fits in `max` on both axes, keeping the aspect ratio.
fn fit_dimensions(width: u32, height: u32, max: u32) -> (u32, u32) {
    if width <= max && height <= max {
        return (width, height);
    }
    let shrink = |side: u32, long: u32| ((side as u64 * max as u64 / long as u64) as u32).max(1);
    if width >= height {
        (max, shrink(height, width))
    } else {
        (shrink(width, height), max)
    }
}

/// World-space size of a sprite quad: length of the X and Y basis vectors.
fn sprite_scale(world: &Mat4) -> [f32; 2] {
    [world.x_axis.truncate().length(), world.y_axis.truncate().length()]
}

fn side_index(side: Side) -> usize {
    match side {
        Side::Front => 0,
        Side::Back => 1,
        Side::Double => 2,
    }
}

struct GpuGeometry {
    vertices: wgpu::Buffer,
    indices: wgpu::Buffer,
}

struct GpuTexture {
    _texture: wgpu::Texture,
    bind_group: wgpu::BindGroup,
}

#[derive(Clone, Copy)]
enum TextureSlot {
    Uploaded(TextureId),
    Placeholder,
}

enum DrawKind {
    Mesh { geometry: GeometryId, side: Side, range: Range<u32> },
    Sprite,
}

struct DrawCall {
    kind: DrawKind,
    texture: TextureSlot,
    uniform: DrawUniform,
    /// View-space depth, used to order sprites back to front.
    depth: f32,
}

struct Frame {
    output: wgpu::SurfaceTexture,
    view: wgpu::TextureView,
}

pub struct GpuRenderer {
    surface: wgpu::Surface,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    style: SurfaceStyle,
    depth_view: wgpu::TextureView,

    mesh_pipelines: [wgpu::RenderPipeline; 3],
    sprite_pipeline: wgpu::RenderPipeline,

    draw_layout: wgpu::BindGroupLayout,
    draw_buffer: wgpu::Buffer,
    draw_bind_group: wgpu::BindGroup,
    draw_capacity: u64,

    texture_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    placeholder: wgpu::BindGroup,
    textures: HashMap<TextureId, GpuTexture>,
    geometries: HashMap<GeometryId, GpuGeometry>,

    pending: Option<Frame>,
    disposed: bool,

    // UI
    pub egui_ctx: egui::Context,
    pub egui_state: egui_winit::State,
    egui_renderer: egui_wgpu::Renderer,
}

impl GpuRenderer {
    pub async fn new(window: Arc<Window>) -> Result<Self, RenderError> {
        let size = window.inner_size();
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = unsafe { instance.create_surface(window.as_ref()) }?;
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or(RenderError::NoAdapter)?;
        log::info!("using adapter {:?}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    features: wgpu::Features::empty(),
                    limits: wgpu::Limits::default().using_resolution(adapter.limits()),
                    label: None,
                },
                None,
            )
            .await?;

        let caps = surface.get_capabilities(&adapter);
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| caps.formats.first().copied())
            .ok_or(RenderError::NoAdapter)?;
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: caps.alpha_modes.first().copied().unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
        };
        surface.configure(&device, &config);
        let depth_view = create_depth_view(&device, config.width, config.height);

        let draw_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("draw_layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: wgpu::BufferSize::new(std::mem::size_of::<DrawUniform>() as u64),
                },
                count: None,
            }],
        });
        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("texture_layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let draw_capacity = 64;
        let (draw_buffer, draw_bind_group) = create_draw_buffer(&device, &draw_layout, draw_capacity);

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            // panoramas wrap horizontally
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        // 2x2 checkerboard shown on meshes until their texture arrives
        let checker = RgbaImage::from_raw(
            2,
            2,
            vec![255, 0, 0, 255, 0, 255, 0, 255, 0, 0, 255, 255, 255, 255, 0, 255],
        )
        .unwrap_or_else(|| RgbaImage::new(2, 2));
        let placeholder =
            upload_texture(&device, &queue, &texture_layout, &sampler, &checker, "placeholder").bind_group;

        let shader = device.create_shader_module(wgpu::include_wgsl!("scene.wgsl"));
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("scene_layout"),
            bind_group_layouts: &[&draw_layout, &texture_layout],
            push_constant_ranges: &[],
        });
        let mesh_pipelines = [Side::Front, Side::Back, Side::Double]
            .map(|side| create_mesh_pipeline(&device, &layout, &shader, format, side));
        let sprite_pipeline = create_sprite_pipeline(&device, &layout, &shader, format);

        let egui_ctx = egui::Context::default();
        crate::fonts::setup_egui_fonts(&egui_ctx);
        let mut egui_state = egui_winit::State::new(window.as_ref());
        egui_state.set_pixels_per_point(window.scale_factor() as f32);
        let egui_renderer = egui_wgpu::Renderer::new(&device, format, None, 1);

        Ok(Self {
            surface,
            device,
            queue,
            style: SurfaceStyle::new(config.width, config.height, PointerEvents::Auto, 0),
            config,
            depth_view,
            mesh_pipelines,
            sprite_pipeline,
            draw_layout,
            draw_buffer,
            draw_bind_group,
            draw_capacity,
            texture_layout,
            sampler,
            placeholder,
            textures: HashMap::new(),
            geometries: HashMap::new(),
            pending: None,
            disposed: false,
            egui_ctx,
            egui_state,
            egui_renderer,
        })
    }

    /// Uploads a texture the first time it is seen ready. `None` while it is still loading.
    fn prepare_texture(&mut self, texture: &Texture) -> Option<TextureId> {
        let id = texture.id();
        if self.textures.contains_key(&id) {
            return Some(id);
        }
        let TextureState::Ready(img) = texture.state() else {
            return None;
        };

        let max = self.device.limits().max_texture_dimension_2d;
        let (w, h) = img.dimensions();
        let (fit_w, fit_h) = fit_dimensions(w, h, max);
        let gpu = if (fit_w, fit_h) != (w, h) {
            log::warn!("texture {:?} is {}x{}, above the GPU limit {}; scaled to {}x{}", texture.path(), w, h, max, fit_w, fit_h);
            let scaled = image::imageops::resize(img.as_ref(), fit_w, fit_h, image::imageops::FilterType::Lanczos3);
            upload_texture(&self.device, &self.queue, &self.texture_layout, &self.sampler, &scaled, "map")
        } else {
            upload_texture(&self.device, &self.queue, &self.texture_layout, &self.sampler, &img, "map")
        };
        self.textures.insert(id, gpu);
        Some(id)
    }

    fn prepare_geometry(&mut self, geometry: &Geometry) -> GeometryId {
        let id = geometry.id();
        if !self.geometries.contains_key(&id) {
            let vertices: Vec<Vertex> = geometry
                .positions
                .iter()
                .zip(&geometry.uvs)
                .map(|(&position, &uv)| Vertex { position, uv })
                .collect();
            let gpu = GpuGeometry {
                vertices: self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("vertices"),
                    contents: bytemuck::cast_slice(&vertices),
                    usage: wgpu::BufferUsages::VERTEX,
                }),
                indices: self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("indices"),
                    contents: bytemuck::cast_slice(&geometry.indices),
                    usage: wgpu::BufferUsages::INDEX,
                }),
            };
            self.geometries.insert(id, gpu);
        }
        id
    }

    fn collect_draws(&mut self, scene: &Scene, view: &CameraView) -> Vec<DrawCall> {
        let projection = view.projection.to_cols_array_2d();
        let mut draws = Vec::new();

        scene.traverse_world(|o, world| {
            if !o.visible {
                return;
            }
            let model_view = view.view * world;
            let depth = -model_view.transform_point3(Vec3::ZERO).z;

            if let Some(mesh) = o.mesh() {
                if mesh.geometry.is_disposed() || mesh.geometry.indices.is_empty() {
                    return;
                }
                let geometry = self.prepare_geometry(&mesh.geometry);
                let whole = [GeometryGroup {
                    start: 0,
                    count: mesh.geometry.indices.len() as u32,
                    material_index: 0,
                }];
                let groups = if mesh.geometry.groups.is_empty() { &whole[..] } else { &mesh.geometry.groups[..] };
                for group in groups {
                    let Some(material) = mesh.material.get(group.material_index) else {
                        continue;
                    };
                    if material.is_disposed() {
                        continue;
                    }
                    let texture = match &material.maps.map {
                        Some(t) => self.prepare_texture(t).map_or(TextureSlot::Placeholder, TextureSlot::Uploaded),
                        None => TextureSlot::Placeholder,
                    };
                    draws.push(DrawCall {
                        kind: DrawKind::Mesh {
                            geometry,
                            side: material.side,
                            range: group.start..group.start + group.count,
                        },
                        texture,
                        uniform: DrawUniform {
                            model_view: model_view.to_cols_array_2d(),
                            projection,
                            sprite: [0.0; 4],
                            color: material.color,
                        },
                        depth,
                    });
                }
            } else if let Some(Label::Sprite(sprite)) = o.label() {
                let material = &sprite.material;
                if material.is_disposed() {
                    return;
                }
                // sprites are skipped until their texture is ready
                let Some(texture) = material.map.as_ref().and_then(|t| self.prepare_texture(t)) else {
                    return;
                };
                let [sx, sy] = sprite_scale(&world);
                draws.push(DrawCall {
                    kind: DrawKind::Sprite,
                    texture: TextureSlot::Uploaded(texture),
                    uniform: DrawUniform {
                        model_view: model_view.to_cols_array_2d(),
                        projection,
                        sprite: [sx, sy, material.rotation, 0.0],
                        color: material.color,
                    },
                    depth,
                });
            }
        });

        // opaque meshes first, then sprites back to front
        draws.sort_by(|a, b| match (&a.kind, &b.kind) {
            (DrawKind::Mesh { .. }, DrawKind::Sprite) => std::cmp::Ordering::Less,
            (DrawKind::Sprite, DrawKind::Mesh { .. }) => std::cmp::Ordering::Greater,
            (DrawKind::Sprite, DrawKind::Sprite) => b.depth.total_cmp(&a.depth),
            _ => std::cmp::Ordering::Equal,
        });
        draws
    }

    /// Drops GPU copies of resources no longer reachable from the scene.
    fn sweep(&mut self, draws: &[DrawCall]) {
        let mut textures = HashSet::new();
        let mut geometries = HashSet::new();
        for d in draws {
            if let TextureSlot::Uploaded(id) = d.texture {
                textures.insert(id);
            }
            if let DrawKind::Mesh { geometry, .. } = d.kind {
                geometries.insert(geometry);
            }
        }
        self.textures.retain(|id, _| textures.contains(id));
        self.geometries.retain(|id, _| geometries.contains(id));
    }

    fn write_uniforms(&mut self, draws: &[DrawCall]) {
        let needed = draws.len() as u64;
        if needed > self.draw_capacity {
            let capacity = needed.next_power_of_two();
            let (buffer, bind_group) = create_draw_buffer(&self.device, &self.draw_layout, capacity);
            self.draw_buffer = buffer;
            self.draw_bind_group = bind_group;
            self.draw_capacity = capacity;
        }
        let mut bytes = vec![0u8; (needed * UNIFORM_STRIDE) as usize];
        for (i, d) in draws.iter().enumerate() {
            let start = i * UNIFORM_STRIDE as usize;
            let src = bytemuck::bytes_of(&d.uniform);
            bytes[start..start + src.len()].copy_from_slice(src);
        }
        if !bytes.is_empty() {
            self.queue.write_buffer(&self.draw_buffer, 0, &bytes);
        }
    }

    fn present_pending(&mut self) {
        if let Some(frame) = self.pending.take() {
            frame.output.present();
        }
    }

    /// Draws the egui layer over the frame rendered by the last `render` call, then presents it.
    pub fn finish_frame(&mut self, window: &Window, run_ui: impl FnOnce(&egui::Context)) {
        let Some(frame) = self.pending.take() else {
            return;
        };

        let raw_input = self.egui_state.take_egui_input(window);
        let full_output = self.egui_ctx.run(raw_input, run_ui);
        self.egui_state
            .handle_platform_output(window, &self.egui_ctx, full_output.platform_output);
        let clipped_primitives = self.egui_ctx.tessellate(full_output.shapes);

        let screen_descriptor = egui_wgpu::renderer::ScreenDescriptor {
            size_in_pixels: [self.config.width, self.config.height],
            pixels_per_point: window.scale_factor() as f32,
        };

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("egui_encoder"),
        });
        for (id, delta) in &full_output.textures_delta.set {
            self.egui_renderer.update_texture(&self.device, &self.queue, *id, delta);
        }
        self.egui_renderer.update_buffers(
            &self.device,
            &self.queue,
            &mut encoder,
            &clipped_primitives,
            &screen_descriptor,
        );
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("egui_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &frame.view,
                    resolve_target: None,
                    ops: wgpu::Operations { load: wgpu::LoadOp::Load, store: true },
                })],
                depth_stencil_attachment: None,
            });
            self.egui_renderer.render(&mut render_pass, &clipped_primitives, &screen_descriptor);
        }
        for id in &full_output.textures_delta.free {
            self.egui_renderer.free_texture(id);
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        frame.output.present();
    }
}

impl Disposable for GpuRenderer {
    fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.pending = None;
        self.textures.clear();
        self.geometries.clear();
        self.style.attached = false;
        self.disposed = true;
        log::debug!("raster renderer disposed");
    }

    fn is_disposed(&self) -> bool {
        self.disposed
    }
}

impl RenderPass for GpuRenderer {
    fn surface(&self) -> &SurfaceStyle {
        &self.style
    }

    fn surface_mut(&mut self) -> &mut SurfaceStyle {
        &mut self.style
    }

    fn set_size(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.style.width = width;
        self.style.height = height;
        self.config.width = width;
        self.config.height = height;
        // a frame acquired at the old size cannot be presented after reconfiguring
        self.pending = None;
        self.surface.configure(&self.device, &self.config);
        self.depth_view = create_depth_view(&self.device, width, height);
    }

    fn render(&mut self, scene: &Scene, view: &CameraView) -> Result<(), RenderError> {
        if self.disposed {
            return Ok(());
        }
        // a frame nobody finished still has to reach the screen
        self.present_pending();

        let draws = self.collect_draws(scene, view);
        self.sweep(&draws);
        self.write_uniforms(&draws);

        let output = self.surface.get_current_texture()?;
        let target = output.texture.create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("scene_encoder"),
        });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("scene_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color { r: 0.1, g: 0.1, b: 0.1, a: 1.0 }),
                        store: true,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_view,
                    depth_ops: Some(wgpu::Operations { load: wgpu::LoadOp::Clear(1.0), store: true }),
                    stencil_ops: None,
                }),
            });

            for (i, d) in draws.iter().enumerate() {
                let bind_group = match d.texture {
                    TextureSlot::Uploaded(id) => match self.textures.get(&id) {
                        Some(t) => &t.bind_group,
                        None => &self.placeholder,
                    },
                    TextureSlot::Placeholder => &self.placeholder,
                };
                let offset = (i as u64 * UNIFORM_STRIDE) as wgpu::DynamicOffset;
                pass.set_bind_group(0, &self.draw_bind_group, &[offset]);
                pass.set_bind_group(1, bind_group, &[]);

                match &d.kind {
                    DrawKind::Mesh { geometry, side, range } => {
                        let Some(gpu) = self.geometries.get(geometry) else {
                            continue;
                        };
                        pass.set_pipeline(&self.mesh_pipelines[side_index(*side)]);
                        pass.set_vertex_buffer(0, gpu.vertices.slice(..));
                        pass.set_index_buffer(gpu.indices.slice(..), wgpu::IndexFormat::Uint32);
                        pass.draw_indexed(range.clone(), 0, 0..1);
                    }
                    DrawKind::Sprite => {
                        pass.set_pipeline(&self.sprite_pipeline);
                        pass.draw(0..6, 0..1);
                    }
                }
            }
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        self.pending = Some(Frame { output, view: target });
        Ok(())
    }
}

fn create_depth_view(device: &wgpu::Device, width: u32, height: u32) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("depth"),
        size: wgpu::Extent3d { width: width.max(1), height: height.max(1), depth_or_array_layers: 1 },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}

fn create_draw_buffer(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    capacity: u64,
) -> (wgpu::Buffer, wgpu::BindGroup) {
    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("draw_uniforms"),
        size: capacity * UNIFORM_STRIDE,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("draw_bind_group"),
        layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                buffer: &buffer,
                offset: 0,
                size: wgpu::BufferSize::new(std::mem::size_of::<DrawUniform>() as u64),
            }),
        }],
    });
    (buffer, bind_group)
}

fn upload_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    layout: &wgpu::BindGroupLayout,
    sampler: &wgpu::Sampler,
    img: &RgbaImage,
    label: &str,
) -> GpuTexture {
    let (width, height) = img.dimensions();
    let size = wgpu::Extent3d { width, height, depth_or_array_layers: 1 };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8UnormSrgb,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        label: Some(label),
        view_formats: &[],
    });
    queue.write_texture(
        wgpu::ImageCopyTexture {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        img.as_raw(),
        wgpu::ImageDataLayout {
            offset: 0,
            bytes_per_row: Some(4 * width),
            rows_per_image: Some(height),
        },
        size,
    );
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        layout,
        entries: &[
            wgpu::BindGroupEntry { binding: 0, resource: wgpu::BindingResource::TextureView(&view) },
            wgpu::BindGroupEntry { binding: 1, resource: wgpu::BindingResource::Sampler(sampler) },
        ],
        label: Some(label),
    });
    GpuTexture { _texture: texture, bind_group }
}

fn create_mesh_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    shader: &wgpu::ShaderModule,
    format: wgpu::TextureFormat,
    side: Side,
) -> wgpu::RenderPipeline {
    let cull_mode = match side {
        Side::Front => Some(wgpu::Face::Back),
        Side::Back => Some(wgpu::Face::Front),
        Side::Double => None,
    };
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("mesh_pipeline"),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: "vs_mesh",
            buffers: &[Vertex::layout()],
        },
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: "fs_main",
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: Some(wgpu::BlendState::REPLACE),
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState { count: 1, mask: !0, alpha_to_coverage_enabled: false },
        multiview: None,
    })
}

fn create_sprite_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    shader: &wgpu::ShaderModule,
    format: wgpu::TextureFormat,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("sprite_pipeline"),
        layout: Some(layout),
        vertex: wgpu::VertexState { module: shader, entry_point: "vs_sprite", buffers: &[] },
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: "fs_main",
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            cull_mode: None,
            ..Default::default()
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: false,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState { count: 1, mask: !0, alpha_to_coverage_enabled: false },
        multiview: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Quat;

    #[test]
    fn oversized_images_keep_aspect() {
        assert_eq!(fit_dimensions(4096, 2048, 8192), (4096, 2048));
        assert_eq!(fit_dimensions(16384, 8192, 8192), (8192, 4096));
        assert_eq!(fit_dimensions(100, 30000, 8192), (27, 8192));
        assert_eq!(fit_dimensions(1, 100_000, 10), (1, 10));
    }

    #[test]
    fn uniform_fits_one_stride() {
        assert_eq!(std::mem::size_of::<DrawUniform>(), 160);
        assert!(std::mem::size_of::<DrawUniform>() as u64 <= UNIFORM_STRIDE);
    }

    #[test]
    fn sprite_scale_ignores_rotation() {
        let world = Mat4::from_scale_rotation_translation(
            Vec3::new(4.0, 2.0, 1.0),
            Quat::from_rotation_y(1.0),
            Vec3::new(5.0, 0.0, -3.0),
        );
        let [sx, sy] = sprite_scale(&world);
        assert!((sx - 4.0).abs() < 1e-5);
        assert!((sy - 2.0).abs() < 1e-5);
    }
}
