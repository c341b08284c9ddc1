//! wgpu implementation of the backend traits.
//!
//! A [`WgpuContext`] renders into its own `Rgba8Unorm` target. Draw calls are collected
//! with the state they were issued under and replayed in a single render pass on
//! [`WgpuContext::submit`]. Transforms are applied on the CPU, so the shader only maps
//! ready-made clip-space positions.

use std::collections::HashMap;
use std::ops::Range;
use std::sync::{Arc, Mutex};

use wgpu::util::DeviceExt;

use super::{
    flip_scissor, GpuContext, GpuDevice, Primitive, SavedState, SurfaceId,
};
use crate::bitmap::Bitmap;
use crate::error::{Error, Result};
use crate::render_state::BlendMode;
use crate::transform::Transform;
use crate::utils::{lock, Color, Rect, Vertex};

const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

const SHADER: &str = r#"
struct VertexInput {
    @location(0) position: vec2<f32>,
    @location(1) tex_coords: vec2<f32>,
    @location(2) color: vec4<f32>,
};

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) tex_coords: vec2<f32>,
    @location(1) color: vec4<f32>,
};

@group(0) @binding(0) var t_diffuse: texture_2d<f32>;
@group(0) @binding(1) var s_diffuse: sampler;

@vertex
fn vs_main(in: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    out.clip_position = vec4<f32>(in.position, 0.0, 1.0);
    out.tex_coords = in.tex_coords;
    out.color = in.color;
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    return textureSample(t_diffuse, s_diffuse, in.tex_coords) * in.color;
}
"#;

struct SurfaceEntry {
    texture: wgpu::Texture,
    bind_group: wgpu::BindGroup,
}

struct Shared {
    device: wgpu::Device,
    queue: wgpu::Queue,
    texture_layout: wgpu::BindGroupLayout,
    linear_sampler: wgpu::Sampler,
    nearest_sampler: wgpu::Sampler,
    pipelines: HashMap<(BlendMode, Primitive), wgpu::RenderPipeline>,
    // Bound for untextured geometry.
    white: SurfaceEntry,
    surfaces: Mutex<HashMap<SurfaceId, SurfaceEntry>>,
}

/// Texture store on a wgpu device. Cloning shares the device and its surfaces.
#[derive(Clone)]
pub struct WgpuDevice {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for WgpuDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuDevice")
            .field("max_texture_size", &self.max_texture_size())
            .field("surfaces", &lock(&self.shared.surfaces).len())
            .finish()
    }
}

impl WgpuDevice {
    /// Opens a headless device on the first available adapter.
    pub fn headless() -> Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::LowPower,
            force_fallback_adapter: false,
            compatible_surface: None,
        }))
        .ok_or_else(|| Error::Gpu("no suitable adapter".into()))?;
        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("quadbatch-device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default().using_resolution(adapter.limits()),
                memory_hints: Default::default(),
            },
            None,
        ))
        .map_err(|e| Error::Gpu(e.to_string()))?;
        log::debug!("using adapter {:?}", adapter.get_info().name);
        Ok(Self::from_device(device, queue))
    }

    pub fn from_device(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("texture_bind_group_layout"),
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

        let sampler = |filter: wgpu::FilterMode, label: &str| {
            device.create_sampler(&wgpu::SamplerDescriptor {
                label: Some(label),
                address_mode_u: wgpu::AddressMode::ClampToEdge,
                address_mode_v: wgpu::AddressMode::ClampToEdge,
                mag_filter: filter,
                min_filter: filter,
                ..Default::default()
            })
        };
        let linear_sampler = sampler(wgpu::FilterMode::Linear, "linear-sampler");
        let nearest_sampler = sampler(wgpu::FilterMode::Nearest, "nearest-sampler");

        let pipelines = create_pipelines(&device, &texture_layout);

        let white_texture = create_surface_texture(&device, 1, 1);
        queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &white_texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &[255, 255, 255, 255],
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(4),
                rows_per_image: Some(1),
            },
            wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
        );
        let white = SurfaceEntry {
            bind_group: create_bind_group(&device, &texture_layout, &white_texture, &nearest_sampler),
            texture: white_texture,
        };

        Self {
            shared: Arc::new(Shared {
                device,
                queue,
                texture_layout,
                linear_sampler,
                nearest_sampler,
                pipelines,
                white,
                surfaces: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.shared.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.shared.queue
    }

    pub fn create_context(&self, width: u32, height: u32) -> WgpuContext {
        let target = self.shared.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("context-target"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[FORMAT],
        });
        let view = target.create_view(&wgpu::TextureViewDescriptor::default());
        WgpuContext {
            shared: Arc::clone(&self.shared),
            target,
            view,
            width,
            height,
            state: SavedState {
                texture: None,
                transform: Transform::identity(),
                scissor: None,
                blend: BlendMode::Default,
            },
            saved: Vec::new(),
            // Fresh targets start transparent.
            pending_clear: Some(Color::NONE),
            vertices: Vec::new(),
            commands: Vec::new(),
        }
    }
}

fn create_surface_texture(device: &wgpu::Device, width: u32, height: u32) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some("atlas-surface"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: FORMAT,
        usage: wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_DST
            | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[FORMAT],
    })
}

fn create_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    texture: &wgpu::Texture,
    sampler: &wgpu::Sampler,
) -> wgpu::BindGroup {
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
        label: Some("texture_bind_group"),
    })
}

fn blend_state(mode: BlendMode) -> wgpu::BlendState {
    use wgpu::{BlendComponent, BlendFactor, BlendOperation};
    let component = |src_factor, dst_factor| BlendComponent {
        src_factor,
        dst_factor,
        operation: BlendOperation::Add,
    };
    match mode {
        BlendMode::Default => wgpu::BlendState {
            color: component(BlendFactor::SrcAlpha, BlendFactor::OneMinusSrcAlpha),
            alpha: component(BlendFactor::One, BlendFactor::OneMinusSrcAlpha),
        },
        BlendMode::Add => wgpu::BlendState {
            color: component(BlendFactor::SrcAlpha, BlendFactor::One),
            alpha: component(BlendFactor::One, BlendFactor::One),
        },
        BlendMode::Multiply => wgpu::BlendState {
            color: component(BlendFactor::Dst, BlendFactor::OneMinusSrcAlpha),
            alpha: component(BlendFactor::DstAlpha, BlendFactor::OneMinusSrcAlpha),
        },
    }
}

fn create_pipelines(
    device: &wgpu::Device,
    texture_layout: &wgpu::BindGroupLayout,
) -> HashMap<(BlendMode, Primitive), wgpu::RenderPipeline> {
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("quadbatch-shader"),
        source: wgpu::ShaderSource::Wgsl(SHADER.into()),
    });
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("quadbatch-pipeline-layout"),
        bind_group_layouts: &[texture_layout],
        push_constant_ranges: &[],
    });

    let mut pipelines = HashMap::new();
    for mode in [BlendMode::Default, BlendMode::Add, BlendMode::Multiply] {
        for primitive in [Primitive::Triangles, Primitive::Lines] {
            let topology = match primitive {
                Primitive::Triangles => wgpu::PrimitiveTopology::TriangleList,
                Primitive::Lines => wgpu::PrimitiveTopology::LineList,
            };
            let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("quadbatch-pipeline"),
                layout: Some(&layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: Some("vs_main"),
                    buffers: &[wgpu::VertexBufferLayout {
                        array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &wgpu::vertex_attr_array![
                            0 => Float32x2,
                            1 => Float32x2,
                            2 => Float32x4
                        ],
                    }],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: Some("fs_main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: FORMAT,
                        blend: Some(blend_state(mode)),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology,
                    cull_mode: None,
                    ..Default::default()
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            });
            pipelines.insert((mode, primitive), pipeline);
        }
    }
    pipelines
}

/// Copies `rect` of `texture` into a bitmap, honoring the 256-byte row alignment of
/// buffer copies.
fn read_texture(shared: &Shared, texture: &wgpu::Texture, rect: Rect) -> Result<Bitmap> {
    let (width, height) = (rect.width as u32, rect.height as u32);
    if width == 0 || height == 0 {
        return Ok(Bitmap::new(width, height));
    }
    let bytes_per_row = (width * 4).div_ceil(256) * 256;
    let output = shared.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("readback-buffer"),
        size: bytes_per_row as u64 * height as u64,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    let mut encoder = shared
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("readback-encoder"),
        });
    encoder.copy_texture_to_buffer(
        wgpu::ImageCopyTexture {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d {
                x: rect.x as u32,
                y: rect.y as u32,
                z: 0,
            },
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::ImageCopyBuffer {
            buffer: &output,
            layout: wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(bytes_per_row),
                rows_per_image: Some(height),
            },
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
    shared.queue.submit(Some(encoder.finish()));

    let slice = output.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |r| {
        tx.send(r).ok();
    });
    shared.device.poll(wgpu::Maintain::Wait);
    rx.recv()
        .map_err(|e| Error::Gpu(e.to_string()))?
        .map_err(|e| Error::Gpu(e.to_string()))?;

    let view = slice.get_mapped_range();
    let mut rgba = Vec::with_capacity((width * height * 4) as usize);
    for row in view.chunks(bytes_per_row as usize) {
        rgba.extend_from_slice(&row[..(width * 4) as usize]);
    }
    drop(view);
    output.unmap();
    Bitmap::from_raw(width, height, rgba)
        .ok_or_else(|| Error::Gpu("read-back size mismatch".into()))
}

impl GpuDevice for WgpuDevice {
    fn max_texture_size(&self) -> u32 {
        self.shared.device.limits().max_texture_dimension_2d
    }

    fn create_texture(&self, width: u32, height: u32, retro: bool) -> Result<SurfaceId> {
        let max = self.max_texture_size();
        if width == 0 || height == 0 || width > max || height > max {
            return Err(Error::invalid(format!(
                "texture size {width}x{height} outside 1..={max}"
            )));
        }
        let shared = &self.shared;
        let texture = create_surface_texture(&shared.device, width, height);
        let sampler = if retro {
            &shared.nearest_sampler
        } else {
            &shared.linear_sampler
        };
        let bind_group = create_bind_group(&shared.device, &shared.texture_layout, &texture, sampler);
        let id = SurfaceId::next();
        lock(&shared.surfaces).insert(id, SurfaceEntry { texture, bind_group });
        Ok(id)
    }

    fn destroy_texture(&self, surface: SurfaceId) {
        // Dropping the handle lets wgpu free it after in-flight submissions complete.
        lock(&self.shared.surfaces).remove(&surface);
    }

    fn upload(&self, surface: SurfaceId, x: u32, y: u32, bitmap: &Bitmap) -> Result<()> {
        let surfaces = lock(&self.shared.surfaces);
        let entry = surfaces
            .get(&surface)
            .ok_or_else(|| Error::Gpu(format!("unknown surface {surface:?}")))?;
        let size = entry.texture.size();
        let (w, h) = bitmap.dimensions();
        if w == 0 || h == 0 {
            return Ok(());
        }
        if x + w > size.width || y + h > size.height {
            return Err(Error::invalid(format!(
                "upload of {w}x{h} at ({x}, {y}) exceeds surface"
            )));
        }
        self.shared.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &entry.texture,
                mip_level: 0,
                origin: wgpu::Origin3d { x, y, z: 0 },
                aspect: wgpu::TextureAspect::All,
            },
            bitmap.as_raw(),
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(4 * w),
                rows_per_image: Some(h),
            },
            wgpu::Extent3d {
                width: w,
                height: h,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    fn read_back(&self, surface: SurfaceId, rect: Rect) -> Result<Bitmap> {
        let surfaces = lock(&self.shared.surfaces);
        let entry = surfaces
            .get(&surface)
            .ok_or_else(|| Error::Gpu(format!("unknown surface {surface:?}")))?;
        let size = entry.texture.size();
        if !Rect::with_size(size.width, size.height).contains(&rect) {
            return Err(Error::invalid(format!("read-back {rect:?} outside surface")));
        }
        read_texture(&self.shared, &entry.texture, rect)
    }

    fn render_offscreen(
        &self,
        width: u32,
        height: u32,
        draw: &mut dyn FnMut(&mut dyn GpuContext),
    ) -> Result<Bitmap> {
        let mut context = self.create_context(width, height);
        draw(&mut context);
        context.read_pixels()
    }
}

struct DrawCommand {
    primitive: Primitive,
    texture: Option<SurfaceId>,
    // Top-left origin, already clipped to the target.
    scissor: Option<Rect>,
    blend: BlendMode,
    range: Range<u32>,
}

pub struct WgpuContext {
    shared: Arc<Shared>,
    target: wgpu::Texture,
    view: wgpu::TextureView,
    width: u32,
    height: u32,
    state: SavedState,
    saved: Vec<SavedState>,
    pending_clear: Option<Color>,
    vertices: Vec<Vertex>,
    commands: Vec<DrawCommand>,
}

impl WgpuContext {
    pub fn target(&self) -> &wgpu::Texture {
        &self.target
    }

    /// Renders everything recorded since the last submit.
    pub fn submit(&mut self) {
        if self.commands.is_empty() && self.pending_clear.is_none() {
            return;
        }
        let shared = Arc::clone(&self.shared);
        let vertex_buffer = (!self.vertices.is_empty()).then(|| {
            shared
                .device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("batch-vertices"),
                    contents: bytemuck::cast_slice(&self.vertices),
                    usage: wgpu::BufferUsages::VERTEX,
                })
        });

        let load = match self.pending_clear.take() {
            Some(color) => {
                let [r, g, b, a] = color.to_f32_array().map(f64::from);
                wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a })
            }
            None => wgpu::LoadOp::Load,
        };

        let mut encoder = shared
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("batch-encoder"),
            });
        {
            let surfaces = lock(&shared.surfaces);
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("batch-rpass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            if let Some(buffer) = &vertex_buffer {
                rpass.set_vertex_buffer(0, buffer.slice(..));
                for command in &self.commands {
                    let Some(pipeline) = shared.pipelines.get(&(command.blend, command.primitive))
                    else {
                        continue;
                    };
                    let scissor = command
                        .scissor
                        .unwrap_or_else(|| Rect::with_size(self.width, self.height));
                    if scissor.is_empty() {
                        continue;
                    }
                    let bind_group = command
                        .texture
                        .and_then(|id| surfaces.get(&id))
                        .map_or(&shared.white.bind_group, |entry| &entry.bind_group);
                    rpass.set_pipeline(pipeline);
                    rpass.set_bind_group(0, bind_group, &[]);
                    rpass.set_scissor_rect(
                        scissor.x as u32,
                        scissor.y as u32,
                        scissor.width as u32,
                        scissor.height as u32,
                    );
                    rpass.draw(command.range.clone(), 0..1);
                }
            }
        }
        shared.queue.submit(Some(encoder.finish()));
        self.vertices.clear();
        self.commands.clear();
    }

    /// Submits pending work and reads the whole target back.
    pub fn read_pixels(&mut self) -> Result<Bitmap> {
        self.submit();
        let shared = Arc::clone(&self.shared);
        read_texture(&shared, &self.target, Rect::with_size(self.width, self.height))
    }
}

impl GpuContext for WgpuContext {
    fn surface_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn clear(&mut self, color: Color) {
        self.vertices.clear();
        self.commands.clear();
        self.pending_clear = Some(color);
    }

    fn bind_texture(&mut self, texture: Option<SurfaceId>) {
        self.state.texture = texture;
    }

    fn load_transform(&mut self, transform: &Transform) {
        self.state.transform = *transform;
    }

    fn set_scissor(&mut self, rect: Option<Rect>) {
        self.state.scissor = rect;
    }

    fn set_blend_mode(&mut self, mode: BlendMode) {
        self.state.blend = mode;
    }

    fn push_state(&mut self) {
        self.saved.push(self.state);
    }

    fn pop_state(&mut self) {
        if let Some(state) = self.saved.pop() {
            self.state = state;
        }
    }

    fn finish(&mut self) {
        self.submit();
    }

    fn draw_vertices(&mut self, primitive: Primitive, vertices: &[Vertex]) {
        if vertices.is_empty() {
            return;
        }
        let (w, h) = (self.width as f64, self.height as f64);
        let start = self.vertices.len() as u32;
        let transform = self.state.transform;
        self.vertices.extend(vertices.iter().map(|v| {
            let (x, y) = transform.apply(v.position[0] as f64, v.position[1] as f64);
            Vertex {
                position: [(x / w * 2.0 - 1.0) as f32, (1.0 - y / h * 2.0) as f32],
                ..*v
            }
        }));
        let scissor = self.state.scissor.map(|rect| {
            flip_scissor(rect, self.height).intersection(&Rect::with_size(self.width, self.height))
        });
        self.commands.push(DrawCommand {
            primitive,
            texture: self.state.texture,
            scissor,
            blend: self.state.blend,
            range: start..self.vertices.len() as u32,
        });
    }
}
