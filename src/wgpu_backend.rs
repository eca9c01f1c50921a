use std::mem::size_of;
use std::rc::Rc;
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use slab::Slab;
use wgpu::util::DeviceExt;
use wgpu::{
    Adapter, BindGroup, BindGroupDescriptor, BindGroupEntry, BindGroupLayout, BindGroupLayoutDescriptor, BindGroupLayoutEntry, BindingResource, BindingType, BlendState, Buffer, BufferAddress, BufferBindingType, BufferUsages, ColorTargetState, ColorWrites, CommandEncoderDescriptor, CompositeAlphaMode, Device, DeviceDescriptor, Extent3d, Features, FilterMode, FragmentState, ImageCopyTexture, ImageDataLayout, IndexFormat, Instance, Limits, LoadOp, MultisampleState, Operations, Origin3d, PipelineLayoutDescriptor, PresentMode, PrimitiveState, Queue, RenderPassColorAttachment, RenderPassDescriptor, RenderPipeline, RenderPipelineDescriptor, RequestAdapterOptions, Sampler, SamplerBindingType, SamplerDescriptor, ShaderModuleDescriptor, ShaderSource, ShaderStages, Surface, SurfaceConfiguration, SurfaceError, TextureAspect, TextureDescriptor, TextureDimension, TextureFormat, TextureSampleType, TextureUsages, TextureViewDescriptor, TextureViewDimension, VertexBufferLayout, VertexState, VertexStepMode
};
use winit::window::Window as OsWindow;

use crate::*;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WgpuConfig {
    /// What the window is cleared to before drawing.
    pub clear_color: Color,
    pub present_mode: PresentMode,
}

impl Default for WgpuConfig {
    fn default() -> Self {
        return WgpuConfig {
            clear_color: Color::NEAR_WHITE,
            present_mode: PresentMode::Fifo,
        };
    }
}

/// The device shared by every window of a [`WinitPlatform`].
pub struct WgpuShared {
    pub instance: Instance,
    pub adapter: Adapter,
    pub device: Device,
    pub queue: Queue,
}

impl WgpuShared {
    pub fn new(instance: Instance, compatible_surface: &Surface<'_>) -> Result<Self, UiError> {
        let adapter_options = &RequestAdapterOptions {
            compatible_surface: Some(compatible_surface),
            ..Default::default()
        };
        let adapter = pollster::block_on(instance.request_adapter(adapter_options))
            .ok_or_else(|| UiError::Gpu("no suitable adapter".to_owned()))?;

        let device_desc = &DeviceDescriptor {
            label: None,
            required_features: Features::empty(),
            required_limits: Limits::default(),
            memory_hints: wgpu::MemoryHints::MemoryUsage,
        };
        let (device, queue) = pollster::block_on(adapter.request_device(device_desc, None))
            .map_err(|e| UiError::Gpu(e.to_string()))?;

        return Ok(WgpuShared { instance, adapter, device, queue });
    }
}

#[derive(Debug, Clone, Copy, Zeroable, Pod)]
#[repr(C)]
struct Viewport {
    size: [f32; 2],
    _padding: [f32; 2],
}

fn vertex_buffer_layout() -> VertexBufferLayout<'static> {
    const ATTRIBUTES: [wgpu::VertexAttribute; 3] = wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2, 2 => Float32x4];
    return VertexBufferLayout {
        array_stride: size_of::<Vertex>() as BufferAddress,
        step_mode: VertexStepMode::Vertex,
        attributes: &ATTRIBUTES,
    };
}

fn create_texture(shared: &WgpuShared, layout: &BindGroupLayout, sampler: &Sampler, width: u32, height: u32, rgba: &[u8]) -> (wgpu::Texture, BindGroup) {
    let size = Extent3d { width, height, depth_or_array_layers: 1 };
    let texture = shared.device.create_texture(&TextureDescriptor {
        label: Some("Quad Texture"),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: TextureDimension::D2,
        format: TextureFormat::Rgba8Unorm,
        usage: TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_DST,
        view_formats: &[],
    });

    shared.queue.write_texture(
        ImageCopyTexture {
            texture: &texture,
            mip_level: 0,
            origin: Origin3d::ZERO,
            aspect: TextureAspect::All,
        },
        rgba,
        ImageDataLayout {
            offset: 0,
            bytes_per_row: Some(width * 4),
            rows_per_image: Some(height),
        },
        size,
    );

    let view = texture.create_view(&TextureViewDescriptor::default());
    let bind_group = shared.device.create_bind_group(&BindGroupDescriptor {
        label: Some("Quad Texture Bind Group"),
        layout,
        entries: &[
            BindGroupEntry {
                binding: 0,
                resource: BindingResource::TextureView(&view),
            },
            BindGroupEntry {
                binding: 1,
                resource: BindingResource::Sampler(sampler),
            },
        ],
    });
    return (texture, bind_group);
}

struct GpuTexture {
    _texture: wgpu::Texture,
    bind_group: BindGroup,
}

#[derive(Debug, Clone, Copy)]
struct DrawCommand {
    texture: Option<TextureId>,
    first_index: u32,
    count: u32,
    base_vertex: i32,
}

/// The [`GpuBackend`] of one window.
///
/// Draws are recorded and only submitted in one render pass when the frame is presented.
pub struct QuadRenderer {
    shared: Rc<WgpuShared>,
    pipeline: RenderPipeline,
    viewport_buffer: Buffer,
    viewport_bind_group: BindGroup,
    texture_layout: BindGroupLayout,
    sampler: Sampler,

    vertex_buffer: Option<Buffer>,
    index_buffer: Option<Buffer>,

    textures: Slab<GpuTexture>,
    white: BindGroup,
    _white_texture: wgpu::Texture,
    bound: Option<TextureId>,
    commands: Vec<DrawCommand>,
}

impl QuadRenderer {
    pub fn new(shared: Rc<WgpuShared>, format: TextureFormat) -> Self {
        let device = &shared.device;

        let viewport_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Viewport Uniform Buffer"),
            contents: bytemuck::bytes_of(&Viewport { size: [1.0, 1.0], _padding: [0.0; 2] }),
            usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
        });

        let viewport_layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("Viewport Bind Group Layout"),
            entries: &[BindGroupLayoutEntry {
                binding: 0,
                visibility: ShaderStages::VERTEX,
                ty: BindingType::Buffer {
                    ty: BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let viewport_bind_group = device.create_bind_group(&BindGroupDescriptor {
            label: Some("Viewport Bind Group"),
            layout: &viewport_layout,
            entries: &[BindGroupEntry {
                binding: 0,
                resource: viewport_buffer.as_entire_binding(),
            }],
        });

        let texture_layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("Texture Bind Group Layout"),
            entries: &[
                BindGroupLayoutEntry {
                    binding: 0,
                    visibility: ShaderStages::FRAGMENT,
                    ty: BindingType::Texture {
                        multisampled: false,
                        view_dimension: TextureViewDimension::D2,
                        sample_type: TextureSampleType::Float { filterable: true },
                    },
                    count: None,
                },
                BindGroupLayoutEntry {
                    binding: 1,
                    visibility: ShaderStages::FRAGMENT,
                    ty: BindingType::Sampler(SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let sampler = device.create_sampler(&SamplerDescriptor {
            label: Some("Quad sampler"),
            min_filter: FilterMode::Linear,
            mag_filter: FilterMode::Linear,
            mipmap_filter: FilterMode::Nearest,
            ..Default::default()
        });

        let pipeline_layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
            label: None,
            bind_group_layouts: &[&viewport_layout, &texture_layout],
            push_constant_ranges: &[],
        });

        let shader = device.create_shader_module(ShaderModuleDescriptor {
            label: None,
            source: ShaderSource::Wgsl(include_str!("shaders/quad.wgsl").into()),
        });

        let pipeline = device.create_render_pipeline(&RenderPipelineDescriptor {
            label: Some("Quad Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[vertex_buffer_layout()],
                compilation_options: Default::default(),
            },
            fragment: Some(FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(ColorTargetState {
                    format,
                    blend: Some(BlendState::ALPHA_BLENDING),
                    write_mask: ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: PrimitiveState::default(),
            depth_stencil: None,
            multisample: MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        // untextured stages sample a single white pixel
        let (white_texture, white) = create_texture(&shared, &texture_layout, &sampler, 1, 1, &[255, 255, 255, 255]);

        return QuadRenderer {
            pipeline,
            viewport_buffer,
            viewport_bind_group,
            texture_layout,
            sampler,
            vertex_buffer: None,
            index_buffer: None,
            textures: Slab::with_capacity(16),
            white,
            _white_texture: white_texture,
            bound: None,
            commands: Vec::with_capacity(64),
            shared,
        };
    }

    fn set_viewport(&self, size: glam::Vec2) {
        let viewport = Viewport { size: size.to_array(), _padding: [0.0; 2] };
        self.shared.queue.write_buffer(&self.viewport_buffer, 0, bytemuck::bytes_of(&viewport));
    }

    // Replays the recorded draws into a pass that starts by clearing the target.
    fn render(&mut self, target: &wgpu::TextureView, clear_color: Color) {
        let mut encoder = self.shared.device.create_command_encoder(&CommandEncoderDescriptor::default());
        {
            let color_att = [Some(RenderPassColorAttachment {
                view: target,
                resolve_target: None,
                ops: Operations {
                    load: LoadOp::Clear(wgpu::Color {
                        r: clear_color.r as f64,
                        g: clear_color.g as f64,
                        b: clear_color.b as f64,
                        a: clear_color.a as f64,
                    }),
                    store: wgpu::StoreOp::Store,
                },
            })];
            let mut render_pass = encoder.begin_render_pass(&RenderPassDescriptor {
                label: None,
                color_attachments: &color_att,
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            if let (Some(vertex_buffer), Some(index_buffer)) = (&self.vertex_buffer, &self.index_buffer) {
                render_pass.set_pipeline(&self.pipeline);
                render_pass.set_bind_group(0, &self.viewport_bind_group, &[]);
                render_pass.set_vertex_buffer(0, vertex_buffer.slice(..));
                render_pass.set_index_buffer(index_buffer.slice(..), IndexFormat::Uint16);

                for command in &self.commands {
                    let bind_group = command
                        .texture
                        .and_then(|texture| self.textures.get(texture.0 as usize))
                        .map_or(&self.white, |texture| &texture.bind_group);
                    render_pass.set_bind_group(1, bind_group, &[]);
                    render_pass.draw_indexed(command.first_index..command.first_index + command.count, command.base_vertex, 0..1);
                }
            }
        }
        self.shared.queue.submit(Some(encoder.finish()));
        self.commands.clear();
    }
}

fn aligned(size: usize) -> usize {
    let align = wgpu::COPY_BUFFER_ALIGNMENT as usize;
    return size.div_ceil(align) * align;
}

impl GpuBackend for QuadRenderer {
    fn allocate_buffer(&mut self, kind: BufferKind, size: usize) -> Result<(), UiError> {
        let (label, usage) = match kind {
            BufferKind::Vertex => ("Quad Vertex Buffer", BufferUsages::VERTEX),
            BufferKind::Index => ("Quad Index Buffer", BufferUsages::INDEX),
        };
        let buffer = self.shared.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: aligned(size) as BufferAddress,
            usage: usage | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        match kind {
            BufferKind::Vertex => self.vertex_buffer = Some(buffer),
            BufferKind::Index => self.index_buffer = Some(buffer),
        }
        return Ok(());
    }

    fn upload(&mut self, kind: BufferKind, offset: usize, data: &[u8]) {
        let buffer = match kind {
            BufferKind::Vertex => &self.vertex_buffer,
            BufferKind::Index => &self.index_buffer,
        };
        let Some(buffer) = buffer else {
            log::warn!("Upload to the {kind:?} buffer before it was allocated");
            return;
        };
        if data.len() % wgpu::COPY_BUFFER_ALIGNMENT as usize == 0 {
            self.shared.queue.write_buffer(buffer, offset as BufferAddress, data);
        } else {
            let mut padded = data.to_vec();
            padded.resize(aligned(data.len()), 0);
            self.shared.queue.write_buffer(buffer, offset as BufferAddress, &padded);
        }
    }

    fn bound_texture(&self) -> Option<TextureId> {
        return self.bound;
    }

    fn bind_texture(&mut self, texture: Option<TextureId>) {
        self.bound = texture;
    }

    fn draw_indexed(&mut self, first_index: u32, count: u32, base_vertex: i32) {
        self.commands.push(DrawCommand {
            texture: self.bound,
            first_index,
            count,
            base_vertex,
        });
    }

    fn create_texture(&mut self, width: u32, height: u32, rgba: &[u8]) -> Result<TextureId, UiError> {
        if rgba.len() != width as usize * height as usize * 4 || width == 0 || height == 0 {
            return Err(UiError::Gpu(format!("bad texture data: {width}x{height} with {} bytes", rgba.len())));
        }
        let (texture, bind_group) = create_texture(&self.shared, &self.texture_layout, &self.sampler, width, height, rgba);
        let i = self.textures.insert(GpuTexture { _texture: texture, bind_group });
        return Ok(TextureId(i as u32));
    }

    fn release_texture(&mut self, texture: TextureId) {
        self.textures.try_remove(texture.0 as usize);
    }
}

/// Presents a window through a `wgpu` surface.
///
/// The surface doesn't keep its contents between frames, so windows using this always redraw completely.
pub struct WgpuDrawingContext {
    window: Arc<OsWindow>,
    surface: Surface<'static>,
    surface_config: SurfaceConfiguration,
    clear_color: Color,
    renderer: QuadRenderer,
}

impl WgpuDrawingContext {
    pub fn new(shared: Rc<WgpuShared>, window: Arc<OsWindow>, surface: Surface<'static>, config: &WgpuConfig) -> Result<Self, UiError> {
        let capabilities = surface.get_capabilities(&shared.adapter);
        // colors are blended as they're given, without an sRGB conversion
        let format = capabilities
            .formats
            .iter()
            .copied()
            .find(|format| !format.is_srgb())
            .or_else(|| capabilities.formats.first().copied())
            .ok_or_else(|| UiError::Gpu("surface has no supported formats".to_owned()))?;

        let size = window.inner_size();
        let surface_config = SurfaceConfiguration {
            usage: TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: config.present_mode,
            alpha_mode: CompositeAlphaMode::Auto,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&shared.device, &surface_config);

        let renderer = QuadRenderer::new(shared, format);
        return Ok(WgpuDrawingContext {
            window,
            surface,
            surface_config,
            clear_color: config.clear_color,
            renderer,
        });
    }

    fn reconfigure(&mut self) {
        self.surface.configure(&self.renderer.shared.device, &self.surface_config);
    }
}

impl DrawingContext for WgpuDrawingContext {
    fn bind(&mut self) -> Result<(), UiError> {
        let size = self.window.inner_size();
        if size.width > 0 && size.height > 0 && (size.width != self.surface_config.width || size.height != self.surface_config.height) {
            self.surface_config.width = size.width;
            self.surface_config.height = size.height;
            self.reconfigure();
        }
        self.renderer.commands.clear();
        return Ok(());
    }

    fn preserves_contents(&self) -> bool {
        return false;
    }

    fn clear(&mut self, _region: Rect, _scale_factor: f32) {
        // the whole frame is cleared when the pass starts, so anything recorded before is gone
        self.renderer.commands.clear();
    }

    fn gpu(&mut self) -> &mut dyn GpuBackend {
        return &mut self.renderer;
    }

    fn swap_buffers(&mut self) -> Result<(), UiError> {
        let frame = match self.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(SurfaceError::Outdated | SurfaceError::Lost) => {
                log::debug!("Surface lost, reconfiguring");
                self.reconfigure();
                self.window.request_redraw();
                return Ok(());
            }
            Err(SurfaceError::Timeout) => {
                log::warn!("Timed out waiting for the surface");
                return Ok(());
            }
            Err(e) => return Err(UiError::Gpu(e.to_string())),
        };

        let scale_factor = self.window.scale_factor() as f32;
        let logical_size = glam::vec2(self.surface_config.width as f32, self.surface_config.height as f32) / scale_factor;
        self.renderer.set_viewport(logical_size);

        let view = frame.texture.create_view(&TextureViewDescriptor::default());
        self.renderer.render(&view, self.clear_color);

        self.window.pre_present_notify();
        frame.present();
        return Ok(());
    }
}
