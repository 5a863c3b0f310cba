use std::collections::HashMap;
use std::num::NonZeroU64;
use std::sync::Arc;
use std::sync::mpsc;

use wgpu::util::DeviceExt;
use winit::window::Window;

use super::{
    Blend, BoundTexture, DrawKind, DrawUniforms, GpuBackend, MeshId, Output, PassCommand,
    PassUniforms, Precision, ProgramDesc, ProgramId, TEXTURE_UNITS, TargetDesc, TargetId,
    TextureId, TextureRef,
};
use crate::error::PipelineError;
use crate::gpu::GpuContext;
use crate::mesh::{MeshData, Vertex};
use crate::texture::{AddressMode, TextureData};

/// Byte stride between per-draw uniform blocks in the dynamic buffer.
const DRAW_STRIDE: u64 = 256;
const INITIAL_DRAW_CAPACITY: u64 = 64;
const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
/// Readback rows must be aligned to this many bytes.
const READBACK_ROW: u32 = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

struct GpuTarget {
    width: u32,
    height: u32,
    colors: Vec<ColorAttachment>,
    depth: wgpu::TextureView,
}

struct ColorAttachment {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    format: wgpu::TextureFormat,
}

struct GpuProgram {
    label: &'static str,
    module: Option<wgpu::ShaderModule>,
    uses_vertices: bool,
}

struct GpuMesh {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
}

#[derive(Clone, PartialEq, Eq, Hash)]
struct PipelineKey {
    program: ProgramId,
    formats: Vec<wgpu::TextureFormat>,
    has_depth: bool,
    depth_test: bool,
    blend: Blend,
}

/// Renders pass commands through wgpu.
///
/// Every program shares one pipeline layout (see the [module docs](super)). Render
/// pipelines are built lazily per output configuration and cached; a pipeline that fails
/// validation is cached as `None` so the failure is reported once.
pub struct WgpuBackend {
    gpu: GpuContext,
    draw_layout: wgpu::BindGroupLayout,
    texture_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    pass_buffer: wgpu::Buffer,
    pass_group: wgpu::BindGroup,
    draw_buffer: wgpu::Buffer,
    draw_capacity: u64,
    draw_group: wgpu::BindGroup,
    clamp_sampler: wgpu::Sampler,
    repeat_sampler: wgpu::Sampler,
    fallback: wgpu::TextureView,
    next_id: u32,
    targets: HashMap<TargetId, GpuTarget>,
    programs: HashMap<ProgramId, GpuProgram>,
    textures: HashMap<TextureId, wgpu::TextureView>,
    meshes: HashMap<MeshId, GpuMesh>,
    pipelines: HashMap<PipelineKey, Option<wgpu::RenderPipeline>>,
    frame: Option<(wgpu::SurfaceTexture, wgpu::TextureView)>,
}

impl WgpuBackend {
    pub fn new(window: Arc<Window>) -> Result<Self, PipelineError> {
        Ok(Self::from_context(GpuContext::new(window)?))
    }

    pub fn from_context(gpu: GpuContext) -> Self {
        let device = &gpu.device;

        let uniform_entry = |dynamic: bool, size: u64| wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: dynamic,
                min_binding_size: NonZeroU64::new(size),
            },
            count: None,
        };

        let pass_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Pass Uniforms Layout"),
            entries: &[uniform_entry(
                false,
                std::mem::size_of::<PassUniforms>() as u64,
            )],
        });
        let draw_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Draw Uniforms Layout"),
            entries: &[uniform_entry(true, std::mem::size_of::<DrawUniforms>() as u64)],
        });

        let mut texture_entries: Vec<wgpu::BindGroupLayoutEntry> = (0..TEXTURE_UNITS as u32)
            .map(|binding| wgpu::BindGroupLayoutEntry {
                binding,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            })
            .collect();
        for binding in [TEXTURE_UNITS as u32, TEXTURE_UNITS as u32 + 1] {
            texture_entries.push(wgpu::BindGroupLayoutEntry {
                binding,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            });
        }
        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Input Textures Layout"),
            entries: &texture_entries,
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Shared Pipeline Layout"),
            bind_group_layouts: &[&pass_layout, &draw_layout, &texture_layout],
            push_constant_ranges: &[],
        });

        let pass_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Pass Uniforms"),
            size: std::mem::size_of::<PassUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let pass_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Pass Uniforms Bind Group"),
            layout: &pass_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: pass_buffer.as_entire_binding(),
            }],
        });

        let (draw_buffer, draw_group) =
            create_draw_buffer(device, &draw_layout, INITIAL_DRAW_CAPACITY);

        let sampler = |label: &'static str, mode: wgpu::AddressMode| {
            device.create_sampler(&wgpu::SamplerDescriptor {
                label: Some(label),
                address_mode_u: mode,
                address_mode_v: mode,
                address_mode_w: mode,
                mag_filter: wgpu::FilterMode::Linear,
                min_filter: wgpu::FilterMode::Linear,
                mipmap_filter: wgpu::FilterMode::Nearest,
                ..Default::default()
            })
        };
        let clamp_sampler = sampler("Clamp Sampler", wgpu::AddressMode::ClampToEdge);
        let repeat_sampler = sampler("Repeat Sampler", wgpu::AddressMode::Repeat);

        let fallback = upload_texture(device, &gpu.queue, &TextureData::black());

        Self {
            gpu,
            draw_layout,
            texture_layout,
            pipeline_layout,
            pass_buffer,
            pass_group,
            draw_buffer,
            draw_capacity: INITIAL_DRAW_CAPACITY,
            draw_group,
            clamp_sampler,
            repeat_sampler,
            fallback,
            next_id: 1,
            targets: HashMap::new(),
            programs: HashMap::new(),
            textures: HashMap::new(),
            meshes: HashMap::new(),
            pipelines: HashMap::new(),
            frame: None,
        }
    }

    pub fn gpu(&self) -> &GpuContext {
        &self.gpu
    }

    fn allocate(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn ensure_draw_capacity(&mut self, draws: u64) {
        if draws <= self.draw_capacity {
            return;
        }
        let capacity = draws.next_power_of_two();
        let (buffer, group) = create_draw_buffer(&self.gpu.device, &self.draw_layout, capacity);
        self.draw_buffer = buffer;
        self.draw_group = group;
        self.draw_capacity = capacity;
        log::debug!("draw uniform buffer grown to {} blocks", capacity);
    }

    fn texture_view(&self, texture: TextureRef) -> &wgpu::TextureView {
        let view = match texture {
            TextureRef::Attachment { target, index } => self
                .targets
                .get(&target)
                .and_then(|t| t.colors.get(index))
                .map(|c| &c.view),
            TextureRef::Texture(id) => self.textures.get(&id),
        };
        view.unwrap_or(&self.fallback)
    }

    fn input_group(
        &self,
        inputs: &[BoundTexture],
        unit0: Option<TextureId>,
    ) -> wgpu::BindGroup {
        let mut views: [&wgpu::TextureView; TEXTURE_UNITS] = [&self.fallback; TEXTURE_UNITS];
        for input in inputs {
            if let Some(slot) = views.get_mut(input.unit as usize) {
                *slot = self.texture_view(input.texture);
            }
        }
        if let Some(id) = unit0 {
            views[0] = self.texture_view(TextureRef::Texture(id));
        }

        let mut entries: Vec<wgpu::BindGroupEntry> = views
            .iter()
            .enumerate()
            .map(|(binding, view)| wgpu::BindGroupEntry {
                binding: binding as u32,
                resource: wgpu::BindingResource::TextureView(view),
            })
            .collect();
        entries.push(wgpu::BindGroupEntry {
            binding: TEXTURE_UNITS as u32,
            resource: wgpu::BindingResource::Sampler(&self.clamp_sampler),
        });
        entries.push(wgpu::BindGroupEntry {
            binding: TEXTURE_UNITS as u32 + 1,
            resource: wgpu::BindingResource::Sampler(&self.repeat_sampler),
        });

        self.gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Input Textures Bind Group"),
            layout: &self.texture_layout,
            entries: &entries,
        })
    }

    fn pipeline(&mut self, key: &PipelineKey) -> Option<&wgpu::RenderPipeline> {
        if !self.pipelines.contains_key(key) {
            let built = self.build_pipeline(key);
            self.pipelines.insert(key.clone(), built);
        }
        self.pipelines.get(key).and_then(Option::as_ref)
    }

    fn build_pipeline(&self, key: &PipelineKey) -> Option<wgpu::RenderPipeline> {
        let program = self.programs.get(&key.program)?;
        let module = program.module.as_ref()?;

        let blend = match key.blend {
            Blend::Replace => wgpu::BlendState::REPLACE,
            Blend::Alpha => wgpu::BlendState::ALPHA_BLENDING,
        };
        let color_targets: Vec<Option<wgpu::ColorTargetState>> = key
            .formats
            .iter()
            .map(|format| {
                Some(wgpu::ColorTargetState {
                    format: *format,
                    blend: Some(blend),
                    write_mask: wgpu::ColorWrites::ALL,
                })
            })
            .collect();
        let vertex_layouts = [Vertex::LAYOUT];
        let buffers: &[wgpu::VertexBufferLayout] = if program.uses_vertices {
            &vertex_layouts
        } else {
            &[]
        };
        let depth_stencil = key.has_depth.then(|| wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: key.depth_test,
            depth_compare: if key.depth_test {
                wgpu::CompareFunction::Less
            } else {
                wgpu::CompareFunction::Always
            },
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        });

        let device = &self.gpu.device;
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(program.label),
            layout: Some(&self.pipeline_layout),
            vertex: wgpu::VertexState {
                module,
                entry_point: Some("vs"),
                buffers,
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module,
                entry_point: Some("fs"),
                targets: &color_targets,
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        match pollster::block_on(device.pop_error_scope()) {
            Some(e) => {
                log::error!("pipeline for '{}' failed validation: {}", program.label, e);
                None
            }
            None => Some(pipeline),
        }
    }
}

impl GpuBackend for WgpuBackend {
    fn create_target(&mut self, desc: &TargetDesc) -> TargetId {
        let device = &self.gpu.device;
        let size = wgpu::Extent3d {
            width: desc.width.max(1),
            height: desc.height.max(1),
            depth_or_array_layers: 1,
        };
        let limit = device.limits().max_texture_dimension_2d;
        if desc.width > limit || desc.height > limit {
            log::error!(
                "target '{}' is {}x{}, beyond the device limit of {}; contents are undefined",
                desc.label,
                desc.width,
                desc.height,
                limit
            );
        }

        let colors = desc
            .attachments
            .iter()
            .map(|attachment| {
                let format = attachment.precision.format();
                let texture = device.create_texture(&wgpu::TextureDescriptor {
                    label: Some(&format!("{} {}", desc.label, attachment.name)),
                    size,
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format,
                    usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                        | wgpu::TextureUsages::TEXTURE_BINDING
                        | wgpu::TextureUsages::COPY_SRC,
                    view_formats: &[],
                });
                let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
                ColorAttachment {
                    texture,
                    view,
                    format,
                }
            })
            .collect();

        let depth = device
            .create_texture(&wgpu::TextureDescriptor {
                label: Some(&format!("{} depth", desc.label)),
                size,
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: DEPTH_FORMAT,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                view_formats: &[],
            })
            .create_view(&wgpu::TextureViewDescriptor::default());

        let id = TargetId(self.allocate());
        self.targets.insert(
            id,
            GpuTarget {
                width: size.width,
                height: size.height,
                colors,
                depth,
            },
        );
        id
    }

    fn destroy_target(&mut self, target: TargetId) {
        if let Some(t) = self.targets.remove(&target) {
            for color in t.colors {
                color.texture.destroy();
            }
        }
    }

    fn create_program(&mut self, desc: &ProgramDesc) -> ProgramId {
        let device = &self.gpu.device;
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(desc.label),
            source: wgpu::ShaderSource::Wgsl(desc.source.as_str().into()),
        });
        let module = match pollster::block_on(device.pop_error_scope()) {
            Some(e) => {
                log::error!("program '{}' failed to compile: {}", desc.label, e);
                None
            }
            None => Some(module),
        };

        let id = ProgramId(self.allocate());
        self.programs.insert(
            id,
            GpuProgram {
                label: desc.label,
                module,
                uses_vertices: desc.uses_vertices,
            },
        );
        id
    }

    fn program_ok(&self, program: ProgramId) -> bool {
        self.programs
            .get(&program)
            .is_some_and(|p| p.module.is_some())
    }

    fn destroy_program(&mut self, program: ProgramId) {
        self.programs.remove(&program);
        self.pipelines.retain(|key, _| key.program != program);
    }

    fn create_texture(&mut self, data: &TextureData) -> TextureId {
        let view = upload_texture(&self.gpu.device, &self.gpu.queue, data);
        let id = TextureId(self.allocate());
        self.textures.insert(id, view);
        id
    }

    fn create_mesh(&mut self, data: &MeshData) -> MeshId {
        let device = &self.gpu.device;
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Mesh Vertex Buffer"),
            contents: bytemuck::cast_slice(&data.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Mesh Index Buffer"),
            contents: bytemuck::cast_slice(&data.indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        let id = MeshId(self.allocate());
        self.meshes.insert(
            id,
            GpuMesh {
                vertex_buffer,
                index_buffer,
                index_count: data.indices.len() as u32,
            },
        );
        id
    }

    fn begin_frame(&mut self) -> bool {
        match self.gpu.surface.get_current_texture() {
            Ok(output) => {
                let view = output
                    .texture
                    .create_view(&wgpu::TextureViewDescriptor::default());
                self.frame = Some((output, view));
                true
            }
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.gpu.reconfigure();
                false
            }
            Err(e) => {
                log::warn!("skipping frame: {}", PipelineError::from(e));
                false
            }
        }
    }

    fn submit(&mut self, pass: &PassCommand) {
        let (formats, has_depth) = match pass.output {
            Output::Screen => {
                if self.frame.is_none() {
                    log::warn!("pass '{}' has no frame to draw into", pass.label);
                    return;
                }
                (vec![self.gpu.config.format], false)
            }
            Output::Target(target) => match self.targets.get(&target) {
                Some(t) => (t.colors.iter().map(|c| c.format).collect(), true),
                None => {
                    log::warn!("pass '{}' targets a destroyed target", pass.label);
                    return;
                }
            },
        };

        let key = PipelineKey {
            program: pass.program,
            formats,
            has_depth,
            depth_test: pass.depth_test,
            blend: pass.blend,
        };
        if self.pipeline(&key).is_none() {
            return;
        }

        self.ensure_draw_capacity(pass.draws.len() as u64);
        let mut draw_bytes = vec![0u8; pass.draws.len() * DRAW_STRIDE as usize];
        for (i, draw) in pass.draws.iter().enumerate() {
            let offset = i * DRAW_STRIDE as usize;
            let bytes = bytemuck::bytes_of(&draw.uniforms);
            draw_bytes[offset..offset + bytes.len()].copy_from_slice(bytes);
        }
        self.gpu
            .queue
            .write_buffer(&self.pass_buffer, 0, bytemuck::bytes_of(&pass.uniforms));
        if !draw_bytes.is_empty() {
            self.gpu.queue.write_buffer(&self.draw_buffer, 0, &draw_bytes);
        }

        let base_group = self.input_group(&pass.inputs, None);
        let override_groups: Vec<Option<wgpu::BindGroup>> = pass
            .draws
            .iter()
            .map(|draw| draw.texture.map(|t| self.input_group(&pass.inputs, Some(t))))
            .collect();

        let Some(Some(pipeline)) = self.pipelines.get(&key) else {
            return;
        };

        let (color_views, depth_view): (Vec<&wgpu::TextureView>, Option<&wgpu::TextureView>) =
            match pass.output {
                Output::Screen => match &self.frame {
                    Some((_, view)) => (vec![view], None),
                    None => return,
                },
                Output::Target(target) => match self.targets.get(&target) {
                    Some(t) => (t.colors.iter().map(|c| &c.view).collect(), Some(&t.depth)),
                    None => return,
                },
            };

        let load = match pass.clear {
            Some([r, g, b, a]) => wgpu::LoadOp::Clear(wgpu::Color {
                r: r as f64,
                g: g as f64,
                b: b as f64,
                a: a as f64,
            }),
            None => wgpu::LoadOp::Load,
        };
        let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment>> = color_views
            .into_iter()
            .map(|view| {
                Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })
            })
            .collect();
        let depth_stencil_attachment =
            depth_view.map(|view| wgpu::RenderPassDepthStencilAttachment {
                view,
                depth_ops: Some(wgpu::Operations {
                    load: if pass.clear.is_some() {
                        wgpu::LoadOp::Clear(1.0)
                    } else {
                        wgpu::LoadOp::Load
                    },
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            });

        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(pass.label),
            });

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(pass.label),
                color_attachments: &color_attachments,
                depth_stencil_attachment,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            render_pass.set_pipeline(pipeline);
            render_pass.set_bind_group(0, &self.pass_group, &[]);

            for (i, draw) in pass.draws.iter().enumerate() {
                let offset = (i as u64 * DRAW_STRIDE) as u32;
                render_pass.set_bind_group(1, &self.draw_group, &[offset]);
                let inputs = override_groups[i].as_ref().unwrap_or(&base_group);
                render_pass.set_bind_group(2, inputs, &[]);

                match draw.kind {
                    DrawKind::Mesh(mesh) => {
                        let Some(mesh) = self.meshes.get(&mesh) else {
                            continue;
                        };
                        render_pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
                        render_pass
                            .set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                        render_pass.draw_indexed(0..mesh.index_count, 0, 0..1);
                    }
                    DrawKind::Quad => render_pass.draw(0..6, 0..1),
                }
            }
        }

        self.gpu.queue.submit(std::iter::once(encoder.finish()));
    }

    fn end_frame(&mut self) {
        if let Some((output, _)) = self.frame.take() {
            output.present();
        }
    }

    fn read_pixel(&mut self, target: TargetId, x: u32, y: u32) -> Result<[u8; 4], PipelineError> {
        let t = self
            .targets
            .get(&target)
            .ok_or_else(|| PipelineError::Readback(format!("unknown target {:?}", target)))?;
        if x >= t.width || y >= t.height {
            return Err(PipelineError::PixelOutOfBounds {
                x,
                y,
                width: t.width,
                height: t.height,
            });
        }
        let color = t
            .colors
            .first()
            .ok_or_else(|| PipelineError::Readback("target has no color attachment".into()))?;
        if color.format != Precision::Byte.format() {
            return Err(PipelineError::Readback(format!(
                "cannot read back {:?} texels",
                color.format
            )));
        }

        let device = &self.gpu.device;
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Pixel Readback"),
            size: READBACK_ROW as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Pixel Readback Encoder"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &color.texture,
                mip_level: 0,
                origin: wgpu::Origin3d { x, y, z: 0 },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(READBACK_ROW),
                    rows_per_image: Some(1),
                },
            },
            wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
        );
        self.gpu.queue.submit(std::iter::once(encoder.finish()));

        let slice = buffer.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });

        // The one deliberate stall: block until the copy and the map have completed.
        device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|e| PipelineError::Readback(e.to_string()))?;
        map_outcome(&rx)?;

        let pixel = {
            let data = slice.get_mapped_range();
            [data[0], data[1], data[2], data[3]]
        };
        buffer.unmap();
        Ok(pixel)
    }

    fn surface_size(&self) -> (u32, u32) {
        (self.gpu.width(), self.gpu.height())
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.gpu.resize(width, height);
    }
}

fn create_draw_buffer(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    capacity: u64,
) -> (wgpu::Buffer, wgpu::BindGroup) {
    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Draw Uniforms"),
        size: capacity * DRAW_STRIDE,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    let group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Draw Uniforms Bind Group"),
        layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                buffer: &buffer,
                offset: 0,
                size: NonZeroU64::new(std::mem::size_of::<DrawUniforms>() as u64),
            }),
        }],
    });
    (buffer, group)
}

fn upload_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    data: &TextureData,
) -> wgpu::TextureView {
    let size = wgpu::Extent3d {
        width: data.width,
        height: data.height,
        depth_or_array_layers: 1,
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(data.label),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8Unorm,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        &data.pixels,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(4 * data.width),
            rows_per_image: Some(data.height),
        },
        size,
    );
    if data.address == AddressMode::Repeat {
        log::debug!("'{}' is sampled with the repeat sampler", data.label);
    }
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}

type MapResult = Result<(), wgpu::BufferAsyncError>;

/// The result `map_async` reported. Blocks until the callback has run or was dropped.
fn map_outcome(rx: &mpsc::Receiver<MapResult>) -> Result<(), PipelineError> {
    rx.recv()
        .map_err(|_| PipelineError::Readback("map callback dropped".into()))??;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_success_is_reported() {
        let (tx, rx) = mpsc::channel();
        tx.send(Ok(())).unwrap();
        assert!(map_outcome(&rx).is_ok());
    }

    #[test]
    fn map_failure_becomes_a_readback_error() {
        let (tx, rx) = mpsc::channel::<MapResult>();
        tx.send(Err(wgpu::BufferAsyncError)).unwrap();
        assert!(matches!(map_outcome(&rx), Err(PipelineError::Readback(_))));
    }

    #[test]
    fn dropped_callback_does_not_hang() {
        let (tx, rx) = mpsc::channel::<MapResult>();
        drop(tx);
        assert!(matches!(map_outcome(&rx), Err(PipelineError::Readback(_))));
    }
}
