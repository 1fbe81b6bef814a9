// gfx/wgpu_device/mod.rs
//
// wgpu implementation of the immediate-mode device. Uniforms live in a
// per-program CPU block; every draw snapshots the block into a frame-wide
// uniform buffer and is replayed into render passes by `finish_frame`.

mod context;
mod frame;
mod pipeline;
mod textures;

use std::collections::HashMap;
use std::num::NonZeroU64;
use std::sync::Arc;

use glam::Mat4;
use wgpu::util::DeviceExt;
use winit::dpi::PhysicalSize;
use winit::window::Window;

use super::uniforms::WriteOutcome;
use super::{
    ClearFlags, CullFace, DepthFunc, FramebufferId, GpuResource, GraphicsDevice, ImageData,
    ProgramId, ProgramSource, SamplerParams, SamplerSlot, ShaderError, ShaderStage, TextureId,
    TextureKind, UniformBlock, UniformSlot, UniformValue, VertexArrayId, VertexLayout, Viewport,
    NO_TEXTURE_UNIT,
};
use crate::settings::RenderSettings;

pub use context::ContextError;
use context::{RenderContext, SurfaceDepth};
use frame::{BindingSet, DrawRecord, FrameRecorder, PassRecord, SampledTexture};
use pipeline::{
    compare_function, cull_mode, instance_buffer_layout, vertex_buffer_layout, BindingLayouts, PipelineBuilder,
    PipelineKey, TargetKind, UNIFORM_STRIDE,
};
use textures::{FallbackTextures, GpuTexture, MipmapGenerator, SamplerCache, DEPTH_TARGET_FORMAT};

const PRELUDE: &str = include_str!("../../../shaders/prelude.wgsl");
const INITIAL_DRAW_CAPACITY: u64 = 64;

struct ProgramEntry {
    label: String,
    vertex: Option<wgpu::ShaderModule>,
    fragment: Option<wgpu::ShaderModule>,
    status: Result<(), ShaderError>,
    block: UniformBlock,
    samplers: HashMap<SamplerSlot, u32>,
}

struct VertexArray {
    vertices: wgpu::Buffer,
    indices: Option<wgpu::Buffer>,
    layout: VertexLayout,
    element_count: u32,
    instances: Option<InstanceBuffer>,
}

struct InstanceBuffer {
    buffer: wgpu::Buffer,
    count: u32,
}

impl InstanceBuffer {
    fn new(device: &wgpu::Device, label: &str, models: &[Mat4]) -> Self {
        let columns: Vec<[f32; 16]> = models.iter().map(Mat4::to_cols_array).collect();
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(&columns),
            usage: wgpu::BufferUsages::VERTEX,
        });
        Self {
            buffer,
            count: models.len() as u32,
        }
    }
}

#[derive(Clone, Copy)]
struct UnitBinding {
    texture: TextureId,
    kind: TextureKind,
    params: SamplerParams,
}

struct UniformBuffer {
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    capacity: u64,
}

impl UniformBuffer {
    fn new(device: &wgpu::Device, layout: &wgpu::BindGroupLayout, capacity: u64) -> Self {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Frame Uniforms"),
            size: capacity,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Frame Uniforms Bind Group"),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &buffer,
                    offset: 0,
                    size: NonZeroU64::new(UniformBlock::SIZE),
                }),
            }],
        });
        Self {
            buffer,
            bind_group,
            capacity,
        }
    }

    fn ensure_capacity(&mut self, device: &wgpu::Device, layout: &wgpu::BindGroupLayout, required: u64) {
        if required <= self.capacity {
            return;
        }
        let new_capacity = required.max(self.capacity * 2);
        log::info!(
            "Growing uniform buffer: {} -> {} bytes",
            self.capacity,
            new_capacity
        );
        *self = Self::new(device, layout, new_capacity);
    }
}

#[derive(Clone, Copy, Debug)]
struct DeviceState {
    program: Option<ProgramId>,
    framebuffer: Option<FramebufferId>,
    cull_face: CullFace,
    depth_func: DepthFunc,
    viewport: Viewport,
}

pub struct WgpuDevice {
    context: RenderContext,
    layouts: BindingLayouts,
    mipmaps: MipmapGenerator,
    fallbacks: FallbackTextures,
    samplers: SamplerCache,
    programs: HashMap<ProgramId, ProgramEntry>,
    textures: HashMap<TextureId, GpuTexture>,
    framebuffers: HashMap<FramebufferId, TextureId>,
    vertex_arrays: HashMap<VertexArrayId, VertexArray>,
    pipelines: HashMap<PipelineKey, Option<wgpu::RenderPipeline>>,
    bind_groups: HashMap<BindingSet, wgpu::BindGroup>,
    units: HashMap<u32, UnitBinding>,
    uniforms: UniformBuffer,
    identity_instance: InstanceBuffer,
    frame: FrameRecorder,
    state: DeviceState,
    next_id: u32,
}

impl WgpuDevice {
    pub async fn new(window: Arc<Window>, settings: &RenderSettings) -> Result<Self, ContextError> {
        let context = RenderContext::new(window, settings).await?;
        let device = &context.device;

        let layouts = BindingLayouts::new(device);
        let mut mipmaps = MipmapGenerator::new(device);
        let fallbacks = FallbackTextures::new(device, &context.queue, &mut mipmaps);
        let mut samplers = SamplerCache::new();
        samplers.ensure(device, SamplerParams::default());
        let uniforms = UniformBuffer::new(device, &layouts.globals, UNIFORM_STRIDE * INITIAL_DRAW_CAPACITY);
        let identity_instance = InstanceBuffer::new(device, "Identity Instance", &[Mat4::IDENTITY]);

        let state = DeviceState {
            program: None,
            framebuffer: None,
            cull_face: CullFace::Back,
            depth_func: DepthFunc::Less,
            viewport: Viewport::sized(context.size.width, context.size.height),
        };

        Ok(Self {
            context,
            layouts,
            mipmaps,
            fallbacks,
            samplers,
            programs: HashMap::new(),
            textures: HashMap::new(),
            framebuffers: HashMap::new(),
            vertex_arrays: HashMap::new(),
            pipelines: HashMap::new(),
            bind_groups: HashMap::new(),
            units: HashMap::new(),
            uniforms,
            identity_instance,
            frame: FrameRecorder::new(),
            state,
            next_id: 1,
        })
    }

    fn next_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn compile_module(
        &self,
        label: &str,
        stage: ShaderStage,
        body: &str,
    ) -> Result<wgpu::ShaderModule, ShaderError> {
        let device = &self.context.device;
        let source = format!("{PRELUDE}\n{body}");
        let label = format!("{label} ({stage:?})");

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&label),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });
        match pollster::block_on(device.pop_error_scope()) {
            Some(err) => Err(ShaderError::Compile {
                stage,
                log: err.to_string(),
            }),
            None => Ok(module),
        }
    }

    fn build_pipeline(&self, key: PipelineKey) -> Option<wgpu::RenderPipeline> {
        let program = self.programs.get(&key.program)?;
        let vertex = program.vertex.as_ref()?;
        let device = &self.context.device;
        let label = format!("{} Pipeline", program.label);
        let compare = compare_function(key.depth_func);

        let builder = PipelineBuilder::new(device, &self.layouts.pipeline, vertex)
            .with_label(&label)
            .with_vertex_buffer(vertex_buffer_layout(key.layout))
            .with_vertex_buffer(instance_buffer_layout())
            .with_cull_mode(cull_mode(key.cull_face));

        let builder = match key.target {
            TargetKind::Surface => builder
                .with_fragment(program.fragment.as_ref()?)
                .with_color_target(self.context.config.format)
                .with_depth(SurfaceDepth::FORMAT, compare),
            TargetKind::DepthOnly => builder.with_depth(DEPTH_TARGET_FORMAT, compare),
        };

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = builder.build();
        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            log::error!("Failed to build pipeline for '{}': {}", program.label, err);
            return None;
        }
        log::debug!("Built pipeline {:?}", key);
        Some(pipeline)
    }

    fn ensure_pipeline(&mut self, key: PipelineKey) -> bool {
        if let Some(pipeline) = self.pipelines.get(&key) {
            return pipeline.is_some();
        }
        let pipeline = self.build_pipeline(key);
        let built = pipeline.is_some();
        self.pipelines.insert(key, pipeline);
        built
    }

    /// Texture bound to the unit a program's sampler points at, if it has
    /// the expected kind and is not the render target of the current pass.
    fn resolve_unit(
        &self,
        samplers: &HashMap<SamplerSlot, u32>,
        slot: SamplerSlot,
        expected: TextureKind,
    ) -> Option<UnitBinding> {
        let unit = samplers.get(&slot)?;
        let bound = *self.units.get(unit)?;
        if bound.kind != expected || self.textures.get(&bound.texture)?.kind != expected {
            return None;
        }
        let rendering_into = self
            .state
            .framebuffer
            .and_then(|fb| self.framebuffers.get(&fb));
        if rendering_into == Some(&bound.texture) {
            return None;
        }
        Some(bound)
    }

    fn resolve_bindings(&self, samplers: &HashMap<SamplerSlot, u32>) -> BindingSet {
        let sampled = |slot, kind| {
            self.resolve_unit(samplers, slot, kind)
                .map_or(SampledTexture::fallback(), |b| SampledTexture {
                    texture: Some(b.texture),
                    params: b.params,
                })
        };
        BindingSet {
            diffuse: sampled(SamplerSlot::MaterialDiffuse, TextureKind::Texture2d),
            specular: sampled(SamplerSlot::MaterialSpecular, TextureKind::Texture2d),
            shadow_map: self
                .resolve_unit(samplers, SamplerSlot::ShadowMap, TextureKind::Depth)
                .map(|b| b.texture),
            skybox: sampled(SamplerSlot::Skybox, TextureKind::CubeMap),
        }
    }

    fn view_for(&self, texture: Option<TextureId>, kind: TextureKind) -> &wgpu::TextureView {
        texture
            .and_then(|id| self.textures.get(&id))
            .filter(|t| t.kind == kind)
            .map_or(&self.fallbacks.for_kind(kind).view, |t| &t.view)
    }

    fn create_bind_group(&self, set: &BindingSet) -> Option<wgpu::BindGroup> {
        let diffuse_sampler = self.samplers.get(&set.diffuse.params)?;
        let specular_sampler = self.samplers.get(&set.specular.params)?;
        let skybox_sampler = self.samplers.get(&set.skybox.params)?;

        Some(self.context.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Texture Units Bind Group"),
            layout: &self.layouts.textures,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(
                        self.view_for(set.diffuse.texture, TextureKind::Texture2d),
                    ),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(diffuse_sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(
                        self.view_for(set.specular.texture, TextureKind::Texture2d),
                    ),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::Sampler(specular_sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::TextureView(
                        self.view_for(set.shadow_map, TextureKind::Depth),
                    ),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: wgpu::BindingResource::TextureView(
                        self.view_for(set.skybox.texture, TextureKind::CubeMap),
                    ),
                },
                wgpu::BindGroupEntry {
                    binding: 6,
                    resource: wgpu::BindingResource::Sampler(skybox_sampler),
                },
            ],
        }))
    }

    fn ensure_bind_group(&mut self, set: BindingSet) {
        if self.bind_groups.contains_key(&set) {
            return;
        }
        let device = &self.context.device;
        for params in [set.diffuse.params, set.specular.params, set.skybox.params] {
            self.samplers.ensure(device, params);
        }
        if let Some(bind_group) = self.create_bind_group(&set) {
            self.bind_groups.insert(set, bind_group);
        }
    }

    fn encode_pass(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        pass: &PassRecord,
        surface_view: &wgpu::TextureView,
    ) {
        let depth_load = if pass.clear_depth {
            wgpu::LoadOp::Clear(1.0)
        } else {
            wgpu::LoadOp::Load
        };

        let (colour_attachment, depth_view, target_size) = match pass.target {
            None => {
                let load = match pass.clear_colour {
                    Some([r, g, b, a]) => wgpu::LoadOp::Clear(wgpu::Color {
                        r: r as f64,
                        g: g as f64,
                        b: b as f64,
                        a: a as f64,
                    }),
                    None => wgpu::LoadOp::Load,
                };
                (
                    Some(wgpu::RenderPassColorAttachment {
                        view: surface_view,
                        resolve_target: None,
                        depth_slice: None,
                        ops: wgpu::Operations {
                            load,
                            store: wgpu::StoreOp::Store,
                        },
                    }),
                    &self.context.depth.view,
                    (self.context.config.width, self.context.config.height),
                )
            }
            Some(framebuffer) => {
                let Some(texture) = self
                    .framebuffers
                    .get(&framebuffer)
                    .and_then(|id| self.textures.get(id))
                else {
                    log::warn!("Skipping pass for released framebuffer {:?}", framebuffer);
                    return;
                };
                (None, &texture.view, texture.size())
            }
        };

        let colour_attachments = [colour_attachment];
        let colour_attachments: &[Option<wgpu::RenderPassColorAttachment>] = if pass.target.is_none() {
            &colour_attachments
        } else {
            &[]
        };

        let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(if pass.target.is_none() {
                "Surface Pass"
            } else {
                "Depth Target Pass"
            }),
            color_attachments: colour_attachments,
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: depth_load,
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        for draw in &pass.draws {
            let Some(Some(pipeline)) = self.pipelines.get(&draw.pipeline) else {
                continue;
            };
            let Some(vertex_array) = self.vertex_arrays.get(&draw.vertex_array) else {
                continue;
            };
            let Some(bind_group) = self.bind_groups.get(&draw.bindings) else {
                continue;
            };
            let Some([x, y, width, height]) = wgpu_viewport(draw.viewport, target_size) else {
                continue;
            };
            let count = draw.count.min(vertex_array.element_count);
            let (instances, instance_count) = match &vertex_array.instances {
                Some(attached) => (&attached.buffer, draw.instances.min(attached.count)),
                None => (&self.identity_instance.buffer, 1),
            };

            rpass.set_viewport(x, y, width, height, 0.0, 1.0);
            rpass.set_pipeline(pipeline);
            rpass.set_bind_group(0, &self.uniforms.bind_group, &[draw.uniform_offset]);
            rpass.set_bind_group(1, bind_group, &[]);
            rpass.set_vertex_buffer(0, vertex_array.vertices.slice(..));
            rpass.set_vertex_buffer(1, instances.slice(..));
            match &vertex_array.indices {
                Some(indices) => {
                    rpass.set_index_buffer(indices.slice(..), wgpu::IndexFormat::Uint32);
                    rpass.draw_indexed(0..count, 0, 0..instance_count);
                }
                None => rpass.draw(0..count, 0..instance_count),
            }
        }
    }
}

/// Convert a bottom-left-origin viewport into wgpu's top-left space,
/// clipped to the target. Empty results skip the draw.
fn wgpu_viewport(viewport: Viewport, (target_w, target_h): (u32, u32)) -> Option<[f32; 4]> {
    let x = viewport.x.min(target_w);
    let y = viewport.y.min(target_h);
    let width = viewport.width.min(target_w - x);
    let height = viewport.height.min(target_h - y);
    if width == 0 || height == 0 {
        return None;
    }
    let top = target_h - (y + height);
    Some([x as f32, top as f32, width as f32, height as f32])
}

impl GraphicsDevice for WgpuDevice {
    fn create_program(&mut self, source: &ProgramSource) -> ProgramId {
        let id = ProgramId(self.next_id());
        let mut status = Ok(());

        let vertex = self
            .compile_module(&source.label, ShaderStage::Vertex, &source.vertex)
            .map_err(|err| status = Err(err))
            .ok();
        let fragment = self
            .compile_module(&source.label, ShaderStage::Fragment, &source.fragment)
            .map_err(|err| {
                if status.is_ok() {
                    status = Err(err);
                }
            })
            .ok();

        if source.geometry.is_some() {
            log::warn!(
                "Program '{}' has a geometry stage; it is ignored on this device",
                source.label
            );
            if status.is_ok() {
                status = Err(ShaderError::UnsupportedStage {
                    stage: ShaderStage::Geometry,
                });
            }
        }

        self.programs.insert(
            id,
            ProgramEntry {
                label: source.label.clone(),
                vertex,
                fragment,
                status,
                block: UniformBlock::default(),
                samplers: HashMap::new(),
            },
        );
        id
    }

    fn program_status(&self, program: ProgramId) -> Result<(), ShaderError> {
        match self.programs.get(&program) {
            Some(entry) => entry.status.clone(),
            None => Err(ShaderError::Link {
                log: format!("unknown program {:?}", program),
            }),
        }
    }

    fn use_program(&mut self, program: ProgramId) {
        self.state.program = Some(program);
    }

    fn set_uniform(&mut self, program: ProgramId, name: &str, value: UniformValue) {
        let Some(entry) = self.programs.get_mut(&program) else {
            log::debug!("Uniform '{}' set on unknown program {:?}", name, program);
            return;
        };
        let Some(slot) = UniformSlot::parse(name) else {
            log::debug!("Program '{}' has no uniform '{}'", entry.label, name);
            return;
        };
        match entry.block.write(slot, value) {
            WriteOutcome::Written => {}
            WriteOutcome::Sampler => match (slot, value) {
                (UniformSlot::Sampler(sampler), UniformValue::Int(unit)) if unit >= 0 => {
                    entry.samplers.insert(sampler, unit as u32);
                }
                (UniformSlot::Sampler(sampler), UniformValue::Int(NO_TEXTURE_UNIT)) => {
                    entry.samplers.remove(&sampler);
                }
                _ => log::debug!("Sampler '{}' expects a texture unit, got {:?}", name, value),
            },
            outcome => log::debug!("Uniform '{}' not written: {:?}", name, outcome),
        }
    }

    fn create_texture(&mut self, image: &ImageData) -> TextureId {
        let id = TextureId(self.next_id());
        let texture = textures::create_texture_2d(
            &self.context.device,
            &self.context.queue,
            &mut self.mipmaps,
            image,
        );
        self.textures.insert(id, texture);
        id
    }

    fn create_cube_map(&mut self, faces: &[Option<ImageData>; 6]) -> TextureId {
        let id = TextureId(self.next_id());
        let texture = textures::create_cube_map(&self.context.device, &self.context.queue, faces);
        self.textures.insert(id, texture);
        id
    }

    fn create_depth_target(&mut self, width: u32, height: u32) -> (FramebufferId, TextureId) {
        let framebuffer = FramebufferId(self.next_id());
        let texture = TextureId(self.next_id());
        self.textures
            .insert(texture, textures::create_depth_texture(&self.context.device, width, height));
        self.framebuffers.insert(framebuffer, texture);
        (framebuffer, texture)
    }

    fn bind_texture(&mut self, unit: u32, texture: TextureId, kind: TextureKind, params: SamplerParams) {
        if !self.textures.contains_key(&texture) {
            log::debug!("Binding released texture {:?} to unit {}", texture, unit);
            self.units.remove(&unit);
            return;
        }
        self.samplers.ensure(&self.context.device, params);
        self.units.insert(
            unit,
            UnitBinding {
                texture,
                kind,
                params,
            },
        );
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>) {
        let framebuffer = match framebuffer {
            Some(fb) if !self.framebuffers.contains_key(&fb) => {
                log::warn!("Unknown framebuffer {:?}; rendering to the surface", fb);
                None
            }
            other => other,
        };
        self.state.framebuffer = framebuffer;
        self.frame.bind_target(framebuffer);
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.state.viewport = viewport;
    }

    fn viewport(&self) -> Viewport {
        self.state.viewport
    }

    fn clear(&mut self, flags: ClearFlags, colour: [f32; 4]) {
        let colour = (flags.contains(ClearFlags::COLOUR) && self.state.framebuffer.is_none())
            .then_some(colour);
        self.frame
            .clear(self.state.framebuffer, colour, flags.contains(ClearFlags::DEPTH));
    }

    fn set_cull_face(&mut self, face: CullFace) {
        self.state.cull_face = face;
    }

    fn cull_face(&self) -> CullFace {
        self.state.cull_face
    }

    fn set_depth_func(&mut self, func: DepthFunc) {
        self.state.depth_func = func;
    }

    fn depth_func(&self) -> DepthFunc {
        self.state.depth_func
    }

    fn create_vertex_array(
        &mut self,
        vertices: &[f32],
        layout: VertexLayout,
        indices: Option<&[u32]>,
    ) -> VertexArrayId {
        let id = VertexArrayId(self.next_id());
        let device = &self.context.device;
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Vertex Array"),
            contents: bytemuck::cast_slice(vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = indices.map(|indices| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Index Array"),
                contents: bytemuck::cast_slice(indices),
                usage: wgpu::BufferUsages::INDEX,
            })
        });
        let element_count = match indices {
            Some(indices) => indices.len(),
            None => vertices.len() / layout.floats_per_vertex(),
        } as u32;

        self.vertex_arrays.insert(
            id,
            VertexArray {
                vertices: vertex_buffer,
                indices: index_buffer,
                layout,
                element_count,
                instances: None,
            },
        );
        id
    }

    fn set_instances(&mut self, vertex_array: VertexArrayId, models: &[Mat4]) {
        let instances = (!models.is_empty())
            .then(|| InstanceBuffer::new(&self.context.device, "Instance Matrices", models));
        match self.vertex_arrays.get_mut(&vertex_array) {
            Some(entry) => entry.instances = instances,
            None => log::debug!("Instances set on released vertex array {:?}", vertex_array),
        }
    }

    fn draw_instanced(&mut self, vertex_array: VertexArrayId, count: u32, instances: u32) {
        if count == 0 || instances == 0 {
            return;
        }
        let Some(program_id) = self.state.program else {
            log::debug!("Draw issued without a program in use");
            return;
        };
        let Some(layout) = self.vertex_arrays.get(&vertex_array).map(|va| va.layout) else {
            log::debug!("Draw issued for released vertex array {:?}", vertex_array);
            return;
        };
        let target = match self.state.framebuffer {
            Some(_) => TargetKind::DepthOnly,
            None => TargetKind::Surface,
        };
        let key = PipelineKey {
            program: program_id,
            layout,
            cull_face: self.state.cull_face,
            depth_func: self.state.depth_func,
            target,
        };
        if !self.ensure_pipeline(key) {
            return;
        }

        let Some(program) = self.programs.get(&program_id) else {
            return;
        };
        let bindings = self.resolve_bindings(&program.samplers);
        let mut block = program.block;
        block.material.has_diffuse = bindings.diffuse.texture.is_some() as i32;
        block.material.has_specular = bindings.specular.texture.is_some() as i32;
        block.material.has_shadow_map = bindings.shadow_map.is_some() as i32;

        let uniform_offset = self.frame.push_uniforms(&block);
        self.frame.push_draw(
            self.state.framebuffer,
            DrawRecord {
                pipeline: key,
                vertex_array,
                count,
                instances,
                uniform_offset,
                bindings,
                viewport: self.state.viewport,
            },
        );
    }

    fn release(&mut self, resource: GpuResource) {
        match resource {
            GpuResource::Program(id) => {
                self.programs.remove(&id);
                self.pipelines.retain(|key, _| key.program != id);
                if self.state.program == Some(id) {
                    self.state.program = None;
                }
            }
            GpuResource::Texture(id) => {
                self.textures.remove(&id);
                self.units.retain(|_, bound| bound.texture != id);
                self.bind_groups.clear();
            }
            GpuResource::Framebuffer(id) => {
                self.framebuffers.remove(&id);
                if self.state.framebuffer == Some(id) {
                    self.state.framebuffer = None;
                }
            }
            GpuResource::VertexArray(id) => {
                self.vertex_arrays.remove(&id);
            }
        }
    }

    fn finish_frame(&mut self) {
        let (passes, uniform_bytes) = self.frame.take();

        let frame = match self.context.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                log::warn!("Surface lost or outdated; reconfiguring");
                self.context.reconfigure();
                return;
            }
            Err(wgpu::SurfaceError::Timeout) => {
                log::warn!("Surface acquire timed out; skipping frame");
                return;
            }
            Err(err) => {
                log::error!("Failed to acquire surface texture: {}", err);
                return;
            }
        };
        let surface_view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        self.uniforms.ensure_capacity(
            &self.context.device,
            &self.layouts.globals,
            uniform_bytes.len() as u64,
        );
        if !uniform_bytes.is_empty() {
            self.context
                .queue
                .write_buffer(&self.uniforms.buffer, 0, &uniform_bytes);
        }

        for pass in &passes {
            for draw in &pass.draws {
                self.ensure_bind_group(draw.bindings);
            }
        }

        let mut encoder = self
            .context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });
        for pass in passes.iter().filter(|pass| !pass.is_empty()) {
            self.encode_pass(&mut encoder, pass, &surface_view);
        }
        self.context.queue.submit(Some(encoder.finish()));
        frame.present();
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.context.resize(PhysicalSize::new(width, height));
        self.state.viewport = Viewport::sized(width, height);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_target_viewport_is_unchanged() {
        assert_eq!(
            wgpu_viewport(Viewport::sized(800, 600), (800, 600)),
            Some([0.0, 0.0, 800.0, 600.0])
        );
    }

    #[test]
    fn viewport_origin_flips_to_top_left() {
        let viewport = Viewport {
            x: 10,
            y: 20,
            width: 100,
            height: 50,
        };
        assert_eq!(
            wgpu_viewport(viewport, (200, 200)),
            Some([10.0, 130.0, 100.0, 50.0])
        );
    }

    #[test]
    fn oversized_viewport_is_clipped_to_target() {
        assert_eq!(
            wgpu_viewport(Viewport::sized(4096, 4096), (1024, 1024)),
            Some([0.0, 0.0, 1024.0, 1024.0])
        );
        assert_eq!(
            wgpu_viewport(
                Viewport {
                    x: 2000,
                    y: 0,
                    width: 10,
                    height: 10
                },
                (1024, 1024)
            ),
            None
        );
    }
}
