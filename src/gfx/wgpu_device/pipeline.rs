// gfx/wgpu_device/pipeline.rs

use std::num::NonZeroU64;

use crate::gfx::{CullFace, DepthFunc, ProgramId, UniformBlock, VertexLayout};

/// Render target class a pipeline is compiled for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum TargetKind {
    Surface,
    DepthOnly,
}

/// Everything that forces a distinct `wgpu::RenderPipeline`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct PipelineKey {
    pub(crate) program: ProgramId,
    pub(crate) layout: VertexLayout,
    pub(crate) cull_face: CullFace,
    pub(crate) depth_func: DepthFunc,
    pub(crate) target: TargetKind,
}

const POSITION_NORMAL_UV_ATTRS: [wgpu::VertexAttribute; 3] = wgpu::vertex_attr_array![
    0 => Float32x3,
    1 => Float32x3,
    2 => Float32x2
];

const POSITION_ATTRS: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x3];

pub(crate) fn vertex_buffer_layout(layout: VertexLayout) -> wgpu::VertexBufferLayout<'static> {
    let attributes: &'static [wgpu::VertexAttribute] = match layout {
        VertexLayout::PositionNormalUv => &POSITION_NORMAL_UV_ATTRS,
        VertexLayout::Position => &POSITION_ATTRS,
    };
    wgpu::VertexBufferLayout {
        array_stride: layout.stride() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes,
    }
}

/// Per-instance model matrix as four column vectors after the mesh
/// attributes.
const INSTANCE_ATTRS: [wgpu::VertexAttribute; 4] = wgpu::vertex_attr_array![
    3 => Float32x4,
    4 => Float32x4,
    5 => Float32x4,
    6 => Float32x4
];

pub(crate) fn instance_buffer_layout() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<[f32; 16]>() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Instance,
        attributes: &INSTANCE_ATTRS,
    }
}

pub(crate) fn cull_mode(face: CullFace) -> Option<wgpu::Face> {
    match face {
        CullFace::None => None,
        CullFace::Front => Some(wgpu::Face::Front),
        CullFace::Back => Some(wgpu::Face::Back),
    }
}

pub(crate) fn compare_function(func: DepthFunc) -> wgpu::CompareFunction {
    match func {
        DepthFunc::Less => wgpu::CompareFunction::Less,
        DepthFunc::LessEqual => wgpu::CompareFunction::LessEqual,
        DepthFunc::Always => wgpu::CompareFunction::Always,
    }
}

/// Bytes reserved per draw in the frame uniform buffer.
pub(crate) const UNIFORM_STRIDE: u64 = {
    let align = 256;
    UniformBlock::SIZE.div_ceil(align) * align
};

/// Bind group layouts shared by every program.
pub(crate) struct BindingLayouts {
    pub(crate) globals: wgpu::BindGroupLayout,
    pub(crate) textures: wgpu::BindGroupLayout,
    pub(crate) pipeline: wgpu::PipelineLayout,
}

impl BindingLayouts {
    pub(crate) fn new(device: &wgpu::Device) -> Self {
        let globals = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Globals Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: NonZeroU64::new(UniformBlock::SIZE),
                },
                count: None,
            }],
        });

        let colour_texture = |binding, dimension| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: dimension,
                multisampled: false,
            },
            count: None,
        };
        let sampler = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        };

        let textures = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Texture Units Layout"),
            entries: &[
                colour_texture(0, wgpu::TextureViewDimension::D2),
                sampler(1),
                colour_texture(2, wgpu::TextureViewDimension::D2),
                sampler(3),
                wgpu::BindGroupLayoutEntry {
                    binding: 4,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Depth,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                colour_texture(5, wgpu::TextureViewDimension::Cube),
                sampler(6),
            ],
        });

        let pipeline = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Program Pipeline Layout"),
            bind_group_layouts: &[&globals, &textures],
            push_constant_ranges: &[],
        });

        Self {
            globals,
            textures,
            pipeline,
        }
    }
}

/// Fluent construction of a program pipeline from separately compiled
/// vertex and fragment modules.
pub(crate) struct PipelineBuilder<'a> {
    device: &'a wgpu::Device,
    label: Option<&'a str>,
    layout: &'a wgpu::PipelineLayout,
    vertex_module: &'a wgpu::ShaderModule,
    fragment_module: Option<&'a wgpu::ShaderModule>,
    vertex_buffers: Vec<wgpu::VertexBufferLayout<'a>>,
    color_targets: Vec<Option<wgpu::ColorTargetState>>,
    depth_stencil: Option<wgpu::DepthStencilState>,
    primitive: wgpu::PrimitiveState,
}

impl<'a> PipelineBuilder<'a> {
    pub(crate) fn new(
        device: &'a wgpu::Device,
        layout: &'a wgpu::PipelineLayout,
        vertex_module: &'a wgpu::ShaderModule,
    ) -> Self {
        Self {
            device,
            label: None,
            layout,
            vertex_module,
            fragment_module: None,
            vertex_buffers: Vec::new(),
            color_targets: Vec::new(),
            depth_stencil: None,
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: Some(wgpu::Face::Back),
                front_face: wgpu::FrontFace::Ccw,
                polygon_mode: wgpu::PolygonMode::Fill,
                ..Default::default()
            },
        }
    }

    pub(crate) fn with_label(mut self, label: &'a str) -> Self {
        self.label = Some(label);
        self
    }

    pub(crate) fn with_fragment(mut self, module: &'a wgpu::ShaderModule) -> Self {
        self.fragment_module = Some(module);
        self
    }

    pub(crate) fn with_vertex_buffer(mut self, layout: wgpu::VertexBufferLayout<'a>) -> Self {
        self.vertex_buffers.push(layout);
        self
    }

    pub(crate) fn with_color_target(mut self, format: wgpu::TextureFormat) -> Self {
        self.color_targets.push(Some(wgpu::ColorTargetState {
            format,
            blend: None,
            write_mask: wgpu::ColorWrites::ALL,
        }));
        self
    }

    pub(crate) fn with_depth(mut self, format: wgpu::TextureFormat, compare: wgpu::CompareFunction) -> Self {
        self.depth_stencil = Some(wgpu::DepthStencilState {
            format,
            depth_write_enabled: true,
            depth_compare: compare,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        });
        self
    }

    pub(crate) fn with_cull_mode(mut self, cull_mode: Option<wgpu::Face>) -> Self {
        self.primitive.cull_mode = cull_mode;
        self
    }

    pub(crate) fn build(self) -> wgpu::RenderPipeline {
        self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: self.label,
            layout: Some(self.layout),
            vertex: wgpu::VertexState {
                module: self.vertex_module,
                entry_point: Some("vs_main"),
                buffers: &self.vertex_buffers,
                compilation_options: Default::default(),
            },
            fragment: self.fragment_module.map(|module| wgpu::FragmentState {
                module,
                entry_point: Some("fs_main"),
                targets: &self.color_targets,
                compilation_options: Default::default(),
            }),
            primitive: self.primitive,
            depth_stencil: self.depth_stencil,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::mem;

    use super::*;

    #[test]
    fn uniform_stride_is_offset_aligned_and_fits_block() {
        assert_eq!(UNIFORM_STRIDE % 256, 0);
        assert!(UNIFORM_STRIDE >= UniformBlock::SIZE);
    }

    #[test]
    fn vertex_layouts_match_interleaved_strides() {
        let full = vertex_buffer_layout(VertexLayout::PositionNormalUv);
        assert_eq!(full.array_stride, 32);
        assert_eq!(full.attributes.len(), 3);
        assert_eq!(full.attributes[2].offset, 24);

        let position = vertex_buffer_layout(VertexLayout::Position);
        assert_eq!(position.array_stride, mem::size_of::<[f32; 3]>() as u64);

        let instance = instance_buffer_layout();
        assert_eq!(instance.array_stride, 64);
        assert_eq!(instance.step_mode, wgpu::VertexStepMode::Instance);
        assert_eq!(instance.attributes[0].shader_location, 3);
        assert_eq!(instance.attributes[3].offset, 48);
    }

    #[test]
    fn cull_state_maps_to_wgpu_faces() {
        assert_eq!(cull_mode(CullFace::None), None);
        assert_eq!(cull_mode(CullFace::Front), Some(wgpu::Face::Front));
        assert_eq!(
            compare_function(DepthFunc::LessEqual),
            wgpu::CompareFunction::LessEqual
        );
    }
}
