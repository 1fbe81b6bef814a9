// gfx/wgpu_device/textures.rs (with mipmaps)

use std::collections::HashMap;

use crate::gfx::{FilterMode, ImageData, PixelFormat, SamplerParams, TextureKind, WrapMode};

pub(crate) const DEPTH_TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

pub(crate) struct GpuTexture {
    pub(crate) texture: wgpu::Texture,
    pub(crate) view: wgpu::TextureView,
    pub(crate) kind: TextureKind,
}

impl GpuTexture {
    pub(crate) fn size(&self) -> (u32, u32) {
        let size = self.texture.size();
        (size.width, size.height)
    }
}

/// Calculate the number of mip levels for a given texture size
pub(crate) fn calculate_mip_levels(width: u32, height: u32) -> u32 {
    let max_dimension = width.max(height).max(1);
    u32::BITS - max_dimension.leading_zeros()
}

/// Storage format and optional sRGB view format for uploaded pixels.
pub(crate) fn formats_for(
    format: PixelFormat,
    srgb: bool,
) -> (wgpu::TextureFormat, Option<wgpu::TextureFormat>) {
    match (format, srgb) {
        (PixelFormat::Red, _) => (wgpu::TextureFormat::R8Unorm, None),
        (_, true) => (
            wgpu::TextureFormat::Rgba8Unorm,
            Some(wgpu::TextureFormat::Rgba8UnormSrgb),
        ),
        (_, false) => (wgpu::TextureFormat::Rgba8Unorm, None),
    }
}

fn address_mode(mode: WrapMode) -> wgpu::AddressMode {
    match mode {
        WrapMode::Repeat => wgpu::AddressMode::Repeat,
        WrapMode::MirroredRepeat => wgpu::AddressMode::MirrorRepeat,
        // Border sampling needs an optional device feature; shaders treat
        // out-of-range lookups themselves.
        WrapMode::ClampToEdge | WrapMode::ClampToBorder => wgpu::AddressMode::ClampToEdge,
    }
}

/// Split a GL-style minification filter into (min, mipmap) filters.
fn min_and_mip_filter(filter: FilterMode) -> (wgpu::FilterMode, wgpu::FilterMode) {
    use wgpu::FilterMode::{Linear, Nearest};
    match filter {
        FilterMode::Nearest | FilterMode::NearestMipmapNearest => (Nearest, Nearest),
        FilterMode::Linear | FilterMode::LinearMipmapNearest => (Linear, Nearest),
        FilterMode::NearestMipmapLinear => (Nearest, Linear),
        FilterMode::LinearMipmapLinear => (Linear, Linear),
    }
}

fn mag_filter(filter: FilterMode) -> wgpu::FilterMode {
    match filter {
        FilterMode::Nearest | FilterMode::NearestMipmapNearest | FilterMode::NearestMipmapLinear => {
            wgpu::FilterMode::Nearest
        }
        _ => wgpu::FilterMode::Linear,
    }
}

pub(crate) fn sampler_descriptor(params: &SamplerParams) -> wgpu::SamplerDescriptor<'static> {
    let (min_filter, mipmap_filter) = min_and_mip_filter(params.min_filter);
    wgpu::SamplerDescriptor {
        label: Some("Texture Unit Sampler"),
        address_mode_u: address_mode(params.wrap_s),
        address_mode_v: address_mode(params.wrap_t),
        address_mode_w: address_mode(params.wrap_r),
        mag_filter: mag_filter(params.mag_filter),
        min_filter,
        mipmap_filter,
        ..Default::default()
    }
}

pub(crate) struct SamplerCache {
    samplers: HashMap<SamplerParams, wgpu::Sampler>,
}

impl SamplerCache {
    pub(crate) fn new() -> Self {
        Self {
            samplers: HashMap::new(),
        }
    }

    pub(crate) fn ensure(&mut self, device: &wgpu::Device, params: SamplerParams) {
        self.samplers
            .entry(params)
            .or_insert_with(|| device.create_sampler(&sampler_descriptor(&params)));
    }

    pub(crate) fn get(&self, params: &SamplerParams) -> Option<&wgpu::Sampler> {
        self.samplers.get(params)
    }
}

/// Downsamples each mip level from the previous one with a blit pass.
pub(crate) struct MipmapGenerator {
    shader: wgpu::ShaderModule,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    pipelines: HashMap<wgpu::TextureFormat, wgpu::RenderPipeline>,
    sampler: wgpu::Sampler,
}

impl MipmapGenerator {
    pub(crate) fn new(device: &wgpu::Device) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Blit Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../../../shaders/blit.wgsl").into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Blit Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
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

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Blit Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Mip Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        Self {
            shader,
            bind_group_layout,
            pipeline_layout,
            pipelines: HashMap::new(),
            sampler,
        }
    }

    fn pipeline(&mut self, device: &wgpu::Device, format: wgpu::TextureFormat) -> &wgpu::RenderPipeline {
        let shader = &self.shader;
        let layout = &self.pipeline_layout;
        self.pipelines.entry(format).or_insert_with(|| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("Blit Pipeline"),
                layout: Some(layout),
                vertex: wgpu::VertexState {
                    module: shader,
                    entry_point: Some("vs_main"),
                    buffers: &[],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: shader,
                    entry_point: Some("fs_main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    ..Default::default()
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            })
        })
    }

    pub(crate) fn generate(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        texture: &wgpu::Texture,
        format: wgpu::TextureFormat,
    ) {
        let mip_level_count = texture.mip_level_count();
        if mip_level_count <= 1 {
            return;
        }

        let pipeline = self.pipeline(device, format).clone();

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Mipmap Generator"),
        });

        for target_mip in 1..mip_level_count {
            let src_view = texture.create_view(&wgpu::TextureViewDescriptor {
                label: Some("Mip Source"),
                format: Some(format),
                dimension: Some(wgpu::TextureViewDimension::D2),
                aspect: wgpu::TextureAspect::All,
                base_mip_level: target_mip - 1,
                mip_level_count: Some(1),
                base_array_layer: 0,
                array_layer_count: Some(1),
                usage: Some(wgpu::TextureUsages::TEXTURE_BINDING),
            });

            let dst_view = texture.create_view(&wgpu::TextureViewDescriptor {
                label: Some("Mip Destination"),
                format: Some(format),
                dimension: Some(wgpu::TextureViewDimension::D2),
                aspect: wgpu::TextureAspect::All,
                base_mip_level: target_mip,
                mip_level_count: Some(1),
                base_array_layer: 0,
                array_layer_count: Some(1),
                usage: Some(wgpu::TextureUsages::RENDER_ATTACHMENT),
            });

            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Mip Bind Group"),
                layout: &self.bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(&src_view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::Sampler(&self.sampler),
                    },
                ],
            });

            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Mipmap Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &dst_view,
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            rpass.set_pipeline(&pipeline);
            rpass.set_bind_group(0, &bind_group, &[]);
            rpass.draw(0..3, 0..1);
        }

        queue.submit(Some(encoder.finish()));
    }
}

fn extent(width: u32, height: u32, layers: u32) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width: width.max(1),
        height: height.max(1),
        depth_or_array_layers: layers,
    }
}

fn upload_layer(
    queue: &wgpu::Queue,
    texture: &wgpu::Texture,
    layer: u32,
    bytes_per_pixel: u32,
    width: u32,
    height: u32,
    data: &[u8],
) {
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d {
                x: 0,
                y: 0,
                z: layer,
            },
            aspect: wgpu::TextureAspect::All,
        },
        data,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(bytes_per_pixel * width),
            rows_per_image: Some(height),
        },
        extent(width, height, 1),
    );
}

/// 2D colour texture with a full mip chain.
pub(crate) fn create_texture_2d(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    mipmaps: &mut MipmapGenerator,
    image: &ImageData,
) -> GpuTexture {
    let (storage, view_format) = formats_for(image.format, image.srgb);
    let mip_level_count = calculate_mip_levels(image.width, image.height);

    let view_formats: Vec<wgpu::TextureFormat> = view_format.into_iter().collect();
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Texture 2D"),
        size: extent(image.width, image.height, 1),
        mip_level_count,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: storage,
        usage: wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_DST
            | wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &view_formats,
    });

    let (bytes_per_pixel, pixels) = match image.format {
        PixelFormat::Red => (1, image.pixels.clone()),
        _ => (4, image.to_rgba8()),
    };
    upload_layer(queue, &texture, 0, bytes_per_pixel, image.width, image.height, &pixels);
    mipmaps.generate(device, queue, &texture, storage);

    let view = texture.create_view(&wgpu::TextureViewDescriptor {
        format: view_format.or(Some(storage)),
        ..Default::default()
    });

    GpuTexture {
        texture,
        view,
        kind: TextureKind::Texture2d,
    }
}

/// Cube map from six faces. Missing faces are filled with black at the size
/// of the first face that did load.
pub(crate) fn create_cube_map(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    faces: &[Option<ImageData>; 6],
) -> GpuTexture {
    let reference = faces.iter().flatten().next();
    let (width, height) = reference.map_or((1, 1), |f| (f.width, f.height));
    let srgb = reference.is_some_and(|f| f.srgb);
    let (storage, view_format) = formats_for(PixelFormat::Rgba, srgb);

    let view_formats: Vec<wgpu::TextureFormat> = view_format.into_iter().collect();
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Cube Map"),
        size: extent(width, height, 6),
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: storage,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &view_formats,
    });

    let black = vec![0u8; (width.max(1) * height.max(1) * 4) as usize];
    for (layer, face) in faces.iter().enumerate() {
        let pixels = match face {
            Some(face) if face.width == width && face.height == height => face.to_rgba8(),
            Some(face) => {
                log::warn!(
                    "Cube map face {} is {}x{}, expected {}x{}; using black",
                    layer,
                    face.width,
                    face.height,
                    width,
                    height
                );
                black.clone()
            }
            None => black.clone(),
        };
        upload_layer(queue, &texture, layer as u32, 4, width, height, &pixels);
    }

    let view = texture.create_view(&wgpu::TextureViewDescriptor {
        label: Some("Cube Map View"),
        format: view_format.or(Some(storage)),
        dimension: Some(wgpu::TextureViewDimension::Cube),
        ..Default::default()
    });

    GpuTexture {
        texture,
        view,
        kind: TextureKind::CubeMap,
    }
}

/// Depth-only render target, sampled later as a shadow map.
pub(crate) fn create_depth_texture(device: &wgpu::Device, width: u32, height: u32) -> GpuTexture {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Depth Target"),
        size: extent(width, height, 1),
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_TARGET_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    GpuTexture {
        texture,
        view,
        kind: TextureKind::Depth,
    }
}

/// Stand-ins bound to units a program samples but nothing was bound to.
pub(crate) struct FallbackTextures {
    pub(crate) white: GpuTexture,
    pub(crate) depth: GpuTexture,
    pub(crate) cube: GpuTexture,
}

impl FallbackTextures {
    pub(crate) fn new(device: &wgpu::Device, queue: &wgpu::Queue, mipmaps: &mut MipmapGenerator) -> Self {
        let white = create_texture_2d(device, queue, mipmaps, &ImageData::solid([255; 4], false));
        let cube = create_cube_map(device, queue, &Default::default());
        let depth = create_depth_texture(device, 1, 1);

        // Depth formats cannot be written by copy; clear through a pass.
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Fallback Depth Clear"),
        });
        {
            let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Fallback Depth Clear"),
                color_attachments: &[],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &depth.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
        }
        queue.submit(Some(encoder.finish()));

        Self { white, depth, cube }
    }

    pub(crate) fn for_kind(&self, kind: TextureKind) -> &GpuTexture {
        match kind {
            TextureKind::Texture2d => &self.white,
            TextureKind::Depth => &self.depth,
            TextureKind::CubeMap => &self.cube,
        }
    }
}
