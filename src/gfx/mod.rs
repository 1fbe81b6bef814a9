// gfx/mod.rs
//
// Immediate-mode device boundary used by the scene layer. The scene code only
// ever talks to a `GraphicsDevice`; the wgpu backend and the recording backend
// both implement it.

pub mod gpu;
pub mod recording;
pub mod uniforms;
pub mod wgpu_device;

use bitflags::bitflags;
use glam::{Mat4, Vec3};
use thiserror::Error;

pub use gpu::{Gpu, GpuHandle};
pub use recording::{Command, DrawState, RecordingDevice, RecordingLog};
pub use uniforms::{LightField, SamplerSlot, UniformBlock, UniformSlot, MAX_POINT_LIGHTS};
pub use wgpu_device::WgpuDevice;

/// Sampler uniform value that detaches the sampler from every texture unit.
pub const NO_TEXTURE_UNIT: i32 = -1;

macro_rules! resource_id {
    ($($name:ident),* $(,)?) => {
        $(
            #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub struct $name(pub u32);
        )*
    };
}

resource_id!(ProgramId, TextureId, FramebufferId, VertexArrayId);

/// Any device resource that can be released.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GpuResource {
    Program(ProgramId),
    Texture(TextureId),
    Framebuffer(FramebufferId),
    VertexArray(VertexArrayId),
}

impl From<ProgramId> for GpuResource {
    fn from(id: ProgramId) -> Self {
        GpuResource::Program(id)
    }
}

impl From<TextureId> for GpuResource {
    fn from(id: TextureId) -> Self {
        GpuResource::Texture(id)
    }
}

impl From<FramebufferId> for GpuResource {
    fn from(id: FramebufferId) -> Self {
        GpuResource::Framebuffer(id)
    }
}

impl From<VertexArrayId> for GpuResource {
    fn from(id: VertexArrayId) -> Self {
        GpuResource::VertexArray(id)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Geometry,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ShaderError {
    #[error("failed to read {stage:?} shader source {path}: {reason}")]
    Read {
        stage: ShaderStage,
        path: String,
        reason: String,
    },
    #[error("{stage:?} shader failed to compile: {log}")]
    Compile { stage: ShaderStage, log: String },
    #[error("program failed to link: {log}")]
    Link { log: String },
    #[error("{stage:?} shader stage is not supported by this device")]
    UnsupportedStage { stage: ShaderStage },
}

/// Source text for every stage of a program.
#[derive(Clone, Debug, Default)]
pub struct ProgramSource {
    pub label: String,
    pub vertex: String,
    pub fragment: String,
    pub geometry: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UniformValue {
    Bool(bool),
    Int(i32),
    Float(f32),
    Vec3(Vec3),
    Mat4(Mat4),
}

/// Channel layout of pixel data handed to the device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Red,
    Rgb,
    Rgba,
}

impl PixelFormat {
    pub fn channels(self) -> usize {
        match self {
            PixelFormat::Red => 1,
            PixelFormat::Rgb => 3,
            PixelFormat::Rgba => 4,
        }
    }
}

/// Decoded image ready for upload.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Stored as sRGB and linearised when sampled.
    pub srgb: bool,
    pub pixels: Vec<u8>,
}

impl ImageData {
    pub fn solid(colour: [u8; 4], srgb: bool) -> Self {
        Self {
            width: 1,
            height: 1,
            format: PixelFormat::Rgba,
            srgb,
            pixels: colour.to_vec(),
        }
    }

    /// Pixel data expanded to four channels.
    pub fn to_rgba8(&self) -> Vec<u8> {
        match self.format {
            PixelFormat::Rgba => self.pixels.clone(),
            PixelFormat::Rgb => self
                .pixels
                .chunks_exact(3)
                .flat_map(|px| [px[0], px[1], px[2], 255])
                .collect(),
            PixelFormat::Red => self
                .pixels
                .iter()
                .flat_map(|&r| [r, 0, 0, 255])
                .collect(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureKind {
    Texture2d,
    CubeMap,
    Depth,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WrapMode {
    Repeat,
    MirroredRepeat,
    ClampToEdge,
    ClampToBorder,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FilterMode {
    Nearest,
    Linear,
    NearestMipmapNearest,
    LinearMipmapNearest,
    NearestMipmapLinear,
    LinearMipmapLinear,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BorderColour {
    TransparentBlack,
    OpaqueBlack,
    OpaqueWhite,
}

/// Wrap and filter state applied when a texture is bound to a unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SamplerParams {
    pub wrap_s: WrapMode,
    pub wrap_t: WrapMode,
    pub wrap_r: WrapMode,
    pub min_filter: FilterMode,
    pub mag_filter: FilterMode,
    pub border: BorderColour,
}

impl Default for SamplerParams {
    fn default() -> Self {
        Self {
            wrap_s: WrapMode::ClampToEdge,
            wrap_t: WrapMode::ClampToEdge,
            wrap_r: WrapMode::ClampToEdge,
            min_filter: FilterMode::LinearMipmapLinear,
            mag_filter: FilterMode::Nearest,
            border: BorderColour::TransparentBlack,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CullFace {
    None,
    Front,
    Back,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DepthFunc {
    Less,
    LessEqual,
    Always,
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct ClearFlags: u8 {
        const COLOUR = 0b01;
        const DEPTH = 0b10;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Viewport {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn sized(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }
}

/// Interleaved float layouts understood by every backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VertexLayout {
    /// position(3) normal(3) uv(2)
    PositionNormalUv,
    /// position(3)
    Position,
}

impl VertexLayout {
    pub fn floats_per_vertex(self) -> usize {
        match self {
            VertexLayout::PositionNormalUv => 8,
            VertexLayout::Position => 3,
        }
    }

    pub fn stride(self) -> usize {
        self.floats_per_vertex() * std::mem::size_of::<f32>()
    }
}

/// Immediate-mode graphics device.
///
/// State set through this trait (bound program, framebuffer, cull face,
/// depth comparison, viewport, texture units) persists until changed, the way
/// a GL context behaves. Failures are reported through `program_status` and
/// the log; no call aborts.
pub trait GraphicsDevice {
    fn create_program(&mut self, source: &ProgramSource) -> ProgramId;
    fn program_status(&self, program: ProgramId) -> Result<(), ShaderError>;
    fn use_program(&mut self, program: ProgramId);
    fn set_uniform(&mut self, program: ProgramId, name: &str, value: UniformValue);

    fn create_texture(&mut self, image: &ImageData) -> TextureId;
    fn create_cube_map(&mut self, faces: &[Option<ImageData>; 6]) -> TextureId;
    fn create_depth_target(&mut self, width: u32, height: u32) -> (FramebufferId, TextureId);
    fn bind_texture(&mut self, unit: u32, texture: TextureId, kind: TextureKind, params: SamplerParams);

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>);
    fn set_viewport(&mut self, viewport: Viewport);
    fn viewport(&self) -> Viewport;
    fn clear(&mut self, flags: ClearFlags, colour: [f32; 4]);
    fn set_cull_face(&mut self, face: CullFace);
    fn cull_face(&self) -> CullFace;
    fn set_depth_func(&mut self, func: DepthFunc);
    fn depth_func(&self) -> DepthFunc;

    fn create_vertex_array(
        &mut self,
        vertices: &[f32],
        layout: VertexLayout,
        indices: Option<&[u32]>,
    ) -> VertexArrayId;
    /// Attach per-instance model matrices to `vertex_array`, replacing any
    /// set attached before. An empty slice detaches them.
    fn set_instances(&mut self, vertex_array: VertexArrayId, models: &[Mat4]);
    /// Draw `instances` copies of the first `count` elements. Without
    /// attached instances only one copy is drawn, with an identity instance
    /// matrix.
    fn draw_instanced(&mut self, vertex_array: VertexArrayId, count: u32, instances: u32);

    fn draw(&mut self, vertex_array: VertexArrayId, count: u32) {
        self.draw_instanced(vertex_array, count, 1);
    }

    fn release(&mut self, resource: GpuResource);
    /// Submit everything issued since the last call and present it.
    fn finish_frame(&mut self);
    fn resize(&mut self, width: u32, height: u32);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgb_pixels_expand_with_opaque_alpha() {
        let image = ImageData {
            width: 2,
            height: 1,
            format: PixelFormat::Rgb,
            srgb: false,
            pixels: vec![1, 2, 3, 4, 5, 6],
        };
        assert_eq!(image.to_rgba8(), vec![1, 2, 3, 255, 4, 5, 6, 255]);
    }

    #[test]
    fn red_pixels_fill_only_the_first_channel() {
        let image = ImageData {
            width: 1,
            height: 1,
            format: PixelFormat::Red,
            srgb: false,
            pixels: vec![9],
        };
        assert_eq!(image.to_rgba8(), vec![9, 0, 0, 255]);
    }

    #[test]
    fn layout_strides_match_interleaving() {
        assert_eq!(VertexLayout::PositionNormalUv.stride(), 32);
        assert_eq!(VertexLayout::Position.stride(), 12);
    }

    #[test]
    fn default_sampler_is_clamped_trilinear_min_nearest_mag() {
        let params = SamplerParams::default();
        assert_eq!(params.wrap_s, WrapMode::ClampToEdge);
        assert_eq!(params.wrap_t, WrapMode::ClampToEdge);
        assert_eq!(params.min_filter, FilterMode::LinearMipmapLinear);
        assert_eq!(params.mag_filter, FilterMode::Nearest);
    }
}
