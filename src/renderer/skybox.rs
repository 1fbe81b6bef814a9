// renderer/skybox.rs

use std::path::Path;

use glam::{Mat3, Mat4};

use crate::gfx::{
    BorderColour, DepthFunc, FilterMode, Gpu, GpuHandle, ImageData, PixelFormat, SamplerParams,
    TextureId, TextureKind, VertexArrayId, VertexLayout, WrapMode,
};
use crate::io;

use super::primitives::{self, CUBE_VERTEX_COUNT};
use super::shader::{BuiltinShader, Shader};

const CUBE_MAP_PARAMS: SamplerParams = SamplerParams {
    wrap_s: WrapMode::ClampToEdge,
    wrap_t: WrapMode::ClampToEdge,
    wrap_r: WrapMode::ClampToEdge,
    min_filter: FilterMode::Linear,
    mag_filter: FilterMode::Linear,
    border: BorderColour::TransparentBlack,
};

/// Decode one cube face as sRGB colour data.
fn load_face(path: &Path) -> Option<ImageData> {
    let decoded = io::load_binary(path)
        .and_then(|bytes| image::load_from_memory(&bytes).map_err(|err| err.to_string()));
    match decoded {
        Ok(image) => {
            let rgb = image.to_rgb8();
            Some(ImageData {
                width: rgb.width(),
                height: rgb.height(),
                format: PixelFormat::Rgb,
                srgb: true,
                pixels: rgb.into_raw(),
            })
        }
        Err(err) => {
            log::error!("Cubemap face failed to load at path {:?}: {}", path, err);
            None
        }
    }
}

/// Cube-mapped background drawn behind everything else.
pub struct Skybox {
    shader: Shader,
    cube_map: GpuHandle<TextureId>,
    vertex_array: GpuHandle<VertexArrayId>,
    unit: u32,
}

impl Skybox {
    /// Faces in +X, -X, +Y, -Y, +Z, -Z order. Faces that fail to load are
    /// logged and left blank.
    pub fn new<P: AsRef<Path>>(gpu: &Gpu, faces: [P; 6]) -> Self {
        let faces = faces.map(|path| load_face(path.as_ref()));
        Self::from_faces(gpu, &faces)
    }

    pub fn from_faces(gpu: &Gpu, faces: &[Option<ImageData>; 6]) -> Self {
        let (cube_map, vertex_array) = gpu.with(|device| {
            (
                device.create_cube_map(faces),
                device.create_vertex_array(
                    &primitives::skybox_vertices(),
                    VertexLayout::Position,
                    None,
                ),
            )
        });
        Self {
            shader: Shader::builtin(gpu, BuiltinShader::Skybox),
            cube_map: GpuHandle::new(gpu, cube_map),
            vertex_array: GpuHandle::new(gpu, vertex_array),
            unit: 0,
        }
    }

    pub fn unit(&self) -> u32 {
        self.unit
    }

    pub fn set_unit(&mut self, unit: u32) {
        self.unit = unit;
    }

    pub fn texture_id(&self) -> TextureId {
        self.cube_map.id()
    }

    /// Draw at maximum depth with the translation stripped from `view`.
    pub fn draw(&self, projection: Mat4, view: Mat4) {
        let gpu = self.cube_map.gpu();
        let (previous_depth, previous_cull) = gpu.with(|device| {
            let saved = (device.depth_func(), device.cull_face());
            device.set_depth_func(DepthFunc::LessEqual);
            device.set_cull_face(crate::gfx::CullFace::None);
            saved
        });

        self.shader.use_program();
        self.shader
            .set_mat4("view", Mat4::from_mat3(Mat3::from_mat4(view)));
        self.shader.set_mat4("projection", projection);
        self.shader.set_int("skybox", self.unit as i32);

        let (unit, texture, vertex_array) =
            (self.unit, self.cube_map.id(), self.vertex_array.id());
        gpu.with(|device| {
            device.bind_texture(unit, texture, TextureKind::CubeMap, CUBE_MAP_PARAMS);
            device.draw(vertex_array, CUBE_VERTEX_COUNT);
            device.set_cull_face(previous_cull);
            device.set_depth_func(previous_depth);
        });
    }
}

impl std::fmt::Debug for Skybox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Skybox")
            .field("cube_map", &self.cube_map.id())
            .field("unit", &self.unit)
            .finish()
    }
}
