// renderer/shader.rs
//
// Compiled program plus name-addressed uniform setters. Construction never
// fails: a program that could not be read or compiled is still returned and
// reports itself through `is_valid`/`error`.

use std::path::Path;

use glam::{Mat4, Vec3};

use crate::gfx::{Gpu, GpuHandle, ProgramId, ProgramSource, ShaderError, ShaderStage, UniformValue};
use crate::io;

/// Programs whose stage sources ship with the crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BuiltinShader {
    /// Blinn-Phong with shadow map, directional, point and spot lights.
    Lighting,
    /// Depth-only pass rendering into a shadow map.
    Depth,
    /// Unlit marker drawn at each point light.
    LightCube,
    Skybox,
}

impl BuiltinShader {
    pub fn source(self) -> ProgramSource {
        let (label, vertex, fragment) = match self {
            BuiltinShader::Lighting => (
                "Lighting",
                include_str!("../../shaders/lighting.vert.wgsl"),
                include_str!("../../shaders/blinn_phong.frag.wgsl"),
            ),
            BuiltinShader::Depth => (
                "Shadow Depth",
                include_str!("../../shaders/depth.vert.wgsl"),
                include_str!("../../shaders/depth.frag.wgsl"),
            ),
            BuiltinShader::LightCube => (
                "Light Cube",
                include_str!("../../shaders/light_cube.vert.wgsl"),
                include_str!("../../shaders/light_cube.frag.wgsl"),
            ),
            BuiltinShader::Skybox => (
                "Skybox",
                include_str!("../../shaders/skybox.vert.wgsl"),
                include_str!("../../shaders/skybox.frag.wgsl"),
            ),
        };
        ProgramSource {
            label: label.to_string(),
            vertex: vertex.to_string(),
            fragment: fragment.to_string(),
            geometry: None,
        }
    }
}

pub struct Shader {
    program: GpuHandle<ProgramId>,
    label: String,
    status: Result<(), ShaderError>,
}

impl Shader {
    pub fn from_source(gpu: &Gpu, source: &ProgramSource) -> Self {
        let program = gpu.with(|device| device.create_program(source));
        let status = gpu.with(|device| device.program_status(program));
        Self::finish(gpu, program, source.label.clone(), status)
    }

    pub fn builtin(gpu: &Gpu, shader: BuiltinShader) -> Self {
        Self::from_source(gpu, &shader.source())
    }

    /// Read every stage from disk and build the program. A stage that cannot
    /// be read is compiled as empty source, so the program exists but is
    /// unusable.
    pub fn from_files(
        gpu: &Gpu,
        vertex_path: impl AsRef<Path>,
        fragment_path: impl AsRef<Path>,
        geometry_path: Option<&Path>,
    ) -> Self {
        let vertex_path = vertex_path.as_ref();
        let fragment_path = fragment_path.as_ref();
        let mut read_error = None;

        let mut read_stage = |stage: ShaderStage, path: &Path| match io::load_text(path) {
            Ok(text) => text,
            Err(reason) => {
                read_error.get_or_insert(ShaderError::Read {
                    stage,
                    path: path.display().to_string(),
                    reason,
                });
                String::new()
            }
        };

        let source = ProgramSource {
            label: stage_label(vertex_path, fragment_path),
            vertex: read_stage(ShaderStage::Vertex, vertex_path),
            fragment: read_stage(ShaderStage::Fragment, fragment_path),
            geometry: geometry_path.map(|path| read_stage(ShaderStage::Geometry, path)),
        };

        let program = gpu.with(|device| device.create_program(&source));
        let status = match read_error {
            Some(err) => Err(err),
            None => gpu.with(|device| device.program_status(program)),
        };
        Self::finish(gpu, program, source.label, status)
    }

    fn finish(gpu: &Gpu, program: ProgramId, label: String, status: Result<(), ShaderError>) -> Self {
        match &status {
            Ok(()) => log::debug!("Built program '{}' ({:?})", label, program),
            Err(err) => log::error!("Shader program '{}': {}", label, err),
        }
        Self {
            program: GpuHandle::new(gpu, program),
            label,
            status,
        }
    }

    pub fn id(&self) -> ProgramId {
        self.program.id()
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_valid(&self) -> bool {
        self.status.is_ok()
    }

    pub fn error(&self) -> Option<&ShaderError> {
        self.status.as_ref().err()
    }

    pub fn gpu(&self) -> &Gpu {
        self.program.gpu()
    }

    pub fn use_program(&self) {
        let id = self.id();
        self.gpu().with(|device| device.use_program(id));
    }

    fn set(&self, name: &str, value: UniformValue) {
        let id = self.id();
        self.gpu().with(|device| device.set_uniform(id, name, value));
    }

    pub fn set_bool(&self, name: &str, value: bool) {
        self.set(name, UniformValue::Bool(value));
    }

    pub fn set_int(&self, name: &str, value: i32) {
        self.set(name, UniformValue::Int(value));
    }

    pub fn set_float(&self, name: &str, value: f32) {
        self.set(name, UniformValue::Float(value));
    }

    pub fn set_vec3(&self, name: &str, value: impl Into<Vec3>) {
        self.set(name, UniformValue::Vec3(value.into()));
    }

    pub fn set_mat4(&self, name: &str, value: Mat4) {
        self.set(name, UniformValue::Mat4(value));
    }
}

impl std::fmt::Debug for Shader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shader")
            .field("label", &self.label)
            .field("program", &self.program.id())
            .field("valid", &self.is_valid())
            .finish()
    }
}

fn stage_label(vertex: &Path, fragment: &Path) -> String {
    let stem = |path: &Path| {
        path.file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    };
    format!("{} + {}", stem(vertex), stem(fragment))
}
