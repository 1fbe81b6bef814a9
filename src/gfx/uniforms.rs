// gfx/uniforms.rs
//
// Named-uniform emulation for devices without a uniform-location API. Names
// are parsed into slots of one fixed block whose layout matches the WGSL
// prelude (`shaders/prelude.wgsl`).

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

use super::UniformValue;

/// Size of the `pointLights` array declared by the shader prelude.
pub const MAX_POINT_LIGHTS: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LightField {
    Position,
    Direction,
    Ambient,
    Diffuse,
    Specular,
    Constant,
    Linear,
    Quadratic,
    CutOff,
    OuterCutOff,
}

impl LightField {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "position" => LightField::Position,
            "direction" => LightField::Direction,
            "ambient" => LightField::Ambient,
            "diffuse" => LightField::Diffuse,
            "specular" => LightField::Specular,
            "constant" => LightField::Constant,
            "linear" => LightField::Linear,
            "quadratic" => LightField::Quadratic,
            "cutoff" | "cutOff" => LightField::CutOff,
            "outerCutOff" | "outerCutoff" => LightField::OuterCutOff,
            _ => return None,
        })
    }
}

/// Texture bindings a program can sample, addressed by their uniform name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SamplerSlot {
    MaterialDiffuse,
    MaterialSpecular,
    ShadowMap,
    Skybox,
}

impl SamplerSlot {
    pub const ALL: [SamplerSlot; 4] = [
        SamplerSlot::MaterialDiffuse,
        SamplerSlot::MaterialSpecular,
        SamplerSlot::ShadowMap,
        SamplerSlot::Skybox,
    ];
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UniformSlot {
    Model,
    View,
    Projection,
    LightSpaceMatrix,
    ViewPos,
    NumPointLights,
    LightColour,
    Blinn,
    Shininess,
    Sampler(SamplerSlot),
    DirLight(LightField),
    PointLight(usize, LightField),
    SpotLight(LightField),
}

impl UniformSlot {
    /// Map a uniform name onto its slot. Unknown names yield `None`.
    pub fn parse(name: &str) -> Option<Self> {
        let slot = match name {
            "model" => UniformSlot::Model,
            "view" => UniformSlot::View,
            "projection" => UniformSlot::Projection,
            "lightSpaceMatrix" => UniformSlot::LightSpaceMatrix,
            "viewPos" => UniformSlot::ViewPos,
            "numPointLights" => UniformSlot::NumPointLights,
            "lightColour" => UniformSlot::LightColour,
            "blinn" => UniformSlot::Blinn,
            "material.shininess" => UniformSlot::Shininess,
            "material.diffuse" => UniformSlot::Sampler(SamplerSlot::MaterialDiffuse),
            "material.specular" => UniformSlot::Sampler(SamplerSlot::MaterialSpecular),
            "shadowMap" => UniformSlot::Sampler(SamplerSlot::ShadowMap),
            "skybox" => UniformSlot::Sampler(SamplerSlot::Skybox),
            _ => return Self::parse_light(name),
        };
        Some(slot)
    }

    fn parse_light(name: &str) -> Option<Self> {
        let (block, field) = name.split_once('.')?;
        let field = LightField::parse(field)?;
        match block {
            "dirLight" => Some(UniformSlot::DirLight(field)),
            "spotLight" => Some(UniformSlot::SpotLight(field)),
            _ => {
                let index = block.strip_prefix("pointLights[")?.strip_suffix(']')?;
                let index = index.parse().ok()?;
                Some(UniformSlot::PointLight(index, field))
            }
        }
    }
}

/// Outcome of writing a value into a [`UniformBlock`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    /// Value type does not match the slot.
    TypeMismatch,
    /// Slot addresses an array element past the declared size.
    OutOfRange,
    /// Sampler slots are bindings, not block members.
    Sampler,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct MaterialBlock {
    pub shininess: f32,
    pub has_diffuse: i32,
    pub has_specular: i32,
    pub has_shadow_map: i32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct DirLightBlock {
    pub direction: [f32; 3],
    pub _pad0: f32,
    pub ambient: [f32; 3],
    pub _pad1: f32,
    pub diffuse: [f32; 3],
    pub _pad2: f32,
    pub specular: [f32; 3],
    pub _pad3: f32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct PointLightBlock {
    pub position: [f32; 3],
    pub constant: f32,
    pub ambient: [f32; 3],
    pub linear: f32,
    pub diffuse: [f32; 3],
    pub quadratic: f32,
    pub specular: [f32; 3],
    pub _pad: f32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct SpotLightBlock {
    pub position: [f32; 3],
    pub cutoff: f32,
    pub direction: [f32; 3],
    pub outer_cutoff: f32,
    pub ambient: [f32; 3],
    pub constant: f32,
    pub diffuse: [f32; 3],
    pub linear: f32,
    pub specular: [f32; 3],
    pub quadratic: f32,
}

/// CPU mirror of the `Globals` struct in the shader prelude.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct UniformBlock {
    pub model: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    pub projection: [[f32; 4]; 4],
    pub light_space_matrix: [[f32; 4]; 4],
    pub view_pos: [f32; 3],
    pub num_point_lights: i32,
    pub light_colour: [f32; 3],
    pub blinn: i32,
    pub material: MaterialBlock,
    pub dir_light: DirLightBlock,
    pub spot_light: SpotLightBlock,
    pub point_lights: [PointLightBlock; MAX_POINT_LIGHTS],
}

impl Default for UniformBlock {
    fn default() -> Self {
        let identity = Mat4::IDENTITY.to_cols_array_2d();
        Self {
            model: identity,
            view: identity,
            projection: identity,
            light_space_matrix: identity,
            ..Zeroable::zeroed()
        }
    }
}

fn light_vec3(field: LightField) -> bool {
    matches!(
        field,
        LightField::Position
            | LightField::Direction
            | LightField::Ambient
            | LightField::Diffuse
            | LightField::Specular
    )
}

impl UniformBlock {
    pub const SIZE: u64 = std::mem::size_of::<UniformBlock>() as u64;

    pub fn write(&mut self, slot: UniformSlot, value: UniformValue) -> WriteOutcome {
        use UniformValue as V;

        match (slot, value) {
            (UniformSlot::Sampler(_), _) => WriteOutcome::Sampler,
            (UniformSlot::Model, V::Mat4(m)) => {
                self.model = m.to_cols_array_2d();
                WriteOutcome::Written
            }
            (UniformSlot::View, V::Mat4(m)) => {
                self.view = m.to_cols_array_2d();
                WriteOutcome::Written
            }
            (UniformSlot::Projection, V::Mat4(m)) => {
                self.projection = m.to_cols_array_2d();
                WriteOutcome::Written
            }
            (UniformSlot::LightSpaceMatrix, V::Mat4(m)) => {
                self.light_space_matrix = m.to_cols_array_2d();
                WriteOutcome::Written
            }
            (UniformSlot::ViewPos, V::Vec3(v)) => {
                self.view_pos = v.to_array();
                WriteOutcome::Written
            }
            (UniformSlot::NumPointLights, V::Int(n)) => {
                self.num_point_lights = n;
                WriteOutcome::Written
            }
            (UniformSlot::LightColour, V::Vec3(v)) => {
                self.light_colour = v.to_array();
                WriteOutcome::Written
            }
            (UniformSlot::Blinn, V::Bool(b)) => {
                self.blinn = b as i32;
                WriteOutcome::Written
            }
            (UniformSlot::Blinn, V::Int(i)) => {
                self.blinn = i;
                WriteOutcome::Written
            }
            (UniformSlot::Shininess, V::Float(f)) => {
                self.material.shininess = f;
                WriteOutcome::Written
            }
            (UniformSlot::DirLight(field), value) => write_dir_light(&mut self.dir_light, field, value),
            (UniformSlot::SpotLight(field), value) => write_spot_light(&mut self.spot_light, field, value),
            (UniformSlot::PointLight(index, field), value) => match self.point_lights.get_mut(index) {
                Some(light) => write_point_light(light, field, value),
                None => WriteOutcome::OutOfRange,
            },
            _ => WriteOutcome::TypeMismatch,
        }
    }
}

fn write_dir_light(light: &mut DirLightBlock, field: LightField, value: UniformValue) -> WriteOutcome {
    let UniformValue::Vec3(v) = value else {
        return WriteOutcome::TypeMismatch;
    };
    let target = match field {
        LightField::Direction => &mut light.direction,
        LightField::Ambient => &mut light.ambient,
        LightField::Diffuse => &mut light.diffuse,
        LightField::Specular => &mut light.specular,
        _ => return WriteOutcome::TypeMismatch,
    };
    *target = v.to_array();
    WriteOutcome::Written
}

fn write_point_light(light: &mut PointLightBlock, field: LightField, value: UniformValue) -> WriteOutcome {
    match (value, light_vec3(field)) {
        (UniformValue::Vec3(v), true) => {
            let target = match field {
                LightField::Position => &mut light.position,
                LightField::Ambient => &mut light.ambient,
                LightField::Diffuse => &mut light.diffuse,
                LightField::Specular => &mut light.specular,
                _ => return WriteOutcome::TypeMismatch,
            };
            *target = v.to_array();
            WriteOutcome::Written
        }
        (UniformValue::Float(f), false) => {
            let target = match field {
                LightField::Constant => &mut light.constant,
                LightField::Linear => &mut light.linear,
                LightField::Quadratic => &mut light.quadratic,
                _ => return WriteOutcome::TypeMismatch,
            };
            *target = f;
            WriteOutcome::Written
        }
        _ => WriteOutcome::TypeMismatch,
    }
}

fn write_spot_light(light: &mut SpotLightBlock, field: LightField, value: UniformValue) -> WriteOutcome {
    match (value, light_vec3(field)) {
        (UniformValue::Vec3(v), true) => {
            let target = match field {
                LightField::Position => &mut light.position,
                LightField::Direction => &mut light.direction,
                LightField::Ambient => &mut light.ambient,
                LightField::Diffuse => &mut light.diffuse,
                LightField::Specular => &mut light.specular,
                _ => return WriteOutcome::TypeMismatch,
            };
            *target = v.to_array();
            WriteOutcome::Written
        }
        (UniformValue::Float(f), false) => {
            let target = match field {
                LightField::Constant => &mut light.constant,
                LightField::Linear => &mut light.linear,
                LightField::Quadratic => &mut light.quadratic,
                LightField::CutOff => &mut light.cutoff,
                LightField::OuterCutOff => &mut light.outer_cutoff,
                _ => return WriteOutcome::TypeMismatch,
            };
            *target = f;
            WriteOutcome::Written
        }
        _ => WriteOutcome::TypeMismatch,
    }
}

impl From<Vec3> for UniformValue {
    fn from(v: Vec3) -> Self {
        UniformValue::Vec3(v)
    }
}

impl From<Mat4> for UniformValue {
    fn from(m: Mat4) -> Self {
        UniformValue::Mat4(m)
    }
}
