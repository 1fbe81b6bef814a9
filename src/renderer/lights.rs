// renderer/lights.rs
//
// Directional, point and spot lights. Each pushes its parameters into a
// shader under the `dirLight.*`, `pointLights[i].*` or `spotLight.*` names.

use std::rc::Rc;

use glam::{Mat4, Vec3};

use crate::gfx::{ClearFlags, CullFace, Gpu, GpuHandle, VertexArrayId, VertexLayout};

use super::depth::DepthTarget;
use super::primitives::{self, CUBE_VERTEX_COUNT};
use super::shader::{BuiltinShader, Shader};

pub const AMBIENT_INTENSITY: f32 = 0.08;
pub const DIFFUSE_INTENSITY: f32 = 0.6;
pub const SPECULAR_INTENSITY: f32 = 0.8;

pub const SHADOW_NEAR: f32 = 1.0;
pub const SHADOW_FAR: f32 = 15.0;
pub const SHADOW_EXTENT: f32 = 10.0;

const MARKER_SCALE: f32 = 0.25;

/// Constant, linear and quadratic distance falloff terms.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Attenuation {
    pub constant: f32,
    pub linear: f32,
    pub quadratic: f32,
}

impl Attenuation {
    pub const DEFAULT: Self = Self {
        constant: 1.0,
        linear: 0.09,
        quadratic: 0.032,
    };

    /// Steeper falloff that reads correctly once lighting is done in linear
    /// space.
    pub const GAMMA: Self = Self {
        constant: 1.0,
        linear: 0.14,
        quadratic: 0.07,
    };

    pub fn for_gamma(gamma_correction: bool) -> Self {
        if gamma_correction {
            Self::GAMMA
        } else {
            Self::DEFAULT
        }
    }
}

impl Default for Attenuation {
    fn default() -> Self {
        Self::DEFAULT
    }
}

fn push_colour(shader: &Shader, prefix: &str, colour: Vec3) {
    shader.set_vec3(&format!("{prefix}.ambient"), colour * AMBIENT_INTENSITY);
    shader.set_vec3(&format!("{prefix}.diffuse"), colour * DIFFUSE_INTENSITY);
    shader.set_vec3(&format!("{prefix}.specular"), colour * SPECULAR_INTENSITY);
}

fn push_attenuation(shader: &Shader, prefix: &str, attenuation: Attenuation) {
    shader.set_float(&format!("{prefix}.constant"), attenuation.constant);
    shader.set_float(&format!("{prefix}.linear"), attenuation.linear);
    shader.set_float(&format!("{prefix}.quadratic"), attenuation.quadratic);
}

/// Depth shader and render target used to build a directional shadow map.
/// The target is shared with every mesh that samples the map.
#[derive(Debug)]
pub struct ShadowPass {
    shader: Shader,
    target: Rc<DepthTarget>,
}

impl ShadowPass {
    pub fn new(shader: Shader, target: DepthTarget) -> Self {
        Self {
            shader,
            target: Rc::new(target),
        }
    }

    /// Builtin depth shader rendering into a square map of `size` texels.
    pub fn with_size(gpu: &Gpu, size: u32) -> Self {
        Self::new(
            Shader::builtin(gpu, BuiltinShader::Depth),
            DepthTarget::new(gpu, size, size),
        )
    }

    pub fn shader(&self) -> &Shader {
        &self.shader
    }

    pub fn target(&self) -> &Rc<DepthTarget> {
        &self.target
    }
}

#[derive(Debug)]
pub struct DirLight {
    position: Vec3,
    direction: Vec3,
    colour: Vec3,
    shadow: Option<ShadowPass>,
}

impl Default for DirLight {
    fn default() -> Self {
        Self::new(Vec3::Y, Vec3::ONE)
    }
}

impl DirLight {
    /// Light shining from `position` towards the origin.
    pub fn new(position: Vec3, colour: Vec3) -> Self {
        Self {
            position,
            direction: -position.normalize_or_zero(),
            colour,
            shadow: None,
        }
    }

    pub fn with_shadow_pass(mut self, pass: ShadowPass) -> Self {
        self.shadow = Some(pass);
        self
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn direction(&self) -> Vec3 {
        self.direction
    }

    pub fn colour(&self) -> Vec3 {
        self.colour
    }

    pub fn set_colour(&mut self, colour: Vec3) {
        self.colour = colour;
    }

    pub fn compute_light(&self, shader: &Shader) {
        shader.set_vec3("dirLight.direction", self.direction);
        push_colour(shader, "dirLight", self.colour);
    }

    /// Lights owned by a scene are switched through
    /// [`crate::scene::Scene::enable_shadow_map`] so meshes follow along.
    pub(crate) fn enable_shadow_map(&mut self, pass: ShadowPass) {
        self.shadow = Some(pass);
    }

    pub(crate) fn disable_shadow_map(&mut self) -> Option<ShadowPass> {
        self.shadow.take()
    }

    pub fn is_shadow_map_enabled(&self) -> bool {
        self.shadow.is_some()
    }

    pub fn shadow_pass(&self) -> Option<&ShadowPass> {
        self.shadow.as_ref()
    }

    /// Orthographic projection covering [-10, 10]^2 between near 1 and far
    /// 15, looking from the light position at the origin.
    pub fn light_space_matrix(&self) -> Mat4 {
        let projection = Mat4::orthographic_rh(
            -SHADOW_EXTENT,
            SHADOW_EXTENT,
            -SHADOW_EXTENT,
            SHADOW_EXTENT,
            SHADOW_NEAR,
            SHADOW_FAR,
        );
        projection * Mat4::look_at_rh(self.position, Vec3::ZERO, Vec3::Y)
    }

    /// Compute the light-space matrix and upload it to the depth shader.
    /// Without a shadow pass this logs and returns identity.
    pub fn generate_light_space_matrix(&self) -> Mat4 {
        let Some(pass) = &self.shadow else {
            log::error!("Light space matrix requested from a directional light without a shadow pass");
            return Mat4::IDENTITY;
        };
        let matrix = self.light_space_matrix();
        pass.shader.use_program();
        pass.shader.set_mat4("lightSpaceMatrix", matrix);
        matrix
    }

    pub fn bind_depth_map(&self) {
        let Some(pass) = &self.shadow else {
            log::error!("bind_depth_map called on a directional light without a shadow pass");
            return;
        };
        pass.target.bind();
        pass.target.gpu().with(|device| {
            device.clear(ClearFlags::DEPTH, [0.0; 4]);
            device.set_cull_face(CullFace::Front);
        });
    }

    pub fn unbind_depth_map(&self) {
        let Some(pass) = &self.shadow else {
            log::error!("unbind_depth_map called on a directional light without a shadow pass");
            return;
        };
        pass.target
            .gpu()
            .with(|device| device.set_cull_face(CullFace::Back));
        pass.target.release();
    }
}

/// Omnidirectional light with a small unlit cube drawn at its position.
pub struct PointLight {
    position: Vec3,
    colour: Vec3,
    attenuation: Attenuation,
    marker_shader: Shader,
    marker: GpuHandle<VertexArrayId>,
}

impl PointLight {
    pub fn new(gpu: &Gpu, position: Vec3, colour: Vec3, gamma_correction: bool) -> Self {
        let marker = gpu.with(|device| {
            device.create_vertex_array(
                &primitives::light_cube_vertices(),
                VertexLayout::Position,
                None,
            )
        });
        Self {
            position,
            colour,
            attenuation: Attenuation::for_gamma(gamma_correction),
            marker_shader: Shader::builtin(gpu, BuiltinShader::LightCube),
            marker: GpuHandle::new(gpu, marker),
        }
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn colour(&self) -> Vec3 {
        self.colour
    }

    pub fn set_colour(&mut self, colour: Vec3) {
        self.colour = colour;
    }

    pub fn attenuation(&self) -> Attenuation {
        self.attenuation
    }

    pub fn set_attenuation(&mut self, attenuation: Attenuation) {
        self.attenuation = attenuation;
    }

    pub fn move_to(&mut self, position: Vec3) {
        self.position = position;
    }

    pub fn compute_light(&self, shader: &Shader, index: usize) {
        let prefix = format!("pointLights[{index}]");
        shader.set_vec3(&format!("{prefix}.position"), self.position);
        push_colour(shader, &prefix, self.colour);
        push_attenuation(shader, &prefix, self.attenuation);
    }

    pub fn marker_model(&self) -> Mat4 {
        Mat4::from_translation(self.position) * Mat4::from_scale(Vec3::splat(MARKER_SCALE))
    }

    pub fn draw_light_cube(&self, projection: Mat4, view: Mat4) {
        let shader = &self.marker_shader;
        shader.use_program();
        shader.set_mat4("projection", projection);
        shader.set_mat4("view", view);
        shader.set_mat4("model", self.marker_model());
        shader.set_vec3("lightColour", self.colour);

        let id = self.marker.id();
        self.marker
            .gpu()
            .with(|device| device.draw(id, CUBE_VERTEX_COUNT));
    }
}

impl std::fmt::Debug for PointLight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PointLight")
            .field("position", &self.position)
            .field("colour", &self.colour)
            .field("attenuation", &self.attenuation)
            .finish()
    }
}

/// Cone light, typically attached to the camera as a flashlight.
#[derive(Clone, Debug, PartialEq)]
pub struct SpotLight {
    position: Vec3,
    direction: Vec3,
    colour: Vec3,
    attenuation: Attenuation,
    cutoff: f32,
    outer_cutoff: f32,
    enabled: bool,
}

impl SpotLight {
    pub const INNER_ANGLE: f32 = 12.5;
    pub const OUTER_ANGLE: f32 = 17.5;

    pub fn new(position: Vec3, direction: Vec3, colour: Vec3) -> Self {
        Self {
            position,
            direction: direction.normalize_or_zero(),
            colour,
            attenuation: Attenuation::DEFAULT,
            cutoff: Self::INNER_ANGLE.to_radians().cos(),
            outer_cutoff: Self::OUTER_ANGLE.to_radians().cos(),
            enabled: true,
        }
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn direction(&self) -> Vec3 {
        self.direction
    }

    /// Cosines of the inner and outer cone angles.
    pub fn cutoffs(&self) -> (f32, f32) {
        (self.cutoff, self.outer_cutoff)
    }

    pub fn set_cutoff_angles(&mut self, inner_degrees: f32, outer_degrees: f32) {
        self.cutoff = inner_degrees.to_radians().cos();
        self.outer_cutoff = outer_degrees.to_radians().cos();
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn toggle(&mut self) {
        self.enabled = !self.enabled;
    }

    /// Place the cone at `position` pointing along `direction`.
    pub fn follow(&mut self, position: Vec3, direction: Vec3) {
        self.position = position;
        self.direction = direction.normalize_or_zero();
    }

    pub fn compute_light(&self, shader: &Shader) {
        let colour = if self.enabled { self.colour } else { Vec3::ZERO };
        shader.set_vec3("spotLight.position", self.position);
        shader.set_vec3("spotLight.direction", self.direction);
        push_colour(shader, "spotLight", colour);
        shader.set_float("spotLight.cutOff", self.cutoff);
        shader.set_float("spotLight.outerCutOff", self.outer_cutoff);
        push_attenuation(shader, "spotLight", self.attenuation);
    }
}

#[derive(Debug)]
pub enum Light {
    Directional(DirLight),
    Point(PointLight),
    Spot(SpotLight),
}

impl Light {
    /// Push this light's uniforms. `index` selects the point-light array
    /// slot and is ignored by the other kinds.
    pub fn compute_light(&self, shader: &Shader, index: usize) {
        match self {
            Light::Directional(light) => light.compute_light(shader),
            Light::Point(light) => light.compute_light(shader, index),
            Light::Spot(light) => light.compute_light(shader),
        }
    }
}

impl From<DirLight> for Light {
    fn from(light: DirLight) -> Self {
        Light::Directional(light)
    }
}

impl From<PointLight> for Light {
    fn from(light: PointLight) -> Self {
        Light::Point(light)
    }
}

impl From<SpotLight> for Light {
    fn from(light: SpotLight) -> Self {
        Light::Spot(light)
    }
}
