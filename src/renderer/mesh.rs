// renderer/mesh.rs

use std::rc::Rc;

use glam::{Mat4, Vec3};

use crate::gfx::{Gpu, GpuHandle, VertexArrayId, VertexLayout, NO_TEXTURE_UNIT};
use crate::scene::Transform;

use super::depth::DepthTarget;
use super::primitives::{self, QuadGeometry, CUBE_VERTEX_COUNT, QUAD_VERTEX_COUNT};
use super::shader::Shader;
use super::texture::Texture;
use super::units::TextureUnits;

pub const DEFAULT_SHININESS: f32 = 32.0;

/// Geometry source of a mesh.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MeshKind {
    Cube,
    Quad(QuadGeometry),
    /// Vertices supplied by a model loader, optionally indexed.
    Model,
}

#[derive(Debug)]
struct MaterialSlot {
    texture: Rc<Texture>,
    unit: u32,
}

#[derive(Debug)]
struct ShadowSlot {
    target: Rc<DepthTarget>,
    unit: u32,
}

/// Drawable geometry with its own model matrix and up to three texture
/// slots. Texture units are taken from the caller's allocator when a slot
/// is filled.
pub struct Mesh {
    kind: MeshKind,
    vertex_array: GpuHandle<VertexArrayId>,
    element_count: u32,
    model: Mat4,
    shininess: f32,
    diffuse: Option<MaterialSlot>,
    specular: Option<MaterialSlot>,
    shadow_map: Option<ShadowSlot>,
    instance_count: u32,
}

impl Mesh {
    fn new(gpu: &Gpu, kind: MeshKind, vertices: &[f32], indices: Option<&[u32]>, count: u32) -> Self {
        let id = gpu.with(|device| {
            device.create_vertex_array(vertices, VertexLayout::PositionNormalUv, indices)
        });
        Self {
            kind,
            vertex_array: GpuHandle::new(gpu, id),
            element_count: count,
            model: Mat4::IDENTITY,
            shininess: DEFAULT_SHININESS,
            diffuse: None,
            specular: None,
            shadow_map: None,
            instance_count: 0,
        }
    }

    pub fn cube(gpu: &Gpu) -> Self {
        Self::new(
            gpu,
            MeshKind::Cube,
            &primitives::cube_vertices(),
            None,
            CUBE_VERTEX_COUNT,
        )
    }

    pub fn cube_with_model(gpu: &Gpu, model: Mat4) -> Self {
        let mut cube = Self::cube(gpu);
        cube.model = model;
        cube
    }

    pub fn quad(gpu: &Gpu, geometry: QuadGeometry) -> Self {
        Self::new(
            gpu,
            MeshKind::Quad(geometry),
            &geometry.vertices(),
            None,
            QUAD_VERTEX_COUNT,
        )
    }

    /// Interleaved position/normal/uv vertices, drawn through `indices` when
    /// given.
    pub fn from_vertices(gpu: &Gpu, vertices: &[f32], indices: Option<&[u32]>) -> Self {
        let count = match indices {
            Some(indices) => indices.len(),
            None => vertices.len() / VertexLayout::PositionNormalUv.floats_per_vertex(),
        } as u32;
        Self::new(gpu, MeshKind::Model, vertices, indices, count)
    }

    pub fn kind(&self) -> &MeshKind {
        &self.kind
    }

    pub fn vertex_array(&self) -> VertexArrayId {
        self.vertex_array.id()
    }

    pub fn element_count(&self) -> u32 {
        self.element_count
    }

    pub fn model(&self) -> Mat4 {
        self.model
    }

    pub fn set_model(&mut self, model: Mat4) {
        self.model = model;
    }

    /// Replace the model matrix wholesale.
    pub fn set_transform(&mut self, transform: &Transform) {
        self.model = transform.matrix();
    }

    pub fn shininess(&self) -> f32 {
        self.shininess
    }

    pub fn set_shininess(&mut self, shininess: f32) {
        self.shininess = shininess;
    }

    pub fn reset(&mut self) {
        self.model = Mat4::IDENTITY;
    }

    pub fn move_by(&mut self, offset: Vec3) {
        self.model *= Mat4::from_translation(offset);
    }

    pub fn scale(&mut self, factors: Vec3) {
        self.model *= Mat4::from_scale(factors);
    }

    pub fn rotate_x(&mut self, radians: f32) {
        self.model *= Mat4::from_rotation_x(radians);
    }

    pub fn rotate_y(&mut self, radians: f32) {
        self.model *= Mat4::from_rotation_y(radians);
    }

    pub fn rotate_z(&mut self, radians: f32) {
        self.model *= Mat4::from_rotation_z(radians);
    }

    pub fn set_diffuse_map(&mut self, texture: Rc<Texture>, units: &mut TextureUnits) {
        self.diffuse = Some(MaterialSlot {
            texture,
            unit: units.allocate(),
        });
    }

    pub fn set_specular_map(&mut self, texture: Rc<Texture>, units: &mut TextureUnits) {
        self.specular = Some(MaterialSlot {
            texture,
            unit: units.allocate(),
        });
    }

    /// Sample `target` as the shadow map. A mesh that already has a shadow
    /// slot keeps its unit.
    pub fn set_shadow_map(&mut self, target: Rc<DepthTarget>, units: &mut TextureUnits) {
        let unit = match &self.shadow_map {
            Some(slot) => slot.unit,
            None => units.allocate(),
        };
        self.shadow_map = Some(ShadowSlot { target, unit });
    }

    pub fn clear_shadow_map(&mut self) {
        self.shadow_map = None;
    }

    /// Draw one copy per matrix, each placed by its matrix and then by the
    /// mesh's own model matrix. An empty slice returns to a single copy.
    pub fn set_instances(&mut self, models: &[Mat4]) {
        let id = self.vertex_array.id();
        self.vertex_array
            .gpu()
            .with(|device| device.set_instances(id, models));
        self.instance_count = models.len() as u32;
    }

    /// Copies drawn per call; 0 when no instances are attached.
    pub fn instance_count(&self) -> u32 {
        self.instance_count
    }

    pub fn diffuse_unit(&self) -> Option<u32> {
        self.diffuse.as_ref().map(|slot| slot.unit)
    }

    pub fn specular_unit(&self) -> Option<u32> {
        self.specular.as_ref().map(|slot| slot.unit)
    }

    pub fn shadow_map_unit(&self) -> Option<u32> {
        self.shadow_map.as_ref().map(|slot| slot.unit)
    }

    pub fn draw(&self, projection: Mat4, view: Mat4, shader: &Shader) {
        shader.use_program();
        shader.set_float("material.shininess", self.shininess);

        match &self.diffuse {
            Some(slot) => {
                shader.set_int("material.diffuse", slot.unit as i32);
                slot.texture.bind(slot.unit);
            }
            None => shader.set_int("material.diffuse", NO_TEXTURE_UNIT),
        }
        match &self.specular {
            Some(slot) => {
                shader.set_int("material.specular", slot.unit as i32);
                slot.texture.bind(slot.unit);
            }
            None => shader.set_int("material.specular", NO_TEXTURE_UNIT),
        }
        match &self.shadow_map {
            Some(slot) => {
                shader.set_int("shadowMap", slot.unit as i32);
                slot.target.bind_texture(slot.unit);
            }
            None => shader.set_int("shadowMap", NO_TEXTURE_UNIT),
        }

        shader.set_mat4("projection", projection);
        shader.set_mat4("view", view);
        shader.set_mat4("model", self.model);

        let (id, count) = (self.vertex_array.id(), self.element_count);
        let instances = self.instance_count.max(1);
        self.vertex_array
            .gpu()
            .with(|device| device.draw_instanced(id, count, instances));
    }
}

impl std::fmt::Debug for Mesh {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mesh")
            .field("kind", &self.kind)
            .field("vertex_array", &self.vertex_array.id())
            .field("element_count", &self.element_count)
            .field("diffuse_unit", &self.diffuse_unit())
            .field("specular_unit", &self.specular_unit())
            .field("shadow_map_unit", &self.shadow_map_unit())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::{RecordingDevice, UniformValue};
    use crate::renderer::shader::BuiltinShader;
    use glam::Quat;

    fn gpu() -> (Gpu, crate::gfx::RecordingLog) {
        let (device, log) = RecordingDevice::new();
        (Gpu::new(device), log)
    }

    #[test]
    fn mutators_right_multiply_in_call_order() {
        let (gpu, _log) = gpu();
        let mut mesh = Mesh::cube(&gpu);
        mesh.move_by(Vec3::new(0.0, 1.5, 0.0));
        mesh.rotate_y(0.3);
        mesh.scale(Vec3::splat(0.5));
        mesh.reset();
        mesh.move_by(Vec3::new(2.0, 0.0, 1.0));
        mesh.rotate_x(0.7);
        mesh.rotate_z(-0.2);
        mesh.scale(Vec3::new(1.0, 2.0, 3.0));

        let expected = Mat4::IDENTITY
            * Mat4::from_translation(Vec3::new(2.0, 0.0, 1.0))
            * Mat4::from_rotation_x(0.7)
            * Mat4::from_rotation_z(-0.2)
            * Mat4::from_scale(Vec3::new(1.0, 2.0, 3.0));
        assert!(mesh.model().abs_diff_eq(expected, 1e-5));
    }

    #[test]
    fn set_transform_replaces_accumulated_state() {
        let (gpu, _log) = gpu();
        let mut mesh = Mesh::cube(&gpu);
        mesh.move_by(Vec3::X);
        mesh.move_by(Vec3::X);

        let transform = Transform::from_translation(Vec3::new(0.0, 1.5, 0.0))
            .with_rotation(Quat::from_rotation_y(1.0));
        mesh.set_transform(&transform);
        mesh.set_transform(&transform);
        assert!(mesh.model().abs_diff_eq(transform.matrix(), 1e-6));
    }

    #[test]
    fn draw_pushes_material_and_matrices_then_draws_36() {
        let (gpu, log) = gpu();
        let shader = Shader::builtin(&gpu, BuiltinShader::Lighting);
        let mut units = TextureUnits::new();
        let mut mesh = Mesh::cube(&gpu);
        let target = Rc::new(DepthTarget::new(&gpu, 16, 16));
        mesh.set_shadow_map(target, &mut units);

        let view = Mat4::from_translation(Vec3::new(0.0, 0.0, -3.0));
        mesh.draw(Mat4::IDENTITY, view, &shader);

        let id = shader.id();
        assert_eq!(log.uniform(id, "material.shininess"), Some(UniformValue::Float(32.0)));
        assert_eq!(log.uniform(id, "shadowMap"), Some(UniformValue::Int(0)));
        assert_eq!(log.uniform(id, "view"), Some(UniformValue::Mat4(view)));
        assert_eq!(
            log.uniform(id, "material.diffuse"),
            Some(UniformValue::Int(NO_TEXTURE_UNIT))
        );

        let draws = log.draws();
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].1, 36);
        assert_eq!(draws[0].2.program, Some(id));
    }

    #[test]
    fn instanced_mesh_draws_one_copy_per_matrix() {
        let (gpu, log) = gpu();
        let shader = Shader::builtin(&gpu, BuiltinShader::Lighting);
        let mut mesh = Mesh::cube(&gpu);
        let matrices: Vec<Mat4> = (0..5)
            .map(|i| Mat4::from_translation(Vec3::new(i as f32, 0.0, 0.0)))
            .collect();

        mesh.set_instances(&matrices);
        mesh.draw(Mat4::IDENTITY, Mat4::IDENTITY, &shader);
        mesh.set_instances(&[]);
        mesh.draw(Mat4::IDENTITY, Mat4::IDENTITY, &shader);

        let instances: Vec<u32> = log.draws().iter().map(|(_, _, s)| s.instances).collect();
        assert_eq!(instances, vec![5, 1]);
        assert_eq!(mesh.instance_count(), 0);
    }

    #[test]
    fn clearing_the_shadow_map_resets_the_sampler() {
        let (gpu, log) = gpu();
        let shader = Shader::builtin(&gpu, BuiltinShader::Lighting);
        let mut units = TextureUnits::new();
        let mut mesh = Mesh::cube(&gpu);
        mesh.set_shadow_map(Rc::new(DepthTarget::new(&gpu, 16, 16)), &mut units);
        mesh.clear_shadow_map();
        mesh.draw(Mat4::IDENTITY, Mat4::IDENTITY, &shader);

        assert_eq!(mesh.shadow_map_unit(), None);
        assert_eq!(
            log.uniform(shader.id(), "shadowMap"),
            Some(UniformValue::Int(NO_TEXTURE_UNIT))
        );
    }

    #[test]
    fn units_are_assigned_when_slots_are_filled() {
        let (gpu, _log) = gpu();
        let mut units = TextureUnits::new();
        let texture = Rc::new(Texture::load(&gpu, "missing.png", false));
        let mut first = Mesh::cube(&gpu);
        let mut second = Mesh::quad(&gpu, QuadGeometry::default());

        first.set_diffuse_map(texture.clone(), &mut units);
        first.set_specular_map(texture.clone(), &mut units);
        second.set_diffuse_map(texture, &mut units);

        assert_eq!(first.diffuse_unit(), Some(0));
        assert_eq!(first.specular_unit(), Some(1));
        assert_eq!(second.diffuse_unit(), Some(2));
        assert_eq!(second.element_count(), 6);
    }

    #[test]
    fn indexed_vertices_draw_their_index_count() {
        let (gpu, _log) = gpu();
        let vertices = [0.0f32; 8 * 4];
        let mesh = Mesh::from_vertices(&gpu, &vertices, Some(&[0, 1, 2, 2, 3, 0]));
        assert_eq!(mesh.element_count(), 6);
        assert_eq!(*mesh.kind(), MeshKind::Model);
    }
}
