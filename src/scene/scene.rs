// scene/scene.rs
//
// Meshes, lights and an optional skybox drawn as one frame: shadow depth
// pre-pass, light uniforms and markers, the lit meshes, then the skybox.

use std::rc::Rc;

use glam::{Mat4, Vec3};

use crate::gfx::MAX_POINT_LIGHTS;
use crate::renderer::{
    DepthTarget, DirLight, Light, Mesh, PointLight, ShadowPass, Shader, Skybox, SpotLight, TextureUnits,
};

use super::camera::Camera;

pub struct Scene {
    meshes: Vec<Mesh>,
    lights: Vec<Light>,
    skybox: Option<Skybox>,
    units: TextureUnits,
    pub projection: Mat4,
    pub view: Mat4,
    pub view_pos: Vec3,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    pub fn new() -> Self {
        Self {
            meshes: Vec::new(),
            lights: Vec::new(),
            skybox: None,
            units: TextureUnits::new(),
            projection: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
            view_pos: Vec3::ZERO,
        }
    }

    /// Texture units for meshes built outside the scene. Sharing the scene's
    /// allocator keeps every unit in a frame distinct.
    pub fn units_mut(&mut self) -> &mut TextureUnits {
        &mut self.units
    }

    pub fn set_camera(&mut self, camera: &Camera, aspect: f32) {
        self.projection = camera.projection(aspect);
        self.view = camera.view_matrix();
        self.view_pos = camera.position;
    }

    /// Add a mesh, giving it the shadow map if one is configured. Returns
    /// its index.
    pub fn add_mesh(&mut self, mut mesh: Mesh) -> usize {
        match self.shadow_target() {
            Some(target) => mesh.set_shadow_map(target, &mut self.units),
            None => mesh.clear_shadow_map(),
        }
        self.meshes.push(mesh);
        self.meshes.len() - 1
    }

    fn shadow_target(&self) -> Option<Rc<DepthTarget>> {
        self.dir_light()
            .and_then(DirLight::shadow_pass)
            .map(|pass| Rc::clone(pass.target()))
    }

    /// Give every mesh the current shadow map, or take it away when there
    /// is none.
    fn sync_shadow_maps(&mut self) {
        let target = self.shadow_target();
        for mesh in &mut self.meshes {
            match &target {
                Some(target) => mesh.set_shadow_map(Rc::clone(target), &mut self.units),
                None => mesh.clear_shadow_map(),
            }
        }
    }

    pub fn meshes(&self) -> &[Mesh] {
        &self.meshes
    }

    pub fn meshes_mut(&mut self) -> &mut [Mesh] {
        &mut self.meshes
    }

    pub fn mesh_mut(&mut self, index: usize) -> Option<&mut Mesh> {
        self.meshes.get_mut(index)
    }

    /// A directional or spot light replaces the previous one of its kind;
    /// point lights are appended in shader-slot order.
    pub fn add_light(&mut self, light: impl Into<Light>) {
        let light = light.into();
        let directional = matches!(light, Light::Directional(_));
        match &light {
            Light::Directional(_) => {
                self.lights.retain(|l| !matches!(l, Light::Directional(_)));
            }
            Light::Spot(_) => self.lights.retain(|l| !matches!(l, Light::Spot(_))),
            Light::Point(_) => {
                if self.point_lights().count() >= MAX_POINT_LIGHTS {
                    log::warn!(
                        "Scene has more than {} point lights; the extra ones will not light anything",
                        MAX_POINT_LIGHTS
                    );
                }
            }
        }
        self.lights.push(light);
        if directional {
            self.sync_shadow_maps();
        }
    }

    /// Render the directional light's shadow map through `pass` from now on.
    /// Returns false, dropping the pass, when the scene has no directional
    /// light.
    pub fn enable_shadow_map(&mut self, pass: ShadowPass) -> bool {
        let Some(dir) = self.dir_light_mut() else {
            log::error!("enable_shadow_map called on a scene without a directional light");
            return false;
        };
        dir.enable_shadow_map(pass);
        self.sync_shadow_maps();
        true
    }

    /// Stop rendering shadows. Meshes lose their shadow-map slot and the
    /// removed pass is handed back.
    pub fn disable_shadow_map(&mut self) -> Option<ShadowPass> {
        let pass = self.dir_light_mut().and_then(DirLight::disable_shadow_map);
        self.sync_shadow_maps();
        pass
    }

    pub fn lights(&self) -> &[Light] {
        &self.lights
    }

    pub fn dir_light(&self) -> Option<&DirLight> {
        self.lights.iter().find_map(|light| match light {
            Light::Directional(dir) => Some(dir),
            _ => None,
        })
    }

    pub fn dir_light_mut(&mut self) -> Option<&mut DirLight> {
        self.lights.iter_mut().find_map(|light| match light {
            Light::Directional(dir) => Some(dir),
            _ => None,
        })
    }

    pub fn point_lights(&self) -> impl Iterator<Item = &PointLight> {
        self.lights.iter().filter_map(|light| match light {
            Light::Point(point) => Some(point),
            _ => None,
        })
    }

    pub fn point_light_mut(&mut self, index: usize) -> Option<&mut PointLight> {
        self.lights
            .iter_mut()
            .filter_map(|light| match light {
                Light::Point(point) => Some(point),
                _ => None,
            })
            .nth(index)
    }

    pub fn spot_light(&self) -> Option<&SpotLight> {
        self.lights.iter().find_map(|light| match light {
            Light::Spot(spot) => Some(spot),
            _ => None,
        })
    }

    pub fn spot_light_mut(&mut self) -> Option<&mut SpotLight> {
        self.lights.iter_mut().find_map(|light| match light {
            Light::Spot(spot) => Some(spot),
            _ => None,
        })
    }

    pub fn set_skybox(&mut self, mut skybox: Skybox) {
        skybox.set_unit(self.units.allocate());
        self.skybox = Some(skybox);
    }

    pub fn skybox(&self) -> Option<&Skybox> {
        self.skybox.as_ref()
    }

    pub fn draw(&self, shader: &Shader) {
        shader.use_program();
        shader.set_vec3("viewPos", self.view_pos);

        if let Some(dir) = self.dir_light() {
            match dir.shadow_pass() {
                Some(pass) => {
                    let light_space = dir.generate_light_space_matrix();
                    dir.bind_depth_map();
                    self.draw_meshes(pass.shader());
                    dir.unbind_depth_map();
                    shader.use_program();
                    shader.set_mat4("lightSpaceMatrix", light_space);
                }
                None => {
                    shader.use_program();
                    shader.set_mat4("lightSpaceMatrix", Mat4::IDENTITY);
                }
            }
            dir.compute_light(shader);
        }

        shader.set_int("numPointLights", self.point_lights().count() as i32);
        for (index, point) in self.point_lights().enumerate() {
            point.compute_light(shader, index);
            point.draw_light_cube(self.projection, self.view);
        }

        if let Some(spot) = self.spot_light() {
            spot.compute_light(shader);
        }

        self.draw_meshes(shader);

        if let Some(skybox) = &self.skybox {
            skybox.draw(self.projection, self.view);
        }
    }

    fn draw_meshes(&self, shader: &Shader) {
        for mesh in &self.meshes {
            mesh.draw(self.projection, self.view, shader);
        }
    }
}

impl std::fmt::Debug for Scene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scene")
            .field("meshes", &self.meshes.len())
            .field("lights", &self.lights)
            .field("skybox", &self.skybox)
            .field("units", &self.units)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::{Gpu, RecordingDevice, RecordingLog, UniformValue};
    use crate::gfx::{Command, TextureKind};
    use crate::renderer::BuiltinShader;

    fn gpu() -> (Gpu, RecordingLog) {
        let (device, log) = RecordingDevice::new();
        (Gpu::new(device), log)
    }

    #[test]
    fn empty_scene_only_reports_zero_point_lights() {
        let (gpu, log) = gpu();
        let shader = Shader::builtin(&gpu, BuiltinShader::Lighting);
        Scene::new().draw(&shader);

        let id = shader.id();
        assert_eq!(log.uniform(id, "numPointLights"), Some(UniformValue::Int(0)));
        assert_eq!(log.uniform(id, "lightSpaceMatrix"), None);
        assert!(log
            .uniform_names()
            .iter()
            .all(|name| !name.contains("Light.") && !name.starts_with("pointLights")));
        assert!(log.draws().is_empty());
    }

    #[test]
    fn dir_light_without_shadow_uploads_identity() {
        let (gpu, log) = gpu();
        let shader = Shader::builtin(&gpu, BuiltinShader::Lighting);
        let mut scene = Scene::new();
        scene.add_light(DirLight::new(Vec3::new(1.0, 3.0, 0.0), Vec3::ONE));
        scene.add_mesh(Mesh::cube(&gpu));
        scene.draw(&shader);

        assert_eq!(
            log.uniform(shader.id(), "lightSpaceMatrix"),
            Some(UniformValue::Mat4(Mat4::IDENTITY))
        );
        assert_eq!(scene.meshes()[0].shadow_map_unit(), None);
        assert_eq!(log.draws().len(), 1);
    }

    #[test]
    fn meshes_get_the_shadow_map_before_and_after_the_light() {
        let (gpu, _log) = gpu();
        let mut scene = Scene::new();
        scene.add_mesh(Mesh::cube(&gpu));
        scene.add_light(
            DirLight::new(Vec3::new(-2.0, 2.8, -3.0), Vec3::ONE)
                .with_shadow_pass(ShadowPass::with_size(&gpu, 256)),
        );
        scene.add_mesh(Mesh::cube(&gpu));

        assert_eq!(scene.meshes()[0].shadow_map_unit(), Some(0));
        assert_eq!(scene.meshes()[1].shadow_map_unit(), Some(1));
    }

    fn depth_binds(log: &RecordingLog) -> usize {
        log.commands()
            .iter()
            .filter(|c| matches!(c, Command::BindTexture { kind: TextureKind::Depth, .. }))
            .count()
    }

    #[test]
    fn disabling_the_shadow_map_clears_mesh_slots() {
        let (gpu, log) = gpu();
        let shader = Shader::builtin(&gpu, BuiltinShader::Lighting);
        let mut scene = Scene::new();
        scene.add_mesh(Mesh::cube(&gpu));
        scene.add_light(
            DirLight::new(Vec3::new(-2.0, 2.8, -3.0), Vec3::ONE)
                .with_shadow_pass(ShadowPass::with_size(&gpu, 256)),
        );
        scene.draw(&shader);
        assert!(depth_binds(&log) > 0);

        assert!(scene.disable_shadow_map().is_some());
        assert_eq!(scene.meshes()[0].shadow_map_unit(), None);
        log.clear();
        scene.draw(&shader);

        assert_eq!(depth_binds(&log), 0);
        assert_eq!(log.draws().len(), 1);
        assert_eq!(
            log.uniform(shader.id(), "lightSpaceMatrix"),
            Some(UniformValue::Mat4(Mat4::IDENTITY))
        );
        assert_eq!(
            log.uniform(shader.id(), "shadowMap"),
            Some(UniformValue::Int(crate::gfx::NO_TEXTURE_UNIT))
        );
    }

    #[test]
    fn enabling_the_shadow_map_reaches_existing_meshes() {
        let (gpu, log) = gpu();
        let shader = Shader::builtin(&gpu, BuiltinShader::Lighting);
        let mut scene = Scene::new();
        assert!(!scene.enable_shadow_map(ShadowPass::with_size(&gpu, 64)));

        scene.add_light(DirLight::new(Vec3::new(1.0, 3.0, 0.0), Vec3::ONE));
        scene.add_mesh(Mesh::cube(&gpu));
        assert!(scene.enable_shadow_map(ShadowPass::with_size(&gpu, 64)));
        assert_eq!(scene.meshes()[0].shadow_map_unit(), Some(0));

        // toggling again reuses the mesh's unit
        scene.disable_shadow_map();
        scene.enable_shadow_map(ShadowPass::with_size(&gpu, 64));
        assert_eq!(scene.meshes()[0].shadow_map_unit(), Some(0));

        scene.draw(&shader);
        assert!(depth_binds(&log) > 0);
        assert_eq!(
            log.uniform(shader.id(), "shadowMap"),
            Some(UniformValue::Int(0))
        );
    }

    #[test]
    fn replacing_a_shadowed_light_drops_the_old_map() {
        let (gpu, log) = gpu();
        let shader = Shader::builtin(&gpu, BuiltinShader::Lighting);
        let mut scene = Scene::new();
        scene.add_light(DirLight::default().with_shadow_pass(ShadowPass::with_size(&gpu, 64)));
        scene.add_mesh(Mesh::cube(&gpu));
        scene.add_light(DirLight::new(Vec3::new(0.0, 5.0, 1.0), Vec3::ONE));

        assert_eq!(scene.meshes()[0].shadow_map_unit(), None);
        scene.draw(&shader);
        assert_eq!(depth_binds(&log), 0);
    }

    #[test]
    fn single_dir_and_spot_light_are_kept() {
        let (gpu, _log) = gpu();
        let mut scene = Scene::new();
        scene.add_light(DirLight::default());
        scene.add_light(SpotLight::new(Vec3::ZERO, Vec3::NEG_Z, Vec3::ONE));
        scene.add_light(PointLight::new(&gpu, Vec3::X, Vec3::ONE, false));
        scene.add_light(DirLight::new(Vec3::new(0.0, 5.0, 1.0), Vec3::ONE));
        scene.add_light(SpotLight::new(Vec3::Y, Vec3::NEG_Y, Vec3::ONE));

        assert_eq!(scene.lights().len(), 3);
        assert_eq!(scene.dir_light().map(DirLight::position), Some(Vec3::new(0.0, 5.0, 1.0)));
        assert_eq!(scene.spot_light().map(SpotLight::position), Some(Vec3::Y));
        assert!(scene.point_light_mut(0).is_some());
        assert!(scene.point_light_mut(1).is_none());
    }

    #[test]
    fn skybox_takes_the_next_unit() {
        let (gpu, _log) = gpu();
        let mut scene = Scene::new();
        scene.units_mut().allocate();
        let faces = std::array::from_fn(|_| None);
        scene.set_skybox(Skybox::from_faces(&gpu, &faces));
        assert_eq!(scene.skybox().map(Skybox::unit), Some(1));
    }
}
