use std::path::Path;
use std::rc::Rc;

use forward_scene::app::{Demo, StartupContext, UpdateContext};
use forward_scene::gfx::{ClearFlags, Gpu, WrapMode};
use forward_scene::input::KeyLatch;
use forward_scene::renderer::{
    BuiltinShader, DirLight, Mesh, Model, PointLight, QuadGeometry, ShadowPass, Shader, Skybox,
    SpotLight, Texture, TextureParameter, TextureValue,
};
use forward_scene::scene::{Camera, Scene, Transform};
use forward_scene::settings::{DemoSetting, RenderSettings};
use glam::{Mat4, Quat, Vec3};
use log::info;
use rand::{rngs::SmallRng, Rng, SeedableRng};
use winit::keyboard::KeyCode;

const SKYBOX_FACES: [&str; 6] = [
    "skybox/right.jpg",
    "skybox/left.jpg",
    "skybox/top.jpg",
    "skybox/bottom.jpg",
    "skybox/front.jpg",
    "skybox/back.jpg",
];

pub fn create(setting: &DemoSetting, ctx: &mut StartupContext<'_>) -> Box<dyn Demo> {
    match setting {
        DemoSetting::ShadowCourtyard => Box::new(ShadowCourtyard::new(ctx)),
        DemoSetting::LightCasters => Box::new(LightCasters::new(ctx)),
        DemoSetting::ModelViewer { path, scale } => Box::new(ModelViewer::new(ctx, path, *scale)),
        DemoSetting::AsteroidField { amount } => Box::new(AsteroidField::new(ctx, *amount)),
    }
}

/// Lighting program from the shader directory, or the builtin copy when the
/// directory does not carry one.
fn lighting_shader(gpu: &Gpu, settings: &RenderSettings) -> Shader {
    let vertex = settings.shader("lighting.vert.wgsl");
    let fragment = settings.shader("blinn_phong.frag.wgsl");
    if vertex.is_file() && fragment.is_file() {
        let shader = Shader::from_files(gpu, &vertex, &fragment, None);
        if shader.is_valid() {
            return shader;
        }
        log::warn!("Falling back to the builtin lighting shader");
    }
    Shader::builtin(gpu, BuiltinShader::Lighting)
}

fn repeating_texture(gpu: &Gpu, path: &Path, gamma_correction: bool) -> Rc<Texture> {
    let texture = Texture::load(gpu, path, gamma_correction);
    texture.set_parameter(TextureParameter::WrapS, TextureValue::Wrap(WrapMode::Repeat));
    texture.set_parameter(TextureParameter::WrapT, TextureValue::Wrap(WrapMode::Repeat));
    Rc::new(texture)
}

fn add_skybox_if_present(gpu: &Gpu, settings: &RenderSettings, scene: &mut Scene) {
    let faces = SKYBOX_FACES.map(|face| settings.asset(face));
    if faces.iter().all(|face| face.is_file()) {
        scene.set_skybox(Skybox::new(gpu, faces));
    } else {
        info!("No skybox under {:?}", settings.asset("skybox"));
    }
}

fn clear(gpu: &Gpu, colour: [f32; 4]) {
    gpu.with(|device| device.clear(ClearFlags::COLOUR | ClearFlags::DEPTH, colour));
}

/// B switches Blinn-Phong on and off, F the camera flashlight.
#[derive(Debug)]
struct Toggles {
    blinn: bool,
    blinn_key: KeyLatch,
    flashlight_key: KeyLatch,
}

impl Default for Toggles {
    fn default() -> Self {
        Self {
            blinn: true,
            blinn_key: KeyLatch::default(),
            flashlight_key: KeyLatch::default(),
        }
    }
}

impl Toggles {
    fn update(&mut self, ctx: &UpdateContext<'_>, scene: &mut Scene) {
        if self.blinn_key.pressed(ctx.keys.is_pressed(KeyCode::KeyB)) {
            self.blinn = !self.blinn;
            info!("Blinn-Phong {}", if self.blinn { "on" } else { "off" });
        }
        let flashlight = self.flashlight_key.pressed(ctx.keys.is_pressed(KeyCode::KeyF));
        if let Some(spot) = scene.spot_light_mut() {
            if flashlight {
                spot.toggle();
            }
            spot.follow(ctx.camera.position, ctx.camera.front);
        }
    }
}

/// Three crates over a wooden floor, shadowed by a directional light and
/// lit by two orbiting point lights.
pub struct ShadowCourtyard {
    scene: Scene,
    shader: Shader,
    toggles: Toggles,
    bobbing: usize,
    spinning: usize,
}

impl ShadowCourtyard {
    pub fn new(ctx: &mut StartupContext<'_>) -> Self {
        let (gpu, settings) = (ctx.gpu, ctx.settings);
        let gamma = settings.gamma_correction;
        *ctx.camera = Camera::new(Vec3::new(-1.0, 2.0, 5.0), Vec3::ZERO);

        let mut scene = Scene::new();
        let crate_diffuse = Rc::new(Texture::load(gpu, settings.asset("container2.png"), gamma));
        let crate_specular = Rc::new(Texture::load(
            gpu,
            settings.asset("container2_specular.png"),
            false,
        ));
        let wood = repeating_texture(gpu, &settings.asset("wood.png"), gamma);

        let crate_mesh = |scene: &mut Scene| {
            let mut cube = Mesh::cube(gpu);
            cube.set_diffuse_map(crate_diffuse.clone(), scene.units_mut());
            cube.set_specular_map(crate_specular.clone(), scene.units_mut());
            cube
        };

        let bobbing = crate_mesh(&mut scene);
        let bobbing = scene.add_mesh(bobbing);
        let spinning = crate_mesh(&mut scene);
        let spinning = scene.add_mesh(spinning);

        let mut tilted = crate_mesh(&mut scene);
        tilted.move_by(Vec3::new(-1.0, 0.0, 2.0));
        tilted.rotate_x(30f32.to_radians());
        tilted.rotate_z(30f32.to_radians());
        tilted.scale(Vec3::splat(0.25));
        scene.add_mesh(tilted);

        let mut floor = Mesh::quad(
            gpu,
            QuadGeometry::new(
                Vec3::new(-25.0, -0.5, 25.0),
                Vec3::new(25.0, -0.5, 25.0),
                Vec3::new(25.0, -0.5, -25.0),
                Vec3::new(-25.0, -0.5, -25.0),
            ),
        );
        floor.set_diffuse_map(wood, scene.units_mut());
        scene.add_mesh(floor);

        scene.add_light(
            DirLight::new(Vec3::new(-2.0, 4.0, -1.0), Vec3::ONE)
                .with_shadow_pass(ShadowPass::with_size(gpu, settings.shadow_map_size)),
        );
        scene.add_light(PointLight::new(gpu, Vec3::new(2.0, 1.0, 0.0), Vec3::new(1.0, 0.6, 0.2), gamma));
        scene.add_light(PointLight::new(gpu, Vec3::new(-2.0, 1.0, 0.0), Vec3::new(0.2, 0.4, 1.0), gamma));

        let mut flashlight = SpotLight::new(ctx.camera.position, ctx.camera.front, Vec3::ONE);
        flashlight.set_enabled(false);
        scene.add_light(flashlight);

        add_skybox_if_present(gpu, settings, &mut scene);

        Self {
            scene,
            shader: lighting_shader(gpu, settings),
            toggles: Toggles::default(),
            bobbing,
            spinning,
        }
    }
}

impl Demo for ShadowCourtyard {
    fn name(&self) -> &str {
        "Shadow Courtyard"
    }

    fn update(&mut self, ctx: &mut UpdateContext<'_>) {
        let t = ctx.elapsed;
        self.toggles.update(ctx, &mut self.scene);

        if let Some(cube) = self.scene.mesh_mut(self.bobbing) {
            cube.set_transform(
                &Transform::from_translation(Vec3::new(0.0, 1.5 + 1.5 * (0.5 * t).sin(), 0.0))
                    .with_uniform_scale(0.5),
            );
        }
        if let Some(cube) = self.scene.mesh_mut(self.spinning) {
            cube.reset();
            cube.move_by(Vec3::new(2.0, 0.5, 1.0));
            cube.rotate_x(t);
            cube.rotate_z(t);
            cube.scale(Vec3::splat(0.5));
        }
        for (index, phase) in [0.0, std::f32::consts::PI].into_iter().enumerate() {
            if let Some(light) = self.scene.point_light_mut(index) {
                let angle = 0.7 * t + phase;
                light.move_to(Vec3::new(3.0 * angle.cos(), 1.0, 3.0 * angle.sin()));
            }
        }

        self.scene.set_camera(ctx.camera, ctx.aspect);
    }

    fn draw(&self, gpu: &Gpu) {
        clear(gpu, [0.01, 0.01, 0.01, 1.0]);
        self.shader.use_program();
        self.shader.set_bool("blinn", self.toggles.blinn);
        self.scene.draw(&self.shader);
    }
}

/// A row of crates along a wooden floor with a point light sweeping past.
pub struct LightCasters {
    scene: Scene,
    shader: Shader,
    toggles: Toggles,
}

impl LightCasters {
    const CRATES: usize = 11;

    pub fn new(ctx: &mut StartupContext<'_>) -> Self {
        let (gpu, settings) = (ctx.gpu, ctx.settings);
        let gamma = settings.gamma_correction;
        *ctx.camera = Camera::new(Vec3::new(0.0, 2.0, 0.0), Vec3::new(0.0, 0.5, -4.0));

        let mut scene = Scene::new();
        let diffuse = Rc::new(Texture::load(gpu, settings.asset("container2.png"), gamma));
        let specular = Rc::new(Texture::load(gpu, settings.asset("container2_specular.png"), false));

        let mut floor = Mesh::quad(
            gpu,
            QuadGeometry::new(
                Vec3::new(-50.0, 0.0, 2.0),
                Vec3::new(50.0, 0.0, 2.0),
                Vec3::new(50.0, 0.0, -50.0),
                Vec3::new(-50.0, 0.0, -50.0),
            ),
        );
        floor.set_diffuse_map(
            repeating_texture(gpu, &settings.asset("wood.png"), gamma),
            scene.units_mut(),
        );
        scene.add_mesh(floor);

        for i in 0..Self::CRATES {
            let mut cube = Mesh::cube(gpu);
            cube.set_diffuse_map(diffuse.clone(), scene.units_mut());
            cube.set_specular_map(specular.clone(), scene.units_mut());
            cube.set_transform(&Transform::from_translation(Vec3::new(
                0.0,
                0.5,
                -2.0 - 2.0 * i as f32,
            )));
            scene.add_mesh(cube);
        }

        scene.add_light(PointLight::new(gpu, Vec3::new(2.0, 1.0, -20.0), Vec3::ONE, gamma));
        let mut flashlight = SpotLight::new(ctx.camera.position, ctx.camera.front, Vec3::ONE);
        flashlight.set_enabled(false);
        scene.add_light(flashlight);

        Self {
            scene,
            shader: lighting_shader(gpu, settings),
            toggles: Toggles::default(),
        }
    }
}

impl Demo for LightCasters {
    fn name(&self) -> &str {
        "Light Casters"
    }

    fn update(&mut self, ctx: &mut UpdateContext<'_>) {
        let t = ctx.elapsed;
        self.toggles.update(ctx, &mut self.scene);
        if let Some(light) = self.scene.point_light_mut(0) {
            light.move_to(Vec3::new(
                5.0 * (2.0 * t).sin(),
                1.5,
                -15.0 + 15.0 * (0.5 * t).cos(),
            ));
        }
        self.scene.set_camera(ctx.camera, ctx.aspect);
    }

    fn draw(&self, gpu: &Gpu) {
        clear(gpu, [0.1, 0.1, 0.1, 1.0]);
        self.shader.use_program();
        self.shader.set_bool("blinn", self.toggles.blinn);
        self.scene.draw(&self.shader);
    }
}

/// Any OBJ or glTF model from the asset directory under a shadowing sun.
pub struct ModelViewer {
    scene: Scene,
    shader: Shader,
    toggles: Toggles,
}

impl ModelViewer {
    pub fn new(ctx: &mut StartupContext<'_>, path: &str, scale: f32) -> Self {
        let (gpu, settings) = (ctx.gpu, ctx.settings);
        let gamma = settings.gamma_correction;
        *ctx.camera = Camera::new(Vec3::new(0.0, 1.5, 4.0), Vec3::ZERO);

        let mut scene = Scene::new();
        scene.add_light(
            DirLight::new(Vec3::new(-2.0, 4.0, -1.0), Vec3::ONE)
                .with_shadow_pass(ShadowPass::with_size(gpu, settings.shadow_map_size)),
        );
        scene.add_light(PointLight::new(gpu, Vec3::new(1.5, 2.0, 1.5), Vec3::ONE, gamma));

        let model = Model::load(gpu, settings.asset(path), scene.units_mut(), gamma);
        if model.is_empty() {
            log::warn!("Model {:?} has nothing to draw", settings.asset(path));
        }
        for mut mesh in model.into_meshes() {
            mesh.scale(Vec3::splat(scale));
            scene.add_mesh(mesh);
        }

        add_skybox_if_present(gpu, settings, &mut scene);

        Self {
            scene,
            shader: lighting_shader(gpu, settings),
            toggles: Toggles::default(),
        }
    }
}

impl Demo for ModelViewer {
    fn name(&self) -> &str {
        "Model Viewer"
    }

    fn update(&mut self, ctx: &mut UpdateContext<'_>) {
        self.toggles.update(ctx, &mut self.scene);
        self.scene.set_camera(ctx.camera, ctx.aspect);
    }

    fn draw(&self, gpu: &Gpu) {
        clear(gpu, [0.05, 0.05, 0.08, 1.0]);
        self.shader.use_program();
        self.shader.set_bool("blinn", self.toggles.blinn);
        self.scene.draw(&self.shader);
    }
}

const ASTEROID_RING_RADIUS: f32 = 150.0;
const ASTEROID_RING_OFFSET: f32 = 25.0;
const ASTEROID_SEED: u64 = 0x5EED_4057;

/// Rock placements around a ring in the XZ plane, each jittered by up to
/// the ring offset, flattened in Y, shrunk and tumbled about a fixed axis.
fn asteroid_matrices(rng: &mut SmallRng, amount: usize) -> Vec<Mat4> {
    let axis = Vec3::new(0.4, 0.6, 0.8).normalize();
    let mut jitter = |rng: &mut SmallRng| rng.gen_range(-ASTEROID_RING_OFFSET..ASTEROID_RING_OFFSET);
    (0..amount)
        .map(|i| {
            let angle = i as f32 / amount as f32 * std::f32::consts::TAU;
            let position = Vec3::new(
                angle.sin() * ASTEROID_RING_RADIUS + jitter(rng),
                jitter(rng) * 0.4,
                angle.cos() * ASTEROID_RING_RADIUS + jitter(rng),
            );
            let scale = rng.gen_range(0.05..0.25);
            let rotation = Quat::from_axis_angle(axis, rng.gen_range(0.0..std::f32::consts::TAU));
            Mat4::from_scale_rotation_translation(Vec3::splat(scale), rotation, position)
        })
        .collect()
}

/// A planet inside a ring of instanced rocks, all rocks drawn by one call
/// per rock mesh.
pub struct AsteroidField {
    scene: Scene,
    shader: Shader,
    toggles: Toggles,
}

impl AsteroidField {
    pub fn new(ctx: &mut StartupContext<'_>, amount: usize) -> Self {
        let (gpu, settings) = (ctx.gpu, ctx.settings);
        let gamma = settings.gamma_correction;
        *ctx.camera = Camera::new(Vec3::new(0.0, 0.0, 110.0), Vec3::ZERO);
        ctx.camera.far = 1000.0;

        let mut scene = Scene::new();
        scene.add_light(DirLight::new(Vec3::new(1.0, 0.6, 1.0), Vec3::ONE));

        let planet = Model::load(gpu, settings.asset("planet/planet.obj"), scene.units_mut(), gamma);
        for mut mesh in planet.into_meshes() {
            mesh.move_by(Vec3::new(0.0, -3.0, 0.0));
            mesh.scale(Vec3::splat(4.0));
            scene.add_mesh(mesh);
        }

        let rock = Model::load(gpu, settings.asset("rock/rock.obj"), scene.units_mut(), gamma);
        let mut rocks = rock.into_meshes();
        if rocks.is_empty() {
            log::warn!("No rock model, the asteroid field uses cubes");
            rocks.push(Mesh::cube(gpu));
        }
        let matrices = asteroid_matrices(&mut SmallRng::seed_from_u64(ASTEROID_SEED), amount);
        info!("Asteroid field with {} rocks", matrices.len());
        for mut mesh in rocks {
            mesh.set_instances(&matrices);
            scene.add_mesh(mesh);
        }

        add_skybox_if_present(gpu, settings, &mut scene);

        Self {
            scene,
            shader: lighting_shader(gpu, settings),
            toggles: Toggles::default(),
        }
    }
}

impl Demo for AsteroidField {
    fn name(&self) -> &str {
        "Asteroid Field"
    }

    fn update(&mut self, ctx: &mut UpdateContext<'_>) {
        self.toggles.update(ctx, &mut self.scene);
        self.scene.set_camera(ctx.camera, ctx.aspect);
    }

    fn draw(&self, gpu: &Gpu) {
        clear(gpu, [0.1, 0.1, 0.1, 1.0]);
        self.shader.use_program();
        self.shader.set_bool("blinn", self.toggles.blinn);
        self.scene.draw(&self.shader);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forward_scene::gfx::{Command, CullFace, RecordingDevice, RecordingLog};
    use forward_scene::input::KeyState;

    fn start(setting: DemoSetting) -> (Gpu, RecordingLog, Camera, Box<dyn Demo>) {
        let (device, log) = RecordingDevice::new();
        let gpu = Gpu::new(device);
        let settings = RenderSettings {
            assets_dir: "missing-assets".into(),
            shaders_dir: "missing-shaders".into(),
            ..RenderSettings::default()
        };
        let mut camera = Camera::default();
        let demo = create(
            &setting,
            &mut StartupContext {
                gpu: &gpu,
                settings: &settings,
                camera: &mut camera,
            },
        );
        (gpu, log, camera, demo)
    }

    fn frame(gpu: &Gpu, camera: &Camera, keys: &KeyState, demo: &mut dyn Demo) {
        demo.update(&mut UpdateContext {
            camera,
            keys,
            elapsed: 1.0,
            delta_time: 1.0 / 60.0,
            aspect: 4.0 / 3.0,
        });
        demo.draw(gpu);
        gpu.finish_frame();
    }

    #[test]
    fn courtyard_renders_shadow_pass_then_lit_meshes() {
        let (gpu, log, camera, mut demo) = start(DemoSetting::ShadowCourtyard);
        frame(&gpu, &camera, &KeyState::new(), demo.as_mut());

        let draws = log.draws();
        // 4 meshes into the shadow map, 2 light markers, 4 lit meshes
        assert_eq!(draws.len(), 10);
        assert!(draws[..4].iter().all(|(_, _, s)| s.cull_face == CullFace::Front));
        assert!(draws[4..].iter().all(|(_, _, s)| s.framebuffer.is_none()));
        assert_eq!(log.cull_face(), CullFace::Back);
    }

    #[test]
    fn light_casters_draws_floor_and_crates() {
        let (gpu, log, camera, mut demo) = start(DemoSetting::LightCasters);
        frame(&gpu, &camera, &KeyState::new(), demo.as_mut());
        // marker + floor + 11 crates
        assert_eq!(log.draws().len(), 13);
    }

    #[test]
    fn missing_model_still_runs() {
        let (gpu, log, camera, mut demo) = start(DemoSetting::ModelViewer {
            path: "backpack/backpack.obj".into(),
            scale: 1.0,
        });
        frame(&gpu, &camera, &KeyState::new(), demo.as_mut());
        assert_eq!(log.draws().len(), 1);
    }

    #[test]
    fn asteroid_field_draws_every_rock_in_one_call() {
        let (gpu, log, camera, mut demo) = start(DemoSetting::AsteroidField { amount: 300 });
        assert_eq!(camera.far, 1000.0);
        frame(&gpu, &camera, &KeyState::new(), demo.as_mut());

        // no planet on disk, one cube standing in for the rock
        let draws = log.draws();
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].2.instances, 300);
    }

    #[test]
    fn asteroids_stay_inside_the_ring() {
        let matrices = asteroid_matrices(&mut SmallRng::seed_from_u64(7), 500);
        assert_eq!(matrices.len(), 500);
        for matrix in &matrices {
            let (scale, _, position) = matrix.to_scale_rotation_translation();
            let ring = Vec3::new(position.x, 0.0, position.z).length();
            let reach = ASTEROID_RING_RADIUS + ASTEROID_RING_OFFSET * 2f32.sqrt();
            assert!(ring <= reach && ring >= ASTEROID_RING_RADIUS - ASTEROID_RING_OFFSET * 2f32.sqrt());
            assert!(position.y.abs() <= ASTEROID_RING_OFFSET * 0.4);
            assert!(scale.x >= 0.049 && scale.x <= 0.251);
        }
    }

    #[test]
    fn specular_maps_load_without_gamma_correction() {
        let (device, log) = RecordingDevice::new();
        let gpu = Gpu::new(device);
        let dir = std::env::temp_dir().join(format!("forward-scene-demo-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        for name in ["container2.png", "container2_specular.png", "wood.png"] {
            image::RgbaImage::from_pixel(2, 2, image::Rgba([200, 200, 200, 255]))
                .save(dir.join(name))
                .unwrap();
        }
        let settings = RenderSettings {
            assets_dir: dir.clone(),
            shaders_dir: "missing-shaders".into(),
            gamma_correction: true,
            ..RenderSettings::default()
        };
        let mut camera = Camera::default();
        let _demo = create(
            &DemoSetting::LightCasters,
            &mut StartupContext {
                gpu: &gpu,
                settings: &settings,
                camera: &mut camera,
            },
        );
        std::fs::remove_dir_all(&dir).ok();

        // wood and the crate diffuse are colour, the specular map is data
        let srgb: Vec<bool> = log
            .commands()
            .iter()
            .filter_map(|c| match c {
                Command::CreateTexture { srgb, .. } => Some(*srgb),
                _ => None,
            })
            .collect();
        assert_eq!(srgb, vec![true, false, true]);
    }

    #[test]
    fn flashlight_toggles_once_per_press() {
        let camera = Camera::default();
        let mut scene = Scene::new();
        scene.add_light(SpotLight::new(Vec3::ZERO, Vec3::NEG_Z, Vec3::ONE));
        let mut toggles = Toggles::default();
        let mut keys = KeyState::new();
        keys.set(KeyCode::KeyF, true);

        let ctx = UpdateContext {
            camera: &camera,
            keys: &keys,
            elapsed: 0.0,
            delta_time: 0.0,
            aspect: 1.0,
        };
        toggles.update(&ctx, &mut scene);
        toggles.update(&ctx, &mut scene);
        assert_eq!(scene.spot_light().map(SpotLight::is_enabled), Some(false));
    }
}
