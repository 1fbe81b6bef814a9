use std::rc::Rc;

use forward_scene::gfx::{
    Command, CullFace, FramebufferId, Gpu, RecordingDevice, RecordingLog, TextureKind, UniformValue,
};
use forward_scene::renderer::{BuiltinShader, DirLight, Mesh, PointLight, ShadowPass, Shader};
use forward_scene::scene::{Camera, Scene};
use glam::{Mat4, Vec3};

const EPSILON: f32 = 1e-5;

/// Shadow-map texture coordinates and depth of `world_pos`, matching the
/// lookup in `blinn_phong.frag.wgsl`.
fn project_shadow_cpu(matrix: Mat4, world_pos: Vec3) -> Vec3 {
    let clip = matrix * world_pos.extend(1.0);
    let ndc = clip.truncate() / clip.w;
    Vec3::new(ndc.x * 0.5 + 0.5, 0.5 - ndc.y * 0.5, ndc.z)
}

fn shadowed_scene() -> (Gpu, RecordingLog, Scene, Shader) {
    let (device, log) = RecordingDevice::new();
    let gpu = Gpu::new(device);
    let mut scene = Scene::new();
    scene.add_mesh(Mesh::cube(&gpu));
    scene.add_light(
        DirLight::new(Vec3::new(-2.0, 2.8, -3.0), Vec3::ONE)
            .with_shadow_pass(ShadowPass::with_size(&gpu, 1024)),
    );
    scene.set_camera(&Camera::new(Vec3::new(-1.0, 2.0, 5.0), Vec3::ZERO), 4.0 / 3.0);
    let shader = Shader::builtin(&gpu, BuiltinShader::Lighting);
    (gpu, log, scene, shader)
}

fn shadow_framebuffer(scene: &Scene) -> Option<FramebufferId> {
    scene
        .dir_light()
        .and_then(DirLight::shadow_pass)
        .map(|pass| pass.target().framebuffer_id())
}

#[test]
fn depth_pass_culls_front_faces_and_main_pass_restores_back() {
    let (_gpu, log, scene, shader) = shadowed_scene();
    scene.draw(&shader);

    let draws = log.draws();
    assert_eq!(draws.len(), 2);

    let (_, count, depth_state) = draws[0];
    assert_eq!(count, 36);
    assert_eq!(depth_state.cull_face, CullFace::Front);
    assert_eq!(depth_state.framebuffer, shadow_framebuffer(&scene));
    assert_ne!(depth_state.program, Some(shader.id()));

    let (_, _, main_state) = draws[1];
    assert_eq!(main_state.cull_face, CullFace::Back);
    assert_eq!(main_state.framebuffer, None);
    assert_eq!(main_state.program, Some(shader.id()));
    assert_eq!(main_state.viewport, RecordingDevice::DEFAULT_VIEWPORT);
}

#[test]
fn main_pass_receives_the_light_space_matrix_and_shadow_map() {
    let (_gpu, log, scene, shader) = shadowed_scene();
    scene.draw(&shader);

    let expected = Mat4::orthographic_rh(-10.0, 10.0, -10.0, 10.0, 1.0, 15.0)
        * Mat4::look_at_rh(Vec3::new(-2.0, 2.8, -3.0), Vec3::ZERO, Vec3::Y);
    match log.uniform(shader.id(), "lightSpaceMatrix") {
        Some(UniformValue::Mat4(m)) => assert!(m.abs_diff_eq(expected, EPSILON)),
        other => panic!("lightSpaceMatrix not uploaded: {other:?}"),
    }

    let depth_texture = scene
        .dir_light()
        .and_then(DirLight::shadow_pass)
        .map(|pass| pass.target().texture_id());
    let unit = scene.meshes()[0].shadow_map_unit();
    assert_eq!(
        log.uniform(shader.id(), "shadowMap"),
        unit.map(|u| UniformValue::Int(u as i32))
    );
    assert!(log.commands().iter().any(|c| matches!(
        c,
        Command::BindTexture { texture, kind: TextureKind::Depth, .. } if Some(*texture) == depth_texture
    )));
}

#[test]
fn origin_lands_in_the_middle_of_the_shadow_map() {
    let light = DirLight::new(Vec3::new(-2.0, 2.8, -3.0), Vec3::ONE);
    let matrix = light.light_space_matrix();

    let centre = project_shadow_cpu(matrix, Vec3::ZERO);
    assert!((centre.x - 0.5).abs() < EPSILON);
    assert!((centre.y - 0.5).abs() < EPSILON);

    let distance = Vec3::new(-2.0, 2.8, -3.0).length();
    let expected_depth = (distance - 1.0) / (15.0 - 1.0);
    assert!((centre.z - expected_depth).abs() < 1e-4);

    // points towards the light are closer in the map
    let nearer = project_shadow_cpu(matrix, Vec3::new(-0.2, 0.28, -0.3));
    assert!(nearer.z < centre.z);
}

#[test]
fn depth_pass_shares_one_target_between_meshes() {
    let (device, _log) = RecordingDevice::new();
    let gpu = Gpu::new(device);
    let pass = ShadowPass::with_size(&gpu, 512);
    let target = Rc::clone(pass.target());

    let mut scene = Scene::new();
    scene.add_light(DirLight::default().with_shadow_pass(pass));
    scene.add_mesh(Mesh::cube(&gpu));
    scene.add_mesh(Mesh::cube(&gpu));

    // the scene's light, both meshes and this test
    assert_eq!(Rc::strong_count(&target), 4);
    assert_eq!(target.size(), (512, 512));
}

#[test]
fn point_light_markers_draw_between_passes() {
    let (gpu, log, mut scene, shader) = shadowed_scene();
    scene.add_light(PointLight::new(&gpu, Vec3::new(0.0, 1.0, 2.0), Vec3::ONE, true));
    scene.draw(&shader);

    let draws = log.draws();
    assert_eq!(draws.len(), 3);
    assert_ne!(draws[1].2.program, Some(shader.id()));
    assert_eq!(draws[1].2.framebuffer, None);
    assert_eq!(
        log.uniform(shader.id(), "numPointLights"),
        Some(UniformValue::Int(1))
    );
    assert_eq!(
        log.uniform(shader.id(), "pointLights[0].quadratic"),
        Some(UniformValue::Float(0.07))
    );
}

#[test]
fn instanced_mesh_is_instanced_in_both_passes() {
    let (_gpu, log, mut scene, shader) = shadowed_scene();
    let matrices = [
        Mat4::from_translation(Vec3::new(-2.0, 0.0, 0.0)),
        Mat4::IDENTITY,
        Mat4::from_translation(Vec3::new(2.0, 0.0, 0.0)),
    ];
    if let Some(mesh) = scene.mesh_mut(0) {
        mesh.set_instances(&matrices);
    }
    scene.draw(&shader);

    let draws = log.draws();
    assert_eq!(draws.len(), 2);
    assert!(draws.iter().all(|(_, _, state)| state.instances == 3));
}

#[test]
fn shadow_map_toggles_through_the_scene() {
    let (_gpu, log, mut scene, shader) = shadowed_scene();
    let pass = scene.disable_shadow_map().expect("scene had a shadow pass");
    scene.draw(&shader);

    let depth_binds = |log: &RecordingLog| {
        log.commands()
            .iter()
            .filter(|c| matches!(c, Command::BindTexture { kind: TextureKind::Depth, .. }))
            .count()
    };
    assert_eq!(depth_binds(&log), 0);
    assert_eq!(log.draws().len(), 1);

    assert!(scene.enable_shadow_map(pass));
    log.clear();
    scene.draw(&shader);
    assert!(scene.meshes()[0].shadow_map_unit().is_some());
    assert!(depth_binds(&log) > 0);
    assert_eq!(log.draws().len(), 2);
}
